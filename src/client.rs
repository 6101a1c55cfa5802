//! Gmail API client with bounded concurrency and retry for reads

use async_trait::async_trait;
use google_gmail1::api::{BatchModifyMessagesRequest, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::{GmailHub, MODIFY_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{Header, MessagePage, MessageSummary, METADATA_HEADERS};

/// Operations the sweeper needs from the mail provider
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Fetch one page of message ids in `label` matching `query`
    async fn list_messages_page(
        &self,
        label: &str,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Fetch headers and snippet of a single message
    async fn get_message_metadata(&self, id: &str) -> Result<MessageSummary>;

    /// Add and remove labels on up to 1000 messages in one call
    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;
}

/// Production Gmail client
///
/// Every request holds a semaphore permit, so the number of in-flight calls
/// never exceeds `max_concurrent` no matter how many tasks share the client.
/// Metadata reads are retried with exponential backoff on transient errors;
/// listing and modification errors are returned as-is so callers own the
/// retry policy.
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `max_concurrent` - Maximum concurrent requests (typically 40-50)
    pub fn new(hub: GmailHub, max_concurrent: usize) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    async fn acquire_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.rate_limiter.acquire().await.map_err(|e| {
            GmailError::Unknown(format!("Failed to acquire rate limit permit: {}", e))
        })
    }

    /// Fetch a single message's metadata with retry logic
    async fn fetch_single_with_retry(&self, id: &str) -> Result<MessageSummary> {
        let _permit = self.acquire_permit().await?;

        let mut attempts = 0;
        let max_attempts = 4; // Initial + 3 retries
        let mut delay = Duration::from_millis(100);

        loop {
            attempts += 1;

            let mut call = self.hub.users().messages_get("me", id).format("metadata");
            for header in METADATA_HEADERS {
                call = call.add_metadata_headers(header);
            }

            match call.add_scope(MODIFY_SCOPE).doit().await {
                Ok((_, msg)) => return parse_message_summary(msg),
                Err(e) => {
                    let gmail_error = GmailError::from(e);
                    if gmail_error.is_transient() && attempts < max_attempts {
                        debug!(
                            "Fetching {} failed (attempt {}/{}): {}. Retrying in {:?}",
                            id, attempts, max_attempts, gmail_error, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }
                    return Err(gmail_error);
                }
            }
        }
    }
}

/// Convert a Gmail API Message into a MessageSummary
fn parse_message_summary(msg: Message) -> Result<MessageSummary> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|h| match (h.name, h.value) {
            (Some(name), Some(value)) => Some(Header { name, value }),
            _ => None,
        })
        .collect();

    Ok(MessageSummary {
        id,
        headers,
        snippet: msg.snippet.unwrap_or_default(),
    })
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_messages_page(
        &self,
        label: &str,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let _permit = self.acquire_permit().await?;

        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids(label)
            .q(query)
            .max_results(page_size);

        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = call.add_scope(MODIFY_SCOPE).doit().await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<MessageSummary> {
        self.fetch_single_with_retry(id).await
    }

    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        if message_ids.len() > 1000 {
            warn!(
                "batch_modify_labels called with {} ids; Gmail accepts at most 1000",
                message_ids.len()
            );
        }

        let _permit = self.acquire_permit().await?;

        let request = BatchModifyMessagesRequest {
            ids: Some(message_ids.to_vec()),
            add_label_ids: (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec()),
            remove_label_ids: (!remove_label_ids.is_empty()).then(|| remove_label_ids.to_vec()),
        };

        self.hub
            .users()
            .messages_batch_modify(request, "me")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        debug!("Modified labels on {} messages", message_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_parse_message_summary() {
        let msg = Message {
            id: Some("msg1".to_string()),
            snippet: Some("Save 20% today".to_string()),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header("From", "Shop <deals@shop.com>"),
                    header("List-Unsubscribe", "<mailto:u@shop.com>"),
                    MessagePartHeader {
                        name: Some("Subject".to_string()),
                        value: None,
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let summary = parse_message_summary(msg).unwrap();
        assert_eq!(summary.id, "msg1");
        assert_eq!(summary.snippet, "Save 20% today");
        assert_eq!(summary.headers.len(), 2);
        assert_eq!(summary.headers[0], Header::new("From", "Shop <deals@shop.com>"));
    }

    #[test]
    fn test_parse_message_summary_without_payload() {
        let msg = Message {
            id: Some("msg2".to_string()),
            ..Default::default()
        };

        let summary = parse_message_summary(msg).unwrap();
        assert!(summary.headers.is_empty());
        assert!(summary.snippet.is_empty());
    }

    #[test]
    fn test_parse_message_summary_requires_id() {
        let result = parse_message_summary(Message::default());
        assert!(matches!(result, Err(GmailError::InvalidMessageFormat(_))));
    }
}
