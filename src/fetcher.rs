//! Paginated listing of message ids for a label and recency window

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::models::MessageId;

/// Largest page the Gmail list endpoint serves
pub const MAX_PAGE_SIZE: u32 = 500;

/// Gmail search query selecting messages newer than `days` days
pub fn recency_query(days: u32) -> String {
    format!("newer_than:{}d", days)
}

/// Collects every message id in a label, following continuation tokens
///
/// Ids are returned in provider order. Duplicates across pages are not
/// filtered; a stable continuation token never produces them.
pub struct PageFetcher {
    client: Arc<dyn GmailClient>,
    page_size: u32,
}

impl PageFetcher {
    pub fn new(client: Arc<dyn GmailClient>, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Stream of id pages; ends after the first page without a token
    ///
    /// A failed request yields `ListingFailed` with the 1-based page number
    /// and ends the stream.
    pub fn pages<'a>(
        &'a self,
        label: &'a str,
        recency_days: u32,
    ) -> Pin<Box<dyn Stream<Item = Result<Vec<MessageId>>> + Send + 'a>> {
        Box::pin(stream! {
            let query = recency_query(recency_days);
            let mut page_token: Option<String> = None;
            let mut page = 0;

            loop {
                page += 1;
                let result = self
                    .client
                    .list_messages_page(label, &query, self.page_size, page_token.take())
                    .await;

                match result {
                    Ok(response) => {
                        debug!(
                            "Listed page {} with {} ids (more: {})",
                            page,
                            response.ids.len(),
                            response.next_page_token.is_some()
                        );
                        yield Ok(response.ids);

                        match response.next_page_token {
                            Some(token) => page_token = Some(token),
                            None => break,
                        }
                    }
                    Err(e) => {
                        yield Err(GmailError::ListingFailed {
                            page,
                            source: Box::new(e),
                        });
                        break;
                    }
                }
            }
        })
    }

    /// All ids in `label` received within the last `recency_days` days
    pub async fn list_ids(&self, label: &str, recency_days: u32) -> Result<Vec<MessageId>> {
        let mut pages = self.pages(label, recency_days);
        let mut all_ids = Vec::new();

        while let Some(page) = pages.next().await {
            all_ids.extend(page?);
        }

        info!(
            "Found {} messages in {} from the last {} days",
            all_ids.len(),
            label,
            recency_days
        );
        Ok(all_ids)
    }
}
