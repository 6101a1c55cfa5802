//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_sweeper::client::GmailClient;
use gmail_sweeper::config::{DeletionConfig, ScanConfig};
use gmail_sweeper::error::{GmailError, Result};
use gmail_sweeper::models::{Header, MessageId, MessagePage, MessageSummary};
use mockall::mock;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Message from a mailing list, classified as marketing
pub fn marketing_message(id: &str, from: &str) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        headers: vec![
            Header::new("From", from),
            Header::new("Subject", "This week only"),
            Header::new("List-Unsubscribe", "<mailto:unsubscribe@example.com>"),
        ],
        snippet: "Our newest collection is here".to_string(),
    }
}

/// Ordinary correspondence, not classified as marketing
pub fn personal_message(id: &str, from: &str) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        headers: vec![
            Header::new("From", from),
            Header::new("Subject", "Lunch tomorrow?"),
        ],
        snippet: "Are you free at noon".to_string(),
    }
}

pub fn ids(prefix: &str, n: usize) -> Vec<MessageId> {
    (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
}

pub fn scan_config(batch_size: usize, page_size: u32) -> ScanConfig {
    ScanConfig {
        batch_size,
        page_size,
        max_concurrent_requests: 8,
        ..Default::default()
    }
}

/// Deletion settings without any sleeps
pub fn instant_deletion_config() -> DeletionConfig {
    DeletionConfig {
        backoff_base_ms: 0,
        backoff_step_ms: 0,
        throttle_ms: 0,
        ..Default::default()
    }
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait]
    impl GmailClient for GmailClient {
        async fn list_messages_page(
            &self,
            label: &str,
            query: &str,
            page_size: u32,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_message_metadata(&self, id: &str) -> Result<MessageSummary>;
        async fn batch_modify_labels(
            &self,
            message_ids: &[String],
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
    }
}

/// Recorded `batch_modify_labels` call
#[derive(Debug, Clone)]
pub struct ModifyCall {
    pub ids: Vec<MessageId>,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Default)]
struct MailboxInner {
    order: Vec<MessageId>,
    messages: HashMap<MessageId, MessageSummary>,
    failing: HashSet<MessageId>,
    list_failure_page: Option<usize>,
    modify_script: VecDeque<Result<()>>,
    modify_calls: Vec<ModifyCall>,
    modify_delay_ms: u64,
    stall_metadata_after: Option<usize>,
    metadata_calls: usize,
    list_queries: Vec<(String, String, Option<String>)>,
}

/// In-memory mailbox whose fetches complete after a random delay
///
/// Completion order within a batch is therefore shuffled from run to run.
pub struct FakeMailbox {
    inner: Mutex<MailboxInner>,
    max_delay_ms: u64,
}

impl FakeMailbox {
    pub fn new(max_delay_ms: u64) -> Self {
        Self {
            inner: Mutex::new(MailboxInner::default()),
            max_delay_ms,
        }
    }

    pub fn add(&self, message: MessageSummary) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.push(message.id.clone());
        inner.messages.insert(message.id.clone(), message);
    }

    /// Listed, but every metadata fetch fails
    pub fn add_failing(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.push(id.to_string());
        inner.failing.insert(id.to_string());
    }

    /// Fail the listing request for the given 1-based page
    pub fn fail_listing_at_page(&self, page: usize) {
        self.inner.lock().unwrap().list_failure_page = Some(page);
    }

    /// Queue responses for upcoming `batch_modify_labels` calls; once the
    /// queue is empty every call succeeds
    pub fn script_modify(&self, responses: Vec<Result<()>>) {
        self.inner.lock().unwrap().modify_script.extend(responses);
    }

    /// Every `batch_modify_labels` call takes this long before answering
    pub fn set_modify_delay(&self, delay_ms: u64) {
        self.inner.lock().unwrap().modify_delay_ms = delay_ms;
    }

    /// Answer the first `count` metadata fetches; later fetches never return
    pub fn stall_metadata_after(&self, count: usize) {
        self.inner.lock().unwrap().stall_metadata_after = Some(count);
    }

    pub fn modify_calls(&self) -> Vec<ModifyCall> {
        self.inner.lock().unwrap().modify_calls.clone()
    }

    pub fn list_queries(&self) -> Vec<(String, String, Option<String>)> {
        self.inner.lock().unwrap().list_queries.clone()
    }

    async fn jitter(&self) {
        if self.max_delay_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn list_messages_page(
        &self,
        label: &str,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.jitter().await;
        let mut inner = self.inner.lock().unwrap();
        inner
            .list_queries
            .push((label.to_string(), query.to_string(), page_token.clone()));

        let offset: usize = match page_token.as_deref() {
            Some(token) => token
                .parse()
                .map_err(|_| GmailError::BadRequest(format!("bad page token {}", token)))?,
            None => 0,
        };

        let page = offset / page_size as usize + 1;
        if inner.list_failure_page == Some(page) {
            return Err(GmailError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }

        let end = (offset + page_size as usize).min(inner.order.len());
        let ids = inner.order[offset..end].to_vec();
        let next_page_token = (end < inner.order.len()).then(|| end.to_string());

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<MessageSummary> {
        let stalled = {
            let mut inner = self.inner.lock().unwrap();
            inner.metadata_calls += 1;
            let calls = inner.metadata_calls;
            inner.stall_metadata_after.is_some_and(|limit| calls > limit)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        self.jitter().await;
        let inner = self.inner.lock().unwrap();
        if inner.failing.contains(id) {
            return Err(GmailError::ServerError {
                status: 500,
                message: format!("failed to fetch {}", id),
            });
        }
        inner
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))
    }

    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        let delay_ms = self.inner.lock().unwrap().modify_delay_ms;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.modify_calls.push(ModifyCall {
            ids: message_ids.to_vec(),
            add: add_label_ids.to_vec(),
            remove: remove_label_ids.to_vec(),
        });
        inner.modify_script.pop_front().unwrap_or(Ok(()))
    }
}
