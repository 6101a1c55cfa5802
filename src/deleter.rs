//! Moves messages to the trash in throttled chunks with rate-limit retry

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::config::DeletionConfig;
use crate::error::{GmailError, Result};
use crate::models::{MessageId, INBOX_LABEL, TRASH_LABEL};
use crate::state::{DeleteTracker, ScanStore};

/// Result of one bulk label mutation attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    Fatal(GmailError),
}

impl From<Result<()>> for AttemptOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => AttemptOutcome::Success,
            Err(e) if e.is_rate_limited() => AttemptOutcome::RateLimited,
            Err(e) => AttemptOutcome::Fatal(e),
        }
    }
}

/// Deletes messages by moving them from the inbox to the trash
///
/// Only one deletion runs at a time; progress is published through the
/// shared [`DeleteTracker`].
pub struct DeletionExecutor {
    client: Arc<dyn GmailClient>,
    store: Arc<ScanStore>,
    tracker: Arc<DeleteTracker>,
    config: DeletionConfig,
}

impl DeletionExecutor {
    pub fn new(
        client: Arc<dyn GmailClient>,
        store: Arc<ScanStore>,
        tracker: Arc<DeleteTracker>,
        config: DeletionConfig,
    ) -> Self {
        Self {
            client,
            store,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<DeleteTracker> {
        &self.tracker
    }

    /// Trash every id, returning how many were confirmed
    ///
    /// The scan state is not touched; see [`Self::delete_by_sender`].
    pub async fn delete_ids(&self, ids: &[MessageId]) -> Result<usize> {
        if !self.tracker.try_begin(ids.len()).await {
            return Err(GmailError::OperationInProgress(
                "a deletion is already running".to_string(),
            ));
        }

        let mut confirmed = Vec::with_capacity(ids.len());
        let result = self.trash_in_chunks(ids, &mut confirmed).await;
        self.tracker.finish().await;

        result.map(|()| confirmed.len())
    }

    /// Trash every message attributed to `sender` in the scan state
    ///
    /// Whether or not every chunk goes through, the ids that were confirmed
    /// are dropped from the sender's entry and the state is checkpointed.
    /// Unconfirmed ids stay attributed so the deletion can be retried.
    ///
    /// Returns the number of messages the provider confirmed, even when a
    /// scan started meanwhile has already cleared the sender's entry.
    pub async fn delete_by_sender(&self, sender: &str) -> Result<usize> {
        let ids = self.store.sender_ids(sender).await;
        if ids.is_empty() {
            info!("No messages recorded for {}", sender);
            return Ok(0);
        }

        if !self.tracker.try_begin(ids.len()).await {
            return Err(GmailError::OperationInProgress(
                "a deletion is already running".to_string(),
            ));
        }

        info!("Deleting {} messages from {}", ids.len(), sender);

        let mut confirmed = Vec::with_capacity(ids.len());
        let result = self.trash_in_chunks(&ids, &mut confirmed).await;
        self.tracker.finish().await;

        let removed = self.store.remove_deleted(sender, &confirmed).await;
        let persisted = self.store.persist().await;

        if let Err(e) = &result {
            warn!(
                "Deletion for {} stopped after {} of {} messages: {}",
                sender,
                confirmed.len(),
                ids.len(),
                e
            );
        } else {
            info!("Deleted {} messages from {}", confirmed.len(), sender);
        }
        if removed != confirmed.len() {
            debug!(
                "Scan state for {} changed during deletion; {} of {} ids reconciled",
                sender,
                removed,
                confirmed.len()
            );
        }

        result?;
        persisted?;
        Ok(confirmed.len())
    }

    /// Process chunks in order, appending each confirmed chunk to `confirmed`
    async fn trash_in_chunks(
        &self,
        ids: &[MessageId],
        confirmed: &mut Vec<MessageId>,
    ) -> Result<()> {
        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = ids.len().div_ceil(chunk_size);

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            self.trash_chunk(chunk).await?;

            confirmed.extend_from_slice(chunk);
            self.tracker.advance(chunk.len()).await;
            debug!("Chunk {}/{} moved to trash", index + 1, chunk_count);

            if index + 1 < chunk_count {
                tokio::time::sleep(self.config.throttle()).await;
            }
        }

        Ok(())
    }

    async fn trash_chunk(&self, chunk: &[MessageId]) -> Result<()> {
        let add = [TRASH_LABEL.to_string()];
        let remove = [INBOX_LABEL.to_string()];

        for attempt in 0..self.config.max_attempts {
            let outcome: AttemptOutcome = self
                .client
                .batch_modify_labels(chunk, &add, &remove)
                .await
                .into();

            match outcome {
                AttemptOutcome::Success => return Ok(()),
                AttemptOutcome::RateLimited if attempt + 1 == self.config.max_attempts => {
                    warn!(
                        "Rate limited on final attempt {}/{}",
                        attempt + 1,
                        self.config.max_attempts
                    );
                }
                AttemptOutcome::RateLimited => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        "Rate limited on attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        self.config.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                AttemptOutcome::Fatal(e) => return Err(e),
            }
        }

        Err(GmailError::RetriesExhausted {
            attempts: self.config.max_attempts,
        })
    }
}
