//! Concurrent batch classification of fetched messages into the scan state

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::{domain_of, parse_address};
use crate::classifier::{is_marketing, sender_of};
use crate::client::GmailClient;
use crate::error::Result;
use crate::models::{MessageId, MessageSummary};
use crate::state::{ItemOutcome, ScanStore};

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub batches: usize,
    pub processed: usize,
    pub failed: usize,
    pub marketing: usize,
}

impl PipelineReport {
    fn absorb(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Marketing { .. } => self.marketing += 1,
            ItemOutcome::Ignored => {}
        }
    }

    fn merge(&mut self, other: PipelineReport) {
        self.batches += other.batches;
        self.processed += other.processed;
        self.failed += other.failed;
        self.marketing += other.marketing;
    }
}

/// Decide how a fetched message contributes to the sender statistics
///
/// Marketing messages without a `From` header cannot be attributed and are
/// ignored.
pub fn classify_message(summary: MessageSummary) -> ItemOutcome {
    if !is_marketing(&summary.headers, &summary.snippet) {
        return ItemOutcome::Ignored;
    }

    let Some(raw_from) = sender_of(&summary.headers) else {
        return ItemOutcome::Ignored;
    };

    let email = parse_address(raw_from);
    let domain = domain_of(&email);

    ItemOutcome::Marketing {
        sender: raw_from.to_string(),
        email,
        domain,
        id: summary.id,
    }
}

/// Fetches, classifies and aggregates message ids batch by batch
///
/// Within a batch, metadata requests run concurrently and every completion
/// updates the store on its own, after its request has returned. The store
/// is checkpointed once every completion of a batch has been recorded.
pub struct BatchClassifyPipeline {
    client: Arc<dyn GmailClient>,
    store: Arc<ScanStore>,
    batch_size: usize,
    concurrency: usize,
}

impl BatchClassifyPipeline {
    pub fn new(
        client: Arc<dyn GmailClient>,
        store: Arc<ScanStore>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            store,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Process every id, checkpointing after each batch
    ///
    /// Per-message fetch failures are counted and skipped. Only a failed
    /// checkpoint write stops the run.
    pub async fn run(&self, ids: &[MessageId]) -> Result<PipelineReport> {
        let batch_count = ids.len().div_ceil(self.batch_size);
        let mut report = PipelineReport::default();

        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            let batch_report = self.process_batch(batch).await;
            self.store.persist().await?;

            debug!(
                "Batch {}/{}: {} processed, {} marketing, {} failed",
                index + 1,
                batch_count,
                batch_report.processed,
                batch_report.marketing,
                batch_report.failed
            );
            report.merge(batch_report);
        }

        info!(
            "Classified {} messages in {} batches: {} marketing, {} failed",
            report.processed, report.batches, report.marketing, report.failed
        );
        Ok(report)
    }

    async fn process_batch(&self, batch: &[MessageId]) -> PipelineReport {
        let initial = PipelineReport {
            batches: 1,
            ..Default::default()
        };

        stream::iter(batch.iter().cloned())
            .map(|id| async move {
                let outcome = match self.client.get_message_metadata(&id).await {
                    Ok(summary) => classify_message(summary),
                    Err(e) => {
                        warn!("Failed to fetch message {}: {}", id, e);
                        ItemOutcome::Failed
                    }
                };

                let mut counted = PipelineReport::default();
                counted.absorb(&outcome);
                self.store.record(outcome).await;
                counted
            })
            .buffer_unordered(self.concurrency)
            .fold(initial, |mut report, counted| async move {
                report.merge(counted);
                report
            })
            .await
    }
}
