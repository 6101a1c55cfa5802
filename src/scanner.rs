//! Scan entry points: one exclusive scan at a time, always released

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::GmailClient;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::fetcher::PageFetcher;
use crate::pipeline::{BatchClassifyPipeline, PipelineReport};
use crate::state::{ScanStart, ScanStore};

/// Outcome of a foreground scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScanSummary {
    Completed {
        scan_id: String,
        listed: usize,
        report: PipelineReport,
        senders: usize,
        elapsed_secs: f64,
    },
    AlreadyRunning,
}

/// Lists, classifies and checkpoints the messages of one label
pub struct Scanner {
    fetcher: PageFetcher,
    pipeline: BatchClassifyPipeline,
    store: Arc<ScanStore>,
}

impl Scanner {
    pub fn new(client: Arc<dyn GmailClient>, store: Arc<ScanStore>, config: &ScanConfig) -> Self {
        Self {
            fetcher: PageFetcher::new(client.clone(), config.page_size),
            pipeline: BatchClassifyPipeline::new(
                client,
                store.clone(),
                config.batch_size,
                config.max_concurrent_requests,
            ),
            store,
        }
    }

    pub fn store(&self) -> &Arc<ScanStore> {
        &self.store
    }

    /// Run a scan to completion in the current task
    ///
    /// Returns `ScanSummary::AlreadyRunning` without touching the state when
    /// another scan holds the store.
    pub async fn run_scan(&self, days: u32, label: &str) -> Result<ScanSummary> {
        let scan_id = match self.store.try_begin(days, label).await {
            ScanStart::Started { scan_id } => scan_id,
            ScanStart::AlreadyRunning => {
                warn!("A scan is already running; request ignored");
                return Ok(ScanSummary::AlreadyRunning);
            }
        };

        let start = Instant::now();
        let (listed, report) = self.execute(&scan_id, days, label).await?;
        let senders = self.store.snapshot().await.stats.len();

        Ok(ScanSummary::Completed {
            scan_id,
            listed,
            report,
            senders,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Start a scan on a background task and return immediately
    ///
    /// Failures of the background run are logged; progress and results are
    /// read from the store.
    pub async fn start_scan(self: Arc<Self>, days: u32, label: String) -> ScanStart {
        let started = self.store.try_begin(days, &label).await;

        match &started {
            ScanStart::Started { scan_id } => {
                let scan_id = scan_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = self.execute(&scan_id, days, &label).await {
                        error!("Scan {} failed: {}", scan_id, e);
                    }
                });
            }
            ScanStart::AlreadyRunning => {
                warn!("A scan is already running; request ignored");
            }
        }

        started
    }

    /// Body of a scan that `try_begin` has already admitted
    ///
    /// Whatever happens, the scan is marked finished and checkpointed before
    /// returning; the first error wins.
    async fn execute(
        &self,
        scan_id: &str,
        days: u32,
        label: &str,
    ) -> Result<(usize, PipelineReport)> {
        info!("Scan {} started: label {}, last {} days", scan_id, label, days);

        let outcome = self.list_and_classify(days, label).await;

        self.store.finish().await;
        let persisted = self.store.persist().await;

        match (&outcome, &persisted) {
            (Ok((listed, report)), Ok(())) => info!(
                "Scan {} finished: {} listed, {} processed, {} marketing, {} failed",
                scan_id, listed, report.processed, report.marketing, report.failed
            ),
            (Ok(_), Err(e)) => error!("Scan {} final checkpoint failed: {}", scan_id, e),
            (Err(e), _) => warn!("Scan {} stopped early: {}", scan_id, e),
        }

        let result = outcome?;
        persisted?;
        Ok(result)
    }

    async fn list_and_classify(&self, days: u32, label: &str) -> Result<(usize, PipelineReport)> {
        let ids = self.fetcher.list_ids(label, days).await?;
        self.store.set_total(ids.len()).await;
        debug!("Found {} messages to classify", ids.len());

        let report = self.pipeline.run(&ids).await?;
        Ok((ids.len(), report))
    }
}
