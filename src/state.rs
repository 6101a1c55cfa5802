//! Shared scan state with checkpoint persistence, and deletion progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{GmailError, Result};
use crate::export;
use crate::models::{DeleteProgress, MessageId, SenderKey, SenderRow, SenderStats, INBOX_LABEL};

/// Aggregate of the current (or last) scan
///
/// Invariants: `done <= total` once `total` is set, and the sum of all
/// `stats[*].count` equals the total length of all `sender_to_ids` lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanState {
    pub in_progress: bool,
    pub total: usize,
    pub done: usize,
    /// Messages whose metadata could not be fetched
    pub failed: usize,
    pub stats: BTreeMap<SenderKey, SenderStats>,
    pub sender_to_ids: BTreeMap<SenderKey, Vec<MessageId>>,
    pub days: u32,
    pub label: String,
    pub scan_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            in_progress: false,
            total: 0,
            done: 0,
            failed: 0,
            stats: BTreeMap::new(),
            sender_to_ids: BTreeMap::new(),
            days: 30,
            label: INBOX_LABEL.to_string(),
            scan_id: None,
            started_at: None,
            updated_at: None,
        }
    }
}

/// How a single fetched message affects the aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Metadata fetch failed
    Failed,
    /// Fetched, but not attributable to a marketing sender
    Ignored,
    /// Fetched and classified as marketing
    Marketing {
        sender: SenderKey,
        email: String,
        domain: String,
        id: MessageId,
    },
}

/// Result of asking to start a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStart {
    Started { scan_id: String },
    AlreadyRunning,
}

impl ScanState {
    /// Clear all results and mark a new scan as running
    pub fn reset(&mut self, days: u32, label: &str) -> String {
        let scan_id = uuid::Uuid::new_v4().to_string();
        *self = Self {
            in_progress: true,
            days,
            label: label.to_string(),
            scan_id: Some(scan_id.clone()),
            started_at: Some(Utc::now()),
            ..Self::default()
        };
        scan_id
    }

    /// Fold one completed fetch into the aggregate
    pub fn apply(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Ignored => {}
            ItemOutcome::Marketing {
                sender,
                email,
                domain,
                id,
            } => {
                self.stats
                    .entry(sender.clone())
                    .or_insert_with(|| SenderStats {
                        email,
                        domain,
                        count: 0,
                    })
                    .count += 1;
                self.sender_to_ids.entry(sender).or_default().push(id);
            }
        }
        self.done += 1;
    }

    /// Drop `deleted` ids from a sender, keeping its count in step
    ///
    /// Returns how many ids were actually removed.
    pub fn remove_ids(&mut self, sender: &str, deleted: &[MessageId]) -> usize {
        let Some(ids) = self.sender_to_ids.get_mut(sender) else {
            return 0;
        };

        let deleted: HashSet<&MessageId> = deleted.iter().collect();
        let before = ids.len();
        ids.retain(|id| !deleted.contains(id));
        let removed = before - ids.len();

        if let Some(stats) = self.stats.get_mut(sender) {
            stats.count = stats.count.saturating_sub(removed);
        }
        removed
    }

    /// Total number of messages attributed to marketing senders
    pub fn marketing_messages(&self) -> usize {
        self.stats.values().map(|s| s.count).sum()
    }

    /// Check that counts and id lists agree
    pub fn is_consistent(&self) -> bool {
        let ids: usize = self.sender_to_ids.values().map(Vec::len).sum();
        self.marketing_messages() == ids && (self.total == 0 || self.done <= self.total)
    }

    /// Progress percentage of the current scan
    pub fn progress_percent(&self) -> f32 {
        if self.total == 0 {
            return if self.in_progress { 0.0 } else { 100.0 };
        }
        (self.done as f32 / self.total as f32) * 100.0
    }
}

/// Process-wide holder of the scan state
///
/// All reads and writes go through one mutex, which is only ever held for
/// in-memory work. `persist` snapshots under that mutex and writes the file
/// after releasing it; a second mutex orders concurrent writers so an older
/// snapshot never replaces a newer checkpoint.
#[derive(Debug)]
pub struct ScanStore {
    state: Mutex<ScanState>,
    checkpoint_path: PathBuf,
    persist_lock: Mutex<()>,
}

impl ScanStore {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(ScanState::default()),
            checkpoint_path: checkpoint_path.into(),
            persist_lock: Mutex::new(()),
        }
    }

    /// Create a store and restore the last checkpoint, if any
    pub async fn open(checkpoint_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(checkpoint_path);
        store.restore().await?;
        Ok(store)
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Load the checkpoint file over the in-memory defaults
    ///
    /// Returns `false` when there is no checkpoint yet. A checkpoint written
    /// mid-scan by a process that no longer exists is loaded with
    /// `in_progress` cleared, so its partial results are shown and a new
    /// scan may start.
    pub async fn restore(&self) -> Result<bool> {
        let json = match tokio::fs::read_to_string(&self.checkpoint_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No existing checkpoint found, starting fresh");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let mut restored: ScanState = serde_json::from_str(&json).map_err(|e| {
            GmailError::StateError(format!(
                "Invalid checkpoint {:?}: {}",
                self.checkpoint_path, e
            ))
        })?;

        if restored.in_progress {
            tracing::warn!(
                "Checkpoint was taken mid-scan ({} of {} processed); showing partial results",
                restored.done,
                restored.total
            );
            restored.in_progress = false;
        }

        tracing::info!(
            "Restored checkpoint: {} senders, {} of {} messages processed",
            restored.stats.len(),
            restored.done,
            restored.total
        );

        *self.state.lock().await = restored;
        Ok(true)
    }

    /// Atomically start a scan unless one is already running
    ///
    /// A rejected request leaves the running scan's state untouched.
    pub async fn try_begin(&self, days: u32, label: &str) -> ScanStart {
        let mut state = self.state.lock().await;
        if state.in_progress {
            return ScanStart::AlreadyRunning;
        }
        let scan_id = state.reset(days, label);
        ScanStart::Started { scan_id }
    }

    /// Unconditionally clear results and mark a scan as running
    pub async fn reset(&self, days: u32, label: &str) -> String {
        self.state.lock().await.reset(days, label)
    }

    /// Deep copy of the current state
    pub async fn snapshot(&self) -> ScanState {
        self.state.lock().await.clone()
    }

    /// Apply a read-modify-write transaction under the state lock
    pub async fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ScanState) -> R,
    {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    pub async fn set_total(&self, total: usize) {
        self.mutate(|s| s.total = total).await;
    }

    /// Fold one completed fetch into the state
    pub async fn record(&self, outcome: ItemOutcome) {
        self.mutate(|s| s.apply(outcome)).await;
    }

    /// Mark the running scan as finished
    pub async fn finish(&self) {
        self.mutate(|s| s.in_progress = false).await;
    }

    pub async fn is_scanning(&self) -> bool {
        self.state.lock().await.in_progress
    }

    /// Message ids currently attributed to `sender`
    pub async fn sender_ids(&self, sender: &str) -> Vec<MessageId> {
        self.state
            .lock()
            .await
            .sender_to_ids
            .get(sender)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget ids confirmed as deleted for `sender`
    pub async fn remove_deleted(&self, sender: &str, deleted: &[MessageId]) -> usize {
        self.mutate(|s| s.remove_ids(sender, deleted)).await
    }

    /// Sender statistics ordered by count descending, then sender ascending
    pub async fn export_stats(&self) -> Vec<SenderRow> {
        export::sorted_rows(&self.state.lock().await.stats)
    }

    /// Write the current state to the checkpoint file
    pub async fn persist(&self) -> Result<()> {
        let _writer = self.persist_lock.lock().await;

        let snapshot = self
            .mutate(|s| {
                s.updated_at = Some(Utc::now());
                s.clone()
            })
            .await;

        if let Some(parent) = self.checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated checkpoint
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = self.checkpoint_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.checkpoint_path).await?;

        tracing::debug!(
            "Checkpoint saved to {:?}: {}/{} processed, {} senders",
            self.checkpoint_path,
            snapshot.done,
            snapshot.total,
            snapshot.stats.len()
        );
        Ok(())
    }
}

/// Process-wide holder of deletion progress; never persisted
#[derive(Debug, Default)]
pub struct DeleteTracker {
    progress: Mutex<DeleteProgress>,
}

impl DeleteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a deletion of `total` messages unless one is running
    pub async fn try_begin(&self, total: usize) -> bool {
        let mut progress = self.progress.lock().await;
        if progress.in_progress {
            return false;
        }
        *progress = DeleteProgress {
            in_progress: true,
            done: 0,
            total,
        };
        true
    }

    pub async fn advance(&self, count: usize) {
        let mut progress = self.progress.lock().await;
        progress.done = (progress.done + count).min(progress.total);
    }

    pub async fn finish(&self) {
        self.progress.lock().await.in_progress = false;
    }

    pub async fn snapshot(&self) -> DeleteProgress {
        *self.progress.lock().await
    }
}
