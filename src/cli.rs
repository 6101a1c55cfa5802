//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::auth;
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::deleter::DeletionExecutor;
use crate::error::{GmailError, Result};
use crate::export;
use crate::scanner::{ScanSummary, Scanner};
use crate::state::{DeleteTracker, ScanState, ScanStore};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "gmail-sweeper")]
#[command(version)]
#[command(about = "Find marketing senders in Gmail and move their mail to the trash", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-sweeper/token.json")]
    pub token_cache: PathBuf,

    /// Scan checkpoint file (overrides storage.cache_file)
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Scan a label for marketing senders
    Scan {
        /// Only messages newer than this many days (default: scan.period_days)
        #[arg(short, long)]
        days: Option<u32>,

        /// Label to scan (default: scan.label)
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Show marketing senders from the last scan
    Results {
        /// Number of senders to show
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,

        /// Only senders whose address contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Move every message of one sender to the trash
    Delete {
        /// Sender exactly as listed by `results`
        sender: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Export sender statistics to CSV
    Export {
        /// Output file
        #[arg(short, long, default_value = "marketing_senders.csv")]
        output: PathBuf,
    },

    /// Suggest Gmail filters for domains sending the most marketing mail
    Filters {
        /// Minimum combined message count per domain
        #[arg(long, default_value_t = 5)]
        min_count: usize,
    },

    /// Show progress and totals of the last scan
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Checkpoint file in effect for this invocation
    pub fn cache_file<'a>(&'a self, config: &'a Config) -> &'a Path {
        self.cache_file
            .as_deref()
            .unwrap_or(config.storage.cache_file.as_path())
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share `multi` with the log writer so log lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.println(format!("  ✓ {}", msg));
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// Drive `task` to completion, refreshing `bar` from `poll` meanwhile
async fn with_progress<T, Fut, P, PFut>(bar: &ProgressBar, task: Fut, mut poll: P) -> T
where
    Fut: Future<Output = T>,
    P: FnMut() -> PFut,
    PFut: Future<Output = (u64, u64)>,
{
    tokio::pin!(task);
    loop {
        tokio::select! {
            result = &mut task => return result,
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let (done, total) = poll().await;
                if total > 0 {
                    bar.set_length(total);
                }
                bar.set_position(done);
            }
        }
    }
}

/// Authenticate and build the rate-limited production client
pub async fn connect(cli: &Cli, config: &Config, reporter: &ProgressReporter) -> Result<Arc<dyn GmailClient>> {
    let spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&spinner, "Gmail API authenticated");

    Ok(Arc::new(ProductionGmailClient::new(
        hub,
        config.scan.max_concurrent_requests,
    )))
}

/// Run the OAuth flow and print the connected account
pub async fn run_auth(cli: &Cli, force: bool) -> Result<()> {
    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        tracing::info!("Removed existing token cache");
    }

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(auth::MODIFY_SCOPE)
        .doit()
        .await?;

    println!("Successfully authenticated with Gmail API");
    println!("Token cached at: {:?}", cli.token_cache);
    println!(
        "Connected to account: {}",
        profile.email_address.unwrap_or_default()
    );
    Ok(())
}

/// Run a foreground scan with a live progress bar
pub async fn run_scan(
    client: Arc<dyn GmailClient>,
    store: Arc<ScanStore>,
    config: &Config,
    days: u32,
    label: &str,
    reporter: &ProgressReporter,
) -> Result<ScanSummary> {
    let scanner = Scanner::new(client, store.clone(), &config.scan);
    let bar = reporter.add_progress_bar(0, &format!("Scanning {} (last {} days)", label, days));

    let result = with_progress(&bar, scanner.run_scan(days, label), || {
        let store = store.clone();
        async move {
            let state = store.snapshot().await;
            (state.done as u64, state.total as u64)
        }
    })
    .await;
    bar.finish_and_clear();

    let summary = result?;
    match &summary {
        ScanSummary::Completed {
            listed,
            report,
            senders,
            elapsed_secs,
            ..
        } => {
            println!("\n========================================");
            println!("Scan Summary");
            println!("========================================");
            println!("Messages listed: {}", listed);
            println!("Messages processed: {}", report.processed);
            println!("Marketing messages: {}", report.marketing);
            println!("Marketing senders: {}", senders);
            println!("Failed fetches: {}", report.failed);
            println!("Duration: {:.1} seconds", elapsed_secs);
            println!("========================================");
        }
        ScanSummary::AlreadyRunning => {
            println!("A scan is already running.");
        }
    }
    Ok(summary)
}

/// Print the top marketing senders of the last scan
pub async fn show_results(store: &ScanStore, limit: usize, filter: Option<&str>) {
    let needle = filter.map(str::to_lowercase);
    let rows: Vec<_> = store
        .export_stats()
        .await
        .into_iter()
        .filter(|row| row.count > 0)
        .filter(|row| match &needle {
            Some(n) => row.sender.to_lowercase().contains(n),
            None => true,
        })
        .collect();

    if rows.is_empty() {
        println!("No marketing senders recorded. Run `gmail-sweeper scan` first.");
        return;
    }

    println!("{:>6}  {:<48}  {}", "Count", "Sender", "Domain");
    for row in rows.iter().take(limit) {
        println!(
            "{:>6}  {:<48}  {}",
            row.count,
            truncate_string(&row.sender, 48),
            row.domain
        );
    }
    if rows.len() > limit {
        println!("... and {} more senders", rows.len() - limit);
    }
}

/// Confirm, then move every message of `sender` to the trash
pub async fn run_delete(
    client: Arc<dyn GmailClient>,
    store: Arc<ScanStore>,
    config: &Config,
    sender: &str,
    skip_confirm: bool,
    reporter: &ProgressReporter,
) -> Result<usize> {
    let pending = store.sender_ids(sender).await.len();
    if pending == 0 {
        println!("No messages recorded for {:?}", sender);
        return Ok(0);
    }

    if !skip_confirm {
        let prompt = format!("Move {} messages from {} to the trash?", pending, sender);
        let confirmed = reporter
            .multi_progress()
            .suspend(|| inquire::Confirm::new(&prompt).with_default(false).prompt());

        match confirmed {
            Ok(true) => {}
            Ok(false)
            | Err(inquire::InquireError::OperationCanceled)
            | Err(inquire::InquireError::OperationInterrupted) => {
                println!("Aborted.");
                return Ok(0);
            }
            Err(e) => return Err(GmailError::Unknown(format!("Prompt failed: {}", e))),
        }
    }

    let tracker = Arc::new(DeleteTracker::new());
    let executor = DeletionExecutor::new(client, store, tracker.clone(), config.deletion.clone());
    let bar = reporter.add_progress_bar(pending as u64, "Moving to trash");

    let result = with_progress(&bar, executor.delete_by_sender(sender), || {
        let tracker = tracker.clone();
        async move {
            let progress = tracker.snapshot().await;
            (progress.done as u64, progress.total as u64)
        }
    })
    .await;
    bar.finish_and_clear();

    let deleted = result?;
    println!("Moved {} messages from {} to the trash", deleted, sender);
    Ok(deleted)
}

pub async fn run_export(store: &ScanStore, output: &Path) -> Result<()> {
    let rows = store.export_stats().await;
    export::export_csv_file(output, &rows).await?;
    println!("Exported {} senders to {:?}", rows.len(), output);
    Ok(())
}

pub async fn show_filters(store: &ScanStore, min_count: usize) {
    let rows = store.export_stats().await;
    let filters = export::suggest_domain_filters(&rows, min_count);

    if filters.is_empty() {
        println!("No domain sent at least {} marketing messages.", min_count);
        return;
    }

    println!("{:>6}  {:<32}  {}", "Total", "Domain", "Gmail query");
    for filter in &filters {
        println!(
            "{:>6}  {:<32}  {}",
            filter.total,
            truncate_string(&filter.domain, 32),
            filter.query
        );
    }
}

pub fn show_status(state: &ScanState, checkpoint: &Path) {
    println!("\n========================================");
    println!("Scan State");
    println!("========================================");
    println!("Checkpoint: {:?}", checkpoint);
    if let Some(scan_id) = &state.scan_id {
        println!("Scan ID: {}", scan_id);
    }
    println!("Label: {} (last {} days)", state.label, state.days);
    if let Some(started) = state.started_at {
        println!("Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(updated) = state.updated_at {
        println!("Updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "Processed: {}/{} ({:.1}%)",
        state.done,
        state.total,
        state.progress_percent()
    );
    println!("Failed fetches: {}", state.failed);
    println!("Marketing senders: {}", state.stats.len());
    println!("Marketing messages: {}", state.marketing_messages());
    if state.done < state.total {
        println!("\nThe last scan did not finish; run `gmail-sweeper scan` to start over.");
    }
    println!("========================================");
}
