use anyhow::Result;
use clap::Parser;
use gmail_sweeper::cli::{self, Cli, Commands, ProgressReporter};
use gmail_sweeper::config::Config;
use gmail_sweeper::error::GmailError;
use gmail_sweeper::state::ScanStore;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: self.multi.clone(),
            buffer: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-sweeper --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Several dependencies pull in rustls; pick the provider explicitly
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_sweeper=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_sweeper=info,warn"))
    };

    // Logs print above progress bars through the shared MultiProgress
    let multi_progress = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi_progress.clone(),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reporter = ProgressReporter::with_multi_progress(multi_progress);

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            cli::run_auth(&cli, *force).await?;
            return Ok(());
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;
            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - scan.period_days: How many days of email history to scan");
            println!("  - scan.max_concurrent_requests: Parallel metadata requests (max 50)");
            println!("  - deletion.chunk_size: Messages moved to the trash per request");
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(&cli.config).await?;
    let store = Arc::new(ScanStore::open(cli.cache_file(&config)).await?);

    match &cli.command {
        Commands::Scan { days, label } => {
            let days = days.unwrap_or(config.scan.period_days);
            let label = label.clone().unwrap_or_else(|| config.scan.label.clone());

            let client = cli::connect(&cli, &config, &reporter).await?;
            cli::run_scan(client, store, &config, days, &label, &reporter).await?;
        }
        Commands::Results { limit, filter } => {
            cli::show_results(&store, *limit, filter.as_deref()).await;
        }
        Commands::Delete { sender, yes } => {
            let client = cli::connect(&cli, &config, &reporter).await?;
            cli::run_delete(client, store, &config, sender, *yes, &reporter).await?;
        }
        Commands::Export { output } => {
            cli::run_export(&store, output).await?;
        }
        Commands::Filters { min_count } => {
            cli::show_filters(&store, *min_count).await;
        }
        Commands::Status => {
            cli::show_status(&store.snapshot().await, store.checkpoint_path());
        }
        Commands::Auth { .. } | Commands::InitConfig { .. } => {}
    }

    Ok(())
}
