//! Gleaner main entry point
//!
//! This is the command-line interface for the Gleaner announcement harvester.

use anyhow::Context;
use clap::Parser;
use gleaner::browser::{ChromiumRenderer, PageRenderer, ReadinessProbe};
use gleaner::config::{load_config_with_hash, Config, PaginationConfig, SiteProfile};
use gleaner::crawler::{CrawlEvent, CrawlSession};
use gleaner::output::{build_sink, write_run_report, FileSink, RecordSink};
use gleaner::{BatchStatus, GleanError, Tagger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Extra delivery attempts after the sink first fails
const DELIVERY_RETRIES: u32 = 2;

/// Gleaner: a resilient announcement harvester
///
/// Gleaner drives a paginated, script-rendered site through a headless
/// browser, extracts and tags its announcements, and delivers them as one
/// ordered batch.
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(version)]
#[command(about = "A resilient announcement harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Site profile to crawl (overrides crawler.site)
    #[arg(long, value_name = "ID")]
    site: Option<String>,

    /// Page ceiling for this run (overrides crawler.max-pages)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Validate config and show the resolved site profile without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    let site = config.site(cli.site.as_deref())?.clone();

    if cli.dry_run {
        print_dry_run(&config, &site);
        return Ok(());
    }

    handle_crawl(config, site, config_hash, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("gleaner=info,warn"),
            1 => EnvFilter::new("gleaner=debug,info"),
            2 => EnvFilter::new("gleaner=trace,chromiumoxide=debug,info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config, site: &SiteProfile) {
    println!("=== Gleaner Dry Run ===\n");

    println!("Site: {} ({})", site.label, site.id);
    println!("  Landing URL: {}", site.landing_url);
    if let Some(base) = &site.base_url {
        println!("  Base URL: {}", base);
    }
    println!("  Ready selector: {}", site.ready_selector);
    println!("  Item selector: {}", site.item_selector);
    println!("  Detail selectors: {}", site.detail_selectors.join(" -> "));
    match &site.pagination {
        PaginationConfig::Single => println!("  Pagination: none"),
        PaginationConfig::Click { next_selector } => {
            println!("  Pagination: click {}", next_selector)
        }
        PaginationConfig::UrlTemplate { template, .. } => {
            println!("  Pagination: {}", template)
        }
    }

    println!("\nCrawler:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Page timeout: {}ms", config.crawler.page_timeout_ms);
    println!(
        "  Inter-page delay: {}-{}ms",
        config.crawler.inter_page_delay_min_ms, config.crawler.inter_page_delay_max_ms
    );
    println!("  Detail concurrency: {}", config.crawler.detail_concurrency);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots);
    println!(
        "  Retry: {} attempts, {:?} backoff from {}ms",
        config.retry.max_attempts, config.retry.backoff, config.retry.delay_ms
    );
    println!(
        "  Identities: {} user agents, {} proxies",
        config.identity.user_agents.len(),
        config.identity.proxies.len()
    );

    println!("\n✓ Configuration is valid");
}

/// Runs the crawl, delivers the batch and writes the run report
async fn handle_crawl(
    config: Config,
    site: SiteProfile,
    config_hash: String,
    quiet: bool,
) -> anyhow::Result<()> {
    let sink = build_sink(&config.output)?;

    let renderer = Arc::new(ChromiumRenderer::new(config.browser.clone()));
    let probe = ReadinessProbe::from_settings(&config.browser, config.crawler.snapshot_dir.as_deref());
    let pages = PageRenderer::new(renderer, probe);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing with a partial batch");
            interrupt.cancel();
        }
    });

    let (events, mut progress) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            if quiet {
                continue;
            }
            match event {
                CrawlEvent::PageExtracted { page_number, items } => {
                    println!("page {}: {} items", page_number, items)
                }
                CrawlEvent::PageFailed { page_number, message } => {
                    println!("page {} failed: {}", page_number, message)
                }
                CrawlEvent::Finished {
                    status,
                    records,
                    pages_visited,
                } => println!(
                    "finished ({}): {} records from {} pages",
                    status, records, pages_visited
                ),
                _ => {}
            }
        }
    });

    let session = CrawlSession::new(&config, site.clone(), pages.clone(), Tagger::heuristic())
        .with_cancellation(cancel)
        .with_events(events)
        .with_config_hash(config_hash);

    let result = session.run(sink.as_ref()).await;

    if let Err(e) = pages.shutdown().await {
        tracing::warn!("Browser shutdown failed: {}", e);
    }
    let _ = reporter.await;

    let mut fallback = None;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(GleanError::Delivery(failure)) => {
            let batch = failure.into_batch();
            let summary = gleaner::batch::RunSummary::from(&batch);
            let receipt = match redeliver(sink.as_ref(), batch).await {
                Ok(receipt) => receipt,
                Err(batch) => {
                    let receipt = save_undelivered(batch, Path::new("."), &site.id).await?;
                    fallback = Some(receipt.location.clone());
                    receipt
                }
            };
            gleaner::CrawlOutcome { summary, receipt }
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = &config.output.summary_path {
        write_run_report(&outcome.summary, Some(&outcome.receipt), Path::new(path))
            .await
            .with_context(|| format!("failed to write run report {}", path))?;
        tracing::info!("Run report written to {}", path);
    }

    run_verdict(&outcome.summary.status, fallback.as_deref(), &sink.describe())
}

/// Exit result of a finished run
///
/// A batch that only reached the local fallback file is a failed run, even
/// when the crawl itself completed.
fn run_verdict(status: &BatchStatus, fallback: Option<&str>, sink: &str) -> anyhow::Result<()> {
    if let Some(path) = fallback {
        anyhow::bail!("delivery to {} failed; batch saved to {}", sink, path);
    }
    if !status.is_done() {
        anyhow::bail!("run ended with status {}", status);
    }
    Ok(())
}

/// Retries delivery; hands the batch back if the sink stays unavailable
async fn redeliver(
    sink: &dyn RecordSink,
    mut batch: gleaner::CrawlBatch,
) -> Result<gleaner::output::DeliveryReceipt, gleaner::CrawlBatch> {
    for attempt in 1..=DELIVERY_RETRIES {
        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        tracing::info!("Delivery attempt {} of {}", attempt + 1, DELIVERY_RETRIES + 1);
        match sink.write(batch).await {
            Ok(receipt) => return Ok(receipt),
            Err(failure) => batch = failure.into_batch(),
        }
    }
    Err(batch)
}

/// Writes an undeliverable batch to a local file so the crawl is not lost
async fn save_undelivered(
    batch: gleaner::CrawlBatch,
    dir: &Path,
    site_id: &str,
) -> anyhow::Result<gleaner::output::DeliveryReceipt> {
    let fallback = dir.join(format!(
        "gleaner-undelivered-{}-{}.json",
        site_id,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    tracing::error!("Sink unavailable; saving batch to {}", fallback.display());
    FileSink::new(&fallback)
        .write(batch)
        .await
        .map_err(|failure| failure.error)
        .context("fallback delivery failed")
}
