use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use review_scraper::{
    extract_listing_ids, summarize, Config, CsvLedger, CsvResultsStore, EpochOutcome,
    FetchSettings, HttpReviewSource, Ledger, Orchestrator, Pacer, ReviewFetcher, ScrapeStatus,
};

#[derive(Parser)]
#[command(name = "review-scraper")]
#[command(about = "Resumable product review scraper backed by a CSV job ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(long, env = "REVIEW_SCRAPER_CONFIG", default_value = "scraper.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run epochs until every listing is scraped
    Run {
        /// Stop after this many epochs (defaults to run.max_epochs)
        #[arg(long)]
        max_epochs: Option<u32>,
    },

    /// Run a single epoch over unfinished listings
    Epoch,

    /// Mark every listing not scraped and delete collected reviews
    Reset {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
    },

    /// Show ledger progress
    Status,

    /// Print the listing identifiers parsed from a URL
    Ids {
        /// Listing URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("review_scraper=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { max_epochs } => {
            let config = Config::load(&cli.config)?;
            let max_epochs = max_epochs.unwrap_or(config.run.max_epochs);
            run_epochs(&config, max_epochs).await?;
        }
        Commands::Epoch => {
            let config = Config::load(&cli.config)?;
            run_epochs(&config, 1).await?;
        }
        Commands::Reset { yes } => {
            let config = Config::load(&cli.config)?;
            reset(&config, yes)?;
        }
        Commands::Status => {
            let config = Config::load(&cli.config)?;
            show_status(&config)?;
        }
        Commands::Ids { url } => {
            let ids = extract_listing_ids(&url)?;
            println!("group_id:  {}", ids.group_id);
            println!("entity_id: {}", ids.entity_id);
        }
    }

    Ok(())
}

fn open_ledger(config: &Config) -> CsvLedger {
    CsvLedger::new(&config.storage.ledger_path)
}

/// Cancel the returned token on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Shutdown requested, stopping after the current request");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
    token
}

async fn run_epochs(config: &Config, max_epochs: u32) -> Result<()> {
    let source = HttpReviewSource::new(&config.source)?;
    let pacer = Pacer::tokio();
    let fetcher = ReviewFetcher::new(source, pacer.clone(), FetchSettings::from_config(config));
    let results = CsvResultsStore::new(&config.storage.results_path);

    let orchestrator = Orchestrator::new(
        open_ledger(config),
        fetcher,
        results,
        pacer,
        config.pacing.item_delay(),
    );

    let cancel = shutdown_token();
    let reports = orchestrator
        .run(max_epochs, config.run.epoch_pause(), &cancel)
        .await?;

    for report in &reports {
        println!("{}", summarize(report));
    }

    match reports.last().map(|r| r.outcome) {
        Some(EpochOutcome::AllDone) => println!("No URLs left to scrape."),
        Some(EpochOutcome::Cancelled) => println!("Scraping was cancelled; run again to resume."),
        _ => println!("Listings remain; run again to continue."),
    }

    Ok(())
}

fn reset(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "Reset clears every status and deletes {}; pass --yes to confirm",
            config.storage.results_path.display()
        );
    }

    let ledger = open_ledger(config);
    let results = CsvResultsStore::new(&config.storage.results_path);
    ledger
        .reset(&results)
        .with_context(|| format!("Failed to reset ledger: {}", ledger.path().display()))?;

    info!(path = %ledger.path().display(), "Ledger reset");
    println!("Reset {} listings.", ledger.load()?.len());

    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let ledger = open_ledger(config);
    let items = ledger.load()?;

    if items.is_empty() {
        println!("Ledger is empty: {}", ledger.path().display());
        return Ok(());
    }

    println!("Listings:\n");
    for item in &items {
        let pending: Vec<String> = item.pending_ratings.iter().map(|b| b.to_string()).collect();
        println!("  [{}] {}", item.status, item.name);
        println!("    URL: {}", item.url);
        if item.status != ScrapeStatus::Scraped {
            println!("    Pending ratings: [{}]", pending.join(", "));
        }
        println!();
    }

    let count = |status: ScrapeStatus| items.iter().filter(|i| i.status == status).count();
    println!(
        "{} scraped, {} not scraped, {} failed",
        count(ScrapeStatus::Scraped),
        count(ScrapeStatus::NotScraped),
        count(ScrapeStatus::Failed)
    );

    Ok(())
}
