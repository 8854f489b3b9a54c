//! # tally
//!
//! Command line front end for the Tally barcode resolution engine.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tally scan <barcode>          history → cloud → race → backup          │
//! │  tally confirm <barcode> ...   store locally, publish to the cloud      │
//! │  tally history [--limit N]     most recent confirmed scans              │
//! │  tally clear                   delete the local history                 │
//! │  tally classify <barcode>      routing hint only, no I/O                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status lines and logs go to stderr; results go to stdout.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_core::{
    classify, Barcode, BarcodeRoute, ConfirmedRecord, Money, SearchOutcome, TaxBreakdown,
    TaxCategory, TaxClass, TaxRate, DEFAULT_BRAND,
};
use tally_db::{Database, DbConfig, StoredProduct};
use tally_lookup::{LookupConfig, ScanResult, ScanService, SearchObserver, SearchPhase};

const DEFAULT_LOG_FILTER: &str = "info,tally=debug,sqlx=warn";

/// Tally: barcode to priced, tax-classified product record
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: platform config dir / tally.toml)
    #[arg(short, long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a barcode to a product record
    Scan {
        barcode: String,
    },
    /// Store a finished record and share it with the cloud store
    Confirm {
        barcode: String,
        /// Product name
        #[arg(long)]
        name: String,
        /// Brand (default: Generic)
        #[arg(long)]
        brand: Option<String>,
        /// Tax-inclusive shelf price, e.g. 105.50
        #[arg(long)]
        price: String,
        /// Tax category (exempt, essential, standard, luxury) or a rate like 8.25%
        #[arg(long, default_value = "essential")]
        tax: String,
    },
    /// Show the most recent confirmed scans
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete the local scan history
    Clear,
    /// Show how a barcode is routed
    Classify {
        barcode: String,
    },
}

/// Prints search progress to stderr.
struct ConsoleObserver;

impl SearchObserver for ConsoleObserver {
    fn on_status(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn on_phase(&self, _phase: SearchPhase) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    if let Command::Classify { barcode } = &cli.command {
        print_route(barcode, classify(barcode), cli.json)?;
        return Ok(());
    }

    let config = LookupConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    let db = open_database(&config).await?;
    let service = ScanService::from_config(&config, db.clone(), Some(Arc::new(ConsoleObserver)))?;

    let result = run(&cli, &config, &service).await;
    db.close().await;
    result
}

async fn run(cli: &Cli, config: &LookupConfig, service: &ScanService) -> anyhow::Result<()> {
    match &cli.command {
        Command::Scan { barcode } => {
            let barcode = Barcode::new(barcode.as_str())?;
            match service.scan(&barcode).await? {
                ScanResult::Known(stored) => print_stored(&stored, cli.json)?,
                ScanResult::Resolved(outcome) => print_outcome(&outcome, cli.json)?,
                ScanResult::Busy => bail!("Another search is still running"),
            }
        }

        Command::Confirm {
            barcode,
            name,
            brand,
            price,
            tax,
        } => {
            let record = ConfirmedRecord {
                barcode: Barcode::new(barcode.as_str())?,
                name: name.clone(),
                brand: brand.clone().unwrap_or_else(|| DEFAULT_BRAND.to_string()),
                price: Money::parse_decimal(price)?,
                tax: parse_tax(tax)?,
            };
            let breakdown = service.breakdown(&record);
            let receipt = service.confirm(record).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&receipt.stored)?);
            } else {
                println!("Saved {} ({})", receipt.stored.name, receipt.stored.barcode);
                print_breakdown(&breakdown);
            }

            // Give the background publish a chance before the process exits.
            let wait = Duration::from_secs(config.cloud.publish_deadline_secs + 5);
            if tokio::time::timeout(wait, receipt.publish).await.is_err() {
                warn!("Cloud publish still pending at exit");
            }
        }

        Command::History { limit } => {
            let rows = service.history(*limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No scans yet");
            } else {
                for row in &rows {
                    println!(
                        "{}  {:<14} {:<32} {:<16} {:>10}  {}",
                        row.scanned_at.format("%Y-%m-%d %H:%M"),
                        row.barcode,
                        row.name,
                        row.brand,
                        row.price(),
                        row.tax_rate()
                    );
                }
            }
        }

        Command::Clear => {
            let removed = service.clear_history().await?;
            info!(removed, "History cleared");
            println!("Removed {} scans", removed);
        }

        Command::Classify { barcode } => print_route(barcode, classify(barcode), cli.json)?,
    }

    Ok(())
}

async fn open_database(config: &LookupConfig) -> anyhow::Result<Database> {
    let db_config = DbConfig::new(config.database_path()).busy_timeout(config.busy_timeout());
    Ok(Database::new(db_config).await?)
}

/// `standard` → category; `8.25` or `8.25%` → explicit rate.
fn parse_tax(raw: &str) -> anyhow::Result<TaxClass> {
    if let Ok(category) = raw.parse::<TaxCategory>() {
        return Ok(category.into());
    }

    let pct: f64 = raw
        .trim_end_matches('%')
        .trim()
        .parse()
        .with_context(|| format!("Unknown tax category or rate: {}", raw))?;
    if !pct.is_finite() || pct < 0.0 {
        bail!("Tax rate must be a non-negative percentage: {}", raw);
    }
    Ok(TaxRate::from_percentage(pct).into())
}

// =============================================================================
// Output
// =============================================================================

fn print_route(barcode: &str, route: BarcodeRoute, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "barcode": barcode, "route": route, "skips_race": route.skips_catalog_race() })
        );
    } else {
        let label = match route {
            BarcodeRoute::Book => "book (catalog race skipped)",
            BarcodeRoute::RegionalRetail => "regional retail",
            BarcodeRoute::General => "general",
        };
        println!("{}: {}", barcode, label);
    }
    Ok(())
}

fn print_stored(stored: &StoredProduct, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stored)?);
        return Ok(());
    }

    println!("Known product: {} ({})", stored.name, stored.brand);
    print_breakdown(&TaxBreakdown::of(stored.price(), stored.tax_rate()));
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        SearchOutcome::CloudHit { record } => {
            println!("Cloud: {} ({})", record.name, record.brand);
            println!("  price {}  tax {}", record.price, record.tax);
        }
        SearchOutcome::CatalogHit { candidate, .. } | SearchOutcome::BackupHit { candidate, .. } => {
            println!("Found: {} ({})", candidate.name, candidate.brand);
            if let Some(price) = candidate.price {
                println!("  listed price {}", price);
            }
        }
        SearchOutcome::BookDetected { barcode } => {
            println!("{} is a book; enter it manually", barcode);
        }
        SearchOutcome::ManualEntryRequired { barcode } => {
            println!("{} not found anywhere; enter it manually", barcode);
        }
    }

    if !matches!(outcome, SearchOutcome::CloudHit { .. }) {
        println!(
            "Confirm with: tally confirm {} --name <NAME> --price <PRICE> --tax <CATEGORY>",
            outcome.barcode()
        );
    }
    Ok(())
}

fn print_breakdown(breakdown: &TaxBreakdown) {
    println!(
        "  gross {}  net {}  tax {} @ {}",
        breakdown.gross, breakdown.net, breakdown.tax, breakdown.rate
    );
}
