mod config;
mod error;
mod models;
mod output;
mod reconcile;
mod scrapers;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, DocumentStyle};
use models::{Address, SizeBand, YearBand};
use output::DocumentWriter;
use scrapers::types::RentQuery;
use scrapers::{AddressDiscoverer, RentQuerySession, ReqwestTransport, ScrapeCoordinator, Transport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mietspiegel-scout")]
#[command(about = "Scrapes the Jena rent index and matches its addresses against building footprints", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level (RUST_LOG takes precedence)"
    )]
    log_level: LogLevel,

    #[arg(long, global = true, help = "Rent index host")]
    host: Option<String>,

    #[arg(long, global = true, help = "Maximum number of concurrent workers")]
    concurrency: Option<usize>,

    #[arg(long, global = true, help = "Per-request timeout in seconds")]
    timeout_secs: Option<u64>,

    #[arg(long, global = true, help = "Accept invalid TLS certificates")]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all streets and house numbers and write the address log
    Discover {
        #[arg(long, help = "Only streets starting with this prefix")]
        street_prefix: Option<String>,

        #[arg(long, help = "Write street names ending in 'tr.' unchanged")]
        keep_abbreviations: bool,

        #[arg(short = 'o', long, help = "Address log to write")]
        output: Option<PathBuf>,
    },
    /// Query every address for all size and year bands and write the rent index
    Scrape {
        #[arg(long, help = "Site-spelled inventory to read")]
        inventory: Option<PathBuf>,

        #[arg(long, conflicts_with = "inventory", help = "Discover addresses instead of reading the log")]
        discover: bool,

        #[arg(long, help = "Only streets starting with this prefix")]
        street_prefix: Option<String>,

        #[arg(long, help = "Write a closed, valid JSON document")]
        json: bool,

        #[arg(short = 'o', long, help = "Rent index document to write")]
        output: Option<PathBuf>,
    },
    /// Run a single rent query and print the result
    Query {
        street: String,

        housenumber: String,

        #[arg(long, value_parser = parse_size, default_value = "between50and80")]
        size: SizeBand,

        #[arg(long, value_parser = parse_year, default_value = "between1991and2001")]
        year: YearBand,
    },
    /// Match the address log against building footprints
    Reconcile {
        #[arg(long, help = "Address log to read")]
        inventory: Option<PathBuf>,

        #[arg(long, help = "Footprint JSON document with an \"elements\" array")]
        footprints: Option<PathBuf>,

        #[arg(long, help = "Write the matched footprints as a closed, valid JSON document")]
        json: bool,
    },
}

fn parse_size(s: &str) -> Result<SizeBand, String> {
    s.parse().map_err(|e: models::BandParseError| e.to_string())
}

fn parse_year(s: &str) -> Result<YearBand, String> {
    s.parse().map_err(|e: models::BandParseError| e.to_string())
}

fn street_filter(prefix: Option<String>) -> Option<impl Fn(&str) -> bool + Sync> {
    prefix.map(|prefix| move |street: &str| street.starts_with(prefix.as_str()))
}

fn log_summary(command: &str, started: DateTime<Utc>) {
    let finished = Utc::now();
    info!(
        command,
        started_at = %started.to_rfc3339(),
        finished_at = %finished.to_rfc3339(),
        elapsed_secs = (finished - started).num_seconds(),
        "Done"
    );
}

fn config_from(cli: &Cli) -> Result<Config> {
    let mut cfg = Config::from_env()?;
    if let Some(host) = &cli.host {
        cfg.host = host.clone();
    }
    if let Some(limit) = cli.concurrency {
        cfg.max_concurrency = limit;
    }
    if let Some(secs) = cli.timeout_secs {
        cfg.timeout = Duration::from_secs(secs);
    }
    cfg.accept_invalid_certs |= cli.insecure;
    cfg.validate()
}

async fn connect(cfg: &Config, cancel: &CancellationToken) -> Result<Arc<dyn Transport>> {
    let transport = ReqwestTransport::connect(cfg, cancel.clone())
        .await
        .with_context(|| format!("Failed to set up transport for {}", cfg.host))?;
    Ok(Arc::new(transport))
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = config_from(&cli)?;
    let started = Utc::now();
    let command = match &cli.command {
        Commands::Discover { .. } => "discover",
        Commands::Scrape { .. } => "scrape",
        Commands::Query { .. } => "query",
        Commands::Reconcile { .. } => "reconcile",
    };

    // in-flight requests resolve as failed once cancelled; files written so far stay
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding requests");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Discover {
            street_prefix,
            keep_abbreviations,
            output: target,
        } => {
            let path = target.unwrap_or(cfg.paths.address_log.clone());
            cfg.expand_abbreviations &= !keep_abbreviations;

            let transport = connect(&cfg, &cancel).await?;
            let discoverer = AddressDiscoverer::new(transport, cfg.max_concurrency);
            let filter = street_filter(street_prefix);
            let include = filter.as_ref().map(|f| f as &(dyn Fn(&str) -> bool + Sync));

            let inventory = discoverer
                .discover_address_space(include)
                .await
                .context("Failed to discover streets")?;

            for (street, housenumbers) in inventory.streets() {
                println!(
                    "{}",
                    output::address_log_line(street, housenumbers, cfg.expand_abbreviations)
                );
            }
            output::write_discovered(
                &inventory,
                &path,
                &cfg.paths.site_inventory,
                cfg.expand_abbreviations,
            )
            .await?;
        }

        Commands::Scrape {
            inventory,
            discover,
            street_prefix,
            json,
            output: target,
        } => {
            if json {
                cfg.document_style = DocumentStyle::Json;
            }
            let path = target.unwrap_or(cfg.paths.rent_index.clone());
            let transport = connect(&cfg, &cancel).await?;

            let inventory = if discover {
                let filter = street_filter(street_prefix);
                let include = filter.as_ref().map(|f| f as &(dyn Fn(&str) -> bool + Sync));
                AddressDiscoverer::new(transport.clone(), cfg.max_concurrency)
                    .discover_address_space(include)
                    .await
                    .context("Failed to discover streets")?
            } else {
                let log = inventory.unwrap_or(cfg.paths.site_inventory.clone());
                let mut inventory = output::read_address_log(&log).await?;
                if let Some(prefix) = street_prefix {
                    inventory = inventory
                        .streets()
                        .filter(|(street, _)| street.starts_with(prefix.as_str()))
                        .map(|(street, numbers)| (street.to_string(), numbers.to_vec()))
                        .collect();
                }
                inventory
            };

            let mut writer = DocumentWriter::create(&path, cfg.document_style).await?;
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<scrapers::CompletedStreet>();
            let writer_task = tokio::spawn(async move {
                while let Some(completed) = rx.recv().await {
                    writer.write_entry(&completed.street, &completed.rents).await?;
                }
                writer.finish().await
            });

            let coordinator = ScrapeCoordinator::new(transport, cfg.max_concurrency).with_sink(tx);
            let (index, stats) = coordinator.run_full_scrape(&inventory).await;
            drop(coordinator);

            let written = writer_task.await.context("Output writer panicked")??;
            info!(
                path = %path.display(),
                streets = written,
                indexed_streets = index.len(),
                resolved = stats.resolved,
                no_result = stats.no_result,
                "Wrote rent index"
            );
        }

        Commands::Query {
            street,
            housenumber,
            size,
            year,
        } => {
            let transport = connect(&cfg, &cancel).await?;
            let query = RentQuery::new(Address::new(street, housenumber), size, year);

            let record = match RentQuerySession::new(transport.as_ref(), &query).run().await {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Query yielded no result");
                    Default::default()
                }
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::Reconcile {
            inventory,
            footprints,
            json,
        } => {
            if json {
                cfg.document_style = DocumentStyle::Json;
            }
            let inventory = output::read_address_log(&inventory.unwrap_or(cfg.paths.address_log.clone())).await?;
            let footprints =
                reconcile::load_footprints(&footprints.unwrap_or(cfg.paths.footprints.clone())).await?;

            let result = reconcile::reconcile(&inventory, &footprints);

            for address in &result.unmatched {
                println!("{}", address);
            }

            output::write_address_lines(&cfg.paths.present, result.matched.iter().map(|m| &m.address))
                .await?;
            output::write_address_lines(&cfg.paths.missing, &result.unmatched).await?;

            let mut echo = DocumentWriter::create_fresh(&cfg.paths.footprint_echo, cfg.document_style).await?;
            for (identity, footprint) in &result.footprints {
                echo.write_entry(identity, footprint).await?;
            }
            echo.finish().await?;

            info!(
                addresses = result.total(),
                matched = result.matched.len(),
                unmatched = result.unmatched.len(),
                "Wrote present and missing address logs"
            );
        }
    }

    log_summary(command, started);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        process::exit(1);
    }
}
