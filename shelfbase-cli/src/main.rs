use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use shelfbase_core::{
    dataset, ConfigOverrides, ConnectionConfig, DatabaseCore, ReportCatalog, ReportGenerator,
    ReportOutcome, ReportPayload, ReportSink, RunSummary, Session,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "shelfbase")]
#[command(about = "shelfbase - book-catalog reports over a document store")]
#[command(version)]
struct Cli {
    /// TOML config file (default: shelfbase.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// `memory:`, a directory, or `file://<dir>`
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    database: Option<String>,

    #[arg(long, global = true)]
    collection: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report catalog against the configured collection
    Run {
        /// Run only the named reports (repeatable)
        #[arg(long = "report", value_name = "NAME")]
        reports: Vec<String>,
        /// Insert the bundled sample books first
        #[arg(long)]
        seed: bool,
        /// One JSON object per report on stdout
        #[arg(long)]
        json: bool,
    },
    /// List the catalog's reports
    List,
    /// Insert books into the configured collection
    Seed {
        /// JSON array of books (default: bundled sample)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Drop the collection before inserting
        #[arg(long)]
        drop: bool,
    },
    /// Export the configured collection to a JSON file
    Export {
        /// Output JSON file
        file: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::List = cli.command {
        list_reports();
        return Ok(ExitCode::SUCCESS);
    }

    let overrides = ConfigOverrides {
        endpoint: cli.endpoint.clone(),
        database: cli.database.clone(),
        collection: cli.collection.clone(),
    };
    let config = ConnectionConfig::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    debug!(
        endpoint = %config.redacted_endpoint(),
        database = %config.database,
        collection = %config.collection,
        "configuration resolved"
    );
    let session = DatabaseCore::connect(&config)
        .with_context(|| format!("Failed to connect to {}", config.redacted_endpoint()))?;

    let code = match cli.command {
        Commands::Run {
            reports,
            seed,
            json,
        } => run_reports(&session, &reports, seed, json)?,
        Commands::Seed { file, drop } => {
            seed_books(&session, file.as_deref(), drop)?;
            ExitCode::SUCCESS
        }
        Commands::Export { file } => {
            export_collection(&session, &file)?;
            ExitCode::SUCCESS
        }
        Commands::List => ExitCode::SUCCESS,
    };

    session.close().context("Failed to close session")?;
    Ok(code)
}

fn list_reports() {
    let catalog = ReportCatalog::canonical();
    let width = catalog.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for spec in &catalog {
        println!(
            "{:<width$}  {:<17}  {}",
            spec.name,
            spec.kind().as_str(),
            spec.operation.describe(),
            width = width
        );
    }
}

fn run_reports(session: &Session, names: &[String], seed: bool, json: bool) -> Result<ExitCode> {
    let catalog = if names.is_empty() {
        ReportCatalog::canonical()
    } else {
        ReportCatalog::canonical().only(names)?
    };

    if seed {
        let books = dataset::sample_books().context("Failed to load sample books")?;
        dataset::seed(session.collection(), &books).context("Failed to seed sample books")?;
    }

    let mut sink = ConsoleSink { json };
    let summary = ReportGenerator::new(catalog).run(session.collection(), &mut sink);
    sink.finish(&summary);

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Prints each outcome to stdout as it arrives
struct ConsoleSink {
    json: bool,
}

impl ConsoleSink {
    fn finish(&self, summary: &RunSummary) {
        if self.json {
            println!("{}", summary.to_json());
            return;
        }
        println!();
        println!(
            "{} succeeded, {} failed{}",
            summary.succeeded(),
            summary.failed(),
            if summary.aborted { " (aborted)" } else { "" }
        );
    }
}

impl ReportSink for ConsoleSink {
    fn emit(&mut self, outcome: &ReportOutcome) {
        if self.json {
            println!("{}", outcome.to_json());
            return;
        }

        println!("== {} ({})", outcome.name, outcome.kind);
        match outcome.result {
            Ok(ReportPayload::Documents(ref docs)) | Ok(ReportPayload::Groups(ref docs)) => {
                if docs.is_empty() {
                    println!("   (no results)");
                }
                for doc in docs {
                    println!("   {}", doc);
                }
            }
            Ok(ReportPayload::Plan(ref plan)) => {
                let pretty =
                    serde_json::to_string_pretty(plan).unwrap_or_else(|_| plan.to_string());
                for line in pretty.lines() {
                    println!("   {}", line);
                }
            }
            Ok(ref payload) => println!("   {}", payload.to_json()),
            Err(ref err) => println!("   error: {}", err),
        }
    }
}

fn seed_books(session: &Session, file: Option<&Path>, drop: bool) -> Result<()> {
    let books = match file {
        Some(path) => dataset::load_books(path)
            .with_context(|| format!("Failed to load books from {}", path.display()))?,
        None => dataset::sample_books().context("Failed to load sample books")?,
    };

    let database = session.database();
    let name = session.collection().name.clone();
    if drop {
        database
            .drop_collection(&name)
            .with_context(|| format!("Failed to drop collection: {}", name))?;
    }
    let collection = database
        .collection(&name)
        .with_context(|| format!("Failed to get collection: {}", name))?;

    let result = dataset::seed(&collection, &books)
        .with_context(|| format!("Failed to insert books into {}", collection.namespace()))?;
    println!(
        "Inserted {} books into '{}'",
        result.inserted_count,
        collection.namespace()
    );
    Ok(())
}

/// Format: { "collection_name": [documents...] }
fn export_collection(session: &Session, file: &Path) -> Result<()> {
    let name = session.collection().name.clone();
    let collection = session
        .database()
        .collection(&name)
        .with_context(|| format!("Failed to get collection: {}", name))?;
    let docs = collection
        .find(&json!({}))
        .with_context(|| format!("Failed to query collection: {}", collection.name))?;

    let mut output: Map<String, Value> = Map::new();
    let count = docs.len();
    output.insert(collection.name.clone(), Value::Array(docs));

    let json =
        serde_json::to_string_pretty(&output).with_context(|| "Failed to serialize to JSON")?;
    fs::write(file, json)
        .with_context(|| format!("Failed to write to file: {}", file.display()))?;

    println!(
        "Exported {} documents from '{}' to {}",
        count,
        collection.namespace(),
        file.display()
    );
    Ok(())
}
