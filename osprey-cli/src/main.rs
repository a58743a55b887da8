//! Osprey CLI
//!
//! Runs hunting rules through the artifact pipeline.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use osprey_core::Rule;
use osprey_runtime::{
    HistoryStore, MemoryHistory, Pipeline, PipelineConfig, RuleLoader, RuleStore, SqliteHistory,
};
use osprey_sources::{Registry, SourceSettings};

#[derive(Parser)]
#[command(name = "osprey")]
#[command(author, version, about = "Osprey: rule-driven OSINT artifact hunting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a rule and print the alert as JSON (`null` when nothing is new)
    Search {
        /// Path to a TOML rule file, or the id of a stored rule
        rule: String,

        /// SQLite history database (in-memory history when omitted)
        #[arg(long, env = "OSPREY_DATABASE")]
        database: Option<PathBuf>,

        /// Artifacts enriched at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Replace a stored rule that differs from the file without asking
        #[arg(short, long)]
        force_overwrite: bool,
    },

    /// Check that a rule parses and every source it names is usable
    Validate {
        /// Path to a TOML rule file
        rule: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // stdout carries the alert JSON
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Search {
            rule,
            database,
            concurrency,
            force_overwrite,
        } => run_search(&rule, database.as_deref(), concurrency, force_overwrite).await,
        Commands::Validate { rule } => run_validate(&rule),
    }
}

fn load_rule(path: &Path) -> Result<Rule> {
    Rule::from_path(path).with_context(|| format!("Failed to load rule {}", path.display()))
}

/// History and rules share one backing store
enum Store {
    Sqlite(Arc<SqliteHistory>),
    Memory(Arc<MemoryHistory>),
}

impl Store {
    fn open(database: Option<&Path>) -> Result<Self> {
        match database {
            Some(path) => {
                info!("Using history database {}", path.display());
                let db = SqliteHistory::open(path)
                    .with_context(|| format!("Failed to open database {}", path.display()))?;
                Ok(Store::Sqlite(Arc::new(db)))
            }
            None => Ok(Store::Memory(Arc::new(MemoryHistory::new()))),
        }
    }

    fn history(&self) -> Arc<dyn HistoryStore> {
        match self {
            Store::Sqlite(db) => db.clone(),
            Store::Memory(db) => db.clone(),
        }
    }

    fn rules(&self) -> &dyn RuleStore {
        match self {
            Store::Sqlite(db) => &**db,
            Store::Memory(db) => &**db,
        }
    }
}

/// Ask on the terminal; anything but yes declines, as does a non-interactive stdin
fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }
    eprint!("{} (y/n) ", question);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn run_search(
    path_or_id: &str,
    database: Option<&Path>,
    concurrency: Option<usize>,
    force_overwrite: bool,
) -> Result<()> {
    let store = Store::open(database)?;
    let loader = RuleLoader::new(store.rules());
    let loaded = loader
        .load(path_or_id)
        .with_context(|| format!("Failed to load rule {}", path_or_id))?;

    if loaded.overwrites()
        && !force_overwrite
        && !confirm("There is a diff in the rule. Overwrite the stored rule?")?
    {
        warn!("Stored rule {} left unchanged; not running", loaded.rule.id);
        return Ok(());
    }
    loader.save(&loaded, chrono::Utc::now())?;
    let rule = loaded.rule;

    let registry = Registry::new(SourceSettings::default())?;
    let history = store.history();

    let mut config = PipelineConfig::default();
    if let Some(concurrency) = concurrency {
        config = config.with_concurrency(concurrency);
    }

    let pipeline = Pipeline::new(config, Arc::new(registry), history);
    let alert = pipeline
        .run(&rule)
        .await
        .with_context(|| format!("Rule {} failed", rule.id))?;

    println!("{}", serde_json::to_string_pretty(&alert)?);
    Ok(())
}

fn run_validate(rule_path: &Path) -> Result<()> {
    let rule = load_rule(rule_path)?;
    let registry = Registry::new(SourceSettings::default())?;
    registry
        .check(&rule)
        .with_context(|| format!("Rule {} is not runnable", rule.id))?;

    println!(
        "Rule {} is valid: {} queries, {} enrichers, {} emitters",
        rule.id,
        rule.queries.len(),
        rule.enrichers.len(),
        rule.emitters.len()
    );
    Ok(())
}
