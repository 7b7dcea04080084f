//! race-agents CLI.
//!
//! ```bash
//! # Load extracted fragments into the corpus
//! race-agents ingest --race mo-senate-2024 fragments.jsonl
//!
//! # Summarize a race (providers enabled by whichever API keys are set)
//! ANTHROPIC_API_KEY=... race-agents run race.json
//!
//! # Show the resolved configuration without calling anyone
//! race-agents check-config
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use race_agents::config::{CorpusBackend, ResolvedConfig, RunMode};
use race_agents::{
    JsonFilePublisher, Orchestrator, ProviderPool, RaceSpec, SummarizationEngine,
};
use triangulation::{
    ContentFragment, CorpusStore, HashingEmbedder, IngestOutcome, JsonlCorpusStore, MemoryCorpusStore,
    SharedCorpusStore, UsageTracker,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (overrides RACE_AGENTS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest ContentFragment JSON lines into the corpus for one race
    Ingest {
        /// Race the fragments belong to
        #[arg(long)]
        race: String,
        /// JSONL file of fragments
        input: PathBuf,
    },
    /// Summarize a race described by a JSON race spec
    Run {
        /// Race spec JSON file
        race: PathBuf,
        /// Override the output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Validate configuration and list enabled providers
    CheckConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration errors are the only fatal startup condition.
    let resolved = ResolvedConfig::from_process_env(args.config.as_deref())
        .context("Invalid configuration")?;
    init_tracing(resolved.config.mode);
    // Loader logs fire before the subscriber exists; restate the outcome.
    let enabled: Vec<&str> = resolved.providers.iter().map(|p| p.id.as_str()).collect();
    info!(mode = %resolved.config.mode, providers = ?enabled, "Configuration resolved");

    match args.command {
        Command::Ingest { race, input } => ingest(&resolved, &race, &input).await,
        Command::Run { race, output_dir } => run(&resolved, &race, output_dir).await,
        Command::CheckConfig => check_config(&resolved),
    }
}

fn init_tracing(mode: RunMode) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    match mode {
        RunMode::Cloud => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        RunMode::Local => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn open_store(resolved: &ResolvedConfig) -> Result<SharedCorpusStore> {
    let corpus = &resolved.config.corpus;
    let embedder = Arc::new(HashingEmbedder::new(corpus.embedding_dimensions));
    let store = match corpus.backend {
        CorpusBackend::Memory => MemoryCorpusStore::new(embedder).shared(),
        CorpusBackend::Jsonl => JsonlCorpusStore::open(&corpus.data_dir, embedder)
            .await
            .with_context(|| format!("Failed to open corpus at {}", corpus.data_dir.display()))?
            .shared(),
    };
    Ok(store)
}

async fn ingest(resolved: &ResolvedConfig, race_id: &str, input: &Path) -> Result<()> {
    let store = open_store(resolved).await?;
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let (mut inserted, mut duplicate, mut skipped) = (0usize, 0usize, 0usize);
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fragment: ContentFragment = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed fragment");
                skipped += 1;
                continue;
            }
        };
        match store
            .ingest(race_id, fragment)
            .await
            .context("Corpus ingestion failed")?
        {
            IngestOutcome::Inserted => inserted += 1,
            IngestOutcome::Duplicate => duplicate += 1,
        }
    }

    let total = store.fragment_count(race_id).await?;
    info!(race_id, inserted, duplicate, skipped, total, "Ingest complete");
    println!(
        "{}",
        serde_json::json!({
            "race_id": race_id,
            "inserted": inserted,
            "duplicate": duplicate,
            "skipped": skipped,
            "total": total,
        })
    );
    Ok(())
}

async fn run(resolved: &ResolvedConfig, race_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let race = RaceSpec::load(race_path)?;
    let config = &resolved.config;

    let store = open_store(resolved).await?;
    let pool = ProviderPool::from_resolved(&resolved.providers, config.engine.tier)
        .context("Failed to build HTTP client")?
        .shared();
    let engine = SummarizationEngine::from_config(pool, &config.engine, UsageTracker::shared());
    let publisher = JsonFilePublisher::new(output_dir.unwrap_or_else(|| config.output.dir.clone()));
    let orchestrator = Orchestrator::new(config, store, engine).with_publisher(Arc::new(publisher));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing with remaining units UNKNOWN");
            ctrl_c.cancel();
        }
    });

    let outcome = orchestrator.run(&race, &cancel).await?;
    if let Some(location) = &outcome.published {
        info!(race_id = %race.race_id, location, "Race summary written");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    Ok(())
}

fn check_config(resolved: &ResolvedConfig) -> Result<()> {
    let config = &resolved.config;
    let providers: Vec<_> = resolved
        .providers
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "kind": p.config.kind,
                "model": p.model,
                "base_url": p.base_url,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "mode": config.mode,
            "tier": config.engine.tier,
            "corpus": config.corpus,
            "retrieval": config.retrieval,
            "providers": providers,
        }))?
    );
    if resolved.providers.is_empty() {
        warn!("No providers enabled; runs will produce UNKNOWN for every unit");
    }
    Ok(())
}
