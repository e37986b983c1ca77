use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use privacy_core::{
    AppRecord, ComplianceEvaluator, EngineConfig, EvaluationCoordinator, Fingerprint,
    InMemoryDecisionCache, PolicyCatalog, PolicyTree, SystemClock, UserPrivacyPreference,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "privacy-cli", version = "0.1.0")]
struct Cli {
    /// Engine configuration (logging filter, cache backend, taxonomy)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a taxonomy file and print its nested-set intervals
    CheckTaxonomy {
        #[arg(long)]
        taxonomy: PathBuf,
    },
    /// Print the decision fingerprint of an app/preference pair
    Fingerprint {
        /// App record JSON file
        #[arg(long)]
        app: PathBuf,
        /// User preference JSON file
        #[arg(long)]
        preference: PathBuf,
    },
    /// Run one decision through an in-memory coordinator
    Evaluate {
        #[arg(long)]
        taxonomy: PathBuf,
        #[arg(long)]
        app: PathBuf,
        #[arg(long)]
        preference: PathBuf,
        /// Print the per-check breakdown
        #[arg(long)]
        explain: bool,
    },
    /// Repeat a decision against the configured cache and report hit/miss counts
    Replay {
        /// Overrides the taxonomy named in the config
        #[arg(long)]
        taxonomy: Option<PathBuf>,
        #[arg(long)]
        app: PathBuf,
        #[arg(long)]
        preference: PathBuf,
        #[arg(long, default_value_t = 3)]
        times: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckTaxonomy { taxonomy } => check_taxonomy(&taxonomy),
        Commands::Fingerprint { app, preference } => {
            let app: AppRecord = read_json(&app)?;
            let preference: UserPrivacyPreference = read_json(&preference)?;
            println!("{}", Fingerprint::compute(&app, &preference)?);
            Ok(())
        }
        Commands::Evaluate {
            taxonomy,
            app,
            preference,
            explain,
        } => evaluate(&taxonomy, &app, &preference, explain).await,
        Commands::Replay {
            taxonomy,
            app,
            preference,
            times,
        } => replay(&config, taxonomy, &app, &preference, times).await,
    }
}

fn check_taxonomy(path: &Path) -> Result<()> {
    let catalog = PolicyCatalog::load(path)
        .with_context(|| format!("invalid taxonomy {}", path.display()))?;
    print_tree(catalog.attributes())?;
    print_tree(catalog.purposes())?;
    info!(
        attributes = catalog.attributes().len(),
        purposes = catalog.purposes().len(),
        "Taxonomy is valid"
    );
    Ok(())
}

fn print_tree(tree: &PolicyTree) -> Result<()> {
    println!("{} taxonomy ({} nodes):", tree.taxonomy(), tree.len());
    for node in tree.nodes() {
        let depth = tree.ancestors(node.id)?.len();
        println!(
            "  {}{} [{}] ({}, {})",
            "  ".repeat(depth),
            node.name,
            node.id,
            node.left,
            node.right
        );
    }
    Ok(())
}

async fn evaluate(taxonomy: &Path, app: &Path, preference: &Path, explain: bool) -> Result<()> {
    let catalog = Arc::new(PolicyCatalog::load(taxonomy)?);
    let app: AppRecord = read_json(app)?;
    let preference: UserPrivacyPreference = read_json(preference)?;

    let coordinator =
        EvaluationCoordinator::new(catalog.clone(), Arc::new(InMemoryDecisionCache::new()));
    let outcome = coordinator
        .decide(&app, preference.user_id, &preference)
        .await?;
    println!("{}", outcome.decision);

    if explain {
        let report = ComplianceEvaluator::new(catalog).explain(&app, &preference)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

async fn replay(
    config: &EngineConfig,
    taxonomy: Option<PathBuf>,
    app: &Path,
    preference: &Path,
    times: usize,
) -> Result<()> {
    if times == 0 {
        bail!("--times must be at least 1");
    }

    let catalog = match taxonomy {
        Some(path) => PolicyCatalog::load(path)?,
        None => config
            .load_catalog()
            .context("pass --taxonomy or set `taxonomy` in the config")?,
    };
    let coordinator = config.build_coordinator(Arc::new(catalog), Arc::new(SystemClock))?;
    let app: AppRecord = read_json(app)?;
    let preference: UserPrivacyPreference = read_json(preference)?;

    for round in 1..=times {
        let outcome = coordinator
            .decide(&app, preference.user_id, &preference)
            .await?;
        debug!(round, cache_hit = outcome.cache_hit, "Replayed decision");
        println!(
            "#{:<3} {:<5} {} {}",
            round,
            outcome.decision,
            if outcome.cache_hit { "hit " } else { "miss" },
            outcome.fingerprint.short()
        );
    }

    let stats = coordinator.stats();
    println!(
        "decisions={} hits={} misses={} hit_ratio={:.2}",
        stats.decisions,
        stats.cache_hits,
        stats.cache_misses,
        stats.hit_ratio()
    );
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid JSON in {}", path.display()))
}
