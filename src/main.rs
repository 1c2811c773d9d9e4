//! curate - discover, score and publish a ranked repository list

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use curation_core::categorize::Categorizer;
use curation_core::config::CuratorConfig;
use curation_core::discovery::GitHubFetcher;
use curation_core::merge::MergeOptions;
use curation_core::pipeline::{recategorize, run_cycle};
use curation_core::ratelimit::{FetchContext, ResponseCache};
use curation_core::store::{self, badges::DEFAULT_LABEL, ListStore};

#[derive(Parser, Debug)]
#[command(name = "curate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `curation_core=debug`
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one discovery cycle and update the ranked list
    Scan(ScanArgs),

    /// Re-apply category rules to existing ranked lists
    Recategorize {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write Shields.io endpoint badges for a ranked list
    Badges {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "docs")]
        out: PathBuf,

        #[arg(long, default_value = DEFAULT_LABEL)]
        label: String,
    },

    /// Copy the newest dated result over the latest pointer
    Aggregate {
        #[arg(long, default_value = "result")]
        dir: PathBuf,

        #[arg(long)]
        prefix: String,

        #[arg(long, default_value = "Curated Repositories")]
        title: String,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Stop after this many unique repositories
    #[arg(long)]
    limit: Option<usize>,

    /// Validate configuration only
    #[arg(long, conflicts_with = "live")]
    dry_run: bool,

    /// Override `dry_run: true` in the config file
    #[arg(long)]
    live: bool,

    /// Override `output.file`
    #[arg(long)]
    output: Option<String>,

    /// Start from an empty list when the previous one is unreadable
    #[arg(long)]
    recover: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Scan(args) => scan(args).await,
        Commands::Recategorize { config, files } => recategorize_files(&config, &files),
        Commands::Badges { input, out, label } => {
            let document = store::read_document(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let written = store::write_badges(&document, &out, &label)
                .with_context(|| format!("writing badges to {}", out.display()))?;
            info!(badges = written, out = %out.display(), "wrote badges");
            Ok(())
        }
        Commands::Aggregate { dir, prefix, title } => {
            let report = store::aggregate(&dir, &prefix, &title)
                .with_context(|| format!("aggregating {}", dir.display()))?;
            if report.json_source.is_none() && report.markdown_source.is_none() {
                warn!(dir = %dir.display(), %prefix, "no dated results found, wrote empty list");
            }
            Ok(())
        }
    }
}

async fn scan(args: ScanArgs) -> Result<()> {
    let mut config = CuratorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(limit) = args.limit {
        config.search.limit = Some(limit);
    }
    if let Some(output) = args.output {
        config.output.file = output;
    }
    config.validate().context("validating configuration")?;

    let dry_run = !args.live && (args.dry_run || config.dry_run);
    if dry_run {
        info!(
            query = %config.search.query,
            topics = config.search.topics.len(),
            categories = config.category_definitions().len(),
            "dry run: configuration is valid, nothing fetched"
        );
        return Ok(());
    }

    let cache = match &config.cache.path {
        Some(path) if path.exists() => match ResponseCache::load(path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "response cache unreadable, starting cold");
                ResponseCache::new()
            }
        },
        _ => ResponseCache::new(),
    };
    let cache = Arc::new(cache);
    let ctx = FetchContext::with_cache(config.search.max_quota_wait(), Arc::clone(&cache));
    let fetcher = GitHubFetcher::new(config.auth.token.clone()).context("building HTTP client")?;
    if config.auth.token.is_none() {
        warn!("no GITHUB_TOKEN set, search quota will be low");
    }

    let now = Utc::now();
    let list_store =
        ListStore::from_config(&config.output, now.date_naive()).context("resolving output paths")?;
    let previous = list_store
        .load_previous(args.recover)
        .context("loading previous ranked list (use --recover to start empty)")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current page");
            on_signal.cancel();
        }
    });

    let output = run_cycle(&config, &fetcher, &ctx, &previous, &cancel, now).await?;
    if output.is_partial() {
        warn!(warnings = output.warnings.len(), "discovery was partial");
    }

    let rewritten = list_store
        .persist(&output.document, &output.summary)
        .context("writing ranked list")?;
    if let Some(path) = &config.cache.path {
        if let Err(e) = cache.save(path) {
            warn!(path = %path.display(), error = %e, "could not save response cache");
        }
    }

    info!(
        discovered = output.discovered,
        added = output.summary.added.len(),
        removed = output.summary.removed.len(),
        changed = output.summary.changed.len(),
        rewritten,
        "scan finished"
    );
    println!("{}", serde_json::to_string_pretty(&output.summary)?);
    Ok(())
}

fn recategorize_files(config_path: &Path, files: &[PathBuf]) -> Result<()> {
    let config = CuratorConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let categorizer = Categorizer::from_config(&config).context("compiling category rules")?;

    for file in files {
        if file.extension().and_then(|e| e.to_str()) != Some("json") {
            bail!("{} is not a JSON ranked list", file.display());
        }
        let document =
            store::read_document(file).with_context(|| format!("reading {}", file.display()))?;
        let options = MergeOptions::from_config(&config, Utc::now());
        let outcome = recategorize(&document, &categorizer, &options)?;
        if outcome.summary.is_noop() {
            info!(file = %file.display(), "categories unchanged");
            continue;
        }

        store::write_atomic(file, &serde_json::to_vec_pretty(&outcome.document)?)?;
        let markdown = store::render_markdown(&outcome.document, &config.output.title);
        store::write_atomic(&file.with_extension("md"), markdown.as_bytes())?;
        info!(
            file = %file.display(),
            moved = outcome.summary.category_moves().count(),
            "recategorized"
        );
    }
    Ok(())
}
