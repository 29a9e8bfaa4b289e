//! `ragops`: route, search and evaluate queries against a local text corpus.
mod corpus;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use ragops_cache::{MemoryCacheBackend, SemanticCache};
use ragops_core::config::{resolve_with_base, Config, Settings};
use ragops_core::domain::Domain;
use ragops_drift::{DriftAlerter, DriftMonitor, TracingAlertSink};
use ragops_embed::default_provider;
use ragops_hybrid::{HybridRetriever, RetrievedChunk};
use ragops_pipeline::telemetry::{STAGE_BUCKETS, STAGE_DURATION_METRIC};
use ragops_pipeline::{EvaluationSource, QueryPipeline};
use ragops_route::ComplexityRouter;
use ragops_vector::MemoryVectorIndex;

#[derive(Parser, Debug)]
#[command(name = "ragops", version, about = "Request-time decisions for grounded question answering")]
struct Cli {
    /// Directory holding config.toml (defaults to the current directory)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the routing decision for a query
    Route {
        query: String,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Ingest a directory of .txt files and run a fused search
    Search {
        query: String,
        /// Corpus directory (defaults to data.raw_txt_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(short, long)]
        alpha: Option<f32>,
    },
    /// Ingest a directory and evaluate a question up to generation
    Ask {
        question: String,
        /// Corpus directory (defaults to data.raw_txt_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Synthesize two query windows and run drift detection on them
    DriftDemo {
        #[arg(short, long, default_value = "hr")]
        domain: String,
        /// Word-count range of the current window, e.g. 15-20
        #[arg(long, default_value = "15-20")]
        current: String,
        #[arg(long, default_value = "2-4")]
        previous: String,
        #[arg(long, default_value_t = 40)]
        samples: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let environment = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let handle = PrometheusBuilder::new()
        .add_global_label("environment", environment)
        .set_buckets_for_metric(Matcher::Full(STAGE_DURATION_METRIC.to_string()), STAGE_BUCKETS)?
        .install_recorder()?;
    Ok(handle)
}

fn load_settings(config_dir: Option<&Path>) -> anyhow::Result<Settings> {
    let config = match config_dir {
        Some(dir) => Config::load_from(dir),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    config.settings()
}

/// An explicit directory resolves against the working directory; the
/// configured `data.raw_txt_dir` resolves against the config directory.
fn corpus_root(settings: &Settings, dir: Option<&Path>, config_dir: Option<&Path>, cwd: &Path) -> PathBuf {
    match dir {
        Some(dir) => resolve_with_base(cwd, dir.to_string_lossy()),
        None => {
            let base = config_dir.map(|d| resolve_with_base(cwd, d.to_string_lossy())).unwrap_or_else(|| cwd.to_path_buf());
            resolve_with_base(&base, &settings.data.raw_txt_dir)
        }
    }
}

async fn build_retriever(settings: &Settings, root: &Path) -> anyhow::Result<Arc<HybridRetriever<MemoryVectorIndex>>> {
    let embedder = default_provider(&settings.embedding);
    let retriever = HybridRetriever::new(
        MemoryVectorIndex::new(settings.embedding.dimension),
        Arc::clone(&embedder),
        settings.retrieval.clone(),
        settings.embedding.timeout(),
    )?;
    anyhow::ensure!(root.is_dir(), "corpus directory {} does not exist", root.display());
    let paragraphs = corpus::read_paragraphs(root)?;
    let chunks = corpus::embed_paragraphs(paragraphs, embedder.as_ref()).await?;
    retriever.add_chunks(chunks).await?;
    Ok(Arc::new(retriever))
}

fn source_json(results: &[RetrievedChunk]) -> serde_json::Value {
    results
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "text": r.text,
                "metadata": r.metadata,
                "scores": r.scores,
            })
        })
        .collect()
}

fn parse_range(raw: &str) -> anyhow::Result<(usize, usize)> {
    let (lo, hi) = raw.split_once('-').ok_or_else(|| anyhow::anyhow!("expected a range like 2-4, got '{raw}'"))?;
    let (lo, hi) = (lo.trim().parse::<usize>()?, hi.trim().parse::<usize>()?);
    anyhow::ensure!(lo >= 1 && lo <= hi, "invalid word-count range '{raw}'");
    Ok((lo, hi))
}

async fn drift_demo(settings: &Settings, domain: &str, current: (usize, usize), previous: (usize, usize), samples: usize, seed: u64) -> anyhow::Result<()> {
    let domain = Domain::parse(domain)?;
    let monitor = Arc::new(DriftMonitor::new(settings.drift.clone()));
    let mut rng = StdRng::seed_from_u64(seed);
    let window = Duration::days(i64::from(settings.drift.window_days));
    let now = Utc::now();
    let spacing = window / i32::try_from(samples.max(1) + 1)?;
    for i in 0..samples {
        let offset = spacing * i32::try_from(i + 1)?;
        let words = rng.gen_range(current.0..=current.1);
        monitor.record_at(&domain, &vec!["word"; words].join(" "), now - offset);
        let words = rng.gen_range(previous.0..=previous.1);
        monitor.record_at(&domain, &vec!["word"; words].join(" "), now - window - offset);
    }

    let mut drift_settings = settings.drift.clone();
    drift_settings.alert_topic.get_or_insert_with(|| "ragops-drift".to_string());
    let alerter = DriftAlerter::new(monitor, Some(Arc::new(TracingAlertSink)), &drift_settings);
    let report = alerter.check(&domain).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let metrics = install_metrics()?;
    let settings = load_settings(cli.config_dir.as_deref())?;
    let cwd = std::env::current_dir()?;

    match cli.command {
        Command::Route { query, domain } => {
            let router = ComplexityRouter::from_settings(&settings.routing)?;
            let domain = Domain::from_optional(domain.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&router.classify(&query, &domain))?);
        }
        Command::Search { query, dir, domain, top_k, alpha } => {
            let root = corpus_root(&settings, dir.as_deref(), cli.config_dir.as_deref(), &cwd);
            let retriever = build_retriever(&settings, &root).await?;
            let domain = domain.as_deref().map(Domain::parse).transpose()?;
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            let alpha = alpha.unwrap_or(settings.retrieval.alpha);
            let results = retriever.search(&query, top_k, domain.as_ref(), alpha).await?;
            println!("{}", serde_json::to_string_pretty(&source_json(&results))?);
        }
        Command::Ask { question, dir, domain } => {
            let root = corpus_root(&settings, dir.as_deref(), cli.config_dir.as_deref(), &cwd);
            let retriever = build_retriever(&settings, &root).await?;
            let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), settings.cache.clone(), settings.embedding.dimension);
            let drift = DriftMonitor::new(settings.drift.clone());
            let pipeline = QueryPipeline::new(retriever, Arc::new(cache), Arc::new(drift), settings.clone())?;
            let evaluation = pipeline.evaluate_query(&question, domain.as_deref()).await?;
            let out = match &evaluation.source {
                EvaluationSource::Cached { response, similarity } => {
                    json!({ "domain": evaluation.domain, "cached": true, "similarity": similarity, "response": response })
                }
                EvaluationSource::Pending { routing, retrieval } => {
                    json!({ "domain": evaluation.domain, "cached": false, "routing": routing, "sources": source_json(retrieval) })
                }
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::DriftDemo { domain, current, previous, samples, seed } => {
            drift_demo(&settings, &domain, parse_range(&current)?, parse_range(&previous)?, samples, seed).await?;
        }
    }
    if cli.metrics {
        eprintln!("{}", metrics.render());
    }
    Ok(())
}
