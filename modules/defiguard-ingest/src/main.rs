use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use defiguard_common::Config;
use defiguard_ingest::adapters;
use defiguard_ingest::classifier::{Classifier, ClassifierBackend, ClaudeBackend};
use defiguard_ingest::dedup::Deduplicator;
use defiguard_ingest::fetcher::HttpFetcher;
use defiguard_ingest::{Orchestrator, RunStatus};
use defiguard_store::MemoryStore;

#[derive(Parser)]
#[command(name = "defiguard-ingest", about = "Ingest DeFi security incidents into the threat store")]
struct Args {
    /// Comma-separated source ids to ingest. Default: all registered sources.
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Override the per-source run deadline in seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let fetch_permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
    let fetcher = Arc::new(HttpFetcher::new(
        fetch_permits,
        Duration::from_millis(config.source_request_delay_ms),
        Duration::from_secs(config.fetch_timeout_secs),
    )?);

    let backend: Option<Arc<dyn ClassifierBackend>> = config.anthropic_api_key.as_ref().map(|key| {
        Arc::new(ClaudeBackend::new(Claude::new(key, &config.claude_model)))
            as Arc<dyn ClassifierBackend>
    });
    if backend.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set, classifying with heuristics only");
    }

    let orchestrator = Orchestrator::new(
        adapters::registry(&config, fetcher),
        Classifier::new(backend, config.min_model_confidence),
        Deduplicator::new(
            config.soft_dedup_similarity,
            config.soft_dedup_window_days.max(0) as u64,
        ),
        Arc::new(MemoryStore::new()),
        config.max_concurrent_classifications,
        Duration::from_secs(args.deadline_secs.unwrap_or(config.run_deadline_secs)),
    );

    let summary = orchestrator.run(&args.sources).await;
    println!("{summary}");

    if summary.status == RunStatus::Failed {
        anyhow::bail!("ingestion run failed: no source completed");
    }
    Ok(())
}
