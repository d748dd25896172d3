use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Site-level failure. Non-fatal to the run; the orchestrator treats it
    /// as zero candidates from this source.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Candidate-level failure. Dropped silently and counted in the summary.
    #[error("Discarded malformed candidate: {0}")]
    DiscardedMalformed(String),

    /// The external classifier backend errored or timed out. Triggers the
    /// heuristic fallback.
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// A single item failed to persist. Retried once, then counted as failed;
    /// a later run retries naturally since re-scraping is idempotent.
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
