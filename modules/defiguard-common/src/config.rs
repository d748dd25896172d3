use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic key for the classifier backend. When absent the classifier
    /// runs heuristic-only.
    pub anthropic_api_key: Option<String>,
    pub claude_model: String,

    // Scraping
    pub source_request_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub max_articles_per_source: usize,

    // Concurrency caps
    pub max_concurrent_fetches: usize,
    pub max_concurrent_classifications: usize,

    // Run control
    pub run_deadline_secs: u64,

    // Classification
    pub min_model_confidence: f64,

    // Soft dedup
    pub soft_dedup_similarity: f64,
    pub soft_dedup_window_days: i64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except malformed numbers.
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            source_request_delay_ms: parsed_env("SOURCE_REQUEST_DELAY_MS", 1_000),
            fetch_timeout_secs: parsed_env("FETCH_TIMEOUT_SECS", 30),
            max_articles_per_source: parsed_env("MAX_ARTICLES_PER_SOURCE", 20),
            max_concurrent_fetches: parsed_env("MAX_CONCURRENT_FETCHES", 4),
            max_concurrent_classifications: parsed_env("MAX_CONCURRENT_CLASSIFICATIONS", 2),
            run_deadline_secs: parsed_env("RUN_DEADLINE_SECS", 300),
            min_model_confidence: parsed_env("MIN_MODEL_CONFIDENCE", 0.4),
            soft_dedup_similarity: parsed_env("SOFT_DEDUP_SIMILARITY", 0.6),
            soft_dedup_window_days: parsed_env("SOFT_DEDUP_WINDOW_DAYS", 3),
        }
    }

    /// Log the effective configuration without leaking the API key.
    pub fn log_redacted(&self) {
        tracing::info!(
            model = self.claude_model.as_str(),
            classifier_backend = self.anthropic_api_key.is_some(),
            max_fetches = self.max_concurrent_fetches,
            max_classifications = self.max_concurrent_classifications,
            deadline_secs = self.run_deadline_secs,
            "Configuration loaded"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            claude_model: "claude-haiku-4-5-20251001".to_string(),
            source_request_delay_ms: 1_000,
            fetch_timeout_secs: 30,
            max_articles_per_source: 20,
            max_concurrent_fetches: 4,
            max_concurrent_classifications: 2,
            run_deadline_secs: 300,
            min_model_confidence: 0.4,
            soft_dedup_similarity: 0.6,
            soft_dedup_window_days: 3,
        }
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {v:?}")),
        Err(_) => default,
    }
}
