//! Source adapters. Each adapter knows one site or feed and yields
//! [`RawCandidate`]s; everything downstream of the adapter is source-agnostic.

pub mod chainalysis;
mod html;
pub mod rekt;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use defiguard_common::{Config, IngestError, RawCandidate};

use crate::fetcher::PageFetcher;

pub use chainalysis::ChainalysisFeed;
pub use rekt::RektNews;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source id used in CLI selection, summaries, and `source_name`.
    fn name(&self) -> &str;

    /// Fetch the source and return raw candidates in source order.
    ///
    /// An `Err` means the whole source is unavailable. Per-article failures
    /// are logged and skipped inside the adapter.
    async fn fetch_candidates(&self) -> Result<Vec<RawCandidate>, IngestError>;
}

/// All known adapters keyed by source id.
pub fn registry(
    config: &Config,
    fetcher: Arc<dyn PageFetcher>,
) -> HashMap<String, Arc<dyn SourceAdapter>> {
    let mut adapters: HashMap<String, Arc<dyn SourceAdapter>> = HashMap::new();

    let rekt = RektNews::new(fetcher.clone(), config.max_articles_per_source);
    adapters.insert(rekt.name().to_string(), Arc::new(rekt));

    let chainalysis = ChainalysisFeed::new(fetcher, config.max_articles_per_source);
    adapters.insert(chainalysis.name().to_string(), Arc::new(chainalysis));

    adapters
}
