//! Record store boundary for the ingestion pipeline.
//!
//! The pipeline only ever needs three operations: `upsert` (idempotent on the
//! URL-derived id), `get_by_id`, and `query_recent` (used by the soft-dedup
//! time-window check and by external query surfaces). Durable backends plug in
//! behind [`ThreatStore`]; [`MemoryStore`] is the reference implementation.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use defiguard_common::{IngestError, RiskLevel, ThreatIntelItem};

pub use memory::MemoryStore;

/// Filters for [`ThreatStore::query_recent`].
#[derive(Debug, Clone, Default)]
pub struct RecentQuery {
    /// Case-insensitive exact protocol match.
    pub protocol: Option<String>,
    pub risk_level: Option<RiskLevel>,
    /// Keep items whose published or scraped date is at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl RecentQuery {
    pub fn new() -> Self {
        Self {
            limit: 50,
            ..Default::default()
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Durable keyed record storage with upsert-by-identity semantics.
///
/// `upsert` must be safe under concurrent calls with different ids and must
/// serialize concurrent upserts to the same id so merges are never lost.
#[async_trait]
pub trait ThreatStore: Send + Sync {
    /// Insert or merge-by-id. Returns the stored (possibly merged) item.
    async fn upsert(&self, item: ThreatIntelItem) -> Result<ThreatIntelItem, IngestError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ThreatIntelItem>, IngestError>;

    /// Items ordered by severity then recency, newest-first within a score.
    async fn query_recent(&self, query: RecentQuery)
        -> Result<Vec<ThreatIntelItem>, IngestError>;
}
