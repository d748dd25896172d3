//! In-memory reference store. A single mutex over the map means every upsert
//! to a given id observes the previous write — the merge in
//! `ThreatIntelItem::merged_with` runs entirely inside the critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use defiguard_common::{IngestError, ThreatIntelItem};

use crate::{RecentQuery, ThreatStore};

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<Uuid, ThreatIntelItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl ThreatStore for MemoryStore {
    async fn upsert(&self, item: ThreatIntelItem) -> Result<ThreatIntelItem, IngestError> {
        let mut items = self.items.lock().await;
        let stored = match items.get(&item.id) {
            Some(existing) => {
                let merged = existing.merged_with(&item, Utc::now());
                debug!(id = %item.id, title = item.title.as_str(), "Merged existing item");
                merged
            }
            None => item,
        };
        items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ThreatIntelItem>, IngestError> {
        Ok(self.items.lock().await.get(&id).cloned())
    }

    async fn query_recent(
        &self,
        query: RecentQuery,
    ) -> Result<Vec<ThreatIntelItem>, IngestError> {
        let items = self.items.lock().await;

        let mut matches: Vec<ThreatIntelItem> = items
            .values()
            .filter(|item| {
                if let Some(ref protocol) = query.protocol {
                    match &item.protocol_name {
                        Some(p) if p.eq_ignore_ascii_case(protocol) => {}
                        _ => return false,
                    }
                }
                if let Some(level) = query.risk_level {
                    if item.risk_level != level {
                        return false;
                    }
                }
                if let Some(since) = query.since {
                    let published_ok = item
                        .published_date
                        .map(|d| d >= since.date_naive())
                        .unwrap_or(false);
                    if !published_ok && item.scraped_date < since {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        // Severity first, then publication recency, then scrape recency.
        matches.sort_by(|a, b| {
            b.severity_score
                .unwrap_or(0.0)
                .partial_cmp(&a.severity_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.published_date.cmp(&a.published_date))
                .then(b.scraped_date.cmp(&a.scraped_date))
        });

        let limit = if query.limit == 0 { 50 } else { query.limit };
        Ok(matches
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect())
    }
}
