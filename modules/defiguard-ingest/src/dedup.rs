//! Item assembly and deduplication.
//!
//! Hard dedup is free: item identity is derived from the source URL, so the
//! same article always upserts into the same record. Soft dedup catches the
//! same incident reported by different sources: same protocol, published
//! within a few days, near-identical titles. The lower-severity record is
//! cross-referenced via `additional_data["duplicate_of"]`, never deleted.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Days, TimeZone, Utc};
use tracing::{debug, info, warn};

use defiguard_common::{
    item_id, ClassificationResult, IngestError, NormalizedCandidate, RiskAssessment,
    ThreatIntelItem,
};
use defiguard_store::{RecentQuery, ThreatStore};

use crate::heuristics;

/// Sources whose editorial process earns a verified flag on ingest.
const VERIFIED_SOURCES: &[&str] = &["rekt"];

const STORE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Assemble the persisted record from the pipeline stages' outputs.
pub fn build_item(
    candidate: &NormalizedCandidate,
    classification: &ClassificationResult,
    assessment: &RiskAssessment,
) -> ThreatIntelItem {
    let text = format!("{} {}", candidate.title, candidate.description);

    let mut additional_data = serde_json::Map::new();
    additional_data.insert(
        "classifier_confidence".to_string(),
        serde_json::json!(classification.confidence),
    );

    ThreatIntelItem {
        id: item_id(&candidate.source_url),
        title: candidate.title.clone(),
        description: candidate.description.clone(),
        protocol_name: classification.protocol_name.clone(),
        risk_level: assessment.risk_level,
        severity_score: Some(assessment.severity_score),
        source_url: candidate.source_url.clone(),
        source_name: candidate.source_name.clone(),
        published_date: candidate.published_date,
        scraped_date: candidate.scraped_at,
        amount_lost: classification.amount_lost,
        attack_type: classification.attack_type,
        blockchain: classification.blockchain.clone(),
        tags: heuristics::extract_tags(&text),
        is_verified: VERIFIED_SOURCES.contains(&candidate.source_name.as_str()),
        additional_data,
    }
}

/// Jaccard similarity over lowercase title tokens.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = title_tokens(a);
    let tokens_b = title_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct Deduplicator {
    similarity_threshold: f64,
    window_days: u64,
}

impl Deduplicator {
    pub fn new(similarity_threshold: f64, window_days: u64) -> Self {
        Self {
            similarity_threshold,
            window_days,
        }
    }

    /// Cross-reference against the store, then persist. The write is retried
    /// once before the error propagates.
    pub async fn resolve_and_store(
        &self,
        mut item: ThreatIntelItem,
        store: &dyn ThreatStore,
    ) -> Result<ThreatIntelItem, IngestError> {
        if let Some(twin) = self.find_soft_duplicate(&item, store).await? {
            let item_severity = item.severity_score.unwrap_or(0.0);
            let twin_severity = twin.severity_score.unwrap_or(0.0);

            if item_severity < twin_severity {
                info!(id = %item.id, of = %twin.id, "Cross-referencing as duplicate");
                item.additional_data.insert(
                    "duplicate_of".to_string(),
                    serde_json::json!(twin.id.to_string()),
                );
            } else if item_severity > twin_severity {
                info!(id = %twin.id, of = %item.id, "Cross-referencing stored twin as duplicate");
                let mut twin = twin;
                twin.additional_data.insert(
                    "duplicate_of".to_string(),
                    serde_json::json!(item.id.to_string()),
                );
                upsert_with_retry(store, twin).await?;
            }
            // Equal severity: keep both unmarked.
        }

        upsert_with_retry(store, item).await
    }

    /// Most similar stored item for the same protocol within the publication
    /// window, if any clears the similarity threshold.
    async fn find_soft_duplicate(
        &self,
        item: &ThreatIntelItem,
        store: &dyn ThreatStore,
    ) -> Result<Option<ThreatIntelItem>, IngestError> {
        let (Some(protocol), Some(published)) = (&item.protocol_name, item.published_date) else {
            return Ok(None);
        };

        let since = Utc
            .from_utc_datetime(
                &published
                    .checked_sub_days(Days::new(self.window_days))
                    .unwrap_or(published)
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default(),
            );
        let recent = store
            .query_recent(RecentQuery::new().protocol(protocol.clone()).since(since).limit(100))
            .await?;

        let mut best: Option<(f64, ThreatIntelItem)> = None;
        for other in recent {
            if other.id == item.id {
                continue;
            }
            let Some(other_published) = other.published_date else {
                continue;
            };
            let gap = (published - other_published).num_days().unsigned_abs();
            if gap > self.window_days {
                continue;
            }
            let similarity = title_similarity(&item.title, &other.title);
            if similarity < self.similarity_threshold {
                continue;
            }
            debug!(id = %other.id, similarity, "Soft duplicate candidate");
            if best.as_ref().map(|(s, _)| similarity > *s).unwrap_or(true) {
                best = Some((similarity, other));
            }
        }

        Ok(best.map(|(_, other)| other))
    }
}

async fn upsert_with_retry(
    store: &dyn ThreatStore,
    item: ThreatIntelItem,
) -> Result<ThreatIntelItem, IngestError> {
    match store.upsert(item.clone()).await {
        Ok(stored) => Ok(stored),
        Err(first) => {
            warn!(id = %item.id, error = %first, "Store write failed, retrying once");
            tokio::time::sleep(STORE_RETRY_DELAY).await;
            store.upsert(item).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use defiguard_common::{AttackType, RiskLevel};
    use defiguard_store::MemoryStore;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    fn item(url: &str, title: &str, published: (i32, u32, u32), severity: f64) -> ThreatIntelItem {
        ThreatIntelItem {
            id: item_id(url),
            title: title.to_string(),
            description: "description".to_string(),
            protocol_name: Some("Acme".to_string()),
            risk_level: RiskLevel::from_score(severity),
            severity_score: Some(severity),
            source_url: url.to_string(),
            source_name: "rekt".to_string(),
            published_date: NaiveDate::from_ymd_opt(published.0, published.1, published.2),
            scraped_date: Utc::now(),
            amount_lost: None,
            attack_type: Some(AttackType::FlashLoan),
            blockchain: None,
            tags: vec![],
            is_verified: false,
            additional_data: serde_json::Map::new(),
        }
    }

    #[test]
    fn similarity_of_identical_titles_is_one() {
        assert_eq!(title_similarity("Acme Drained", "acme drained!"), 1.0);
    }

    #[test]
    fn similarity_of_unrelated_titles_is_low() {
        let s = title_similarity("Acme Protocol Drained", "Quarterly market recap");
        assert!(s < 0.2, "similarity {s}");
    }

    #[tokio::test]
    async fn lower_severity_newcomer_is_cross_referenced() {
        let store = MemoryStore::new();
        let dedup = Deduplicator::new(0.6, 3);

        let original = item(
            "https://rekt.news/acme-rekt/",
            "Acme Protocol Drained For $12M",
            (2024, 3, 1),
            8.0,
        );
        store.upsert(original.clone()).await.unwrap();

        let echo = item(
            "https://www.chainalysis.com/blog/acme-hack/",
            "Acme Protocol Drained For $12M - Analysis",
            (2024, 3, 2),
            5.0,
        );
        let stored = dedup.resolve_and_store(echo, &store).await.unwrap();

        assert_eq!(
            stored.additional_data.get("duplicate_of"),
            Some(&serde_json::json!(original.id.to_string()))
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn higher_severity_newcomer_marks_the_stored_twin() {
        let store = MemoryStore::new();
        let dedup = Deduplicator::new(0.6, 3);

        let original = item(
            "https://www.chainalysis.com/blog/acme-hack/",
            "Acme Protocol Drained For $12M",
            (2024, 3, 1),
            5.0,
        );
        store.upsert(original.clone()).await.unwrap();

        let richer = item(
            "https://rekt.news/acme-rekt/",
            "Acme Protocol Drained For $12M - Update",
            (2024, 3, 2),
            8.0,
        );
        let stored = dedup.resolve_and_store(richer.clone(), &store).await.unwrap();

        assert!(!stored.additional_data.contains_key("duplicate_of"));
        let twin = store.get_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(
            twin.additional_data.get("duplicate_of"),
            Some(&serde_json::json!(richer.id.to_string()))
        );
    }

    #[tokio::test]
    async fn dissimilar_titles_are_not_linked() {
        let store = MemoryStore::new();
        let dedup = Deduplicator::new(0.6, 3);

        store
            .upsert(item(
                "https://rekt.news/acme-rekt/",
                "Acme Protocol Drained For $12M",
                (2024, 3, 1),
                8.0,
            ))
            .await
            .unwrap();

        let other = item(
            "https://www.chainalysis.com/blog/acme-q1/",
            "Acme Treasury Multisig Phishing Incident",
            (2024, 3, 2),
            5.0,
        );
        let stored = dedup.resolve_and_store(other, &store).await.unwrap();
        assert!(!stored.additional_data.contains_key("duplicate_of"));
    }

    #[tokio::test]
    async fn outside_the_window_is_not_linked() {
        let store = MemoryStore::new();
        let dedup = Deduplicator::new(0.6, 3);

        store
            .upsert(item(
                "https://rekt.news/acme-rekt/",
                "Acme Protocol Drained For $12M",
                (2024, 3, 1),
                8.0,
            ))
            .await
            .unwrap();

        let late = item(
            "https://www.chainalysis.com/blog/acme-retro/",
            "Acme Protocol Drained For $12M - Retrospective",
            (2024, 3, 10),
            5.0,
        );
        let stored = dedup.resolve_and_store(late, &store).await.unwrap();
        assert!(!stored.additional_data.contains_key("duplicate_of"));
    }

    /// Fails the first upsert, succeeds after.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl ThreatStore for FlakyStore {
        async fn upsert(&self, item: ThreatIntelItem) -> Result<ThreatIntelItem, IngestError> {
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(IngestError::StoreWriteFailed("connection reset".to_string()));
            }
            drop(left);
            self.inner.upsert(item).await
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<ThreatIntelItem>, IngestError> {
            self.inner.get_by_id(id).await
        }

        async fn query_recent(
            &self,
            query: RecentQuery,
        ) -> Result<Vec<ThreatIntelItem>, IngestError> {
            self.inner.query_recent(query).await
        }
    }

    #[tokio::test]
    async fn transient_store_failure_is_retried_once() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures_left: Mutex::new(1),
        };
        let dedup = Deduplicator::new(0.6, 3);

        let stored = dedup
            .resolve_and_store(
                item("https://rekt.news/acme-rekt/", "Acme Drained", (2024, 3, 1), 8.0),
                &store,
            )
            .await
            .unwrap();
        assert_eq!(stored.title, "Acme Drained");
    }

    #[tokio::test]
    async fn persistent_store_failure_propagates() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures_left: Mutex::new(2),
        };
        let dedup = Deduplicator::new(0.6, 3);

        let err = dedup
            .resolve_and_store(
                item("https://rekt.news/acme-rekt/", "Acme Drained", (2024, 3, 1), 8.0),
                &store,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::StoreWriteFailed(_)));
    }
}
