//! Run orchestration: fans sources out concurrently, walks each source's
//! candidates in order through normalize → classify → score → dedup → store,
//! and rolls per-source counts into a [`RunSummary`].
//!
//! Failure isolation is the core contract here: one source failing, one
//! candidate being malformed, or one store write erroring never stops the
//! rest of the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use defiguard_store::ThreatStore;

use crate::adapters::SourceAdapter;
use crate::classifier::Classifier;
use crate::dedup::{build_item, Deduplicator};
use crate::{extractor, risk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every selected source completed.
    Success,
    /// At least one source completed, at least one failed.
    Partial,
    /// No source completed.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub fetched: u32,
    pub discarded: u32,
    pub relevant: u32,
    pub stored: u32,
    pub failed: u32,
    /// Set when the source as a whole was unavailable.
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceReport>,
}

impl RunSummary {
    pub fn total_stored(&self) -> u32 {
        self.sources.values().map(|r| r.stored).sum()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elapsed = (self.finished_at - self.started_at).num_seconds();
        writeln!(f, "Ingestion run: {} ({elapsed}s)", self.status)?;
        for (name, report) in &self.sources {
            match &report.error {
                Some(error) => writeln!(f, "  {name}: FAILED ({error})")?,
                None => writeln!(
                    f,
                    "  {name}: {} fetched, {} discarded, {} relevant, {} stored, {} failed",
                    report.fetched, report.discarded, report.relevant, report.stored, report.failed
                )?,
            }
        }
        write!(f, "Total stored: {}", self.total_stored())
    }
}

pub struct Orchestrator {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
    classifier: Arc<Classifier>,
    deduplicator: Arc<Deduplicator>,
    store: Arc<dyn ThreatStore>,
    classify_permits: Arc<Semaphore>,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        adapters: impl IntoIterator<Item = (String, Arc<dyn SourceAdapter>)>,
        classifier: Classifier,
        deduplicator: Deduplicator,
        store: Arc<dyn ThreatStore>,
        max_concurrent_classifications: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            adapters: adapters.into_iter().collect(),
            classifier: Arc::new(classifier),
            deduplicator: Arc::new(deduplicator),
            store,
            classify_permits: Arc::new(Semaphore::new(max_concurrent_classifications.max(1))),
            deadline,
        }
    }

    /// Run ingestion for the named sources, or every registered source when
    /// `sources` is empty. Always returns a summary; never an error.
    pub async fn run(&self, sources: &[String]) -> RunSummary {
        let started_at = Utc::now();

        let selected: Vec<String> = if sources.is_empty() {
            self.adapters.keys().cloned().collect()
        } else {
            sources.to_vec()
        };

        let mut reports: BTreeMap<String, SourceReport> = BTreeMap::new();
        let mut tasks = Vec::new();
        for name in selected {
            match self.adapters.get(&name) {
                Some(adapter) => tasks.push((name, adapter.clone())),
                None => {
                    warn!(source = name.as_str(), "Unknown source requested");
                    reports.insert(
                        name,
                        SourceReport {
                            error: Some("unknown source".to_string()),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        let concurrency = tasks.len().max(1);
        let mut results = stream::iter(tasks)
            .map(|(name, adapter)| async move {
                let report = match tokio::time::timeout(
                    self.deadline,
                    self.process_source(adapter.as_ref()),
                )
                .await
                {
                    Ok(report) => report,
                    Err(_) => {
                        error!(source = name.as_str(), "Source exceeded run deadline");
                        SourceReport {
                            error: Some("run deadline exceeded".to_string()),
                            ..Default::default()
                        }
                    }
                };
                (name, report)
            })
            .buffer_unordered(concurrency);

        while let Some((name, report)) = results.next().await {
            reports.insert(name, report);
        }

        let completed = reports.values().filter(|r| r.error.is_none()).count();
        let status = if reports.is_empty() || completed == 0 {
            RunStatus::Failed
        } else if completed == reports.len() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };

        RunSummary {
            status,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
        }
    }

    async fn process_source(&self, adapter: &dyn SourceAdapter) -> SourceReport {
        let name = adapter.name();
        let mut report = SourceReport::default();

        let candidates = match adapter.fetch_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(source = name, error = %e, "Source unavailable");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = candidates.len() as u32;
        info!(source = name, count = report.fetched, "Fetched candidates");

        // Candidates are processed in source order so a later article about
        // the same incident merges onto the earlier one deterministically.
        for raw in candidates {
            let candidate = match extractor::normalize(raw, Utc::now()) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(source = name, error = %e, "Discarding candidate");
                    report.discarded += 1;
                    continue;
                }
            };

            let classification = {
                let _permit = match self.classify_permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        report.failed += 1;
                        continue;
                    }
                };
                self.classifier.classify(&candidate).await
            };

            if !classification.is_relevant {
                report.discarded += 1;
                continue;
            }
            report.relevant += 1;

            let assessment = risk::assess(&classification);
            let item = build_item(&candidate, &classification, &assessment);

            match self
                .deduplicator
                .resolve_and_store(item, self.store.as_ref())
                .await
            {
                Ok(stored) => {
                    info!(
                        source = name,
                        id = %stored.id,
                        risk = %stored.risk_level,
                        title = stored.title.as_str(),
                        "Stored threat intel item"
                    );
                    report.stored += 1;
                }
                Err(e) => {
                    error!(source = name, error = %e, "Failed to store item");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use defiguard_common::{IngestError, RawCandidate};
    use defiguard_store::MemoryStore;

    struct StaticSource {
        name: &'static str,
        candidates: Vec<RawCandidate>,
    }

    #[async_trait]
    impl SourceAdapter for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_candidates(&self) -> Result<Vec<RawCandidate>, IngestError> {
            Ok(self.candidates.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl SourceAdapter for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_candidates(&self) -> Result<Vec<RawCandidate>, IngestError> {
            Err(IngestError::SourceUnavailable("HTTP 503".to_string()))
        }
    }

    fn incident(url: &str) -> RawCandidate {
        RawCandidate {
            source: "rekt".to_string(),
            title: "Aave Flash Loan Attack".to_string(),
            body: "Attackers drained $12 million from Aave pools on Ethereum.".to_string(),
            url: url.to_string(),
            published_hint: Some("2024-03-01".to_string()),
        }
    }

    fn irrelevant(url: &str) -> RawCandidate {
        RawCandidate {
            source: "rekt".to_string(),
            title: "Quarterly ecosystem recap".to_string(),
            body: "A look back at integrations and launches this quarter.".to_string(),
            url: url.to_string(),
            published_hint: None,
        }
    }

    fn orchestrator(
        sources: Vec<(String, Arc<dyn SourceAdapter>)>,
        store: Arc<dyn ThreatStore>,
    ) -> Orchestrator {
        Orchestrator::new(
            sources,
            Classifier::heuristic_only(0.4),
            Deduplicator::new(0.6, 3),
            store,
            2,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn relevant_candidates_are_stored() {
        let store = Arc::new(MemoryStore::new());
        let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![
                incident("https://rekt.news/aave-rekt/"),
                irrelevant("https://rekt.news/recap/"),
            ],
        });
        let orch = orchestrator(vec![("rekt".to_string(), source)], store.clone());

        let summary = orch.run(&[]).await;

        assert_eq!(summary.status, RunStatus::Success);
        let report = &summary.sources["rekt"];
        assert_eq!(report.fetched, 2);
        assert_eq!(report.relevant, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let good: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![incident("https://rekt.news/aave-rekt/")],
        });
        let bad: Arc<dyn SourceAdapter> = Arc::new(BrokenSource);
        let orch = orchestrator(
            vec![("rekt".to_string(), good), ("broken".to_string(), bad)],
            store.clone(),
        );

        let summary = orch.run(&[]).await;

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.sources["rekt"].stored, 1);
        assert!(summary.sources["broken"].error.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn all_sources_failing_fails_the_run() {
        let store = Arc::new(MemoryStore::new());
        let bad: Arc<dyn SourceAdapter> = Arc::new(BrokenSource);
        let orch = orchestrator(vec![("broken".to_string(), bad)], store);

        let summary = orch.run(&[]).await;
        assert_eq!(summary.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_source_is_reported_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let good: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![incident("https://rekt.news/aave-rekt/")],
        });
        let orch = orchestrator(vec![("rekt".to_string(), good)], store);

        let summary = orch
            .run(&["rekt".to_string(), "nosuch".to_string()])
            .await;

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(
            summary.sources["nosuch"].error.as_deref(),
            Some("unknown source")
        );
        assert_eq!(summary.sources["rekt"].stored, 1);
    }

    struct DownBackend;

    #[async_trait]
    impl crate::classifier::ClassifierBackend for DownBackend {
        async fn classify_text(
            &self,
            _title: &str,
            _description: &str,
        ) -> Result<defiguard_common::ClassificationResult, IngestError> {
            Err(IngestError::ClassificationUnavailable(
                "model overloaded".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn heuristic_fallback_still_stores_incidents() {
        let store = Arc::new(MemoryStore::new());
        let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![RawCandidate {
                source: "rekt".to_string(),
                title: "Euler exploit drains lending pools".to_string(),
                body: "An attacker exploited Euler for $197 million.".to_string(),
                url: "https://rekt.news/euler-rekt/".to_string(),
                published_hint: Some("2023-03-13".to_string()),
            }],
        });
        let orch = Orchestrator::new(
            vec![("rekt".to_string(), source)],
            Classifier::new(Some(Arc::new(DownBackend)), 0.4),
            Deduplicator::new(0.6, 3),
            store.clone(),
            2,
            Duration::from_secs(30),
        );

        let summary = orch.run(&[]).await;

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.sources["rekt"].stored, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn rerunning_the_same_source_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![incident("https://rekt.news/aave-rekt/")],
        });
        let orch = orchestrator(vec![("rekt".to_string(), source)], store.clone());

        orch.run(&[]).await;
        let second = orch.run(&[]).await;

        assert_eq!(second.sources["rekt"].stored, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_candidates_are_counted_discarded() {
        let store = Arc::new(MemoryStore::new());
        let mut bad = incident("not a url");
        bad.title = "  ".to_string();
        let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![bad, incident("https://rekt.news/aave-rekt/")],
        });
        let orch = orchestrator(vec![("rekt".to_string(), source)], store.clone());

        let summary = orch.run(&[]).await;

        let report = &summary.sources["rekt"];
        assert_eq!(report.discarded, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn summary_display_is_readable() {
        let store = Arc::new(MemoryStore::new());
        let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "rekt",
            candidates: vec![incident("https://rekt.news/aave-rekt/")],
        });
        let orch = orchestrator(vec![("rekt".to_string(), source)], store);

        let summary = orch.run(&[]).await;
        let rendered = summary.to_string();

        assert!(rendered.contains("Ingestion run: success"));
        assert!(rendered.contains("rekt: 1 fetched"));
        assert!(rendered.contains("Total stored: 1"));
    }
}
