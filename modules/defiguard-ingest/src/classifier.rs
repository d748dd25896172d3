//! Candidate classification: model-backed when a backend is configured,
//! keyword heuristics otherwise. A backend error or a low-confidence answer
//! falls back to the heuristics, so classification itself never fails a
//! candidate.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::Claude;
use defiguard_common::{AttackType, ClassificationResult, IngestError, NormalizedCandidate};

use crate::heuristics;

const SYSTEM_PROMPT: &str = "You are a DeFi security analyst. Given an article title and body, \
decide whether it reports a concrete security incident affecting a DeFi protocol: a hack, \
exploit, rug pull, exit scam, or similar loss event. General market news, product launches, \
and opinion pieces are not relevant. When relevant, extract the affected protocol's name, \
the attack vector, the blockchain, and the total USD amount lost if stated.";

#[derive(Debug, Deserialize, JsonSchema)]
struct IncidentClassification {
    /// True only for concrete security incidents affecting a named protocol.
    is_relevant: bool,
    /// Name of the affected protocol, e.g. "Aave".
    protocol_name: Option<String>,
    /// One of: flash_loan, rug_pull, oracle_manipulation, exit_scam,
    /// reentrancy, bridge_exploit, governance_attack, other.
    attack_type: Option<String>,
    /// Blockchain the incident happened on, e.g. "Ethereum".
    blockchain: Option<String>,
    /// Total loss in USD, if the article states one.
    amount_lost_usd: Option<f64>,
    /// Confidence in this classification, 0.0 to 1.0.
    confidence: f64,
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify_text(
        &self,
        title: &str,
        description: &str,
    ) -> Result<ClassificationResult, IngestError>;
}

pub struct ClaudeBackend {
    claude: Claude,
}

impl ClaudeBackend {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }
}

#[async_trait]
impl ClassifierBackend for ClaudeBackend {
    async fn classify_text(
        &self,
        title: &str,
        description: &str,
    ) -> Result<ClassificationResult, IngestError> {
        let user_prompt = format!("Title: {title}\n\nBody: {description}");
        let raw: IncidentClassification = self
            .claude
            .extract(SYSTEM_PROMPT, user_prompt)
            .await
            .map_err(|e| IngestError::ClassificationUnavailable(e.to_string()))?;

        Ok(ClassificationResult {
            is_relevant: raw.is_relevant,
            protocol_name: raw.protocol_name.filter(|p| !p.trim().is_empty()),
            attack_type: raw.attack_type.as_deref().map(AttackType::from_str_loose),
            blockchain: raw.blockchain.filter(|b| !b.trim().is_empty()),
            amount_lost: raw.amount_lost_usd.filter(|a| *a > 0.0),
            confidence: raw.confidence.clamp(0.0, 1.0),
        })
    }
}

pub struct Classifier {
    backend: Option<Arc<dyn ClassifierBackend>>,
    min_confidence: f64,
}

impl Classifier {
    pub fn new(backend: Option<Arc<dyn ClassifierBackend>>, min_confidence: f64) -> Self {
        Self {
            backend,
            min_confidence,
        }
    }

    pub fn heuristic_only(min_confidence: f64) -> Self {
        Self::new(None, min_confidence)
    }

    /// Classify one candidate. Backend answers below the confidence floor are
    /// treated the same as backend errors: the heuristics decide.
    pub async fn classify(&self, candidate: &NormalizedCandidate) -> ClassificationResult {
        if let Some(backend) = &self.backend {
            match backend
                .classify_text(&candidate.title, &candidate.description)
                .await
            {
                Ok(result) if result.confidence >= self.min_confidence => {
                    return self.validated(result, candidate);
                }
                Ok(result) => {
                    debug!(
                        url = candidate.source_url.as_str(),
                        confidence = result.confidence,
                        "Model confidence below floor, using heuristics"
                    );
                }
                Err(e) => {
                    warn!(
                        url = candidate.source_url.as_str(),
                        error = %e,
                        "Classifier backend failed, using heuristics"
                    );
                }
            }
        }

        heuristics::classify(&candidate.title, &candidate.description)
    }

    /// A relevant result without a protocol name is contradictory; fill from
    /// the heuristics or downgrade to not-relevant.
    fn validated(
        &self,
        mut result: ClassificationResult,
        candidate: &NormalizedCandidate,
    ) -> ClassificationResult {
        if result.is_relevant && result.protocol_name.is_none() {
            let text = format!("{} {}", candidate.title, candidate.description);
            match heuristics::detect_protocol(&text) {
                Some(protocol) => result.protocol_name = Some(protocol),
                None => {
                    debug!(
                        url = candidate.source_url.as_str(),
                        "Relevant result without a protocol, downgrading"
                    );
                    result.is_relevant = false;
                }
            }
        }
        result
    }
}
