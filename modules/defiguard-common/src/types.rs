use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Risk Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a severity score into a discrete level. Lower bounds are
    /// inclusive of the higher bucket: 3.0 is Medium, 6.0 is High, 8.5 is
    /// Critical.
    pub fn from_score(score: f64) -> Self {
        if score < 3.0 {
            RiskLevel::Low
        } else if score < 6.0 {
            RiskLevel::Medium
        } else if score < 8.5 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Derived risk assessment for one classified candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub severity_score: f64,
    pub risk_level: RiskLevel,
}

// --- Attack Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    FlashLoan,
    RugPull,
    OracleManipulation,
    ExitScam,
    Reentrancy,
    BridgeExploit,
    GovernanceAttack,
    Other,
}

impl std::fmt::Display for AttackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackType::FlashLoan => write!(f, "flash_loan"),
            AttackType::RugPull => write!(f, "rug_pull"),
            AttackType::OracleManipulation => write!(f, "oracle_manipulation"),
            AttackType::ExitScam => write!(f, "exit_scam"),
            AttackType::Reentrancy => write!(f, "reentrancy"),
            AttackType::BridgeExploit => write!(f, "bridge_exploit"),
            AttackType::GovernanceAttack => write!(f, "governance_attack"),
            AttackType::Other => write!(f, "other"),
        }
    }
}

impl AttackType {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "flash_loan" | "flashloan" => Self::FlashLoan,
            "rug_pull" | "rugpull" => Self::RugPull,
            "oracle_manipulation" | "oracle" | "price_manipulation" => Self::OracleManipulation,
            "exit_scam" => Self::ExitScam,
            "reentrancy" | "re_entrancy" => Self::Reentrancy,
            "bridge_exploit" | "bridge" | "cross_chain" => Self::BridgeExploit,
            "governance_attack" | "governance" => Self::GovernanceAttack,
            _ => Self::Other,
        }
    }
}

// --- Pipeline Candidates ---

/// Source-specific raw record as yielded by an adapter. Ephemeral; consumed
/// once by the extractor and never persisted.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: String,
    /// Raw published-date string in whatever format the source uses.
    pub published_hint: Option<String>,
}

/// Canonical pre-classification shape of a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCandidate {
    pub title: String,
    pub description: String,
    pub source_name: String,
    /// Absolute URL, unique per real-world article. Dedup key.
    pub source_url: String,
    pub published_date: Option<NaiveDate>,
    pub scraped_at: DateTime<Utc>,
}

/// Classifier output for one candidate. When `is_relevant` is false all other
/// fields are ignored downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_relevant: bool,
    pub protocol_name: Option<String>,
    pub attack_type: Option<AttackType>,
    pub blockchain: Option<String>,
    pub amount_lost: Option<f64>,
    /// 0.0-1.0
    pub confidence: f64,
}

// --- Persisted Entity ---

/// A stored threat-intelligence record. Identity is content-addressed from the
/// source URL so re-scrapes update rather than duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIntelItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub protocol_name: Option<String>,
    pub risk_level: RiskLevel,
    pub severity_score: Option<f64>,
    pub source_url: String,
    pub source_name: String,
    pub published_date: Option<NaiveDate>,
    pub scraped_date: DateTime<Utc>,
    pub amount_lost: Option<f64>,
    pub attack_type: Option<AttackType>,
    pub blockchain: Option<String>,
    pub tags: Vec<String>,
    pub is_verified: bool,
    /// Source-specific metadata (attack vector notes, cross-references).
    pub additional_data: serde_json::Map<String, serde_json::Value>,
}

/// Deterministic item identity from the source URL. Same URL always yields the
/// same id, which makes re-scraping idempotent.
pub fn item_id(source_url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes())
}

impl ThreatIntelItem {
    /// Merge a freshly scraped version of this item into the stored one.
    /// Incoming present fields overwrite; `is_verified` only ever upgrades
    /// false→true; `scraped_date` is bumped to `now`; tags are unioned in
    /// order; `additional_data` keys are merged with incoming winning.
    pub fn merged_with(&self, incoming: &ThreatIntelItem, now: DateTime<Utc>) -> ThreatIntelItem {
        let mut tags = self.tags.clone();
        for tag in &incoming.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let mut additional_data = self.additional_data.clone();
        for (k, v) in &incoming.additional_data {
            additional_data.insert(k.clone(), v.clone());
        }

        ThreatIntelItem {
            id: self.id,
            title: incoming.title.clone(),
            description: incoming.description.clone(),
            protocol_name: incoming.protocol_name.clone().or_else(|| self.protocol_name.clone()),
            risk_level: incoming.risk_level,
            severity_score: incoming.severity_score.or(self.severity_score),
            source_url: self.source_url.clone(),
            source_name: incoming.source_name.clone(),
            published_date: incoming.published_date.or(self.published_date),
            scraped_date: now,
            amount_lost: incoming.amount_lost.or(self.amount_lost),
            attack_type: incoming.attack_type.or(self.attack_type),
            blockchain: incoming.blockchain.clone().or_else(|| self.blockchain.clone()),
            tags,
            is_verified: self.is_verified || incoming.is_verified,
            additional_data,
        }
    }
}
