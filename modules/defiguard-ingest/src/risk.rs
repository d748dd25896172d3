//! Severity scoring for classified incidents.
//!
//! The score blends loss size with attack-vector danger, then damps toward a
//! neutral baseline by classifier confidence: an uncertain classification
//! should not produce a confident extreme score.

use defiguard_common::{AttackType, ClassificationResult, RiskAssessment, RiskLevel};

const BASELINE: f64 = 3.0;
const AMOUNT_WEIGHT: f64 = 0.6;
const ATTACK_WEIGHT: f64 = 0.4;

/// Score a relevant classification. Pure; the same inputs always yield the
/// same assessment.
pub fn assess(classification: &ClassificationResult) -> RiskAssessment {
    let amount = amount_component(classification.amount_lost);
    let attack = attack_component(classification.attack_type);

    let raw = AMOUNT_WEIGHT * amount + ATTACK_WEIGHT * attack;
    let confidence = classification.confidence.clamp(0.0, 1.0);
    let severity = (BASELINE + (raw - BASELINE) * confidence).clamp(0.0, 10.0);

    RiskAssessment {
        severity_score: severity,
        risk_level: RiskLevel::from_score(severity),
    }
}

/// Log-scaled loss: $1k ≈ 4.2, $1M ≈ 8.4, capped at 10. Unknown losses sit
/// at the neutral baseline rather than reading as "small".
fn amount_component(amount_lost: Option<f64>) -> f64 {
    match amount_lost {
        Some(amount) if amount > 0.0 => (amount.log10() * 1.4).clamp(0.0, 10.0),
        _ => BASELINE,
    }
}

fn attack_component(attack_type: Option<AttackType>) -> f64 {
    match attack_type {
        Some(AttackType::FlashLoan) | Some(AttackType::OracleManipulation) => 9.0,
        Some(AttackType::RugPull) => 8.5,
        Some(AttackType::ExitScam) => 8.0,
        Some(AttackType::Reentrancy)
        | Some(AttackType::BridgeExploit)
        | Some(AttackType::GovernanceAttack) => 7.5,
        Some(AttackType::Other) => 5.0,
        None => 4.0,
    }
}
