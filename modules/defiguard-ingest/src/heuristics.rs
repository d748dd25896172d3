//! Deterministic keyword heuristics: the classifier fallback, plus tag and
//! amount extraction used on every candidate regardless of backend.

use std::sync::LazyLock;

use regex::Regex;

use defiguard_common::{AttackType, ClassificationResult};

/// Protocols we recognize by name. Matching is word-boundary on lowercase
/// text, longest name first so "curve finance" wins over "curve".
pub const KNOWN_PROTOCOLS: &[&str] = &[
    "uniswap",
    "aave",
    "compound",
    "makerdao",
    "curve finance",
    "curve",
    "balancer",
    "sushiswap",
    "pancakeswap",
    "yearn",
    "synthetix",
    "1inch",
    "dydx",
    "gmx",
    "lido",
    "rocket pool",
    "frax",
    "convex",
    "chainlink",
    "wormhole",
    "ronin",
    "harmony",
    "nomad",
    "multichain",
    "euler",
    "mango markets",
    "mango",
    "beanstalk",
    "cream finance",
    "cream",
    "badgerdao",
    "badger",
    "venus",
    "radiant",
    "kyberswap",
    "poly network",
];

const THREAT_KEYWORDS: &[&str] = &[
    "hack",
    "hacked",
    "exploit",
    "exploited",
    "attack",
    "attacker",
    "stolen",
    "drained",
    "drain",
    "vulnerability",
    "breach",
    "rug pull",
    "rugpull",
    "rug-pull",
    "scam",
    "flash loan",
    "theft",
    "compromised",
    "phishing",
    "malicious",
];

/// Ordered: more specific vectors first, so "flash loan attack" does not
/// land on the generic "attack" bucket.
const ATTACK_PATTERNS: &[(AttackType, &[&str])] = &[
    (AttackType::FlashLoan, &["flash loan", "flashloan", "flash-loan"]),
    (
        AttackType::OracleManipulation,
        &["oracle manipulation", "price oracle", "price manipulation", "oracle attack"],
    ),
    (AttackType::Reentrancy, &["reentrancy", "re-entrancy"]),
    (
        AttackType::BridgeExploit,
        &["bridge exploit", "bridge hack", "cross-chain bridge"],
    ),
    (
        AttackType::GovernanceAttack,
        &["governance attack", "governance proposal", "malicious proposal"],
    ),
    (AttackType::RugPull, &["rug pull", "rugpull", "rug-pull"]),
    (AttackType::ExitScam, &["exit scam", "exit-scam", "team disappeared"]),
];

const BLOCKCHAINS: &[&str] = &[
    "ethereum",
    "binance smart chain",
    "bsc",
    "polygon",
    "arbitrum",
    "optimism",
    "avalanche",
    "fantom",
    "solana",
    "tron",
    "base",
    "cronos",
];

const TAG_RULES: &[(&str, &[&str])] = &[
    ("defi-hack", &["hack", "exploit", "drained", "stolen"]),
    ("flash-loan", &["flash loan", "flashloan"]),
    ("rug-pull", &["rug pull", "rugpull", "rug-pull"]),
    ("bridge", &["bridge"]),
    ("smart-contract", &["smart contract", "vulnerability", "reentrancy"]),
    ("oracle", &["oracle"]),
    ("phishing", &["phishing"]),
    ("governance", &["governance"]),
];

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(thousand|million|billion|[kmb])?\b")
        .expect("valid regex")
});

// Amounts below this are noise (gas costs, token prices), not losses.
const MIN_AMOUNT_USD: f64 = 1_000.0;

/// Largest dollar figure in the text, with k/m/b suffixes expanded.
pub fn extract_amount_lost(text: &str) -> Option<f64> {
    AMOUNT_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let number: f64 = cap[1].replace(',', "").parse().ok()?;
            let multiplier = match cap.get(2).map(|m| m.as_str().to_lowercase()) {
                Some(s) if s == "k" || s == "thousand" => 1_000.0,
                Some(s) if s == "m" || s == "million" => 1_000_000.0,
                Some(s) if s == "b" || s == "billion" => 1_000_000_000.0,
                _ => 1.0,
            };
            Some(number * multiplier)
        })
        .filter(|amount| *amount >= MIN_AMOUNT_USD)
        .fold(None, |max, amount| match max {
            Some(m) if m >= amount => Some(m),
            _ => Some(amount),
        })
}

/// First known protocol mentioned, longest name first. Returned title-cased.
pub fn detect_protocol(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let mut names: Vec<&str> = KNOWN_PROTOCOLS.to_vec();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names
        .into_iter()
        .find(|name| contains_word(&lower, name))
        .map(title_case)
}

pub fn detect_attack_type(text: &str) -> Option<AttackType> {
    let lower = text.to_lowercase();
    ATTACK_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(attack, _)| *attack)
}

pub fn detect_blockchain(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    BLOCKCHAINS
        .iter()
        .find(|chain| contains_word(&lower, chain))
        .map(|chain| {
            if *chain == "bsc" {
                "BSC".to_string()
            } else {
                title_case(chain)
            }
        })
}

/// Tags from the keyword table, in table order.
pub fn extract_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TAG_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(tag, _)| tag.to_string())
        .collect()
}

fn threat_score(lower: &str) -> usize {
    THREAT_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count()
}

/// Keyword-based classification. Always produces a result; when nothing
/// matches, the result is simply not relevant.
pub fn classify(title: &str, description: &str) -> ClassificationResult {
    let text = format!("{title} {description}");
    let lower = text.to_lowercase();

    let protocol_name = detect_protocol(&text);
    let score = threat_score(&lower);

    let mut confidence = 0.3 + (score as f64 * 0.1).min(0.5);
    if threat_score(&title.to_lowercase()) > 0 {
        confidence += 0.2;
    }
    let confidence = confidence.min(0.95);

    let is_relevant = protocol_name.is_some() && score > 0;

    ClassificationResult {
        is_relevant,
        protocol_name,
        attack_type: detect_attack_type(&text),
        blockchain: detect_blockchain(&text),
        amount_lost: extract_amount_lost(&text),
        confidence: if is_relevant { confidence } else { 0.0 },
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
