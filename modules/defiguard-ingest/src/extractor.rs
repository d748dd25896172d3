//! Normalization of raw adapter output into the canonical candidate shape.
//!
//! This is the gate where malformed records die: no title or no absolute http
//! URL means the candidate is discarded. A bad date is not fatal, it just
//! leaves `published_date` unset.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use url::Url;

use defiguard_common::{IngestError, NormalizedCandidate, RawCandidate};

/// Date formats seen across sources, tried in order after RFC 3339.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

pub fn normalize(raw: RawCandidate, now: DateTime<Utc>) -> Result<NormalizedCandidate, IngestError> {
    let title = raw.title.trim();
    if title.is_empty() {
        return Err(IngestError::DiscardedMalformed(format!(
            "empty title from {}",
            raw.source
        )));
    }

    let url = Url::parse(raw.url.trim())
        .map_err(|e| IngestError::DiscardedMalformed(format!("bad url {:?}: {e}", raw.url)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(IngestError::DiscardedMalformed(format!(
            "non-http url {:?}",
            raw.url
        )));
    }

    let published_date = raw.published_hint.as_deref().and_then(parse_date);
    if published_date.is_none() {
        if let Some(hint) = &raw.published_hint {
            debug!(hint = hint.as_str(), "Unparseable published date");
        }
    }

    Ok(NormalizedCandidate {
        title: title.to_string(),
        description: raw.body.split_whitespace().collect::<Vec<_>>().join(" "),
        source_name: raw.source,
        source_url: url.to_string(),
        published_date,
        scraped_at: now,
    })
}

fn parse_date(hint: &str) -> Option<NaiveDate> {
    let hint = hint.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(hint) {
        return Some(dt.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(hint, fmt).ok())
}
