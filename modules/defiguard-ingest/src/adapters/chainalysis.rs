//! Chainalysis blog adapter: pulls the RSS feed and keeps only entries whose
//! title or summary mentions a security incident. Most of the feed is market
//! commentary; the keyword gate keeps the classifier from burning calls on it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use defiguard_common::{IngestError, RawCandidate};

use crate::adapters::{html, SourceAdapter};
use crate::fetcher::PageFetcher;

const SOURCE_NAME: &str = "chainalysis";
const FEED_URL: &str = "https://www.chainalysis.com/blog/feed/";
const BODY_MAX_CHARS: usize = 1_000;

const RELEVANCE_KEYWORDS: &[&str] = &[
    "hack",
    "exploit",
    "stolen",
    "theft",
    "drain",
    "attack",
    "scam",
    "vulnerabilit",
    "breach",
    "launder",
    "phishing",
];

pub struct ChainalysisFeed {
    fetcher: Arc<dyn PageFetcher>,
    feed_url: String,
    max_articles: usize,
}

impl ChainalysisFeed {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_articles: usize) -> Self {
        Self {
            fetcher,
            feed_url: FEED_URL.to_string(),
            max_articles,
        }
    }

    fn looks_security_related(title: &str, summary: &str) -> bool {
        let haystack = format!("{} {}", title.to_lowercase(), summary.to_lowercase());
        RELEVANCE_KEYWORDS.iter().any(|kw| haystack.contains(kw))
    }
}

#[async_trait]
impl SourceAdapter for ChainalysisFeed {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_candidates(&self) -> Result<Vec<RawCandidate>, IngestError> {
        let xml = self.fetcher.fetch(&self.feed_url).await?;
        let feed = feed_rs::parser::parse(xml.as_bytes())
            .map_err(|e| IngestError::SourceUnavailable(format!("feed parse: {e}")))?;

        let mut candidates = Vec::new();
        for entry in feed.entries {
            if candidates.len() >= self.max_articles {
                break;
            }

            let title = match entry.title.as_ref() {
                Some(t) if !t.content.trim().is_empty() => t.content.trim().to_string(),
                _ => continue,
            };
            let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };

            let summary = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
                .unwrap_or_default();
            let body = html::extract_text(&summary, BODY_MAX_CHARS);

            if !Self::looks_security_related(&title, &body) {
                debug!(title = title.as_str(), "Entry not security related, skipping");
                continue;
            }

            candidates.push(RawCandidate {
                source: SOURCE_NAME.to_string(),
                title,
                body,
                url,
                published_hint: entry.published.map(|d| d.to_rfc3339()),
            });
        }

        Ok(candidates)
    }
}
