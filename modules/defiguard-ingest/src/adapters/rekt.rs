//! Rekt News adapter: scrapes the front-page listing for post links, then
//! each post page for title, body, and published date.
//!
//! Rekt publishes researched post-mortems, so candidates from this source
//! start out verified.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use defiguard_common::{IngestError, RawCandidate};

use crate::adapters::{html, SourceAdapter};
use crate::fetcher::PageFetcher;

const SOURCE_NAME: &str = "rekt";
const BASE_URL: &str = "https://rekt.news/";
const BODY_MAX_CHARS: usize = 1_000;

pub struct RektNews {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
    max_articles: usize,
}

impl RektNews {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_articles: usize) -> Self {
        Self {
            fetcher,
            base_url: BASE_URL.to_string(),
            max_articles,
        }
    }

    fn article_links(&self, listing: &str) -> Vec<String> {
        // Post URLs look like /acme-protocol-rekt/ or /leaderboard entries;
        // "rekt" in the path is the stable marker.
        let mut links = html::extract_links_by_pattern(listing, &self.base_url, "rekt");
        links.retain(|link| {
            link.starts_with(&self.base_url)
                && link.trim_end_matches('/') != self.base_url.trim_end_matches('/')
                && !link.contains("leaderboard")
        });
        links.truncate(self.max_articles);
        links
    }
}

#[async_trait]
impl SourceAdapter for RektNews {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_candidates(&self) -> Result<Vec<RawCandidate>, IngestError> {
        let listing = self.fetcher.fetch(&self.base_url).await?;
        let links = self.article_links(&listing);
        debug!(count = links.len(), "Found article links");

        let mut candidates = Vec::new();
        for link in links {
            let page = match self.fetcher.fetch(&link).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = link.as_str(), error = %e, "Skipping article");
                    continue;
                }
            };

            let Some(title) = html::extract_title(&page) else {
                warn!(url = link.as_str(), "Article has no title, skipping");
                continue;
            };

            candidates.push(RawCandidate {
                source: SOURCE_NAME.to_string(),
                title,
                body: html::extract_text(&page, BODY_MAX_CHARS),
                url: link,
                published_hint: html::extract_published_hint(&page),
            });
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Serves canned pages keyed by URL; unknown URLs fail.
    struct FakeFetcher {
        pages: std::collections::HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, IngestError> {
            self.requests.lock().await.push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| IngestError::SourceUnavailable(format!("{url}: HTTP 500")))
        }
    }

    const LISTING: &str = r#"
        <a href="/acme-rekt/">Acme</a>
        <a href="/widget-rekt/">Widget</a>
        <a href="/leaderboard/">Leaderboard</a>
        <a href="https://twitter.com/rekt">Twitter</a>
    "#;

    #[tokio::test]
    async fn scrapes_listed_articles() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            ("https://rekt.news/", LISTING),
            (
                "https://rekt.news/acme-rekt/",
                r#"<h1>Acme - Rekt</h1><time datetime="2024-03-01">Mar 1</time><p>$12 million drained via flash loan.</p>"#,
            ),
            (
                "https://rekt.news/widget-rekt/",
                "<h1>Widget - Rekt</h1><p>Oracle manipulated.</p>",
            ),
        ]));
        let adapter = RektNews::new(fetcher, 10);

        let candidates = adapter.fetch_candidates().await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Acme - Rekt");
        assert_eq!(candidates[0].url, "https://rekt.news/acme-rekt/");
        assert_eq!(candidates[0].published_hint.as_deref(), Some("2024-03-01"));
        assert!(candidates[0].body.contains("flash loan"));
        assert_eq!(candidates[1].title, "Widget - Rekt");
        assert_eq!(candidates[1].published_hint, None);
    }

    #[tokio::test]
    async fn failed_article_is_skipped_not_fatal() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            ("https://rekt.news/", LISTING),
            (
                "https://rekt.news/widget-rekt/",
                "<h1>Widget - Rekt</h1><p>Oracle manipulated.</p>",
            ),
        ]));
        let adapter = RektNews::new(fetcher, 10);

        let candidates = adapter.fetch_candidates().await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Widget - Rekt");
    }

    #[tokio::test]
    async fn listing_failure_fails_the_source() {
        let fetcher = Arc::new(FakeFetcher::new(&[]));
        let adapter = RektNews::new(fetcher, 10);

        let err = adapter.fetch_candidates().await.unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn respects_article_cap() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            ("https://rekt.news/", LISTING),
            ("https://rekt.news/acme-rekt/", "<h1>Acme - Rekt</h1>"),
            ("https://rekt.news/widget-rekt/", "<h1>Widget - Rekt</h1>"),
        ]));
        let adapter = RektNews::new(fetcher.clone(), 1);

        let candidates = adapter.fetch_candidates().await.unwrap();

        assert_eq!(candidates.len(), 1);
        // Listing + one article only.
        assert_eq!(fetcher.requests.lock().await.len(), 2);
    }
}
