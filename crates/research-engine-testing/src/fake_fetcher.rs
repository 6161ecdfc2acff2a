//! A [`Fetcher`] keyed by URL, returning a caller-registered page per URL and
//! an error for anything unregistered.

use std::collections::HashMap;

use async_trait::async_trait;
use research_engine::{ExtractedEntity, FetchedPage, Fetcher, FetcherError};

/// Fetcher backed by a fixed URL → page table.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FetchedPage>,
}

impl FakeFetcher {
    /// Start with an empty page table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the page returned for `url`.
    pub fn with_page(mut self, url: impl Into<String>, page: FetchedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn batch(&self, urls: &[String], _query_context: &str) -> Vec<Result<FetchedPage, FetcherError>> {
        urls.iter()
            .map(|u| {
                self.pages.get(u).cloned().ok_or_else(|| FetcherError::Unreachable {
                    url: u.clone(),
                    reason: "not registered with FakeFetcher".to_string(),
                })
            })
            .collect()
    }

    async fn extract_pdf(&self, _pdf_path: &str) -> Result<Vec<ExtractedEntity>, FetcherError> {
        Ok(vec![])
    }
}
