//! A [`Searcher`] backed by a fixed, caller-supplied result table.

use async_trait::async_trait;
use parking_lot::Mutex;
use research_engine::{SearchResult, Searcher, SearcherError};

/// Returns the same canned rows for every query it sees, recording the
/// queries it was called with so a test can assert on call shape.
pub struct FakeSearcher {
    engine_id: String,
    results: Vec<SearchResult>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeSearcher {
    /// Build a searcher that always returns `results` regardless of query.
    pub fn new(engine_id: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            engine_id: engine_id.into(),
            results,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queries this searcher was invoked with, in call order.
    pub fn recorded_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Searcher for FakeSearcher {
    fn engine_id(&self) -> &str {
        &self.engine_id
    }

    async fn search(&self, queries: &[String], _max_results: usize) -> Result<Vec<SearchResult>, SearcherError> {
        self.calls.lock().push(queries.to_vec());
        Ok(self.results.clone())
    }
}

/// Always fails, for exercising the "engine down" fallback paths.
pub struct FailingSearcher(pub String);

#[async_trait]
impl Searcher for FailingSearcher {
    fn engine_id(&self) -> &str {
        "failing"
    }

    async fn search(&self, _queries: &[String], _max_results: usize) -> Result<Vec<SearchResult>, SearcherError> {
        Err(SearcherError::Transport(self.0.clone()))
    }
}
