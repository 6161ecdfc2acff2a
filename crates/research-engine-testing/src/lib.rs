#![allow(clippy::unwrap_used)]

//! In-memory fakes for every `research-engine` port, for deterministic
//! integration tests against the orchestrator without a real search engine,
//! LLM vendor, or storage backend.

mod fake_dedup_store;
mod fake_fetcher;
mod fake_llm;
mod fake_searcher;
mod fake_session_store;

pub use fake_dedup_store::FakeDedupStore;
pub use fake_fetcher::FakeFetcher;
pub use fake_llm::{FailingLlm, FakeLlm};
pub use fake_searcher::{FailingSearcher, FakeSearcher};
pub use fake_session_store::FakeSessionStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{FailingLlm, FailingSearcher, FakeDedupStore, FakeFetcher, FakeLlm, FakeSearcher, FakeSessionStore};
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_engine::{Entity, FetchedPage, ResearchState, SearchResult, SessionStore};

    #[tokio::test]
    async fn fake_searcher_returns_fixed_rows_and_records_calls() {
        let searcher = FakeSearcher::new(
            "primary",
            vec![SearchResult {
                title: "t".to_string(),
                url: "https://a.example".to_string(),
                snippet: "s".to_string(),
                source_engine: "primary".to_string(),
                raw_content: None,
            }],
        );
        use research_engine::Searcher;
        let rows = searcher.search(&["q1".to_string()], 5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(searcher.recorded_calls(), vec![vec!["q1".to_string()]]);
    }

    #[tokio::test]
    async fn fake_fetcher_errors_on_unregistered_url() {
        use research_engine::Fetcher;
        let fetcher = FakeFetcher::new().with_page(
            "https://a.example",
            FetchedPage {
                url: "https://a.example".to_string(),
                ..Default::default()
            },
        );
        let results = fetcher
            .batch(&["https://a.example".to_string(), "https://b.example".to_string()], "q")
            .await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn fake_llm_matches_first_rule() {
        use research_engine::Llm;
        let llm = FakeLlm::new().on("plan", "plan-response").on("verify", "verify-response");
        let r = llm.chat("please plan this").await.unwrap();
        assert_eq!(r.text, "plan-response");
    }

    #[tokio::test]
    async fn fake_llm_falls_back_to_empty_object() {
        use research_engine::Llm;
        let llm = FakeLlm::new();
        let r = llm.chat("anything").await.unwrap();
        assert_eq!(r.text, "{}");
    }

    #[tokio::test]
    async fn fake_session_store_tracks_history_and_latest() {
        let store = FakeSessionStore::new();
        store.save_session(&ResearchState::new("r1", "topic")).await.unwrap();
        let mut second = ResearchState::new("r1", "topic");
        second.iteration_count = 1;
        store.save_session(&second).await.unwrap();
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.latest("r1").unwrap().iteration_count, 1);
    }

    #[tokio::test]
    async fn fake_session_store_save_entity_merges_into_latest_snapshot() {
        let store = FakeSessionStore::new();
        store.save_session(&ResearchState::new("r1", "topic")).await.unwrap();
        store.save_entity("r1", &Entity::new("BMS-986158")).await.unwrap();
        let latest = store.latest("r1").unwrap();
        assert!(latest.known_entities.contains_key("BMS-986158"));
    }
}
