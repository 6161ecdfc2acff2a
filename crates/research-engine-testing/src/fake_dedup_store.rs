//! A [`DedupStore`] double that can be told to treat specific URLs as
//! already visited, for tests that need to force a cross-worker collision
//! without spinning up real concurrency.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use research_engine::DedupStore;

/// Dedup store seeded with a fixed set of pre-visited URLs; everything else
/// behaves like [`research_engine::InMemoryDedupStore`].
#[derive(Default)]
pub struct FakeDedupStore {
    visited: Mutex<HashSet<(String, String)>>,
    entities: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl FakeDedupStore {
    /// Start with `visited` pre-seeded as already visited, scoped to `research_id`.
    pub fn seeded(research_id: &str, visited: &[&str]) -> Self {
        let store = Self::default();
        let mut set = store.visited.lock();
        for url in visited {
            set.insert((research_id.to_string(), url.to_string()));
        }
        drop(set);
        store
    }
}

#[async_trait]
impl DedupStore for FakeDedupStore {
    async fn is_url_visited(&self, research_id: &str, url: &str) -> bool {
        self.visited.lock().contains(&(research_id.to_string(), url.to_string()))
    }

    async fn mark_url_visited(&self, research_id: &str, url: &str) -> bool {
        self.visited.lock().insert((research_id.to_string(), url.to_string()))
    }

    async fn is_entity_known(&self, canonical_name: &str) -> bool {
        self.entities.lock().contains_key(canonical_name)
    }

    async fn mark_entity_known(&self, canonical_name: &str, attributes: &HashMap<String, String>) -> bool {
        let mut entities = self.entities.lock();
        let newly = !entities.contains_key(canonical_name);
        entities
            .entry(canonical_name.to_string())
            .or_default()
            .extend(attributes.clone());
        newly
    }
}
