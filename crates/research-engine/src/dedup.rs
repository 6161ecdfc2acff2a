//! Default in-process [`DedupStore`] implementation (§4.1).
//!
//! Uses `dashmap` for lock-striped concurrent maps. `mark_url_visited` and
//! `mark_entity_known` use `DashMap::entry` to make the insert-if-absent
//! transition atomic: `Entry::or_insert_with` never runs its closure twice
//! for a racing pair of callers on the same key.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::model::Entity;
use crate::ports::DedupStore;

/// Default, process-wide `DedupStore`. Suitable as the authoritative backend
/// for a single-process deployment, or as the fast-path cache fronting a
/// transactional remote store in a multi-process one.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    visited_urls: DashMap<(String, String), ()>,
    entities: DashMap<String, Entity>,
}

impl InMemoryDedupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a known entity, for callers that need to read back merged
    /// attributes (e.g. the orchestrator populating `ResearchState`).
    pub fn get_entity(&self, canonical_name: &str) -> Option<Entity> {
        self.entities.get(canonical_name).map(|e| e.clone())
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn is_url_visited(&self, research_id: &str, url: &str) -> bool {
        self.visited_urls
            .contains_key(&(research_id.to_string(), url.to_string()))
    }

    async fn mark_url_visited(&self, research_id: &str, url: &str) -> bool {
        let key = (research_id.to_string(), url.to_string());
        let mut newly_inserted = false;
        self.visited_urls.entry(key).or_insert_with(|| {
            newly_inserted = true;
        });
        newly_inserted
    }

    async fn is_entity_known(&self, canonical_name: &str) -> bool {
        self.entities.contains_key(canonical_name)
    }

    async fn mark_entity_known(
        &self,
        canonical_name: &str,
        attributes: &HashMap<String, String>,
    ) -> bool {
        let mut newly_inserted = false;
        self.entities
            .entry(canonical_name.to_string())
            .and_modify(|existing| existing.merge_attributes(attributes))
            .or_insert_with(|| {
                newly_inserted = true;
                let mut e = Entity::new(canonical_name);
                e.merge_attributes(attributes);
                e
            });
        newly_inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attr;
    use std::sync::Arc;

    #[tokio::test]
    async fn mark_url_visited_transitions_exactly_once() {
        let store = InMemoryDedupStore::new();
        assert!(store.mark_url_visited("r1", "https://a.example").await);
        assert!(!store.mark_url_visited("r1", "https://a.example").await);
        assert!(store.is_url_visited("r1", "https://a.example").await);
    }

    #[tokio::test]
    async fn visited_urls_are_scoped_per_research_id() {
        let store = InMemoryDedupStore::new();
        assert!(store.mark_url_visited("r1", "https://a.example").await);
        // Same URL, different session: must be visitable again.
        assert!(store.mark_url_visited("r2", "https://a.example").await);
    }

    #[tokio::test]
    async fn mark_entity_known_reports_novelty_only_on_first_insert() {
        let store = InMemoryDedupStore::new();
        let mut attrs = HashMap::new();
        attrs.insert(attr::TARGET.to_string(), "CDK12/13".to_string());
        assert!(store.mark_entity_known("BMS-986158", &attrs).await);
        assert!(!store.mark_entity_known("BMS-986158", &attrs).await);
    }

    #[tokio::test]
    async fn mark_entity_known_merges_attributes_on_existing_row() {
        let store = InMemoryDedupStore::new();
        let mut first = HashMap::new();
        first.insert(attr::TARGET.to_string(), "CDK12/13".to_string());
        store.mark_entity_known("BMS-986158", &first).await;

        let mut second = HashMap::new();
        second.insert(attr::OWNER.to_string(), "Some Co".to_string());
        store.mark_entity_known("BMS-986158", &second).await;

        let e = store.get_entity("BMS-986158").unwrap();
        assert_eq!(e.attributes.get(attr::TARGET).unwrap(), "CDK12/13");
        assert_eq!(e.attributes.get(attr::OWNER).unwrap(), "Some Co");
    }

    #[tokio::test]
    async fn concurrent_mark_url_visited_has_exactly_one_winner() {
        let store = Arc::new(InMemoryDedupStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.mark_url_visited("r1", "https://race.example").await
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
