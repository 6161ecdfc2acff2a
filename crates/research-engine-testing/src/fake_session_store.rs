//! An in-memory [`SessionStore`] that records every `save_session` call,
//! for asserting on checkpoint cadence without a real backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use research_engine::{Entity, ResearchState, SessionStore, SessionStoreError, SessionSummary};

/// In-memory session store. Keeps every snapshot ever saved, not just the
/// latest, so tests can assert on checkpoint history.
#[derive(Default)]
pub struct FakeSessionStore {
    snapshots: Mutex<Vec<ResearchState>>,
    worker_metrics_calls: Mutex<Vec<(String, String, u64, u64)>>,
}

impl FakeSessionStore {
    /// Start empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently saved snapshot for `id`, if any.
    pub fn latest(&self, id: &str) -> Option<ResearchState> {
        self.snapshots.lock().iter().rev().find(|s| s.id == id).cloned()
    }

    /// Every snapshot ever saved, in save order.
    pub fn history(&self) -> Vec<ResearchState> {
        self.snapshots.lock().clone()
    }

    /// Every `update_worker_metrics` call, in call order.
    pub fn worker_metrics_calls(&self) -> Vec<(String, String, u64, u64)> {
        self.worker_metrics_calls.lock().clone()
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn save_session(&self, state: &ResearchState) -> Result<(), SessionStoreError> {
        self.snapshots.lock().push(state.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ResearchState>, SessionStoreError> {
        Ok(self.latest(id))
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let mut by_id: HashMap<String, ResearchState> = HashMap::new();
        for snapshot in self.snapshots.lock().iter() {
            by_id.insert(snapshot.id.clone(), snapshot.clone());
        }
        let mut summaries: Vec<SessionSummary> = by_id
            .into_values()
            .map(|s| SessionSummary {
                id: s.id,
                topic: s.topic,
                status: format!("{:?}", s.status),
                entities_count: s.known_entities.len(),
                total_cost: s.total_cost,
            })
            .collect();
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn save_entity(&self, research_id: &str, entity: &Entity) -> Result<(), SessionStoreError> {
        if let Some(mut state) = self.latest(research_id) {
            state.known_entities.insert(entity.canonical_name.clone(), entity.clone());
            self.snapshots.lock().push(state);
        }
        Ok(())
    }

    async fn update_worker_metrics(
        &self,
        research_id: &str,
        worker_id: &str,
        pages_fetched: u64,
        entities_found: u64,
    ) -> Result<(), SessionStoreError> {
        self.worker_metrics_calls
            .lock()
            .push((research_id.to_string(), worker_id.to_string(), pages_fetched, entities_found));
        Ok(())
    }
}
