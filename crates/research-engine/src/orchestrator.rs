//! The durable orchestrator state machine (§4.7): `INIT → PLANNING →
//! ITERATING → VERIFYING → FINAL`. Fan-out across active workers is
//! expressed as an in-process `futures::future::join_all` over references
//! into this orchestrator's owned ports — "durability" across iterations is
//! delegated to `SessionStore` checkpoints rather than to an external
//! workflow engine.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::link_scorer::LinkScorer;
use crate::model::{
    Entity, EvidenceSnippet, ResearchPlan, ResearchState, ResearchStatus, WorkerSpec, WorkerState,
    WorkerStatus,
};
use crate::planner::{IterationSummary, Planner};
use crate::ports::{DedupStore, Fetcher, Llm, Searcher, SessionStore};
use crate::verifier::Verifier;
use crate::worker::{run_worker_iteration, AttributedEntity, WorkerPorts, WorkerResult};

/// Everything the orchestrator needs to drive one research session.
pub struct Orchestrator {
    primary_searcher: Arc<dyn Searcher>,
    secondary_searcher: Arc<dyn Searcher>,
    fetcher: Arc<dyn Fetcher>,
    link_scorer: LinkScorer,
    dedup: Arc<dyn DedupStore>,
    session_store: Arc<dyn SessionStore>,
    planner: Planner,
    verifier: Verifier,
    config: EngineConfig,
}

impl Orchestrator {
    /// Build an orchestrator from its ports and config.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary_searcher: Arc<dyn Searcher>,
        secondary_searcher: Arc<dyn Searcher>,
        fetcher: Arc<dyn Fetcher>,
        dedup: Arc<dyn DedupStore>,
        session_store: Arc<dyn SessionStore>,
        llm: Arc<dyn Llm>,
        config: EngineConfig,
    ) -> Self {
        let link_scorer = LinkScorer::new(llm.clone(), config.scorer_concurrency, config.scorer_batch_size);
        Self {
            primary_searcher,
            secondary_searcher,
            fetcher,
            link_scorer,
            dedup,
            session_store,
            planner: Planner::new(llm.clone()),
            verifier: Verifier::new(llm),
            config,
        }
    }

    /// Run a full research session for `topic`, returning the final state.
    pub async fn run(&self, research_id: impl Into<String>, topic: &str) -> ResearchState {
        let research_id = research_id.into();
        let topic = topic.to_string();
        let span = tracing::info_span!("research", research_id = %research_id, topic = %topic);
        self.run_inner(research_id, topic).instrument(span).await
    }

    async fn run_inner(&self, research_id: String, topic: String) -> ResearchState {
        // INIT
        let mut state = ResearchState::new(research_id.clone(), topic.clone());
        state.status = ResearchStatus::Running;
        state.log("session initialized");
        if self.checkpoint(&mut state).await.is_err() {
            return state;
        }

        // PLANNING
        let plan = self.planner.initial_plan(&topic).await;
        state.log(format!("initial plan: {} worker(s)", plan.initial_workers.len()));
        self.materialize_workers(&mut state, &plan.initial_workers);
        state.plan = plan;
        if self.checkpoint(&mut state).await.is_err() {
            return state;
        }

        // ITERATING
        loop {
            let active_ids = state.active_worker_ids();
            if active_ids.is_empty() {
                state.log("no active workers remain; proceeding to verification");
                break;
            }
            if state.iteration_count >= self.config.max_iterations {
                state.log("max iterations reached; proceeding to verification");
                break;
            }

            let results = self.run_iteration(&state, &active_ids).await;
            let (total_new, total_pages) = results.iter().fold((0u64, 0u64), |(n, p), r| {
                (n + r.new_entities, p + r.pages_fetched)
            });
            let global_novelty = total_new as f64 / total_pages.max(1) as f64;

            self.aggregate(&mut state, results);

            state.iteration_count += 1;
            info!(global_novelty, iteration = state.iteration_count, "iteration complete");

            // §4.7 step 6: a stateless, per-round check against the running
            // iteration count — not a consecutive-rounds counter. A single
            // round below threshold is enough to stop once the minimum
            // iteration count has been reached.
            if global_novelty < self.config.saturation_threshold
                && state.iteration_count >= self.config.saturation_min_iterations
            {
                state.log("saturation reached; proceeding to verification");
                if self.checkpoint(&mut state).await.is_err() {
                    return state;
                }
                break;
            }

            let summary = self.iteration_summary(&state);
            let adaptive = self.planner.adaptive_plan(&summary).await;
            self.apply_adaptive_plan(&mut state, &adaptive);

            if self.checkpoint(&mut state).await.is_err() {
                return state;
            }
        }

        // VERIFYING
        state.status = ResearchStatus::VerificationPending;
        self.verify_and_gap_fill(&mut state).await;

        // FINAL
        state.status = ResearchStatus::Completed;
        let _ = self.checkpoint(&mut state).await;
        state
    }

    /// Persist `state` via `SessionStore::save_session` — the outermost
    /// fallible activity in the run loop (§7), so this is where a `PortError`
    /// actually surfaces as an `EngineError` rather than staying a bare
    /// `thiserror` enum no caller constructs. On failure the session row
    /// remains at its last successful checkpoint: this method flips
    /// `state.status` to `Failed` and logs the reason before returning the
    /// error, so the caller can surface it through `ResearchState` without
    /// needing `run` itself to return a `Result` — failing the activity once
    /// the port's own retries are spent, rather than panicking or silently
    /// continuing. `Err` means the caller should stop driving the loop.
    async fn checkpoint(&self, state: &mut ResearchState) -> crate::Result<()> {
        self.session_store.save_session(state).await.map_err(|e| {
            state.status = ResearchStatus::Failed;
            state.log(format!("session checkpoint failed, stopping: {e}"));
            crate::error::EngineError::Port(crate::error::PortError::SessionStore(e))
        })
    }

    fn materialize_workers(&self, state: &mut ResearchState, specs: &[WorkerSpec]) {
        for spec in specs {
            let worker = WorkerState::new(
                spec.worker_id.clone(),
                state.id.clone(),
                spec.strategy.clone(),
                spec.example_queries.clone(),
            );
            state.workers.insert(spec.worker_id.clone(), worker);
        }
    }

    async fn run_iteration(&self, state: &ResearchState, active_ids: &[String]) -> Vec<WorkerResult> {
        let ports = WorkerPorts {
            primary_searcher: self.primary_searcher.as_ref(),
            secondary_searcher: self.secondary_searcher.as_ref(),
            fetcher: self.fetcher.as_ref(),
            link_scorer: &self.link_scorer,
            dedup: self.dedup.as_ref(),
            session_store: self.session_store.as_ref(),
        };
        let futures = active_ids.iter().map(|id| {
            let worker = state.workers[id].clone();
            run_worker_iteration(worker, &ports, &self.config)
        });
        futures::future::join_all(futures).await
    }

    fn aggregate(&self, state: &mut ResearchState, results: Vec<WorkerResult>) {
        for result in results {
            let mut updated = result.updated_state;
            for link in &result.discovered_links {
                if state.visited_urls.insert(link.clone()) {
                    updated.personal_queue.push(link.clone());
                }
            }
            if updated.personal_queue.len() > self.config.max_queue_size {
                updated.personal_queue.truncate(self.config.max_queue_size);
            }

            for item in &result.extracted {
                self.merge_entity(state, item);
            }

            state.total_cost += result.cost;
            state.workers.insert(result.worker_id, updated);
        }
    }

    fn merge_entity(&self, state: &mut ResearchState, item: &AttributedEntity) {
        let entity = state
            .known_entities
            .entry(item.entity.canonical_name.clone())
            .or_insert_with(|| Entity::new(item.entity.canonical_name.clone()));

        for alias in &item.entity.aliases {
            entity.add_alias(alias.clone());
            state.discovered_code_names.insert(alias.clone());
        }
        entity.merge_attributes(&item.entity.attributes);
        if let Some(owner) = item.entity.attributes.get(crate::model::attr::OWNER) {
            if !owner.is_empty() && owner != crate::model::attr::UNKNOWN {
                state.discovered_companies.insert(owner.clone());
            }
        }
        for excerpt in &item.entity.evidence_excerpts {
            entity.add_evidence(EvidenceSnippet {
                source_url: item.source_url.clone(),
                content: excerpt.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    fn iteration_summary(&self, state: &ResearchState) -> IterationSummary {
        IterationSummary {
            topic: state.topic.clone(),
            iteration_count: state.iteration_count,
            worker_novelty: state
                .workers
                .values()
                .map(|w| {
                    let novelty = if w.pages_fetched == 0 {
                        0.0
                    } else {
                        w.new_entities as f64 / w.pages_fetched as f64
                    };
                    (w.id.clone(), novelty, w.personal_queue.len(), w.strategy.clone())
                })
                .collect(),
            recent_entities: state.known_entities.keys().cloned().collect(),
            hard_constraints: state.plan.query_analysis.hard_constraints.clone(),
        }
    }

    fn apply_adaptive_plan(&self, state: &mut ResearchState, plan: &ResearchPlan) {
        for id in &plan.workers_to_kill {
            if let Some(w) = state.workers.get_mut(id) {
                w.status = WorkerStatus::DeadEnd;
            }
        }
        self.materialize_workers(state, &plan.spawn_workers);
        for (id, queries) in &plan.updated_queries {
            if let Some(w) = state.workers.get_mut(id) {
                w.queries = queries.clone();
            }
        }
        state.plan.gaps = plan.gaps.clone();
    }

    async fn verify_and_gap_fill(&self, state: &mut ResearchState) {
        let names: Vec<String> = state.known_entities.keys().cloned().collect();
        let mut gap_fill_targets = Vec::new();

        for name in names {
            let entity = state.known_entities.get(&name).cloned().unwrap_or_default();
            let result = self.verifier.verify_entity(&entity, &state.plan.query_analysis).await;
            state.total_cost += result.cost;

            let has_p0_gap = !result.missing_fields.is_empty()
                && matches!(result.status, crate::model::VerificationStatus::Uncertain);
            if has_p0_gap {
                let queries = self.verifier.gap_fill_queries(&entity, &result);
                gap_fill_targets.push((name.clone(), queries));
            }

            if let Some(e) = state.known_entities.get_mut(&name) {
                e.verification_status = result.status;
                e.rejection_reason = result.rejection_reason;
                e.confidence_score = Some(result.confidence);
            }
            if let Some(e) = state.known_entities.get(&name) {
                let _ = self.session_store.save_entity(&state.id, e).await;
            }
        }

        if gap_fill_targets.is_empty() {
            return;
        }

        let ports = WorkerPorts {
            primary_searcher: self.primary_searcher.as_ref(),
            secondary_searcher: self.secondary_searcher.as_ref(),
            fetcher: self.fetcher.as_ref(),
            link_scorer: &self.link_scorer,
            dedup: self.dedup.as_ref(),
            session_store: self.session_store.as_ref(),
        };
        let futures = gap_fill_targets.iter().map(|(name, queries)| {
            let worker = WorkerState::new(
                format!("gapfill-{name}"),
                state.id.clone(),
                "gap_fill".to_string(),
                queries.clone(),
            );
            run_worker_iteration(worker, &ports, &self.config)
        });
        let results = futures::future::join_all(futures).await;
        self.aggregate(state, results);
    }
}
