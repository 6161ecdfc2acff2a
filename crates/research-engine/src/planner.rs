//! Adaptive planner (§4.5): `initial_plan` and `adaptive_plan`, both
//! single-shot LLM calls whose JSON response is parsed via
//! [`crate::json_parse::extract_json_object`] with a hard fallback on
//! failure so a flaky LLM response can never abort the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::json_parse::extract_json_object;
use crate::model::{Gap, QueryAnalysis, ResearchPlan, Synonyms, WorkerSpec};
use crate::ports::Llm;

/// Structured summary of the last iteration, fed to `adaptive_plan`.
#[derive(Debug, Clone)]
pub struct IterationSummary {
    /// Original topic.
    pub topic: String,
    /// Iteration number that just completed.
    pub iteration_count: u32,
    /// Per-worker `(worker_id, novelty_rate, personal_queue_len, strategy)`.
    pub worker_novelty: Vec<(String, f64, usize, String)>,
    /// Recently discovered canonical names, for dedup-aware spawning.
    pub recent_entities: Vec<String>,
    /// Hard constraints from the original plan.
    pub hard_constraints: Vec<String>,
}

/// Planner over an [`Llm`] port.
pub struct Planner {
    llm: Arc<dyn Llm>,
}

impl Planner {
    /// Build a planner over the given LLM port.
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    /// Produce the initial research plan for `topic`.
    pub async fn initial_plan(&self, topic: &str) -> ResearchPlan {
        let prompt = initial_plan_prompt(topic);
        let response = match self.llm.chat(&prompt).await {
            Ok(r) => r.text,
            Err(_) => return fallback_initial_plan(topic),
        };

        match extract_json_object(&response).and_then(|v| serde_json::from_value::<RawInitialPlan>(v).ok()) {
            Some(raw) => raw.into_plan(),
            None => fallback_initial_plan(topic),
        }
    }

    /// Mutate the worker population and queries from the last iteration's
    /// results. On failure, returns a plan with empty spawn/kill/update sets
    /// so the existing fleet continues unchanged (§4.5).
    pub async fn adaptive_plan(&self, summary: &IterationSummary) -> ResearchPlan {
        let prompt = adaptive_plan_prompt(summary);
        let response = match self.llm.chat(&prompt).await {
            Ok(r) => r.text,
            Err(_) => return ResearchPlan::default(),
        };

        match extract_json_object(&response).and_then(|v| serde_json::from_value::<RawAdaptivePlan>(v).ok()) {
            Some(raw) => raw.into_plan(),
            None => ResearchPlan::default(),
        }
    }
}

fn initial_plan_prompt(topic: &str) -> String {
    format!(
        "You are planning a parallel web discovery run for: \"{topic}\".\n\
         Produce 1-3 workers that each target a DISTINCT source class \
         (general web, regional-language, patents, registries, corporate \
         pages) rather than merely distinct keywords.\n\
         Respond as JSON matching: {{\"query_analysis\": {{...}}, \"synonyms\": {{...}}, \
         \"initial_workers\": [{{\"worker_id\":..., \"strategy\":..., \
         \"strategy_description\":..., \"example_queries\":[...], \"page_budget\":...}}], \
         \"budget_reserve_pct\": ..., \"reasoning\": ...}}"
    )
}

fn adaptive_plan_prompt(summary: &IterationSummary) -> String {
    let worker_lines: String = summary
        .worker_novelty
        .iter()
        .map(|(id, novelty, queue_len, strategy)| {
            format!("- {id} ({strategy}): novelty={novelty:.3}, queue_len={queue_len}\n")
        })
        .collect();
    format!(
        "Topic: \"{}\". Iteration {} just completed.\n\
         Worker status:\n{worker_lines}\n\
         Hard constraints: {:?}\n\
         Recent entities: {:?}\n\
         Decide which workers to kill (novelty < 0.05 for two consecutive \
         iterations AND empty queue), which new non-overlapping worker \
         strategies to spawn (only if remaining budget > 25%), and any \
         query updates for existing workers.\n\
         Respond as JSON matching: {{\"spawn_workers\": [...], \"kill_workers\": [...], \
         \"updated_queries\": {{...}}, \"gaps\": [...], \"reasoning\": ...}}",
        summary.topic, summary.iteration_count, summary.hard_constraints, summary.recent_entities,
    )
}

fn fallback_initial_plan(topic: &str) -> ResearchPlan {
    ResearchPlan {
        initial_workers: vec![WorkerSpec {
            worker_id: "w0".to_string(),
            strategy: "broad_fallback".to_string(),
            strategy_description: "Broad search using the raw topic string.".to_string(),
            example_queries: vec![topic.to_string()],
            page_budget: 30,
        }],
        budget_reserve_pct: 0.5,
        reasoning: "fallback: planner response could not be parsed".to_string(),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawInitialPlan {
    #[serde(default)]
    query_analysis: RawQueryAnalysis,
    #[serde(default)]
    synonyms: RawSynonyms,
    #[serde(default)]
    initial_workers: Vec<RawWorkerSpec>,
    #[serde(default = "default_reserve")]
    budget_reserve_pct: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_reserve() -> f64 {
    0.5
}

impl RawInitialPlan {
    fn into_plan(self) -> ResearchPlan {
        ResearchPlan {
            query_analysis: self.query_analysis.into(),
            synonyms: self.synonyms.into(),
            initial_workers: self.initial_workers.into_iter().map(Into::into).collect(),
            budget_reserve_pct: self.budget_reserve_pct,
            reasoning: self.reasoning,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawAdaptivePlan {
    #[serde(default)]
    spawn_workers: Vec<RawWorkerSpec>,
    #[serde(default)]
    kill_workers: Vec<String>,
    #[serde(default)]
    updated_queries: HashMap<String, Vec<String>>,
    #[serde(default)]
    gaps: Vec<RawGap>,
    #[serde(default)]
    reasoning: String,
}

impl RawAdaptivePlan {
    fn into_plan(self) -> ResearchPlan {
        ResearchPlan {
            spawn_workers: self.spawn_workers.into_iter().map(Into::into).collect(),
            workers_to_kill: self.kill_workers,
            updated_queries: self.updated_queries,
            gaps: self.gaps.into_iter().map(Into::into).collect(),
            reasoning: self.reasoning,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawQueryAnalysis {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    hard_constraints: Vec<String>,
    #[serde(default)]
    soft_constraints: Vec<String>,
    #[serde(default)]
    geographic_constraints: Vec<String>,
    #[serde(default)]
    semantic_constraints: Vec<String>,
    #[serde(default)]
    modality: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    indication: Option<String>,
    #[serde(default)]
    geography: Option<String>,
}

impl From<RawQueryAnalysis> for QueryAnalysis {
    fn from(r: RawQueryAnalysis) -> Self {
        QueryAnalysis {
            target: r.target,
            hard_constraints: r.hard_constraints,
            soft_constraints: r.soft_constraints,
            geographic_constraints: r.geographic_constraints,
            semantic_constraints: r.semantic_constraints,
            modality: r.modality,
            stage: r.stage,
            indication: r.indication,
            geography: r.geography,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawSynonyms {
    #[serde(default)]
    target: Vec<String>,
    #[serde(default)]
    indication: Vec<String>,
    #[serde(default)]
    cross_lingual: Vec<String>,
    #[serde(default)]
    chemical: Vec<String>,
}

impl From<RawSynonyms> for Synonyms {
    fn from(r: RawSynonyms) -> Self {
        Synonyms {
            target: r.target,
            indication: r.indication,
            cross_lingual: r.cross_lingual,
            chemical: r.chemical,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawWorkerSpec {
    worker_id: String,
    strategy: String,
    #[serde(default)]
    strategy_description: String,
    #[serde(default)]
    example_queries: Vec<String>,
    #[serde(default = "default_page_budget")]
    page_budget: u32,
}

fn default_page_budget() -> u32 {
    30
}

impl From<RawWorkerSpec> for WorkerSpec {
    fn from(r: RawWorkerSpec) -> Self {
        WorkerSpec {
            worker_id: r.worker_id,
            strategy: r.strategy,
            strategy_description: r.strategy_description,
            example_queries: r.example_queries,
            page_budget: r.page_budget,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawGap {
    category: String,
    #[serde(default)]
    priority: u8,
    #[serde(default)]
    evidence: String,
}

impl From<RawGap> for Gap {
    fn from(r: RawGap) -> Self {
        Gap {
            category: r.category,
            priority: r.priority,
            evidence: r.evidence,
        }
    }
}
