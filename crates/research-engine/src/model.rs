//! Core data model: evidence, entities, worker/research state, and the plan.
//!
//! Merge semantics (§3 invariants) live next to the types they govern rather than
//! in the orchestrator, so any caller assembling an `Entity` gets them for free.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A verbatim excerpt backing a claim about an entity.
///
/// Identity for deduplication purposes is the `(source_url, content)` pair —
/// two snippets with the same URL but different excerpts are distinct evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    /// URL the excerpt was taken from.
    pub source_url: String,
    /// The verbatim excerpt.
    pub content: String,
    /// When this snippet was captured.
    pub timestamp: DateTime<Utc>,
}

impl EvidenceSnippet {
    /// The `(source_url, content)` identity pair used for dedup.
    fn identity(&self) -> (&str, &str) {
        (&self.source_url, &self.content)
    }
}

/// Verification outcome for an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Not yet run through the verifier.
    Unverified,
    /// Confirmed against the plan's hard constraints.
    Verified,
    /// Plausible but missing P0 fields or evidence conflicts; may be gap-filled.
    Uncertain,
    /// Fails one or more hard constraints.
    Rejected,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self::Unverified
    }
}

/// The fixed, open-set of attribute keys an [`Entity`] can carry.
///
/// An open string key space (rather than a closed Rust enum covering every
/// domain) keeps the entity schema domain-agnostic; these constants name the
/// ones the core itself reads or writes.
pub mod attr {
    /// Primary biological/technical target.
    pub const TARGET: &str = "target";
    /// Modality (e.g. "Small Molecule", "Antibody").
    pub const MODALITY: &str = "modality";
    /// Development stage (e.g. "Preclinical", "Phase 2").
    pub const PRODUCT_STAGE: &str = "product_stage";
    /// Indication or use case.
    pub const INDICATION: &str = "indication";
    /// Geography of origin or operation.
    pub const GEOGRAPHY: &str = "geography";
    /// Owning organization.
    pub const OWNER: &str = "owner";
    /// Drug or technology class.
    pub const DRUG_CLASS: &str = "drug_class";
    /// Clinical phase, when distinct from `product_stage`.
    pub const CLINICAL_PHASE: &str = "clinical_phase";

    /// Sentinel value meaning "attribute not yet known" — treated as empty by
    /// the merge rule in [`super::Entity::merge_attribute`].
    pub const UNKNOWN: &str = "Unknown";
}

fn is_unset(value: &str) -> bool {
    value.is_empty() || value == attr::UNKNOWN
}

/// A candidate entity discovered during research.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identity key for this entity.
    pub canonical_name: String,
    /// Alternate names observed for this entity; never contains `canonical_name`.
    pub aliases: HashSet<String>,
    /// Attribute map; see [`attr`] for the fixed key set.
    pub attributes: HashMap<String, String>,
    /// Supporting evidence, deduplicated by `(source_url, content)`.
    pub evidence: Vec<EvidenceSnippet>,
    /// Monotonically increasing mention counter.
    pub mention_count: u64,
    /// Verification outcome.
    pub verification_status: VerificationStatus,
    /// Reason the entity was rejected, if any.
    pub rejection_reason: Option<String>,
    /// Verifier confidence, 0-100.
    pub confidence_score: Option<u8>,
}

impl Entity {
    /// Start a new entity with only its identity populated.
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            ..Default::default()
        }
    }

    /// Add an alias, suppressing it if it equals the canonical name (invariant i).
    pub fn add_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if alias != self.canonical_name {
            self.aliases.insert(alias);
        }
    }

    /// Apply the attribute merge policy (invariant ii): a populated slot is
    /// never overwritten once set; an incoming unset value never clears one.
    pub fn merge_attribute(&mut self, key: &str, incoming: &str) {
        if is_unset(incoming) {
            return;
        }
        let current = self.attributes.get(key).map(String::as_str).unwrap_or("");
        if is_unset(current) {
            self.attributes.insert(key.to_string(), incoming.to_string());
        }
    }

    /// Merge a full attribute map via [`Entity::merge_attribute`].
    pub fn merge_attributes(&mut self, incoming: &HashMap<String, String>) {
        for (k, v) in incoming {
            self.merge_attribute(k, v);
        }
    }

    /// Append evidence, dropping duplicates by `(source_url, content)` (invariant iii).
    pub fn add_evidence(&mut self, snippet: EvidenceSnippet) {
        let dup = self
            .evidence
            .iter()
            .any(|e| e.identity() == snippet.identity());
        if !dup {
            self.evidence.push(snippet);
        }
        self.mention_count += 1;
    }
}

/// Lifecycle status of a [`WorkerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Running, not yet classified as productive or declining.
    Active,
    /// Novelty rate above threshold on its last iteration.
    Productive,
    /// Novelty rate at or below threshold on its last iteration.
    Declining,
    /// Exhausted its query pool and personal queue.
    Exhausted,
    /// Killed by the adaptive planner or found nothing across iterations.
    DeadEnd,
}

/// Per-domain link yield counters used by the adaptive link-scoring heuristic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinkPerformance {
    /// Links from this domain added to any worker's queue.
    pub links_added: u64,
    /// Entities ultimately found via a page from this domain.
    pub entities_found: u64,
}

/// Per-query, per-engine performance counters for the search-engine A/B
/// comparison, even though nothing in the core currently consumes it beyond
/// exposing it to the planner's structured summary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnginePerformance {
    /// Pages fetched using this engine.
    pub pages: u64,
    /// Entities discovered via pages fetched using this engine.
    pub entities_found: u64,
}

/// A single worker's running exploration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    /// Unique id within the research session.
    pub id: String,
    /// Owning research session id.
    pub research_id: String,
    /// Strategy label (e.g. "broad_english", "patent_specialist").
    pub strategy: String,
    /// Current queries this worker should search.
    pub queries: Vec<String>,
    /// Lifecycle status.
    pub status: WorkerStatus,
    /// Pages fetched, cumulative.
    pub pages_fetched: u64,
    /// Distinct entities this worker has touched, cumulative.
    pub entities_found: u64,
    /// Globally-novel entities this worker contributed, cumulative.
    pub new_entities: u64,
    /// FIFO of URLs scheduled for this worker, bounded by `max_queue_size`.
    pub personal_queue: Vec<String>,
    /// Netlocs this worker has already touched.
    pub explored_domains: HashSet<String>,
    /// Per-query aggregate performance.
    pub query_performance: HashMap<String, EnginePerformance>,
    /// Per-query, per-engine breakdown (supplemented feature, §10.5).
    pub search_engine_history: HashMap<String, HashMap<String, EnginePerformance>>,
    /// Per-domain link yield counters.
    pub link_performance: HashMap<String, LinkPerformance>,
    /// Consecutive low-novelty iterations, used by the planner's kill criteria.
    pub consecutive_low_novelty: u32,
}

impl WorkerState {
    /// Start a new worker in `Active` status with no history.
    pub fn new(id: impl Into<String>, research_id: impl Into<String>, strategy: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            id: id.into(),
            research_id: research_id.into(),
            strategy: strategy.into(),
            queries,
            status: WorkerStatus::Active,
            pages_fetched: 0,
            entities_found: 0,
            new_entities: 0,
            personal_queue: Vec::new(),
            explored_domains: HashSet::new(),
            query_performance: HashMap::new(),
            search_engine_history: HashMap::new(),
            link_performance: HashMap::new(),
            consecutive_low_novelty: 0,
        }
    }
}

/// Parsed hard/soft constraints extracted from the topic by [`crate::planner`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Primary target named in the topic.
    pub target: Option<String>,
    /// Constraints that must hold for verification to pass.
    pub hard_constraints: Vec<String>,
    /// Constraints that inform scoring but do not gate verification.
    pub soft_constraints: Vec<String>,
    /// Geography-related constraints.
    pub geographic_constraints: Vec<String>,
    /// Loosely related/semantic constraints.
    pub semantic_constraints: Vec<String>,
    /// Modality, if named.
    pub modality: Option<String>,
    /// Development stage, if named.
    pub stage: Option<String>,
    /// Indication, if named.
    pub indication: Option<String>,
    /// Geography, if named.
    pub geography: Option<String>,
}

/// Synonym expansions used to diversify queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synonyms {
    /// Target synonyms.
    pub target: Vec<String>,
    /// Indication synonyms.
    pub indication: Vec<String>,
    /// Cross-lingual equivalents.
    pub cross_lingual: Vec<String>,
    /// Chemical/technical synonyms.
    pub chemical: Vec<String>,
}

/// A spawn specification for one worker, used both in `initial_plan` and in
/// `adaptive_plan`'s `spawn_workers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Proposed worker id.
    pub worker_id: String,
    /// Strategy label.
    pub strategy: String,
    /// Free-form description of the strategy's intent.
    pub strategy_description: String,
    /// Seed queries.
    pub example_queries: Vec<String>,
    /// Per-iteration page budget for this worker.
    pub page_budget: u32,
}

/// A gap the planner or verifier has identified, with a priority and the
/// evidence that motivated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    /// Category: geographic / code_name / company / source.
    pub category: String,
    /// Priority, higher is more urgent.
    pub priority: u8,
    /// Evidence or reasoning behind flagging this gap.
    pub evidence: String,
}

/// Planner output: either an initial plan or an adaptive mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Parsed constraint analysis.
    pub query_analysis: QueryAnalysis,
    /// Synonym expansions.
    pub synonyms: Synonyms,
    /// Initial worker population (populated by `initial_plan`).
    pub initial_workers: Vec<WorkerSpec>,
    /// Fraction of budget reserved for adaptive spawns.
    pub budget_reserve_pct: f64,
    /// Worker ids to kill (populated by `adaptive_plan`).
    pub workers_to_kill: Vec<String>,
    /// New worker specs to spawn (populated by `adaptive_plan`).
    pub spawn_workers: Vec<WorkerSpec>,
    /// Query replacements by worker id (populated by `adaptive_plan`).
    pub updated_queries: HashMap<String, Vec<String>>,
    /// Gaps identified by this planning pass.
    pub gaps: Vec<Gap>,
    /// Free-form rationale from the LLM.
    pub reasoning: String,
}

/// Overall session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchStatus {
    /// Just created, not yet planning.
    Initialized,
    /// Actively iterating.
    Running,
    /// Discovery loop finished, verification in progress.
    VerificationPending,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecoverable error.
    Failed,
}

/// The root aggregate for one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    /// Session id.
    pub id: String,
    /// The original topic/query.
    pub topic: String,
    /// Overall status.
    pub status: ResearchStatus,
    /// Known entities keyed by canonical name.
    pub known_entities: HashMap<String, Entity>,
    /// Shadow set of visited URLs, keyed by URL only (scoping to `id` is
    /// implicit: one `ResearchState` per session). The authoritative,
    /// cross-process set lives in [`crate::ports::DedupStore`], keyed by
    /// `(research_id, url)`.
    pub visited_urls: HashSet<String>,
    /// Active and historical workers, keyed by worker id.
    pub workers: HashMap<String, WorkerState>,
    /// Current plan.
    pub plan: ResearchPlan,
    /// Number of completed iterations.
    pub iteration_count: u32,
    /// Append-only textual trace, durable via `SessionStore`.
    pub logs: Vec<String>,
    /// Cumulative USD cost across all port calls.
    pub total_cost: f64,
    /// Code names observed in aliases, surfaced as a planner hint.
    pub discovered_code_names: HashSet<String>,
    /// Company names observed in attributes, surfaced as a planner hint.
    pub discovered_companies: HashSet<String>,
    /// URLs the link scorer rated highly, surfaced as a planner hint.
    pub high_value_urls: HashSet<String>,
}

impl ResearchState {
    /// Start a new, empty session in `Initialized` status.
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            status: ResearchStatus::Initialized,
            known_entities: HashMap::new(),
            visited_urls: HashSet::new(),
            workers: HashMap::new(),
            plan: ResearchPlan::default(),
            iteration_count: 0,
            logs: Vec::new(),
            total_cost: 0.0,
            discovered_code_names: HashSet::new(),
            discovered_companies: HashSet::new(),
            high_value_urls: HashSet::new(),
        }
    }

    /// Append a line to the durable log trace.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Workers currently eligible to run another iteration (§4.7 step 1).
    pub fn active_worker_ids(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|(_, w)| {
                matches!(
                    w.status,
                    WorkerStatus::Active | WorkerStatus::Productive | WorkerStatus::Declining
                )
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}
