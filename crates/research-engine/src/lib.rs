//! # Research Engine
//!
//! A plan-guided, parallel web discovery engine: a planner proposes a fleet
//! of workers with distinct search strategies, each worker iterates
//! search → fetch/extract → link-follow against shared dedup state, and a
//! verifier reconciles the resulting entities against the plan's hard
//! constraints before gap-filling and finishing.
//!
//! The crate is organized around a small set of ports (`Searcher`, `Fetcher`,
//! `Llm`, `SessionStore`, `DedupStore`) an embedding application implements;
//! everything in this crate is the core discovery loop, independent of any
//! concrete search engine, LLM vendor, or storage backend.

mod checkpoint_integrity;
mod config;
mod dedup;
mod error;
mod json_parse;
mod link_filter;
mod link_scorer;
mod model;
mod orchestrator;
mod planner;
mod ports;
#[cfg(test)]
mod tests_support;
mod verifier;
mod worker;

pub use checkpoint_integrity::{CheckpointIntegrityError, CheckpointWithIntegrity};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use dedup::InMemoryDedupStore;
pub use error::{EngineError, FetcherError, LlmError, PortError, Result, SearcherError, SessionStoreError};
pub use link_filter::LinkFilter;
pub use link_scorer::{LinkCandidate, LinkScorer, ScoredLink};
pub use model::{
    attr, Entity, EnginePerformance, EvidenceSnippet, Gap, LinkPerformance, QueryAnalysis,
    ResearchPlan, ResearchState, ResearchStatus, Synonyms, VerificationStatus, WorkerSpec,
    WorkerState, WorkerStatus,
};
pub use orchestrator::Orchestrator;
pub use planner::{IterationSummary, Planner};
pub use ports::{
    DedupStore, ExtractedEntity, FetchedPage, Fetcher, Llm, LlmResponse, SearchResult, Searcher,
    SessionStore, SessionSummary,
};
pub use verifier::{VerificationResult, Verifier, P0_FIELDS};

/// Convenience re-exports for embedding applications wiring up an [`Orchestrator`].
pub mod prelude {
    pub use crate::{
        DedupStore, EngineConfig, EngineError, Entity, Fetcher, InMemoryDedupStore, Llm,
        Orchestrator, ResearchState, Result, SessionStore, Searcher,
    };
}
