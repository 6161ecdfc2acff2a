//! External ports the core is addressed through (§6). Concrete vendors are
//! collaborators outside this crate; only the trait boundary lives here.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{FetcherError, LlmError, SearcherError, SessionStoreError};
use crate::model::{Entity, ResearchState};

/// One search result row, flattened across whatever queries produced it.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Short snippet/summary.
    pub snippet: String,
    /// Which underlying engine produced this row (for the A/B breakdown, §10.5).
    pub source_engine: String,
    /// Full page content, if the engine returned it inline.
    pub raw_content: Option<String>,
}

/// Executes free-text queries against a search engine (§6).
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Engine identifier used in `WorkerState::search_engine_history` (e.g. "primary").
    fn engine_id(&self) -> &str;

    /// Run a batch of queries, requesting up to `max_results` rows per query.
    /// Implementations may fan the batch out internally; the caller receives a
    /// single flattened list.
    async fn search(
        &self,
        queries: &[String],
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearcherError>;
}

/// One extracted entity candidate, as returned by a [`Fetcher`] batch call.
#[derive(Debug, Clone, Default)]
pub struct ExtractedEntity {
    /// Proposed canonical name.
    pub canonical_name: String,
    /// Alternate names observed on this page.
    pub aliases: Vec<String>,
    /// Attribute values observed on this page.
    pub attributes: HashMap<String, String>,
    /// Verbatim excerpts supporting this entity.
    pub evidence_excerpts: Vec<String>,
}

/// Result of fetching and extracting one URL.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// The URL fetched.
    pub url: String,
    /// Entities extracted from this page.
    pub entities: Vec<ExtractedEntity>,
    /// Outbound links discovered on this page, already resolved to absolute URLs.
    pub outlinks: Vec<String>,
    /// Whether the body was a PDF (special-cased per §4.3 step 6).
    pub is_pdf: bool,
    /// Local path to the downloaded PDF body, set iff `is_pdf`. The caller
    /// (the worker) is responsible for invoking `Fetcher::extract_pdf` on it
    /// and then deleting it.
    pub pdf_path: Option<String>,
    /// Cleaned markdown content extracted from the page, empty for a PDF row
    /// until the secondary extraction path has run.
    pub extracted_markdown: String,
    /// USD cost attributed to extracting this page (LLM call cost, if any).
    pub cost: f64,
}

/// Crawls URLs in parallel and extracts entities/outlinks via a schema-guided
/// LLM call. One port covers both fetch and extract because no caller needs
/// them independently.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch and extract a batch of URLs (the caller chunks to
    /// `EngineConfig::fetch_batch_size`). A single URL's failure is reported
    /// in-band via `Err` on that URL's slot semantics are up to the caller —
    /// implementations should return one `Result` per URL rather than failing
    /// the whole batch.
    async fn batch(
        &self,
        urls: &[String],
        query_context: &str,
    ) -> Vec<Result<FetchedPage, FetcherError>>;

    /// Secondary structured-extraction path for a PDF body (§4.3 step 6):
    /// called by the worker when `FetchedPage::is_pdf` is set, against the
    /// file at `FetchedPage::pdf_path`. A failure here yields no entities for
    /// that page rather than failing the batch; the URL is still counted as
    /// fetched and stays marked visited (no re-attempt).
    async fn extract_pdf(&self, pdf_path: &str) -> Result<Vec<ExtractedEntity>, FetcherError>;
}

/// Response from one [`Llm`] call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Raw text completion.
    pub text: String,
    /// Prompt tokens consumed.
    pub input_tokens: u32,
    /// Completion tokens produced.
    pub output_tokens: u32,
}

/// A single chat/completion call to a language model (§6). Implementations
/// own their own exponential-backoff retry on rate-limit/overload; callers
/// only see [`LlmError::RetriesExhausted`] after that policy is spent.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Issue one prompt and await a completion.
    async fn chat(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    /// USD price per input token, for cost accounting.
    fn input_token_price(&self) -> f64;

    /// USD price per output token, for cost accounting.
    fn output_token_price(&self) -> f64;
}

/// Summary row for [`SessionStore::list_sessions`].
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session id.
    pub id: String,
    /// Topic.
    pub topic: String,
    /// Status, serialized (the port boundary stays string-typed so a concrete
    /// adapter's row schema doesn't need to know about `ResearchStatus`).
    pub status: String,
    /// Number of known entities.
    pub entities_count: usize,
    /// Cumulative cost.
    pub total_cost: f64,
}

/// Persists `ResearchState` and entities by session id (§6). Concrete
/// persistence (Postgres, SQLite, etc.) is explicitly out of scope; this
/// trait is the entire contract a caller needs to implement.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert the full session state.
    async fn save_session(&self, state: &ResearchState) -> Result<(), SessionStoreError>;

    /// Load a session by id.
    async fn get_session(&self, id: &str) -> Result<Option<ResearchState>, SessionStoreError>;

    /// List sessions, most recently updated first, capped at `limit`.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionStoreError>;

    /// Upsert one entity, appending only evidence new to it.
    async fn save_entity(&self, research_id: &str, entity: &Entity) -> Result<(), SessionStoreError>;

    /// Upsert a batch of entities.
    async fn save_entities_batch(
        &self,
        research_id: &str,
        entities: &[Entity],
    ) -> Result<(), SessionStoreError> {
        for e in entities {
            self.save_entity(research_id, e).await?;
        }
        Ok(())
    }

    /// Mid-iteration progress write (§4.3 step 10). Documented as non-atomic
    /// with respect to `save_session` — last-writer-wins is acceptable
    /// (DESIGN.md Open Question 3).
    async fn update_worker_metrics(
        &self,
        research_id: &str,
        worker_id: &str,
        pages_fetched: u64,
        entities_found: u64,
    ) -> Result<(), SessionStoreError>;
}

/// Concurrency-safe membership store for visited URLs and known entities
/// (§4.1). The sole process-wide shared-mutable component in the design; all
/// other state flows through value copies into a single orchestrator writer.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Has this URL already been visited within this session?
    async fn is_url_visited(&self, research_id: &str, url: &str) -> bool;

    /// Atomically mark a URL visited. Returns `true` iff this call performed
    /// the unvisited-to-visited transition; concurrent losers get `false` and
    /// must skip the URL.
    async fn mark_url_visited(&self, research_id: &str, url: &str) -> bool;

    /// Is this canonical name already known, process-wide?
    async fn is_entity_known(&self, canonical_name: &str) -> bool;

    /// Atomically register an entity's attributes, merging into any existing
    /// row per the §3 attribute-merge policy. Returns `true` iff this call
    /// inserted a brand-new row (independent of whether a merge also happened).
    async fn mark_entity_known(
        &self,
        canonical_name: &str,
        attributes: &HashMap<String, String>,
    ) -> bool;
}
