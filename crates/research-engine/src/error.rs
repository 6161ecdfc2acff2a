//! Error taxonomy for the discovery engine.
//!
//! Port adapters (`Searcher`, `Fetcher`, `LLM`, `SessionStore`) each define a small
//! `thiserror` enum of their own and convert into [`EngineError`] via `#[from]`, so a
//! failure deep in a vendor client still carries enough context to log without the
//! orchestrator needing to know about vendor-specific failure modes.

use thiserror::Error;

/// Failure from a [`crate::ports::Searcher`] call.
#[derive(Debug, Error)]
pub enum SearcherError {
    /// The underlying transport failed (timeout, connection reset, DNS, etc).
    #[error("search transport error: {0}")]
    Transport(String),
    /// The vendor responded with a rate-limit or overload status.
    #[error("search engine rate limited")]
    RateLimited,
    /// The vendor response could not be decoded.
    #[error("search response decode error: {0}")]
    Decode(String),
}

/// Failure from a [`crate::ports::Fetcher`] call.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// The URL could not be fetched at all (DNS, connect, TLS, timeout).
    #[error("fetch failed for {url}: {reason}")]
    Unreachable {
        /// URL that failed to fetch.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The fetched body could not be extracted into entities/links.
    #[error("extraction failed for {url}: {reason}")]
    ExtractionFailed {
        /// URL whose body failed to extract.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Failure from an [`crate::ports::Llm`] call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The vendor responded with a rate-limit or overload status.
    #[error("llm rate limited")]
    RateLimited,
    /// The vendor call failed for a reason other than rate limiting.
    #[error("llm call failed: {0}")]
    CallFailed(String),
    /// Retries were exhausted without a successful response.
    #[error("llm call exhausted {attempts} retries")]
    RetriesExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

/// Failure from a [`crate::ports::SessionStore`] call.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The session id was not found.
    #[error("session not found: {0}")]
    NotFound(String),
    /// The backing store failed to read or write.
    #[error("session store io error: {0}")]
    Io(String),
    /// The stored state dump failed integrity verification on read.
    #[error("session state integrity error: {0}")]
    Integrity(#[from] crate::checkpoint_integrity::CheckpointIntegrityError),
}

/// The union of all port-facing failures the engine converts into.
#[derive(Debug, Error)]
pub enum PortError {
    /// A [`Searcher`](crate::ports::Searcher) call failed.
    #[error(transparent)]
    Searcher(#[from] SearcherError),
    /// A [`Fetcher`](crate::ports::Fetcher) call failed.
    #[error(transparent)]
    Fetcher(#[from] FetcherError),
    /// An [`Llm`](crate::ports::Llm) call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// A [`SessionStore`](crate::ports::SessionStore) call failed.
    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),
}

/// Top-level error type for the discovery engine.
///
/// No variant is produced by the lossy-JSON-parsing paths in the planner or link
/// scorer: those fall back to a default value per spec and never surface a parse
/// error here (see `planner.rs` and `link_scorer.rs`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A port adapter failed after exhausting its own retry policy.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Aggregation received a result referencing a worker id no longer in the
    /// fleet, or an otherwise inconsistent orchestrator state.
    #[error("invalid orchestrator state: {0}")]
    InvalidState(String),

    /// The research session exhausted its iteration or cost budget before
    /// reaching saturation or verification.
    #[error("budget exhausted: {0}")]
    Budget(String),

    /// Internal JSON error, only ever seen in contexts that do not expose it
    /// publicly (the planner and link scorer recover from this internally).
    #[error("internal json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
