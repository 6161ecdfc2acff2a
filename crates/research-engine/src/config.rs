//! Tunable configuration for the discovery engine.
//!
//! This crate never reads environment variables or config files itself — wiring
//! `EngineConfig` up from the environment is the embedding application's job, with
//! a thin external layer doing that translation instead.

/// Tunables for one research run.
///
/// Defaults mirror the literal thresholds named in the design notes: a saturation
/// novelty rate of `0.05` once at least `2` iterations have run, a link queue
/// cap of `100`, fetch concurrency of `10`, and scorer concurrency of `3`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Hard ceiling on iterations regardless of novelty.
    pub max_iterations: u32,
    /// Novelty rate below which a round is eligible to trigger saturation.
    pub saturation_threshold: f64,
    /// Minimum completed iteration count before a low-novelty round is
    /// allowed to stop the loop (§4.7 step 6: `iteration_count >= 2`). This
    /// is evaluated fresh each round, not as a consecutive-rounds counter.
    pub saturation_min_iterations: u32,
    /// Per-worker novelty rate above which a worker's status is `Productive`
    /// rather than `Declining` (§4.3 step 9). Distinct from
    /// `saturation_threshold`: the global stop condition and a single
    /// worker's own productive/declining classification use different
    /// literals in the source spec (`0.05` vs `0.1`).
    pub worker_productive_threshold: f64,
    /// Maximum size of a worker's personal URL queue.
    pub max_queue_size: usize,
    /// Queue pressure (0.0-1.0) above which links are LLM-ranked before truncation.
    pub queue_pressure_threshold: f64,
    /// Maximum number of `Fetcher::batch` chunk calls in flight at once
    /// within one worker iteration (§5: "bounded chunks of ≤10 concurrent
    /// fetches"). Distinct from `fetch_batch_size`, which bounds how many
    /// URLs go into a single `batch` call.
    pub fetch_concurrency: usize,
    /// Maximum number of in-flight link-scoring batches.
    pub scorer_concurrency: usize,
    /// Number of links sent to the LLM scorer per batch call.
    pub scorer_batch_size: usize,
    /// Upper bound on search results requested across all queries of one worker.
    pub perplexity_max_results: usize,
    /// Minimum results requested per query, regardless of query count.
    pub min_results_per_query: usize,
    /// Domain `entities_found / links_added` ratio above which link scores are boosted.
    pub domain_boost_ratio: f64,
    /// Domain `entities_found / links_added` ratio below which link scores are penalized.
    pub domain_penalty_ratio: f64,
    /// Minimum `links_added` before the boost/penalty heuristic applies to a domain.
    pub domain_min_samples: u64,
    /// Score adjustment applied to high-yield domains.
    pub domain_boost_amount: i32,
    /// Score adjustment applied to low-yield domains.
    pub domain_penalty_amount: i32,
    /// Minimum attempts for a rate-limited LLM call before giving up.
    pub llm_retry_attempts: u32,
    /// Base backoff duration (milliseconds) for LLM/search retries, doubled per attempt.
    pub retry_base_backoff_ms: u64,
    /// Cap on a single URL batch size within one fetch round.
    pub fetch_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            saturation_threshold: 0.05,
            saturation_min_iterations: 2,
            worker_productive_threshold: 0.1,
            max_queue_size: 100,
            queue_pressure_threshold: 0.5,
            fetch_concurrency: 10,
            scorer_concurrency: 3,
            scorer_batch_size: 20,
            perplexity_max_results: 30,
            min_results_per_query: 3,
            domain_boost_ratio: 0.30,
            domain_penalty_ratio: 0.05,
            domain_min_samples: 5,
            domain_boost_amount: 2,
            domain_penalty_amount: -2,
            llm_retry_attempts: 5,
            retry_base_backoff_ms: 250,
            fetch_batch_size: 10,
        }
    }
}

impl EngineConfig {
    /// Start a builder seeded with [`EngineConfig::default`].
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder(Self::default())
    }

    /// `results_per_query` from §4.3 step 1: spread the result budget across
    /// queries, never dropping below `min_results_per_query`.
    pub fn results_per_query(&self, n_queries: usize) -> usize {
        let n = n_queries.max(1);
        (self.perplexity_max_results / n).max(self.min_results_per_query)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder(EngineConfig);

impl EngineConfigBuilder {
    /// Override `max_iterations`.
    pub fn max_iterations(mut self, v: u32) -> Self {
        self.0.max_iterations = v;
        self
    }

    /// Override `saturation_threshold`.
    pub fn saturation_threshold(mut self, v: f64) -> Self {
        self.0.saturation_threshold = v;
        self
    }

    /// Override `saturation_min_iterations`.
    pub fn saturation_min_iterations(mut self, v: u32) -> Self {
        self.0.saturation_min_iterations = v;
        self
    }

    /// Override `max_queue_size`.
    pub fn max_queue_size(mut self, v: usize) -> Self {
        self.0.max_queue_size = v;
        self
    }

    /// Override `fetch_concurrency`.
    pub fn fetch_concurrency(mut self, v: usize) -> Self {
        self.0.fetch_concurrency = v;
        self
    }

    /// Override `scorer_concurrency`.
    pub fn scorer_concurrency(mut self, v: usize) -> Self {
        self.0.scorer_concurrency = v;
        self
    }

    /// Finish building.
    pub fn build(self) -> EngineConfig {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.saturation_threshold, 0.05);
        assert_eq!(cfg.saturation_min_iterations, 2);
        assert_eq!(cfg.worker_productive_threshold, 0.1);
        assert_eq!(cfg.max_queue_size, 100);
    }

    #[test]
    fn results_per_query_never_drops_below_minimum() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.results_per_query(20), cfg.min_results_per_query);
        assert_eq!(cfg.results_per_query(0), cfg.perplexity_max_results);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = EngineConfig::builder()
            .max_iterations(3)
            .saturation_threshold(0.1)
            .build();
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.saturation_threshold, 0.1);
    }
}
