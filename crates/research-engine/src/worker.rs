//! `WorkerIteration` (§4.3): one pass of search → fetch/extract → link
//! handling for a single worker. Pure function of `(WorkerState, ports)`
//! that returns a [`WorkerResult`] delta — it never mutates shared state
//! directly; the orchestrator's aggregation step (§4.7) does that.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use url::Url;

use crate::config::EngineConfig;
use crate::link_filter::LinkFilter;
use crate::link_scorer::{LinkCandidate, LinkScorer};
use crate::model::{
    attr, EnginePerformance, EvidenceSnippet, LinkPerformance, WorkerState, WorkerStatus,
};
use crate::ports::{DedupStore, ExtractedEntity, Fetcher, Searcher, SessionStore};

/// Stop-words/generic category terms that must never become a canonical
/// entity name — generic drug-class and placeholder nouns an extractor can
/// mistake for a named entity.
const GENERIC_STOP_WORDS: &[&str] = &[
    "unknown", "inhibitor", "antibody", "compound", "drug", "therapy", "therapeutic",
    "treatment", "molecule", "agent", "candidate", "product", "company", "unnamed",
];

fn is_generic_stop_word(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    lower.is_empty() || lower.len() > 100 || GENERIC_STOP_WORDS.contains(&lower.as_str())
}

/// One entity extraction attributed to the URL it came from, for the
/// orchestrator's aggregation merge.
#[derive(Debug, Clone)]
pub struct AttributedEntity {
    /// Source URL this extraction came from.
    pub source_url: String,
    /// The extracted entity candidate.
    pub entity: ExtractedEntity,
}

/// Delta produced by one worker iteration (§4.3 step 11).
#[derive(Debug, Clone)]
pub struct WorkerResult {
    /// Worker id this result belongs to.
    pub worker_id: String,
    /// Updated worker state (counters, status, queues, history).
    pub updated_state: WorkerState,
    /// Pages fetched this iteration.
    pub pages_fetched: u64,
    /// Globally-novel entities this worker contributed this iteration.
    pub new_entities: u64,
    /// `new_entities / max(pages_fetched, 1)`.
    pub novelty_rate: f64,
    /// Entities extracted this iteration, attributed to their source URL.
    pub extracted: Vec<AttributedEntity>,
    /// Outlinks surviving the link-filter/scoring pipeline this iteration.
    pub discovered_links: Vec<String>,
    /// URLs this iteration consumed (removed from the queue it built).
    pub consumed_urls: Vec<String>,
    /// USD cost incurred by this iteration's fetch/extract/score calls.
    pub cost: f64,
}

/// Ports a worker iteration needs, bundled for a single call.
pub struct WorkerPorts<'a> {
    /// Primary search engine.
    pub primary_searcher: &'a dyn Searcher,
    /// Secondary search engine, picked ~50/50 against the primary (§4.3 step 2).
    pub secondary_searcher: &'a dyn Searcher,
    /// Fetcher/extractor.
    pub fetcher: &'a dyn Fetcher,
    /// Batched link relevance scorer.
    pub link_scorer: &'a LinkScorer,
    /// Shared dedup store.
    pub dedup: &'a dyn DedupStore,
    /// Session store, for the mid-iteration progress write (step 10).
    pub session_store: &'a dyn SessionStore,
}

/// Run one iteration for `worker` against `ports`, under `config`.
pub async fn run_worker_iteration(
    mut worker: WorkerState,
    ports: &WorkerPorts<'_>,
    config: &EngineConfig,
) -> WorkerResult {
    let mut cost = 0.0;

    // Step 1: query pool.
    let queries: Vec<String> = if worker.queries.is_empty() {
        vec![worker.strategy.clone()]
    } else {
        worker.queries.clone()
    };
    let results_per_query = config.results_per_query(queries.len());

    // Step 2: engine pick (~50/50).
    let use_secondary = rand::thread_rng().gen_bool(0.5);
    let engine_id = if use_secondary {
        ports.secondary_searcher.engine_id()
    } else {
        ports.primary_searcher.engine_id()
    }
    .to_string();

    // Step 3: search.
    let search_results = if use_secondary {
        ports.secondary_searcher.search(&queries, results_per_query).await
    } else {
        ports.primary_searcher.search(&queries, results_per_query).await
    }
    .unwrap_or_default();

    let mut url_queue: Vec<String> = search_results
        .iter()
        .map(|r| r.url.clone())
        .filter(|u| Url::parse(u).map(|p| matches!(p.scheme(), "http" | "https")).unwrap_or(false))
        .collect();

    // Step 4: queue composition from the personal queue, preferring
    // unexplored domains, up to the smallest worker page budget we have
    // (the worker's own budget is encoded by the caller trimming `queries`;
    // here we simply drain up to `max_queue_size` minus what search gave us).
    let remaining_budget = config.max_queue_size.saturating_sub(url_queue.len());
    let mut from_personal = Vec::new();
    let mut deferred = Vec::new();
    for url in worker.personal_queue.drain(..) {
        let unexplored = Url::parse(&url)
            .ok()
            .and_then(|p| p.host_str().map(|h| h.to_string()))
            .map(|host| !worker.explored_domains.contains(&host))
            .unwrap_or(false);
        if from_personal.len() < remaining_budget && unexplored {
            from_personal.push(url);
        } else {
            deferred.push(url);
        }
    }
    worker.personal_queue = deferred;
    url_queue.extend(from_personal);

    // Step 5: global-visit gating.
    let mut consumed_urls = Vec::new();
    let mut gated_queue = Vec::new();
    for url in url_queue {
        if ports.dedup.is_url_visited(&worker.research_id, &url).await {
            continue;
        }
        if ports.dedup.mark_url_visited(&worker.research_id, &url).await {
            if let Some(host) = Url::parse(&url).ok().and_then(|p| p.host_str().map(|h| h.to_string())) {
                worker.explored_domains.insert(host);
            }
            consumed_urls.push(url.clone());
            gated_queue.push(url);
        }
    }

    // Step 6: batch fetch+extract, in chunks of `fetch_batch_size`, with up
    // to `fetch_concurrency` chunks in flight at once.
    let mut extracted = Vec::new();
    let mut outlinks: Vec<String> = Vec::new();
    let mut pages_fetched: u64 = 0;
    let query_context = queries.join(" ");
    let chunk_results: Vec<Vec<Result<crate::ports::FetchedPage, crate::error::FetcherError>>> =
        stream::iter(gated_queue.chunks(config.fetch_batch_size))
            .map(|chunk| ports.fetcher.batch(chunk, &query_context))
            .buffer_unordered(config.fetch_concurrency.max(1))
            .collect()
            .await;
    for results in chunk_results {
        for result in results {
            match result {
                Ok(page) => {
                    pages_fetched += 1;
                    cost += page.cost;
                    let mut page_entities = page.entities;
                    if page.is_pdf {
                        if let Some(path) = &page.pdf_path {
                            if let Ok(pdf_entities) = ports.fetcher.extract_pdf(path).await {
                                page_entities.extend(pdf_entities);
                            }
                            // Extraction failure still yields no entities for this
                            // page (§4.3 edge case); the file is cleaned up either way.
                            let _ = std::fs::remove_file(path);
                        }
                    }
                    for _ in &page_entities {
                        if let Some(domain) = domain_of(&page.url) {
                            worker
                                .link_performance
                                .entry(domain)
                                .or_insert_with(LinkPerformance::default)
                                .entities_found += 1;
                        }
                    }
                    for e in page_entities {
                        extracted.push(AttributedEntity {
                            source_url: page.url.clone(),
                            entity: e,
                        });
                    }
                    outlinks.extend(page.outlinks);
                }
                Err(_) => {
                    // Per-URL failure: logged by the caller's tracing span, iteration continues.
                }
            }
        }
    }

    // Step 7: entity accounting against the shared DedupStore.
    let mut globally_new_count: u64 = 0;
    let mut accepted_entities = Vec::new();
    for item in extracted {
        if is_generic_stop_word(&item.entity.canonical_name) {
            continue;
        }
        if ports.dedup.mark_entity_known(&item.entity.canonical_name, &item.entity.attributes).await {
            globally_new_count += 1;
        }
        accepted_entities.push(item);
    }
    worker.entities_found += accepted_entities.len() as u64;

    // Step 8: link handling.
    let link_filter = LinkFilter::new();
    let queue_size_estimate = worker.personal_queue.len();
    let mut filtered_links = Vec::new();
    for link in outlinks {
        if ports.dedup.is_url_visited(&worker.research_id, &link).await {
            continue;
        }
        if link_filter.should_reject(&link) {
            continue;
        }
        filtered_links.push(link);
    }

    let queue_pressure = LinkFilter::queue_pressure(queue_size_estimate, config.max_queue_size);
    let cap = config.max_queue_size.saturating_sub(queue_size_estimate);
    let discovered_links = if queue_pressure > config.queue_pressure_threshold {
        score_and_rank_links(ports.link_scorer, &filtered_links, &query_context, &worker, config, cap).await
    } else {
        filtered_links.into_iter().take(cap).collect()
    };

    for link in &discovered_links {
        if let Some(domain) = domain_of(link) {
            worker
                .link_performance
                .entry(domain)
                .or_insert_with(LinkPerformance::default)
                .links_added += 1;
        }
    }

    // Step 9: metrics.
    let novelty_rate = globally_new_count as f64 / pages_fetched.max(1) as f64;
    worker.status = if novelty_rate > config.worker_productive_threshold {
        worker.consecutive_low_novelty = 0;
        WorkerStatus::Productive
    } else {
        worker.consecutive_low_novelty += 1;
        WorkerStatus::Declining
    };
    worker.pages_fetched += pages_fetched;
    worker.new_entities += globally_new_count;

    let engine_perf = worker
        .search_engine_history
        .entry(query_context.clone())
        .or_default()
        .entry(engine_id)
        .or_insert_with(EnginePerformance::default);
    engine_perf.pages += pages_fetched;
    engine_perf.entities_found += globally_new_count;

    let query_perf = worker
        .query_performance
        .entry(query_context)
        .or_insert_with(EnginePerformance::default);
    query_perf.pages += pages_fetched;
    query_perf.entities_found += globally_new_count;

    // Step 10: mid-iteration checkpoint (non-atomic w.r.t. the orchestrator's
    // own end-of-iteration `save_session`; see DESIGN.md Open Question 3).
    let _ = ports
        .session_store
        .update_worker_metrics(&worker.research_id, &worker.id, worker.pages_fetched, worker.entities_found)
        .await;

    WorkerResult {
        worker_id: worker.id.clone(),
        new_entities: globally_new_count,
        pages_fetched,
        novelty_rate,
        extracted: accepted_entities,
        discovered_links,
        consumed_urls,
        cost,
        updated_state: worker,
    }
}

async fn score_and_rank_links(
    scorer: &LinkScorer,
    links: &[String],
    query: &str,
    worker: &WorkerState,
    config: &EngineConfig,
    cap: usize,
) -> Vec<String> {
    let candidates: Vec<LinkCandidate> = links
        .iter()
        .map(|url| LinkCandidate {
            url: url.clone(),
            anchor_text: String::new(),
            context: String::new(),
        })
        .collect();
    let mut scored = scorer.score_batch(&candidates, query).await;

    for s in &mut scored {
        if let Some(domain) = domain_of(&s.url) {
            if let Some(perf) = worker.link_performance.get(&domain) {
                if perf.links_added >= config.domain_min_samples {
                    let ratio = perf.entities_found as f64 / perf.links_added.max(1) as f64;
                    if ratio > config.domain_boost_ratio {
                        s.score += config.domain_boost_amount;
                    } else if ratio < config.domain_penalty_ratio {
                        s.score += config.domain_penalty_amount;
                    }
                }
            }
        }
    }

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.into_iter().take(cap).map(|s| s.url).collect()
}

fn domain_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|p| p.host_str().map(|h| h.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetcherError, SearcherError};
    use crate::ports::{FetchedPage, SearchResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptySearcher(&'static str);

    #[async_trait]
    impl Searcher for EmptySearcher {
        fn engine_id(&self) -> &str {
            self.0
        }
        async fn search(&self, _queries: &[String], _max_results: usize) -> Result<Vec<SearchResult>, SearcherError> {
            Ok(vec![])
        }
    }

    struct FixedSearcher(&'static str, Vec<String>);

    #[async_trait]
    impl Searcher for FixedSearcher {
        fn engine_id(&self) -> &str {
            self.0
        }
        async fn search(&self, _queries: &[String], _max_results: usize) -> Result<Vec<SearchResult>, SearcherError> {
            Ok(self
                .1
                .iter()
                .map(|u| SearchResult {
                    title: "t".to_string(),
                    url: u.clone(),
                    snippet: "s".to_string(),
                    source_engine: self.0.to_string(),
                    raw_content: None,
                })
                .collect())
        }
    }

    struct StubFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn batch(&self, urls: &[String], _query_context: &str) -> Vec<Result<FetchedPage, FetcherError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            urls.iter()
                .map(|u| {
                    Ok(FetchedPage {
                        url: u.clone(),
                        entities: vec![ExtractedEntity {
                            canonical_name: "BMS-986158".to_string(),
                            aliases: vec![],
                            attributes: {
                                let mut m = HashMap::new();
                                m.insert(attr::TARGET.to_string(), "CDK12/13".to_string());
                                m
                            },
                            evidence_excerpts: vec!["excerpt".to_string()],
                        }],
                        outlinks: vec![format!("{u}/outlink")],
                        is_pdf: false,
                        pdf_path: None,
                        extracted_markdown: "content".to_string(),
                        cost: 0.01,
                    })
                })
                .collect()
        }

        async fn extract_pdf(&self, _pdf_path: &str) -> Result<Vec<ExtractedEntity>, FetcherError> {
            Ok(vec![])
        }
    }

    use crate::dedup::InMemoryDedupStore;

    struct NoopSessionStore;

    #[async_trait]
    impl SessionStore for NoopSessionStore {
        async fn save_session(&self, _state: &crate::model::ResearchState) -> Result<(), crate::error::SessionStoreError> {
            Ok(())
        }
        async fn get_session(&self, _id: &str) -> Result<Option<crate::model::ResearchState>, crate::error::SessionStoreError> {
            Ok(None)
        }
        async fn list_sessions(&self, _limit: usize) -> Result<Vec<crate::ports::SessionSummary>, crate::error::SessionStoreError> {
            Ok(vec![])
        }
        async fn save_entity(&self, _research_id: &str, _entity: &crate::model::Entity) -> Result<(), crate::error::SessionStoreError> {
            Ok(())
        }
        async fn update_worker_metrics(&self, _research_id: &str, _worker_id: &str, _pages_fetched: u64, _entities_found: u64) -> Result<(), crate::error::SessionStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_search_results_still_completes() {
        let worker = WorkerState::new("w0", "r1", "broad", vec!["topic".to_string()]);
        let dedup = InMemoryDedupStore::new();
        let fetcher = StubFetcher { calls: AtomicUsize::new(0) };
        let scorer = LinkScorer::new(Arc::new(crate::tests_support::NoopLlm), 2, 10);
        let ports = WorkerPorts {
            primary_searcher: &EmptySearcher("primary"),
            secondary_searcher: &EmptySearcher("secondary"),
            fetcher: &fetcher,
            link_scorer: &scorer,
            dedup: &dedup,
            session_store: &NoopSessionStore,
        };
        let config = EngineConfig::default();
        let result = run_worker_iteration(worker, &ports, &config).await;
        assert_eq!(result.pages_fetched, 0);
        assert_eq!(result.novelty_rate, 0.0);
        assert!(matches!(result.updated_state.status, WorkerStatus::Declining));
    }

    #[tokio::test]
    async fn discovers_entity_and_marks_url_visited() {
        let worker = WorkerState::new("w0", "r1", "broad", vec!["topic".to_string()]);
        let dedup = InMemoryDedupStore::new();
        let fetcher = StubFetcher { calls: AtomicUsize::new(0) };
        let scorer = LinkScorer::new(Arc::new(crate::tests_support::NoopLlm), 2, 10);
        let searcher = FixedSearcher("primary", vec!["https://a.example/page".to_string()]);
        let ports = WorkerPorts {
            primary_searcher: &searcher,
            secondary_searcher: &searcher,
            fetcher: &fetcher,
            link_scorer: &scorer,
            dedup: &dedup,
            session_store: &NoopSessionStore,
        };
        let config = EngineConfig::default();
        let result = run_worker_iteration(worker, &ports, &config).await;
        assert_eq!(result.pages_fetched, 1);
        assert_eq!(result.extracted.len(), 1);
        assert!(dedup.is_url_visited("r1", "https://a.example/page").await);
    }

    #[tokio::test]
    async fn does_not_refetch_a_url_visited_by_another_worker() {
        let dedup = InMemoryDedupStore::new();
        dedup.mark_url_visited("r1", "https://a.example/page").await;

        let worker = WorkerState::new("w0", "r1", "broad", vec!["topic".to_string()]);
        let fetcher = StubFetcher { calls: AtomicUsize::new(0) };
        let scorer = LinkScorer::new(Arc::new(crate::tests_support::NoopLlm), 2, 10);
        let searcher = FixedSearcher("primary", vec!["https://a.example/page".to_string()]);
        let ports = WorkerPorts {
            primary_searcher: &searcher,
            secondary_searcher: &searcher,
            fetcher: &fetcher,
            link_scorer: &scorer,
            dedup: &dedup,
            session_store: &NoopSessionStore,
        };
        let config = EngineConfig::default();
        let result = run_worker_iteration(worker, &ports, &config).await;
        assert_eq!(result.pages_fetched, 0);
    }

    struct SparseFetcher;

    #[async_trait]
    impl Fetcher for SparseFetcher {
        async fn batch(&self, urls: &[String], _query_context: &str) -> Vec<Result<FetchedPage, FetcherError>> {
            urls.iter()
                .enumerate()
                .map(|(i, u)| {
                    let entities = if i == 0 {
                        vec![ExtractedEntity {
                            canonical_name: "BMS-986158".to_string(),
                            aliases: vec![],
                            attributes: HashMap::new(),
                            evidence_excerpts: vec!["excerpt".to_string()],
                        }]
                    } else {
                        vec![]
                    };
                    Ok(FetchedPage {
                        url: u.clone(),
                        entities,
                        outlinks: vec![],
                        is_pdf: false,
                        pdf_path: None,
                        extracted_markdown: String::new(),
                        cost: 0.0,
                    })
                })
                .collect()
        }

        async fn extract_pdf(&self, _pdf_path: &str) -> Result<Vec<ExtractedEntity>, FetcherError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn worker_status_uses_the_productive_threshold_not_the_saturation_threshold() {
        // 15 pages, 1 globally-new entity -> novelty_rate = 1/15 ~= 0.0667.
        // That's above the global saturation_threshold (0.05) but below the
        // per-worker productive_threshold (0.1): this worker must be classed
        // Declining, not Productive, even though 0.0667 > 0.05.
        let urls: Vec<String> = (0..15).map(|i| format!("https://a.example/p{i}")).collect();
        let worker = WorkerState::new("w0", "r1", "broad", vec!["topic".to_string()]);
        let dedup = InMemoryDedupStore::new();
        let fetcher = SparseFetcher;
        let scorer = LinkScorer::new(Arc::new(crate::tests_support::NoopLlm), 2, 10);
        let searcher = FixedSearcher("primary", urls);
        let ports = WorkerPorts {
            primary_searcher: &searcher,
            secondary_searcher: &searcher,
            fetcher: &fetcher,
            link_scorer: &scorer,
            dedup: &dedup,
            session_store: &NoopSessionStore,
        };
        let config = EngineConfig::default();
        let result = run_worker_iteration(worker, &ports, &config).await;
        assert_eq!(result.pages_fetched, 15);
        assert_eq!(result.new_entities, 1);
        assert!(result.novelty_rate > config.saturation_threshold);
        assert!(result.novelty_rate < config.worker_productive_threshold);
        assert!(matches!(result.updated_state.status, WorkerStatus::Declining));
    }

    struct PdfFetcher {
        pdf_path: String,
    }

    #[async_trait]
    impl Fetcher for PdfFetcher {
        async fn batch(&self, urls: &[String], _query_context: &str) -> Vec<Result<FetchedPage, FetcherError>> {
            urls.iter()
                .map(|u| {
                    Ok(FetchedPage {
                        url: u.clone(),
                        entities: vec![],
                        outlinks: vec![],
                        is_pdf: true,
                        pdf_path: Some(self.pdf_path.clone()),
                        extracted_markdown: String::new(),
                        cost: 0.02,
                    })
                })
                .collect()
        }

        async fn extract_pdf(&self, pdf_path: &str) -> Result<Vec<ExtractedEntity>, FetcherError> {
            assert_eq!(pdf_path, self.pdf_path);
            Ok(vec![ExtractedEntity {
                canonical_name: "BMS-986158".to_string(),
                aliases: vec![],
                attributes: HashMap::new(),
                evidence_excerpts: vec!["pdf excerpt".to_string()],
            }])
        }
    }

    #[tokio::test]
    async fn pdf_rows_run_the_secondary_extraction_path_and_delete_the_file() {
        crate::tests_support::init_test_tracing();
        // `keep()` persists the temp file past the guard's own drop, so the
        // only thing that can delete it is the worker's step-6 PDF branch.
        let tmp = tempfile::NamedTempFile::new().expect("create temp pdf");
        let (_file, path) = tmp.keep().expect("persist temp file for the worker to delete");
        let pdf_path = path.to_str().unwrap().to_string();
        assert!(path.exists());

        let worker = WorkerState::new("w0", "r1", "broad", vec!["topic".to_string()]);
        let dedup = InMemoryDedupStore::new();
        let fetcher = PdfFetcher { pdf_path: pdf_path.clone() };
        let scorer = LinkScorer::new(Arc::new(crate::tests_support::NoopLlm), 2, 10);
        let searcher = FixedSearcher("primary", vec!["https://a.example/doc.pdf".to_string()]);
        let ports = WorkerPorts {
            primary_searcher: &searcher,
            secondary_searcher: &searcher,
            fetcher: &fetcher,
            link_scorer: &scorer,
            dedup: &dedup,
            session_store: &NoopSessionStore,
        };
        let config = EngineConfig::default();
        let result = run_worker_iteration(worker, &ports, &config).await;
        assert_eq!(result.extracted.len(), 1);
        assert_eq!(result.extracted[0].entity.canonical_name, "BMS-986158");
        assert!(!path.exists(), "worker must delete the PDF temp file after extraction");
    }

    #[test]
    fn generic_stop_words_are_rejected() {
        assert!(is_generic_stop_word("Unknown"));
        assert!(is_generic_stop_word("inhibitor"));
        assert!(!is_generic_stop_word("BMS-986158"));
    }

    #[test]
    fn overly_long_names_are_rejected() {
        let long = "x".repeat(101);
        assert!(is_generic_stop_word(&long));
    }
}
