//! Batched LLM relevance scoring of candidate links with a process-local
//! cache (§4.4): build one prompt per batch, parse lossily, fall back to a
//! neutral value on failure rather than propagating an error up through the
//! worker iteration.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::json_parse::extract_json_object;
use crate::ports::Llm;

/// One candidate link awaiting a relevance score.
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    /// The link URL.
    pub url: String,
    /// Anchor text as it appeared on the source page.
    pub anchor_text: String,
    /// Surrounding context snippet, if available.
    pub context: String,
}

/// A scored link.
#[derive(Debug, Clone)]
pub struct ScoredLink {
    /// The link URL.
    pub url: String,
    /// Relevance score in `[0, 10]`.
    pub score: i32,
    /// Free-form reasoning from the LLM, or a fixed note on fallback.
    pub reasoning: String,
    /// Whether this score came from the cache rather than a fresh call.
    pub cached: bool,
}

const NEUTRAL_SCORE: i32 = 5;
const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Deserialize, Default)]
struct BatchScoreResponse {
    #[serde(default)]
    scores: Vec<LinkScoreEntry>,
}

#[derive(Debug, Deserialize)]
struct LinkScoreEntry {
    url: String,
    score: i32,
    #[serde(default)]
    reasoning: String,
}

/// Batched, cached link relevance scorer.
pub struct LinkScorer {
    llm: Arc<dyn Llm>,
    cache: DashMap<String, (i32, String)>,
    semaphore: Arc<Semaphore>,
    batch_size: usize,
}

impl LinkScorer {
    /// Build a scorer bounding in-flight batches to `concurrency`.
    pub fn new(llm: Arc<dyn Llm>, concurrency: usize, batch_size: usize) -> Self {
        Self {
            llm,
            cache: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            batch_size: if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size },
        }
    }

    /// Score a batch of candidates against `query`. Cached URLs are resolved
    /// without an LLM call; the remainder is chunked into `batch_size`-sized
    /// groups and scored concurrently, bounded by the scorer's semaphore.
    pub async fn score_batch(&self, candidates: &[LinkCandidate], query: &str) -> Vec<ScoredLink> {
        let mut results = HashMap::with_capacity(candidates.len());
        let mut uncached = Vec::new();

        for c in candidates {
            if let Some(entry) = self.cache.get(&c.url) {
                results.insert(
                    c.url.clone(),
                    ScoredLink {
                        url: c.url.clone(),
                        score: entry.0,
                        reasoning: entry.1.clone(),
                        cached: true,
                    },
                );
            } else {
                uncached.push(c.clone());
            }
        }

        let mut futures = Vec::new();
        for chunk in uncached.chunks(self.batch_size) {
            futures.push(self.score_chunk(chunk.to_vec(), query.to_string()));
        }
        for scored in futures::future::join_all(futures).await {
            for s in scored {
                self.cache.insert(s.url.clone(), (s.score, s.reasoning.clone()));
                results.insert(s.url.clone(), s);
            }
        }

        candidates
            .iter()
            .map(|c| {
                results.remove(&c.url).unwrap_or(ScoredLink {
                    url: c.url.clone(),
                    score: NEUTRAL_SCORE,
                    reasoning: "fallback: no score returned".to_string(),
                    cached: false,
                })
            })
            .collect()
    }

    async fn score_chunk(&self, chunk: Vec<LinkCandidate>, query: String) -> Vec<ScoredLink> {
        let _permit = self.semaphore.acquire().await;
        let prompt = build_prompt(&chunk, &query);

        let response = match self.llm.chat(&prompt).await {
            Ok(r) => r,
            Err(_) => return neutral_fallback(&chunk),
        };

        let parsed: BatchScoreResponse = match extract_json_object(&response.text) {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => BatchScoreResponse::default(),
        };

        let by_url: HashMap<&str, &LinkScoreEntry> =
            parsed.scores.iter().map(|e| (e.url.as_str(), e)).collect();

        chunk
            .iter()
            .map(|c| match by_url.get(c.url.as_str()) {
                Some(entry) => ScoredLink {
                    url: c.url.clone(),
                    score: entry.score.clamp(0, 10),
                    reasoning: entry.reasoning.clone(),
                    cached: false,
                },
                None => ScoredLink {
                    url: c.url.clone(),
                    score: NEUTRAL_SCORE,
                    reasoning: "fallback: missing from llm response".to_string(),
                    cached: false,
                },
            })
            .collect()
    }
}

fn neutral_fallback(chunk: &[LinkCandidate]) -> Vec<ScoredLink> {
    chunk
        .iter()
        .map(|c| ScoredLink {
            url: c.url.clone(),
            score: NEUTRAL_SCORE,
            reasoning: "fallback: llm call failed".to_string(),
            cached: false,
        })
        .collect()
}

fn build_prompt(chunk: &[LinkCandidate], query: &str) -> String {
    let mut prompt = format!(
        "Score each link's relevance to the research query \"{query}\" on a 0-10 scale. \
         Respond as JSON: {{\"scores\": [{{\"url\": ..., \"score\": ..., \"reasoning\": ...}}]}}\n\n"
    );
    for c in chunk {
        prompt.push_str(&format!("- url: {}\n  anchor: {}\n  context: {}\n", c.url, c.anchor_text, c.context));
    }
    prompt
}
