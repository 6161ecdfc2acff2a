//! An [`Llm`] that answers from a list of `(substring, response)` rules,
//! tried in order against the prompt text. Falls back to `"{}"` if nothing
//! matches, which every lossy-JSON-parsing call site in `research-engine`
//! treats as "no opinion" rather than an error.

use async_trait::async_trait;
use parking_lot::Mutex;
use research_engine::{Llm, LlmError, LlmResponse};

/// Scripted LLM double for integration tests that exercise the planner,
/// verifier, and link scorer behind a single shared port.
pub struct FakeLlm {
    rules: Vec<(String, String)>,
    calls: Mutex<Vec<String>>,
    input_price: f64,
    output_price: f64,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
            input_price: 0.0,
            output_price: 0.0,
        }
    }
}

impl FakeLlm {
    /// Start with no rules (every call falls back to `"{}"`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` for the first prompt containing `substring`.
    pub fn on(mut self, substring: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((substring.into(), response.into()));
        self
    }

    /// Set per-token USD prices for cost-accounting assertions.
    pub fn with_prices(mut self, input_price: f64, output_price: f64) -> Self {
        self.input_price = input_price;
        self.output_price = output_price;
        self
    }

    /// Prompts this LLM was called with, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Llm for FakeLlm {
    async fn chat(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        self.calls.lock().push(prompt.to_string());
        let text = self
            .rules
            .iter()
            .find(|(substring, _)| prompt.contains(substring.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| "{}".to_string());
        Ok(LlmResponse {
            text,
            input_tokens: prompt.len() as u32,
            output_tokens: 16,
        })
    }

    fn input_token_price(&self) -> f64 {
        self.input_price
    }

    fn output_token_price(&self) -> f64 {
        self.output_price
    }
}

/// Always fails, for exercising fallback paths that depend on an LLM outage.
pub struct FailingLlm;

#[async_trait]
impl Llm for FailingLlm {
    async fn chat(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
        Err(LlmError::CallFailed("fake llm configured to fail".to_string()))
    }

    fn input_token_price(&self) -> f64 {
        0.0
    }

    fn output_token_price(&self) -> f64 {
        0.0
    }
}
