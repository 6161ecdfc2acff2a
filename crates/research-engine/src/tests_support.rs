//! Shared test doubles used by more than one module's `#[cfg(test)]` block.
#![cfg(test)]

use async_trait::async_trait;

use crate::error::LlmError;
use crate::ports::{Llm, LlmResponse};

/// Install a `tracing-subscriber` fmt layer for the current test process, so
/// `tracing::info!`/`instrument` spans from a multi-iteration run are visible
/// with `cargo test -- --nocapture` instead of silently discarded. Safe to
/// call from more than one test; only the first call actually installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// An [`Llm`] that always succeeds with an empty completion; useful when a
/// test only needs the port to be present, not to drive scoring behavior.
pub struct NoopLlm;

#[async_trait]
impl Llm for NoopLlm {
    async fn chat(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            text: "{}".to_string(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
    fn input_token_price(&self) -> f64 {
        0.0
    }
    fn output_token_price(&self) -> f64 {
        0.0
    }
}
