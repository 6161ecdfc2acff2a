//! Verification and gap analysis (§4.6). `verify_entity` is an LLM call;
//! `gap_fill_queries` that follows it is pure string assembly, not an LLM
//! call — a deterministic follow-on rather than another round-trip.

use std::sync::Arc;

use serde::Deserialize;

use crate::json_parse::extract_json_object;
use crate::model::{attr, Entity, QueryAnalysis, VerificationStatus};
use crate::ports::Llm;

/// P0 fields: missing any of these differentiates a gap-fillable `UNCERTAIN`
/// from a terminal one (§4.6).
pub const P0_FIELDS: &[&str] = &[attr::TARGET, attr::OWNER, attr::PRODUCT_STAGE];

/// Outcome of verifying one entity against the plan's constraints.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Entity this result is for.
    pub canonical_name: String,
    /// Resolved status.
    pub status: VerificationStatus,
    /// Reason for rejection, if rejected.
    pub rejection_reason: Option<String>,
    /// P0 fields still missing, if any.
    pub missing_fields: Vec<String>,
    /// Verifier confidence, 0-100.
    pub confidence: u8,
    /// Free-form explanation.
    pub explanation: String,
    /// USD cost of this verification call.
    pub cost: f64,
}

/// Verifier over an [`Llm`] port.
pub struct Verifier {
    llm: Arc<dyn Llm>,
}

impl Verifier {
    /// Build a verifier over the given LLM port.
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    /// Classify `entity` against `constraints` using the 4-tier evidence
    /// trust hierarchy described in §4.6. On LLM failure, returns
    /// `UNCERTAIN` with all P0 fields flagged missing rather than propagating
    /// an error — a failed verification call should not drop an otherwise
    /// valid candidate.
    pub async fn verify_entity(&self, entity: &Entity, constraints: &QueryAnalysis) -> VerificationResult {
        let prompt = verify_prompt(entity, constraints);
        let response = match self.llm.chat(&prompt).await {
            Ok(r) => r,
            Err(_) => return fallback_uncertain(entity),
        };

        let cost = self.llm.input_token_price() * response.input_tokens as f64
            + self.llm.output_token_price() * response.output_tokens as f64;

        match extract_json_object(&response.text).and_then(|v| serde_json::from_value::<RawVerification>(v).ok()) {
            Some(raw) => raw.into_result(entity.canonical_name.clone(), cost),
            None => {
                let mut r = fallback_uncertain(entity);
                r.cost = cost;
                r
            }
        }
    }

    /// Deterministic gap-fill queries for each P0 field still missing after
    /// verification (§4.6). Pure string assembly; no LLM call.
    pub fn gap_fill_queries(&self, entity: &Entity, result: &VerificationResult) -> Vec<String> {
        result
            .missing_fields
            .iter()
            .flat_map(|field| gap_queries_for_field(&entity.canonical_name, field))
            .collect()
    }
}

fn gap_queries_for_field(name: &str, field: &str) -> Vec<String> {
    match field {
        f if f == attr::OWNER => vec![
            format!("\"{name}\" developer owner company"),
            format!("who developed \"{name}\""),
        ],
        f if f == attr::TARGET => vec![format!("\"{name}\" mechanism of action target")],
        f if f == attr::PRODUCT_STAGE => vec![format!("\"{name}\" clinical trial phase status")],
        other => vec![format!("\"{name}\" {other}")],
    }
}

fn missing_p0_fields(entity: &Entity) -> Vec<String> {
    P0_FIELDS
        .iter()
        .filter(|f| {
            entity
                .attributes
                .get(**f)
                .map(|v| v.is_empty() || v == attr::UNKNOWN)
                .unwrap_or(true)
        })
        .map(|f| f.to_string())
        .collect()
}

fn fallback_uncertain(entity: &Entity) -> VerificationResult {
    VerificationResult {
        canonical_name: entity.canonical_name.clone(),
        status: VerificationStatus::Uncertain,
        rejection_reason: None,
        missing_fields: missing_p0_fields(entity),
        confidence: 0,
        explanation: "fallback: verifier call failed or returned unparseable output".to_string(),
        cost: 0.0,
    }
}

fn verify_prompt(entity: &Entity, constraints: &QueryAnalysis) -> String {
    format!(
        "Verify whether entity \"{}\" (attributes: {:?}, evidence count: {}) satisfies \
         these hard constraints: {:?}.\n\
         Use a 4-tier evidence trust hierarchy: regulatory/registry sources outrank \
         company-official/peer-reviewed sources, which outrank secondary news/vendor \
         sources, which outrank blogs/social posts. Resolve same-tier conflicts by \
         recency, then by source count.\n\
         Respond as JSON: {{\"status\": \"VERIFIED\"|\"UNCERTAIN\"|\"REJECTED\", \
         \"rejection_reason\": string|null, \"missing_fields\": [...], \
         \"confidence\": 0-100, \"explanation\": string}}",
        entity.canonical_name,
        entity.attributes,
        entity.evidence.len(),
        constraints.hard_constraints,
    )
}

#[derive(Debug, Deserialize)]
struct RawVerification {
    status: String,
    #[serde(default)]
    rejection_reason: Option<String>,
    #[serde(default)]
    missing_fields: Vec<String>,
    #[serde(default)]
    confidence: u8,
    #[serde(default)]
    explanation: String,
}

impl RawVerification {
    fn into_result(self, canonical_name: String, cost: f64) -> VerificationResult {
        let status = match self.status.to_ascii_uppercase().as_str() {
            "VERIFIED" => VerificationStatus::Verified,
            "REJECTED" => VerificationStatus::Rejected,
            _ => VerificationStatus::Uncertain,
        };
        VerificationResult {
            canonical_name,
            status,
            rejection_reason: self.rejection_reason,
            missing_fields: self.missing_fields,
            confidence: self.confidence,
            explanation: self.explanation,
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::ports::LlmResponse;
    use async_trait::async_trait;

    struct StubLlm(String);

    #[async_trait]
    impl Llm for StubLlm {
        async fn chat(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: self.0.clone(),
                input_tokens: 5,
                output_tokens: 5,
            })
        }
        fn input_token_price(&self) -> f64 {
            0.00001
        }
        fn output_token_price(&self) -> f64 {
            0.00002
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl Llm for FailingLlm {
        async fn chat(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
            Err(LlmError::CallFailed("down".to_string()))
        }
        fn input_token_price(&self) -> f64 {
            0.0
        }
        fn output_token_price(&self) -> f64 {
            0.0
        }
    }

    fn entity_with_target_and_modality() -> Entity {
        let mut e = Entity::new("BMS-986158");
        e.attributes.insert(attr::TARGET.to_string(), "CDK12".to_string());
        e.attributes.insert(attr::MODALITY.to_string(), "Small Molecule".to_string());
        e
    }

    #[tokio::test]
    async fn verified_status_parses() {
        let json = r#"{"status": "VERIFIED", "missing_fields": [], "confidence": 92, "explanation": "matches"}"#;
        let verifier = Verifier::new(Arc::new(StubLlm(json.to_string())));
        let constraints = QueryAnalysis::default();
        let result = verifier.verify_entity(&entity_with_target_and_modality(), &constraints).await;
        assert!(matches!(result.status, VerificationStatus::Verified));
        assert_eq!(result.confidence, 92);
    }

    #[tokio::test]
    async fn uncertain_with_missing_owner_yields_gap_queries() {
        let json = r#"{"status": "UNCERTAIN", "missing_fields": ["owner"], "confidence": 40, "explanation": "owner unknown"}"#;
        let verifier = Verifier::new(Arc::new(StubLlm(json.to_string())));
        let entity = entity_with_target_and_modality();
        let constraints = QueryAnalysis::default();
        let result = verifier.verify_entity(&entity, &constraints).await;
        let queries = verifier.gap_fill_queries(&entity, &result);
        assert_eq!(
            queries,
            vec![
                "\"BMS-986158\" developer owner company".to_string(),
                "who developed \"BMS-986158\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_uncertain_with_missing_p0() {
        let verifier = Verifier::new(Arc::new(FailingLlm));
        let entity = entity_with_target_and_modality();
        let constraints = QueryAnalysis::default();
        let result = verifier.verify_entity(&entity, &constraints).await;
        assert!(matches!(result.status, VerificationStatus::Uncertain));
        assert!(result.missing_fields.contains(&attr::OWNER.to_string()));
    }
}
