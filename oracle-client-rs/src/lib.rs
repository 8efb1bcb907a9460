// oracle-client-rs/src/lib.rs
// Reasoning-oracle boundary for the remediation core.
//
// The hypothesis step's "intelligence" is delegated to a black-box text
// completion service. This crate owns that boundary:
//
// - `HypothesisOracle`: the capability trait the engine depends on
// - `HttpHypothesisOracle`: live adapter for an OpenAI-compatible backend
//   with exponential backoff retries
// - `StaticStubOracle` / `FailingStubOracle`: deterministic local doubles
//   for tests, offline runs, and replay mode
//
// Nothing outside this crate depends on a concrete vendor SDK type; the
// engine holds an `Arc<dyn HypothesisOracle>` and can be rewired without
// touching any other component.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod http_oracle;
mod stub;


pub use http_oracle::{HttpHypothesisOracle, HttpOracleConfig};
pub use stub::{FailingStubOracle, StaticStubOracle};

/// One observation -> inference step as reported by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleReasoningStep {
    pub observation: String,
    pub inference: String,
}

/// An alternative explanation as reported by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleAlternative {
    pub explanation: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub why_less_likely: String,
}

/// The structured response the oracle contract promises.
///
/// This is the wire shape; the engine validates it (non-empty hypothesis
/// text, bounded confidence, synthesized reasoning chain if missing)
/// before converting it into a domain `Hypothesis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleHypothesis {
    pub primary_hypothesis: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_chain: Vec<OracleReasoningStep>,
    #[serde(default)]
    pub alternative_explanations: Vec<OracleAlternative>,
    /// Backend identifier for observability ("openai", "stub", ...).
    #[serde(default)]
    pub source: String,
}

/// Error taxonomy for oracle calls.
///
/// The split mirrors retry semantics: server/network/rate-limit errors are
/// transient and worth retrying with backoff; request and parse errors are
/// not and surface immediately so the caller can fall back.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    /// Deadline imposed by the caller (the hypothesis generator), not by
    /// the HTTP transport; never retried.
    #[error("oracle call timed out after {0}s")]
    Timeout(u64),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unknown oracle error: {0}")]
    Unknown(String),
}

impl OracleError {
    /// Whether the retry loop should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::ServerError(_)
                | OracleError::NetworkError(_)
                | OracleError::RateLimited(_)
        )
    }
}

/// Capability interface for causal-hypothesis generation.
///
/// The single network-facing seam in the core: given a structured prompt
/// summarizing patterns and metrics, return a structured hypothesis. Must
/// be swappable (different backend, or a pure-local stub) without touching
/// any other component.
#[async_trait]
pub trait HypothesisOracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<OracleHypothesis, OracleError>;
}

/// Extract the first JSON object from a model completion.
///
/// Completions frequently wrap the JSON in prose or a code fence; this
/// takes the outermost `{...}` span and parses it.
pub fn parse_hypothesis_json(text: &str) -> Result<OracleHypothesis, OracleError> {
    let start = text
        .find('{')
        .ok_or_else(|| OracleError::ParseError("no JSON object in completion".to_string()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| OracleError::ParseError("unterminated JSON object".to_string()))?;
    if end < start {
        return Err(OracleError::ParseError(
            "malformed JSON object bounds".to_string(),
        ));
    }

    serde_json::from_str::<OracleHypothesis>(&text[start..=end])
        .map_err(|e| OracleError::ParseError(format!("failed to parse oracle JSON: {e}")))
}
