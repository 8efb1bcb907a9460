// oracle-client-rs/src/stub.rs
// Deterministic oracle doubles for tests, offline runs, and replay mode.

use async_trait::async_trait;

use crate::{HypothesisOracle, OracleError, OracleHypothesis};

/// Oracle that always returns the same pre-supplied response.
///
/// This is the replay-mode implementation from the external interface
/// contract: a caller that already holds an oracle response can inject it
/// here and run the cycle without any network access.
#[derive(Debug, Clone)]
pub struct StaticStubOracle {
    response: OracleHypothesis,
}

impl StaticStubOracle {
    pub fn new(mut response: OracleHypothesis) -> Self {
        if response.source.is_empty() {
            response.source = "stub".to_string();
        }
        Self { response }
    }
}

#[async_trait]
impl HypothesisOracle for StaticStubOracle {
    async fn generate(&self, _prompt: &str) -> Result<OracleHypothesis, OracleError> {
        Ok(self.response.clone())
    }
}

/// Oracle that always fails, for exercising the fallback path.
#[derive(Debug, Clone, Default)]
pub struct FailingStubOracle;

#[async_trait]
impl HypothesisOracle for FailingStubOracle {
    async fn generate(&self, _prompt: &str) -> Result<OracleHypothesis, OracleError> {
        Err(OracleError::NetworkError(
            "stub oracle configured to fail".to_string(),
        ))
    }
}
