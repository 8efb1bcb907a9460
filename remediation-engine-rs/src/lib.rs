// remediation-engine-rs/src/lib.rs
// Library interface for the payment-pipeline remediation engine.
//
// One reasoning cycle: snapshot in, decision (and at most one simulated
// outcome) out. The stages are pure and deterministic given the same
// inputs except for the oracle call, which is the single legitimate
// suspension point and degrades to a local fallback on any failure.
//
// Design notes:
// - This crate is a pure library crate; process wiring, persistence,
//   and the query API live in external collaborators.
// - Per-cycle failure modes are data (blocked / awaiting approval on the
//   cycle report), never errors; the only fatal error is a malformed
//   configuration at construction time.

use std::sync::Arc;
use std::time::Duration;

use oracle_client::HypothesisOracle;
use pipeline_types::{
    ActionOutcome, ActionProposal, Anomaly, ApprovalReason, Decision, DiagnosticContext,
    Hypothesis, MetricsSnapshot, RecognizedPattern,
};
use tracing::instrument;

pub mod config;
pub mod guardrails;
pub mod learning;
pub mod thresholds;

mod anomaly;
mod decision;
mod hypothesis;
mod patterns;
mod planner;
mod simulator;

#[cfg(test)]
mod tests;

pub use crate::config::{ConfigError, EngineConfig};
pub use crate::guardrails::{GuardrailVerdict, SafetyGuardrails};
pub use crate::hypothesis::HypothesisGenerator;
pub use crate::learning::{LearningContext, LearningStatistics, LearningStore};
pub use crate::simulator::ActionSimulator;
pub use crate::thresholds::ResolvedThresholds;

pub use crate::anomaly::detect_all as detect_anomalies;
pub use crate::decision::decide;
pub use crate::patterns::recognize as recognize_patterns;
pub use crate::planner::plan as plan_actions;
pub use crate::thresholds::resolve as resolve_thresholds;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for this crate. Only configuration problems are
/// fatal; everything per-cycle is represented as data.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Terminal state of one cycle's execution stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Guardrails cleared the action and the simulator ran it.
    Executed(ActionOutcome),
    /// A hard guardrail limit was violated; nothing executed.
    Blocked { reason: String },
    /// Execution suspended pending an external approval signal.
    AwaitingApproval {
        message: String,
        reasons: Vec<ApprovalReason>,
    },
}

/// Everything one reasoning cycle produced, in pipeline order.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub thresholds: ResolvedThresholds,
    pub anomalies: Vec<Anomaly>,
    pub patterns: Vec<RecognizedPattern>,
    pub hypotheses: Vec<Hypothesis>,
    pub proposals: Vec<ActionProposal>,
    pub decision: Decision,
    pub execution: ExecutionResult,
}

/// Result of one slot in a batch dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchDispatch {
    Dispatched(ExecutionResult),
    /// The concurrent-action cap was already reached; the decision is
    /// queued for a later batch, not blocked.
    Queued,
}

/// The autonomous observe -> diagnose -> decide -> act -> learn loop.
///
/// Typical usage (inside an async context):
///
/// ```ignore
/// let engine = RemediationEngine::new(EngineConfig::default(), oracle)?;
/// let report = engine.run_cycle(&current, &baseline).await;
/// ```
pub struct RemediationEngine {
    cfg: EngineConfig,
    generator: HypothesisGenerator,
    guardrails: SafetyGuardrails,
    simulator: ActionSimulator,
    store: Arc<LearningStore>,
}

impl RemediationEngine {
    /// Construct an engine owning its own learning store, failing fast on
    /// malformed configuration.
    pub fn new(cfg: EngineConfig, oracle: Arc<dyn HypothesisOracle>) -> Result<Self> {
        let store = Arc::new(LearningStore::with_capacity(cfg.learning_capacity));
        Self::with_components(cfg, oracle, store, ActionSimulator::new())
    }

    /// Construct with an injected store and simulator (shared stores,
    /// seeded randomness in tests).
    pub fn with_components(
        cfg: EngineConfig,
        oracle: Arc<dyn HypothesisOracle>,
        store: Arc<LearningStore>,
        simulator: ActionSimulator,
    ) -> Result<Self> {
        cfg.validate()?;

        let generator =
            HypothesisGenerator::new(oracle, Duration::from_secs(cfg.oracle_timeout_secs));
        let guardrails = SafetyGuardrails::new(cfg.guardrails.clone(), cfg.approval.clone());

        Ok(Self {
            cfg,
            generator,
            guardrails,
            simulator,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<LearningStore> {
        &self.store
    }

    /// Run one full reasoning cycle over a snapshot pair.
    ///
    /// Never fails: oracle trouble degrades to fallback hypotheses, and
    /// guardrail outcomes are normal terminal states on the report.
    #[instrument(
        name = "remediation_cycle",
        skip(self, current, baseline),
        fields(
            current.success_rate = current.success_rate,
            baseline.success_rate = baseline.success_rate,
        )
    )]
    pub async fn run_cycle(
        &self,
        current: &MetricsSnapshot,
        baseline: &MetricsSnapshot,
    ) -> CycleReport {
        metrics::increment_counter!("remediation_cycles_total");

        let thresholds = thresholds::resolve(&self.cfg.thresholds, Some(baseline));
        let anomalies = anomaly::detect_all(current, baseline, &thresholds);
        tracing::debug!(anomalies = anomalies.len(), "anomaly detection complete");

        let ctx = DiagnosticContext {
            anomalies: &anomalies,
            current,
            baseline,
        };
        let patterns = patterns::recognize(&ctx);
        let hypotheses = self
            .generator
            .generate_all(&patterns, current, baseline)
            .await;

        let learning = self
            .store
            .prepare_learning_context(self.cfg.learning_context_size);
        let proposals = planner::plan(&patterns, &anomalies, &learning.recent);
        let decision = decision::decide(
            &proposals,
            &hypotheses,
            &learning.recent,
            &self.cfg.weights,
            &self.cfg.approval,
        );
        tracing::info!(
            selected = %decision.selected_action.action_type,
            confidence = decision.confidence,
            requires_approval = decision.requires_human_approval,
            "decision made"
        );

        let execution = self.enforce_and_execute(&decision, current, false);

        CycleReport {
            thresholds,
            anomalies,
            patterns,
            hypotheses,
            proposals,
            decision,
            execution,
        }
    }

    /// Execute a previously suspended decision once the external approval
    /// signal has arrived. Hard guardrail limits are re-checked; approval
    /// never bypasses them.
    pub fn approve_and_execute(
        &self,
        decision: &Decision,
        current: &MetricsSnapshot,
    ) -> ExecutionResult {
        self.enforce_and_execute(decision, current, true)
    }

    /// Batch execution: process decisions sequentially and halt dispatch
    /// once the concurrent-action cap is reached; the remainder is
    /// queued, not blocked.
    pub fn run_batch(
        &self,
        decisions: &[Decision],
        current: &MetricsSnapshot,
    ) -> Vec<BatchDispatch> {
        let cap = self.guardrails.limits().max_concurrent_actions;
        let mut in_flight = 0usize;

        decisions
            .iter()
            .map(|decision| {
                if in_flight >= cap {
                    return BatchDispatch::Queued;
                }
                let result = self.enforce_and_execute(decision, current, false);
                if matches!(result, ExecutionResult::Executed(_)) {
                    in_flight += 1;
                }
                BatchDispatch::Dispatched(result)
            })
            .collect()
    }

    fn enforce_and_execute(
        &self,
        decision: &Decision,
        current: &MetricsSnapshot,
        approval_granted: bool,
    ) -> ExecutionResult {
        match self.guardrails.validate(decision, approval_granted) {
            GuardrailVerdict::Cleared => {
                let outcome = self.simulator.simulate(&decision.selected_action, current);
                self.store.store(outcome.clone());
                ExecutionResult::Executed(outcome)
            }
            GuardrailVerdict::Blocked { reason } => {
                tracing::warn!(reason = %reason, "action blocked by guardrails");
                ExecutionResult::Blocked { reason }
            }
            GuardrailVerdict::AwaitingApproval { message, reasons } => {
                tracing::info!(message = %message, "action awaiting approval");
                ExecutionResult::AwaitingApproval { message, reasons }
            }
        }
    }
}
