// pipeline-types-rs/src/lib.rs
// Shared domain types for the payment-pipeline remediation loop.
//
// Every type here is a plain serde value object so the external
// persistence/audit/API layers can serialize decisions and outcomes
// verbatim without understanding the reasoning that produced them.
//
// Design notes:
// - All probability-like fields (confidence, significance, risk) live
//   strictly inside (0, 1) where the domain forbids absolute certainty;
//   `clamp_confidence` is the single place that bound is enforced.
// - Outcomes carry their typed action/pattern identity rather than
//   encoding it into an id string.

pub mod actions;
pub mod metrics;
pub mod reasoning;


pub use actions::{
    ActionCategory, ActionOutcome, ActionProposal, ActionType, ApprovalReason, Decision,
    ImpactEstimate, OutcomeStatus, RejectedAction,
};
pub use metrics::{ErrorCodeStat, IssuerMetrics, MetricsSnapshot};
pub use reasoning::{
    AlternativeExplanation, Anomaly, AnomalyType, ContributingFactor, DiagnosticContext, Evidence,
    Hypothesis, HypothesisSource, PatternType, ReasoningStep, RecognizedPattern, Severity,
};

/// Lower bound for any probability-like field in the workspace.
pub const CONFIDENCE_FLOOR: f64 = 0.01;

/// Upper bound for any probability-like field in the workspace.
pub const CONFIDENCE_CEILING: f64 = 0.99;

/// Clamp a confidence-like value into [0.01, 0.99].
///
/// Exactly 0.0 and 1.0 are forbidden throughout the pipeline: no automated
/// judgment is ever treated as certainly right or certainly wrong. NaN is
/// mapped to the floor so a malformed upstream value degrades to "barely
/// credible" rather than poisoning downstream arithmetic.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return CONFIDENCE_FLOOR;
    }
    value.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Clamp a unit-interval quantity (significance, impact share, risk) into
/// [0.0, 1.0], mapping NaN to 0.0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
