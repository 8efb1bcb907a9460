// pipeline-types-rs/src/actions.rs
// Action proposals, decisions, and simulated outcomes: the execution half
// of the reasoning cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::MetricsSnapshot;
use crate::reasoning::PatternType;

/// Broad family an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    TrafficRouting,
    RateLimiting,
    Alerting,
    DoNothing,
}

/// Closed set of remediation actions the planner may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ShiftTraffic,
    DisableRoute,
    EnableBackupProvider,
    AdjustRetryPolicy,
    ExponentialBackoff,
    ThrottlePath,
    EscalateOncall,
    SendNotification,
    LogForAnalysis,
    DoNothing,
}

impl ActionType {
    pub fn category(&self) -> ActionCategory {
        match self {
            ActionType::ShiftTraffic
            | ActionType::DisableRoute
            | ActionType::EnableBackupProvider => ActionCategory::TrafficRouting,
            ActionType::AdjustRetryPolicy
            | ActionType::ExponentialBackoff
            | ActionType::ThrottlePath => ActionCategory::RateLimiting,
            ActionType::EscalateOncall
            | ActionType::SendNotification
            | ActionType::LogForAnalysis => ActionCategory::Alerting,
            ActionType::DoNothing => ActionCategory::DoNothing,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::ShiftTraffic => "shift_traffic",
            ActionType::DisableRoute => "disable_route",
            ActionType::EnableBackupProvider => "enable_backup_provider",
            ActionType::AdjustRetryPolicy => "adjust_retry_policy",
            ActionType::ExponentialBackoff => "exponential_backoff",
            ActionType::ThrottlePath => "throttle_path",
            ActionType::EscalateOncall => "escalate_oncall",
            ActionType::SendNotification => "send_notification",
            ActionType::LogForAnalysis => "log_for_analysis",
            ActionType::DoNothing => "do_nothing",
        };
        write!(f, "{s}")
    }
}

/// Predicted, not yet realized, effect of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    /// Expected change to overall success rate (positive is better).
    pub success_rate_change: f64,
    /// Expected change to p95 latency in ms (negative is better).
    pub latency_change_ms: f64,
    /// Relative operational cost delta (negative is cheaper).
    pub cost_change: f64,
    /// Execution risk in [0, 1].
    pub risk_level: f64,
}

/// A candidate remediation with an estimated impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub id: Uuid,
    pub category: ActionCategory,
    pub action_type: ActionType,
    pub description: String,
    /// Typed parameter bag (issuer ids, percentages, multipliers).
    pub parameters: HashMap<String, serde_json::Value>,
    pub estimated_impact: ImpactEstimate,
    pub prerequisites: Vec<String>,
    pub reversible: bool,
    /// Pattern this action was planned against; None for the generic
    /// fillers. Carried through to the outcome so learning statistics
    /// never re-derive provenance from an id string.
    pub addresses_pattern: Option<PatternType>,
}

impl ActionProposal {
    /// Numeric parameter lookup; absent or non-numeric keys yield None.
    pub fn numeric_parameter(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(|v| v.as_f64())
    }

    /// String parameter lookup.
    pub fn string_parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Why a decision was routed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReason {
    HighImpactAction,
    LowConfidence,
    NovelSituation,
    AmbiguousHypotheses,
}

impl std::fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalReason::HighImpactAction => "high_impact_action",
            ApprovalReason::LowConfidence => "low_confidence",
            ApprovalReason::NovelSituation => "novel_situation",
            ApprovalReason::AmbiguousHypotheses => "ambiguous_hypotheses",
        };
        write!(f, "{s}")
    }
}

/// A candidate that lost, with a human-readable justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAction {
    pub action: ActionProposal,
    /// Never empty: every rejection is explainable.
    pub reason: String,
    pub compared_to_selected: String,
}

/// The outcome of one cycle's multi-criteria selection.
///
/// One per cycle. Derived, not persisted by the core; external layers may
/// serialize it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub selected_action: ActionProposal,
    pub rejected_actions: Vec<RejectedAction>,
    /// Composite weighted score of the selected action, in [0, 1].
    pub score: f64,
    pub requires_human_approval: bool,
    pub approval_reasons: Vec<ApprovalReason>,
    /// Confidence in the selection itself, strictly inside (0, 1).
    pub confidence: f64,
    pub decided_at: DateTime<Utc>,
}

/// Terminal status of a (simulated) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    InProgress,
    RolledBack,
}

/// The realized (simulated) effect of executing an action.
///
/// Carries the typed action and pattern identity directly so downstream
/// statistics never re-derive them from an id string. Immutable once
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub action_type: ActionType,
    /// Pattern the action was planned against, when one existed.
    pub pattern_type: Option<PatternType>,
    pub executed_at: DateTime<Utc>,
    pub status: OutcomeStatus,
    pub before: MetricsSnapshot,
    pub after: MetricsSnapshot,
    /// Normalized improvement achieved, typically the success-rate delta
    /// for routing actions and a scaled retry/latency recovery otherwise.
    pub improvement: f64,
    pub met_expectations: bool,
    pub rollback_triggered: bool,
    /// Bias applied to future planning for this action type, in [-0.2, 0.2].
    pub confidence_adjustment: f64,
    pub duration_ms: u64,
}
