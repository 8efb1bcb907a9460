// remediation-engine-rs/src/guardrails.rs
// Safety guardrails: a second, independent validation pass over the
// decision engine's output. The decision's approval flags are advisory;
// this module is the enforcement point. Hard limits block; approval
// requirements suspend. Neither is an error: both are normal terminal
// pipeline outcomes.

use pipeline_types::{ActionType, ApprovalReason, Decision};
use serde::{Deserialize, Serialize};

use crate::config::{ApprovalPolicy, GuardrailLimits};

/// Outcome of the guardrail pass for one decision.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailVerdict {
    /// All hard limits satisfied and no approval pending; safe to execute.
    Cleared,
    /// A hard, non-bypassable limit was violated. Terminal.
    Blocked { reason: String },
    /// Execution suspended pending an explicit external approval signal.
    AwaitingApproval {
        message: String,
        reasons: Vec<ApprovalReason>,
    },
}

/// Lifecycle of an action as it moves through enforcement and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Proposed,
    Blocked,
    AwaitingApproval,
    Approved,
    Rejected,
    Executing,
    Succeeded,
    Failed,
}

impl ActionState {
    /// Legal transitions of the enforcement state machine:
    /// proposed -> blocked (terminal) | awaiting-approval | executing;
    /// awaiting-approval -> approved | rejected (terminal);
    /// approved -> executing; executing -> succeeded | failed.
    pub fn can_transition_to(&self, next: ActionState) -> bool {
        use ActionState::*;
        matches!(
            (self, next),
            (Proposed, Blocked)
                | (Proposed, AwaitingApproval)
                | (Proposed, Executing)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Rejected)
                | (Approved, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid action state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ActionState,
    pub to: ActionState,
}

/// Tracks one action through the enforcement state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub action_id: uuid::Uuid,
    pub state: ActionState,
}

impl ActionExecution {
    pub fn new(action_id: uuid::Uuid) -> Self {
        Self {
            action_id,
            state: ActionState::Proposed,
        }
    }

    pub fn advance(&mut self, next: ActionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// The enforcement pass itself.
#[derive(Debug, Clone)]
pub struct SafetyGuardrails {
    limits: GuardrailLimits,
    approval_policy: ApprovalPolicy,
}

impl SafetyGuardrails {
    pub fn new(limits: GuardrailLimits, approval_policy: ApprovalPolicy) -> Self {
        Self {
            limits,
            approval_policy,
        }
    }

    pub fn limits(&self) -> &GuardrailLimits {
        &self.limits
    }

    /// Validate a decision against the hard limits, then recompute the
    /// approval requirement. Hard limits win: a blocked action is blocked
    /// even if approval was granted.
    pub fn validate(&self, decision: &Decision, approval_granted: bool) -> GuardrailVerdict {
        let action = &decision.selected_action;

        // Minimum confidence is independent of the decision engine's own
        // approval flags.
        if decision.confidence < self.limits.min_confidence {
            metrics::increment_counter!("remediation_guardrail_blocks_total");
            return GuardrailVerdict::Blocked {
                reason: format!(
                    "decision confidence {:.2} below the hard minimum {:.2}",
                    decision.confidence, self.limits.min_confidence
                ),
            };
        }

        if action.action_type == ActionType::ShiftTraffic {
            if let Some(shift) = action.numeric_parameter("shift_percentage") {
                if shift > self.limits.max_traffic_shift_percent {
                    metrics::increment_counter!("remediation_guardrail_blocks_total");
                    return GuardrailVerdict::Blocked {
                        reason: format!(
                            "traffic shift of {shift:.0}% exceeds the {:.0}% cap",
                            self.limits.max_traffic_shift_percent
                        ),
                    };
                }
            }
        }

        if matches!(
            action.action_type,
            ActionType::AdjustRetryPolicy | ActionType::ExponentialBackoff
        ) {
            if let Some(multiplier) = action.numeric_parameter("backoff_multiplier") {
                if multiplier > self.limits.max_backoff_multiplier {
                    metrics::increment_counter!("remediation_guardrail_blocks_total");
                    return GuardrailVerdict::Blocked {
                        reason: format!(
                            "backoff multiplier {multiplier:.1} exceeds the {:.1} cap",
                            self.limits.max_backoff_multiplier
                        ),
                    };
                }
            }
        }

        // Approval recompute: a subset of the decision engine's checks,
        // duplicated here so enforcement does not trust the advisory flag
        // alone, plus the forwarded flag itself.
        let mut reasons = Vec::new();
        if crate::decision::is_high_impact(action, &self.approval_policy) {
            reasons.push(ApprovalReason::HighImpactAction);
        }
        if decision.requires_human_approval {
            for reason in &decision.approval_reasons {
                if !reasons.contains(reason) {
                    reasons.push(*reason);
                }
            }
        }

        if !reasons.is_empty() && !approval_granted {
            let listed: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
            return GuardrailVerdict::AwaitingApproval {
                message: format!(
                    "action {} suspended pending human approval ({})",
                    action.action_type,
                    listed.join(", ")
                ),
                reasons,
            };
        }

        GuardrailVerdict::Cleared
    }
}
