// remediation-engine-rs/src/planner.rs
// Action planning: expand recognized patterns into a menu of candidate
// remediations with impact estimates adjusted for severity, pattern
// confidence, and historical outcomes. Always emits at least three
// proposals, exactly one of which is do_nothing.

use std::collections::{HashMap, HashSet};

use pipeline_types::{
    clamp_confidence, ActionOutcome, ActionProposal, ActionType, Anomaly, ImpactEstimate,
    OutcomeStatus, PatternType, RecognizedPattern, Severity,
};
use serde_json::json;
use uuid::Uuid;

const MIN_PROPOSALS: usize = 3;
const NO_HISTORY_RISK_INFLATION: f64 = 1.2;

/// Build the cycle's candidate list. The result is pre-ranked by
/// `success_rate_change - risk_level`; the decision engine does the full
/// multi-criteria scoring.
pub fn plan(
    patterns: &[RecognizedPattern],
    anomalies: &[Anomaly],
    history: &[ActionOutcome],
) -> Vec<ActionProposal> {
    let severity = worst_severity(anomalies);
    let severity_multiplier = severity_multiplier(severity);

    let mut proposals: Vec<ActionProposal> = Vec::new();
    for pattern in patterns {
        for template in templates_for(pattern) {
            let mut impact = template.impact;

            // Context adjustment: scale the predicted deltas by how bad
            // things currently are, and inflate risk when the pattern
            // itself is uncertain.
            impact.success_rate_change *= severity_multiplier;
            impact.latency_change_ms *= severity_multiplier;
            impact.cost_change *= severity_multiplier;
            impact.risk_level *= 1.5 - pattern.confidence;

            apply_history(&mut impact, template.action_type, history);
            impact.risk_level = clamp_confidence(impact.risk_level);

            proposals.push(ActionProposal {
                id: Uuid::new_v4(),
                category: template.action_type.category(),
                action_type: template.action_type,
                description: template.description,
                parameters: template.parameters,
                estimated_impact: impact,
                prerequisites: template.prerequisites,
                reversible: template.reversible,
                addresses_pattern: Some(pattern.pattern_type),
            });
        }
    }

    proposals.push(do_nothing_proposal(severity, severity_multiplier));

    dedup_by_action_type(&mut proposals);

    // Guarantee the minimum menu with inert generic proposals.
    if proposals.len() < MIN_PROPOSALS {
        for filler in [generic_notification(), generic_logging()] {
            if proposals.len() >= MIN_PROPOSALS {
                break;
            }
            if !proposals.iter().any(|p| p.action_type == filler.action_type) {
                proposals.push(filler);
            }
        }
    }

    proposals.sort_by(|a, b| {
        let score_a = a.estimated_impact.success_rate_change - a.estimated_impact.risk_level;
        let score_b = b.estimated_impact.success_rate_change - b.estimated_impact.risk_level;
        score_b.total_cmp(&score_a)
    });
    proposals
}

/// Blend predicted success-rate change 50/50 with the historically
/// observed average for the same action type, and scale risk by how
/// often that action actually succeeded. With no history, inflate risk
/// 20% to reflect the unknown.
fn apply_history(impact: &mut ImpactEstimate, action_type: ActionType, history: &[ActionOutcome]) {
    let relevant: Vec<&ActionOutcome> = history
        .iter()
        .filter(|o| o.action_type == action_type)
        .collect();

    if relevant.is_empty() {
        impact.risk_level *= NO_HISTORY_RISK_INFLATION;
        return;
    }

    let observed_delta: f64 = relevant
        .iter()
        .map(|o| o.after.success_rate - o.before.success_rate)
        .sum::<f64>()
        / relevant.len() as f64;
    impact.success_rate_change = 0.5 * impact.success_rate_change + 0.5 * observed_delta;

    let success_rate = relevant
        .iter()
        .filter(|o| o.status == OutcomeStatus::Success)
        .count() as f64
        / relevant.len() as f64;
    impact.risk_level *= 1.5 - success_rate;
}

fn worst_severity(anomalies: &[Anomaly]) -> Option<Severity> {
    anomalies.iter().map(|a| a.severity).max()
}

fn severity_multiplier(severity: Option<Severity>) -> f64 {
    match severity {
        None => 1.0,
        Some(Severity::Low) => 0.75,
        Some(Severity::Medium) => 1.0,
        Some(Severity::High) => 1.25,
        Some(Severity::Critical) => 1.5,
    }
}

/// Inaction has cost too: a small negative success-rate drift and a risk
/// proportional to how severe the current anomalies are.
pub(crate) fn do_nothing_proposal(
    severity: Option<Severity>,
    severity_multiplier: f64,
) -> ActionProposal {
    let risk = match severity {
        None => 0.02,
        Some(Severity::Low) => 0.05,
        Some(Severity::Medium) => 0.15,
        Some(Severity::High) => 0.30,
        Some(Severity::Critical) => 0.50,
    };

    ActionProposal {
        id: Uuid::new_v4(),
        category: ActionType::DoNothing.category(),
        action_type: ActionType::DoNothing,
        description: "take no action this cycle and re-observe".to_string(),
        parameters: HashMap::new(),
        estimated_impact: ImpactEstimate {
            success_rate_change: -0.005 * severity_multiplier,
            latency_change_ms: 0.0,
            cost_change: 0.0,
            risk_level: risk,
        },
        prerequisites: Vec::new(),
        reversible: true,
        addresses_pattern: None,
    }
}

fn generic_notification() -> ActionProposal {
    ActionProposal {
        id: Uuid::new_v4(),
        category: ActionType::SendNotification.category(),
        action_type: ActionType::SendNotification,
        description: "notify the payments channel with the current diagnosis".to_string(),
        parameters: HashMap::from([("channel".to_string(), json!("payments-ops"))]),
        estimated_impact: ImpactEstimate {
            success_rate_change: 0.0,
            latency_change_ms: 0.0,
            cost_change: 0.05,
            risk_level: 0.05,
        },
        prerequisites: Vec::new(),
        reversible: true,
        addresses_pattern: None,
    }
}

fn generic_logging() -> ActionProposal {
    ActionProposal {
        id: Uuid::new_v4(),
        category: ActionType::LogForAnalysis.category(),
        action_type: ActionType::LogForAnalysis,
        description: "capture a detailed diagnostic snapshot for offline analysis".to_string(),
        parameters: HashMap::new(),
        estimated_impact: ImpactEstimate {
            success_rate_change: 0.0,
            latency_change_ms: 0.0,
            cost_change: 0.02,
            risk_level: 0.02,
        },
        prerequisites: Vec::new(),
        reversible: true,
        addresses_pattern: None,
    }
}

/// First occurrence wins: patterns are processed in descending confidence
/// order, so the most confident pattern's version of an action survives.
fn dedup_by_action_type(proposals: &mut Vec<ActionProposal>) {
    let mut seen: HashSet<ActionType> = HashSet::new();
    proposals.retain(|p| seen.insert(p.action_type));
}

struct ActionTemplate {
    action_type: ActionType,
    description: String,
    parameters: HashMap<String, serde_json::Value>,
    impact: ImpactEstimate,
    prerequisites: Vec<String>,
    reversible: bool,
}

fn templates_for(pattern: &RecognizedPattern) -> Vec<ActionTemplate> {
    let target = pattern
        .affected_issuers
        .first()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    match pattern.pattern_type {
        PatternType::IssuerDegradation => vec![
            ActionTemplate {
                action_type: ActionType::ShiftTraffic,
                description: format!("shift 30% of traffic away from issuer {target}"),
                parameters: HashMap::from([
                    ("from_issuer".to_string(), json!(target)),
                    ("shift_percentage".to_string(), json!(30.0)),
                ]),
                impact: ImpactEstimate {
                    success_rate_change: 0.06,
                    latency_change_ms: -30.0,
                    cost_change: 0.2,
                    risk_level: 0.35,
                },
                prerequisites: vec!["alternate acquirer capacity".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::DisableRoute,
                description: format!("disable the route to issuer {target} entirely"),
                parameters: HashMap::from([("issuer".to_string(), json!(target))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.08,
                    latency_change_ms: -50.0,
                    cost_change: 0.5,
                    risk_level: 0.55,
                },
                prerequisites: vec!["remaining routes can absorb the volume".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::EnableBackupProvider,
                description: format!("enable the backup provider for issuer {target}"),
                parameters: HashMap::from([
                    ("issuer".to_string(), json!(target)),
                    ("provider".to_string(), json!("backup")),
                ]),
                impact: ImpactEstimate {
                    success_rate_change: 0.07,
                    latency_change_ms: 20.0,
                    cost_change: 0.6,
                    risk_level: 0.45,
                },
                prerequisites: vec!["backup provider contract active".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::EscalateOncall,
                description: "page the payments on-call with the issuer diagnosis".to_string(),
                parameters: HashMap::from([("issuer".to_string(), json!(target))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 0.0,
                    cost_change: 0.1,
                    risk_level: 0.05,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
        ],
        PatternType::RetryStorm => vec![
            ActionTemplate {
                action_type: ActionType::AdjustRetryPolicy,
                description: "lower the retry budget to 2 attempts per transaction".to_string(),
                parameters: HashMap::from([("max_retries".to_string(), json!(2))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.03,
                    latency_change_ms: -40.0,
                    cost_change: 0.1,
                    risk_level: 0.30,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::ExponentialBackoff,
                description: "enable exponential backoff between retry attempts".to_string(),
                parameters: HashMap::from([("backoff_multiplier".to_string(), json!(2.0))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.025,
                    latency_change_ms: -60.0,
                    cost_change: 0.1,
                    risk_level: 0.25,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::ThrottlePath,
                description: "throttle the retry path by 20%".to_string(),
                parameters: HashMap::from([("throttle_percentage".to_string(), json!(20.0))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.02,
                    latency_change_ms: -80.0,
                    cost_change: 0.3,
                    risk_level: 0.40,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::ShiftTraffic,
                description: format!("shift 20% of traffic away from issuer {target}"),
                parameters: HashMap::from([
                    ("from_issuer".to_string(), json!(target)),
                    ("shift_percentage".to_string(), json!(20.0)),
                ]),
                impact: ImpactEstimate {
                    success_rate_change: 0.03,
                    latency_change_ms: -20.0,
                    cost_change: 0.2,
                    risk_level: 0.40,
                },
                prerequisites: vec!["alternate acquirer capacity".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::SendNotification,
                description: "alert the payments channel about the retry storm".to_string(),
                parameters: HashMap::from([("channel".to_string(), json!("payments-ops"))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 0.0,
                    cost_change: 0.05,
                    risk_level: 0.05,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
        ],
        PatternType::LatencySpike => vec![
            ActionTemplate {
                action_type: ActionType::ThrottlePath,
                description: "throttle low-priority traffic by 15% to relieve the path".to_string(),
                parameters: HashMap::from([("throttle_percentage".to_string(), json!(15.0))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.01,
                    latency_change_ms: -100.0,
                    cost_change: 0.3,
                    risk_level: 0.35,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::ShiftTraffic,
                description: format!("shift 20% of traffic away from issuer {target}"),
                parameters: HashMap::from([
                    ("from_issuer".to_string(), json!(target)),
                    ("shift_percentage".to_string(), json!(20.0)),
                ]),
                impact: ImpactEstimate {
                    success_rate_change: 0.02,
                    latency_change_ms: -60.0,
                    cost_change: 0.2,
                    risk_level: 0.35,
                },
                prerequisites: vec!["alternate acquirer capacity".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::EnableBackupProvider,
                description: format!("enable the backup provider for issuer {target}"),
                parameters: HashMap::from([
                    ("issuer".to_string(), json!(target)),
                    ("provider".to_string(), json!("backup")),
                ]),
                impact: ImpactEstimate {
                    success_rate_change: 0.03,
                    latency_change_ms: -40.0,
                    cost_change: 0.6,
                    risk_level: 0.45,
                },
                prerequisites: vec!["backup provider contract active".to_string()],
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::LogForAnalysis,
                description: "enable verbose latency tracing on the payment path".to_string(),
                parameters: HashMap::from([("verbosity".to_string(), json!("debug"))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 5.0,
                    cost_change: 0.05,
                    risk_level: 0.05,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::SendNotification,
                description: "alert the payments channel about the latency spike".to_string(),
                parameters: HashMap::from([("channel".to_string(), json!("payments-ops"))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 0.0,
                    cost_change: 0.05,
                    risk_level: 0.05,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
        ],
        PatternType::Noise => vec![
            ActionTemplate {
                action_type: ActionType::LogForAnalysis,
                description: "record the deviation for trend analysis".to_string(),
                parameters: HashMap::new(),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 0.0,
                    cost_change: 0.02,
                    risk_level: 0.02,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
            ActionTemplate {
                action_type: ActionType::SendNotification,
                description: "note the mild deviation in the payments channel".to_string(),
                parameters: HashMap::from([("channel".to_string(), json!("payments-ops"))]),
                impact: ImpactEstimate {
                    success_rate_change: 0.0,
                    latency_change_ms: 0.0,
                    cost_change: 0.05,
                    risk_level: 0.05,
                },
                prerequisites: Vec::new(),
                reversible: true,
            },
        ],
    }
}
