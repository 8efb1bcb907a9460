// remediation-engine-rs/src/decision.rs
// Multi-criteria decision scoring: normalize the candidates' impact
// estimates, rank them under the configured weights, select one, explain
// every rejection, and flag whether a human must approve.

use chrono::Utc;
use pipeline_types::{
    clamp_confidence, ActionOutcome, ActionProposal, ActionType, ApprovalReason, Decision,
    Hypothesis, RejectedAction,
};

use crate::config::{ApprovalPolicy, DecisionWeights};

/// Normalized score gap below which no single dimension is said to
/// dominate a rejection.
const DOMINANT_GAP: f64 = 0.05;

const DIMENSION_PHRASES: [&str; 4] = [
    "weaker expected success-rate recovery",
    "worse latency impact",
    "higher operational cost",
    "higher execution risk",
];

/// Score the candidate set and select one action.
///
/// `proposals` comes from the planner and is never empty; a defensive
/// inert fallback keeps this total anyway.
pub fn decide(
    proposals: &[ActionProposal],
    hypotheses: &[Hypothesis],
    history: &[ActionOutcome],
    weights: &DecisionWeights,
    policy: &ApprovalPolicy,
) -> Decision {
    let owned_fallback;
    let proposals = if proposals.is_empty() {
        owned_fallback = [crate::planner::do_nothing_proposal(None, 1.0)];
        &owned_fallback[..]
    } else {
        proposals
    };

    let scored = score_candidates(proposals, weights);

    let selected_idx = scored
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.composite.total_cmp(&b.composite))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let selected = &proposals[selected_idx];
    let selected_score = scored[selected_idx].composite;

    let second_score = scored
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != selected_idx)
        .map(|(_, s)| s.composite)
        .fold(0.0_f64, f64::max);

    let rejected_actions: Vec<RejectedAction> = proposals
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != selected_idx)
        .map(|(i, action)| {
            let (reason, comparison) =
                explain_rejection(&scored[selected_idx], &scored[i], selected_score, selected);
            RejectedAction {
                action: action.clone(),
                reason,
                compared_to_selected: comparison,
            }
        })
        .collect();

    let approval_reasons = approval_reasons(selected, hypotheses, history, policy);

    let best_hypothesis_confidence = hypotheses
        .iter()
        .map(|h| h.confidence)
        .fold(0.0_f64, f64::max);
    // Base floor, plus a reward for a clear score gap, plus a reward for
    // hypothesis certainty; always capped below 1.0.
    let confidence = clamp_confidence(
        0.1 + (2.0 * (selected_score - second_score)).min(0.5)
            + 0.4 * best_hypothesis_confidence,
    );

    Decision {
        selected_action: selected.clone(),
        rejected_actions,
        score: selected_score,
        requires_human_approval: !approval_reasons.is_empty(),
        approval_reasons,
        confidence,
        decided_at: Utc::now(),
    }
}

struct ScoredCandidate {
    /// Normalized per-dimension scores, all "higher is better":
    /// success-rate change, latency, cost, risk.
    dimensions: [f64; 4],
    composite: f64,
}

/// Min-max normalize each impact dimension across the current candidate
/// set. Latency, cost, and risk are inverted so every normalized score
/// reads "higher is better".
fn score_candidates(proposals: &[ActionProposal], weights: &DecisionWeights) -> Vec<ScoredCandidate> {
    let raw: Vec<[f64; 4]> = proposals
        .iter()
        .map(|p| {
            [
                p.estimated_impact.success_rate_change,
                p.estimated_impact.latency_change_ms,
                p.estimated_impact.cost_change,
                p.estimated_impact.risk_level,
            ]
        })
        .collect();

    let mut normalized = vec![[0.0_f64; 4]; raw.len()];
    for dim in 0..4 {
        let min = raw.iter().map(|r| r[dim]).fold(f64::INFINITY, f64::min);
        let max = raw
            .iter()
            .map(|r| r[dim])
            .fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        for (i, r) in raw.iter().enumerate() {
            let mut n = if span.abs() < 1e-12 {
                0.5
            } else {
                (r[dim] - min) / span
            };
            // Dimension 0 is the only one where larger raw values are
            // better; the rest measure cost-like quantities.
            if dim != 0 {
                n = 1.0 - n;
            }
            normalized[i][dim] = n;
        }
    }

    let w = [weights.success_rate, weights.latency, weights.cost, weights.risk];
    normalized
        .into_iter()
        .map(|dimensions| {
            let composite = dimensions
                .iter()
                .zip(w.iter())
                .map(|(d, w)| d * w)
                .sum::<f64>();
            ScoredCandidate {
                dimensions,
                composite,
            }
        })
        .collect()
}

/// Phrase a rejection against the selected action: name the dimension
/// with the largest normalized gap, or fall back to the overall score gap
/// when no single dimension dominates.
fn explain_rejection(
    selected: &ScoredCandidate,
    rejected: &ScoredCandidate,
    selected_score: f64,
    selected_action: &ActionProposal,
) -> (String, String) {
    let mut dominant_dim = 0usize;
    let mut dominant_gap = f64::NEG_INFINITY;
    for dim in 0..4 {
        let gap = selected.dimensions[dim] - rejected.dimensions[dim];
        if gap > dominant_gap {
            dominant_gap = gap;
            dominant_dim = dim;
        }
    }

    let reason = if dominant_gap >= DOMINANT_GAP {
        format!(
            "{} than the selected action ({:.2} vs {:.2} after normalization)",
            DIMENSION_PHRASES[dominant_dim],
            rejected.dimensions[dominant_dim],
            selected.dimensions[dominant_dim]
        )
    } else {
        format!(
            "overall composite score {:.2} fell short of the selected action's {:.2}",
            rejected.composite, selected_score
        )
    };

    let comparison = format!(
        "composite {:.2} vs {:.2} for {}",
        rejected.composite, selected_score, selected_action.action_type
    );

    (reason, comparison)
}

/// The four independent approval checks. Any one of them routes the
/// decision to a human; the guardrails enforce the routing.
fn approval_reasons(
    selected: &ActionProposal,
    hypotheses: &[Hypothesis],
    history: &[ActionOutcome],
    policy: &ApprovalPolicy,
) -> Vec<ApprovalReason> {
    let mut reasons = Vec::new();

    if is_high_impact(selected, policy) {
        reasons.push(ApprovalReason::HighImpactAction);
    }

    let best_confidence = hypotheses
        .iter()
        .map(|h| h.confidence)
        .fold(0.0_f64, f64::max);
    if hypotheses.is_empty() || best_confidence < policy.low_confidence_threshold {
        reasons.push(ApprovalReason::LowConfidence);
    }

    let seen_before = hypotheses.iter().any(|h| {
        history
            .iter()
            .any(|o| o.pattern_type == Some(h.pattern_type))
    });
    if !seen_before {
        reasons.push(ApprovalReason::NovelSituation);
    }

    if hypotheses.len() >= 2 {
        let mut confidences: Vec<f64> = hypotheses.iter().map(|h| h.confidence).collect();
        confidences.sort_by(|a, b| b.total_cmp(a));
        if confidences[0] - confidences[1] < policy.ambiguity_margin {
            reasons.push(ApprovalReason::AmbiguousHypotheses);
        }
    }

    reasons
}

pub(crate) fn is_high_impact(action: &ActionProposal, policy: &ApprovalPolicy) -> bool {
    if matches!(
        action.action_type,
        ActionType::DisableRoute | ActionType::EnableBackupProvider
    ) {
        return true;
    }
    if action.action_type == ActionType::ShiftTraffic {
        if let Some(shift) = action.numeric_parameter("shift_percentage") {
            if shift >= policy.high_impact_traffic_shift_percent {
                return true;
            }
        }
    }
    action.estimated_impact.risk_level > 0.5
}
