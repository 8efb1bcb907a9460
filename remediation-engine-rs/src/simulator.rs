// remediation-engine-rs/src/simulator.rs
// Action-outcome simulation. Pure with respect to the outside world:
// every action type has a synthetic effect model applied to a copy of
// the baseline snapshot, and no real system is ever touched. Randomness
// models simulation uncertainty and sits behind a seedable RNG so tests
// can pin outcomes.

use std::sync::Mutex;

use chrono::Utc;
use pipeline_types::{
    ActionCategory, ActionOutcome, ActionProposal, ActionType, MetricsSnapshot, OutcomeStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CONFIDENCE_ADJUSTMENT_BOUND: f64 = 0.2;
/// A realized regression this large trips the simulated rollback.
const ROLLBACK_THRESHOLD: f64 = -0.02;

pub struct ActionSimulator {
    rng: Mutex<StdRng>,
}

impl ActionSimulator {
    /// Entropy-seeded simulator for live runs.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic simulator for tests and replay.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample(&self, low: f64, high: f64) -> f64 {
        self.rng.lock().unwrap().gen_range(low..high)
    }

    /// Simulate executing `action` against `baseline` and record the
    /// outcome. Synchronous and fast; there is nothing to cancel.
    pub fn simulate(&self, action: &ActionProposal, baseline: &MetricsSnapshot) -> ActionOutcome {
        let before = baseline.clone();
        let predicted = action.estimated_impact.success_rate_change;

        let mut after = before.clone();
        after.timestamp = Utc::now();

        let improvement = match action.action_type {
            ActionType::ShiftTraffic => self.apply_traffic_shift(action, &mut after, predicted),
            ActionType::EnableBackupProvider => {
                let realized = predicted * self.sample(0.4, 0.9);
                after.success_rate = (after.success_rate + realized).clamp(0.0, 0.995);
                after.latency_p95_ms += self.sample(10.0, 30.0);
                after.success_rate - before.success_rate
            }
            ActionType::DisableRoute => apply_route_disable(action, &mut after, &before),
            ActionType::AdjustRetryPolicy
            | ActionType::ExponentialBackoff
            | ActionType::ThrottlePath => self.apply_rate_limiting(&mut after, &before),
            ActionType::EscalateOncall
            | ActionType::SendNotification
            | ActionType::LogForAnalysis => 0.0,
            ActionType::DoNothing => {
                let drift = self.sample(0.001, 0.003);
                after.success_rate = (after.success_rate - drift).max(0.0);
                after.success_rate - before.success_rate
            }
        };

        let bar = expectation_bar(action.action_type, predicted);
        let met_expectations = improvement >= bar;

        let (status, rollback_triggered) = outcome_status(action.action_type, improvement);

        let confidence_adjustment = match action.category {
            // Alerting actions notify; they never fix anything, so they
            // always bias future planning slightly down.
            ActionCategory::Alerting => -0.05,
            _ if met_expectations => clamp_adjustment(0.05 + improvement),
            _ => clamp_adjustment(-0.1 + improvement).min(-0.02),
        };

        ActionOutcome {
            action_id: action.id,
            action_type: action.action_type,
            pattern_type: action.addresses_pattern,
            executed_at: after.timestamp,
            status,
            before,
            after,
            improvement,
            met_expectations,
            rollback_triggered,
            confidence_adjustment,
            duration_ms: self.sample(50.0, 500.0) as u64,
        }
    }

    /// Shift a percentage of the target issuer's traffic elsewhere: its
    /// transaction and error counts fall proportionally and the overall
    /// success rate recovers a bounded random share of the prediction.
    fn apply_traffic_shift(
        &self,
        action: &ActionProposal,
        after: &mut MetricsSnapshot,
        predicted: f64,
    ) -> f64 {
        let shift = action
            .numeric_parameter("shift_percentage")
            .unwrap_or(30.0)
            .clamp(0.0, 100.0)
            / 100.0;
        let target = action.string_parameter("from_issuer").unwrap_or_default();

        if let Some(issuer) = after
            .issuers
            .iter_mut()
            .find(|i| i.issuer_id == target)
        {
            issuer.transaction_count =
                (issuer.transaction_count as f64 * (1.0 - shift)).round() as u64;
            issuer.error_count = (issuer.error_count as f64 * (1.0 - shift)).round() as u64;
        }

        let realized = predicted * self.sample(0.5, 1.0);
        let before_rate = after.success_rate;
        after.success_rate = (after.success_rate + realized).clamp(0.0, 0.995);
        after.success_rate - before_rate
    }

    /// Backoff and throttle actions bleed off retries first and recover
    /// tail latency second.
    fn apply_rate_limiting(&self, after: &mut MetricsSnapshot, before: &MetricsSnapshot) -> f64 {
        let retry_reduction = self.sample(0.3, 0.6);
        after.retry_count = (after.retry_count as f64 * (1.0 - retry_reduction)).round() as u64;
        after.retry_ratio *= 1.0 - retry_reduction;

        let latency_reduction = self.sample(0.10, 0.20);
        after.latency_p95_ms *= 1.0 - latency_reduction;
        after.latency_p99_ms *= 1.0 - latency_reduction;

        let retry_recovered = if before.retry_ratio > 0.0 {
            (before.retry_ratio - after.retry_ratio) / before.retry_ratio
        } else {
            0.0
        };
        let latency_recovered = if before.latency_p95_ms > 0.0 {
            (before.latency_p95_ms - after.latency_p95_ms) / before.latency_p95_ms
        } else {
            0.0
        };
        0.5 * retry_recovered + 0.5 * latency_recovered
    }
}

impl Default for ActionSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove the issuer from the metrics entirely and recover its share of
/// the errors. Deterministic: disabling a route has no variance worth
/// modeling.
fn apply_route_disable(
    action: &ActionProposal,
    after: &mut MetricsSnapshot,
    before: &MetricsSnapshot,
) -> f64 {
    let target = action.string_parameter("issuer").unwrap_or_default();
    let Some(removed) = before.issuer(target).cloned() else {
        return 0.0;
    };

    after.issuers.retain(|i| i.issuer_id != removed.issuer_id);
    after.transaction_count = after
        .transaction_count
        .saturating_sub(removed.transaction_count);

    // Overall success rate becomes the volume-weighted rate of the
    // surviving issuers.
    let surviving_volume: u64 = after.issuers.iter().map(|i| i.transaction_count).sum();
    if surviving_volume > 0 {
        after.success_rate = after
            .issuers
            .iter()
            .map(|i| i.success_rate * i.transaction_count as f64)
            .sum::<f64>()
            / surviving_volume as f64;
    }

    // The removed issuer's errors leave the error-code breakdown with it.
    let before_errors = before.total_error_count();
    if before_errors > 0 && removed.error_count > 0 {
        let keep = 1.0 - removed.error_count as f64 / before_errors as f64;
        for code in &mut after.error_codes {
            code.count = (code.count as f64 * keep).round() as u64;
            code.percentage = if after.transaction_count > 0 {
                code.count as f64 / after.transaction_count as f64 * 100.0
            } else {
                0.0
            };
        }
    }

    after.success_rate - before.success_rate
}

/// Type-specific bar the realized improvement must clear.
fn expectation_bar(action_type: ActionType, predicted: f64) -> f64 {
    match action_type.category() {
        ActionCategory::TrafficRouting => (0.5 * predicted).max(0.0),
        ActionCategory::RateLimiting => 0.1,
        ActionCategory::Alerting => 0.0,
        ActionCategory::DoNothing => -0.005,
    }
}

fn outcome_status(action_type: ActionType, improvement: f64) -> (OutcomeStatus, bool) {
    match action_type.category() {
        ActionCategory::Alerting | ActionCategory::DoNothing => (OutcomeStatus::Success, false),
        _ if improvement < ROLLBACK_THRESHOLD => (OutcomeStatus::RolledBack, true),
        _ if improvement < 0.0 => (OutcomeStatus::Failed, false),
        _ => (OutcomeStatus::Success, false),
    }
}

fn clamp_adjustment(value: f64) -> f64 {
    value.clamp(-CONFIDENCE_ADJUSTMENT_BOUND, CONFIDENCE_ADJUSTMENT_BOUND)
}
