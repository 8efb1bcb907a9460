// pipeline-types-rs/src/reasoning.rs
// Anomaly, pattern, and hypothesis value objects: the diagnostic half of
// the reasoning cycle. Each type is traceable back to the evidence that
// produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::MetricsSnapshot;

/// Severity of a detected deviation. Ordered: Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// The three metric dimensions the detector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    SuccessRateDrop,
    LatencySpike,
    RetryAmplification,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyType::SuccessRateDrop => write!(f, "success_rate_drop"),
            AnomalyType::LatencySpike => write!(f, "latency_spike"),
            AnomalyType::RetryAmplification => write!(f, "retry_amplification"),
        }
    }
}

/// One ranked contributor to an anomaly (an issuer, an error code, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub factor: String,
    /// Relative impact in [0, 1]; the factor list is sorted descending on it.
    pub impact: f64,
    pub details: String,
}

/// A detected deviation of a single metric dimension from baseline or
/// thresholds. Created fresh each cycle; never mutated. At most one
/// instance per anomaly type per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Numeric deviation; its semantics depend on `anomaly_type`
    /// (rate shortfall for drops, worst ceiling ratio for spikes and
    /// retry amplification).
    pub deviation: f64,
    pub contributing_factors: Vec<ContributingFactor>,
    pub affected_issuers: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

/// Named failure mode inferred from the anomaly set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    IssuerDegradation,
    RetryStorm,
    LatencySpike,
    Noise,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternType::IssuerDegradation => write!(f, "issuer_degradation"),
            PatternType::RetryStorm => write!(f, "retry_storm"),
            PatternType::LatencySpike => write!(f, "latency_spike"),
            PatternType::Noise => write!(f, "noise"),
        }
    }
}

/// One observed-vs-expected data point backing a pattern or hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub metric: String,
    pub observed: f64,
    pub expected: f64,
    /// How strongly this data point supports the pattern, in [0, 1].
    pub significance: f64,
}

/// A classified failure pattern with the evidence that produced it.
///
/// `confidence` is strictly below 1.0 by construction: pattern recognition
/// never treats its own judgment as certain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedPattern {
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub affected_issuers: Vec<String>,
    pub description: String,
}

/// One observation -> inference step in a hypothesis's reasoning chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub observation: String,
    pub inference: String,
}

/// A competing explanation the hypothesis generator considered and ranked
/// below the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeExplanation {
    pub explanation: String,
    pub confidence: f64,
    pub why_less_likely: String,
}

/// Which path produced a hypothesis. Kept on the value object so the
/// observability layers can tell oracle output from local degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisSource {
    Oracle,
    Fallback,
}

/// A causal explanation for one recognized pattern.
///
/// Generated once per cycle per pattern and never mutated afterward.
/// Always carries at least two alternative explanations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: Uuid,
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub primary_explanation: String,
    pub reasoning_chain: Vec<ReasoningStep>,
    pub alternatives: Vec<AlternativeExplanation>,
    /// Copied from the pattern that prompted this hypothesis.
    pub supporting_evidence: Vec<Evidence>,
    pub source: HypothesisSource,
    pub generated_at: DateTime<Utc>,
}

/// Context bundle handed to the pattern recognizer: the anomaly list is
/// the primary input; the snapshots are available for baseline-relative
/// trigger conditions.
#[derive(Debug, Clone)]
pub struct DiagnosticContext<'a> {
    pub anomalies: &'a [Anomaly],
    pub current: &'a MetricsSnapshot,
    pub baseline: &'a MetricsSnapshot,
}
