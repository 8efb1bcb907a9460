// pipeline-types-rs/src/metrics.rs
// Point-in-time metrics aggregates produced by the external collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One error code's share of the observed failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCodeStat {
    /// Scheme/issuer error code (e.g. "51", "timeout").
    pub code: String,
    pub count: u64,
    /// Share of total transactions, in percent (0-100).
    pub percentage: f64,
}

/// Per-issuer slice of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerMetrics {
    pub issuer_id: String,
    pub success_rate: f64,
    pub latency_p95_ms: f64,
    pub transaction_count: u64,
    pub error_count: u64,
}

/// A single point-in-time aggregate of payment-pipeline metrics.
///
/// Immutable by convention: one instance per observed instant, produced by
/// the external metrics collaborator and never mutated by the core. The
/// same shape serves as both the current observation and the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Overall success rate in [0, 1].
    pub success_rate: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub transaction_count: u64,
    pub retry_count: u64,
    /// Retries per transaction, in [0, 1+].
    pub retry_ratio: f64,
    pub error_codes: Vec<ErrorCodeStat>,
    pub issuers: Vec<IssuerMetrics>,
}

impl MetricsSnapshot {
    /// Look up a single issuer's slice by id.
    pub fn issuer(&self, issuer_id: &str) -> Option<&IssuerMetrics> {
        self.issuers.iter().find(|i| i.issuer_id == issuer_id)
    }

    /// Sum of per-issuer error counts.
    pub fn total_error_count(&self) -> u64 {
        self.issuers.iter().map(|i| i.error_count).sum()
    }

    /// An issuer's share of the snapshot's total transactions, in [0, 1].
    pub fn issuer_share(&self, issuer_id: &str) -> f64 {
        if self.transaction_count == 0 {
            return 0.0;
        }
        match self.issuer(issuer_id) {
            Some(i) => i.transaction_count as f64 / self.transaction_count as f64,
            None => 0.0,
        }
    }
}
