// remediation-engine-rs/src/learning.rs
// Bounded learning-feedback store: a capped FIFO of past outcomes plus
// derived statistics, exposed as context to the next cycle's planner and
// the decision engine's novelty check.
//
// The store is the only mutable shared state in the core. Cycles are
// serialized in the reference design, so a plain mutex suffices; the
// instance is constructed and injected (never a module-level singleton)
// so independent reasoning contexts can each own one.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use pipeline_types::{ActionOutcome, ActionType, OutcomeStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 100;

/// One stored outcome with its retrieval counter and optional operator
/// feedback note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutcome {
    pub outcome: ActionOutcome,
    pub retrievals: u64,
    pub feedback: Option<String>,
}

/// Aggregate view over the stored outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStatistics {
    pub total_outcomes: usize,
    /// Fraction of stored outcomes with Success status; 0 when empty.
    pub success_rate: f64,
    pub average_improvement: f64,
    /// Action type stored most often.
    pub most_common_action: Option<ActionType>,
    /// Action type with the best mean improvement.
    pub best_performing_action: Option<ActionType>,
    pub total_retrievals: u64,
}

/// Bundle handed to the next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningContext {
    pub recent: Vec<ActionOutcome>,
    pub statistics: LearningStatistics,
}

/// Capped FIFO of action outcomes; oldest entries are evicted on
/// overflow. Lifetime is the process lifetime by design.
pub struct LearningStore {
    capacity: usize,
    entries: Mutex<VecDeque<StoredOutcome>>,
}

impl LearningStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Store an outcome, evicting the oldest entry once at capacity.
    pub fn store(&self, outcome: ActionOutcome) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(StoredOutcome {
            outcome,
            retrievals: 0,
            feedback: None,
        });
        metrics::increment_counter!("remediation_outcomes_stored_total");
    }

    /// The `n` most recent outcomes, newest first. Bumps each returned
    /// entry's retrieval counter.
    pub fn get_recent(&self, n: usize) -> Vec<ActionOutcome> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .iter_mut()
            .rev()
            .take(n)
            .map(|e| {
                e.retrievals += 1;
                e.outcome.clone()
            })
            .collect()
    }

    /// Every stored outcome, oldest first. Does not count as retrieval.
    pub fn get_all(&self) -> Vec<ActionOutcome> {
        let entries = self.entries.lock().unwrap();
        entries.iter().map(|e| e.outcome.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (stored, capacity) for memory-utilization observability.
    pub fn utilization(&self) -> (usize, usize) {
        (self.len(), self.capacity)
    }

    /// Attach an operator feedback note to a stored outcome. Returns
    /// false when the action id is unknown (or already evicted).
    pub fn annotate(&self, action_id: Uuid, note: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.outcome.action_id == action_id) {
            Some(entry) => {
                entry.feedback = Some(note.to_string());
                true
            }
            None => false,
        }
    }

    pub fn statistics(&self) -> LearningStatistics {
        let entries = self.entries.lock().unwrap();
        let total = entries.len();
        if total == 0 {
            return LearningStatistics {
                total_outcomes: 0,
                success_rate: 0.0,
                average_improvement: 0.0,
                most_common_action: None,
                best_performing_action: None,
                total_retrievals: 0,
            };
        }

        let successes = entries
            .iter()
            .filter(|e| e.outcome.status == OutcomeStatus::Success)
            .count();
        let average_improvement =
            entries.iter().map(|e| e.outcome.improvement).sum::<f64>() / total as f64;

        let mut per_type: HashMap<ActionType, (usize, f64)> = HashMap::new();
        for entry in entries.iter() {
            let slot = per_type
                .entry(entry.outcome.action_type)
                .or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += entry.outcome.improvement;
        }

        let most_common_action = per_type
            .iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0))
            .map(|(t, _)| *t);
        let best_performing_action = per_type
            .iter()
            .map(|(t, (count, sum))| (*t, sum / *count as f64))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t);

        LearningStatistics {
            total_outcomes: total,
            success_rate: successes as f64 / total as f64,
            average_improvement,
            most_common_action,
            best_performing_action,
            total_retrievals: entries.iter().map(|e| e.retrievals).sum(),
        }
    }

    /// Bundle the recent outcomes and statistics for the next cycle.
    pub fn prepare_learning_context(&self, n: usize) -> LearningContext {
        LearningContext {
            recent: self.get_recent(n),
            statistics: self.statistics(),
        }
    }
}

impl Default for LearningStore {
    fn default() -> Self {
        Self::new()
    }
}
