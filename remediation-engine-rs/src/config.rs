// remediation-engine-rs/src/config.rs
// Engine configuration: threshold resolution modes, decision weights,
// approval policy, and guardrail limits.
//
// Configuration errors are the only startup-fatal errors in the core:
// `EngineConfig::validate` runs at engine construction and fails fast,
// so nothing malformed survives into a reasoning cycle.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How thresholds are derived for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    Static,
    Dynamic,
    Hybrid,
}

/// Per-field merge rule for hybrid mode. Conservative takes the stricter
/// value (higher floor for rates, lower ceiling for latency/retry);
/// permissive takes the looser one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridMergeStrategy {
    Conservative,
    Permissive,
}

/// Fixed ceilings and floors used verbatim in static mode and as the
/// fallback when dynamic mode lacks a usable baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticThresholds {
    pub success_rate_floor: f64,
    /// Softer floor; crossing it alone yields a low-severity anomaly.
    pub success_rate_warning_floor: f64,
    pub latency_p50_ceiling_ms: f64,
    pub latency_p95_ceiling_ms: f64,
    pub latency_p99_ceiling_ms: f64,
    pub retry_ratio_ceiling: f64,
}

impl Default for StaticThresholds {
    fn default() -> Self {
        Self {
            success_rate_floor: 0.95,
            success_rate_warning_floor: 0.97,
            latency_p50_ceiling_ms: 200.0,
            latency_p95_ceiling_ms: 800.0,
            latency_p99_ceiling_ms: 2000.0,
            retry_ratio_ceiling: 0.10,
        }
    }
}

/// Baseline-relative multipliers for dynamic mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicSensitivity {
    /// Hard floor = baseline success rate minus this tolerance.
    pub success_rate_drop_tolerance: f64,
    /// Warning floor = baseline success rate minus this tolerance.
    pub warning_drop_tolerance: f64,
    /// Latency ceilings = baseline percentile times this multiplier.
    pub latency_multiplier: f64,
    /// Retry ceiling = baseline retry ratio times this multiplier; also
    /// the allowed amplification factor for the retry detector.
    pub retry_multiplier: f64,
    /// Minimum baseline transactions for dynamic derivation; below this
    /// the resolver falls back to the static limits.
    pub min_baseline_transactions: u64,
}

impl Default for DynamicSensitivity {
    fn default() -> Self {
        Self {
            success_rate_drop_tolerance: 0.03,
            warning_drop_tolerance: 0.01,
            latency_multiplier: 1.5,
            retry_multiplier: 2.0,
            min_baseline_transactions: 1_000,
        }
    }
}

/// Full threshold configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub mode: ThresholdMode,
    pub static_limits: StaticThresholds,
    pub sensitivity: DynamicSensitivity,
    pub merge_strategy: HybridMergeStrategy,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Hybrid,
            static_limits: StaticThresholds::default(),
            sensitivity: DynamicSensitivity::default(),
            merge_strategy: HybridMergeStrategy::Conservative,
        }
    }
}

/// Weights for the decision engine's composite score. Must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionWeights {
    pub success_rate: f64,
    pub latency: f64,
    pub cost: f64,
    pub risk: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.4,
            latency: 0.2,
            cost: 0.15,
            risk: 0.25,
        }
    }
}

impl DecisionWeights {
    pub fn sum(&self) -> f64 {
        self.success_rate + self.latency + self.cost + self.risk
    }
}

/// Knobs for the decision engine's approval-required checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    /// Traffic shifts at or above this percentage are high impact.
    pub high_impact_traffic_shift_percent: f64,
    /// Best hypothesis confidence below this triggers low-confidence.
    pub low_confidence_threshold: f64,
    /// Top-two hypothesis confidences closer than this are ambiguous.
    pub ambiguity_margin: f64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            high_impact_traffic_shift_percent: 25.0,
            low_confidence_threshold: 0.6,
            ambiguity_margin: 0.1,
        }
    }
}

/// Hard, non-bypassable safety limits. The guardrails enforce these
/// independently of the decision engine's advisory flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailLimits {
    pub min_confidence: f64,
    pub max_traffic_shift_percent: f64,
    pub max_backoff_multiplier: f64,
    pub max_concurrent_actions: usize,
}

impl Default for GuardrailLimits {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            max_traffic_shift_percent: 50.0,
            max_backoff_multiplier: 3.0,
            max_concurrent_actions: 3,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ThresholdConfig,
    pub weights: DecisionWeights,
    pub approval: ApprovalPolicy,
    pub guardrails: GuardrailLimits,
    /// Deadline for a single oracle call; on expiry the hypothesis
    /// generator falls back deterministically.
    pub oracle_timeout_secs: u64,
    pub learning_capacity: usize,
    /// How many recent outcomes feed the next cycle's planner.
    pub learning_context_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            weights: DecisionWeights::default(),
            approval: ApprovalPolicy::default(),
            guardrails: GuardrailLimits::default(),
            oracle_timeout_secs: 10,
            learning_capacity: 100,
            learning_context_size: 20,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing sections fall back to
    /// defaults; the result is validated before being returned.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let cfg: EngineConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults with individual knobs overridden from environment
    /// variables, validated before being returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        fn get_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        let mut cfg = Self::default();
        cfg.guardrails.min_confidence =
            get_env_var("REMEDIATION_MIN_CONFIDENCE", cfg.guardrails.min_confidence);
        cfg.guardrails.max_concurrent_actions = get_env_var(
            "REMEDIATION_MAX_CONCURRENT_ACTIONS",
            cfg.guardrails.max_concurrent_actions,
        );
        cfg.oracle_timeout_secs =
            get_env_var("REMEDIATION_ORACLE_TIMEOUT_SECS", cfg.oracle_timeout_secs);
        cfg.learning_capacity =
            get_env_var("REMEDIATION_LEARNING_CAPACITY", cfg.learning_capacity);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every knob. Called at engine construction so malformed
    /// configuration fails at startup, never mid-cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.thresholds.static_limits;
        if !(0.0..=1.0).contains(&s.success_rate_floor)
            || !(0.0..=1.0).contains(&s.success_rate_warning_floor)
        {
            return Err(ConfigError::InvalidValue(
                "success rate floors must lie in [0, 1]".to_string(),
            ));
        }
        if s.success_rate_warning_floor < s.success_rate_floor {
            return Err(ConfigError::InvalidValue(
                "warning floor must not be below the hard success rate floor".to_string(),
            ));
        }
        if s.latency_p50_ceiling_ms <= 0.0
            || s.latency_p95_ceiling_ms <= 0.0
            || s.latency_p99_ceiling_ms <= 0.0
        {
            return Err(ConfigError::InvalidValue(
                "latency ceilings must be positive".to_string(),
            ));
        }
        if s.retry_ratio_ceiling <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "retry ratio ceiling must be positive".to_string(),
            ));
        }

        let d = &self.thresholds.sensitivity;
        if d.success_rate_drop_tolerance <= 0.0 || d.warning_drop_tolerance <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "drop tolerances must be positive".to_string(),
            ));
        }
        if d.warning_drop_tolerance > d.success_rate_drop_tolerance {
            return Err(ConfigError::InvalidValue(
                "warning tolerance must not exceed the hard drop tolerance".to_string(),
            ));
        }
        if d.latency_multiplier <= 1.0 || d.retry_multiplier <= 1.0 {
            return Err(ConfigError::InvalidValue(
                "dynamic multipliers must exceed 1.0".to_string(),
            ));
        }

        let w = &self.weights;
        if w.success_rate < 0.0 || w.latency < 0.0 || w.cost < 0.0 || w.risk < 0.0 {
            return Err(ConfigError::InvalidValue(
                "decision weights must be non-negative".to_string(),
            ));
        }
        if (w.sum() - 1.0).abs() > 1e-3 {
            return Err(ConfigError::InvalidValue(format!(
                "decision weights must sum to 1.0 (got {:.4})",
                w.sum()
            )));
        }

        let a = &self.approval;
        if !(0.0..=1.0).contains(&a.low_confidence_threshold) {
            return Err(ConfigError::InvalidValue(
                "low confidence threshold must lie in [0, 1]".to_string(),
            ));
        }
        if a.ambiguity_margin < 0.0 || a.ambiguity_margin >= 1.0 {
            return Err(ConfigError::InvalidValue(
                "ambiguity margin must lie in [0, 1)".to_string(),
            ));
        }
        if a.high_impact_traffic_shift_percent <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "high impact traffic shift threshold must be positive".to_string(),
            ));
        }

        let g = &self.guardrails;
        if !(0.0..=1.0).contains(&g.min_confidence) {
            return Err(ConfigError::InvalidValue(
                "guardrail minimum confidence must lie in [0, 1]".to_string(),
            ));
        }
        if g.max_traffic_shift_percent <= 0.0 || g.max_traffic_shift_percent > 100.0 {
            return Err(ConfigError::InvalidValue(
                "traffic shift cap must lie in (0, 100]".to_string(),
            ));
        }
        if g.max_backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidValue(
                "backoff multiplier cap must exceed 1.0".to_string(),
            ));
        }
        if g.max_concurrent_actions == 0 {
            return Err(ConfigError::InvalidValue(
                "concurrent action cap must be at least 1".to_string(),
            ));
        }

        if self.learning_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "learning capacity must be at least 1".to_string(),
            ));
        }
        if self.learning_context_size == 0 {
            return Err(ConfigError::InvalidValue(
                "learning context size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
