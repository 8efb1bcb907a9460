use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use oracle_client::{
    FailingStubOracle, OracleAlternative, OracleHypothesis, OracleReasoningStep, StaticStubOracle,
};
use pipeline_types::{
    ActionOutcome, ActionProposal, ActionType, AnomalyType, ApprovalReason, Decision,
    DiagnosticContext, ErrorCodeStat, Evidence, Hypothesis, HypothesisSource, ImpactEstimate,
    IssuerMetrics, MetricsSnapshot, OutcomeStatus, PatternType, RecognizedPattern, Severity,
};

use crate::config::{
    ApprovalPolicy, DecisionWeights, EngineConfig, GuardrailLimits, HybridMergeStrategy,
    ThresholdMode,
};
use crate::guardrails::{ActionExecution, ActionState, GuardrailVerdict, SafetyGuardrails};
use crate::hypothesis::HypothesisGenerator;
use crate::learning::LearningStore;
use crate::simulator::ActionSimulator;
use crate::{
    decide, detect_anomalies, plan_actions, recognize_patterns, resolve_thresholds, BatchDispatch,
    ExecutionResult, RemediationEngine,
};

// --- fixtures --------------------------------------------------------------

fn issuer(id: &str, success_rate: f64, p95: f64, transactions: u64, errors: u64) -> IssuerMetrics {
    IssuerMetrics {
        issuer_id: id.to_string(),
        success_rate,
        latency_p95_ms: p95,
        transaction_count: transactions,
        error_count: errors,
    }
}

fn healthy_baseline() -> MetricsSnapshot {
    MetricsSnapshot {
        timestamp: Utc::now(),
        success_rate: 0.99,
        latency_p50_ms: 120.0,
        latency_p95_ms: 450.0,
        latency_p99_ms: 900.0,
        transaction_count: 9_000,
        retry_count: 180,
        retry_ratio: 0.02,
        error_codes: vec![ErrorCodeStat {
            code: "51".to_string(),
            count: 90,
            percentage: 1.0,
        }],
        issuers: vec![
            issuer("issuer-a", 0.99, 450.0, 3_000, 30),
            issuer("issuer-b", 0.99, 450.0, 3_000, 30),
            issuer("issuer-c", 0.99, 450.0, 3_000, 30),
        ],
    }
}

/// All three issuers down ~15 points; no healthy contrast remains.
fn broad_outage_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        success_rate: 0.832,
        error_codes: vec![ErrorCodeStat {
            code: "91".to_string(),
            count: 540,
            percentage: 6.0,
        }],
        issuers: vec![
            issuer("issuer-a", 0.832, 460.0, 3_000, 500),
            issuer("issuer-b", 0.832, 455.0, 3_000, 505),
            issuer("issuer-c", 0.832, 465.0, 3_000, 510),
        ],
        ..healthy_baseline()
    }
}

/// One issuer down 15 points, the other two healthy.
fn single_issuer_degraded_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        success_rate: 0.94,
        error_codes: vec![ErrorCodeStat {
            code: "51".to_string(),
            count: 270,
            percentage: 3.0,
        }],
        issuers: vec![
            issuer("issuer-a", 0.84, 460.0, 3_000, 480),
            issuer("issuer-b", 0.99, 450.0, 3_000, 30),
            issuer("issuer-c", 0.99, 450.0, 3_000, 30),
        ],
        ..healthy_baseline()
    }
}

/// Retries at 6x baseline with secondary latency growth; success intact.
fn retry_storm_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        retry_count: 1_080,
        retry_ratio: 0.12,
        latency_p95_ms: 585.0,
        latency_p99_ms: 1_170.0,
        ..healthy_baseline()
    }
}

fn oracle_response(confidence: f64) -> OracleHypothesis {
    OracleHypothesis {
        primary_hypothesis: "issuer-side incident degrading authorization capacity".to_string(),
        confidence,
        reasoning_chain: vec![OracleReasoningStep {
            observation: "deviation concentrated in one metric dimension".to_string(),
            inference: "points at a single upstream fault".to_string(),
        }],
        alternative_explanations: vec![
            OracleAlternative {
                explanation: "network congestion on the issuer path".to_string(),
                confidence: 0.3,
                why_less_likely: "other issuers on the same path are unaffected".to_string(),
            },
            OracleAlternative {
                explanation: "fraud-rule misconfiguration".to_string(),
                confidence: 0.2,
                why_less_likely: "error codes are availability-shaped".to_string(),
            },
        ],
        source: String::new(),
    }
}

fn make_engine(
    oracle: Arc<dyn oracle_client::HypothesisOracle>,
    cfg: EngineConfig,
    seed: u64,
) -> RemediationEngine {
    let store = Arc::new(LearningStore::new());
    RemediationEngine::with_components(cfg, oracle, store, ActionSimulator::with_seed(seed))
        .expect("engine construction should succeed")
}

fn make_outcome(
    action_type: ActionType,
    pattern_type: Option<PatternType>,
    status: OutcomeStatus,
    improvement: f64,
) -> ActionOutcome {
    let before = healthy_baseline();
    let mut after = before.clone();
    after.success_rate = (after.success_rate + improvement).clamp(0.0, 0.995);
    ActionOutcome {
        action_id: Uuid::new_v4(),
        action_type,
        pattern_type,
        executed_at: Utc::now(),
        status,
        before,
        after,
        improvement,
        met_expectations: improvement >= 0.0,
        rollback_triggered: false,
        confidence_adjustment: 0.05,
        duration_ms: 120,
    }
}

fn make_proposal(action_type: ActionType, impact: ImpactEstimate) -> ActionProposal {
    ActionProposal {
        id: Uuid::new_v4(),
        category: action_type.category(),
        action_type,
        description: format!("test proposal for {action_type}"),
        parameters: HashMap::new(),
        estimated_impact: impact,
        prerequisites: Vec::new(),
        reversible: true,
        addresses_pattern: None,
    }
}

fn make_decision(action: ActionProposal, confidence: f64, requires_approval: bool) -> Decision {
    Decision {
        selected_action: action,
        rejected_actions: Vec::new(),
        score: 0.8,
        requires_human_approval: requires_approval,
        approval_reasons: Vec::new(),
        confidence,
        decided_at: Utc::now(),
    }
}

fn make_pattern(pattern_type: PatternType, confidence: f64) -> RecognizedPattern {
    RecognizedPattern {
        pattern_type,
        confidence,
        evidence: vec![Evidence {
            metric: "success_rate".to_string(),
            observed: 0.94,
            expected: 0.99,
            significance: 0.5,
        }],
        affected_issuers: vec!["issuer-a".to_string()],
        description: "test pattern".to_string(),
    }
}

fn make_hypothesis(pattern_type: PatternType, confidence: f64) -> Hypothesis {
    Hypothesis {
        id: Uuid::new_v4(),
        pattern_type,
        confidence,
        primary_explanation: "test hypothesis".to_string(),
        reasoning_chain: Vec::new(),
        alternatives: Vec::new(),
        supporting_evidence: Vec::new(),
        source: HypothesisSource::Oracle,
        generated_at: Utc::now(),
    }
}

// --- configuration ---------------------------------------------------------

#[test]
fn default_config_validates() {
    EngineConfig::default()
        .validate()
        .expect("defaults should be valid");
}

#[test]
fn config_rejects_weights_not_summing_to_one() {
    let mut cfg = EngineConfig::default();
    cfg.weights.success_rate = 0.9;
    assert!(cfg.validate().is_err(), "weights summing past 1.0 must fail");
}

#[test]
fn partial_toml_config_fills_defaults() {
    let cfg: EngineConfig = toml::from_str("[guardrails]\nmin_confidence = 0.7\n")
        .expect("partial TOML should parse");
    assert_eq!(cfg.guardrails.min_confidence, 0.7);
    assert_eq!(cfg.guardrails.max_concurrent_actions, 3);
    assert_eq!(cfg.weights.success_rate, 0.4);
    cfg.validate().expect("merged config should validate");
}

#[test]
fn config_rejects_inverted_success_floors() {
    let mut cfg = EngineConfig::default();
    cfg.thresholds.static_limits.success_rate_warning_floor = 0.90;
    assert!(
        cfg.validate().is_err(),
        "warning floor below the hard floor must fail"
    );
}

// --- threshold resolution --------------------------------------------------

#[test]
fn static_mode_returns_configured_limits_verbatim() {
    let mut cfg = EngineConfig::default().thresholds;
    cfg.mode = ThresholdMode::Static;

    let resolved = resolve_thresholds(&cfg, Some(&healthy_baseline()));
    assert_eq!(resolved.success_rate_floor, 0.95);
    assert_eq!(resolved.latency_p95_ceiling_ms, 800.0);
    assert_eq!(resolved.retry_ratio_ceiling, 0.10);
}

#[test]
fn dynamic_mode_derives_from_baseline() {
    let mut cfg = EngineConfig::default().thresholds;
    cfg.mode = ThresholdMode::Dynamic;

    let resolved = resolve_thresholds(&cfg, Some(&healthy_baseline()));
    assert!((resolved.success_rate_floor - 0.96).abs() < 1e-9);
    assert!((resolved.latency_p95_ceiling_ms - 675.0).abs() < 1e-9);
    assert!((resolved.retry_ratio_ceiling - 0.04).abs() < 1e-9);
}

#[test]
fn dynamic_mode_falls_back_on_thin_baseline() {
    let mut cfg = EngineConfig::default().thresholds;
    cfg.mode = ThresholdMode::Dynamic;

    let thin = MetricsSnapshot {
        transaction_count: 50,
        ..healthy_baseline()
    };
    let resolved = resolve_thresholds(&cfg, Some(&thin));
    assert_eq!(
        resolved.success_rate_floor, 0.95,
        "insufficient baseline sample must fall back to static limits"
    );

    let resolved = resolve_thresholds(&cfg, None);
    assert_eq!(resolved.success_rate_floor, 0.95);
}

#[test]
fn hybrid_merge_takes_stricter_or_looser_per_field() {
    let mut cfg = EngineConfig::default().thresholds;
    cfg.mode = ThresholdMode::Hybrid;
    cfg.merge_strategy = HybridMergeStrategy::Conservative;

    let conservative = resolve_thresholds(&cfg, Some(&healthy_baseline()));
    // Stricter: the higher floor and the lower ceilings win.
    assert!((conservative.success_rate_floor - 0.96).abs() < 1e-9);
    assert!((conservative.latency_p95_ceiling_ms - 675.0).abs() < 1e-9);
    assert!((conservative.retry_ratio_ceiling - 0.04).abs() < 1e-9);

    cfg.merge_strategy = HybridMergeStrategy::Permissive;
    let permissive = resolve_thresholds(&cfg, Some(&healthy_baseline()));
    assert_eq!(permissive.success_rate_floor, 0.95);
    assert_eq!(permissive.latency_p95_ceiling_ms, 800.0);
    assert_eq!(permissive.retry_ratio_ceiling, 0.10);
}

// --- anomaly detection -----------------------------------------------------

#[test]
fn identical_snapshots_yield_no_anomalies() {
    let baseline = healthy_baseline();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));
    let anomalies = detect_anomalies(&baseline, &baseline, &thresholds);
    assert!(anomalies.is_empty(), "a healthy snapshot must not alarm");
}

#[test]
fn broad_drop_is_critical_with_bounded_factors() {
    let baseline = healthy_baseline();
    let current = broad_outage_snapshot();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));

    let anomaly =
        crate::anomaly::detect_success_rate_drop(&current, &baseline, &thresholds)
            .expect("a 16-point drop must be detected");
    assert_eq!(anomaly.severity, Severity::Critical);
    assert_eq!(anomaly.affected_issuers.len(), 3);
    assert!(anomaly.contributing_factors.len() <= 5);
    for pair in anomaly.contributing_factors.windows(2) {
        assert!(
            pair[0].impact >= pair[1].impact,
            "factors must be sorted descending by impact"
        );
    }
}

#[test]
fn warning_floor_crossing_yields_low_severity() {
    let baseline = healthy_baseline();
    let current = MetricsSnapshot {
        success_rate: 0.975,
        issuers: vec![
            issuer("issuer-a", 0.975, 450.0, 3_000, 75),
            issuer("issuer-b", 0.975, 450.0, 3_000, 75),
            issuer("issuer-c", 0.975, 450.0, 3_000, 75),
        ],
        ..healthy_baseline()
    };
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));

    let anomaly =
        crate::anomaly::detect_success_rate_drop(&current, &baseline, &thresholds)
            .expect("warning floor crossing must be detected");
    assert_eq!(anomaly.severity, Severity::Low);
}

#[test]
fn retry_amplification_detected_with_severity_banding() {
    let baseline = healthy_baseline();
    let current = retry_storm_snapshot();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));

    let anomaly =
        crate::anomaly::detect_retry_amplification(&current, &baseline, &thresholds)
            .expect("6x retry amplification must be detected");
    assert_eq!(anomaly.anomaly_type, AnomalyType::RetryAmplification);
    assert_eq!(anomaly.severity, Severity::Critical);
    assert!(anomaly.deviation >= 3.0);
}

#[test]
fn latency_spike_uses_worst_percentile_ratio() {
    let baseline = healthy_baseline();
    let current = MetricsSnapshot {
        latency_p50_ms: 130.0,
        latency_p95_ms: 1_100.0,
        latency_p99_ms: 1_400.0,
        issuers: vec![
            issuer("issuer-a", 0.99, 1_050.0, 3_000, 30),
            issuer("issuer-b", 0.99, 470.0, 3_000, 30),
            issuer("issuer-c", 0.99, 460.0, 3_000, 30),
        ],
        ..healthy_baseline()
    };
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));

    let anomaly = crate::anomaly::detect_latency_spike(&current, &baseline, &thresholds)
        .expect("p95 past its ceiling must be detected");
    // p95 at 1100 against a 675 ceiling is the worst ratio (~1.63).
    assert_eq!(anomaly.severity, Severity::High);
    assert_eq!(anomaly.affected_issuers, vec!["issuer-a".to_string()]);
}

// --- pattern recognition ---------------------------------------------------

#[test]
fn issuer_degradation_requires_healthy_contrast() {
    let baseline = healthy_baseline();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));

    let current = single_issuer_degraded_snapshot();
    let anomalies = detect_anomalies(&current, &baseline, &thresholds);
    let patterns = recognize_patterns(&DiagnosticContext {
        anomalies: &anomalies,
        current: &current,
        baseline: &baseline,
    });
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_type, PatternType::IssuerDegradation);
    assert!(patterns[0].confidence > 0.3 && patterns[0].confidence < 1.0);
    assert_eq!(patterns[0].affected_issuers, vec!["issuer-a".to_string()]);

    // With every issuer degraded there is no healthy contrast left and
    // the classifier must stay silent.
    let current = broad_outage_snapshot();
    let anomalies = detect_anomalies(&current, &baseline, &thresholds);
    let patterns = recognize_patterns(&DiagnosticContext {
        anomalies: &anomalies,
        current: &current,
        baseline: &baseline,
    });
    assert!(
        !patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::IssuerDegradation),
        "a platform-wide outage is not issuer degradation"
    );
}

#[test]
fn retry_storm_recognized_with_correlated_evidence() {
    let baseline = healthy_baseline();
    let current = retry_storm_snapshot();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));
    let anomalies = detect_anomalies(&current, &baseline, &thresholds);

    let patterns = recognize_patterns(&DiagnosticContext {
        anomalies: &anomalies,
        current: &current,
        baseline: &baseline,
    });
    let storm = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::RetryStorm)
        .expect("retry storm must be recognized");
    assert!(storm.confidence > 0.4 && storm.confidence < 1.0);
    assert!(
        storm.evidence.iter().any(|e| e.metric == "latency_p95_ms"),
        "latency growth should be folded into the evidence"
    );
}

#[test]
fn noise_fires_only_for_mild_unexplained_anomalies() {
    let baseline = healthy_baseline();
    let current = MetricsSnapshot {
        success_rate: 0.975,
        issuers: vec![
            issuer("issuer-a", 0.975, 455.0, 3_000, 75),
            issuer("issuer-b", 0.974, 450.0, 3_000, 78),
            issuer("issuer-c", 0.976, 452.0, 3_000, 72),
        ],
        ..healthy_baseline()
    };
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));
    let anomalies = detect_anomalies(&current, &baseline, &thresholds);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].severity, Severity::Low);

    let patterns = recognize_patterns(&DiagnosticContext {
        anomalies: &anomalies,
        current: &current,
        baseline: &baseline,
    });
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_type, PatternType::Noise);
    assert!(patterns[0].confidence <= 0.8, "noise confidence is capped");
}

// --- hypothesis generation -------------------------------------------------

#[tokio::test]
async fn failing_oracle_degrades_to_fallback_per_pattern() {
    let generator =
        HypothesisGenerator::new(Arc::new(FailingStubOracle), Duration::from_secs(5));
    let patterns = vec![
        make_pattern(PatternType::IssuerDegradation, 0.8),
        make_pattern(PatternType::RetryStorm, 0.6),
    ];
    let baseline = healthy_baseline();

    let hypotheses = generator
        .generate_all(&patterns, &single_issuer_degraded_snapshot(), &baseline)
        .await;
    assert_eq!(hypotheses.len(), 2, "one hypothesis per pattern regardless");
    for (hypothesis, pattern) in hypotheses.iter().zip(&patterns) {
        assert_eq!(hypothesis.source, HypothesisSource::Fallback);
        assert_eq!(hypothesis.pattern_type, pattern.pattern_type);
        assert!(hypothesis.confidence > 0.0 && hypothesis.confidence < 1.0);
        assert!(hypothesis.alternatives.len() >= 2);
        assert!(!hypothesis.reasoning_chain.is_empty());
    }
}

#[tokio::test]
async fn oracle_overconfidence_is_clamped_and_chain_synthesized() {
    let mut response = oracle_response(1.0);
    response.reasoning_chain.clear();
    response.alternative_explanations.truncate(1);
    let generator = HypothesisGenerator::new(
        Arc::new(StaticStubOracle::new(response)),
        Duration::from_secs(5),
    );

    let patterns = vec![make_pattern(PatternType::IssuerDegradation, 0.8)];
    let baseline = healthy_baseline();
    let hypotheses = generator
        .generate_all(&patterns, &single_issuer_degraded_snapshot(), &baseline)
        .await;

    let hypothesis = &hypotheses[0];
    assert_eq!(hypothesis.source, HypothesisSource::Oracle);
    assert_eq!(
        hypothesis.confidence, 0.99,
        "an oracle claiming certainty is clamped to 0.99"
    );
    assert!(
        !hypothesis.reasoning_chain.is_empty(),
        "an omitted chain is synthesized from the evidence"
    );
    assert!(hypothesis.alternatives.len() >= 2, "alternatives padded to 2");
}

#[tokio::test]
async fn empty_hypothesis_text_falls_back() {
    let mut response = oracle_response(0.7);
    response.primary_hypothesis = "   ".to_string();
    let generator = HypothesisGenerator::new(
        Arc::new(StaticStubOracle::new(response)),
        Duration::from_secs(5),
    );

    let patterns = vec![make_pattern(PatternType::LatencySpike, 0.6)];
    let baseline = healthy_baseline();
    let hypotheses = generator
        .generate_all(&patterns, &baseline, &baseline)
        .await;
    assert_eq!(hypotheses[0].source, HypothesisSource::Fallback);
}

// --- action planning -------------------------------------------------------

#[test]
fn planner_emits_at_least_three_with_exactly_one_do_nothing() {
    // Even with nothing to do, the menu invariants hold.
    let proposals = plan_actions(&[], &[], &[]);
    assert!(proposals.len() >= 3);
    assert_eq!(
        proposals
            .iter()
            .filter(|p| p.action_type == ActionType::DoNothing)
            .count(),
        1
    );

    let patterns = vec![
        make_pattern(PatternType::IssuerDegradation, 0.9),
        make_pattern(PatternType::LatencySpike, 0.5),
    ];
    let proposals = plan_actions(&patterns, &[], &[]);
    assert!(proposals.len() >= 3);
    assert_eq!(
        proposals
            .iter()
            .filter(|p| p.action_type == ActionType::DoNothing)
            .count(),
        1
    );

    // Both menus carry shift_traffic; dedup keeps the first (the more
    // confident pattern's version).
    let shifts: Vec<&ActionProposal> = proposals
        .iter()
        .filter(|p| p.action_type == ActionType::ShiftTraffic)
        .collect();
    assert_eq!(shifts.len(), 1);
    assert_eq!(
        shifts[0].addresses_pattern,
        Some(PatternType::IssuerDegradation)
    );
}

#[test]
fn history_reduces_risk_for_proven_actions() {
    let patterns = vec![make_pattern(PatternType::IssuerDegradation, 0.8)];

    let without_history = plan_actions(&patterns, &[], &[]);
    let history: Vec<ActionOutcome> = (0..4)
        .map(|_| {
            make_outcome(
                ActionType::ShiftTraffic,
                Some(PatternType::IssuerDegradation),
                OutcomeStatus::Success,
                0.05,
            )
        })
        .collect();
    let with_history = plan_actions(&patterns, &[], &history);

    let risk_of = |proposals: &[ActionProposal]| {
        proposals
            .iter()
            .find(|p| p.action_type == ActionType::ShiftTraffic)
            .map(|p| p.estimated_impact.risk_level)
            .expect("shift proposal present")
    };
    assert!(
        risk_of(&with_history) < risk_of(&without_history),
        "a consistently successful action should look less risky"
    );
}

#[test]
fn proposal_risk_and_probability_fields_stay_bounded() {
    let patterns = vec![
        make_pattern(PatternType::IssuerDegradation, 0.05),
        make_pattern(PatternType::RetryStorm, 0.05),
    ];
    let baseline = healthy_baseline();
    let current = broad_outage_snapshot();
    let thresholds = resolve_thresholds(&EngineConfig::default().thresholds, Some(&baseline));
    let anomalies = detect_anomalies(&current, &baseline, &thresholds);

    for proposal in plan_actions(&patterns, &anomalies, &[]) {
        let risk = proposal.estimated_impact.risk_level;
        assert!(
            risk > 0.0 && risk < 1.0,
            "risk must stay inside (0, 1) even for barely-confident patterns"
        );
    }
}

// --- decision engine -------------------------------------------------------

#[test]
fn every_rejection_is_explained() {
    let proposals = plan_actions(&[make_pattern(PatternType::IssuerDegradation, 0.8)], &[], &[]);
    let hypotheses = vec![make_hypothesis(PatternType::IssuerDegradation, 0.8)];
    let decision = decide(
        &proposals,
        &hypotheses,
        &[],
        &DecisionWeights::default(),
        &ApprovalPolicy::default(),
    );

    assert_eq!(decision.rejected_actions.len(), proposals.len() - 1);
    for rejected in &decision.rejected_actions {
        assert!(!rejected.reason.is_empty());
        assert!(!rejected.compared_to_selected.is_empty());
    }
    assert!(decision.confidence > 0.0 && decision.confidence < 1.0);
}

#[test]
fn unseen_pattern_forces_novel_situation_approval() {
    let proposals = plan_actions(&[make_pattern(PatternType::RetryStorm, 0.8)], &[], &[]);
    let hypotheses = vec![make_hypothesis(PatternType::RetryStorm, 0.9)];

    // History exists, but for a different pattern type entirely.
    let history = vec![make_outcome(
        ActionType::ShiftTraffic,
        Some(PatternType::IssuerDegradation),
        OutcomeStatus::Success,
        0.04,
    )];
    let decision = decide(
        &proposals,
        &hypotheses,
        &history,
        &DecisionWeights::default(),
        &ApprovalPolicy::default(),
    );
    assert!(decision.requires_human_approval);
    assert!(decision
        .approval_reasons
        .contains(&ApprovalReason::NovelSituation));

    // Once an outcome shares the pattern type, novelty clears.
    let history = vec![make_outcome(
        ActionType::ExponentialBackoff,
        Some(PatternType::RetryStorm),
        OutcomeStatus::Success,
        0.03,
    )];
    let decision = decide(
        &proposals,
        &hypotheses,
        &history,
        &DecisionWeights::default(),
        &ApprovalPolicy::default(),
    );
    assert!(!decision
        .approval_reasons
        .contains(&ApprovalReason::NovelSituation));
}

#[test]
fn close_hypotheses_are_flagged_ambiguous() {
    let proposals = plan_actions(&[make_pattern(PatternType::RetryStorm, 0.8)], &[], &[]);
    let hypotheses = vec![
        make_hypothesis(PatternType::RetryStorm, 0.72),
        make_hypothesis(PatternType::LatencySpike, 0.68),
    ];
    let decision = decide(
        &proposals,
        &hypotheses,
        &[],
        &DecisionWeights::default(),
        &ApprovalPolicy::default(),
    );
    assert!(decision
        .approval_reasons
        .contains(&ApprovalReason::AmbiguousHypotheses));
}

// --- guardrails ------------------------------------------------------------

#[test]
fn low_confidence_blocks_regardless_of_approval_flags() {
    let guardrails =
        SafetyGuardrails::new(GuardrailLimits::default(), ApprovalPolicy::default());
    let action = make_proposal(
        ActionType::SendNotification,
        ImpactEstimate {
            success_rate_change: 0.0,
            latency_change_ms: 0.0,
            cost_change: 0.05,
            risk_level: 0.05,
        },
    );

    // Even with approval granted and no approval flags set, a decision
    // under the confidence floor must block.
    let decision = make_decision(action, 0.4, false);
    let verdict = guardrails.validate(&decision, true);
    assert!(matches!(verdict, GuardrailVerdict::Blocked { .. }));
}

#[test]
fn traffic_shift_above_cap_blocks() {
    let guardrails =
        SafetyGuardrails::new(GuardrailLimits::default(), ApprovalPolicy::default());
    let mut action = make_proposal(
        ActionType::ShiftTraffic,
        ImpactEstimate {
            success_rate_change: 0.08,
            latency_change_ms: -30.0,
            cost_change: 0.2,
            risk_level: 0.3,
        },
    );
    action
        .parameters
        .insert("shift_percentage".to_string(), serde_json::json!(60.0));

    let decision = make_decision(action, 0.9, false);
    let verdict = guardrails.validate(&decision, true);
    match verdict {
        GuardrailVerdict::Blocked { reason } => {
            assert!(reason.contains("traffic shift"), "reason names the cap: {reason}")
        }
        other => panic!("expected a block, got {other:?}"),
    }
}

#[test]
fn backoff_multiplier_above_cap_blocks() {
    let guardrails =
        SafetyGuardrails::new(GuardrailLimits::default(), ApprovalPolicy::default());
    let mut action = make_proposal(
        ActionType::ExponentialBackoff,
        ImpactEstimate {
            success_rate_change: 0.02,
            latency_change_ms: -60.0,
            cost_change: 0.1,
            risk_level: 0.2,
        },
    );
    action
        .parameters
        .insert("backoff_multiplier".to_string(), serde_json::json!(4.0));

    let decision = make_decision(action, 0.9, false);
    assert!(matches!(
        guardrails.validate(&decision, false),
        GuardrailVerdict::Blocked { .. }
    ));
}

#[test]
fn forwarded_approval_flag_suspends_until_granted() {
    let guardrails =
        SafetyGuardrails::new(GuardrailLimits::default(), ApprovalPolicy::default());
    let action = make_proposal(
        ActionType::LogForAnalysis,
        ImpactEstimate {
            success_rate_change: 0.0,
            latency_change_ms: 0.0,
            cost_change: 0.02,
            risk_level: 0.02,
        },
    );
    let mut decision = make_decision(action, 0.9, true);
    decision.approval_reasons = vec![ApprovalReason::NovelSituation];

    let verdict = guardrails.validate(&decision, false);
    match verdict {
        GuardrailVerdict::AwaitingApproval { reasons, .. } => {
            assert_eq!(reasons, vec![ApprovalReason::NovelSituation]);
        }
        other => panic!("expected suspension, got {other:?}"),
    }

    assert_eq!(
        guardrails.validate(&decision, true),
        GuardrailVerdict::Cleared,
        "granted approval clears the suspension"
    );
}

#[test]
fn action_state_machine_enforces_legal_transitions() {
    let mut execution = ActionExecution::new(Uuid::new_v4());
    assert_eq!(execution.state, ActionState::Proposed);

    execution
        .advance(ActionState::AwaitingApproval)
        .expect("proposed -> awaiting-approval is legal");
    execution
        .advance(ActionState::Approved)
        .expect("awaiting-approval -> approved is legal");
    execution
        .advance(ActionState::Executing)
        .expect("approved -> executing is legal");
    execution
        .advance(ActionState::Succeeded)
        .expect("executing -> succeeded is legal");

    assert!(
        execution.advance(ActionState::Executing).is_err(),
        "succeeded is terminal"
    );

    let mut blocked = ActionExecution::new(Uuid::new_v4());
    blocked.advance(ActionState::Blocked).expect("blockable");
    assert!(
        blocked.advance(ActionState::Executing).is_err(),
        "blocked is terminal"
    );
}

// --- learning store --------------------------------------------------------

#[test]
fn store_evicts_oldest_past_capacity() {
    let store = LearningStore::new();
    let mut first_id = None;
    for i in 0..101 {
        let outcome = make_outcome(
            ActionType::SendNotification,
            None,
            OutcomeStatus::Success,
            0.0,
        );
        if i == 0 {
            first_id = Some(outcome.action_id);
        }
        store.store(outcome);
    }

    let all = store.get_all();
    assert_eq!(all.len(), 100);
    assert!(
        !all.iter().any(|o| Some(o.action_id) == first_id),
        "the oldest entry must have been evicted"
    );
}

#[test]
fn statistics_track_frequency_and_performance() {
    let store = LearningStore::new();
    for _ in 0..3 {
        store.store(make_outcome(
            ActionType::SendNotification,
            None,
            OutcomeStatus::Success,
            0.0,
        ));
    }
    store.store(make_outcome(
        ActionType::ShiftTraffic,
        Some(PatternType::IssuerDegradation),
        OutcomeStatus::Success,
        0.06,
    ));
    store.store(make_outcome(
        ActionType::ThrottlePath,
        Some(PatternType::LatencySpike),
        OutcomeStatus::Failed,
        -0.01,
    ));

    let stats = store.statistics();
    assert_eq!(stats.total_outcomes, 5);
    assert!((stats.success_rate - 0.8).abs() < 1e-9);
    assert_eq!(stats.most_common_action, Some(ActionType::SendNotification));
    assert_eq!(stats.best_performing_action, Some(ActionType::ShiftTraffic));
}

#[test]
fn get_recent_counts_retrievals_and_annotation_sticks() {
    let store = LearningStore::new();
    let outcome = make_outcome(
        ActionType::ShiftTraffic,
        Some(PatternType::IssuerDegradation),
        OutcomeStatus::Success,
        0.05,
    );
    let id = outcome.action_id;
    store.store(outcome);

    assert_eq!(store.get_recent(5).len(), 1);
    assert_eq!(store.get_recent(5).len(), 1);
    assert_eq!(store.statistics().total_retrievals, 2);

    assert!(store.annotate(id, "shift resolved the incident"));
    assert!(!store.annotate(Uuid::new_v4(), "unknown id"));

    assert_eq!(store.utilization(), (1, 100));
}

// --- simulator -------------------------------------------------------------

#[test]
fn seeded_simulators_are_deterministic() {
    let action = {
        let mut a = make_proposal(
            ActionType::ShiftTraffic,
            ImpactEstimate {
                success_rate_change: 0.06,
                latency_change_ms: -30.0,
                cost_change: 0.2,
                risk_level: 0.3,
            },
        );
        a.parameters
            .insert("shift_percentage".to_string(), serde_json::json!(30.0));
        a.parameters
            .insert("from_issuer".to_string(), serde_json::json!("issuer-a"));
        a
    };
    let baseline = single_issuer_degraded_snapshot();

    let first = ActionSimulator::with_seed(42).simulate(&action, &baseline);
    let second = ActionSimulator::with_seed(42).simulate(&action, &baseline);

    assert_eq!(first.improvement, second.improvement);
    assert_eq!(first.after.success_rate, second.after.success_rate);
    assert_eq!(first.duration_ms, second.duration_ms);
    assert_eq!(first.confidence_adjustment, second.confidence_adjustment);
    assert!(first.improvement > 0.0);
    assert!(
        first.confidence_adjustment >= -0.2 && first.confidence_adjustment <= 0.2,
        "confidence adjustment must stay inside the bound"
    );
}

#[test]
fn alerting_actions_change_nothing_and_bias_down() {
    let action = make_proposal(
        ActionType::EscalateOncall,
        ImpactEstimate {
            success_rate_change: 0.0,
            latency_change_ms: 0.0,
            cost_change: 0.1,
            risk_level: 0.05,
        },
    );
    let baseline = single_issuer_degraded_snapshot();

    let outcome = ActionSimulator::with_seed(1).simulate(&action, &baseline);
    assert_eq!(outcome.after.success_rate, baseline.success_rate);
    assert_eq!(outcome.after.retry_ratio, baseline.retry_ratio);
    assert_eq!(outcome.improvement, 0.0);
    assert_eq!(
        outcome.confidence_adjustment, -0.05,
        "alerting never fixes anything and always reports a small negative adjustment"
    );
    assert_eq!(outcome.status, OutcomeStatus::Success);
}

#[test]
fn disabling_a_route_removes_the_issuer_and_recovers_errors() {
    let mut action = make_proposal(
        ActionType::DisableRoute,
        ImpactEstimate {
            success_rate_change: 0.08,
            latency_change_ms: -50.0,
            cost_change: 0.5,
            risk_level: 0.5,
        },
    );
    action
        .parameters
        .insert("issuer".to_string(), serde_json::json!("issuer-a"));
    let baseline = single_issuer_degraded_snapshot();

    let outcome = ActionSimulator::with_seed(3).simulate(&action, &baseline);
    assert_eq!(outcome.after.issuers.len(), 2);
    assert!(outcome.after.issuer("issuer-a").is_none());
    assert_eq!(outcome.after.transaction_count, 6_000);
    assert!(
        outcome.after.success_rate > baseline.success_rate,
        "removing the degraded issuer lifts the weighted success rate"
    );
}

#[test]
fn backoff_reduces_retries_and_tail_latency() {
    let action = make_proposal(
        ActionType::ExponentialBackoff,
        ImpactEstimate {
            success_rate_change: 0.02,
            latency_change_ms: -60.0,
            cost_change: 0.1,
            risk_level: 0.2,
        },
    );
    let baseline = retry_storm_snapshot();

    let outcome = ActionSimulator::with_seed(9).simulate(&action, &baseline);
    assert!(outcome.after.retry_ratio < baseline.retry_ratio);
    assert!(outcome.after.latency_p95_ms < baseline.latency_p95_ms);
    assert!(outcome.improvement >= 0.1, "retry recovery meets the bar");
    assert!(outcome.met_expectations);
}

// --- full cycles -----------------------------------------------------------

#[tokio::test]
async fn broad_outage_cycle_is_severe_and_requires_approval() {
    // Baseline 0.99, current 0.832, three issuers all down ~15 points.
    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        EngineConfig::default(),
        42,
    );
    let report = engine
        .run_cycle(&broad_outage_snapshot(), &healthy_baseline())
        .await;

    let drop = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::SuccessRateDrop)
        .expect("the outage must register as a success-rate drop");
    assert!(drop.severity >= Severity::High);
    assert!(report.decision.requires_human_approval);
    assert!(report.decision.confidence > 0.0 && report.decision.confidence < 1.0);
}

#[tokio::test]
async fn quiet_cycle_defaults_to_inert_low_risk_action() {
    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        EngineConfig::default(),
        42,
    );
    let baseline = healthy_baseline();
    let report = engine.run_cycle(&baseline.clone(), &baseline).await;

    assert!(report.anomalies.is_empty());
    assert!(report.patterns.is_empty());
    assert!(report.hypotheses.is_empty());

    let selected = &report.decision.selected_action;
    assert!(
        matches!(
            selected.action_type,
            ActionType::DoNothing | ActionType::LogForAnalysis | ActionType::SendNotification
        ),
        "a quiet pipeline gets an inert action, got {}",
        selected.action_type
    );
    assert!(selected.estimated_impact.risk_level < 0.1);
    assert!(matches!(
        report.execution,
        ExecutionResult::AwaitingApproval { .. }
    ));
}

#[tokio::test]
async fn oracle_outage_still_produces_a_decision() {
    let engine = make_engine(Arc::new(FailingStubOracle), EngineConfig::default(), 42);
    let report = engine
        .run_cycle(&single_issuer_degraded_snapshot(), &healthy_baseline())
        .await;

    assert!(!report.patterns.is_empty());
    assert!(!report.hypotheses.is_empty());
    assert!(
        report
            .hypotheses
            .iter()
            .all(|h| h.source == HypothesisSource::Fallback),
        "every hypothesis must come from the local fallback path"
    );
    assert!(report.proposals.len() >= 3);
    assert!(report.decision.confidence > 0.0 && report.decision.confidence < 1.0);
}

#[tokio::test]
async fn identical_inputs_reproduce_the_same_decision() {
    let run = |seed| async move {
        let engine = make_engine(
            Arc::new(StaticStubOracle::new(oracle_response(0.8))),
            EngineConfig::default(),
            seed,
        );
        engine
            .run_cycle(&retry_storm_snapshot(), &healthy_baseline())
            .await
    };

    let first = run(7).await;
    let second = run(7).await;

    assert_eq!(
        first.decision.selected_action.action_type,
        second.decision.selected_action.action_type
    );
    assert_eq!(first.decision.approval_reasons, second.decision.approval_reasons);
    assert_eq!(first.patterns.len(), second.patterns.len());
}

#[tokio::test]
async fn familiar_retry_storm_executes_and_learns() {
    // A lowered confidence floor plus history for this pattern lets the
    // cycle clear guardrails and actually (simulated-)execute.
    let mut cfg = EngineConfig::default();
    cfg.guardrails.min_confidence = 0.3;

    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        cfg,
        42,
    );
    engine.store().store(make_outcome(
        ActionType::EscalateOncall,
        Some(PatternType::RetryStorm),
        OutcomeStatus::Success,
        0.0,
    ));

    let report = engine
        .run_cycle(&retry_storm_snapshot(), &healthy_baseline())
        .await;

    assert!(!report.decision.requires_human_approval);
    match &report.execution {
        ExecutionResult::Executed(outcome) => {
            assert_eq!(outcome.pattern_type, Some(PatternType::RetryStorm));
            assert_eq!(outcome.status, OutcomeStatus::Success);
        }
        other => panic!("expected execution, got {other:?}"),
    }
    assert_eq!(
        engine.store().len(),
        2,
        "the outcome feeds back into the learning store"
    );
}

#[tokio::test]
async fn suspended_decision_executes_after_approval() {
    let mut cfg = EngineConfig::default();
    cfg.guardrails.min_confidence = 0.3;

    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        cfg,
        42,
    );
    let current = single_issuer_degraded_snapshot();
    let report = engine.run_cycle(&current, &healthy_baseline()).await;

    assert!(
        matches!(report.execution, ExecutionResult::AwaitingApproval { .. }),
        "a high-impact first-time action must wait for approval"
    );

    let result = engine.approve_and_execute(&report.decision, &current);
    assert!(matches!(result, ExecutionResult::Executed(_)));
}

#[tokio::test]
async fn approval_never_bypasses_hard_limits() {
    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        EngineConfig::default(),
        42,
    );

    let mut action = make_proposal(
        ActionType::ShiftTraffic,
        ImpactEstimate {
            success_rate_change: 0.08,
            latency_change_ms: -30.0,
            cost_change: 0.2,
            risk_level: 0.3,
        },
    );
    action
        .parameters
        .insert("shift_percentage".to_string(), serde_json::json!(80.0));
    let decision = make_decision(action, 0.9, true);

    let result = engine.approve_and_execute(&decision, &healthy_baseline());
    assert!(matches!(result, ExecutionResult::Blocked { .. }));
}

#[tokio::test]
async fn batch_dispatch_halts_at_the_concurrency_cap() {
    let mut cfg = EngineConfig::default();
    cfg.guardrails.min_confidence = 0.3;

    let engine = make_engine(
        Arc::new(StaticStubOracle::new(oracle_response(0.8))),
        cfg,
        42,
    );
    engine.store().store(make_outcome(
        ActionType::EscalateOncall,
        Some(PatternType::RetryStorm),
        OutcomeStatus::Success,
        0.0,
    ));

    let report = engine
        .run_cycle(&retry_storm_snapshot(), &healthy_baseline())
        .await;
    let decisions = vec![report.decision.clone(); 5];

    let dispatches = engine.run_batch(&decisions, &retry_storm_snapshot());
    assert_eq!(dispatches.len(), 5);
    let executed = dispatches
        .iter()
        .filter(|d| matches!(d, BatchDispatch::Dispatched(ExecutionResult::Executed(_))))
        .count();
    let queued = dispatches
        .iter()
        .filter(|d| matches!(d, BatchDispatch::Queued))
        .count();
    assert_eq!(executed, 3, "dispatch halts at the concurrent-action cap");
    assert_eq!(queued, 2, "the remainder is queued, not blocked");
}
