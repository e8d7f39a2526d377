use unite_health_scoring::config::WEIGHT_TOLERANCE;
use unite_health_scoring::scoring::{DimensionSpec, Transform};
use unite_health_scoring::{
    Availability, ConfigError, ReportKind, Scorer, ScoringConfig, SignalBag, SignalValue, Status,
    WeightTable,
};

const SWEEP: &[f64] = &[
    -1000.0, -50.0, -20.0, -5.0, 0.0, 0.2, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 7.0, 8.0, 10.0,
    12.0, 15.0, 18.0, 20.0, 30.0, 45.0, 60.0, 72.0, 90.0, 100.0, 250.0, 500.0, 1000.0, 1e9,
];

/// Every signal of `spec` at a middling value, so sweeps run against a
/// realistic background rather than an empty bag.
fn background(spec: &DimensionSpec) -> SignalBag {
    let mut bag = SignalBag::new();
    for factor in &spec.factors {
        match factor.transform {
            Transform::Ratio {
                numerator,
                denominator,
            } => {
                bag.insert(numerator, SignalValue::Number(5.0));
                bag.insert(denominator, SignalValue::Number(10.0));
            }
            Transform::Flag { signal } => bag.insert(signal, SignalValue::Flag(true)),
            _ => bag.insert(
                factor.transform.primary_signal(),
                SignalValue::Number(5.0),
            ),
        }
    }
    bag
}

fn dimension_score(scorer: &Scorer, dimension: &str, bag: &SignalBag) -> u8 {
    scorer
        .score(bag)
        .dimension(dimension)
        .map(|d| d.score)
        .expect("dimension present")
}

#[test]
fn weight_tables_sum_to_one() {
    for kind in ReportKind::ALL {
        let sum = kind.default_weights().sum();
        assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE, "{kind} sums to {sum}");

        for dimension in &kind.profile().dimensions {
            let factor_sum = dimension.factor_weight_sum();
            assert!(
                (factor_sum - 1.0).abs() <= WEIGHT_TOLERANCE,
                "{kind}/{} factors sum to {factor_sum}",
                dimension.name
            );
        }
    }
}

#[test]
fn malformed_weight_tables_fail_at_construction() {
    let weights = WeightTable::new()
        .with("acquisition", 0.5)
        .with("conversion", 0.5)
        .with("retention", 0.5)
        .with("content", 0.5);
    let config = ScoringConfig {
        weights,
        ..ScoringConfig::defaults(ReportKind::Kpi)
    };

    assert!(matches!(
        Scorer::new(ReportKind::Kpi, config),
        Err(ConfigError::WeightSum { .. })
    ));
}

#[test]
fn raising_a_signal_moves_its_dimension_one_way() {
    for kind in ReportKind::ALL {
        let scorer = Scorer::with_defaults(kind).unwrap();

        for spec in &scorer.profile().dimensions {
            for factor in &spec.factors {
                let signal = factor.transform.primary_signal();
                let increasing = factor.transform.is_increasing();

                if let Transform::Flag { .. } = factor.transform {
                    let off = dimension_score(
                        &scorer,
                        spec.name,
                        &background(spec).flag_signal(signal, false),
                    );
                    let on = dimension_score(
                        &scorer,
                        spec.name,
                        &background(spec).flag_signal(signal, true),
                    );
                    assert!(on >= off, "{kind}/{}/{signal}", spec.name);
                    continue;
                }

                let mut previous: Option<u8> = None;
                for value in SWEEP {
                    let bag = background(spec).number_signal(signal, *value);
                    let score = dimension_score(&scorer, spec.name, &bag);
                    if let Some(previous) = previous {
                        if increasing {
                            assert!(score >= previous, "{kind}/{}/{signal} at {value}", spec.name);
                        } else {
                            assert!(score <= previous, "{kind}/{}/{signal} at {value}", spec.name);
                        }
                    }
                    previous = Some(score);
                }
            }
        }
    }
}

#[test]
fn raising_a_ratio_denominator_never_raises_its_dimension() {
    let positive: Vec<f64> = SWEEP.iter().copied().filter(|v| *v > 0.0).collect();
    let mut swept = 0;

    for kind in ReportKind::ALL {
        let scorer = Scorer::with_defaults(kind).unwrap();

        for spec in &scorer.profile().dimensions {
            for factor in &spec.factors {
                let Transform::Ratio { denominator, .. } = factor.transform else {
                    continue;
                };
                swept += 1;

                let mut previous: Option<u8> = None;
                for value in &positive {
                    let bag = background(spec).number_signal(denominator, *value);
                    let score = dimension_score(&scorer, spec.name, &bag);
                    if let Some(previous) = previous {
                        assert!(
                            score <= previous,
                            "{kind}/{}/{denominator} at {value}",
                            spec.name
                        );
                    }
                    previous = Some(score);
                }
            }
        }
    }

    assert!(swept > 0, "no ratio factors found");
}

#[test]
fn scores_stay_within_bounds_for_extreme_input() {
    for kind in ReportKind::ALL {
        let scorer = Scorer::with_defaults(kind).unwrap();
        let signals: Vec<&str> = scorer
            .profile()
            .dimensions
            .iter()
            .flat_map(|d| d.factors.iter().flat_map(|f| f.transform.signals()))
            .collect();

        for extreme in [-1e12, -1.0, 0.0, 1e-9, 1e12] {
            let bag: SignalBag = signals
                .iter()
                .map(|s| ((*s).to_string(), SignalValue::Number(extreme)))
                .collect();
            let report = scorer.score(&bag);

            assert!(report.overall_score <= 100, "{kind} at {extreme}");
            assert!(report.data_completeness <= 100);
            for dimension in &report.dimensions {
                assert!(dimension.score <= 100, "{kind}/{} at {extreme}", dimension.name);
            }
        }
    }
}

#[test]
fn mistyped_input_is_never_fatal() {
    for kind in ReportKind::ALL {
        let scorer = Scorer::with_defaults(kind).unwrap();
        let bag: SignalBag = scorer
            .profile()
            .dimensions
            .iter()
            .flat_map(|d| d.factors.iter().flat_map(|f| f.transform.signals()))
            .map(|s| (s.to_string(), SignalValue::Text("n/a".to_string())))
            .collect();

        let report = scorer.score(&bag);
        assert_eq!(report.overall_score, 0);
        assert_eq!(report.overall_status, Status::Critical);
        assert!(report
            .dimensions
            .iter()
            .all(|d| d.availability == Availability::Insufficient));
    }
}

#[test]
fn alerts_are_deterministic_and_sorted() {
    let scorer = Scorer::with_defaults(ReportKind::Enterprise).unwrap();
    let bag = SignalBag::new()
        .number_signal("invoicesOverdue", 3.0)
        .flag_signal("paymentMethodValid", false)
        .number_signal("daysUntilRenewal", 20.0)
        .number_signal("activeSeats", 10.0)
        .number_signal("purchasedSeats", 50.0)
        .number_signal("featureAdoptionRate", 15.0)
        .number_signal("criticalAuditEvents", 2.0)
        .number_signal("daysSinceAuditReview", 120.0)
        .flag_signal("ssoEnabled", false);

    let first = scorer.score(&bag);
    let second = scorer.score(&bag);
    assert_eq!(first.blockers, second.blockers);
    assert_eq!(first.opportunities, second.opportunities);

    let ids: Vec<&str> = first.blockers.iter().map(|b| b.rule_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "invoices_overdue",
            "critical_audit_events",
            "payment_method_invalid",
            "renewal_at_risk",
            "audit_review_overdue",
        ]
    );
    assert_eq!(first.opportunities[0].rule_id, "enable_sso");
    assert!(first.wins.is_empty());
}

#[test]
fn reports_serialize_with_snake_case_labels() {
    let scorer = Scorer::with_defaults(ReportKind::FinancialHealth).unwrap();
    let bag = SignalBag::new()
        .number_signal("runwayMonths", 4.0)
        .number_signal("burnMultiple", 3.0);

    let report = scorer.score(&bag).for_subject("acme");
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["kind"], "financial_health");
    assert_eq!(json["subject"], "acme");
    assert_eq!(json["blockers"][0]["rule_id"], "runway_critical");
    assert_eq!(json["blockers"][0]["severity"], "critical");
    assert_eq!(json["dimensions"][0]["availability"], "full");

    let restored: unite_health_scoring::Report = serde_json::from_value(json).unwrap();
    assert_eq!(restored, report);
}
