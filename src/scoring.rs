use chrono::Utc;

use crate::config::{ConfigError, ScoringConfig, ThresholdTable};
use crate::models::{
    format_number, Availability, DimensionScore, Report, SignalBag, SubjectSignals,
};
use crate::profiles::{Profile, ReportKind};
use crate::rules::{self, Narrative, RuleContext};

/// A step in a bucketed transform: values at or above `at` score `score`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    pub at: f64,
    pub score: f64,
}

pub const fn cut(at: f64, score: f64) -> Cut {
    Cut { at, score }
}

/// How a factor turns raw signals into a 0-100 contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// `numerator / denominator` as a percentage. Absent unless the
    /// denominator is positive.
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
    /// A value already on the 0-100 scale.
    Direct { signal: &'static str },
    /// `value / max` as a percentage.
    Scaled { signal: &'static str, max: f64 },
    /// `1 - value / max` as a percentage; lower values score higher.
    Inverse { signal: &'static str, max: f64 },
    /// `true` scores 100, `false` scores 0.
    Flag { signal: &'static str },
    /// Score of the last cut at or below the value. Values below the first
    /// cut take its score. Cuts must be sorted by `at`.
    Buckets {
        signal: &'static str,
        cuts: &'static [Cut],
    },
}

impl Transform {
    /// The signal whose value drives the contribution.
    pub fn primary_signal(&self) -> &'static str {
        match *self {
            Transform::Ratio { numerator, .. } => numerator,
            Transform::Direct { signal }
            | Transform::Scaled { signal, .. }
            | Transform::Inverse { signal, .. }
            | Transform::Flag { signal }
            | Transform::Buckets { signal, .. } => signal,
        }
    }

    pub fn signals(&self) -> Vec<&'static str> {
        match *self {
            Transform::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            _ => vec![self.primary_signal()],
        }
    }

    /// Whether a larger primary signal value yields a larger contribution.
    pub fn is_increasing(&self) -> bool {
        match self {
            Transform::Inverse { .. } => false,
            Transform::Buckets { cuts, .. } => cuts.windows(2).all(|w| w[0].score <= w[1].score),
            _ => true,
        }
    }

    /// Contribution in [0, 100] plus a description of the value used, or
    /// `None` when the signal is absent.
    pub fn evaluate(&self, label: &str, bag: &SignalBag) -> Option<(f64, String)> {
        match *self {
            Transform::Ratio {
                numerator,
                denominator,
            } => {
                let num = number(bag, numerator)?;
                let den = number(bag, denominator)?;
                if den <= 0.0 {
                    return None;
                }
                Some((
                    percent(num / den),
                    format!("{}/{} {label}", format_number(num), format_number(den)),
                ))
            }
            Transform::Direct { signal } => {
                let value = number(bag, signal)?;
                Some((value.clamp(0.0, 100.0), describe(label, value)))
            }
            Transform::Scaled { signal, max } => {
                let value = number(bag, signal)?;
                Some((percent(value / max), describe(label, value)))
            }
            Transform::Inverse { signal, max } => {
                let value = number(bag, signal)?;
                Some((percent(1.0 - value / max), describe(label, value)))
            }
            Transform::Flag { signal } => {
                let value = flag(bag, signal)?;
                let contribution = if value { 100.0 } else { 0.0 };
                Some((
                    contribution,
                    format!("{label}: {}", if value { "yes" } else { "no" }),
                ))
            }
            Transform::Buckets { signal, cuts } => {
                let value = number(bag, signal)?;
                let contribution = cuts
                    .iter()
                    .rev()
                    .find(|c| value >= c.at)
                    .or_else(|| cuts.first())
                    .map_or(0.0, |c| c.score);
                Some((contribution.clamp(0.0, 100.0), describe(label, value)))
            }
        }
    }
}

fn percent(fraction: f64) -> f64 {
    if fraction.is_finite() {
        (fraction * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn describe(label: &str, value: f64) -> String {
    format!("{label}: {}", format_number(value))
}

fn number(bag: &SignalBag, name: &str) -> Option<f64> {
    let value = bag.get(name)?;
    match value.as_number() {
        Some(n) if n.is_finite() => Some(n),
        _ => {
            tracing::debug!(signal = name, found = value.type_name(), "ignoring non-numeric signal");
            None
        }
    }
}

fn flag(bag: &SignalBag, name: &str) -> Option<bool> {
    let value = bag.get(name)?;
    let parsed = value.as_flag();
    if parsed.is_none() {
        tracing::debug!(signal = name, found = value.type_name(), "ignoring non-flag signal");
    }
    parsed
}

/// One weighted input to a dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub label: &'static str,
    pub transform: Transform,
    pub weight: f64,
}

impl Factor {
    pub fn new(label: &'static str, transform: Transform, weight: f64) -> Self {
        Self {
            label,
            transform,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    pub name: &'static str,
    pub factors: Vec<Factor>,
}

impl DimensionSpec {
    pub fn new(name: &'static str, factors: Vec<Factor>) -> Self {
        Self { name, factors }
    }

    pub fn factor_weight_sum(&self) -> f64 {
        self.factors.iter().map(|f| f.weight).sum()
    }
}

/// Round and clamp a raw score onto 0..=100. Non-finite input scores 0.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_finite() {
        raw.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

pub fn availability(data_points: usize, available_points: usize) -> Availability {
    if available_points > 0 && data_points == available_points {
        Availability::Full
    } else if available_points > 0 && data_points * 2 >= available_points {
        Availability::Partial
    } else {
        Availability::Insufficient
    }
}

/// Score one dimension from whatever signals are present.
///
/// Present factors add `contribution * weight`; the sum is then divided by
/// the fraction of factors present so sparse dimensions are not dragged
/// toward zero. The result is clamped, which hides overshoot when only a
/// heavily weighted factor is present.
pub fn score_dimension(
    spec: &DimensionSpec,
    weight: f64,
    bag: &SignalBag,
    thresholds: &ThresholdTable,
) -> DimensionScore {
    let mut weighted_sum = 0.0;
    let mut data_points = 0usize;
    let mut available_points = 0usize;
    let mut factors = Vec::new();

    for factor in &spec.factors {
        available_points += 1;
        if let Some((contribution, description)) = factor.transform.evaluate(factor.label, bag) {
            weighted_sum += contribution * factor.weight;
            data_points += 1;
            factors.push(description);
        }
    }

    let raw = if data_points == 0 || available_points == 0 {
        0.0
    } else {
        weighted_sum / (data_points as f64 / available_points as f64)
    };
    let score = clamp_score(raw);

    tracing::debug!(
        dimension = spec.name,
        raw,
        score,
        data_points,
        available_points,
        "dimension scored"
    );

    DimensionScore {
        name: spec.name.to_string(),
        weight,
        score,
        status: thresholds.classify(f64::from(score)),
        factors,
        availability: availability(data_points, available_points),
        data_points,
        available_points,
    }
}

/// `round(sum(score * weight))`, clamped so a malformed weight table still
/// yields a bounded number.
pub fn aggregate(dimensions: &[DimensionScore]) -> u8 {
    let total: f64 = dimensions
        .iter()
        .map(|d| f64::from(d.score) * d.weight)
        .sum();
    clamp_score(total)
}

/// Full dimensions count 100, partial ones 50, insufficient ones nothing.
pub fn data_completeness(dimensions: &[DimensionScore]) -> u8 {
    if dimensions.is_empty() {
        return 0;
    }

    let points: usize = dimensions
        .iter()
        .map(|d| match d.availability {
            Availability::Full => 100,
            Availability::Partial => 50,
            Availability::Insufficient => 0,
        })
        .sum();

    clamp_score(points as f64 / dimensions.len() as f64)
}

/// Scores signal bags against one profile and configuration. Construction
/// validates the configuration; scoring itself cannot fail.
#[derive(Debug, Clone)]
pub struct Scorer {
    profile: Profile,
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(kind: ReportKind, config: ScoringConfig) -> Result<Self, ConfigError> {
        Self::with_profile(kind.profile(), config)
    }

    pub fn with_defaults(kind: ReportKind) -> Result<Self, ConfigError> {
        Self::new(kind, ScoringConfig::defaults(kind))
    }

    pub fn with_profile(profile: Profile, config: ScoringConfig) -> Result<Self, ConfigError> {
        profile.validate()?;
        config.validate(&profile)?;

        tracing::info!(
            kind = %profile.kind,
            dimensions = profile.dimensions.len(),
            rules = profile.rules.len(),
            "scorer configured"
        );

        Ok(Self { profile, config })
    }

    pub fn kind(&self) -> ReportKind {
        self.profile.kind
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, bag: &SignalBag) -> Report {
        let thresholds = &self.config.thresholds;
        let dimensions: Vec<DimensionScore> = self
            .profile
            .dimensions
            .iter()
            .map(|spec| score_dimension(spec, self.config.weights.weight(spec.name), bag, thresholds))
            .collect();

        let overall_score = aggregate(&dimensions);
        let context = RuleContext {
            signals: bag,
            dimensions: &dimensions,
            overall_score,
        };
        let narrative = Narrative::from_alerts(rules::evaluate(&self.profile.rules, &context));

        Report {
            kind: self.profile.kind,
            subject: None,
            overall_score,
            overall_status: thresholds.classify(f64::from(overall_score)),
            data_completeness: data_completeness(&dimensions),
            dimensions,
            blockers: narrative.blockers,
            opportunities: narrative.opportunities,
            wins: narrative.wins,
            recommendations: narrative.recommendations,
            generated_at: Utc::now(),
        }
    }

    /// Score every subject, lowest overall score first.
    pub fn score_all(&self, subjects: &[SubjectSignals]) -> Vec<Report> {
        let mut reports: Vec<Report> = subjects
            .iter()
            .map(|s| self.score(&s.signals).for_subject(s.subject.clone()))
            .collect();

        reports.sort_by(|a, b| {
            a.overall_score
                .cmp(&b.overall_score)
                .then_with(|| a.subject.cmp(&b.subject))
        });
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalValue, Status};

    const SATISFACTION: &[Cut] = &[cut(0.0, 0.0), cut(5.0, 50.0), cut(8.0, 100.0)];
    const RECENCY: &[Cut] = &[cut(0.0, 100.0), cut(7.0, 40.0)];

    fn sample_dimension() -> DimensionSpec {
        DimensionSpec::new(
            "momentum",
            vec![
                Factor::new(
                    "milestones",
                    Transform::Ratio {
                        numerator: "done",
                        denominator: "total",
                    },
                    0.5,
                ),
                Factor::new("shipped", Transform::Scaled { signal: "shipped", max: 4.0 }, 0.3),
                Factor::new("on track", Transform::Flag { signal: "onTrack" }, 0.2),
            ],
        )
    }

    fn alignment_example() -> SignalBag {
        SignalBag::new()
            .number_signal("milestonesCompleted", 3.0)
            .number_signal("totalMilestones", 10.0)
            .number_signal("journeyDay", 20.0)
            .flag_signal("brandKitUploaded", false)
    }

    fn maximal_alignment() -> SignalBag {
        SignalBag::new()
            .number_signal("milestonesCompleted", 10.0)
            .number_signal("totalMilestones", 10.0)
            .number_signal("daysSinceLastActivity", 0.0)
            .number_signal("deliverablesShipped", 4.0)
            .number_signal("journeyDay", 45.0)
            .flag_signal("profileCompleted", true)
            .flag_signal("brandKitUploaded", true)
            .flag_signal("goalsDefined", true)
            .number_signal("pendingApprovals", 0.0)
            .number_signal("avgApprovalHours", 0.0)
            .number_signal("revisionRate", 0.0)
            .number_signal("clientSatisfaction", 10.0)
            .number_signal("engagementRate", 100.0)
            .number_signal("loginsThisWeek", 5.0)
    }

    #[test]
    fn availability_tiers() {
        assert_eq!(availability(3, 3), Availability::Full);
        assert_eq!(availability(2, 3), Availability::Partial);
        assert_eq!(availability(1, 2), Availability::Partial);
        assert_eq!(availability(1, 3), Availability::Insufficient);
        assert_eq!(availability(0, 3), Availability::Insufficient);
        assert_eq!(availability(0, 0), Availability::Insufficient);
    }

    #[test]
    fn full_dimension_is_plain_weighted_sum() {
        let bag = SignalBag::new()
            .number_signal("done", 5.0)
            .number_signal("total", 10.0)
            .number_signal("shipped", 2.0)
            .flag_signal("onTrack", true);

        let scored = score_dimension(&sample_dimension(), 0.25, &bag, &ThresholdTable::default());
        // 50 * 0.5 + 50 * 0.3 + 100 * 0.2
        assert_eq!(scored.score, 60);
        assert_eq!(scored.status, Status::Healthy);
        assert_eq!(scored.availability, Availability::Full);
        assert_eq!(scored.weight, 0.25);
        assert_eq!(
            scored.factors,
            vec!["5/10 milestones", "shipped: 2", "on track: yes"]
        );
    }

    #[test]
    fn sparse_dimension_is_rescaled_by_coverage() {
        let bag = SignalBag::new()
            .number_signal("done", 6.0)
            .number_signal("total", 10.0)
            .number_signal("shipped", 1.0);

        let scored = score_dimension(&sample_dimension(), 0.25, &bag, &ThresholdTable::default());
        // (60 * 0.5 + 25 * 0.3) / (2 / 3) = 56.25
        assert_eq!(scored.score, 56);
        assert_eq!(scored.availability, Availability::Partial);
        assert_eq!(scored.data_points, 2);
        assert_eq!(scored.available_points, 3);
    }

    #[test]
    fn sparse_overshoot_is_clamped() {
        let bag = SignalBag::new()
            .number_signal("done", 10.0)
            .number_signal("total", 10.0);

        // 100 * 0.5 / (1 / 3) = 150 before clamping
        let scored = score_dimension(&sample_dimension(), 1.0, &bag, &ThresholdTable::default());
        assert_eq!(scored.score, 100);
        assert_eq!(scored.availability, Availability::Insufficient);
    }

    #[test]
    fn dimension_without_factors_scores_zero() {
        let empty = DimensionSpec::new("empty", Vec::new());
        let scored = score_dimension(&empty, 0.5, &alignment_example(), &ThresholdTable::default());
        assert_eq!(scored.score, 0);
        assert_eq!(scored.status, Status::Critical);
        assert_eq!(scored.availability, Availability::Insufficient);
        assert!(scored.factors.is_empty());
    }

    #[test]
    fn zero_denominator_counts_as_absent() {
        let bag = SignalBag::new()
            .number_signal("done", 0.0)
            .number_signal("total", 0.0);
        let scored = score_dimension(&sample_dimension(), 1.0, &bag, &ThresholdTable::default());
        assert_eq!(scored.data_points, 0);
        assert_eq!(scored.score, 0);
    }

    #[test]
    fn mistyped_signals_count_as_absent() {
        let bag = SignalBag::new()
            .with("shipped", SignalValue::Text("two".to_string()))
            .number_signal("onTrack", 1.0);
        let scored = score_dimension(&sample_dimension(), 1.0, &bag, &ThresholdTable::default());
        assert_eq!(scored.data_points, 0);
        assert!(scored.factors.is_empty());
    }

    #[test]
    fn buckets_pick_last_cut_reached() {
        let transform = Transform::Buckets {
            signal: "csat",
            cuts: SATISFACTION,
        };
        let at = |v: f64| {
            transform
                .evaluate("csat", &SignalBag::new().number_signal("csat", v))
                .map(|(c, _)| c)
        };
        assert_eq!(at(-1.0), Some(0.0));
        assert_eq!(at(4.9), Some(0.0));
        assert_eq!(at(5.0), Some(50.0));

        let recency = Transform::Buckets {
            signal: "days",
            cuts: RECENCY,
        };
        let days = |v: f64| {
            recency
                .evaluate("days", &SignalBag::new().number_signal("days", v))
                .map(|(c, _)| c)
        };
        assert_eq!(days(-3.0), Some(100.0));
        assert_eq!(days(30.0), Some(40.0));
        assert!(!recency.is_increasing());
        assert_eq!(at(9.0), Some(100.0));
        assert!(transform.is_increasing());
    }

    #[test]
    fn inverse_and_scaled_clamp_out_of_range_values() {
        let bag = SignalBag::new().number_signal("x", 150.0);
        let inverse = Transform::Inverse { signal: "x", max: 100.0 };
        let scaled = Transform::Scaled { signal: "x", max: 100.0 };
        let direct = Transform::Direct { signal: "x" };
        assert_eq!(inverse.evaluate("x", &bag).map(|(c, _)| c), Some(0.0));
        assert_eq!(scaled.evaluate("x", &bag).map(|(c, _)| c), Some(100.0));
        assert_eq!(direct.evaluate("x", &bag).map(|(c, _)| c), Some(100.0));
        assert!(!inverse.is_increasing());
    }

    #[test]
    fn aggregate_rounds_weighted_sum() {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let report = scorer.score(&alignment_example());
        // momentum 45 * 0.25 = 11.25
        assert_eq!(report.overall_score, 11);
        assert_eq!(report.overall_status, Status::Critical);
    }

    #[test]
    fn aggregate_stays_bounded_with_unnormalized_weights() {
        let dims: Vec<DimensionScore> = (0..3)
            .map(|i| DimensionScore {
                name: format!("d{i}"),
                weight: 0.9,
                score: 100,
                status: Status::Strong,
                factors: Vec::new(),
                availability: Availability::Full,
                data_points: 1,
                available_points: 1,
            })
            .collect();
        assert_eq!(aggregate(&dims), 100);
        assert_eq!(aggregate(&dims), aggregate(&dims));
    }

    #[test]
    fn completeness_weights_partial_as_half() {
        let dim = |availability| DimensionScore {
            name: "d".to_string(),
            weight: 0.25,
            score: 50,
            status: Status::Healthy,
            factors: Vec::new(),
            availability,
            data_points: 0,
            available_points: 0,
        };
        let dims = vec![
            dim(Availability::Full),
            dim(Availability::Partial),
            dim(Availability::Insufficient),
        ];
        // (100 + 50) / 3 = 50
        assert_eq!(data_completeness(&dims), 50);
        assert_eq!(data_completeness(&[]), 0);
    }

    #[test]
    fn alignment_example_scores_momentum_and_flags_brand_kit() {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let report = scorer.score(&alignment_example());

        let momentum = report.dimension("momentum").unwrap();
        // 30 * 0.5 / (1 / 3)
        assert_eq!(momentum.score, 45);
        assert_eq!(momentum.status, Status::NeedsAttention);
        assert_eq!(momentum.factors, vec!["3/10 milestones"]);
        assert_eq!(momentum.weight, 0.25);

        let brand_kit = report
            .blockers
            .iter()
            .find(|b| b.rule_id == "brand_kit_missing")
            .expect("brand kit blocker");
        assert_eq!(brand_kit.severity, crate::models::Severity::High);
        assert_eq!(report.data_completeness, 0);
    }

    #[test]
    fn maximal_alignment_is_strong_without_blockers() {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let report = scorer.score(&maximal_alignment());

        assert_eq!(report.overall_score, 100);
        assert_eq!(report.overall_status, Status::Strong);
        assert!(report.blockers.is_empty());
        assert_eq!(report.data_completeness, 100);
        assert!(report.dimensions.iter().all(|d| d.score == 100));
        assert!(!report.wins.is_empty());
    }

    #[test]
    fn empty_input_degrades_gracefully() {
        for kind in ReportKind::ALL {
            let scorer = Scorer::with_defaults(kind).unwrap();
            let report = scorer.score(&SignalBag::new());

            assert_eq!(report.overall_score, 0, "{kind}");
            assert_eq!(report.overall_status, Status::Critical);
            assert_eq!(report.data_completeness, 0);
            assert!(report.alerts().next().is_none(), "{kind} fired alerts on empty input");
            for dimension in &report.dimensions {
                assert_eq!(dimension.score, 0);
                assert_eq!(dimension.status, Status::Critical);
                assert_eq!(dimension.availability, Availability::Insufficient);
            }
        }
    }

    #[test]
    fn scoring_is_idempotent_apart_from_timestamp() {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let first = scorer.score(&alignment_example());
        let mut second = scorer.score(&alignment_example());
        second.generated_at = first.generated_at;
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_weights_fail_construction() {
        let mut config = ScoringConfig::defaults(ReportKind::Alignment);
        config.weights = config.weights.with("momentum", 0.5);
        assert!(matches!(
            Scorer::new(ReportKind::Alignment, config),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn custom_profile_with_bad_factor_weights_is_rejected() {
        let mut profile = ReportKind::Kpi.profile();
        profile.dimensions[0].factors[0].weight = 0.9;
        let err = Scorer::with_profile(profile, ScoringConfig::defaults(ReportKind::Kpi)).unwrap_err();
        assert!(matches!(err, ConfigError::FactorWeightSum { .. }));
    }

    #[test]
    fn score_all_orders_most_at_risk_first() {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let subjects = vec![
            SubjectSignals {
                subject: "healthy-co".to_string(),
                signals: maximal_alignment(),
            },
            SubjectSignals {
                subject: "new-co".to_string(),
                signals: alignment_example(),
            },
            SubjectSignals {
                subject: "blank-co".to_string(),
                signals: SignalBag::new(),
            },
        ];

        let reports = scorer.score_all(&subjects);
        let order: Vec<_> = reports.iter().filter_map(|r| r.subject.as_deref()).collect();
        assert_eq!(order, vec!["blank-co", "new-co", "healthy-co"]);
    }
}
