//! Declarative alert rules evaluated against a scored report.
//!
//! Every rule is an independent predicate over the input signals and the
//! computed dimensions. New alerts are added by appending to a profile's rule
//! table.

use crate::models::{Alert, AlertKind, Availability, DimensionScore, Severity, SignalBag};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The flag signal is present and equals `value`.
    FlagIs { signal: &'static str, value: bool },
    /// The numeric signal is present and strictly greater than `threshold`.
    Above { signal: &'static str, threshold: f64 },
    /// The numeric signal is present and strictly less than `threshold`.
    Below { signal: &'static str, threshold: f64 },
    TextIs {
        signal: &'static str,
        value: &'static str,
    },
    Missing { signal: &'static str },
    /// Dimension score below `score`. Never true for a dimension with
    /// insufficient data.
    DimensionBelow { dimension: &'static str, score: u8 },
    /// Dimension score at or above `score`. Never true for a dimension with
    /// insufficient data.
    DimensionAtLeast { dimension: &'static str, score: u8 },
    OverallBelow(u8),
    OverallAtLeast(u8),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

/// What a predicate can see.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub signals: &'a SignalBag,
    pub dimensions: &'a [DimensionScore],
    pub overall_score: u8,
}

impl RuleContext<'_> {
    fn trusted_dimension(&self, name: &str) -> Option<&DimensionScore> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .filter(|d| d.availability != Availability::Insufficient)
    }
}

impl Predicate {
    pub fn holds(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Predicate::FlagIs { signal, value } => ctx.signals.flag(signal) == Some(*value),
            Predicate::Above { signal, threshold } => {
                ctx.signals.number(signal).is_some_and(|v| v > *threshold)
            }
            Predicate::Below { signal, threshold } => {
                ctx.signals.number(signal).is_some_and(|v| v < *threshold)
            }
            Predicate::TextIs { signal, value } => ctx.signals.text(signal) == Some(*value),
            Predicate::Missing { signal } => !ctx.signals.contains(signal),
            Predicate::DimensionBelow { dimension, score } => ctx
                .trusted_dimension(dimension)
                .is_some_and(|d| d.score < *score),
            Predicate::DimensionAtLeast { dimension, score } => ctx
                .trusted_dimension(dimension)
                .is_some_and(|d| d.score >= *score),
            Predicate::OverallBelow(score) => ctx.overall_score < *score,
            Predicate::OverallAtLeast(score) => ctx.overall_score >= *score,
            Predicate::All(predicates) => predicates.iter().all(|p| p.holds(ctx)),
            Predicate::Any(predicates) => predicates.iter().any(|p| p.holds(ctx)),
            Predicate::Not(predicate) => !predicate.holds(ctx),
        }
    }
}

/// Convenience constructors so rule tables read as data.
pub mod when {
    use super::Predicate;

    pub fn flag_is(signal: &'static str, value: bool) -> Predicate {
        Predicate::FlagIs { signal, value }
    }

    pub fn above(signal: &'static str, threshold: f64) -> Predicate {
        Predicate::Above { signal, threshold }
    }

    pub fn below(signal: &'static str, threshold: f64) -> Predicate {
        Predicate::Below { signal, threshold }
    }

    pub fn text_is(signal: &'static str, value: &'static str) -> Predicate {
        Predicate::TextIs { signal, value }
    }

    pub fn dimension_below(dimension: &'static str, score: u8) -> Predicate {
        Predicate::DimensionBelow { dimension, score }
    }

    pub fn dimension_at_least(dimension: &'static str, score: u8) -> Predicate {
        Predicate::DimensionAtLeast { dimension, score }
    }

    pub fn all(predicates: Vec<Predicate>) -> Predicate {
        Predicate::All(predicates)
    }

    pub fn any(predicates: Vec<Predicate>) -> Predicate {
        Predicate::Any(predicates)
    }

    pub fn not(predicate: Predicate) -> Predicate {
        Predicate::Not(Box::new(predicate))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: &'static str,
    pub kind: AlertKind,
    pub severity: Severity,
    pub when: Predicate,
    pub title: &'static str,
    pub action: &'static str,
    pub dimension: Option<&'static str>,
}

impl Rule {
    pub fn blocker(id: &'static str, severity: Severity, when: Predicate) -> Self {
        Self::new(id, AlertKind::Blocker, severity, when)
    }

    pub fn opportunity(id: &'static str, severity: Severity, when: Predicate) -> Self {
        Self::new(id, AlertKind::Opportunity, severity, when)
    }

    pub fn win(id: &'static str, when: Predicate) -> Self {
        Self::new(id, AlertKind::Win, Severity::Low, when)
    }

    fn new(id: &'static str, kind: AlertKind, severity: Severity, when: Predicate) -> Self {
        Self {
            id,
            kind,
            severity,
            when,
            title: "",
            action: "",
            dimension: None,
        }
    }

    pub fn titled(mut self, title: &'static str, action: &'static str) -> Self {
        self.title = title;
        self.action = action;
        self
    }

    pub fn on(mut self, dimension: &'static str) -> Self {
        self.dimension = Some(dimension);
        self
    }

    fn to_alert(&self) -> Alert {
        Alert {
            rule_id: self.id.to_string(),
            kind: self.kind,
            severity: self.severity,
            title: self.title.to_string(),
            suggested_action: self.action.to_string(),
            dimension: self.dimension.map(str::to_string),
        }
    }
}

/// Every rule that fires, most severe first. Rules of equal severity keep
/// table order.
pub fn evaluate(rules: &[Rule], ctx: &RuleContext<'_>) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = rules
        .iter()
        .filter(|rule| rule.when.holds(ctx))
        .map(Rule::to_alert)
        .collect();

    alerts.sort_by_key(|a| a.severity);
    tracing::debug!(fired = alerts.len(), rules = rules.len(), "rules evaluated");
    alerts
}

/// Fired alerts split by kind, plus the actions worth surfacing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Narrative {
    pub blockers: Vec<Alert>,
    pub opportunities: Vec<Alert>,
    pub wins: Vec<Alert>,
    pub recommendations: Vec<String>,
}

impl Narrative {
    pub fn from_alerts(alerts: Vec<Alert>) -> Self {
        let mut narrative = Narrative::default();

        for alert in alerts {
            match alert.kind {
                AlertKind::Blocker => narrative.blockers.push(alert),
                AlertKind::Opportunity => narrative.opportunities.push(alert),
                AlertKind::Win => narrative.wins.push(alert),
            }
        }

        for alert in narrative.blockers.iter().chain(narrative.opportunities.iter()) {
            if !alert.suggested_action.is_empty()
                && !narrative.recommendations.contains(&alert.suggested_action)
            {
                narrative.recommendations.push(alert.suggested_action.clone());
            }
        }

        narrative
    }
}
