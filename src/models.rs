use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profiles::ReportKind;

/// A single measured value. Which variant a transform accepts is fixed by the
/// dimension table; a mismatch is treated the same as an absent signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl SignalValue {
    /// Parse a loosely typed cell (CSV, database text). Empty cells are absent.
    pub fn parse_cell(raw: &str) -> Option<SignalValue> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" => return Some(SignalValue::Flag(true)),
            "false" | "no" => return Some(SignalValue::Flag(false)),
            _ => {}
        }

        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(SignalValue::Number(value)),
            _ => Some(SignalValue::Text(trimmed.to_string())),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SignalValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SignalValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SignalValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SignalValue::Flag(_) => "flag",
            SignalValue::Number(_) => "number",
            SignalValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Flag(true) => write!(f, "yes"),
            SignalValue::Flag(false) => write!(f, "no"),
            SignalValue::Number(value) => write!(f, "{}", format_number(*value)),
            SignalValue::Text(value) => write!(f, "{value}"),
        }
    }
}

/// Render whole numbers without a fractional part and everything else with
/// at most two decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let rendered = format!("{value:.2}");
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// The named signals available for one scoring call. Absent signals are not
/// stored; a JSON `null` deserializes as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Option<SignalValue>>",
    into = "BTreeMap<String, SignalValue>"
)]
pub struct SignalBag {
    values: BTreeMap<String, SignalValue>,
}

impl SignalBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SignalValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: SignalValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn number_signal(self, name: impl Into<String>, value: f64) -> Self {
        self.with(name, SignalValue::Number(value))
    }

    pub fn flag_signal(self, name: impl Into<String>, value: bool) -> Self {
        self.with(name, SignalValue::Flag(value))
    }

    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(SignalValue::as_number)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(SignalValue::as_flag)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SignalValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, Option<SignalValue>>> for SignalBag {
    fn from(raw: BTreeMap<String, Option<SignalValue>>) -> Self {
        raw.into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect()
    }
}

impl From<SignalBag> for BTreeMap<String, SignalValue> {
    fn from(bag: SignalBag) -> Self {
        bag.values
    }
}

impl FromIterator<(String, SignalValue)> for SignalBag {
    fn from_iter<I: IntoIterator<Item = (String, SignalValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One observation as loaded from a file or the signals table.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub subject: String,
    pub name: String,
    pub value: Option<SignalValue>,
    pub unit: Option<String>,
}

/// Signals for a single scored subject (a client, tenant or workspace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSignals {
    pub subject: String,
    pub signals: SignalBag,
}

/// Fold observation rows into one bag per subject. Subjects keep the order of
/// their first row; a later row for the same signal replaces the earlier one.
pub fn group_by_subject(records: &[SignalRecord]) -> Vec<SubjectSignals> {
    let mut grouped: Vec<SubjectSignals> = Vec::new();

    for record in records {
        let position = match grouped.iter().position(|s| s.subject == record.subject) {
            Some(position) => position,
            None => {
                grouped.push(SubjectSignals {
                    subject: record.subject.clone(),
                    signals: SignalBag::new(),
                });
                grouped.len() - 1
            }
        };

        if let Some(value) = &record.value {
            grouped[position]
                .signals
                .insert(record.name.clone(), value.clone());
        }
    }

    grouped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Full,
    Partial,
    Insufficient,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Full => "full",
            Availability::Partial => "partial",
            Availability::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal health label. Variants are declared worst first so `Ord` follows
/// health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Critical,
    NeedsAttention,
    Healthy,
    Strong,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Critical => "critical",
            Status::NeedsAttention => "needs_attention",
            Status::Healthy => "healthy",
            Status::Strong => "strong",
        }
    }

    pub fn parse(raw: &str) -> Option<Status> {
        match raw {
            "critical" => Some(Status::Critical),
            "needs_attention" => Some(Status::NeedsAttention),
            "healthy" => Some(Status::Healthy),
            "strong" => Some(Status::Strong),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity. Declared most severe first, so an ascending sort puts
/// critical alerts at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Blocker,
    Opportunity,
    Win,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub name: String,
    pub weight: f64,
    pub score: u8,
    pub status: Status,
    /// Human-readable description of each signal that contributed, in table order.
    pub factors: Vec<String>,
    pub availability: Availability,
    pub data_points: usize,
    pub available_points: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub rule_id: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub suggested_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub overall_score: u8,
    pub overall_status: Status,
    pub dimensions: Vec<DimensionScore>,
    pub blockers: Vec<Alert>,
    pub opportunities: Vec<Alert>,
    pub wins: Vec<Alert>,
    pub recommendations: Vec<String>,
    pub data_completeness: u8,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn for_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionScore> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.blockers
            .iter()
            .chain(self.opportunities.iter())
            .chain(self.wins.iter())
    }
}

/// A persisted report row without its payload.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub id: Uuid,
    pub subject: String,
    pub kind: String,
    pub overall_score: i16,
    pub overall_status: String,
    pub data_completeness: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub status: Status,
    pub count: usize,
    pub avg_score: f64,
}
