//! Weighted multi-factor health scoring over sparse signals.
//!
//! A [`Scorer`] turns a [`SignalBag`] into a [`Report`]: per-dimension scores,
//! a weighted overall score, status labels, rule-derived alerts and a
//! data-completeness percentage.

pub mod config;
pub mod db;
pub mod input;
pub mod models;
pub mod profiles;
pub mod report;
pub mod rules;
pub mod scoring;

pub use config::{AppConfig, ConfigError, ConfigOverrides, ScoringConfig, ThresholdTable, WeightTable};
pub use models::{
    Alert, AlertKind, Availability, DimensionScore, Report, Severity, SignalBag, SignalRecord,
    SignalValue, Status, SubjectSignals,
};
pub use profiles::{Profile, ReportKind};
pub use scoring::Scorer;
