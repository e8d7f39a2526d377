use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Status;
use crate::profiles::{Profile, ReportKind};

/// Allowed drift when checking that a weight table sums to 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{kind} weights sum to {sum}, expected 1.0")]
    WeightSum { kind: String, sum: f64 },

    #[error("weight for dimension '{dimension}' must be within [0, 1], got {weight}")]
    WeightOutOfRange { dimension: String, weight: f64 },

    #[error("no weight configured for dimension '{0}'")]
    MissingWeight(String),

    #[error("weight configured for unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("factor weights of dimension '{dimension}' sum to {sum}, expected 1.0")]
    FactorWeightSum { dimension: String, sum: f64 },

    #[error("status thresholds must be strictly ascending within [0, 100]: {0:?}")]
    InvalidThresholds([f64; 4]),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Four ascending cut points mapping a 0-100 score to a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub critical: f64,
    pub needs_attention: f64,
    pub healthy: f64,
    pub strong: f64,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            critical: 0.0,
            needs_attention: 30.0,
            healthy: 50.0,
            strong: 70.0,
        }
    }
}

impl ThresholdTable {
    pub fn cut_points(&self) -> [f64; 4] {
        [self.critical, self.needs_attention, self.healthy, self.strong]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cuts = self.cut_points();
        let in_range = cuts.iter().all(|c| (0.0..=100.0).contains(c));
        let ascending = cuts.windows(2).all(|pair| pair[0] < pair[1]);

        if in_range && ascending {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds(cuts))
        }
    }

    pub fn classify(&self, score: f64) -> Status {
        if score >= self.strong {
            Status::Strong
        } else if score >= self.healthy {
            Status::Healthy
        } else if score >= self.needs_attention {
            Status::NeedsAttention
        } else {
            Status::Critical
        }
    }
}

/// Dimension name to weight. Weights for one report type must sum to 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightTable(BTreeMap<String, f64>);

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: impl Into<String>, weight: f64) -> Self {
        self.0.insert(dimension.into(), weight);
        self
    }

    /// Weight of a dimension; unknown dimensions weigh nothing.
    pub fn weight(&self, dimension: &str) -> f64 {
        self.0.get(dimension).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Check the table against the dimensions of `profile`.
    pub fn validate(&self, profile: &Profile) -> Result<(), ConfigError> {
        for (dimension, weight) in &self.0 {
            if !profile.dimensions.iter().any(|d| d.name == dimension.as_str()) {
                return Err(ConfigError::UnknownDimension(dimension.clone()));
            }
            if !(0.0..=1.0).contains(weight) {
                return Err(ConfigError::WeightOutOfRange {
                    dimension: dimension.clone(),
                    weight: *weight,
                });
            }
        }

        if let Some(missing) = profile
            .dimensions
            .iter()
            .find(|d| !self.0.contains_key(d.name))
        {
            return Err(ConfigError::MissingWeight(missing.name.to_string()));
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum {
                kind: profile.kind.to_string(),
                sum,
            });
        }

        Ok(())
    }
}

impl FromIterator<(String, f64)> for WeightTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a scorer needs besides its dimension and rule tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub thresholds: ThresholdTable,
    pub weights: WeightTable,
}

impl ScoringConfig {
    pub fn defaults(kind: ReportKind) -> Self {
        Self {
            thresholds: ThresholdTable::default(),
            weights: kind.default_weights(),
        }
    }

    pub fn validate(&self, profile: &Profile) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.weights.validate(profile)
    }
}

/// Per-tenant overrides read from a JSON file, e.g.
///
/// ```json
/// { "thresholds": { "critical": 0, "needs_attention": 35, "healthy": 55, "strong": 75 },
///   "weights": { "alignment": { "momentum": 0.3, "clarity": 0.15, "workload": 0.2,
///                               "quality": 0.2, "engagement": 0.15 } } }
/// ```
///
/// Kinds without an entry keep their default weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub thresholds: Option<ThresholdTable>,
    #[serde(default)]
    pub weights: BTreeMap<ReportKind, WeightTable>,
}

impl ConfigOverrides {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn resolve(&self, kind: ReportKind) -> ScoringConfig {
        let defaults = ScoringConfig::defaults(kind);
        ScoringConfig {
            thresholds: self.thresholds.unwrap_or(defaults.thresholds),
            weights: self
                .weights
                .get(&kind)
                .cloned()
                .unwrap_or(defaults.weights),
        }
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub log_level: String,
    pub weights_path: Option<PathBuf>,
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load from the process environment after reading any `.env` file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Build from an arbitrary lookup so parsing can be tested without
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let optional = |var: &str| lookup(var).ok().filter(|v| !v.trim().is_empty());

        let db_max_connections = match optional("HEALTH_SCORE_DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
                var: "HEALTH_SCORE_DB_MAX_CONNECTIONS".to_string(),
                reason: e.to_string(),
            })?,
            None => 5,
        };

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            log_level: optional("HEALTH_SCORE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            weights_path: optional("HEALTH_SCORE_WEIGHTS_PATH").map(PathBuf::from),
            db_max_connections,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    /// Overrides from `HEALTH_SCORE_WEIGHTS_PATH`, or none when unset.
    pub fn overrides(&self) -> Result<ConfigOverrides, ConfigError> {
        match &self.weights_path {
            Some(path) => ConfigOverrides::load(path),
            None => Ok(ConfigOverrides::default()),
        }
    }
}
