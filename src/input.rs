use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{group_by_subject, SignalRecord, SignalValue, SubjectSignals};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported input format '{0}', expected .csv or .json")]
    UnsupportedFormat(String),
}

/// A row of a signal CSV: `subject,signal,value[,unit][,source_key]`.
#[derive(Debug, Deserialize)]
pub struct CsvRow {
    pub subject: String,
    pub signal: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub source_key: Option<String>,
}

impl CsvRow {
    pub fn into_record(self) -> SignalRecord {
        SignalRecord {
            subject: self.subject.trim().to_string(),
            name: self.signal.trim().to_string(),
            value: SignalValue::parse_cell(&self.value),
            unit: self.unit.filter(|u| !u.trim().is_empty()),
        }
    }
}

pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<CsvRow>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<SubjectSignals>, InputError> {
    let records: Vec<SignalRecord> = read_csv_rows(reader)?
        .into_iter()
        .map(CsvRow::into_record)
        .collect();
    Ok(group_by_subject(&records))
}

/// Either a list of `{subject, signals}` objects or a single bare signal map,
/// which is scored under the subject `default`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Subjects(Vec<SubjectSignals>),
    Single(SubjectSignals),
    Bare(crate::models::SignalBag),
}

pub fn read_json<R: Read>(reader: R) -> Result<Vec<SubjectSignals>, InputError> {
    let parsed: JsonInput = serde_json::from_reader(reader)?;
    Ok(match parsed {
        JsonInput::Subjects(subjects) => subjects,
        JsonInput::Single(subject) => vec![subject],
        JsonInput::Bare(signals) => vec![SubjectSignals {
            subject: "default".to_string(),
            signals,
        }],
    })
}

/// Load subjects from a `.csv` or `.json` file.
pub fn load_path(path: &Path) -> Result<Vec<SubjectSignals>, InputError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let file = std::fs::File::open(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let subjects = match extension.as_str() {
        "csv" => read_csv(file)?,
        "json" => read_json(file)?,
        other => return Err(InputError::UnsupportedFormat(other.to_string())),
    };

    tracing::info!(path = %path.display(), subjects = subjects.len(), "loaded signal input");
    Ok(subjects)
}
