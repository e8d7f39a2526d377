use anyhow::Context;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::input;
use crate::models::{
    group_by_subject, Report, ReportSummary, SignalRecord, SignalValue, SubjectSignals,
};
use crate::profiles::ReportKind;

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn split_value(value: Option<&SignalValue>) -> (Option<f64>, Option<bool>, Option<&str>) {
    match value {
        Some(SignalValue::Number(n)) => (Some(*n), None, None),
        Some(SignalValue::Flag(b)) => (None, Some(*b), None),
        Some(SignalValue::Text(t)) => (None, None, Some(t.as_str())),
        None => (None, None, None),
    }
}

/// Insert one observation. Returns `false` when `source_key` was already imported.
async fn insert_signal(
    pool: &PgPool,
    record: &SignalRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let (number, flag, text) = split_value(record.value.as_ref());

    let result = sqlx::query(
        r#"
        INSERT INTO health_scoring.signals
        (id, subject, name, value_number, value_flag, value_text, unit, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&record.subject)
    .bind(&record.name)
    .bind(number)
    .bind(flag)
    .bind(text)
    .bind(record.unit.as_deref())
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let subjects: [(&str, &[(&str, &str)]); 3] = [
        (
            "acme-roofing",
            &[
                ("milestonesCompleted", "3"),
                ("totalMilestones", "10"),
                ("journeyDay", "20"),
                ("brandKitUploaded", "false"),
                ("daysSinceLastActivity", "5"),
            ],
        ),
        (
            "harbor-dental",
            &[
                ("milestonesCompleted", "9"),
                ("totalMilestones", "10"),
                ("journeyDay", "64"),
                ("daysSinceLastActivity", "1"),
                ("deliverablesShipped", "4"),
                ("profileCompleted", "true"),
                ("brandKitUploaded", "true"),
                ("goalsDefined", "true"),
                ("pendingApprovals", "1"),
                ("avgApprovalHours", "12"),
                ("revisionRate", "0.1"),
                ("clientSatisfaction", "9"),
                ("engagementRate", "82"),
                ("loginsThisWeek", "4"),
            ],
        ),
        (
            "northside-fitness",
            &[
                ("milestonesCompleted", "2"),
                ("totalMilestones", "8"),
                ("journeyDay", "41"),
                ("daysSinceLastActivity", "19"),
                ("profileCompleted", "false"),
                ("pendingApprovals", "7"),
                ("revisionRate", "0.45"),
                ("engagementRate", "35"),
            ],
        ),
    ];

    let mut inserted = 0usize;
    for (subject, signals) in subjects {
        for (name, raw) in signals {
            let Some(value) = SignalValue::parse_cell(raw) else {
                continue;
            };
            let record = SignalRecord {
                subject: subject.to_string(),
                name: (*name).to_string(),
                value: Some(value),
                unit: None,
            };
            let source_key = format!("seed-{subject}-{name}");
            if insert_signal(pool, &record, &source_key).await? {
                inserted += 1;
            }
        }
    }

    tracing::info!(inserted, "seeded demo signals");
    Ok(inserted)
}

/// Pair each CSV row with its idempotency key. Rows with an empty value are
/// dropped so they never shadow an earlier observation of the same signal.
fn importable_rows(rows: Vec<input::CsvRow>) -> Vec<(SignalRecord, String)> {
    rows.into_iter()
        .filter_map(|row| {
            let source_key = row
                .source_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
            let record = row.into_record();
            record.value.is_some().then_some((record, source_key))
        })
        .collect()
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = input::read_csv_rows(file)?;
    let total = rows.len();
    let records = importable_rows(rows);
    let mut inserted = 0usize;

    for (record, source_key) in &records {
        if insert_signal(pool, record, source_key).await? {
            inserted += 1;
        }
    }

    tracing::info!(
        inserted,
        skipped_empty = total - records.len(),
        path = %csv_path.display(),
        "imported signals"
    );
    Ok(inserted)
}

fn value_from_row(row: &PgRow) -> Option<SignalValue> {
    if let Some(flag) = row.get::<Option<bool>, _>("value_flag") {
        return Some(SignalValue::Flag(flag));
    }
    if let Some(number) = row.get::<Option<f64>, _>("value_number") {
        return Some(SignalValue::Number(number));
    }
    row.get::<Option<String>, _>("value_text")
        .map(SignalValue::Text)
}

/// Latest value of every signal, grouped by subject. Restrict to one subject
/// with `subject`.
pub async fn fetch_subject_signals(
    pool: &PgPool,
    subject: Option<&str>,
) -> anyhow::Result<Vec<SubjectSignals>> {
    let mut query = String::from(
        "SELECT DISTINCT ON (subject, name) subject, name, value_number, value_flag, value_text, unit \
         FROM health_scoring.signals \
         WHERE (value_number IS NOT NULL OR value_flag IS NOT NULL OR value_text IS NOT NULL)",
    );

    if subject.is_some() {
        query.push_str(" AND subject = $1");
    }
    query.push_str(" ORDER BY subject, name, recorded_at DESC");

    let mut rows = sqlx::query(&query);
    if let Some(value) = subject {
        rows = rows.bind(value);
    }

    let records: Vec<SignalRecord> = rows
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| SignalRecord {
            subject: row.get("subject"),
            name: row.get("name"),
            value: value_from_row(row),
            unit: row.get("unit"),
        })
        .collect();

    Ok(group_by_subject(&records))
}

pub async fn save_report(pool: &PgPool, report: &Report) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let payload = serde_json::to_value(report)?;

    sqlx::query(
        r#"
        INSERT INTO health_scoring.reports
        (id, subject, kind, overall_score, overall_status, data_completeness, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(report.subject.as_deref().unwrap_or("unnamed"))
    .bind(report.kind.as_str())
    .bind(i16::from(report.overall_score))
    .bind(report.overall_status.as_str())
    .bind(i16::from(report.data_completeness))
    .bind(payload)
    .bind(report.generated_at)
    .execute(pool)
    .await?;

    tracing::debug!(%id, kind = %report.kind, "report saved");
    Ok(id)
}

fn summary_from_row(row: &PgRow) -> ReportSummary {
    ReportSummary {
        id: row.get("id"),
        subject: row.get("subject"),
        kind: row.get("kind"),
        overall_score: row.get("overall_score"),
        overall_status: row.get("overall_status"),
        data_completeness: row.get("data_completeness"),
        created_at: row.get("created_at"),
    }
}

pub async fn fetch_history(
    pool: &PgPool,
    subject: &str,
    kind: ReportKind,
    limit: i64,
) -> anyhow::Result<Vec<ReportSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, subject, kind, overall_score, overall_status, data_completeness, created_at
        FROM health_scoring.reports
        WHERE subject = $1 AND kind = $2
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(subject)
    .bind(kind.as_str())
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(summary_from_row).collect())
}

pub async fn fetch_latest_report(
    pool: &PgPool,
    subject: &str,
    kind: ReportKind,
) -> anyhow::Result<Option<ReportSummary>> {
    Ok(fetch_history(pool, subject, kind, 1).await?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_values_into_typed_columns() {
        assert_eq!(
            split_value(Some(&SignalValue::Number(2.5))),
            (Some(2.5), None, None)
        );
        assert_eq!(
            split_value(Some(&SignalValue::Flag(false))),
            (None, Some(false), None)
        );
        assert_eq!(
            split_value(Some(&SignalValue::Text("pro".to_string()))),
            (None, None, Some("pro"))
        );
        assert_eq!(split_value(None), (None, None, None));
    }

    #[test]
    fn empty_cells_never_shadow_an_earlier_value() {
        let raw = "subject,signal,value,unit,source_key\n\
                   acme,goalsDefined,true,,k1\n\
                   acme,goalsDefined,,,k2\n\
                   acme,journeyDay,12,days,\n";
        let rows = input::read_csv_rows(raw.as_bytes()).unwrap();
        let records = importable_rows(rows);

        let keys: Vec<&str> = records.iter().map(|(_, key)| key.as_str()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(keys[0], "k1");
        assert!(keys[1].starts_with("import-"));

        let stored: Vec<SignalRecord> = records.into_iter().map(|(record, _)| record).collect();
        let from_db = group_by_subject(&stored);
        let from_file = input::read_csv(raw.as_bytes()).unwrap();
        assert_eq!(from_db, from_file);
        assert_eq!(from_db[0].signals.flag("goalsDefined"), Some(true));
    }
}
