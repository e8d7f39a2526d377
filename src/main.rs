use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use unite_health_scoring::models::SubjectSignals;
use unite_health_scoring::{db, input, report, AppConfig, ConfigOverrides, ReportKind, Scorer};

#[derive(Parser)]
#[command(name = "health-score")]
#[command(about = "Weighted health scoring for client, account and KPI signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo signals for three subjects
    Seed,
    /// Import signals from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score subjects, most at-risk first
    #[command(group(
        ArgGroup::new("source")
            .args(["subject", "input"])
            .multiple(false)
    ))]
    Score {
        #[arg(long, value_enum, default_value_t = ReportKind::Alignment)]
        kind: ReportKind,
        #[arg(long)]
        subject: Option<String>,
        /// Read signals from a .csv or .json file instead of the database
        #[arg(long)]
        input: Option<PathBuf>,
        /// JSON file with threshold and weight overrides
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print full reports as JSON
        #[arg(long)]
        json: bool,
        /// Persist every report as an audit row
        #[arg(long, conflicts_with = "input")]
        save: bool,
    },
    /// Generate a markdown report for one subject
    Report {
        #[arg(long, value_enum, default_value_t = ReportKind::Alignment)]
        kind: ReportKind,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List persisted reports for a subject
    History {
        #[arg(long, value_enum, default_value_t = ReportKind::Alignment)]
        kind: ReportKind,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Validate weight and threshold configuration for every report kind
    CheckConfig {
        #[arg(long)]
        weights: Option<PathBuf>,
    },
}

fn load_overrides(weights: Option<&Path>, app: &AppConfig) -> anyhow::Result<ConfigOverrides> {
    let overrides = match weights {
        Some(path) => ConfigOverrides::load(path)?,
        None => app.overrides()?,
    };
    Ok(overrides)
}

fn build_scorer(kind: ReportKind, weights: Option<&Path>, app: &AppConfig) -> anyhow::Result<Scorer> {
    let overrides = load_overrides(weights, app)?;
    Scorer::new(kind, overrides.resolve(kind))
        .with_context(|| format!("invalid scoring configuration for {kind}"))
}

async fn load_subjects(
    app: &AppConfig,
    subject: Option<&str>,
    input_path: Option<&Path>,
) -> anyhow::Result<(Vec<SubjectSignals>, Option<PgPool>)> {
    if let Some(path) = input_path {
        return Ok((input::load_path(path)?, None));
    }

    let pool = db::connect(app).await?;
    let subjects = db::fetch_subject_signals(&pool, subject).await?;
    Ok((subjects, Some(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app = AppConfig::load()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::InitDb => {
            let pool = db::connect(&app).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = db::connect(&app).await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new signals).");
        }
        Commands::Import { csv } => {
            let pool = db::connect(&app).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} signals from {}.", csv.display());
        }
        Commands::Score {
            kind,
            subject,
            input,
            weights,
            limit,
            json,
            save,
        } => {
            let scorer = build_scorer(kind, weights.as_deref(), &app)?;
            let (subjects, pool) = load_subjects(&app, subject.as_deref(), input.as_deref()).await?;
            let reports = scorer.score_all(&subjects);

            if reports.is_empty() {
                println!("No signals found.");
                return Ok(());
            }

            if save {
                if let Some(pool) = &pool {
                    for scored in &reports {
                        db::save_report(pool, scored).await?;
                    }
                    tracing::info!(saved = reports.len(), %kind, "reports persisted");
                }
            }

            let shown = report::most_at_risk(&reports, limit);
            if json {
                println!("{}", serde_json::to_string_pretty(shown)?);
                return Ok(());
            }

            println!("{} scores, most at-risk first:", scorer.kind().title());
            for scored in shown {
                println!("{}", report::summary_line(scored));
            }

            println!();
            println!("By status:");
            for summary in report::summarize_by_status(&reports) {
                println!(
                    "- {}: {} subjects (avg score {:.1})",
                    summary.status, summary.count, summary.avg_score
                );
            }
        }
        Commands::Report {
            kind,
            subject,
            input,
            weights,
            out,
        } => {
            let scorer = build_scorer(kind, weights.as_deref(), &app)?;

            let (subjects, previous, pool) = match input.as_deref() {
                Some(path) => (input::load_path(path)?, None, None),
                None => {
                    let pool = db::connect(&app).await?;
                    let (subjects, previous) = tokio::try_join!(
                        db::fetch_subject_signals(&pool, Some(subject.as_str())),
                        db::fetch_latest_report(&pool, &subject, kind),
                    )?;
                    (subjects, previous, Some(pool))
                }
            };

            let signals = subjects
                .into_iter()
                .find(|s| s.subject == subject)
                .with_context(|| format!("no signals found for {subject}"))?
                .signals;

            let scored = scorer.score(&signals).for_subject(subject.clone());
            let markdown = report::build_report(&scored, previous.as_ref());
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;

            if let Some(pool) = &pool {
                let id = db::save_report(pool, &scored).await?;
                tracing::info!(%id, %subject, "report recorded");
            }

            println!(
                "Report written to {} (score {}, {}).",
                out.display(),
                scored.overall_score,
                scored.overall_status
            );
        }
        Commands::History {
            kind,
            subject,
            limit,
        } => {
            let pool = db::connect(&app).await?;
            let history = db::fetch_history(&pool, &subject, kind, limit).await?;

            if history.is_empty() {
                println!("No reports recorded for {subject}.");
                return Ok(());
            }

            println!("{} history for {subject}:", kind.title());
            for entry in history {
                println!(
                    "- {} score {} ({}), {}% data",
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.overall_score,
                    entry.overall_status,
                    entry.data_completeness
                );
            }
        }
        Commands::CheckConfig { weights } => {
            let overrides = load_overrides(weights.as_deref(), &app)?;
            for kind in ReportKind::ALL {
                let scorer = Scorer::new(kind, overrides.resolve(kind))
                    .with_context(|| format!("invalid scoring configuration for {kind}"))?;
                let [critical, needs_attention, healthy, strong] =
                    scorer.config().thresholds.cut_points();
                println!(
                    "- {kind}: ok (cuts {critical}/{needs_attention}/{healthy}/{strong}, {} dimensions)",
                    scorer.profile().dimensions.len()
                );
            }
        }
    }

    Ok(())
}
