use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{Alert, Report, ReportSummary, Status, StatusSummary};

pub fn summarize_by_status(reports: &[Report]) -> Vec<StatusSummary> {
    let mut map: HashMap<Status, (usize, u32)> = HashMap::new();

    for report in reports {
        let entry = map.entry(report.overall_status).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u32::from(report.overall_score);
    }

    let mut summaries: Vec<StatusSummary> = map
        .into_iter()
        .map(|(status, (count, total_score))| StatusSummary {
            status,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                f64::from(total_score) / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
    summaries
}

/// The first `limit` reports of a list already sorted by `Scorer::score_all`.
pub fn most_at_risk(reports: &[Report], limit: usize) -> &[Report] {
    &reports[..limit.min(reports.len())]
}

/// One terminal line per report, as printed by `score`.
pub fn summary_line(report: &Report) -> String {
    format!(
        "- {} score {} ({}), {}% data, {} blockers",
        report.subject.as_deref().unwrap_or("unnamed"),
        report.overall_score,
        report.overall_status,
        report.data_completeness,
        report.blockers.len()
    )
}

fn write_alerts(output: &mut String, heading: &str, alerts: &[Alert], empty: &str) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");

    if alerts.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }

    for alert in alerts {
        let _ = writeln!(
            output,
            "- [{}] {}: {}",
            alert.severity, alert.title, alert.suggested_action
        );
    }
}

pub fn build_report(report: &Report, previous: Option<&ReportSummary>) -> String {
    let mut output = String::new();
    let subject = report.subject.as_deref().unwrap_or("all subjects");

    let _ = writeln!(output, "# {} Report", report.kind.title());
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        subject,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(
        output,
        "- Score: {} ({})",
        report.overall_score, report.overall_status
    );
    let _ = writeln!(output, "- Data completeness: {}%", report.data_completeness);

    if let Some(previous) = previous {
        let delta = i32::from(report.overall_score) - i32::from(previous.overall_score);
        let _ = writeln!(
            output,
            "- Change since {}: {:+} (was {}, {})",
            previous.created_at.format("%Y-%m-%d"),
            delta,
            previous.overall_score,
            previous.overall_status
        );

        match Status::parse(&previous.overall_status) {
            Some(was) if was < report.overall_status => {
                let _ = writeln!(output, "- Status improved from {was} to {}", report.overall_status);
            }
            Some(was) if was > report.overall_status => {
                let _ = writeln!(output, "- Status slipped from {was} to {}", report.overall_status);
            }
            _ => {}
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Dimensions");

    for dimension in &report.dimensions {
        let factors = if dimension.factors.is_empty() {
            "no data".to_string()
        } else {
            dimension.factors.join(", ")
        };
        let _ = writeln!(
            output,
            "- {} ({:.0}%): {} {}, {} data; {}",
            dimension.name,
            dimension.weight * 100.0,
            dimension.score,
            dimension.status,
            dimension.availability,
            factors
        );
    }

    write_alerts(&mut output, "Blockers", &report.blockers, "No blockers detected.");
    write_alerts(
        &mut output,
        "Opportunities",
        &report.opportunities,
        "No opportunities detected.",
    );
    write_alerts(&mut output, "Wins", &report.wins, "No wins recorded yet.");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");

    if report.recommendations.is_empty() {
        let _ = writeln!(output, "Nothing to act on right now.");
    } else {
        for (index, recommendation) in report.recommendations.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", index + 1, recommendation);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::SignalBag;
    use crate::profiles::ReportKind;
    use crate::scoring::Scorer;

    fn example_report() -> Report {
        let scorer = Scorer::with_defaults(ReportKind::Alignment).unwrap();
        let bag = SignalBag::new()
            .number_signal("milestonesCompleted", 3.0)
            .number_signal("totalMilestones", 10.0)
            .number_signal("journeyDay", 20.0)
            .flag_signal("brandKitUploaded", false);
        scorer.score(&bag).for_subject("acme")
    }

    #[test]
    fn renders_every_section() {
        let markdown = build_report(&example_report(), None);

        assert!(markdown.starts_with("# Client Alignment Report"));
        assert!(markdown.contains("Generated for acme"));
        assert!(markdown.contains("- Score: 11 (critical)"));
        assert!(markdown.contains("- momentum (25%): 45 needs_attention, insufficient data; 3/10 milestones"));
        assert!(markdown.contains("- workload (20%): 0 critical, insufficient data; no data"));
        assert!(markdown.contains("## Blockers\n- [high] Brand kit not uploaded"));
        assert!(markdown.contains("## Wins\nNo wins recorded yet."));
        assert!(markdown.contains("1. Upload the brand kit"));
        assert!(!markdown.contains("Change since"));
    }

    #[test]
    fn renders_delta_against_previous_report() {
        let previous = ReportSummary {
            id: Uuid::new_v4(),
            subject: "acme".to_string(),
            kind: "alignment".to_string(),
            overall_score: 20,
            overall_status: "critical".to_string(),
            data_completeness: 25,
            created_at: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
        };

        let markdown = build_report(&example_report(), Some(&previous));
        assert!(markdown.contains("- Change since 2026-09-01: -9 (was 20, critical)"));
        assert!(!markdown.contains("- Status"));
    }

    #[test]
    fn notes_status_movement_since_previous_report() {
        let previous = ReportSummary {
            id: Uuid::new_v4(),
            subject: "acme".to_string(),
            kind: "alignment".to_string(),
            overall_score: 55,
            overall_status: "healthy".to_string(),
            data_completeness: 75,
            created_at: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
        };

        let markdown = build_report(&example_report(), Some(&previous));
        assert!(markdown.contains("- Status slipped from healthy to critical"));

        let mut unknown = previous.clone();
        unknown.overall_status = "aligned".to_string();
        let markdown = build_report(&example_report(), Some(&unknown));
        assert!(!markdown.contains("- Status"));
    }

    #[test]
    fn status_summary_counts_and_averages() {
        let mut strong = example_report();
        strong.overall_status = Status::Strong;
        strong.overall_score = 90;
        let mut strong_too = strong.clone();
        strong_too.overall_score = 80;

        let summaries = summarize_by_status(&[example_report(), strong, strong_too]);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].status, Status::Strong);
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_score - 85.0).abs() < 0.001);
        assert_eq!(summaries[1].status, Status::Critical);
    }

    #[test]
    fn most_at_risk_caps_the_listing() {
        let reports = vec![example_report(), example_report(), example_report()];
        assert_eq!(most_at_risk(&reports, 2).len(), 2);
        assert_eq!(most_at_risk(&reports, 10).len(), 3);
        assert!(most_at_risk(&reports, 0).is_empty());
    }

    #[test]
    fn summary_line_mentions_subject_and_blockers() {
        let line = summary_line(&example_report());
        assert_eq!(line, "- acme score 11 (critical), 0% data, 1 blockers");
    }
}
