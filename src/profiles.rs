//! Built-in report types: dimension tables, default weights and rule tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, WeightTable, WEIGHT_TOLERANCE};
use crate::models::Severity;
use crate::rules::{when, Predicate, Rule};
use crate::scoring::{cut, Cut, DimensionSpec, Factor, Transform};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ReportKind {
    Alignment,
    Enterprise,
    FinancialHealth,
    Kpi,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::Alignment,
        ReportKind::Enterprise,
        ReportKind::FinancialHealth,
        ReportKind::Kpi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Alignment => "alignment",
            ReportKind::Enterprise => "enterprise",
            ReportKind::FinancialHealth => "financial_health",
            ReportKind::Kpi => "kpi",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReportKind::Alignment => "Client Alignment",
            ReportKind::Enterprise => "Enterprise Account Summary",
            ReportKind::FinancialHealth => "Financial Health",
            ReportKind::Kpi => "KPI Rollup",
        }
    }

    pub fn profile(self) -> Profile {
        match self {
            ReportKind::Alignment => alignment(),
            ReportKind::Enterprise => enterprise(),
            ReportKind::FinancialHealth => financial_health(),
            ReportKind::Kpi => kpi(),
        }
    }

    pub fn default_weights(self) -> WeightTable {
        let weights: &[(&str, f64)] = match self {
            ReportKind::Alignment => &[
                ("momentum", 0.25),
                ("clarity", 0.20),
                ("workload", 0.20),
                ("quality", 0.20),
                ("engagement", 0.15),
            ],
            ReportKind::Enterprise => &[
                ("billing", 0.30),
                ("usage", 0.30),
                ("teams", 0.20),
                ("audit", 0.20),
            ],
            ReportKind::FinancialHealth => &[
                ("runway", 0.35),
                ("profitability", 0.25),
                ("growth", 0.25),
                ("collections", 0.15),
            ],
            ReportKind::Kpi => &[
                ("acquisition", 0.30),
                ("conversion", 0.30),
                ("retention", 0.25),
                ("content", 0.15),
            ],
        };

        weights
            .iter()
            .map(|(dimension, weight)| ((*dimension).to_string(), *weight))
            .collect()
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw || kind.as_str().replace('_', "-") == raw)
            .ok_or_else(|| format!("unknown report kind: {raw}"))
    }
}

/// Dimension and rule tables for one report type.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub kind: ReportKind,
    pub dimensions: Vec<DimensionSpec>,
    pub rules: Vec<Rule>,
}

impl Profile {
    /// Factor weights inside every non-empty dimension must sum to 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for dimension in &self.dimensions {
            if dimension.factors.is_empty() {
                continue;
            }
            let sum = dimension.factor_weight_sum();
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(ConfigError::FactorWeightSum {
                    dimension: dimension.name.to_string(),
                    sum,
                });
            }
        }
        Ok(())
    }
}

fn ratio(numerator: &'static str, denominator: &'static str) -> Transform {
    Transform::Ratio {
        numerator,
        denominator,
    }
}

fn direct(signal: &'static str) -> Transform {
    Transform::Direct { signal }
}

fn scaled(signal: &'static str, max: f64) -> Transform {
    Transform::Scaled { signal, max }
}

fn inverse(signal: &'static str, max: f64) -> Transform {
    Transform::Inverse { signal, max }
}

fn flag(signal: &'static str) -> Transform {
    Transform::Flag { signal }
}

fn buckets(signal: &'static str, cuts: &'static [Cut]) -> Transform {
    Transform::Buckets { signal, cuts }
}

const ACTIVITY_RECENCY: &[Cut] = &[cut(0.0, 100.0), cut(4.0, 70.0), cut(8.0, 40.0), cut(15.0, 10.0)];
const PENDING_APPROVALS: &[Cut] = &[
    cut(0.0, 100.0),
    cut(1.0, 75.0),
    cut(3.0, 50.0),
    cut(6.0, 25.0),
    cut(11.0, 0.0),
];

fn alignment() -> Profile {
    let dimensions = vec![
        DimensionSpec::new(
            "momentum",
            vec![
                Factor::new("milestones", ratio("milestonesCompleted", "totalMilestones"), 0.5),
                Factor::new(
                    "days since last activity",
                    buckets("daysSinceLastActivity", ACTIVITY_RECENCY),
                    0.3,
                ),
                Factor::new("deliverables shipped", scaled("deliverablesShipped", 4.0), 0.2),
            ],
        ),
        DimensionSpec::new(
            "clarity",
            vec![
                Factor::new("profile completed", flag("profileCompleted"), 0.4),
                Factor::new("brand kit uploaded", flag("brandKitUploaded"), 0.3),
                Factor::new("goals defined", flag("goalsDefined"), 0.3),
            ],
        ),
        DimensionSpec::new(
            "workload",
            vec![
                Factor::new("pending approvals", buckets("pendingApprovals", PENDING_APPROVALS), 0.6),
                Factor::new("avg approval hours", inverse("avgApprovalHours", 72.0), 0.4),
            ],
        ),
        DimensionSpec::new(
            "quality",
            vec![
                Factor::new("revision rate", inverse("revisionRate", 1.0), 0.6),
                Factor::new("client satisfaction", scaled("clientSatisfaction", 10.0), 0.4),
            ],
        ),
        DimensionSpec::new(
            "engagement",
            vec![
                Factor::new("engagement rate", direct("engagementRate"), 0.5),
                Factor::new("logins this week", scaled("loginsThisWeek", 5.0), 0.5),
            ],
        ),
    ];

    let rules = vec![
        Rule::blocker(
            "approval_backlog",
            Severity::Critical,
            when::above("pendingApprovals", 5.0),
        )
        .titled(
            "Approval backlog is blocking delivery",
            "Schedule an approval session to clear pending items",
        )
        .on("workload"),
        Rule::blocker(
            "brand_kit_missing",
            Severity::High,
            when::all(vec![
                when::flag_is("brandKitUploaded", false),
                when::above("journeyDay", 7.0),
            ]),
        )
        .titled(
            "Brand kit not uploaded",
            "Upload the brand kit so creative work starts from approved assets",
        )
        .on("clarity"),
        Rule::blocker(
            "client_stalled",
            Severity::High,
            when::above("daysSinceLastActivity", 14.0),
        )
        .titled(
            "No client activity for over two weeks",
            "Send a status update with a single clear next step",
        )
        .on("momentum"),
        Rule::blocker(
            "profile_incomplete",
            Severity::Medium,
            when::flag_is("profileCompleted", false),
        )
        .titled(
            "Business profile is incomplete",
            "Complete the business profile to sharpen targeting",
        )
        .on("clarity"),
        Rule::blocker(
            "revision_churn",
            Severity::Medium,
            when::above("revisionRate", 0.3),
        )
        .titled(
            "More than 30% of deliverables need revisions",
            "Review the brief with the client before the next draft",
        )
        .on("quality"),
        Rule::blocker(
            "momentum_lagging",
            Severity::Medium,
            when::all(vec![
                when::dimension_below("momentum", 50),
                when::above("journeyDay", 30.0),
            ]),
        )
        .titled(
            "Milestones are behind schedule",
            "Re-plan the remaining milestones with the client",
        )
        .on("momentum"),
        Rule::opportunity(
            "engaged_but_unclear",
            Severity::Medium,
            when::all(vec![
                when::dimension_at_least("engagement", 70),
                when::dimension_below("clarity", 50),
            ]),
        )
        .titled(
            "Engaged client with an unclear brief",
            "Run a discovery call while engagement is high",
        )
        .on("clarity"),
        Rule::opportunity(
            "goals_not_captured",
            Severity::Low,
            when::flag_is("goalsDefined", false),
        )
        .titled(
            "Goals have not been captured",
            "Capture measurable goals during the next check-in",
        )
        .on("clarity"),
        Rule::opportunity(
            "retainer_upsell",
            Severity::Low,
            when::all(vec![
                when::dimension_at_least("quality", 80),
                when::dimension_at_least("engagement", 80),
            ]),
        )
        .titled(
            "Satisfied, active client",
            "Propose an expanded retainer",
        ),
        Rule::win("account_aligned", Predicate::OverallAtLeast(70))
            .titled("Account is aligned", "Share a progress recap with the client"),
        Rule::win("momentum_excellent", when::dimension_at_least("momentum", 90))
            .titled("Milestones are on pace", "Keep the current delivery cadence")
            .on("momentum"),
    ];

    Profile {
        kind: ReportKind::Alignment,
        dimensions,
        rules,
    }
}

const OVERDUE_INVOICES: &[Cut] = &[cut(0.0, 100.0), cut(1.0, 60.0), cut(2.0, 30.0), cut(4.0, 0.0)];
const RENEWAL_HORIZON: &[Cut] = &[cut(0.0, 10.0), cut(7.0, 40.0), cut(30.0, 70.0), cut(90.0, 100.0)];
const USAGE_GROWTH: &[Cut] = &[
    cut(f64::NEG_INFINITY, 20.0),
    cut(0.0, 50.0),
    cut(5.0, 80.0),
    cut(15.0, 100.0),
];
const CRITICAL_AUDIT_EVENTS: &[Cut] = &[cut(0.0, 100.0), cut(1.0, 50.0), cut(3.0, 0.0)];
const AUDIT_REVIEW_AGE: &[Cut] = &[cut(0.0, 100.0), cut(31.0, 60.0), cut(91.0, 20.0)];

fn enterprise() -> Profile {
    let dimensions = vec![
        DimensionSpec::new(
            "billing",
            vec![
                Factor::new("overdue invoices", buckets("invoicesOverdue", OVERDUE_INVOICES), 0.5),
                Factor::new("payment method valid", flag("paymentMethodValid"), 0.3),
                Factor::new("days until renewal", buckets("daysUntilRenewal", RENEWAL_HORIZON), 0.2),
            ],
        ),
        DimensionSpec::new(
            "usage",
            vec![
                Factor::new("seats active", ratio("activeSeats", "purchasedSeats"), 0.5),
                Factor::new("feature adoption %", direct("featureAdoptionRate"), 0.3),
                Factor::new("usage growth %", buckets("usageGrowthPct", USAGE_GROWTH), 0.2),
            ],
        ),
        DimensionSpec::new(
            "teams",
            vec![
                Factor::new("teams with an owner", ratio("teamsWithOwner", "totalTeams"), 0.5),
                Factor::new("SSO enabled", flag("ssoEnabled"), 0.3),
                Factor::new("pending invites", inverse("pendingInvites", 20.0), 0.2),
            ],
        ),
        DimensionSpec::new(
            "audit",
            vec![
                Factor::new(
                    "critical audit events",
                    buckets("criticalAuditEvents", CRITICAL_AUDIT_EVENTS),
                    0.6,
                ),
                Factor::new(
                    "days since audit review",
                    buckets("daysSinceAuditReview", AUDIT_REVIEW_AGE),
                    0.4,
                ),
            ],
        ),
    ];

    let rules = vec![
        Rule::blocker(
            "invoices_overdue",
            Severity::Critical,
            when::above("invoicesOverdue", 1.0),
        )
        .titled(
            "Multiple invoices are overdue",
            "Escalate to the account's billing contact",
        )
        .on("billing"),
        Rule::blocker(
            "critical_audit_events",
            Severity::Critical,
            when::above("criticalAuditEvents", 0.0),
        )
        .titled(
            "Unresolved critical audit events",
            "Triage critical audit events with the security owner",
        )
        .on("audit"),
        Rule::blocker(
            "payment_method_invalid",
            Severity::High,
            when::flag_is("paymentMethodValid", false),
        )
        .titled(
            "Payment method is failing",
            "Ask the billing admin to update the payment method",
        )
        .on("billing"),
        Rule::blocker(
            "renewal_at_risk",
            Severity::High,
            when::all(vec![
                when::below("daysUntilRenewal", 60.0),
                when::dimension_below("usage", 50),
            ]),
        )
        .titled(
            "Renewal at risk from low usage",
            "Book an adoption review before the renewal date",
        )
        .on("usage"),
        Rule::blocker(
            "audit_review_overdue",
            Severity::Medium,
            when::above("daysSinceAuditReview", 90.0),
        )
        .titled(
            "Audit log not reviewed this quarter",
            "Schedule a quarterly audit log review",
        )
        .on("audit"),
        Rule::opportunity("enable_sso", Severity::Medium, when::flag_is("ssoEnabled", false))
            .titled(
                "SSO is not enabled",
                "Offer SSO setup to centralize access control",
            )
            .on("teams"),
        Rule::opportunity(
            "seat_expansion",
            Severity::Medium,
            when::dimension_at_least("usage", 85),
        )
        .titled("Seats are near capacity", "Propose a seat expansion")
        .on("usage"),
        Rule::win("billing_in_good_standing", when::dimension_at_least("billing", 90))
            .titled("Billing is in good standing", "No billing follow-up needed")
            .on("billing"),
        Rule::win("enterprise_healthy", Predicate::OverallAtLeast(70))
            .titled("Account is healthy", "Share the quarterly summary with the sponsor"),
    ];

    Profile {
        kind: ReportKind::Enterprise,
        dimensions,
        rules,
    }
}

const RUNWAY_MONTHS: &[Cut] = &[
    cut(0.0, 5.0),
    cut(3.0, 25.0),
    cut(6.0, 50.0),
    cut(12.0, 80.0),
    cut(18.0, 100.0),
];
const BURN_MULTIPLE: &[Cut] = &[
    cut(f64::NEG_INFINITY, 100.0),
    cut(1.5, 70.0),
    cut(2.5, 40.0),
    cut(3.5, 10.0),
];
const NET_MARGIN: &[Cut] = &[
    cut(f64::NEG_INFINITY, 10.0),
    cut(-20.0, 30.0),
    cut(0.0, 60.0),
    cut(10.0, 80.0),
    cut(20.0, 100.0),
];
const REVENUE_GROWTH: &[Cut] = &[
    cut(f64::NEG_INFINITY, 10.0),
    cut(0.0, 40.0),
    cut(5.0, 60.0),
    cut(10.0, 80.0),
    cut(20.0, 100.0),
];
const DAYS_SALES_OUTSTANDING: &[Cut] = &[
    cut(0.0, 100.0),
    cut(31.0, 75.0),
    cut(46.0, 50.0),
    cut(61.0, 25.0),
    cut(91.0, 0.0),
];

fn financial_health() -> Profile {
    let dimensions = vec![
        DimensionSpec::new(
            "runway",
            vec![
                Factor::new("months of runway", buckets("runwayMonths", RUNWAY_MONTHS), 0.7),
                Factor::new("burn multiple", buckets("burnMultiple", BURN_MULTIPLE), 0.3),
            ],
        ),
        DimensionSpec::new(
            "profitability",
            vec![
                Factor::new("gross margin %", direct("grossMarginPct"), 0.6),
                Factor::new("net margin %", buckets("netMarginPct", NET_MARGIN), 0.4),
            ],
        ),
        DimensionSpec::new(
            "growth",
            vec![
                Factor::new("revenue growth %", buckets("revenueGrowthPct", REVENUE_GROWTH), 0.6),
                Factor::new("new customers", scaled("newCustomers", 10.0), 0.4),
            ],
        ),
        DimensionSpec::new(
            "collections",
            vec![
                Factor::new(
                    "days sales outstanding",
                    buckets("daysSalesOutstanding", DAYS_SALES_OUTSTANDING),
                    0.6,
                ),
                Factor::new("bad debt %", inverse("badDebtPct", 10.0), 0.4),
            ],
        ),
    ];

    let rules = vec![
        Rule::blocker("runway_critical", Severity::Critical, when::below("runwayMonths", 6.0))
            .titled(
                "Less than six months of runway",
                "Cut discretionary spend and start a funding plan now",
            )
            .on("runway"),
        Rule::blocker(
            "runway_short",
            Severity::High,
            when::all(vec![
                when::below("runwayMonths", 12.0),
                when::not(when::below("runwayMonths", 6.0)),
            ]),
        )
        .titled(
            "Less than a year of runway",
            "Model cost scenarios for the next two quarters",
        )
        .on("runway"),
        Rule::blocker("burn_inefficient", Severity::Medium, when::above("burnMultiple", 2.5))
            .titled(
                "Burn is high relative to new revenue",
                "Pause spend on channels with the weakest payback",
            )
            .on("runway"),
        Rule::blocker("deep_losses", Severity::Medium, when::below("netMarginPct", -20.0))
            .titled(
                "Net margin below -20%",
                "Review pricing and the largest cost centers",
            )
            .on("profitability"),
        Rule::blocker(
            "slow_collections",
            Severity::Medium,
            when::above("daysSalesOutstanding", 60.0),
        )
        .titled(
            "Collections are slow",
            "Tighten payment terms and chase invoices older than 60 days",
        )
        .on("collections"),
        Rule::opportunity(
            "growth_momentum",
            Severity::Medium,
            when::dimension_at_least("growth", 80),
        )
        .titled(
            "Revenue is growing quickly",
            "Reinvest in the best-performing acquisition channel",
        )
        .on("growth"),
        Rule::opportunity(
            "margin_headroom",
            Severity::Low,
            when::all(vec![
                when::dimension_at_least("profitability", 70),
                when::dimension_below("growth", 50),
            ]),
        )
        .titled(
            "Healthy margins but slow growth",
            "Fund a growth experiment from current margin",
        )
        .on("growth"),
        Rule::win("financially_healthy", Predicate::OverallAtLeast(70))
            .titled("Finances are healthy", "Keep the current operating plan"),
    ];

    Profile {
        kind: ReportKind::FinancialHealth,
        dimensions,
        rules,
    }
}

const TRAFFIC_GROWTH: &[Cut] = &[
    cut(f64::NEG_INFINITY, 20.0),
    cut(0.0, 50.0),
    cut(10.0, 80.0),
    cut(25.0, 100.0),
];
const NET_PROMOTER: &[Cut] = &[
    cut(f64::NEG_INFINITY, 10.0),
    cut(0.0, 40.0),
    cut(30.0, 70.0),
    cut(50.0, 100.0),
];

fn kpi() -> Profile {
    let dimensions = vec![
        DimensionSpec::new(
            "acquisition",
            vec![
                Factor::new("leads vs target", ratio("leadsThisMonth", "leadTarget"), 0.6),
                Factor::new("traffic growth %", buckets("trafficGrowthPct", TRAFFIC_GROWTH), 0.4),
            ],
        ),
        DimensionSpec::new(
            "conversion",
            vec![
                Factor::new("leads converted", ratio("conversions", "leadsThisMonth"), 0.6),
                Factor::new("cost per acquisition", inverse("costPerAcquisition", 500.0), 0.4),
            ],
        ),
        DimensionSpec::new(
            "retention",
            vec![
                Factor::new("monthly churn %", inverse("churnRatePct", 10.0), 0.6),
                Factor::new("NPS", buckets("npsScore", NET_PROMOTER), 0.4),
            ],
        ),
        DimensionSpec::new(
            "content",
            vec![
                Factor::new("posts published", ratio("postsPublished", "postsPlanned"), 0.5),
                Factor::new("email open rate %", direct("emailOpenRate"), 0.5),
            ],
        ),
    ];

    let rules = vec![
        Rule::blocker("churn_spike", Severity::High, when::above("churnRatePct", 5.0))
            .titled(
                "Monthly churn above 5%",
                "Interview recently churned customers this week",
            )
            .on("retention"),
        Rule::blocker(
            "lead_shortfall",
            Severity::Medium,
            when::dimension_below("acquisition", 50),
        )
        .titled(
            "Lead generation is below target",
            "Shift budget to the highest-converting channel",
        )
        .on("acquisition"),
        Rule::blocker("content_slipping", Severity::Low, when::dimension_below("content", 50))
            .titled(
                "Content calendar is slipping",
                "Trim the calendar to what the team can ship",
            )
            .on("content"),
        Rule::opportunity(
            "conversion_leverage",
            Severity::Medium,
            when::all(vec![
                when::dimension_at_least("acquisition", 70),
                when::dimension_below("conversion", 50),
            ]),
        )
        .titled(
            "Leads are not converting",
            "Review the landing page and follow-up sequence",
        )
        .on("conversion"),
        Rule::opportunity("promoter_base", Severity::Low, when::above("npsScore", 50.0))
            .titled("Strong promoter base", "Launch a referral program")
            .on("retention"),
        Rule::win("kpis_on_track", Predicate::OverallAtLeast(70))
            .titled("KPIs are on track", "Share the monthly rollup with stakeholders"),
    ];

    Profile {
        kind: ReportKind::Kpi,
        dimensions,
        rules,
    }
}
