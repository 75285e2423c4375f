//! Validator FinOps: pure, deterministic financial projections over a
//! traffic/rewards/infrastructure snapshot, plus assembly of that snapshot
//! from the scan API.
//!
//! The calculator performs no I/O. Given the same snapshot and reference
//! date it always produces the same projections; the reference date is
//! only used for the recent-change window and the exhaustion date.
use crate::{
    client::Client,
    constants,
    endpoints::QueryResult,
    queries,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Traffic credit snapshot for one validator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSnapshot {
    pub current_credits:    f64,
    pub daily_burn_rate:    f64,
    pub average_burn_per_mb: f64,
    pub total_mb_used:      f64,
    pub total_cc_burned:    f64,
}

/// Rewards snapshot, normalized per day and per round.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsSnapshot {
    pub liveness_rewards:  f64,
    pub activity_rewards:  f64,
    pub total_rewards:     f64,
    pub rewards_per_day:   f64,
    pub rewards_per_round: f64,
}

/// Infrastructure cost breakdown for the analysis period.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureCosts {
    pub compute:    f64,
    pub storage:    f64,
    pub network:    f64,
    pub monitoring: f64,
    pub total:      f64,
}

/// Category of a change attribution event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    VolumeSpike,
    NewParty,
    IntegrationRamp,
    Other,
}

impl ChangeKind {
    /// Estimated burn-rate multiplier applied when a change of this kind
    /// landed within the recent window.
    fn burn_multiplier(self) -> f64 {
        match self {
            ChangeKind::VolumeSpike => 1.5,
            ChangeKind::NewParty => 1.2,
            ChangeKind::IntegrationRamp => 1.3,
            ChangeKind::Other => 1.1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ChangeKind::VolumeSpike => "volume spike",
            ChangeKind::NewParty => "new party",
            ChangeKind::IntegrationRamp => "integration ramp",
            ChangeKind::Other => "other",
        }
    }
}

/// A dated, categorized explanation for a shift in financial metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAttribution {
    pub kind:        ChangeKind,
    pub description: String,
    /// Signed CC-denominated impact.
    pub impact:      f64,
    pub date:        DateTime<Utc>,
    #[serde(default)]
    pub parties:     Option<Vec<String>>,
}

/// The sole input to the calculator; immutable for one calculation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorFinOpsData {
    pub traffic:        TrafficSnapshot,
    pub rewards:        RewardsSnapshot,
    pub infrastructure: InfrastructureCosts,
    pub period_start:   DateTime<Utc>,
    pub period_end:     DateTime<Utc>,
    pub changes:        Vec<ChangeAttribution>,
}

/// Severity used by both runway warnings and overall financial health.
/// Ordered so that escalation can be expressed as `max`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Credit-runway forecast at the current and projected burn rates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunwayForecast {
    /// Whole days until credits run out; infinite when nothing burns.
    pub days_remaining:      f64,
    pub date_exhausted:      DateTime<Utc>,
    pub current_burn_rate:   f64,
    pub projected_burn_rate: f64,
    pub warning_level:       HealthStatus,
}

/// Net margin over the analysis period.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetMargin {
    pub total_revenue:     f64,
    pub total_costs:       f64,
    pub net_margin:        f64,
    pub margin_percentage: f64,
    /// Daily rewards needed to cover costs.
    pub break_even_point:  f64,
}

/// Ranking and aggregation of the period's change attributions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAnalysis {
    pub summary:      String,
    pub top_changes:  Vec<ChangeAttribution>,
    pub total_impact: f64,
    /// Absolute impact summed per category.
    pub by_kind:      BTreeMap<String, f64>,
}

/// Activity scenario used for projections.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Idle,
    Moderate,
    Heavy,
}

impl ScenarioKind {
    fn burn_multiplier(self) -> f64 {
        match self {
            ScenarioKind::Idle => 0.3,
            ScenarioKind::Moderate => 1.0,
            ScenarioKind::Heavy => 2.5,
        }
    }

    fn reward_multiplier(self) -> f64 {
        match self {
            ScenarioKind::Idle => 0.5,
            ScenarioKind::Moderate => 1.0,
            ScenarioKind::Heavy => 1.8,
        }
    }

    fn description(self) -> &'static str {
        match self {
            ScenarioKind::Idle => "Low activity, minimal traffic burn",
            ScenarioKind::Moderate => "Current activity levels continue",
            ScenarioKind::Heavy => "High activity, increased traffic burn",
        }
    }
}

/// One scenario projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub kind:               ScenarioKind,
    pub description:        String,
    pub daily_burn_rate:    f64,
    pub daily_rewards:      f64,
    pub monthly_net_margin: f64,
    /// Runway in days under this scenario's burn rate.
    pub runway_days:        f64,
}

/// Overall financial health with actionable recommendations. The
/// recommendation list is never empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialHealth {
    pub status:          HealthStatus,
    pub message:         String,
    pub recommendations: Vec<String>,
}

/// Pure projection engine over one [`ValidatorFinOpsData`] snapshot.
pub struct ValidatorFinOpsCalculator {
    data: ValidatorFinOpsData,
    now:  DateTime<Utc>,
}

impl ValidatorFinOpsCalculator {
    pub fn new(data: ValidatorFinOpsData) -> Self { Self::new_at(data, Utc::now()) }

    /// Construct with an explicit reference date. The date fixes the
    /// recent-change window and the exhaustion date, which makes every
    /// projection reproducible.
    pub fn new_at(data: ValidatorFinOpsData, now: DateTime<Utc>) -> Self { Self { data, now } }

    /// Days until traffic credits run out at the current burn rate. A
    /// non-positive burn rate means credits never run out; the nominal
    /// exhaustion date is then a year away and the forecast is healthy.
    pub fn calculate_runway(&self) -> RunwayForecast {
        let traffic = &self.data.traffic;
        if traffic.daily_burn_rate <= 0.0 {
            return RunwayForecast {
                days_remaining:      f64::INFINITY,
                date_exhausted:      self.now + Duration::days(365),
                current_burn_rate:   0.0,
                projected_burn_rate: 0.0,
                warning_level:       HealthStatus::Healthy,
            };
        }
        let days_remaining = (traffic.current_credits / traffic.daily_burn_rate).floor();
        // A century out is as good as never; keeps the date arithmetic in
        // range for absurd credit balances.
        let date_exhausted = self.now + Duration::days(days_remaining.min(36_500.0) as i64);
        let warning_level = if days_remaining < 7.0 {
            HealthStatus::Critical
        } else if days_remaining < 30.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        RunwayForecast {
            days_remaining,
            date_exhausted,
            current_burn_rate: traffic.daily_burn_rate,
            projected_burn_rate: self.projected_burn_rate(),
            warning_level,
        }
    }

    /// Burn rate projected from changes dated within the trailing 7 days:
    /// each applies its category multiplier to the current burn rate and
    /// the resulting deltas are averaged onto the base. Older changes have
    /// no influence.
    fn projected_burn_rate(&self) -> f64 {
        let base = self.data.traffic.daily_burn_rate;
        let recent: Vec<&ChangeAttribution> = self
            .data
            .changes
            .iter()
            .filter(|change| (self.now - change.date).num_days() <= 7)
            .collect();
        if recent.is_empty() {
            return base;
        }
        let total_delta: f64 = recent
            .iter()
            .map(|change| base * (change.kind.burn_multiplier() - 1.0))
            .sum();
        base + total_delta / recent.len() as f64
    }

    /// Net margin over the period: rewards against burned credits plus
    /// infrastructure. Zero revenue yields a zero margin percentage, and
    /// the period counts as at least one day.
    pub fn calculate_net_margin(&self) -> NetMargin {
        let total_revenue = self.data.rewards.total_rewards;
        let total_costs = self.data.traffic.total_cc_burned + self.data.infrastructure.total;
        let net_margin = total_revenue - total_costs;
        let margin_percentage = if total_revenue > 0.0 {
            net_margin / total_revenue * 100.0
        } else {
            0.0
        };
        let days_in_period = (self.data.period_end - self.data.period_start)
            .num_days()
            .max(1);
        NetMargin {
            total_revenue,
            total_costs,
            net_margin,
            margin_percentage,
            break_even_point: total_costs / days_in_period as f64,
        }
    }

    /// Rank the period's changes by absolute impact and aggregate them per
    /// category.
    pub fn analyze_changes(&self) -> ChangeAnalysis {
        let mut top_changes = self.data.changes.clone();
        top_changes.sort_by(|a, b| {
            b.impact
                .abs()
                .partial_cmp(&a.impact.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_changes.truncate(5);

        let mut by_kind: BTreeMap<String, f64> = BTreeMap::new();
        for change in &self.data.changes {
            *by_kind
                .entry(change.kind.label().replace(' ', "_"))
                .or_insert(0.0) += change.impact.abs();
        }
        let total_impact = self.data.changes.iter().map(|c| c.impact.abs()).sum();

        let summary = match top_changes.first() {
            Some(primary) => format!(
                "Primary driver: {} ({})",
                primary.description,
                primary.kind.label()
            ),
            None => "No significant changes detected.".to_string(),
        };

        ChangeAnalysis {
            summary,
            top_changes,
            total_impact,
            by_kind,
        }
    }

    /// Idle, moderate, and heavy projections scaling the current burn and
    /// reward rates by fixed multipliers.
    pub fn generate_scenarios(&self) -> Vec<Scenario> {
        let daily_burn = self.data.traffic.daily_burn_rate;
        let daily_rewards = self.data.rewards.rewards_per_day;
        let credits = self.data.traffic.current_credits;
        let infrastructure_daily = self.data.infrastructure.total / 30.0;

        [ScenarioKind::Idle, ScenarioKind::Moderate, ScenarioKind::Heavy]
            .into_iter()
            .map(|kind| {
                let scenario_burn = daily_burn * kind.burn_multiplier();
                let scenario_rewards = daily_rewards * kind.reward_multiplier();
                Scenario {
                    kind,
                    description: kind.description().to_string(),
                    daily_burn_rate: scenario_burn,
                    daily_rewards: scenario_rewards,
                    monthly_net_margin: (scenario_rewards - scenario_burn - infrastructure_daily)
                        * 30.0,
                    runway_days: if scenario_burn > 0.0 {
                        (credits / scenario_burn).floor()
                    } else {
                        f64::INFINITY
                    },
                }
            })
            .collect()
    }

    /// Compose the margin and runway checks into one health verdict. The
    /// runway check can escalate the status but never downgrades a
    /// critical margin verdict.
    pub fn financial_health(&self) -> FinancialHealth {
        let margin = self.calculate_net_margin();
        let runway = self.calculate_runway();
        let mut recommendations: Vec<String> = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut message = "Validator economics are healthy.".to_string();

        if margin.net_margin < 0.0 {
            status = HealthStatus::Critical;
            message = "Validator is operating at a loss.".to_string();
            recommendations.push("Review infrastructure costs and optimize".to_string());
            recommendations.push("Consider increasing activity to boost rewards".to_string());
            recommendations.push("Evaluate traffic burn optimization strategies".to_string());
        } else if margin.margin_percentage < 10.0 {
            status = HealthStatus::Warning;
            message = "Low profit margin - monitor closely.".to_string();
            recommendations.push("Optimize traffic burn efficiency".to_string());
            recommendations.push("Review infrastructure spending".to_string());
        }

        if runway.days_remaining < 30.0 {
            let runway_status = if runway.days_remaining < 7.0 {
                HealthStatus::Critical
            } else {
                HealthStatus::Warning
            };
            status = status.max(runway_status);
            message.push_str(&format!(
                " Traffic credits running low ({} days remaining).",
                runway.days_remaining as i64
            ));
            recommendations.push("Purchase additional traffic credits immediately".to_string());
            recommendations.push("Review traffic burn patterns for optimization".to_string());
        }

        if recommendations.is_empty() {
            recommendations.push("Continue monitoring key metrics".to_string());
            recommendations.push("Plan for traffic credit purchases in advance".to_string());
        }

        FinancialHealth {
            status,
            message,
            recommendations,
        }
    }
}

/// Caller-supplied infrastructure cost inputs; the total is derived.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureInputs {
    pub compute:    f64,
    pub storage:    f64,
    pub network:    f64,
    pub monitoring: f64,
}

/// Options for [`fetch_validator_finops_data`].
#[derive(Debug, Clone)]
pub struct FetchValidatorFinOpsOptions {
    pub validator_id:   String,
    pub start:          DateTime<Utc>,
    pub end:            DateTime<Utc>,
    pub infrastructure: Option<InfrastructureInputs>,
}

/// Assemble a [`ValidatorFinOpsData`] snapshot from the scan API. Network
/// and protocol errors propagate to the caller; change detection alone is
/// best-effort.
pub async fn fetch_validator_finops_data(
    client: &Client,
    options: &FetchValidatorFinOpsOptions,
) -> QueryResult<ValidatorFinOpsData> {
    let (_validator, rewards, traffic) = futures::try_join!(
        queries::get_validator_info(client, &options.validator_id),
        queries::get_validator_rewards(client, &options.validator_id, options.start, options.end),
        queries::get_validator_traffic(client, &options.validator_id),
    )?;

    let days_in_period =
        ((options.end - options.start).num_seconds() as f64 / 86_400.0).ceil().max(0.0);
    let rewards_per_day = if days_in_period > 0.0 {
        rewards.total_rewards / days_in_period
    } else {
        0.0
    };
    let rewards_per_round = if days_in_period > 0.0 {
        rewards.total_rewards / (days_in_period * constants::ROUNDS_PER_DAY as f64)
    } else {
        0.0
    };

    let infrastructure = options.infrastructure.unwrap_or_default();
    let changes =
        detect_changes(client, &options.validator_id, options.start, options.end).await;

    Ok(ValidatorFinOpsData {
        traffic: TrafficSnapshot {
            current_credits:    traffic.current_credits,
            daily_burn_rate:    traffic.daily_burn_rate,
            average_burn_per_mb: traffic.average_burn_per_mb,
            total_mb_used:      0.0,
            total_cc_burned:    traffic.total_burned,
        },
        rewards: RewardsSnapshot {
            liveness_rewards: rewards.liveness_rewards,
            activity_rewards: rewards.activity_rewards,
            total_rewards: rewards.total_rewards,
            rewards_per_day,
            rewards_per_round,
        },
        infrastructure: InfrastructureCosts {
            compute:    infrastructure.compute,
            storage:    infrastructure.storage,
            network:    infrastructure.network,
            monitoring: infrastructure.monitoring,
            total:      infrastructure.compute
                + infrastructure.storage
                + infrastructure.network
                + infrastructure.monitoring,
        },
        period_start: options.start,
        period_end: options.end,
        changes,
    })
}

/// Compare the period's rewards against the immediately preceding period
/// of equal length and attribute swings above 20%. Best-effort: a failed
/// comparison yields no attributions.
async fn detect_changes(
    client: &Client,
    validator_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<ChangeAttribution> {
    let period = end - start;
    let prev_start = start - period;
    let comparison = futures::try_join!(
        queries::get_validator_rewards(client, validator_id, start, end),
        queries::get_validator_rewards(client, validator_id, prev_start, start),
    );
    let (current, previous) = match comparison {
        Ok(pair) => pair,
        Err(err) => {
            tracing::debug!(error = %err, "reward comparison failed; skipping change detection");
            return Vec::new();
        }
    };

    let cur = current.total_rewards;
    let prev = previous.total_rewards;
    let change_percent = if prev > 0.0 { (cur - prev) / prev * 100.0 } else { 0.0 };
    if change_percent.abs() > 20.0 {
        let kind = if change_percent > 0.0 {
            ChangeKind::VolumeSpike
        } else {
            ChangeKind::Other
        };
        let direction = if change_percent > 0.0 { "increase" } else { "decrease" };
        return vec![ChangeAttribution {
            kind,
            description: format!(
                "Reward {direction} of {:.1}%",
                change_percent.abs()
            ),
            impact: cur - prev,
            date: start,
            parties: None,
        }];
    }
    Vec::new()
}
