//! Monitoring reports over persisted performance logs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::cost::CostEstimator;
use crate::error::{CortexError, Result};
use crate::performance::{PerformanceLog, read_log_file};

/// Period label of a report built from no records.
pub const NO_DATA: &str = "no data";

/// Days covered by the projection section.
pub const PROJECTION_DAYS: f64 = 30.0;

/// Aggregated cost and performance figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitoringReport {
    /// Human-readable period, or [`NO_DATA`].
    pub period: String,
    /// Start of the period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Days spanned by the period, at least one.
    pub days: f64,
    /// All records, executions and escalations.
    pub total_records: usize,
    /// Execution records.
    pub executions: usize,
    /// Escalation records.
    pub escalations: usize,
    /// Executions per expert.
    pub tasks_by_expert: BTreeMap<String, usize>,
    /// Cost per expert in USD.
    pub cost_by_expert: BTreeMap<String, f64>,
    /// Actual cost in USD.
    pub total_cost: f64,
    /// Cost if every record had run on the reference model.
    pub reference_cost: f64,
    /// Reference cost minus actual cost.
    pub estimated_savings: f64,
    /// Savings as a percentage of the reference cost.
    pub savings_percentage: f64,
    /// Mean execution duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Successful executions over executions.
    pub success_rate: f64,
    /// Escalations over all records.
    pub escalation_rate: f64,
    /// Model the savings are measured against.
    pub reference_model: String,
    /// Models priced at the reference rate for lack of a price.
    pub unpriced_models: BTreeSet<String>,
}

impl MonitoringReport {
    /// The report for an empty log set.
    #[must_use]
    pub fn no_data() -> Self {
        Self { period: NO_DATA.to_string(), days: 1.0, ..Self::default() }
    }

    /// Whether this is the [`NO_DATA`] sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }

    /// Builds a report from records already filtered to the period.
    #[must_use]
    pub fn from_logs(
        logs: &[PerformanceLog],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        estimator: &CostEstimator,
    ) -> Self {
        if logs.is_empty() {
            return Self::no_data();
        }

        let days = ((now - since).num_seconds() as f64 / 86_400.0).max(1.0);
        let mut report = Self {
            period: format!("{} to now", since.format("%Y-%m-%d %H:%M")),
            since: Some(since),
            days,
            total_records: logs.len(),
            reference_model: estimator.reference_model().to_string(),
            ..Self::default()
        };

        let mut successes = 0usize;
        let mut total_duration_ms = 0.0;
        for log in logs {
            let cost =
                estimator.try_calculate_cost(&log.model, log.tokens_input, log.tokens_output);
            let cost = cost.unwrap_or_else(|| {
                report.unpriced_models.insert(log.model.clone());
                estimator.reference_cost(log.tokens_input, log.tokens_output)
            });
            report.total_cost += cost;
            report.reference_cost += estimator.reference_cost(log.tokens_input, log.tokens_output);

            if log.escalated {
                report.escalations += 1;
                continue;
            }
            report.executions += 1;
            *report.tasks_by_expert.entry(log.expert.clone()).or_default() += 1;
            *report.cost_by_expert.entry(log.expert.clone()).or_default() += cost;
            if log.success {
                successes += 1;
            }
            total_duration_ms += log.duration.as_secs_f64() * 1000.0;
        }

        report.estimated_savings = report.reference_cost - report.total_cost;
        if report.reference_cost > 0.0 {
            report.savings_percentage = report.estimated_savings / report.reference_cost * 100.0;
        }
        report.escalation_rate = report.escalations as f64 / logs.len() as f64;
        if report.executions > 0 {
            report.success_rate = successes as f64 / report.executions as f64;
            report.avg_duration_ms = total_duration_ms / report.executions as f64;
        }
        report
    }

    /// Projected cost over [`PROJECTION_DAYS`].
    #[must_use]
    pub fn projected_cost(&self) -> f64 {
        self.total_cost / self.days * PROJECTION_DAYS
    }

    /// Projected savings over [`PROJECTION_DAYS`].
    #[must_use]
    pub fn projected_savings(&self) -> f64 {
        self.estimated_savings / self.days * PROJECTION_DAYS
    }

    /// Experts sorted by execution count, busiest first.
    #[must_use]
    pub fn experts_by_usage(&self) -> Vec<(&str, usize, f64)> {
        let mut experts: Vec<(&str, usize, f64)> = self
            .tasks_by_expert
            .iter()
            .map(|(name, count)| {
                (name.as_str(), *count, self.cost_by_expert.get(name).copied().unwrap_or(0.0))
            })
            .collect();
        experts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        experts
    }

    /// Plain-text rendering.
    #[must_use]
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "CORTEX MONITORING REPORT");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Period: {}", self.period);
        let _ = writeln!(
            out,
            "Total Records: {} ({} executions, {} escalations)",
            self.total_records, self.executions, self.escalations
        );

        if self.is_empty() {
            let _ = writeln!(out, "{rule}");
            return out;
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "COST ANALYSIS:");
        let _ = writeln!(out, "  Actual Cost:           ${:.4}", self.total_cost);
        let _ = writeln!(
            out,
            "  Cost if all reference: ${:.4} ({})",
            self.reference_cost, self.reference_model
        );
        let _ = writeln!(
            out,
            "  Savings:               ${:.4} ({:.1}%)",
            self.estimated_savings, self.savings_percentage
        );
        if !self.unpriced_models.is_empty() {
            let models: Vec<&str> = self.unpriced_models.iter().map(String::as_str).collect();
            let _ = writeln!(out, "  Unpriced models:       {}", models.join(", "));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "EXPERT USAGE:");
        for (name, count, cost) in self.experts_by_usage() {
            let percentage = if self.executions > 0 {
                count as f64 / self.executions as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "  {name:<20} {count:>4} tasks ({percentage:.1}%) - ${cost:.4}"
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "PERFORMANCE:");
        let _ = writeln!(out, "  Success Rate:    {:.1}%", self.success_rate * 100.0);
        let _ = writeln!(out, "  Escalation Rate: {:.1}%", self.escalation_rate * 100.0);
        let _ = writeln!(out, "  Avg Duration:    {:.0}ms", self.avg_duration_ms);

        let _ = writeln!(out);
        let _ = writeln!(out, "PROJECTIONS ({PROJECTION_DAYS:.0} days):");
        let _ = writeln!(out, "  Projected Monthly Cost:    ${:.2}", self.projected_cost());
        let _ = writeln!(out, "  Projected Monthly Savings: ${:.2}", self.projected_savings());
        let _ = writeln!(out, "{rule}");
        out
    }
}

/// Scans `dir` recursively for `.json` and `.jsonl` logs and reports on the
/// records newer than `since`. A missing directory yields the no-data report.
///
/// # Errors
///
/// Returns `CortexError::Persistence` if the directory cannot be walked or a
/// log file cannot be read.
pub fn generate_report(
    dir: &Path,
    since: DateTime<Utc>,
    estimator: &CostEstimator,
) -> Result<MonitoringReport> {
    let logs = load_logs_since(dir, since)?;
    debug!(dir = %dir.display(), records = logs.len(), "Generating monitoring report");
    Ok(MonitoringReport::from_logs(&logs, since, Utc::now(), estimator))
}

/// Loads every record under `dir` newer than `since`, oldest first.
///
/// # Errors
///
/// Returns `CortexError::Persistence` if the directory cannot be walked or a
/// log file cannot be read.
pub fn load_logs_since(dir: &Path, since: DateTime<Utc>) -> Result<Vec<PerformanceLog>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut logs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            CortexError::Persistence(format!("failed to scan {}: {e}", dir.display()))
        })?;
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "json" || ext == "jsonl");
        if !entry.file_type().is_file() || !is_log {
            continue;
        }
        logs.extend(read_log_file(path)?.into_iter().filter(|log| log.timestamp > since));
    }
    logs.sort_by_key(|log| log.timestamp);
    Ok(logs)
}
