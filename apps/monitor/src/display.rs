//! Terminal rendering of a monitoring report.

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Color, Table};

use cortex_core::MonitoringReport;
use cortex_core::report::PROJECTION_DAYS;

/// Prints `report` with colored section headings and a usage table.
pub fn print_report(report: &MonitoringReport) {
    println!("{}", "Cortex Monitoring Report".bold().cyan());
    println!("Period: {}", report.period);
    println!(
        "Total Records: {} ({} executions, {} escalations)",
        report.total_records, report.executions, report.escalations
    );

    if report.is_empty() {
        println!("{}", "No performance records in this period.".yellow());
        return;
    }

    println!();
    println!("{}", "Cost Analysis".bold());
    println!("  Actual cost:            ${:.4}", report.total_cost);
    println!("  Cost if all reference:  ${:.4} ({})", report.reference_cost, report.reference_model);
    let savings = format!("${:.4} ({:.1}%)", report.estimated_savings, report.savings_percentage);
    if report.estimated_savings >= 0.0 {
        println!("  Savings:                {}", savings.green());
    } else {
        println!("  Savings:                {}", savings.red());
    }
    if !report.unpriced_models.is_empty() {
        let models: Vec<&str> = report.unpriced_models.iter().map(String::as_str).collect();
        println!("  {} {}", "Unpriced models:".yellow(), models.join(", "));
    }

    println!();
    println!("{}", "Expert Usage".bold());
    println!("{}", usage_table(report));

    println!();
    println!("{}", "Performance".bold());
    println!("  Success rate:     {:.1}%", report.success_rate * 100.0);
    println!("  Escalation rate:  {:.1}%", report.escalation_rate * 100.0);
    println!("  Avg duration:     {:.0}ms", report.avg_duration_ms);

    println!();
    println!("{}", format!("Projections ({PROJECTION_DAYS:.0} days)").bold());
    println!("  Cost:     ${:.2}", report.projected_cost());
    println!("  Savings:  ${:.2}", report.projected_savings());
}

fn usage_table(report: &MonitoringReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Expert", "Tasks", "Share", "Cost (USD)"]);

    for (name, count, cost) in report.experts_by_usage() {
        let share = if report.executions > 0 {
            count as f64 / report.executions as f64 * 100.0
        } else {
            0.0
        };
        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan),
            Cell::new(count).set_alignment(CellAlignment::Right),
            Cell::new(format!("{share:.1}%")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{cost:.4}")).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
