//! Terminal rendering of plans and reports

use colored::{ColoredString, Colorize};
use serde_json::Value;
use skyflow_core::UNKNOWN_VALUE;
use skyflow_engine::{
    Action, ApplyReport, AttributeChange, Plan, RefreshReport, ResourceStatus, StateSnapshot,
};

fn marker(action: Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::Create => symbol.green(),
        Action::Update => symbol.yellow(),
        Action::Replace => symbol.magenta(),
        Action::Destroy => symbol.red(),
        Action::NoOp => symbol.normal(),
    }
}

fn value(value: &Value) -> ColoredString {
    match value {
        Value::String(s) if s == UNKNOWN_VALUE => s.as_str().dimmed(),
        other => other.to_string().normal(),
    }
}

fn change_line(change: &AttributeChange) -> String {
    match (&change.old, &change.new) {
        (None, Some(new)) => format!("{}: {}", change.name, value(new)),
        (Some(old), None) => format!("{}: {} => {}", change.name, value(old), "null".dimmed()),
        (Some(old), Some(new)) => format!("{}: {} => {}", change.name, value(old), value(new)),
        (None, None) => change.name.clone(),
    }
}

pub fn plan(plan: &Plan) {
    if !plan.has_changes {
        println!(
            "{}",
            "No changes. Infrastructure matches the configuration.".green()
        );
        return;
    }

    println!("{}", "Planned changes:".bold());
    for step in plan.changes() {
        println!(
            "  {} {} {}",
            marker(step.action),
            step.address.to_string().bold(),
            format!("({})", step.action).dimmed()
        );
        if let Some(reason) = &step.reason {
            println!("      {}", format!("# {}", reason).dimmed());
        }
        for change in &step.changes {
            println!("      {}", change_line(change));
        }
    }
    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

pub fn apply_report(report: &ApplyReport) {
    println!();
    for step in &report.applied {
        println!(
            "  {} {} {}",
            "✓".green(),
            step.action,
            step.address.to_string().cyan()
        );
    }
    for failure in &report.failed {
        println!("  {} {}", "✗".red(), failure);
    }
    for step in &report.skipped {
        println!(
            "  {} {} {} skipped: {}",
            "-".yellow(),
            step.action,
            step.address.to_string().cyan(),
            step.reason
        );
    }

    println!();
    let summary = format!(
        "{} applied, {} unchanged, {} failed, {} skipped in {:.1}s",
        report.applied.len(),
        report.unchanged.len(),
        report.failed.len(),
        report.skipped.len(),
        report.duration_ms as f64 / 1000.0
    );
    if report.is_success() {
        println!("{} {}", "✓ Apply complete:".green().bold(), summary);
    } else if report.cancelled {
        println!("{} {}", "⚠ Apply cancelled:".yellow().bold(), summary);
    } else {
        println!("{} {}", "✗ Apply incomplete:".red().bold(), summary);
    }
}

pub fn refresh_report(report: &RefreshReport) {
    for address in &report.updated {
        println!("  {} {} outputs updated", "~".yellow(), address.to_string().cyan());
    }
    for address in &report.removed {
        println!(
            "  {} {} no longer exists, removed from state",
            "-".red(),
            address.to_string().cyan()
        );
    }
    for failure in &report.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.address.to_string().cyan(),
            failure.message
        );
    }
    println!(
        "{} {} updated, {} unchanged, {} removed, {} failed",
        "Refresh:".bold(),
        report.updated.len(),
        report.unchanged.len(),
        report.removed.len(),
        report.failed.len()
    );
}

pub fn state_list(snapshot: &StateSnapshot) {
    if snapshot.is_empty() {
        println!("{}", "No resources in state.".dimmed());
        return;
    }
    for (address, state) in snapshot.iter() {
        let status = match state.status {
            ResourceStatus::Present => "".normal(),
            ResourceStatus::Tainted => " (tainted)".red(),
            ResourceStatus::Absent => " (absent)".dimmed(),
        };
        println!(
            "{}  {}{}",
            address.to_string().cyan(),
            state.id.dimmed(),
            status
        );
    }
}
