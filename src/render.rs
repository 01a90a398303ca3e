//! Terminal rendering of plans and execution reports

use colored::Colorize;
use converge_document::Resolved;
use converge_engine::{Action, ExecuteReport, OpOutcome, Plan, PlannedOp};
use serde_json::Value;

pub fn print_plan(plan: &Plan) {
    if !plan.drift.is_empty() {
        println!();
        println!("{}", "Drift detected outside of converge:".yellow().bold());
        for entry in &plan.drift {
            println!("  {} {}: {}", "~".yellow(), entry.address, entry.detail);
        }
    }

    for op in &plan.ops {
        match &op.action {
            Action::NoOp => {}
            Action::Create => {
                println!();
                println!("  {} {}", "+".green().bold(), op.address.to_string().bold());
                print_attrs(op, &[]);
            }
            Action::Update { changed } => {
                println!();
                println!("  {} {}", "~".yellow().bold(), op.address.to_string().bold());
                print_changes(op, changed);
            }
            Action::Replace { forced_by, .. } => {
                println!();
                println!(
                    "  {} {} {}",
                    "±".red().bold(),
                    op.address.to_string().bold(),
                    format!("(replaced: {} changed)", forced_by.join(", ")).dimmed()
                );
                print_attrs(op, forced_by);
            }
            Action::Destroy => {
                println!();
                println!("  {} {}", "-".red().bold(), op.address.to_string().bold());
            }
        }
    }

    let summary = plan.summary();
    println!();
    if plan.has_changes() {
        println!(
            "{} {} to create, {} to update, {} to replace, {} to destroy.",
            "Plan:".bold(),
            summary.create,
            summary.update,
            summary.replace,
            summary.destroy
        );
        if summary.unchanged > 0 {
            println!("{}", format!("{} unchanged.", summary.unchanged).dimmed());
        }
    } else {
        println!(
            "{} Everything matches the declared state ({} unchanged).",
            "✓".green(),
            summary.unchanged
        );
    }
}

fn print_attrs(op: &PlannedOp, highlight: &[String]) {
    for (attr, value) in &op.desired {
        let marker = if highlight.contains(attr) {
            format!(" {}", "# forces replacement".red())
        } else {
            String::new()
        };
        println!(
            "      {attr} = {}{marker}",
            render_resolved(value, op.sensitive.contains(attr))
        );
    }
}

fn print_changes(op: &PlannedOp, changed: &[String]) {
    for attr in changed {
        let sensitive = op.sensitive.contains(attr);
        let new = op
            .desired
            .get(attr)
            .map_or_else(|| "(unset)".to_string(), |v| render_resolved(v, sensitive));
        let old = op
            .recorded
            .as_ref()
            .and_then(|r| r.attrs.get(attr))
            .map_or_else(|| "(unset)".to_string(), |v| render_value(v, sensitive));

        if !sensitive {
            if let Some((old_text, new_text)) = multiline_pair(op, attr) {
                println!("      {attr}:");
                print_text_diff(&old_text, &new_text);
                continue;
            }
        }
        println!("      {attr} = {old} {} {new}", "->".dimmed());
    }
}

/// Old and new values, when both are multi-line strings worth a line diff
fn multiline_pair(op: &PlannedOp, attr: &str) -> Option<(String, String)> {
    let old = op
        .recorded
        .as_ref()?
        .attrs
        .get(attr)?
        .as_str()?
        .to_string();
    let new = match op.desired.get(attr)? {
        Resolved::Known(Value::String(s)) => s.clone(),
        _ => return None,
    };
    if old.lines().count() > 1 || new.lines().count() > 1 {
        Some((old, new))
    } else {
        None
    }
}

fn print_text_diff(old: &str, new: &str) {
    let diff = similar::TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => print!("        {}", format!("- {change}").red()),
            similar::ChangeTag::Insert => print!("        {}", format!("+ {change}").green()),
            similar::ChangeTag::Equal => {}
        }
    }
}

fn render_resolved(value: &Resolved, sensitive: bool) -> String {
    match value {
        Resolved::Unknown => "(known after apply)".dimmed().to_string(),
        Resolved::Known(v) => render_value(v, sensitive),
    }
}

fn render_value(value: &Value, sensitive: bool) -> String {
    if sensitive {
        return "(sensitive)".dimmed().to_string();
    }
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

pub fn print_report(report: &ExecuteReport) {
    println!();
    for (address, outcome) in &report.outcomes {
        match outcome {
            OpOutcome::Created => println!("  {} {address} created", "✓".green()),
            OpOutcome::Updated => println!("  {} {address} updated", "✓".green()),
            OpOutcome::Replaced => println!("  {} {address} replaced", "✓".green()),
            OpOutcome::Destroyed => println!("  {} {address} destroyed", "✓".green()),
            OpOutcome::Unchanged => {}
            OpOutcome::Failed { error } => {
                println!("  {} {address} failed: {error}", "✗".red())
            }
            OpOutcome::Skipped { reason } => {
                println!("  {} {}", "↷".dimmed(), format!("{address} skipped: {reason}").dimmed())
            }
        }
    }

    let summary = &report.summary;
    println!();
    let line = format!(
        "{} created, {} updated, {} replaced, {} destroyed, {} unchanged",
        summary.created, summary.updated, summary.replaced, summary.destroyed, summary.unchanged
    );
    if summary.is_success() {
        println!("{} Apply complete: {line}.", "✓".green().bold());
    } else {
        println!(
            "{} Apply finished with {} failed, {} skipped: {line}.",
            "✗".red().bold(),
            summary.failed,
            summary.skipped
        );
    }
}
