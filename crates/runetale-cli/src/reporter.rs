//! Run reporter - human-readable and JSON summaries

use colored::*;
use runetale_build::{DeployReport, RunReport, SuiteResult, TaskStatus};
use std::path::Path;

/// Renders run reports on stdout
pub struct RunReporter {
    json: bool,
}

impl RunReporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Report a goal run
    pub fn report(&self, report: &RunReport) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        for record in &report.schedule.records {
            println!(
                "{} {} {}",
                status_label(&record.status),
                record.id.to_string().bold(),
                format!("({:.2?})", record.duration).dimmed()
            );
            match &record.status {
                TaskStatus::Failed { error } => {
                    for line in error.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
                TaskStatus::Skipped { reason } => println!("      {}", reason.dimmed()),
                _ => {}
            }
        }

        if !report.tests.is_empty() {
            println!();
            println!("{}", "Tests:".bold());
            for (module, results) in &report.tests {
                for result in [&results.unit, &results.contract].into_iter().flatten() {
                    println!("  {} {} {}", suite_label(result), module, result);
                }
            }
        }

        if let Some(deploy) = &report.deploy {
            println!();
            self.deploy_summary(deploy);
        }

        if !report.artifacts.is_empty() {
            println!();
            println!("{}", "Artifacts:".bold());
            for artifact in &report.artifacts {
                println!("  {}", artifact.path.display());
            }
        }

        println!();
        println!("{}", "─".repeat(50));
        if let Some(fatal) = &report.schedule.fatal {
            println!("{} {}", "Fatal:".red().bold(), fatal);
        }
        let status = if report.succeeded() {
            "SUCCESSFUL".green().bold()
        } else {
            "FAILED".red().bold()
        };
        let executed = report.schedule.executed().count();
        println!(
            "{} {} in {:.2?} | {} tasks, {} executed, {} up to date",
            report.goal.to_string().bold(),
            status,
            report.elapsed,
            report.schedule.records.len(),
            executed,
            report
                .schedule
                .records
                .iter()
                .filter(|r| r.status == TaskStatus::Succeeded { up_to_date: true })
                .count()
        );
        Ok(())
    }

    /// Report a deploy or clean operation
    pub fn deploy(&self, report: &DeployReport) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
        } else {
            self.deploy_summary(report);
        }
        Ok(())
    }

    fn deploy_summary(&self, report: &DeployReport) {
        println!("{}", "Deployment:".bold());
        print_paths("removed", &report.removed);
        print_paths("mirrored", &report.mirrored);
        print_paths("pruned", &report.pruned);
        print_paths("copied", &report.copied);
        if report.removed.is_empty() && report.copied.is_empty() && report.mirrored.is_empty() {
            println!("  {}", "nothing to do".dimmed());
        }
    }

    /// Report a single message, or a JSON object with it
    pub fn message(&self, key: &str, value: &Path, done: bool) -> anyhow::Result<()> {
        if self.json {
            let mut json = serde_json::Map::new();
            json.insert(key.to_string(), serde_json::json!(value));
            json.insert("changed".to_string(), serde_json::json!(done));
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else if done {
            println!("{} {}", key.green().bold(), value.display());
        } else {
            println!("{} {}", "unchanged".dimmed(), value.display());
        }
        Ok(())
    }
}

fn print_paths(label: &str, paths: &[std::path::PathBuf]) {
    for path in paths {
        println!("  {:>8} {}", label.cyan(), path.display());
    }
}

fn status_label(status: &TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Succeeded { up_to_date: true } => "UP-TO-DATE".blue().bold(),
        TaskStatus::Succeeded { up_to_date: false } => "OK".green().bold(),
        TaskStatus::Failed { .. } => "FAILED".red().bold(),
        TaskStatus::Skipped { .. } => "SKIPPED".yellow().bold(),
        TaskStatus::Pending | TaskStatus::Running => "PENDING".normal(),
    }
}

fn suite_label(result: &SuiteResult) -> ColoredString {
    if result.is_success() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    }
}
