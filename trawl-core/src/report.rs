// Run summaries for the terminal

use crate::error::CoreError;
use crate::extract::RunSummary;
use colored::Colorize;

pub fn generate_run_report(summary: &RunSummary) -> String {
    let mut report = String::new();

    report.push_str(&format!("\n{}\n", "Run summary".bold()));
    report.push_str(&format!("  {:<12} {}\n", "Source:", summary.category.cyan()));
    report.push_str(&format!(
        "  {:<12} {}\n",
        "Directories:", summary.directories
    ));
    report.push_str(&format!(
        "  {:<12} {}\n",
        "Written:",
        summary.written.to_string().green()
    ));
    if summary.archived > 0 {
        report.push_str(&format!(
            "  {:<12} {}\n",
            "Archived:",
            summary.archived.to_string().yellow()
        ));
    }
    report.push_str(&format!("  {:<12} {:.1}s\n", "Elapsed:", summary.elapsed_secs));

    report
}

/// The message printed when a run aborts. Access failures carry their own resume hint.
pub fn generate_abort_report(error: &CoreError) -> String {
    format!("{} {}\n", "[!]".red().bold(), error)
}
