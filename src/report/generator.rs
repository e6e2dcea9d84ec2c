//! Markdown and JSON report generation.
//!
//! These formats are built in code; the template path lives in
//! [`super::template`].

use crate::analysis::{top_projects, totals_by_kind};
use crate::models::{Contribution, Report, ReportMetadata, SourceWarning};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Contributions Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.contributions));
    output.push_str(&generate_projects_section(&report.contributions));
    output.push_str(&generate_warnings_section(&report.warnings));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Identities:** {}\n", metadata.identities));
    section.push_str(&format!("- **Projects:** {}\n", metadata.projects));
    section.push_str(&format!(
        "- **Total Contributions:** {}\n",
        metadata.total
    ));
    section.push_str(&format!(
        "- **Scan Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    if metadata.cancelled {
        section.push_str("- **Incomplete:** the scan was cancelled before every project finished\n");
    }
    section.push('\n');

    section
}

fn generate_summary_section(contributions: &[Contribution]) -> String {
    let totals = totals_by_kind(contributions);
    if totals.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Summary\n\n");

    section.push_str("### By Source\n\n");
    section.push_str("| Source | Contributions |\n");
    section.push_str("|:---|---:|\n");
    for (kind, count) in &totals {
        section.push_str(&format!("| {} | {} |\n", kind, count));
    }
    section.push('\n');

    let top = top_projects(contributions, 5);
    if !top.is_empty() {
        section.push_str("### Most Active Projects\n\n");
        for (i, contribution) in top.iter().enumerate() {
            section.push_str(&format!(
                "{}. {} ({})\n",
                i + 1,
                contribution.name,
                contribution.count
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_projects_section(contributions: &[Contribution]) -> String {
    let mut section = String::new();

    section.push_str("## Projects\n\n");

    if contributions.is_empty() {
        section.push_str("No projects configured.\n\n");
        return section;
    }

    section.push_str("| Project | Description | Contributions |\n");
    section.push_str("|:---|:---|---:|\n");
    for contribution in contributions {
        let name = if contribution.url.is_empty() {
            table_cell(&contribution.name)
        } else {
            format!(
                "[{}]({})",
                table_cell(&contribution.name),
                table_cell(&contribution.url)
            )
        };
        let marker = if contribution.complete { "" } else { " (incomplete)" };
        section.push_str(&format!(
            "| {} | {} | {}{} |\n",
            name,
            table_cell(&contribution.description),
            contribution.count,
            marker
        ));
    }
    section.push('\n');

    for contribution in contributions.iter().filter(|c| c.sources.len() > 1) {
        section.push_str(&format!("### {}\n\n", contribution.name));
        for tally in &contribution.sources {
            let failed = if tally.failed { " (failed)" } else { "" };
            section.push_str(&format!("- `{}`: {}{}\n", tally.source, tally.count, failed));
        }
        section.push('\n');
    }

    section
}

/// Keep free text from splitting a table row.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn generate_warnings_section(warnings: &[SourceWarning]) -> String {
    if warnings.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Warnings\n\n");
    for warning in warnings {
        section.push_str(&format!("- {}\n", warning));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by contrib-lister*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
