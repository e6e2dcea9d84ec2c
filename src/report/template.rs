//! Template loading and rendering.
//!
//! Templates are plain text with `{{Key}}` placeholders and one or more
//! `{{#Contributions}} ... {{/Contributions}}` blocks repeated per project.
//! Inside a block `Name`, `Description`, `URL` and `Count` refer to the
//! current project; `Total`, `Projects`, `Warnings` and `Generated` are
//! available everywhere. Unknown placeholders render empty.

use crate::models::{Contribution, Report};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const BLOCK_OPEN: &str = "{{#Contributions}}";
const BLOCK_CLOSE: &str = "{{/Contributions}}";

/// Templates compiled into the binary.
const BUNDLED: &[(&str, &str)] = &[
    ("default.html", include_str!("../../templates/default.html")),
    ("default.md", include_str!("../../templates/default.md")),
];

/// Load `name` from `templates_path` when given, otherwise from the bundled set.
pub fn load_template(name: &str, templates_path: Option<&Path>) -> Result<String> {
    if let Some(dir) = templates_path {
        let path = dir.join(name);
        if !path.is_file() {
            bail!("Template file {} does not exist", path.display());
        }
        debug!("Using template {}", path.display());
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()));
    }

    BUNDLED
        .iter()
        .find(|(bundled, _)| *bundled == name)
        .map(|(_, content)| content.to_string())
        .with_context(|| {
            format!(
                "No bundled template named '{}' (available: {})",
                name,
                bundled_names().join(", ")
            )
        })
}

/// Names of the bundled templates.
pub fn bundled_names() -> Vec<&'static str> {
    BUNDLED.iter().map(|(name, _)| *name).collect()
}

/// Template files below `dir`, as paths relative to it, sorted.
pub fn user_templates(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry =
            entry.with_context(|| format!("Failed to list templates in {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        names.push(relative.to_string_lossy().to_string());
    }

    names.sort();
    Ok(names)
}

/// Escape values for HTML templates.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// True for template names whose values need HTML escaping.
pub fn is_html(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Render `template` against `report`.
pub fn render(template: &str, report: &Report, html: bool) -> Result<String> {
    let escape = |value: String| if html { escape_html(&value) } else { value };
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find(BLOCK_OPEN) {
        output.push_str(&substitute(&rest[..open], |key| {
            report_value(report, key).map(escape)
        }));

        let after_open = strip_newline(&rest[open + BLOCK_OPEN.len()..]);
        let Some(close) = after_open.find(BLOCK_CLOSE) else {
            bail!("Template has {} without a matching {}", BLOCK_OPEN, BLOCK_CLOSE);
        };
        let body = &after_open[..close];

        for contribution in &report.contributions {
            output.push_str(&substitute(body, |key| {
                contribution_value(contribution, key)
                    .or_else(|| report_value(report, key))
                    .map(escape)
            }));
        }

        rest = strip_newline(&after_open[close + BLOCK_CLOSE.len()..]);
    }

    if rest.contains(BLOCK_CLOSE) {
        bail!("Template has {} without a matching {}", BLOCK_CLOSE, BLOCK_OPEN);
    }

    output.push_str(&substitute(rest, |key| report_value(report, key).map(escape)));
    Ok(output)
}

fn strip_newline(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

fn contribution_value(contribution: &Contribution, key: &str) -> Option<String> {
    match key {
        "Name" => Some(contribution.name.clone()),
        "Description" => Some(contribution.description.clone()),
        "URL" => Some(contribution.url.clone()),
        "Count" => Some(contribution.count.to_string()),
        _ => None,
    }
}

fn report_value(report: &Report, key: &str) -> Option<String> {
    match key {
        "Total" => Some(report.metadata.total.to_string()),
        "Projects" => Some(report.metadata.projects.to_string()),
        "Warnings" => Some(report.warnings.len().to_string()),
        "Generated" => Some(
            report
                .metadata
                .generated_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
        ),
        _ => None,
    }
}

/// Replace every `{{Key}}` in `text` using `lookup`.
fn substitute<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                output.push_str(&lookup(key).unwrap_or_default());
                rest = &after[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}
