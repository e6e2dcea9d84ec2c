//! Data models shared by the scanner and the report stage.
//!
//! Contributions are built once per run and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of identity strings (e-mails, usernames) that belong to one person.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identities(BTreeSet<String>);

impl Identities {
    /// Build the set from configured identity strings. Duplicates collapse.
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(identities.into_iter().map(Into::into).collect())
    }

    /// Returns true if `candidate` is exactly one of the identities.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.contains(candidate)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Why a source did not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    /// Network or process failure reaching the backend.
    Unreachable,
    /// The backend returned data that could not be parsed.
    Malformed,
    /// The scan was cancelled or timed out before this finished.
    Cancelled,
    /// Anything else (no adapter, crashed aggregation).
    Internal,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::Unreachable => write!(f, "unreachable"),
            WarningKind::Malformed => write!(f, "malformed"),
            WarningKind::Cancelled => write!(f, "cancelled"),
            WarningKind::Internal => write!(f, "internal"),
        }
    }
}

/// A non-fatal problem with one source (or one project) during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWarning {
    /// Project the source belongs to.
    pub project: String,
    /// Label of the failing source, or `None` when the whole project is affected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(
                f,
                "[{}] {} ({}): {}",
                self.project, source, self.kind, self.message
            ),
            None => write!(f, "[{}] ({}): {}", self.project, self.kind, self.message),
        }
    }
}

/// Count obtained from a single source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceTally {
    /// Backend kind: `git`, `wiki` or `obs`.
    pub kind: String,
    /// Human-readable source label, e.g. `git https://example.org/repo`.
    pub source: String,
    pub count: u64,
    /// The source failed and contributed zero.
    pub failed: bool,
}

/// Aggregated contributions for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contribution {
    pub name: String,
    pub description: String,
    #[serde(rename = "URL")]
    pub url: String,
    /// Sum of all source tallies.
    pub count: u64,
    /// Per-source breakdown, in configuration order.
    pub sources: Vec<SourceTally>,
    /// False when aggregation did not finish (scan cancelled, task crashed).
    pub complete: bool,
}

/// Result of a full scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// One entry per configured project, in configuration order.
    pub contributions: Vec<Contribution>,
    pub warnings: Vec<SourceWarning>,
    /// True when cancellation or the deadline stopped the scan early.
    pub cancelled: bool,
}

impl ScanOutcome {
    /// Total contributions over all projects.
    pub fn total(&self) -> u64 {
        self.contributions.iter().map(|c| c.count).sum()
    }

    /// Names of projects that did not finish.
    pub fn incomplete_projects(&self) -> Vec<&str> {
        self.contributions
            .iter()
            .filter(|c| !c.complete)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Metadata about one report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of configured identity strings.
    pub identities: usize,
    /// Number of configured projects.
    pub projects: usize,
    /// Total contributions over all projects.
    pub total: u64,
    /// Duration of the scan in seconds.
    pub duration_seconds: f64,
    /// The scan stopped early.
    pub cancelled: bool,
}

/// Everything the report stage needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub contributions: Vec<Contribution>,
    pub warnings: Vec<SourceWarning>,
}

impl Report {
    /// Wrap a finished scan.
    pub fn new(outcome: ScanOutcome, identities: usize, duration_seconds: f64) -> Self {
        let metadata = ReportMetadata {
            generated_at: Utc::now(),
            identities,
            projects: outcome.contributions.len(),
            total: outcome.total(),
            duration_seconds,
            cancelled: outcome.cancelled,
        };

        Self {
            metadata,
            contributions: outcome.contributions,
            warnings: outcome.warnings,
        }
    }
}
