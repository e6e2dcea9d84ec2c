//! Per-project aggregation.
//!
//! A [`ProjectAggregator`] queries every source attached to a project and
//! folds the answers into one [`Contribution`]. Failing sources count zero
//! and leave a warning; aggregation itself never fails.

use crate::config::Project;
use crate::error::SourceError;
use crate::models::{Contribution, Identities, SourceTally, SourceWarning, WarningKind};
use crate::sources::{Source, SourceAdapter};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Contribution of one project plus the warnings its sources produced.
#[derive(Debug, Clone)]
pub struct ProjectTally {
    pub contribution: Contribution,
    pub warnings: Vec<SourceWarning>,
}

/// Drives all sources of one project.
#[derive(Clone)]
pub struct ProjectAggregator {
    adapter: Arc<dyn SourceAdapter>,
    limit: Arc<Semaphore>,
}

impl ProjectAggregator {
    /// `limit` gates outbound queries and is usually shared by all projects.
    pub fn new(adapter: Arc<dyn SourceAdapter>, limit: Arc<Semaphore>) -> Self {
        Self { adapter, limit }
    }

    /// Query every source of `project` concurrently and sum the answers.
    pub async fn aggregate(&self, project: &Project, identities: &Identities) -> ProjectTally {
        let sources = Source::all_of(project);
        debug!("{}: querying {} sources", project.name, sources.len());

        let results = join_all(sources.iter().map(|source| self.query(source, identities))).await;

        fold(project, sources.into_iter().zip(results))
    }

    async fn query(&self, source: &Source, identities: &Identities) -> Result<u64, SourceError> {
        let _permit = self
            .limit
            .acquire()
            .await
            .map_err(|_| SourceError::Unreachable("scan is shutting down".to_string()))?;
        self.adapter.count(source, identities).await
    }
}

/// Fold per-source results into a contribution. Failed sources add 0.
pub fn fold<I>(project: &Project, results: I) -> ProjectTally
where
    I: IntoIterator<Item = (Source, Result<u64, SourceError>)>,
{
    let mut count = 0u64;
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    for (source, result) in results {
        let label = source.to_string();
        let kind = source.kind().as_str().to_string();

        match result {
            Ok(n) => {
                count += n;
                sources.push(SourceTally {
                    kind,
                    source: label,
                    count: n,
                    failed: false,
                });
            }
            Err(err) => {
                warn!("{}: {} failed: {}", project.name, label, err);
                warnings.push(SourceWarning {
                    project: project.name.clone(),
                    source: Some(label.clone()),
                    kind: warning_kind(&err),
                    message: err.to_string(),
                });
                sources.push(SourceTally {
                    kind,
                    source: label,
                    count: 0,
                    failed: true,
                });
            }
        }
    }

    ProjectTally {
        contribution: Contribution {
            name: project.name.clone(),
            description: project.description.clone(),
            url: project.url.clone(),
            count,
            sources,
            complete: true,
        },
        warnings,
    }
}

fn warning_kind(err: &SourceError) -> WarningKind {
    match err {
        SourceError::Unreachable(_) => WarningKind::Unreachable,
        SourceError::Malformed(_) => WarningKind::Malformed,
        SourceError::Unsupported(_) => WarningKind::Internal,
    }
}

/// Contribution with zero count, used for projects that never finished.
pub fn placeholder(project: &Project) -> Contribution {
    Contribution {
        name: project.name.clone(),
        description: project.description.clone(),
        url: project.url.clone(),
        count: 0,
        sources: Vec::new(),
        complete: false,
    }
}

/// Total count per backend kind over all contributions.
pub fn totals_by_kind(contributions: &[Contribution]) -> BTreeMap<String, u64> {
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();

    for tally in contributions.iter().flat_map(|c| &c.sources) {
        *totals.entry(tally.kind.clone()).or_default() += tally.count;
    }

    totals
}

/// Projects sorted by count (highest first), ties keep configuration order.
pub fn top_projects(contributions: &[Contribution], n: usize) -> Vec<&Contribution> {
    let mut sorted: Vec<&Contribution> = contributions.iter().filter(|c| c.count > 0).collect();
    sorted.sort_by_key(|c| std::cmp::Reverse(c.count));
    sorted.truncate(n);
    sorted
}
