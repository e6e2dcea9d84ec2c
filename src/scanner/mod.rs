//! Contribution scanner.
//!
//! Runs one task per project, gates all outbound source queries behind a
//! shared semaphore, and collects results into slots indexed by project
//! position so the output order never depends on completion order.

use crate::analysis::{placeholder, ProjectAggregator, ProjectTally};
use crate::config::Configuration;
use crate::models::{Contribution, Identities, ScanOutcome, SourceWarning, WarningKind};
use crate::sources::SourceAdapter;
use futures::FutureExt;
use indicatif::ProgressBar;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Scans every configured project.
pub struct ContributionScanner {
    adapter: Arc<dyn SourceAdapter>,
    concurrency: usize,
    progress: Option<ProgressBar>,
}

impl ContributionScanner {
    /// `concurrency` bounds the number of source queries in flight.
    pub fn new(adapter: Arc<dyn SourceAdapter>, concurrency: usize) -> Self {
        Self {
            adapter,
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    /// Advance `progress` once per finished project.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scan all projects, honouring `Settings.TimeoutSeconds` when set.
    #[allow(dead_code)] // The binary scans through scan_until to handle Ctrl-C
    pub async fn scan(&self, config: &Configuration) -> ScanOutcome {
        self.scan_until(config, std::future::pending::<()>()).await
    }

    /// Scan all projects until they finish, `cancel` resolves, or the
    /// configured deadline passes.
    ///
    /// On cancellation every in-flight query is aborted; projects that had
    /// not finished are returned with a zero count, `complete == false` and
    /// a `Cancelled` warning.
    pub async fn scan_until<F>(&self, config: &Configuration, cancel: F) -> ScanOutcome
    where
        F: Future<Output = ()>,
    {
        let deadline = config.settings.timeout_seconds.map(Duration::from_secs);
        let cancel = async move {
            let expired = async {
                match deadline {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = cancel => debug!("Scan cancelled by caller"),
                _ = expired => warn!("Scan deadline reached"),
            }
        };

        let projects = &config.projects;
        let identities = Arc::new(Identities::new(config.emails.iter().cloned()));
        let limit = Arc::new(Semaphore::new(self.concurrency));
        let aggregator = ProjectAggregator::new(self.adapter.clone(), limit.clone());

        info!(
            "Scanning {} projects for {} identities (concurrency {})",
            projects.len(),
            identities.len(),
            self.concurrency
        );

        let mut slots: Vec<Option<ProjectTally>> = vec![None; projects.len()];
        let mut tasks = JoinSet::new();

        for (index, project) in projects.iter().enumerate() {
            let aggregator = aggregator.clone();
            let identities = identities.clone();
            let project = project.clone();

            tasks.spawn(async move {
                let result = AssertUnwindSafe(aggregator.aggregate(&project, &identities))
                    .catch_unwind()
                    .await;
                (index, result)
            });
        }

        tokio::pin!(cancel);
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok(tally)))) => {
                        debug!("{}: {} contributions", tally.contribution.name, tally.contribution.count);
                        slots[index] = Some(tally);
                        self.tick();
                    }
                    Some(Ok((index, Err(_panic)))) => {
                        let project = &projects[index];
                        error!("{}: aggregation panicked", project.name);
                        slots[index] = Some(ProjectTally {
                            contribution: placeholder(project),
                            warnings: vec![SourceWarning {
                                project: project.name.clone(),
                                source: None,
                                kind: WarningKind::Internal,
                                message: "aggregation panicked".to_string(),
                            }],
                        });
                        self.tick();
                    }
                    Some(Err(err)) => {
                        error!("project task failed: {}", err);
                    }
                },

                _ = &mut cancel => {
                    warn!("Scan cancelled, aborting {} running projects", tasks.len());
                    cancelled = true;
                    limit.close();
                    tasks.abort_all();
                    break;
                }
            }
        }

        if let Some(ref progress) = self.progress {
            progress.finish_and_clear();
        }

        let mut contributions: Vec<Contribution> = Vec::with_capacity(projects.len());
        let mut warnings: Vec<SourceWarning> = Vec::new();

        for (project, slot) in projects.iter().zip(slots) {
            match slot {
                Some(tally) => {
                    contributions.push(tally.contribution);
                    warnings.extend(tally.warnings);
                }
                None => {
                    let (kind, message) = if cancelled {
                        (WarningKind::Cancelled, "scan cancelled before project finished")
                    } else {
                        (WarningKind::Internal, "project task did not finish")
                    };
                    warn!("{}: {}", project.name, message);
                    contributions.push(placeholder(project));
                    warnings.push(SourceWarning {
                        project: project.name.clone(),
                        source: None,
                        kind,
                        message: message.to_string(),
                    });
                }
            }
        }

        ScanOutcome {
            contributions,
            warnings,
            cancelled,
        }
    }

    fn tick(&self) {
        if let Some(ref progress) = self.progress {
            progress.inc(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MediaWiki, Project};
    use crate::repo::test_support::init_repo_with_authors;
    use crate::sources::test_support::{Scripted, ScriptedAdapter};
    use crate::sources::{AdapterSet, GitLogAdapter, MediaWikiAdapter, SourceKind};
    use serde_json::json;
    use wiremock::matchers::{method, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project(name: &str, gitrepos: &[&str]) -> Project {
        Project {
            name: name.to_string(),
            gitrepos: gitrepos.iter().map(|s| s.to_string()).collect(),
            ..Project::default()
        }
    }

    fn config(projects: Vec<Project>) -> Configuration {
        Configuration {
            emails: vec!["a@x.com".to_string()],
            projects,
            ..Configuration::default()
        }
    }

    fn names(outcome: &ScanOutcome) -> Vec<&str> {
        outcome
            .contributions
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_output_matches_project_order() {
        let projects: Vec<Project> = (0..6)
            .map(|i| project(&format!("p{}", i), &[&format!("/r{}", i)]))
            .collect();
        let adapter = (0..6).fold(
            ScriptedAdapter::new().with_delay(Duration::from_millis(5)),
            |a, i| a.on(&format!("git /r{}", i), Scripted::Count(10 - i)),
        );

        let outcome = ContributionScanner::new(Arc::new(adapter), 2)
            .scan(&config(projects))
            .await;

        assert_eq!(names(&outcome), vec!["p0", "p1", "p2", "p3", "p4", "p5"]);
        let counts: Vec<u64> = outcome.contributions.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![10, 9, 8, 7, 6, 5]);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_empty_configuration() {
        let outcome = ContributionScanner::new(Arc::new(ScriptedAdapter::new()), 4)
            .scan(&Configuration::default())
            .await;
        assert!(outcome.contributions.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_project_without_sources_is_reported() {
        let outcome = ContributionScanner::new(Arc::new(ScriptedAdapter::new()), 4)
            .scan(&config(vec![project("bare", &[])]))
            .await;
        assert_eq!(outcome.contributions.len(), 1);
        assert_eq!(outcome.contributions[0].count, 0);
        assert!(outcome.contributions[0].complete);
    }

    #[tokio::test]
    async fn test_failing_sources_do_not_sink_other_projects() {
        let adapter = ScriptedAdapter::new()
            .on("git /ok", Scripted::Count(4))
            .on("git /down1", Scripted::Unreachable)
            .on("git /down2", Scripted::Malformed);

        let outcome = ContributionScanner::new(Arc::new(adapter), 4)
            .scan(&config(vec![
                project("broken", &["/down1", "/down2"]),
                project("fine", &["/ok"]),
            ]))
            .await;

        assert_eq!(outcome.contributions[0].count, 0);
        assert_eq!(outcome.contributions[1].count, 4);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings.iter().all(|w| w.project == "broken"));
    }

    #[tokio::test]
    async fn test_scan_is_idempotent() {
        let adapter = Arc::new(
            ScriptedAdapter::new()
                .on("git /a", Scripted::Count(2))
                .on("git /b", Scripted::Unreachable),
        );
        let scanner = ContributionScanner::new(adapter, 3);
        let cfg = config(vec![project("a", &["/a", "/b"]), project("b", &["/b"])]);

        let first = scanner.scan(&cfg).await;
        let second = scanner.scan(&cfg).await;
        assert_eq!(first.contributions, second.contributions);
        assert_eq!(first.warnings, second.warnings);
    }

    #[tokio::test]
    async fn test_panicking_project_is_isolated() {
        let adapter = ScriptedAdapter::new()
            .on("git /boom", Scripted::Panic)
            .on("git /ok", Scripted::Count(1));

        let outcome = ContributionScanner::new(Arc::new(adapter), 4)
            .scan(&config(vec![project("boom", &["/boom"]), project("ok", &["/ok"])]))
            .await;

        assert_eq!(names(&outcome), vec!["boom", "ok"]);
        assert_eq!(outcome.contributions[0].count, 0);
        assert_eq!(outcome.contributions[1].count, 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::Internal);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_results() {
        let adapter = ScriptedAdapter::new()
            .on("git /fast", Scripted::Count(7))
            .on("git /stuck", Scripted::Hang);

        let outcome = ContributionScanner::new(Arc::new(adapter), 4)
            .scan_until(
                &config(vec![project("stuck", &["/stuck"]), project("fast", &["/fast"])]),
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(names(&outcome), vec!["stuck", "fast"]);
        assert!(!outcome.contributions[0].complete);
        assert_eq!(outcome.contributions[0].count, 0);
        assert!(outcome.contributions[1].complete);
        assert_eq!(outcome.contributions[1].count, 7);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::Cancelled);
        assert_eq!(outcome.incomplete_projects(), vec!["stuck"]);
    }

    #[tokio::test]
    async fn test_configured_timeout_stops_scan() {
        let adapter = ScriptedAdapter::new().on("git /stuck", Scripted::Hang);
        let mut cfg = config(vec![project("stuck", &["/stuck"])]);
        cfg.settings.timeout_seconds = Some(1);

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            ContributionScanner::new(Arc::new(adapter), 1).scan(&cfg),
        )
        .await
        .expect("scan must not hang");

        assert!(outcome.cancelled);
        assert_eq!(outcome.contributions.len(), 1);
    }

    fn git_adapter() -> Arc<dyn SourceAdapter> {
        Arc::new(AdapterSet::new().with(SourceKind::Git, Arc::new(GitLogAdapter::new())))
    }

    #[tokio::test]
    async fn test_two_repositories_sum() {
        let repo1 = init_repo_with_authors(&[("a@x.com", 3), ("b@y.com", 2)]);
        let repo2 = init_repo_with_authors(&[("a@x.com", 5)]);
        let r1 = repo1.path().display().to_string();
        let r2 = repo2.path().display().to_string();

        let outcome = ContributionScanner::new(git_adapter(), 4)
            .scan(&config(vec![project("p", &[&r1, &r2])]))
            .await;

        assert_eq!(outcome.contributions[0].count, 8);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_repository_is_warned() {
        let repo1 = init_repo_with_authors(&[("a@x.com", 3), ("b@y.com", 2)]);
        let r1 = repo1.path().display().to_string();
        let r2 = "/nonexistent/contrib-lister/repo2";

        let outcome = ContributionScanner::new(git_adapter(), 4)
            .scan(&config(vec![project("p", &[&r1, r2])]))
            .await;

        assert_eq!(outcome.contributions[0].count, 3);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0].source.as_deref(),
            Some("git /nonexistent/contrib-lister/repo2")
        );
        assert_eq!(outcome.warnings[0].kind, WarningKind::Unreachable);
    }

    #[tokio::test]
    async fn test_git_and_wiki_sources_combine() {
        let server = MockServer::start().await;
        let contribs = |n: usize| -> Vec<serde_json::Value> {
            (0..n).map(|_| json!({"user": "jdoe"})).collect()
        };
        Mock::given(method("GET"))
            .and(query_param_is_missing("uccontinue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "continue": {"uccontinue": "next", "continue": "-||"},
                "query": {"usercontribs": contribs(5)}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("uccontinue", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"usercontribs": contribs(2)}
            })))
            .mount(&server)
            .await;

        let repo = init_repo_with_authors(&[("a@x.com", 4)]);
        let mut p = project("Funtoo", &[&repo.path().display().to_string()]);
        p.media_wikis.push(MediaWiki {
            base_url: server.uri(),
            user: "jdoe".to_string(),
        });

        let adapters = AdapterSet::new()
            .with(SourceKind::Git, Arc::new(GitLogAdapter::new()))
            .with(
                SourceKind::MediaWiki,
                Arc::new(MediaWikiAdapter::new(reqwest::Client::new(), 5)),
            );

        let outcome = ContributionScanner::new(Arc::new(adapters), 2)
            .scan(&config(vec![p]))
            .await;

        assert_eq!(outcome.contributions[0].count, 11);
        assert_eq!(outcome.contributions[0].sources.len(), 2);
    }
}
