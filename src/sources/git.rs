//! Repository-log adapter: counts commits authored by the identities.

use super::{Source, SourceAdapter};
use crate::error::SourceError;
use crate::models::Identities;
use crate::repo::{self, CloneLimits};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GitLogAdapter {
    clone_timeout: Duration,
}

impl Default for GitLogAdapter {
    fn default() -> Self {
        Self {
            clone_timeout: repo::GIT_TIMEOUT,
        }
    }
}

impl GitLogAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a repository (clone plus history walk) after `timeout`.
    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }
}

/// Cancels the clone when the waiting query goes away, e.g. on scan abort.
struct CancelOnDrop(CloneLimits);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[async_trait]
impl SourceAdapter for GitLogAdapter {
    async fn count(&self, source: &Source, identities: &Identities) -> Result<u64, SourceError> {
        let Source::Git(location) = source else {
            return Err(SourceError::Unsupported(source.kind().as_str()));
        };

        let limits = CloneLimits::new(self.clone_timeout);
        let _guard = CancelOnDrop(limits.clone());

        let location = location.clone();
        let identities = identities.clone();

        // libgit2 is blocking; a clone can take minutes
        let task = tokio::task::spawn_blocking({
            let location = location.clone();
            move || -> Result<u64, SourceError> {
                let materialized = repo::materialize(&location, &limits)?;
                if materialized.is_temporary() {
                    debug!("{}: cloned to {}", location, materialized.path.display());
                }
                let count = repo::count_commits_by(&materialized.repo, &identities)?;
                debug!("{}: {} matching commits", location, count);
                Ok(count)
            }
        });

        match tokio::time::timeout(self.clone_timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| SourceError::Unreachable(format!("repository read aborted: {}", e)))?,
            Err(_) => {
                warn!(
                    "{}: no result after {}s, abandoning",
                    location,
                    self.clone_timeout.as_secs()
                );
                Err(SourceError::Unreachable(format!(
                    "{} did not finish within {}s",
                    location,
                    self.clone_timeout.as_secs()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaWiki;
    use crate::repo::test_support::init_repo_with_authors;

    fn git(dir: &tempfile::TempDir) -> Source {
        Source::Git(dir.path().display().to_string())
    }

    #[tokio::test]
    async fn test_counts_local_repository() {
        let dir = init_repo_with_authors(&[("a@x.com", 3), ("b@y.com", 2)]);
        let ids = Identities::new(["a@x.com"]);
        let count = GitLogAdapter::new().count(&git(&dir), &ids).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_counts_cloned_repository() {
        let dir = init_repo_with_authors(&[("a@x.com", 4), ("b@y.com", 1)]);
        let source = Source::Git(format!("file://{}", dir.path().display()));
        let ids = Identities::new(["a@x.com", "b@y.com"]);
        let count = GitLogAdapter::new().count(&source, &ids).await.unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_missing_repository_is_unreachable() {
        let source = Source::Git("/nonexistent/contrib-lister/repo".to_string());
        let ids = Identities::new(["a@x.com"]);
        let err = GitLogAdapter::new().count(&source, &ids).await.unwrap_err();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_silent_remote_times_out() {
        // Accepts connections and never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                held.push(stream);
            }
        });

        repo::set_network_timeouts(Duration::from_secs(2));
        let adapter = GitLogAdapter::new().with_clone_timeout(Duration::from_secs(2));
        let source = Source::Git(format!("http://127.0.0.1:{}/repo.git", port));
        let ids = Identities::new(["a@x.com"]);

        let result = tokio::time::timeout(Duration::from_secs(30), adapter.count(&source, &ids))
            .await
            .expect("git count must not hang on a silent server");
        assert!(matches!(result, Err(SourceError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_rejects_other_kinds() {
        let source = Source::MediaWiki(MediaWiki {
            base_url: "https://wiki.example.org".to_string(),
            user: "jdoe".to_string(),
        });
        let err = GitLogAdapter::new()
            .count(&source, &Identities::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unsupported("wiki")));
    }
}
