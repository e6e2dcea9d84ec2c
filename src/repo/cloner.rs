//! Making repositories locally readable.
//!
//! Local paths are opened in place. Remote URLs are cloned bare with git2
//! into a temporary directory that lives as long as the returned handle.
//! A clone stops at its deadline or when its [`CloneLimits`] is cancelled.

use crate::error::SourceError;
use git2::{Cred, CredentialType, FetchOptions, Progress, RemoteCallbacks, Repository};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

/// Default upper bound for one clone.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

static NETWORK_TIMEOUTS: Once = Once::new();

/// Make libgit2 give up on servers that stop answering.
///
/// The options are process-wide, so only the first call has an effect.
pub fn set_network_timeouts(timeout: Duration) {
    NETWORK_TIMEOUTS.call_once(|| {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1);
        // SAFETY: runs once, before any clone is started by this process.
        let result = unsafe {
            git2::opts::set_server_connect_timeout_in_milliseconds(millis)
                .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
        };
        if let Err(e) = result {
            warn!("Failed to set git network timeouts: {}", e.message());
        }
    });
}

/// Deadline and cancel flag shared between a clone and whoever waits on it.
#[derive(Debug, Clone)]
pub struct CloneLimits {
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

impl CloneLimits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask a running clone to stop at its next callback.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }
}

/// Where a configured repository lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLocation {
    /// A path on this machine.
    Local(PathBuf),
    /// Something git has to fetch first.
    Remote(String),
}

impl RepoLocation {
    /// Classify a `Gitrepos` entry.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        let is_remote = Url::parse(location)
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https" | "git" | "ssh" | "file"))
            || is_scp_like(location);

        if is_remote {
            RepoLocation::Remote(location.to_string())
        } else {
            RepoLocation::Local(PathBuf::from(location))
        }
    }
}

/// `user@host:path`, the scp-like syntax git accepts for ssh.
fn is_scp_like(location: &str) -> bool {
    match (location.find('@'), location.find(':')) {
        (Some(at), Some(colon)) => at < colon && !location[..colon].contains('/'),
        _ => false,
    }
}

/// A repository ready for history reads.
pub struct MaterializedRepo {
    pub repo: Repository,
    /// Path to the repository.
    pub path: PathBuf,
    /// Keeps a cloned checkout alive; dropped (and deleted) with the handle.
    temp_dir: Option<TempDir>,
}

impl MaterializedRepo {
    /// True when the repository was cloned for this query.
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }
}

/// Open or clone the repository behind a `Gitrepos` entry.
///
/// Blocking; call from the blocking pool.
pub fn materialize(location: &str, limits: &CloneLimits) -> Result<MaterializedRepo, SourceError> {
    match RepoLocation::parse(location) {
        RepoLocation::Local(path) => open_local_repository(&path),
        RepoLocation::Remote(url) => clone_repository(&url, limits),
    }
}

/// Open an existing local repository.
pub fn open_local_repository(path: &Path) -> Result<MaterializedRepo, SourceError> {
    debug!("Opening local repository: {}", path.display());

    if !path.exists() {
        return Err(SourceError::Unreachable(format!(
            "repository path does not exist: {}",
            path.display()
        )));
    }

    let repo = Repository::open(path).map_err(|e| {
        SourceError::Unreachable(format!("{}: {}", path.display(), e.message()))
    })?;

    Ok(MaterializedRepo {
        repo,
        path: path.to_path_buf(),
        temp_dir: None,
    })
}

/// Clone the history of a remote repository into a temp dir, without a working tree.
pub fn clone_repository(url: &str, limits: &CloneLimits) -> Result<MaterializedRepo, SourceError> {
    if limits.should_stop() {
        return Err(stopped(url));
    }
    info!("Cloning repository: {}", url);

    let temp = TempDir::new()
        .map_err(|e| SourceError::Unreachable(format!("cannot create temp dir: {}", e)))?;
    let path = temp.path().join("repo");

    let mut callbacks = RemoteCallbacks::new();

    // Returning false from a progress callback aborts the clone
    let progress_limits = limits.clone();
    let clone_url = url.to_string();
    callbacks.transfer_progress(move |progress: Progress<'_>| {
        if progress_limits.should_stop() {
            return false;
        }
        if progress.received_objects() == progress.total_objects() {
            debug!(
                "{}: received {} objects",
                clone_url,
                progress.total_objects()
            );
        }
        true
    });
    let sideband_limits = limits.clone();
    callbacks.sideband_progress(move |_| !sideband_limits.should_stop());

    // libgit2 calls this again after every rejected credential
    let credential_limits = limits.clone();
    let mut attempts = 0;
    callbacks.credentials(move |_url, username, allowed| {
        if credential_limits.should_stop() {
            return Err(git2::Error::from_str("clone cancelled"));
        }
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::from_str("authentication required"));
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            Cred::ssh_key_from_agent(username.unwrap_or("git"))
        } else {
            Cred::default()
        }
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);

    let mut builder = git2::build::RepoBuilder::new();
    builder.bare(true).fetch_options(fetch_opts);

    let repo = builder.clone(url, &path).map_err(|e| {
        if limits.should_stop() {
            stopped(url)
        } else {
            SourceError::Unreachable(format!("failed to clone {}: {}", url, e.message()))
        }
    })?;

    debug!("Cloned {} to {}", url, path.display());

    Ok(MaterializedRepo {
        repo,
        path,
        temp_dir: Some(temp),
    })
}

fn stopped(url: &str) -> SourceError {
    SourceError::Unreachable(format!("clone of {} cancelled or timed out", url))
}
