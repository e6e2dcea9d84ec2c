//! Source adapters.
//!
//! Every backend kind implements [`SourceAdapter`]: given one source
//! instance and the identity set, produce a count. The aggregator only
//! sees the trait, so adding a backend means adding an adapter and a
//! [`Source`] variant, nothing else.

pub mod git;
pub mod mediawiki;
pub mod obs;

use crate::config::{MediaWiki, OpenBuildService, Project, Settings};
use crate::error::SourceError;
use crate::models::Identities;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use git::GitLogAdapter;
pub use mediawiki::MediaWikiAdapter;
pub use obs::ObsAdapter;

/// Backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Git,
    MediaWiki,
    Obs,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Git => "git",
            SourceKind::MediaWiki => "wiki",
            SourceKind::Obs => "obs",
        }
    }
}

/// One concrete source instance attached to a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Git(String),
    MediaWiki(MediaWiki),
    Obs(OpenBuildService),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Git(_) => SourceKind::Git,
            Source::MediaWiki(_) => SourceKind::MediaWiki,
            Source::Obs(_) => SourceKind::Obs,
        }
    }

    /// Every source of a project: git repositories, then wikis, then build-service packages.
    pub fn all_of(project: &Project) -> Vec<Source> {
        project
            .gitrepos
            .iter()
            .cloned()
            .map(Source::Git)
            .chain(project.media_wikis.iter().cloned().map(Source::MediaWiki))
            .chain(project.obs.iter().cloned().map(Source::Obs))
            .collect()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Git(location) => write!(f, "git {}", location),
            Source::MediaWiki(wiki) => write!(f, "wiki {} ({})", wiki.base_url, wiki.user),
            Source::Obs(obs) => write!(f, "obs {} {}", obs.apiurl, obs.repo),
        }
    }
}

/// The capability every backend provides.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Count the activity in `source` attributable to `identities`.
    async fn count(&self, source: &Source, identities: &Identities) -> Result<u64, SourceError>;
}

/// Routes each source to the adapter registered for its kind.
#[derive(Default, Clone)]
pub struct AdapterSet {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in adapters sharing one HTTP client.
    pub fn standard(client: reqwest::Client, settings: &Settings) -> Self {
        crate::repo::set_network_timeouts(Duration::from_secs(settings.request_timeout_seconds));
        let git = GitLogAdapter::new()
            .with_clone_timeout(Duration::from_secs(settings.clone_timeout_seconds));

        Self::new()
            .with(SourceKind::Git, Arc::new(git))
            .with(
                SourceKind::MediaWiki,
                Arc::new(MediaWikiAdapter::new(client.clone(), settings.wiki_page_size)),
            )
            .with(SourceKind::Obs, Arc::new(ObsAdapter::from_env(client)))
    }

    /// Register (or replace) the adapter for a kind.
    pub fn with(mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }
}

#[async_trait]
impl SourceAdapter for AdapterSet {
    async fn count(&self, source: &Source, identities: &Identities) -> Result<u64, SourceError> {
        let kind = source.kind();
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.count(source, identities).await,
            None => Err(SourceError::Unsupported(kind.as_str())),
        }
    }
}

/// Build the shared HTTP client used by the wiki and build-service adapters.
pub fn http_client(request_timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(Duration::from_secs(request_timeout_seconds))
        .user_agent(concat!("contrib-lister/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}
