//! Build-service adapter: counts package revisions on an Open Build Service instance.
//!
//! `GET {Apiurl}/source/{project}/{package}/_history` returns every revision
//! of the package in one `<revisionlist>` document. A revision counts when
//! its `<user>` is the entry's `User`, or one of the identities when no
//! `User` is configured.

use super::{Source, SourceAdapter};
use crate::config::OpenBuildService;
use crate::error::SourceError;
use crate::models::Identities;
use async_trait::async_trait;
use tracing::debug;
use xot::Xot;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    user: String,
    password: String,
}

#[derive(Clone)]
pub struct ObsAdapter {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl ObsAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            credentials: None,
        }
    }

    /// Use `OBS_USER`/`OBS_PASSWORD` for basic auth when both are set.
    pub fn from_env(client: reqwest::Client) -> Self {
        let mut adapter = Self::new(client);
        if let (Ok(user), Ok(password)) = (std::env::var("OBS_USER"), std::env::var("OBS_PASSWORD")) {
            if !user.is_empty() {
                adapter.credentials = Some(Credentials { user, password });
            }
        }
        adapter
    }

    pub async fn count_revisions(
        &self,
        obs: &OpenBuildService,
        identities: &Identities,
    ) -> Result<u64, SourceError> {
        let (project, package) = split_repo(&obs.repo)?;
        let url = format!(
            "{}/source/{}/{}/_history",
            obs.apiurl.trim_end_matches('/'),
            project,
            package
        );

        let mut request = self.client.get(&url);
        if let Some(ref creds) = self.credentials {
            request = request.basic_auth(&creds.user, Some(&creds.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let body = response.text().await?;
        let users = revision_users(&body)?;

        let count = users
            .iter()
            .filter(|user| match obs.user {
                Some(ref login) => *user == login,
                None => identities.matches(user),
            })
            .count() as u64;

        debug!("{}: {} of {} revisions match", url, count, users.len());
        Ok(count)
    }
}

#[async_trait]
impl SourceAdapter for ObsAdapter {
    async fn count(&self, source: &Source, identities: &Identities) -> Result<u64, SourceError> {
        match source {
            Source::Obs(obs) => self.count_revisions(obs, identities).await,
            other => Err(SourceError::Unsupported(other.kind().as_str())),
        }
    }
}

/// `home:jdoe:branches/vifm` splits into (`home:jdoe:branches`, `vifm`).
fn split_repo(repo: &str) -> Result<(&str, &str), SourceError> {
    match repo.trim().rsplit_once('/') {
        Some((project, package)) if !project.is_empty() && !package.is_empty() => {
            Ok((project, package))
        }
        _ => Err(SourceError::Malformed(format!(
            "Repo must be 'project/package', got '{}'",
            repo
        ))),
    }
}

/// The `<user>` of every `<revision>` in a `<revisionlist>` document.
fn revision_users(xml: &str) -> Result<Vec<String>, SourceError> {
    let mut xot = Xot::new();
    let root = xot
        .parse(xml)
        .map_err(|e| SourceError::Malformed(format!("invalid history XML: {}", e)))?;

    let revisionlist = xot.add_name("revisionlist");
    let revision = xot.add_name("revision");
    let user = xot.add_name("user");

    let is_named = |xot: &Xot, node: xot::Node, name: xot::NameId| {
        xot.element(node).is_some_and(|el| el.name() == name)
    };

    let list = xot
        .children(root)
        .find(|&node| is_named(&xot, node, revisionlist))
        .ok_or_else(|| SourceError::Malformed("expected a <revisionlist> document".to_string()))?;

    let users = xot
        .children(list)
        .filter(|&node| is_named(&xot, node, revision))
        .map(|rev| {
            xot.children(rev)
                .find(|&node| is_named(&xot, node, user))
                .and_then(|node| xot.text_content_str(node))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        })
        .collect();

    Ok(users)
}
