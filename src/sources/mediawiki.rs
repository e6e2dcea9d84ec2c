//! Wiki-API adapter: counts edits of one MediaWiki account.
//!
//! Uses `list=usercontribs` and follows the `continue` object until the
//! wiki stops returning one. The identity is the configured `User`; the
//! e-mail identities are not consulted since MediaWiki does not expose them.
//! `ucuser` already restricts the result to that account, and the wiki
//! reports it under its canonical name (`jdoe` comes back as `Jdoe`), so
//! every returned entry counts.

use super::{Source, SourceAdapter};
use crate::config::MediaWiki;
use crate::error::SourceError;
use crate::models::Identities;
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Stop following continuations after this many pages.
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Deserialize)]
struct UserContribsResponse {
    #[serde(default)]
    query: Option<UserContribsQuery>,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct UserContribsQuery {
    usercontribs: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Clone)]
pub struct MediaWikiAdapter {
    client: reqwest::Client,
    page_size: u32,
}

impl MediaWikiAdapter {
    pub fn new(client: reqwest::Client, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    /// Count every edit of `wiki.user`, walking all pages.
    pub async fn count_edits(&self, wiki: &MediaWiki) -> Result<u64, SourceError> {
        let endpoint = api_endpoint(&wiki.base_url);
        let mut continuation: BTreeMap<String, String> = BTreeMap::new();
        let mut total = 0;

        for page in 1..=MAX_PAGES {
            let mut params: Vec<(String, String)> = vec![
                ("action".into(), "query".into()),
                ("list".into(), "usercontribs".into()),
                ("ucuser".into(), wiki.user.clone()),
                ("uclimit".into(), self.page_size.to_string()),
                ("ucprop".into(), "title|timestamp".into()),
                ("format".into(), "json".into()),
            ];
            params.extend(continuation.iter().map(|(k, v)| (k.clone(), v.clone())));

            let response = self.client.get(&endpoint).query(&params).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::Unreachable(format!(
                    "{} returned HTTP {}",
                    endpoint, status
                )));
            }

            let body: UserContribsResponse = response.json().await?;

            if let Some(error) = body.error {
                return Err(SourceError::Malformed(format!(
                    "wiki API error {}: {}",
                    error.code, error.info
                )));
            }

            let query = body.query.ok_or_else(|| {
                SourceError::Malformed("response has no query.usercontribs".to_string())
            })?;

            let edits = query.usercontribs.len() as u64;
            total += edits;
            debug!("{} page {}: {} edits", endpoint, page, edits);

            match body.continuation {
                Some(next) if !next.is_empty() => {
                    continuation = next
                        .into_iter()
                        .map(|(k, v)| (k, value_to_param(v)))
                        .collect();
                }
                _ => return Ok(total),
            }
        }

        Err(SourceError::Malformed(format!(
            "{} kept paginating past {} pages",
            endpoint, MAX_PAGES
        )))
    }
}

#[async_trait]
impl SourceAdapter for MediaWikiAdapter {
    async fn count(&self, source: &Source, _identities: &Identities) -> Result<u64, SourceError> {
        match source {
            Source::MediaWiki(wiki) => self.count_edits(wiki).await,
            other => Err(SourceError::Unsupported(other.kind().as_str())),
        }
    }
}

/// `https://wiki.example.org` becomes `https://wiki.example.org/api.php`.
fn api_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("api.php") {
        base.to_string()
    } else {
        format!("{}/api.php", base)
    }
}

fn value_to_param(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
