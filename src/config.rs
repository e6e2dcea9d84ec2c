//! Configuration file handling.
//!
//! The configuration lists the identities of one person and the projects
//! they contribute to. It is read from JSON (default) or TOML, validated
//! once, and treated as read-only afterwards.

use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Configuration {
    /// Every identity string (usually e-mail addresses) to match commits against.
    #[serde(default)]
    pub emails: Vec<String>,

    /// Projects, in report order.
    #[serde(default)]
    pub projects: Vec<Project>,

    /// Scan tuning.
    #[serde(default)]
    pub settings: Settings,
}

/// One project and the sources attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "URL")]
    pub url: String,

    /// Local paths or remote URLs of git repositories.
    #[serde(default)]
    pub gitrepos: Vec<String>,

    /// Wiki accounts.
    #[serde(default, rename = "MediaWikis")]
    pub media_wikis: Vec<MediaWiki>,

    /// Build-service packages.
    #[serde(default)]
    pub obs: Vec<OpenBuildService>,
}

/// A wiki account: the wiki's base URL and the username on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaWiki {
    #[serde(rename = "BaseUrl")]
    pub base_url: String,
    #[serde(rename = "User")]
    pub user: String,
}

/// A build-service package, `Repo` being `project/package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBuildService {
    #[serde(rename = "Apiurl")]
    pub apiurl: String,
    #[serde(rename = "Repo")]
    pub repo: String,
    /// Build-service login. When absent, revisions are matched against `Emails`.
    #[serde(rename = "User", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Scan settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    /// Maximum number of source queries in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for the whole scan, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Timeout for one HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Deadline for one git repository (clone plus history walk), in seconds.
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_seconds: u64,

    /// Entries requested per wiki page.
    #[serde(default = "default_wiki_page_size")]
    pub wiki_page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_seconds: None,
            request_timeout_seconds: default_request_timeout(),
            clone_timeout_seconds: default_clone_timeout(),
            wiki_page_size: default_wiki_page_size(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    30
}

fn default_clone_timeout() -> u64 {
    300
}

fn default_wiki_page_size() -> u32 {
    500
}

impl Configuration {
    /// Load and validate configuration from a file path.
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config = if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_json(&content)
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Check the configuration before any scanning happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pos) = self.emails.iter().position(|e| e.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "Emails entry {} is empty",
                pos + 1
            )));
        }

        if self.settings.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "Settings.Concurrency must be at least 1".to_string(),
            ));
        }

        if self.settings.timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "Settings.TimeoutSeconds must be at least 1".to_string(),
            ));
        }

        if self.settings.request_timeout_seconds == 0 || self.settings.clone_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Settings.RequestTimeoutSeconds and Settings.CloneTimeoutSeconds must be at least 1"
                    .to_string(),
            ));
        }

        if self.settings.wiki_page_size == 0 {
            return Err(ConfigError::Invalid(
                "Settings.WikiPageSize must be at least 1".to_string(),
            ));
        }

        for (index, project) in self.projects.iter().enumerate() {
            project
                .validate()
                .map_err(|reason| match project.name.trim() {
                    "" => ConfigError::Invalid(format!("project #{}: {}", index + 1, reason)),
                    name => ConfigError::Invalid(format!("project '{}': {}", name, reason)),
                })?;
        }

        Ok(())
    }

    /// Merge CLI arguments into the settings.
    ///
    /// CLI arguments take precedence, but only when explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(concurrency) = args.concurrency {
            self.settings.concurrency = concurrency;
        }
        if let Some(timeout) = args.timeout {
            self.settings.timeout_seconds = Some(timeout);
        }
    }

    /// Example configuration shown by `--example-config`.
    pub fn example() -> Self {
        Self {
            emails: vec![
                "jane@example.org".to_string(),
                "jane.doe@example.com".to_string(),
            ],
            projects: vec![
                Project {
                    name: "nudoku".to_string(),
                    description: "Ncurses sudoku game".to_string(),
                    gitrepos: vec!["https://github.com/jubalh/nudoku".to_string()],
                    ..Project::default()
                },
                Project {
                    name: "Funtoo".to_string(),
                    description: "Linux distribution".to_string(),
                    url: "https://www.funtoo.org/".to_string(),
                    gitrepos: vec![
                        "https://github.com/funtoo/ego".to_string(),
                        "https://github.com/funtoo/metro".to_string(),
                    ],
                    media_wikis: vec![MediaWiki {
                        base_url: "https://www.funtoo.org".to_string(),
                        user: "jdoe".to_string(),
                    }],
                    ..Project::default()
                },
                Project {
                    name: "openSUSE".to_string(),
                    description: "Linux distribution".to_string(),
                    url: "https://www.opensuse.org/".to_string(),
                    obs: vec![OpenBuildService {
                        apiurl: "https://api.opensuse.org".to_string(),
                        repo: "utilities/vifm".to_string(),
                        user: None,
                    }],
                    ..Project::default()
                },
            ],
            settings: Settings::default(),
        }
    }

    /// Pretty JSON for the example configuration.
    pub fn example_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::example())?)
    }
}

impl Project {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name must not be empty".to_string());
        }

        if self.gitrepos.iter().any(|r| r.trim().is_empty()) {
            return Err("Gitrepos contains an empty entry".to_string());
        }

        for wiki in &self.media_wikis {
            check_http_url("MediaWiki BaseUrl", &wiki.base_url)?;
            if wiki.user.trim().is_empty() {
                return Err(format!("MediaWiki {} has no User", wiki.base_url));
            }
        }

        for obs in &self.obs {
            check_http_url("Obs Apiurl", &obs.apiurl)?;
            if obs.repo.trim().is_empty() {
                return Err(format!("Obs {} has no Repo", obs.apiurl));
            }
        }

        Ok(())
    }

    /// True when the project has no sources of any kind.
    pub fn has_no_sources(&self) -> bool {
        self.gitrepos.is_empty() && self.media_wikis.is_empty() && self.obs.is_empty()
    }
}

/// `value` must be an absolute http(s) URL with a host.
fn check_http_url(field: &str, value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("{} '{}' is not a URL: {}", field, value, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{} '{}' must use http or https", field, value));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("{} '{}' has no host", field, value));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_json_config() {
        let json = r#"{
            "Emails": ["a@x.com", "b@y.com"],
            "Projects": [
                {
                    "Name": "Funtoo",
                    "Description": "Linux distribution",
                    "URL": "http://funtoo.org/",
                    "Gitrepos": ["https://github.com/funtoo/ego"],
                    "MediaWikis": [{"BaseUrl": "http://funtoo.org", "User": "jdoe"}],
                    "Obs": [{"Apiurl": "https://api.opensuse.org", "Repo": "utilities/vifm"}]
                },
                { "Name": "bare" }
            ]
        }"#;

        let config = Configuration::from_json(json).unwrap();
        assert_eq!(config.emails, vec!["a@x.com", "b@y.com"]);
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.projects[0].url, "http://funtoo.org/");
        assert_eq!(config.projects[0].media_wikis[0].user, "jdoe");
        assert_eq!(config.projects[0].obs[0].repo, "utilities/vifm");
        assert!(config.projects[1].has_no_sources());
        assert_eq!(config.settings, Settings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_content = r#"
Emails = ["a@x.com"]

[Settings]
Concurrency = 8
TimeoutSeconds = 120

[[Projects]]
Name = "nudoku"
Gitrepos = ["/srv/git/nudoku"]
"#;

        let config = Configuration::from_toml(toml_content).unwrap();
        assert_eq!(config.settings.concurrency, 8);
        assert_eq!(config.settings.timeout_seconds, Some(120));
        assert_eq!(config.settings.request_timeout_seconds, 30);
        assert_eq!(config.projects[0].gitrepos, vec!["/srv/git/nudoku"]);
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("contrib.toml");
        let mut file = std::fs::File::create(&toml_path).unwrap();
        writeln!(file, "Emails = [\"a@x.com\"]").unwrap();
        let config = Configuration::load(&toml_path).unwrap();
        assert_eq!(config.emails, vec!["a@x.com"]);

        let json_path = dir.path().join("contrib.json");
        std::fs::write(&json_path, r#"{"Emails": ["b@y.com"]}"#).unwrap();
        let config = Configuration::load(&json_path).unwrap();
        assert_eq!(config.emails, vec!["b@y.com"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Configuration::load(Path::new("/nonexistent/contrib.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contrib.json");
        std::fs::write(&path, "{ \"Emails\": [").unwrap();
        let err = Configuration::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_wiki_url() {
        let mut config = Configuration::example();
        config.projects[1].media_wikis[0].base_url = "funtoo.org".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Funtoo"));
    }

    #[test]
    fn test_validation_rejects_unparseable_urls() {
        let mut config = Configuration::example();
        config.projects[1].media_wikis[0].base_url = "http://".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::example();
        config.projects[2].obs[0].apiurl = "https://not a host".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::example();
        config.projects[2].obs[0].apiurl = "ftp://api.opensuse.org".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let mut config = Configuration::example();
        config.settings.clone_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unnamed_project() {
        let config = Configuration {
            projects: vec![Project::default()],
            ..Configuration::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("project #1"));
    }

    #[test]
    fn test_validation_rejects_empty_identity() {
        let config = Configuration {
            emails: vec!["a@x.com".to_string(), "  ".to_string()],
            ..Configuration::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = Configuration::default();
        config.settings.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_roundtrips_and_validates() {
        let json = Configuration::example_json().unwrap();
        assert!(json.contains("\"MediaWikis\""));
        assert!(json.contains("\"Apiurl\""));
        assert!(!json.contains("\"User\": null"));

        let parsed = Configuration::from_json(&json).unwrap();
        assert_eq!(parsed, Configuration::example());
        assert!(parsed.validate().is_ok());
    }
}
