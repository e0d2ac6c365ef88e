//! Static migration settings.
//!
//! Loaded once at startup from an optional YAML file and shared as
//! `Arc<Settings>`; nothing mutates it during a run.

use crate::error::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use url::Url;

pub const DEFAULT_BITBUCKET_API_URL: &str = "https://api.bitbucket.org/2.0";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Label table: source value to label, `None` meaning "no label".
pub type LabelTable = BTreeMap<String, Option<String>>;

/// Immutable configuration shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bitbucket nickname to GitHub login.
    pub user_mapping: BTreeMap<String, String>,

    /// GitHub logins known to be deactivated or renamed.
    pub inactive_users: BTreeSet<String>,

    /// Bitbucket `workspace/repo` to GitHub `owner/repo`.
    pub repo_mapping: BTreeMap<String, String>,

    pub kind_mapping: LabelTable,
    pub priority_mapping: LabelTable,
    pub component_mapping: LabelTable,
    pub state_mapping: LabelTable,

    /// Bitbucket states that keep the target open; all others close it.
    pub open_states: BTreeSet<String>,

    /// Label name to hex color used when the label is created.
    pub label_colors: BTreeMap<String, String>,

    pub bitbucket_api_url: String,
    pub github_api_url: String,
}

fn table(entries: &[(&str, Option<&str>)]) -> LabelTable {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_mapping: BTreeMap::new(),
            inactive_users: BTreeSet::new(),
            repo_mapping: BTreeMap::new(),
            kind_mapping: table(&[
                ("bug", Some("bug")),
                ("enhancement", Some("enhancement")),
                ("proposal", Some("proposal")),
                ("task", Some("task")),
            ]),
            priority_mapping: table(&[
                ("trivial", Some("trivial")),
                ("minor", Some("minor")),
                ("major", Some("major")),
                ("critical", Some("critical")),
                ("blocker", Some("blocker")),
            ]),
            component_mapping: LabelTable::new(),
            state_mapping: table(&[
                ("new", Some("new")),
                ("open", Some("open")),
                ("on hold", Some("on hold")),
                ("resolved", Some("resolved")),
                ("closed", Some("closed")),
                ("invalid", Some("invalid")),
                ("duplicate", Some("duplicate")),
                ("wontfix", Some("wontfix")),
                ("OPEN", Some("open")),
                ("MERGED", Some("merged")),
                ("DECLINED", Some("declined")),
                ("SUPERSEDED", Some("superseded")),
            ]),
            open_states: ["open", "new", "on hold", "OPEN"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            label_colors: [
                ("bug", "d73a4a"),
                ("enhancement", "a2eeef"),
                ("proposal", "c5def5"),
                ("task", "bfd4f2"),
                ("blocker", "b60205"),
                ("critical", "d93f0b"),
                ("pull request", "0e8a16"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            bitbucket_api_url: DEFAULT_BITBUCKET_API_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate settings from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check URLs and repository names.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("bitbucket_api_url", &self.bitbucket_api_url),
            ("github_api_url", &self.github_api_url),
        ] {
            Url::parse(value)
                .map_err(|e| MigrationError::InvalidConfig(format!("{name} '{value}': {e}")))?;
        }

        for (bb_repo, gh_repo) in &self.repo_mapping {
            split_repo(bb_repo)?;
            split_repo(gh_repo)?;
        }

        Ok(())
    }

    /// GitHub repository for a Bitbucket repository.
    pub fn github_repo_for(&self, bitbucket_repo: &str) -> Option<&str> {
        self.repo_mapping.get(bitbucket_repo).map(String::as_str)
    }

    pub fn is_open_state(&self, state: &str) -> bool {
        self.open_states.contains(state)
    }

    pub fn label_color(&self, label: &str) -> &str {
        self.label_colors
            .get(label)
            .map(String::as_str)
            .unwrap_or("ededed")
    }

    /// Builder used by tests and embedders.
    pub fn with_user(mut self, bitbucket: impl Into<String>, github: impl Into<String>) -> Self {
        self.user_mapping.insert(bitbucket.into(), github.into());
        self
    }

    /// Builder used by tests and embedders.
    pub fn with_repo(mut self, bitbucket: impl Into<String>, github: impl Into<String>) -> Self {
        self.repo_mapping.insert(bitbucket.into(), github.into());
        self
    }
}

/// Split `owner/name` into its two parts.
pub fn split_repo(full_name: &str) -> Result<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(MigrationError::InvalidConfig(format!(
            "Invalid repository format: {full_name}. Expected 'owner/repo'"
        ))),
    }
}
