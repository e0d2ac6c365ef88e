//! Git mirroring of a Bitbucket repository onto GitHub.

use crate::error::{MigrationError, Result};
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

const BITBUCKET_GIT_URL: &str = "https://bitbucket.org";
const GITHUB_GIT_URL: &str = "https://github.com";

/// Refs copied by a mirror push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub branches: usize,
    pub tags: usize,
}

/// Clones a Bitbucket repository with `--mirror` and pushes it to GitHub.
#[derive(Clone)]
pub struct RepositoryMirror {
    bitbucket_username: String,
    bitbucket_password: String,
    github_token: String,
}

impl std::fmt::Debug for RepositoryMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryMirror")
            .field("bitbucket_username", &self.bitbucket_username)
            .finish_non_exhaustive()
    }
}

impl RepositoryMirror {
    pub fn new(bitbucket_username: &str, bitbucket_password: &str, github_token: &str) -> Self {
        Self {
            bitbucket_username: bitbucket_username.to_string(),
            bitbucket_password: bitbucket_password.to_string(),
            github_token: github_token.to_string(),
        }
    }

    fn authenticated_url(base: &str, repository: &str, user: &str, password: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{base}/{repository}.git"))
            .map_err(|e| MigrationError::InvalidConfig(format!("Invalid repository URL: {e}")))?;
        url.set_username(user)
            .and_then(|_| url.set_password(Some(password)))
            .map_err(|_| MigrationError::InvalidConfig("Cannot embed git credentials".to_string()))?;
        Ok(url)
    }

    pub fn clone_url(&self, bitbucket_repo: &str) -> Result<Url> {
        Self::authenticated_url(
            BITBUCKET_GIT_URL,
            bitbucket_repo,
            &self.bitbucket_username,
            &self.bitbucket_password,
        )
    }

    pub fn push_url(&self, github_repo: &str) -> Result<Url> {
        Self::authenticated_url(GITHUB_GIT_URL, github_repo, "x-access-token", &self.github_token)
    }

    /// Remove credentials from git output before it is reported.
    fn redact(&self, output: &[u8]) -> String {
        let mut text = String::from_utf8_lossy(output).to_string();
        for secret in [&self.bitbucket_password, &self.github_token] {
            if !secret.is_empty() {
                text = text.replace(secret.as_str(), "***");
            }
        }
        text
    }

    /// Mirror every ref of `bitbucket_repo` to `github_repo`.
    pub async fn mirror(&self, bitbucket_repo: &str, github_repo: &str) -> Result<MirrorStats> {
        let temp_dir = TempDir::new()?;
        let clone_path = temp_dir.path().join("repo.git");

        info!(repo = %bitbucket_repo, "Cloning repository");
        let output = Command::new("git")
            .args(["clone", "--mirror", self.clone_url(bitbucket_repo)?.as_str()])
            .arg(&clone_path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(MigrationError::GitCloneFailed(self.redact(&output.stderr)));
        }

        let stats = MirrorStats {
            branches: count_lines(&clone_path, &["branch", "--list"]).await?,
            tags: count_lines(&clone_path, &["tag", "--list"]).await?,
        };
        debug!(branches = stats.branches, tags = stats.tags, "Cloned refs");

        info!(repo = %github_repo, "Pushing mirror");
        let output = Command::new("git")
            .current_dir(&clone_path)
            .args(["push", "--mirror", self.push_url(github_repo)?.as_str()])
            .output()
            .await?;
        if !output.status.success() {
            return Err(MigrationError::GitPushFailed(self.redact(&output.stderr)));
        }

        Ok(stats)
    }
}

async fn count_lines(repo: &Path, args: &[&str]) -> Result<usize> {
    let output = Command::new("git").current_dir(repo).args(args).output().await?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count())
}
