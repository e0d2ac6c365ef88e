//! Bitbucket to GitHub identity resolution.

use crate::config::Settings;
use crate::error::{MigrationError, Result};
use crate::model::SourceUser;
use crate::types::IdentityMode;
use std::sync::Arc;
use tracing::debug;

/// Result of resolving one Bitbucket identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Mapped to an active GitHub login.
    Mapped(String),
    /// Known Bitbucket account without a usable GitHub login.
    Unresolved(String),
    /// The Bitbucket account no longer exists.
    Deleted,
}

/// Maps Bitbucket accounts to GitHub logins using the static table.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    settings: Arc<Settings>,
    mode: IdentityMode,
}

impl IdentityResolver {
    pub fn new(settings: Arc<Settings>, mode: IdentityMode) -> Self {
        Self { settings, mode }
    }

    pub fn mode(&self) -> IdentityMode {
        self.mode
    }

    /// Look up a user. Logins listed as inactive count as unresolved.
    pub fn resolve(&self, user: Option<&SourceUser>) -> Resolution {
        let Some(nickname) = user.and_then(|u| u.nickname.as_deref()) else {
            return Resolution::Deleted;
        };

        match self.settings.user_mapping.get(nickname) {
            Some(login) if !self.settings.inactive_users.contains(login) => {
                Resolution::Mapped(login.clone())
            }
            Some(login) => {
                debug!(nickname, login = %login, "Mapped GitHub account is inactive");
                Resolution::Unresolved(nickname.to_string())
            }
            None => Resolution::Unresolved(nickname.to_string()),
        }
    }

    /// GitHub login for a user, if any. Never fails.
    pub fn login(&self, user: Option<&SourceUser>) -> Option<String> {
        match self.resolve(user) {
            Resolution::Mapped(login) => Some(login),
            _ => None,
        }
    }

    /// Enforce the identity mode for a user that owns or acts on an entity.
    ///
    /// Deleted accounts are never an error: there is nothing to map.
    pub fn require(&self, user: Option<&SourceUser>) -> Result<()> {
        match (self.mode, self.resolve(user)) {
            (IdentityMode::Strict, Resolution::Unresolved(identity)) => {
                Err(MigrationError::UnresolvedIdentity { identity })
            }
            _ => Ok(()),
        }
    }

    /// Inline mention for rendered text.
    ///
    /// Unresolved users get a textual attribution instead of an `@` mention.
    pub fn mention(&self, user: Option<&SourceUser>, capitalize: bool) -> String {
        match self.resolve(user) {
            Resolution::Mapped(login) => format!("**@{login}**"),
            Resolution::Unresolved(nickname) => {
                let prefix = if capitalize { "B" } else { "b" };
                format!("{prefix}itbucket user **{nickname}**")
            }
            Resolution::Deleted => {
                let prefix = if capitalize { "A" } else { "a" };
                format!("{prefix} former bitbucket user (account deleted)")
            }
        }
    }
}
