//! Cross-reference markers.
//!
//! A marker is written once, when a target entity or comment is created,
//! and afterwards only re-matched verbatim. Titles are never parsed to
//! recover a marker.

use crate::model::EntityRef;

/// Longest title GitHub accepts, in characters.
pub const MAX_TITLE_CHARS: usize = 256;

/// Idempotency key linking a GitHub issue or pull request to its
/// Bitbucket origin, e.g. `[issue#12]` or `[pr#12]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossReferenceMarker {
    token: String,
}

impl CrossReferenceMarker {
    pub fn new(reference: EntityRef) -> Self {
        Self {
            token: format!("[{reference}]"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Title for a newly created target entity.
    ///
    /// Long titles are shortened with an ellipsis so that the result fits
    /// [`MAX_TITLE_CHARS`]; the marker itself is never cut.
    pub fn decorate_title(&self, title: &str) -> String {
        let title = title.trim();
        if title.is_empty() {
            return self.token.clone();
        }

        let budget = MAX_TITLE_CHARS.saturating_sub(self.token.chars().count() + 1);
        if title.chars().count() <= budget {
            return format!("{title} {}", self.token);
        }
        let kept: String = title.chars().take(budget.saturating_sub(1)).collect();
        format!("{}\u{2026} {}", kept.trim_end(), self.token)
    }

    /// Exact, delimiter-anchored containment check.
    pub fn is_in(&self, text: &str) -> bool {
        text.contains(&self.token)
    }

    /// Marker for one activity replayed as a comment on this entity.
    pub fn activity(&self, activity_key: &str) -> ActivityMarker {
        let inner = self.token.trim_start_matches('[').trim_end_matches(']');
        ActivityMarker {
            token: format!("[{inner}/{activity_key}]"),
        }
    }
}

impl std::fmt::Display for CrossReferenceMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

/// Idempotency key for one replayed activity, e.g. `[issue#12/comment-345]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityMarker {
    token: String,
}

impl ActivityMarker {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Hidden footer appended to the comment body.
    pub fn footer(&self) -> String {
        format!("\n\n<!-- bitbucket {} -->", self.token)
    }

    pub fn is_in(&self, text: &str) -> bool {
        text.contains(&self.token)
    }
}
