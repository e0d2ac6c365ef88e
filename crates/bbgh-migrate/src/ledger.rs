//! Detection of activities already replayed on the target.

use crate::error::Result;
use crate::forge::TargetForge;
use crate::marker::CrossReferenceMarker;
use crate::model::Activity;
use async_trait::async_trait;
use tracing::debug;

/// Which activities of an entity still need to be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayPlan {
    /// Index of the first activity to append. Everything from here on is
    /// posted in order.
    pub resume_at: usize,
    /// Keys of earlier activities whose marker was not found. They are
    /// never posted out of order.
    pub missing_before: Vec<String>,
}

impl ReplayPlan {
    pub fn pending<'a>(&self, activities: &'a [Activity]) -> &'a [Activity] {
        activities.get(self.resume_at..).unwrap_or(&[])
    }
}

/// Tells the engine how far an entity's activity replay has progressed.
#[async_trait]
pub trait ReplayLedger: Send + Sync {
    async fn replay_plan(
        &self,
        target: &dyn TargetForge,
        number: u64,
        marker: &CrossReferenceMarker,
        activities: &[Activity],
    ) -> Result<ReplayPlan>;
}

/// Ledger that scans the target's comments for activity markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentScanLedger;

#[async_trait]
impl ReplayLedger for CommentScanLedger {
    async fn replay_plan(
        &self,
        target: &dyn TargetForge,
        number: u64,
        marker: &CrossReferenceMarker,
        activities: &[Activity],
    ) -> Result<ReplayPlan> {
        if activities.is_empty() {
            return Ok(ReplayPlan::default());
        }

        let comments = target.list_comments(number).await?;
        let present: Vec<bool> = activities
            .iter()
            .map(|activity| {
                let activity_marker = marker.activity(&activity.key);
                comments.iter().any(|c| activity_marker.is_in(&c.body))
            })
            .collect();

        let resume_at = present
            .iter()
            .rposition(|&found| found)
            .map_or(0, |last| last + 1);
        let missing_before = activities[..resume_at]
            .iter()
            .zip(&present)
            .filter(|&(_, &found)| !found)
            .map(|(activity, _)| activity.key.clone())
            .collect();

        debug!(
            number,
            comments = comments.len(),
            resume_at,
            "Scanned replayed activities"
        );

        Ok(ReplayPlan {
            resume_at,
            missing_before,
        })
    }
}
