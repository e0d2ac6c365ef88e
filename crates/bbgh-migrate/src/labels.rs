//! Source taxonomy to GitHub label mapping.

use crate::config::{LabelTable, Settings};
use crate::error::Result;
use crate::forge::{LabelCreation, TargetForge};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label added to every migrated pull request.
pub const PULL_REQUEST_LABEL: &str = "pull request";

/// Deterministic, table-driven label mapping.
#[derive(Debug, Clone)]
pub struct LabelMapper {
    settings: Arc<Settings>,
}

impl LabelMapper {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Labels for one entity. A pure function of its inputs.
    ///
    /// Values missing from a table pass through unchanged as a label.
    pub fn labels(
        &self,
        state: &str,
        kind: Option<&str>,
        priority: Option<&str>,
        component: Option<&str>,
        is_pull_request: bool,
    ) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();

        let lookups = [
            ("state", &self.settings.state_mapping, Some(state)),
            ("kind", &self.settings.kind_mapping, kind),
            ("priority", &self.settings.priority_mapping, priority),
            ("component", &self.settings.component_mapping, component),
        ];
        for (category, table, value) in lookups {
            if let Some(label) = value.and_then(|v| map_value(category, table, v)) {
                labels.insert(label);
            }
        }

        if is_pull_request {
            labels.insert(PULL_REQUEST_LABEL.to_string());
        }

        labels
    }
}

fn map_value(category: &str, table: &LabelTable, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match table.get(value) {
        Some(label) => label.clone(),
        None => {
            debug!(category, value, "Unmapped value, using it as label");
            Some(value.to_string())
        }
    }
}

/// Per-run cache of labels known to exist on the target repository.
///
/// Each label is created at most once per run; a creation conflict
/// counts as "exists".
pub struct LabelRegistry {
    known: HashSet<String>,
    loaded: bool,
    settings: Arc<Settings>,
}

impl LabelRegistry {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            known: HashSet::new(),
            loaded: false,
            settings,
        }
    }

    /// Make sure every label exists. In dry-run nothing is created.
    pub async fn ensure(
        &mut self,
        target: &dyn TargetForge,
        labels: &BTreeSet<String>,
        dry_run: bool,
    ) -> Result<()> {
        if !self.loaded {
            let existing = target.list_labels().await?;
            debug!(count = existing.len(), "Loaded existing labels");
            self.known.extend(existing);
            self.loaded = true;
        }

        for label in labels {
            if self.known.contains(label) {
                continue;
            }
            if dry_run {
                info!(label = %label, "Would create label");
            } else {
                match target
                    .create_label(label, self.settings.label_color(label))
                    .await?
                {
                    LabelCreation::Created => info!(label = %label, "Created label"),
                    LabelCreation::AlreadyExists => {
                        warn!(label = %label, "Label already existed, reusing it")
                    }
                }
            }
            self.known.insert(label.clone());
        }

        Ok(())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.known.contains(label)
    }
}
