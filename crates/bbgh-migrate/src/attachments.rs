//! Attachment relocation to an external blob host.
//!
//! All attachments of one entity are published as one bundle (a gist)
//! whose description embeds the entity's marker. Relocation never fails
//! the owning entity: problems degrade to visible placeholders.

use crate::forge::{BlobFile, BlobHost, SourceForge};
use crate::marker::CrossReferenceMarker;
use crate::model::{EntityRef, SourceEntity};

use base64::Engine as _;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Largest file a gist accepts through the API.
pub const MAX_ATTACHMENT_BYTES: usize = 500 * 1000;

const BASE64_SUFFIX: &str = ".base64";

/// Where an attachment lives after relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalReference {
    /// Durable URL on the blob host.
    Url(String),
    /// Relocation failed; the reason is reported.
    Missing(String),
    /// `--skip-attachments` was set.
    Skipped,
    /// Dry-run: would be uploaded.
    Pending,
}

impl ExternalReference {
    fn link_target(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Missing(_) | Self::Pending => "#attachment-missing",
            Self::Skipped => "#attachment-skipped",
        }
    }
}

/// Relocated references for the attachments of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocatedAttachments {
    references: BTreeMap<String, ExternalReference>,
}

fn link_target_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\]\(\s*<?([^)\s>]+)>?\s*\)").expect("valid regex"))
}

impl RelocatedAttachments {
    /// Human-readable problems, one per attachment that did not upload.
    pub fn problems(&self) -> Vec<String> {
        self.references
            .iter()
            .filter_map(|(name, reference)| match reference {
                ExternalReference::Missing(reason) => {
                    Some(format!("attachment '{name}' missing: {reason}"))
                }
                _ => None,
            })
            .collect()
    }

    /// Bare file names, or Bitbucket attachment URLs ending in the name.
    fn lookup(&self, target: &str) -> Option<&ExternalReference> {
        let attachment_url = target.contains("/attachments/");
        self.references.iter().find_map(|(name, reference)| {
            let encoded = name.replace(' ', "%20");
            let matches = [name.as_str(), encoded.as_str()].iter().any(|n| {
                target == *n || (attachment_url && target.ends_with(&format!("/{n}")))
            });
            matches.then_some(reference)
        })
    }

    /// Rewrite markdown link targets that point at an attachment.
    pub fn rewrite(&self, text: &str) -> String {
        if self.references.is_empty() {
            return text.to_string();
        }
        link_target_regex()
            .replace_all(text, |caps: &Captures<'_>| match self.lookup(&caps[1]) {
                Some(reference) => format!("]({})", reference.link_target()),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// "Attachments:" section appended to the entity body.
    pub fn listing(&self) -> String {
        if self.references.is_empty() {
            return String::new();
        }

        let mut sb = String::from("\n---\n\nAttachments:\n");
        for (name, reference) in &self.references {
            let line = match reference {
                ExternalReference::Url(url) => format!("* [**`{name}`**]({url})\n"),
                ExternalReference::Missing(_) => format!("* **`{name}`** (attachment missing)\n"),
                ExternalReference::Skipped => format!("* **`{name}`** (attachment not migrated)\n"),
                ExternalReference::Pending => format!("* **`{name}`** (pending upload)\n"),
            };
            sb.push_str(&line);
        }
        sb
    }
}

/// Publishes attachments once per entity per run.
pub struct AttachmentRelocator {
    github_repo: String,
    skip: bool,
    dry_run: bool,
    uploaded: HashMap<EntityRef, RelocatedAttachments>,
}

impl AttachmentRelocator {
    pub fn new(github_repo: impl Into<String>, skip: bool, dry_run: bool) -> Self {
        Self {
            github_repo: github_repo.into(),
            skip,
            dry_run,
            uploaded: HashMap::new(),
        }
    }

    /// Bundle description; the marker makes it unique per entity.
    pub fn bundle_description(&self, marker: &CrossReferenceMarker) -> String {
        format!("Attachments for {} {marker}", self.github_repo)
    }

    /// Relocate every attachment of `entity`.
    pub async fn relocate(
        &mut self,
        source: &dyn SourceForge,
        host: &dyn BlobHost,
        entity: &SourceEntity,
    ) -> RelocatedAttachments {
        if entity.attachments.is_empty() {
            return RelocatedAttachments::default();
        }
        if let Some(done) = self.uploaded.get(&entity.reference) {
            return done.clone();
        }

        let names = entity.attachments.iter().map(|a| a.name.clone());
        if self.skip {
            return RelocatedAttachments {
                references: names.map(|n| (n, ExternalReference::Skipped)).collect(),
            };
        }
        if self.dry_run {
            return RelocatedAttachments {
                references: names.map(|n| (n, ExternalReference::Pending)).collect(),
            };
        }

        let marker = CrossReferenceMarker::new(entity.reference);
        let description = self.bundle_description(&marker);
        let relocated = self.upload(source, host, entity, &description).await;
        self.uploaded.insert(entity.reference, relocated.clone());
        relocated
    }

    async fn upload(
        &self,
        source: &dyn SourceForge,
        host: &dyn BlobHost,
        entity: &SourceEntity,
        description: &str,
    ) -> RelocatedAttachments {
        let mut references = BTreeMap::new();
        // Hosted file name -> attachment name
        let mut hosted_names = BTreeMap::new();
        let mut files = Vec::new();

        for attachment in &entity.attachments {
            let name = &attachment.name;
            match source.attachment_content(entity.reference, name).await {
                Ok(bytes) => match prepare_file(name, bytes) {
                    Ok(file) => {
                        hosted_names.insert(file.name.clone(), name.clone());
                        files.push(file);
                    }
                    Err(reason) => {
                        warn!(entity = %entity.reference, attachment = %name, %reason, "Attachment not uploaded");
                        references.insert(name.clone(), ExternalReference::Missing(reason));
                    }
                },
                Err(e) => {
                    warn!(entity = %entity.reference, attachment = %name, error = %e, "Failed to download attachment");
                    references.insert(
                        name.clone(),
                        ExternalReference::Missing(format!("download failed: {e}")),
                    );
                }
            }
        }

        if files.is_empty() {
            return RelocatedAttachments { references };
        }

        let urls = match host.find_bundle(description).await {
            Ok(Some(existing)) if files.iter().all(|f| existing.contains_key(&f.name)) => {
                info!(entity = %entity.reference, "Reusing existing attachment bundle");
                Ok(existing)
            }
            Ok(_) => host.publish(description, &files).await,
            Err(e) => {
                warn!(error = %e, "Could not search existing attachment bundles");
                host.publish(description, &files).await
            }
        };

        match urls {
            Ok(urls) => {
                for (hosted, name) in hosted_names {
                    let reference = match urls.get(&hosted) {
                        Some(url) => ExternalReference::Url(url.clone()),
                        None => ExternalReference::Missing("not returned by blob host".to_string()),
                    };
                    references.insert(name, reference);
                }
                info!(entity = %entity.reference, files = files.len(), "Relocated attachments");
            }
            Err(e) => {
                warn!(entity = %entity.reference, error = %e, "Attachment upload failed");
                for name in hosted_names.into_values() {
                    references.insert(name, ExternalReference::Missing(e.to_string()));
                }
            }
        }

        RelocatedAttachments { references }
    }
}

/// Turn raw bytes into a text file a gist accepts.
fn prepare_file(name: &str, bytes: Vec<u8>) -> std::result::Result<BlobFile, String> {
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(format!(
            "{} bytes exceeds the {MAX_ATTACHMENT_BYTES} byte limit",
            bytes.len()
        ));
    }
    if bytes.is_empty() {
        return Ok(BlobFile {
            name: name.to_string(),
            content: "(empty)".to_string(),
        });
    }
    match String::from_utf8(bytes) {
        Ok(content) => Ok(BlobFile {
            name: name.to_string(),
            content,
        }),
        Err(e) => Ok(BlobFile {
            name: format!("{name}{BASE64_SUFFIX}"),
            content: base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
        }),
    }
}
