//! Bundle-to-resource transformation
//!
//! Wraps each artifact entry, unparsed, in a target resource envelope:
//!
//! ```text
//! { kind, apiVersion, metadata: { name, namespace }, spec: { template: <entry> } }
//! ```

mod entries;

pub use entries::read_entries;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{IdentityStrategy, TargetConfig};
use crate::error::TransformError;
use crate::types::{ContentEntry, DynamicObject, ObjectMeta};

/// Longest object name the cluster API accepts
const MAX_NAME_LEN: usize = 253;

#[derive(Serialize)]
struct TemplateSpec<'a> {
    template: &'a str,
}

/// Derives target resources from artifact entries
#[derive(Debug, Clone)]
pub struct BundleTransformer {
    target: TargetConfig,
}

impl BundleTransformer {
    pub fn new(target: TargetConfig) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// One target resource per entry, in entry order.
    pub fn transform(&self, entries: &[ContentEntry]) -> Result<Vec<DynamicObject>, TransformError> {
        if self.target.identity == IdentityStrategy::Fixed && entries.len() > 1 {
            warn!(
                entries = entries.len(),
                name = %self.target.name,
                namespace = %self.target.namespace,
                "multiple artifact entries share one target identity; only the last one will persist"
            );
        }

        entries.iter().map(|entry| self.build(entry)).collect()
    }

    fn build(&self, entry: &ContentEntry) -> Result<DynamicObject, TransformError> {
        let template = String::from_utf8_lossy(&entry.payload);
        let spec = serde_json::to_value(TemplateSpec {
            template: &template,
        })
        .map_err(|source| TransformError::Serialization {
            entry: entry.name.clone(),
            source,
        })?;

        let name = self.name_for(entry);
        debug!(entry = %entry.name, target = %name, bytes = entry.payload.len(), "synthesized target resource");

        Ok(DynamicObject {
            api_version: self.target.api_version.clone(),
            kind: self.target.kind.clone(),
            metadata: ObjectMeta::new(&self.target.namespace, &name),
            spec,
            status: None,
        })
    }

    fn name_for(&self, entry: &ContentEntry) -> String {
        match self.target.identity {
            IdentityStrategy::Fixed => self.target.name.clone(),
            IdentityStrategy::EntryName => {
                let stem = entry
                    .name
                    .rsplit_once('.')
                    .map_or(entry.name.as_str(), |(stem, _)| stem);
                let suffix = sanitize_name(stem);
                if suffix.is_empty() {
                    return self.target.name.clone();
                }
                let mut name = format!("{}-{}", self.target.name, suffix);
                if let Some((cut, _)) = name.char_indices().nth(MAX_NAME_LEN) {
                    name.truncate(cut);
                }
                name.trim_end_matches('-').to_string()
            }
        }
    }
}

/// Lower-case DNS-1123 form of `raw`.
fn sanitize_name(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        })
        .collect();
    mapped.trim_matches('-').to_string()
}
