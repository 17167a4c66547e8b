//! Shared core types used across the fetch, transform and converge layers.

mod object;

pub use object::{ApiResource, DynamicObject, ObjectMeta};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespaced identity of a cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Artifact published by the source controller in the watched resource status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStatus {
    /// HTTP(S) location of the archive
    pub url: String,
    /// Content digest in `<algorithm>:<hex>` form
    #[serde(default)]
    pub digest: String,
    /// Revision the artifact was built from
    #[serde(default)]
    pub revision: String,
}

/// The upstream object whose artifact revision drives reconciliation.
///
/// Only the fields this controller reads are modelled; everything else in the
/// source object is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedResource {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: WatchedStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedStatus {
    #[serde(default)]
    pub artifact: Option<ArtifactStatus>,
}

impl WatchedResource {
    pub fn new(object_ref: &ObjectRef, artifact: Option<ArtifactStatus>) -> Self {
        Self {
            metadata: ObjectMeta::new(&object_ref.namespace, &object_ref.name),
            status: WatchedStatus { artifact },
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(
            self.metadata.namespace.clone().unwrap_or_default(),
            self.metadata.name.clone(),
        )
    }

    pub fn artifact(&self) -> Option<&ArtifactStatus> {
        self.status.artifact.as_ref()
    }

    /// Revision of the published artifact, if any.
    pub fn revision(&self) -> Option<&str> {
        self.artifact().map(|a| a.revision.as_str())
    }
}

/// One extracted file of a content bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,
    pub payload: Vec<u8>,
}

impl ContentEntry {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}
