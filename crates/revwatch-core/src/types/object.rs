//! Untyped cluster object envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity and concurrency metadata of a cluster object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Optimistic-concurrency token assigned by the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            resource_version: None,
        }
    }
}

/// A cluster object with a minimal required shape and an untyped `spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl DynamicObject {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Whether both objects describe the same desired state.
    ///
    /// Compares type, identity and spec; the concurrency token and status are
    /// ignored.
    pub fn same_desired_state(&self, other: &DynamicObject) -> bool {
        self.api_version == other.api_version
            && self.kind == other.kind
            && self.metadata.name == other.metadata.name
            && self.namespace() == other.namespace()
            && self.spec == other.spec
    }
}

/// Addressing information for a resource type on the cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiResource {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lower-case plural used in REST paths
    pub plural: String,
}

impl ApiResource {
    /// Build from an `apiVersion` string such as `radapp.io/v1alpha3` or `v1`.
    pub fn from_api_version(api_version: &str, kind: &str, plural: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// REST path of a single namespaced object.
    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }

    /// REST path of the namespaced collection.
    pub fn collection_path(&self, namespace: &str) -> String {
        let prefix = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        format!("{}/namespaces/{}/{}", prefix, namespace, self.plural)
    }
}
