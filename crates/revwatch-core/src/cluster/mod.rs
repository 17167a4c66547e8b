//! Cluster API abstraction
//!
//! The reconciler only needs get/create/replace by identity on the target
//! resource and a read of the watched source object. Credentials and
//! transport belong to the implementations.

mod http;
mod memory;

pub use http::HttpClusterApi;
pub use memory::{ApiCall, MemoryCluster};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{ApiResource, DynamicObject, ObjectRef, WatchedResource};

/// Generic object access on the target cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Read the object at `object`; `ApiError::NotFound` when absent.
    async fn get(
        &self,
        resource: &ApiResource,
        object: &ObjectRef,
    ) -> Result<DynamicObject, ApiError>;

    /// Create `obj`, which must not carry a resource version.
    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Replace the stored object; `ApiError::Conflict` when the resource
    /// version on `obj` is stale.
    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;
}

/// Read access to watched source objects.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Current state of the watched resource, `None` when it no longer exists.
    async fn get_source(&self, object: &ObjectRef) -> Result<Option<WatchedResource>, ApiError>;
}

/// The GitRepository type published by the source controller.
pub fn source_resource() -> ApiResource {
    ApiResource::from_api_version(
        "source.toolkit.fluxcd.io/v1",
        "GitRepository",
        "gitrepositories",
    )
}
