//! Create-or-update of target resources.
//!
//! Lookup, then create when absent or replace carrying the fetched resource
//! version. A concurrent writer surfaces as a conflict; retrying is left to
//! the control loop's requeue.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::ClusterApi;
use crate::error::{ApiError, ApplyError};
use crate::types::{ApiResource, DynamicObject, ObjectRef};

/// Result of a successful upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub created: bool,
    /// Resource version assigned by the server, if it returned one
    pub resource_version: Option<String>,
}

#[derive(Clone)]
pub struct Converger {
    api: Arc<dyn ClusterApi>,
    resource: ApiResource,
}

impl Converger {
    pub fn new(api: Arc<dyn ClusterApi>, resource: ApiResource) -> Self {
        Self { api, resource }
    }

    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }

    /// Converge the cluster to `desired`. Idempotent.
    pub async fn upsert(&self, desired: &DynamicObject) -> Result<Applied, ApplyError> {
        let object = ObjectRef::new(desired.namespace(), desired.name());

        match self.api.get(&self.resource, &object).await {
            Err(err) if err.is_not_found() => {
                let mut create = desired.clone();
                create.metadata.resource_version = None;
                let created = self
                    .api
                    .create(&self.resource, &create)
                    .await
                    .map_err(|err| classify("create", &object, err))?;
                info!(
                    kind = %self.resource.kind,
                    object = %object,
                    resource_version = created.resource_version().unwrap_or_default(),
                    "created target resource"
                );
                Ok(Applied {
                    created: true,
                    resource_version: created.metadata.resource_version,
                })
            }
            Err(err) => Err(ApplyError::Fatal {
                operation: "get",
                object,
                source: err,
            }),
            Ok(existing) => {
                let mut update = desired.clone();
                update.metadata.resource_version = existing.metadata.resource_version.clone();
                if existing.same_desired_state(&update) {
                    debug!(object = %object, "no spec change, refreshing target resource");
                }
                let updated = self
                    .api
                    .replace(&self.resource, &update)
                    .await
                    .map_err(|err| classify("update", &object, err))?;
                info!(
                    kind = %self.resource.kind,
                    object = %object,
                    resource_version = updated.resource_version().unwrap_or_default(),
                    "updated target resource"
                );
                Ok(Applied {
                    created: false,
                    resource_version: updated.metadata.resource_version,
                })
            }
        }
    }
}

fn classify(operation: &'static str, object: &ObjectRef, err: ApiError) -> ApplyError {
    if err.is_conflict() {
        ApplyError::Conflict(err)
    } else {
        ApplyError::Fatal {
            operation,
            object: object.clone(),
            source: err,
        }
    }
}
