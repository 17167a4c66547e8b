//! In-process cluster with real optimistic concurrency.
//!
//! Used for dry runs and tests. Every target API call is journaled so
//! callers can assert on the exact sequence of operations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ClusterApi, SourceReader};
use crate::error::ApiError;
use crate::types::{ApiResource, DynamicObject, ObjectRef, WatchedResource};

/// A recorded target API call, with the object as submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Get(ObjectRef),
    Create(DynamicObject),
    Replace(DynamicObject),
}

type ObjectKey = (String, String, ObjectRef);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    sources: BTreeMap<ObjectRef, WatchedResource>,
    last_version: u64,
    calls: Vec<ApiCall>,
    write_after_next_get: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

fn key(resource: &ApiResource, object: &ObjectRef) -> ObjectKey {
    (resource.api_version(), resource.kind.clone(), object.clone())
}

fn object_ref(obj: &DynamicObject) -> ObjectRef {
    ObjectRef::new(obj.namespace(), obj.name())
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish or overwrite a watched source object.
    pub fn put_source(&self, source: WatchedResource) {
        self.lock().sources.insert(source.object_ref(), source);
    }

    pub fn remove_source(&self, object: &ObjectRef) {
        self.lock().sources.remove(object);
    }

    /// The stored target object, if any.
    pub fn object(&self, resource: &ApiResource, object: &ObjectRef) -> Option<DynamicObject> {
        self.lock().objects.get(&key(resource, object)).cloned()
    }

    /// Journal of target API calls so far.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Bump the stored object's resource version as another writer would.
    ///
    /// Returns the new version, `None` if the object does not exist.
    pub fn external_write(&self, resource: &ApiResource, object: &ObjectRef) -> Option<String> {
        let mut state = self.lock();
        let version = state.next_version();
        let stored = state.objects.get_mut(&key(resource, object))?;
        stored.metadata.resource_version = Some(version.clone());
        Some(version)
    }

    /// Make the next `get` of an existing object race with another writer:
    /// the caller sees the old version while the store moves on.
    pub fn race_next_get(&self) {
        self.lock().write_after_next_get = true;
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        object: &ObjectRef,
    ) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Get(object.clone()));

        let found = state
            .objects
            .get(&key(resource, object))
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                kind: resource.kind.clone(),
                object: object.clone(),
            })?;

        if std::mem::take(&mut state.write_after_next_get) {
            let version = state.next_version();
            if let Some(stored) = state.objects.get_mut(&key(resource, object)) {
                stored.metadata.resource_version = Some(version);
            }
        }

        Ok(found)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Create(obj.clone()));

        let object = object_ref(obj);
        if obj.resource_version().is_some() {
            return Err(ApiError::Status {
                status: 400,
                message: "resourceVersion should not be set on objects to be created".to_string(),
            });
        }
        let key = key(resource, &object);
        if state.objects.contains_key(&key) {
            return Err(ApiError::Conflict {
                kind: resource.kind.clone(),
                object,
                message: "already exists".to_string(),
            });
        }

        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Replace(obj.clone()));

        let object = object_ref(obj);
        let key = key(resource, &object);
        let current = state.objects.get(&key).ok_or_else(|| ApiError::NotFound {
            kind: resource.kind.clone(),
            object: object.clone(),
        })?;

        if let Some(submitted) = obj.resource_version()
            && current.resource_version() != Some(submitted)
        {
            return Err(ApiError::Conflict {
                kind: resource.kind.clone(),
                object,
                message: format!(
                    "the object has been modified; submitted resourceVersion {} but stored is {}",
                    submitted,
                    current.resource_version().unwrap_or_default()
                ),
            });
        }

        let mut stored = obj.clone();
        stored.status = current.status.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl SourceReader for MemoryCluster {
    async fn get_source(&self, object: &ObjectRef) -> Result<Option<WatchedResource>, ApiError> {
        Ok(self.lock().sources.get(object).cloned())
    }
}
