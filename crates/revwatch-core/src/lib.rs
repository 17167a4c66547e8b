//! Revwatch Core Library
//!
//! Watches source-controller resources for new artifact revisions and
//! converges derived target resources in the cluster: download and verify
//! the archive, wrap each entry in a resource envelope, then create or
//! update it with optimistic concurrency.

pub mod cluster;
pub mod config;
pub mod controller;
pub mod converge;
pub mod error;
pub mod fetch;
pub mod predicate;
pub mod reconcile;
pub mod transform;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        ClusterConfig, ControllerConfig, FetchConfig, IdentityStrategy, SizeLimit, TargetConfig,
        WatcherConfig,
    };

    // Cluster
    pub use crate::cluster::{ClusterApi, HttpClusterApi, MemoryCluster, SourceReader};

    // Pipeline
    pub use crate::controller::{Controller, Reconcile, RequeuePolicy};
    pub use crate::converge::{Applied, Converger};
    pub use crate::fetch::{ArchiveFetcher, Digest, RetryPolicy};
    pub use crate::predicate::{RevisionChangePredicate, WatchEvent};
    pub use crate::reconcile::{Action, Reconciler};
    pub use crate::transform::BundleTransformer;

    // Errors
    pub use crate::error::{ApiError, ApplyError, FetchError, ReconcileError, TransformError};

    // Types
    pub use crate::types::{
        ArtifactStatus, ContentEntry, DynamicObject, ObjectRef, WatchedResource,
    };
}
