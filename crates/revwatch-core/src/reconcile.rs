//! One reconciliation of a watched resource.
//!
//! read source → scratch dir → fetch → list → transform → upsert each.
//! Each call is stateless; the scratch directory never outlives it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterApi, SourceReader};
use crate::config::WatcherConfig;
use crate::converge::Converger;
use crate::error::{FetchError, ReconcileError};
use crate::fetch::ArchiveFetcher;
use crate::transform::{BundleTransformer, read_entries};
use crate::types::ObjectRef;

/// What the control loop should do after a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do until the next admitted event
    AwaitChange,
    /// Run again after the delay even without a new event.
    ///
    /// `Reconciler` converges in one pass and never asks for this; it exists
    /// for `Reconcile` implementations that poll external state.
    RequeueAfter(Duration),
}

/// Per-call working directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchArea {
    /// Create a fresh directory under `root` named after `name`.
    pub fn acquire(root: &Path, name: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", name))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "acquired scratch directory");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(err) = dir.close()
        {
            warn!(path = %self.path.display(), error = %err, "unable to remove scratch directory");
        }
    }
}

/// Sequences fetch, transform and converge for one watched resource
pub struct Reconciler {
    sources: Arc<dyn SourceReader>,
    fetcher: ArchiveFetcher,
    transformer: BundleTransformer,
    converger: Converger,
    scratch_root: PathBuf,
}

impl Reconciler {
    pub fn new(
        sources: Arc<dyn SourceReader>,
        fetcher: ArchiveFetcher,
        transformer: BundleTransformer,
        converger: Converger,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            sources,
            fetcher,
            transformer,
            converger,
            scratch_root,
        }
    }

    /// Wire a reconciler from configuration and the two cluster seams.
    pub fn from_config(
        config: &WatcherConfig,
        sources: Arc<dyn SourceReader>,
        api: Arc<dyn ClusterApi>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            sources,
            ArchiveFetcher::new(&config.fetch)?,
            BundleTransformer::new(config.target.clone()),
            Converger::new(api, config.target.api_resource()),
            config.controller.scratch_root(),
        ))
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Converge the target resources for `object` to its current artifact.
    #[tracing::instrument(skip_all, fields(object = %object))]
    pub async fn reconcile(
        &self,
        object: &ObjectRef,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        let source = tokio::select! {
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            source = self.sources.get_source(object) => source,
        }
        .map_err(|source| ReconcileError::Source {
            object: object.clone(),
            source,
        })?;

        let Some(source) = source else {
            debug!("watched resource is gone, nothing to converge");
            return Ok(Action::AwaitChange);
        };
        let Some(artifact) = source.artifact() else {
            debug!("watched resource has no artifact yet");
            return Ok(Action::AwaitChange);
        };
        info!(revision = %artifact.revision, "new revision detected");

        let scratch =
            ScratchArea::acquire(&self.scratch_root, &object.name).map_err(ReconcileError::Scratch)?;

        self.fetcher
            .fetch(&artifact.url, &artifact.digest, scratch.path(), cancel)
            .await
            .map_err(|err| match err {
                FetchError::Cancelled => ReconcileError::Cancelled,
                other => ReconcileError::Fetch(other),
            })?;

        let dir = scratch.path().to_path_buf();
        let entries = tokio::task::spawn_blocking(move || read_entries(&dir))
            .await
            .map_err(|e| ReconcileError::ReadEntries(io::Error::other(e)))?
            .map_err(ReconcileError::ReadEntries)?;

        let desired = self.transformer.transform(&entries)?;
        for (entry, obj) in entries.iter().zip(&desired) {
            debug!(entry = %entry.name, target = %obj.name(), "processing artifact entry");
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
                applied = self.converger.upsert(obj) => { applied?; }
            }
        }

        info!(
            revision = %artifact.revision,
            applied = desired.len(),
            "reconciliation complete"
        );
        Ok(Action::AwaitChange)
    }
}
