#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use revwatch_core::cluster::{ClusterApi, MemoryCluster, SourceReader};
use revwatch_core::config::{FetchConfig, WatcherConfig};
use revwatch_core::reconcile::Reconciler;
use revwatch_core::types::{ApiResource, ArtifactStatus, ObjectRef, WatchedResource};
use sha2::{Digest as _, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a gzipped tarball from `(path, content)` pairs
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *content)
            .expect("append should succeed");
    }
    let tar = builder.into_inner().expect("tar finish should succeed");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).expect("gzip write should succeed");
    encoder.finish().expect("gzip finish should succeed")
}

/// Tarball whose single entry name is written verbatim, bypassing the
/// builder's path checks.
pub fn tar_with_raw_name(name: &str, content: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder
        .append(&header, content)
        .expect("append should succeed");
    builder.into_inner().expect("tar finish should succeed")
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Serve `body` at `route` on the mock artifact server
pub async fn serve_artifact(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Fetch settings suited to a local mock server
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        retries: 2,
        retry_backoff_ms: 1,
        timeout_ms: 2_000,
        ..FetchConfig::default()
    }
}

pub fn source_ref() -> ObjectRef {
    ObjectRef::new("default", "podinfo")
}

pub fn target_ref() -> ObjectRef {
    ObjectRef::new("default", "fluxdemo")
}

pub fn watched(url: &str, digest: &str, revision: &str) -> WatchedResource {
    WatchedResource::new(
        &source_ref(),
        Some(ArtifactStatus {
            url: url.to_string(),
            digest: digest.to_string(),
            revision: revision.to_string(),
        }),
    )
}

pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Reconciler wired to an in-memory cluster and a private scratch root
pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub reconciler: Arc<Reconciler>,
    pub config: WatcherConfig,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new(fetch: FetchConfig) -> Self {
        let scratch = TempDir::new().expect("scratch root should be created");
        let mut config = WatcherConfig {
            fetch,
            ..WatcherConfig::default()
        };
        config.controller.scratch_dir = Some(scratch.path().to_path_buf());

        let cluster = Arc::new(MemoryCluster::new());
        let sources: Arc<dyn SourceReader> = cluster.clone();
        let api: Arc<dyn ClusterApi> = cluster.clone();
        let reconciler = Arc::new(
            Reconciler::from_config(&config, sources, api).expect("reconciler should build"),
        );

        Self {
            cluster,
            reconciler,
            config,
            scratch,
        }
    }

    pub fn target_resource(&self) -> ApiResource {
        self.config.target.api_resource()
    }

    /// Publish a new artifact for the watched source
    pub async fn publish(
        &self,
        server: &MockServer,
        revision: &str,
        entries: &[(&str, &[u8])],
    ) -> WatchedResource {
        let archive = tar_gz(entries);
        let digest = sha256_digest(&archive);
        let route = format!("/gitrepository/default/podinfo/{}.tar.gz", revision);
        serve_artifact(server, &route, archive).await;
        let source = watched(&format!("{}{}", server.uri(), route), &digest, revision);
        self.cluster.put_source(source.clone());
        source
    }
}
