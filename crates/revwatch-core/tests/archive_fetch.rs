//! Archive retriever behaviour against a mock HTTP server.

mod support;

use revwatch_core::config::SizeLimit;
use revwatch_core::error::FetchError;
use revwatch_core::fetch::ArchiveFetcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{fast_fetch_config, is_empty_dir, serve_artifact, sha256_digest, tar_gz};

async fn fetch(
    fetcher: &ArchiveFetcher,
    url: &str,
    digest: &str,
    dest: &TempDir,
) -> Result<revwatch_core::fetch::UntarSummary, FetchError> {
    fetcher
        .fetch(url, digest, dest.path(), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn verified_archive_is_extracted() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[("app.json", b"{}"), ("bicep/main.bicep", b"param x string")]);
    let digest = sha256_digest(&archive);
    serve_artifact(&server, "/a.tar.gz", archive).await;

    let fetcher = ArchiveFetcher::new(&fast_fetch_config()).unwrap();
    let dest = TempDir::new().unwrap();
    let summary = fetch(&fetcher, &format!("{}/a.tar.gz", server.uri()), &digest, &dest)
        .await
        .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(std::fs::read(dest.path().join("app.json")).unwrap(), b"{}");
    assert!(dest.path().join("bicep/main.bicep").is_file());
}

#[tokio::test]
async fn digest_mismatch_writes_nothing() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[("app.json", b"{}")]);
    serve_artifact(&server, "/a.tar.gz", archive).await;

    let fetcher = ArchiveFetcher::new(&fast_fetch_config()).unwrap();
    let dest = TempDir::new().unwrap();
    let err = fetch(
        &fetcher,
        &format!("{}/a.tar.gz", server.uri()),
        &sha256_digest(b"tampered"),
        &dest,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Integrity { .. }));
    assert!(is_empty_dir(dest.path()));
}

#[tokio::test]
async fn traversal_entry_is_rejected_before_writing() {
    let server = MockServer::start().await;
    let archive = support::tar_with_raw_name("../escape.json", b"{}");
    let digest = sha256_digest(&archive);
    serve_artifact(&server, "/evil.tar", archive).await;

    let fetcher = ArchiveFetcher::new(&fast_fetch_config()).unwrap();
    let root = TempDir::new().unwrap();
    let dest = root.path().join("dest");
    std::fs::create_dir(&dest).unwrap();

    let err = fetcher
        .fetch(
            &format!("{}/evil.tar", server.uri()),
            &digest,
            &dest,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::PathTraversal { .. }));
    assert!(!root.path().join("escape.json").exists());
    assert!(is_empty_dir(&dest));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.tar.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ArchiveFetcher::new(&fast_fetch_config()).unwrap();
    let dest = TempDir::new().unwrap();
    let err = fetch(
        &fetcher,
        &format!("{}/missing.tar.gz", server.uri()),
        &sha256_digest(b""),
        &dest,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[("app.json", b"{}")]);
    let digest = sha256_digest(&archive);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    serve_artifact(&server, "/a.tar.gz", archive).await;

    let fetcher = ArchiveFetcher::new(&fast_fetch_config()).unwrap();
    let dest = TempDir::new().unwrap();
    fetch(&fetcher, &format!("{}/a.tar.gz", server.uri()), &digest, &dest)
        .await
        .unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(dest.path().join("app.json").is_file());
}

#[tokio::test]
async fn oversized_download_is_rejected() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[("app.json", &[b'x'; 4096])]);
    let digest = sha256_digest(&archive);
    serve_artifact(&server, "/a.tar.gz", archive).await;

    let mut config = fast_fetch_config();
    config.max_download_size = SizeLimit::Bytes(16);
    let fetcher = ArchiveFetcher::new(&config).unwrap();
    let dest = TempDir::new().unwrap();
    let err = fetch(&fetcher, &format!("{}/a.tar.gz", server.uri()), &digest, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooLarge { limit: 16, .. }));
    assert!(is_empty_dir(dest.path()));
}

#[tokio::test]
async fn hostname_override_redirects_download() {
    let server = MockServer::start().await;
    let archive = tar_gz(&[("app.json", b"{}")]);
    let digest = sha256_digest(&archive);
    serve_artifact(&server, "/gitrepository/default/podinfo/rev1.tar.gz", archive).await;

    let address = server.address();
    let mut config = fast_fetch_config();
    config.hostname_override = Some(format!("{}:{}", address.ip(), address.port()));
    let fetcher = ArchiveFetcher::new(&config).unwrap();
    let dest = TempDir::new().unwrap();

    fetch(
        &fetcher,
        "http://source-controller.flux-system.svc/gitrepository/default/podinfo/rev1.tar.gz",
        &digest,
        &dest,
    )
    .await
    .unwrap();

    assert!(dest.path().join("app.json").is_file());
}
