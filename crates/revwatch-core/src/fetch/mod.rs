//! Artifact retrieval
//!
//! Download with bounded retries, digest verification and guarded tar
//! extraction.

pub mod archive;
pub mod digest;
pub mod retry;
pub mod security;
pub mod untar;

pub use archive::ArchiveFetcher;
pub use digest::{Digest, DigestAlgorithm};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use untar::{UntarSummary, untar};
