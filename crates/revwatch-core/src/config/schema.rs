//! Schema definitions for revwatch.toml

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ApiResource;

const MIB: u64 = 1024 * 1024;

/// Root configuration structure for revwatch.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub fetch: FetchConfig,
    pub target: TargetConfig,
    pub cluster: ClusterConfig,
    pub controller: ControllerConfig,
}

impl WatcherConfig {
    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fetch.validate()?;
        self.target.validate()?;
        self.controller.validate()?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `SOURCE_CONTROLLER_LOCALHOST` sets the hostname override and
    /// `REVWATCH_HTTP_RETRY` the download retry budget. Empty values are
    /// ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOSTNAME_OVERRIDE_ENV).filter(|v| !v.trim().is_empty()) {
            self.fetch.hostname_override = Some(host.trim().to_string());
        }
        if let Some(retries) = lookup(HTTP_RETRY_ENV).filter(|v| !v.trim().is_empty()) {
            self.fetch.retries = retries.trim().parse().map_err(|_| {
                anyhow::anyhow!("{} must be a non-negative integer, got '{}'", HTTP_RETRY_ENV, retries)
            })?;
        }
        Ok(())
    }
}

pub const HOSTNAME_OVERRIDE_ENV: &str = "SOURCE_CONTROLLER_LOCALHOST";
pub const HTTP_RETRY_ENV: &str = "REVWATCH_HTTP_RETRY";

/// Byte limit that can be explicitly lifted with `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SizeLimitRepr", into = "SizeLimitRepr")]
pub enum SizeLimit {
    Bytes(u64),
    Unlimited,
}

impl SizeLimit {
    /// The limit in bytes, `None` when unlimited.
    pub fn bytes(self) -> Option<u64> {
        match self {
            SizeLimit::Bytes(limit) => Some(limit),
            SizeLimit::Unlimited => None,
        }
    }

    /// Whether `size` stays within the limit.
    pub fn allows(self, size: u64) -> bool {
        self.bytes().is_none_or(|limit| size <= limit)
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        SizeLimit::Bytes(100 * MIB)
    }
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLimit::Bytes(limit) => write!(f, "{limit} bytes"),
            SizeLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SizeLimitRepr {
    Bytes(u64),
    Keyword(String),
}

impl TryFrom<SizeLimitRepr> for SizeLimit {
    type Error = String;

    fn try_from(repr: SizeLimitRepr) -> Result<Self, Self::Error> {
        match repr {
            SizeLimitRepr::Bytes(limit) => Ok(SizeLimit::Bytes(limit)),
            SizeLimitRepr::Keyword(word) if word.eq_ignore_ascii_case("unlimited") => {
                Ok(SizeLimit::Unlimited)
            }
            SizeLimitRepr::Keyword(word) => Err(format!(
                "invalid size limit '{}': expected a byte count or \"unlimited\"",
                word
            )),
        }
    }
}

impl From<SizeLimit> for SizeLimitRepr {
    fn from(limit: SizeLimit) -> Self {
        match limit {
            SizeLimit::Bytes(limit) => SizeLimitRepr::Bytes(limit),
            SizeLimit::Unlimited => SizeLimitRepr::Keyword("unlimited".to_string()),
        }
    }
}

/// Archive retriever settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Retries after the first attempt for transient failures
    pub retries: u32,
    pub retry_backoff_ms: u64,
    /// Per-attempt request timeout
    pub timeout_ms: u64,
    pub max_download_size: SizeLimit,
    pub max_untar_size: SizeLimit,
    /// Replaces the artifact URL host, e.g. `localhost:8080` during development.
    /// IPv6 hosts may be given bare (`::1`) or bracketed with a port (`[::1]:8080`).
    pub hostname_override: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 9,
            retry_backoff_ms: 500,
            timeout_ms: 60_000,
            max_download_size: SizeLimit::default(),
            max_untar_size: SizeLimit::default(),
            hostname_override: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            anyhow::bail!("fetch.timeout_ms must be greater than zero");
        }
        if let Some(host) = &self.hostname_override
            && (host.is_empty() || host.contains('/'))
        {
            anyhow::bail!("fetch.hostname_override must be a host or host:port, got '{}'", host);
        }
        Ok(())
    }
}

/// How the identity of each synthesized target resource is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityStrategy {
    /// Every entry targets `name`; later entries overwrite earlier ones
    #[default]
    Fixed,
    /// Each entry targets `<name>-<entry stem>`
    EntryName,
}

/// Target resource settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub api_version: String,
    pub kind: String,
    pub plural: String,
    pub name: String,
    pub namespace: String,
    pub identity: IdentityStrategy,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            api_version: "radapp.io/v1alpha3".to_string(),
            kind: "ApplicationDeployment".to_string(),
            plural: "applicationdeployments".to_string(),
            name: "fluxdemo".to_string(),
            namespace: "default".to_string(),
            identity: IdentityStrategy::Fixed,
        }
    }
}

impl TargetConfig {
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_api_version(&self.api_version, &self.kind, &self.plural)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("api_version", &self.api_version),
            ("kind", &self.kind),
            ("plural", &self.plural),
            ("name", &self.name),
            ("namespace", &self.namespace),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("target.{} must not be empty", field);
            }
        }
        if self.api_version.ends_with('/') || self.api_version.starts_with('/') {
            anyhow::bail!("target.api_version '{}' is malformed", self.api_version);
        }
        if !is_dns1123(&self.name, 253, true) {
            anyhow::bail!(
                "target.name '{}' must be a lower-case DNS-1123 name of at most 253 characters",
                self.name
            );
        }
        if !is_dns1123(&self.namespace, 63, false) {
            anyhow::bail!(
                "target.namespace '{}' must be a lower-case DNS-1123 label of at most 63 characters",
                self.namespace
            );
        }
        Ok(())
    }
}

/// Lower-case alphanumerics and '-' (plus '.' when `dots`), alphanumeric at both ends.
fn is_dns1123(value: &str, max_len: usize, dots: bool) -> bool {
    let allowed = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || (dots && c == '.')
    };
    let edge = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    value.len() <= max_len
        && value.chars().all(allowed)
        && edge(value.chars().next())
        && edge(value.chars().last())
}

/// Cluster API connection settings
///
/// Without `api_server` the in-cluster service account is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub api_server: Option<String>,
    pub token_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
}

/// Hosting control loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Parent of the per-reconcile scratch directories, system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
    pub requeue_base_ms: u64,
    pub requeue_max_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            requeue_base_ms: 5_000,
            requeue_max_ms: 1_000_000,
        }
    }
}

impl ControllerConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.requeue_base_ms == 0 {
            anyhow::bail!("controller.requeue_base_ms must be greater than zero");
        }
        if self.requeue_max_ms < self.requeue_base_ms {
            anyhow::bail!("controller.requeue_max_ms must not be lower than requeue_base_ms");
        }
        Ok(())
    }
}
