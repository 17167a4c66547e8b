//! Configuration loading for the watcher
//!
//! Settings come from `revwatch.toml` with a small set of environment
//! overrides applied on top.

pub mod parser;
pub mod paths;
pub mod schema;

use std::path::Path;

pub use parser::{parse_watcher_toml, parse_watcher_toml_str, to_toml};
pub use paths::default_config_path;
pub use schema::{
    ClusterConfig, ControllerConfig, FetchConfig, IdentityStrategy, SizeLimit, TargetConfig,
    WatcherConfig,
};

/// Load configuration from `path`, or from the default location when `None`.
///
/// A missing default file yields the defaults, a missing explicit one is an
/// error. Environment overrides are always applied and the result is
/// validated.
pub fn load(path: Option<&Path>) -> anyhow::Result<WatcherConfig> {
    let mut config = match path {
        Some(path) => parse_watcher_toml(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => parse_watcher_toml(&path)?,
            _ => WatcherConfig::default(),
        },
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}
