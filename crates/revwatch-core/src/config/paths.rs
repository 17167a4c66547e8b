//! Config path resolution helpers.

use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "revwatch.toml";

/// `<config dir>/revwatch/revwatch.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| config_path_in(&dir))
}

pub fn config_path_in(config_dir: &Path) -> PathBuf {
    config_dir.join("revwatch").join(CONFIG_FILE_NAME)
}
