//! Where meshcall keeps its config file, and writing the starter file.

use meshcall_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::template::default_config_toml;

const APP_DIR: &str = "meshcall";
const CONFIG_FILE: &str = "config.toml";

/// `<base>/meshcall/config.toml`.
pub fn config_path_in(base: &Path) -> PathBuf {
    base.join(APP_DIR).join(CONFIG_FILE)
}

/// meshcall's config file under the platform config directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|base| config_path_in(&base))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented starter config to `path`.
///
/// An existing file is left untouched so a hand-edited room or signaling
/// section is never replaced by defaults.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        debug!(path = %path.display(), "config already present, not overwriting");
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            ConfigError::ParseError(format!("cannot create {}: {e}", dir.display()))
        })?;
    }
    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::ParseError(format!("cannot write {}: {e}", path.display()))
    })?;

    info!(path = %path.display(), "wrote starter meshcall config");
    Ok(())
}
