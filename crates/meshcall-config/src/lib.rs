//! meshcall configuration system.
//!
//! TOML-based configuration for the room engine: signaling endpoint,
//! join/dial timing, voice-activity thresholds, synthetic media and ICE
//! servers. Every section has defaults so partial configs work.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meshcall_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config.signaling.url);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{MeshConfig, TieBreak, CONFIG_SCHEMA_VERSION};
pub use toml_loader::{load_default, load_from_path};

use meshcall_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<MeshConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &MeshConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
