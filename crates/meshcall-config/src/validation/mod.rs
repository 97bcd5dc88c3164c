//! Full configuration validation.
//!
//! Validates numeric ranges and string formats section by section,
//! collecting every violation into a single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::MeshConfig;
use meshcall_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &MeshConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_signaling(&mut errors, config);
    sections::validate_room(&mut errors, config);
    sections::validate_voice_activity(&mut errors, config);
    sections::validate_media(&mut errors, config);
    sections::validate_ice(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
