//! odooxr configuration system.
//!
//! Provides TOML-based configuration for the portal gateway and the office
//! engine with full validation. All config sections use defaults so partial
//! configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use odooxr_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{OfficeConfig, CONFIG_SCHEMA_VERSION};

use std::path::Path;

use odooxr_common::ConfigError;

/// Load and validate config.
///
/// With `path`, that file must exist. Without it, `config.toml` is read from
/// the OS config directory, and a commented default is written there if
/// none exists yet.
pub fn load_config(path: Option<&Path>) -> Result<OfficeConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &OfficeConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&OfficeConfig::default());
        for section in ["presence", "rooms", "bridge", "host", "gateway", "logging"] {
            assert!(json.contains(&format!("\"{section}\"")), "missing {section}");
        }
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nrate_per_sec = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_config_requires_explicit_path_to_exist() {
        let err = load_config(Some(Path::new("/tmp/odooxr-missing/config.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let json = config_to_json(&OfficeConfig::default());
        let parsed: OfficeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.gateway.port, 8765);
        assert_eq!(parsed.presence.timeout_secs, 45);
    }
}
