use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::core::error::{MigrateError, MigrateResult};
use crate::core::strategy::TranslationMode;

/// Migrator settings, read from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigratorSettings {
    #[serde(default)]
    pub global: GlobalSettings,

    #[serde(default)]
    pub validator: ValidatorSettings,

    #[serde(default)]
    pub node_exporter: NodeExporterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub mode: TranslationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Executable looked up on the search path
    #[serde(default = "default_validator_binary")]
    pub binary: String,

    /// Arguments placed before the file to validate
    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExporterSettings {
    #[serde(default = "default_remote_write_url")]
    pub remote_write_url: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_validator_binary() -> String {
    "alloy".to_string()
}

fn default_validator_args() -> Vec<String> {
    vec!["validate".to_string()]
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_remote_write_url() -> String {
    "http://your-prometheus-endpoint/api/v1/write".to_string()
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            mode: TranslationMode::default(),
        }
    }
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            binary: default_validator_binary(),
            args: default_validator_args(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for NodeExporterSettings {
    fn default() -> Self {
        Self {
            remote_write_url: default_remote_write_url(),
        }
    }
}

impl MigratorSettings {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            MigrateError::settings(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> MigrateResult<Self> {
        let settings: MigratorSettings =
            toml::from_str(content).map_err(|e| MigrateError::settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> MigrateResult<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.global.log_level.as_str()) {
            return Err(MigrateError::settings(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.global.log_level, valid_log_levels
            )));
        }

        if self.validator.binary.trim().is_empty() {
            return Err(MigrateError::settings("validator.binary must not be empty"));
        }

        if self.validator.timeout_seconds == 0 {
            return Err(MigrateError::settings(
                "validator.timeout_seconds must be greater than zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = MigratorSettings::default();
        assert_eq!(settings.global.log_level, "info");
        assert_eq!(settings.global.mode, TranslationMode::Strict);
        assert_eq!(settings.validator.binary, "alloy");
        assert_eq!(settings.validator.args, vec!["validate"]);
        assert_eq!(settings.validator.timeout_seconds, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_from_str() {
        let content = r#"
[global]
log_level = "debug"
mode = "best_effort"

[validator]
binary = "/opt/alloy/bin/alloy"
timeout_seconds = 5

[node_exporter]
remote_write_url = "http://mimir:9009/api/v1/push"
"#;

        let settings = MigratorSettings::from_str(content).unwrap();
        assert_eq!(settings.global.log_level, "debug");
        assert_eq!(settings.global.mode, TranslationMode::BestEffort);
        assert_eq!(settings.validator.binary, "/opt/alloy/bin/alloy");
        assert_eq!(settings.validator.args, vec!["validate"]);
        assert_eq!(settings.validator.timeout_seconds, 5);
        assert_eq!(
            settings.node_exporter.remote_write_url,
            "http://mimir:9009/api/v1/push"
        );
    }

    #[test]
    fn test_settings_invalid_log_level() {
        let content = r#"
[global]
log_level = "verbose"
"#;
        assert!(matches!(
            MigratorSettings::from_str(content),
            Err(MigrateError::Settings(_))
        ));
    }

    #[test]
    fn test_settings_zero_timeout() {
        let content = r#"
[validator]
timeout_seconds = 0
"#;
        assert!(MigratorSettings::from_str(content).is_err());
    }

    #[tokio::test]
    async fn test_settings_from_missing_file() {
        let result = MigratorSettings::from_file("/nonexistent/migrator.toml").await;
        assert!(matches!(result, Err(MigrateError::Settings(_))));
    }
}
