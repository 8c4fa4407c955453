//! core::config::schema
//!
//! Configuration schema types.
//!
//! Located at (in order of precedence):
//! 1. `$POLYPATCH_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/polypatch/config.toml`
//! 3. `~/.polypatch/config.toml`
//!
//! # Validation
//!
//! Config values are validated after parsing so a typo in the file fails
//! the run before any remote call is made.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Output formats a config file may name as the default.
pub const VALID_FORMATS: &[&str] = &["json", "text", "diff"];

/// User configuration.
///
/// # Example
///
/// ```toml
/// api_base = "https://github.example.com/api/v3"
/// token_env = "GHE_TOKEN"
/// max_in_flight = 4
/// protected_branches = ["main", "release"]
///
/// [defaults]
/// format = "diff"
/// allow_existing = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// REST API root (GitHub Enterprise installs differ from api.github.com)
    pub api_base: Option<String>,

    /// Literal token. Prefer `token_env`.
    pub token: Option<String>,

    /// Environment variable holding the token (default: `GITHUB_TOKEN`)
    pub token_env: Option<String>,

    /// Cap on concurrent forge requests
    pub max_in_flight: Option<usize>,

    /// Branches `commit` refuses to write to
    pub protected_branches: Option<Vec<String>>,

    /// Defaults for command flags
    pub defaults: Option<CommandDefaults>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base) = &self.api_base {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "api_base '{}' must be an http(s) URL",
                    base
                )));
            }
        }

        if self.max_in_flight == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        if let Some(var) = &self.token_env {
            if var.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "token_env cannot be empty".to_string(),
                ));
            }
        }

        for branch in self.protected_branches.iter().flatten() {
            BranchName::new(branch.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid protected branch: {}", e))
            })?;
        }

        if let Some(defaults) = &self.defaults {
            defaults.validate()?;
        }

        Ok(())
    }
}

/// Command flag defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommandDefaults {
    /// Output format when `--format` is not given
    pub format: Option<String>,

    /// Treat an existing destination branch or pull request as success
    pub allow_existing: Option<bool>,
}

impl CommandDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = &self.format {
            if !VALID_FORMATS.contains(&format.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid format '{}', must be one of: {}",
                    format,
                    VALID_FORMATS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty_and_valid() {
        let config = FileConfig::default();
        assert!(config.api_base.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn roundtrip() {
        let config = FileConfig {
            api_base: Some("https://github.example.com/api/v3".to_string()),
            token: None,
            token_env: Some("GHE_TOKEN".to_string()),
            max_in_flight: Some(4),
            protected_branches: Some(vec!["main".to_string(), "release".to_string()]),
            defaults: Some(CommandDefaults {
                format: Some("diff".to_string()),
                allow_existing: Some(true),
            }),
        };

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: FileConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn reject_unknown_fields() {
        let toml = r#"
            api_base = "https://api.github.com"
            trunk = "main"
        "#;
        let result: Result<FileConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values() {
        let bad = [
            FileConfig {
                api_base: Some("ftp://example.com".into()),
                ..Default::default()
            },
            FileConfig {
                max_in_flight: Some(0),
                ..Default::default()
            },
            FileConfig {
                token_env: Some(String::new()),
                ..Default::default()
            },
            FileConfig {
                protected_branches: Some(vec!["bad..name".into()]),
                ..Default::default()
            },
            FileConfig {
                defaults: Some(CommandDefaults {
                    format: Some("yaml".into()),
                    allow_existing: None,
                }),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }
}
