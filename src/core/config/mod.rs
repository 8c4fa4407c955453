//! core::config
//!
//! Configuration loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (not handled here)
//!
//! # Locations
//!
//! An explicit `--config` path wins. Otherwise searched in order:
//! 1. `$POLYPATCH_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/polypatch/config.toml`
//! 3. `~/.polypatch/config.toml`
//!
//! A missing file is not an error; defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use polypatch::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("API: {}", config.api_base());
//! println!("Protected: {:?}", config.protected_branches());
//! ```

pub mod schema;

pub use schema::{CommandDefaults, FileConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::types::BranchName;
use crate::forge::github::{DEFAULT_API_BASE, DEFAULT_MAX_IN_FLIGHT};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "POLYPATCH_CONFIG";

/// Environment variable the token is read from unless configured otherwise.
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Branches `commit` refuses to write to unless configured otherwise.
pub const DEFAULT_PROTECTED_BRANCHES: &[&str] = &["master", "main"];

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: FileConfig,
    /// Path the file was loaded from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// `explicit` must exist if given; the search locations are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let candidates = search_paths(|key| std::env::var(key).ok(), dirs::home_dir());
        match candidates.into_iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate one config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// REST API root.
    ///
    /// Defaults to `https://api.github.com`.
    pub fn api_base(&self) -> &str {
        self.file.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    /// Name of the environment variable holding the token.
    pub fn token_env(&self) -> &str {
        self.file.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Resolve the API token: the literal `token` first, then `token_env`.
    pub fn token(&self) -> Option<String> {
        self.token_with(|key| std::env::var(key).ok())
    }

    fn token_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.file
            .token
            .clone()
            .or_else(|| env(self.token_env()))
            .filter(|t| !t.trim().is_empty())
    }

    /// Cap on concurrent forge requests.
    pub fn max_in_flight(&self) -> usize {
        self.file.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT)
    }

    /// Branches `commit` refuses to write to.
    ///
    /// Defaults to `master` and `main`. Values were validated at load time.
    pub fn protected_branches(&self) -> Vec<BranchName> {
        match &self.file.protected_branches {
            Some(names) => names
                .iter()
                .filter_map(|n| BranchName::new(n.as_str()).ok())
                .collect(),
            None => DEFAULT_PROTECTED_BRANCHES
                .iter()
                .filter_map(|n| BranchName::new(*n).ok())
                .collect(),
        }
    }

    /// Default output format, if configured.
    pub fn default_format(&self) -> Option<&str> {
        self.file.defaults.as_ref().and_then(|d| d.format.as_deref())
    }

    /// Whether existing branches and pull requests count as success.
    ///
    /// Defaults to `false`.
    pub fn allow_existing(&self) -> bool {
        self.file
            .defaults
            .as_ref()
            .and_then(|d| d.allow_existing)
            .unwrap_or(false)
    }

    /// Where the config was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Candidate config locations in search order.
fn search_paths(env: impl Fn(&str) -> Option<String>, home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = env(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }
    if let Some(xdg) = env("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("polypatch/config.toml"));
    }
    if let Some(home) = home {
        paths.push(home.join(".polypatch/config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.api_base(), "https://api.github.com");
        assert_eq!(config.token_env(), "GITHUB_TOKEN");
        assert_eq!(config.max_in_flight(), 8);
        assert!(!config.allow_existing());
        assert!(config.default_format().is_none());
        let protected: Vec<_> = config
            .protected_branches()
            .iter()
            .map(|b| b.to_string())
            .collect();
        assert_eq!(protected, vec!["master", "main"]);
    }

    #[test]
    fn load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = write(
            &temp,
            r#"
            api_base = "https://ghe.example.com/api/v3"
            max_in_flight = 2
            protected_branches = ["release"]

            [defaults]
            format = "diff"
            allow_existing = true
            "#,
        );

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api_base(), "https://ghe.example.com/api/v3");
        assert_eq!(config.max_in_flight(), 2);
        assert_eq!(config.protected_branches()[0].as_str(), "release");
        assert_eq!(config.default_format(), Some("diff"));
        assert!(config.allow_existing());
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(Some(&temp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn parse_and_validation_errors() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "max_in_flight = \"lots\"");
        assert!(matches!(
            Config::load_from(&path).unwrap_err(),
            ConfigError::ParseError { .. }
        ));

        let path = write(&temp, "max_in_flight = 0");
        assert!(matches!(
            Config::load_from(&path).unwrap_err(),
            ConfigError::InvalidValue(_)
        ));
    }

    #[test]
    fn search_order() {
        let env = |key: &str| match key {
            "POLYPATCH_CONFIG" => Some("/explicit.toml".to_string()),
            "XDG_CONFIG_HOME" => Some("/xdg".to_string()),
            _ => None,
        };
        let paths = search_paths(env, Some(PathBuf::from("/home/u")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/explicit.toml"),
                PathBuf::from("/xdg/polypatch/config.toml"),
                PathBuf::from("/home/u/.polypatch/config.toml"),
            ]
        );

        assert!(search_paths(|_| None, None).is_empty());
    }

    #[test]
    fn token_precedence() {
        let env = |key: &str| (key == "GITHUB_TOKEN").then(|| "from-env".to_string());

        let config = Config::default();
        assert_eq!(config.token_with(env).as_deref(), Some("from-env"));

        let config = Config {
            file: FileConfig {
                token: Some("literal".into()),
                ..Default::default()
            },
            path: None,
        };
        assert_eq!(config.token_with(env).as_deref(), Some("literal"));

        let config = Config {
            file: FileConfig {
                token_env: Some("OTHER".into()),
                ..Default::default()
            },
            path: None,
        };
        assert_eq!(config.token_with(env), None);
    }
}
