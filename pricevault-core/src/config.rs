//! TOML configuration.
//!
//! ```toml
//! log_level = "info"
//!
//! [repository]
//! backend = "container"
//! path = "data/prices.pvc"
//! insert_policy = "reject"
//!
//! [tickers]
//! path = "config/tickers.txt"
//! ```

use crate::logging::{parse_level, Level};
use crate::store::InsertPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which repository implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Container,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Container file path.
    pub path: PathBuf,
    #[serde(default)]
    pub insert_policy: InsertPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickersConfig {
    /// Line-delimited ticker list.
    pub path: PathBuf,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// `DEBUG|INFO|WARNING|ERROR|CRITICAL`, case-insensitive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub repository: RepositoryConfig,
    pub tickers: TickersConfig,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl VaultConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Configured verbosity; unrecognized values are `INFO`.
    pub fn level(&self) -> Level {
        parse_level(&self.log_level)
    }

    /// Resolve relative paths against `base` (usually the config file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.repository.path.is_relative() {
            self.repository.path = base.join(&self.repository.path);
        }
        if self.tickers.path.is_relative() {
            self.tickers.path = base.join(&self.tickers.path);
        }
        self
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            repository: RepositoryConfig {
                backend: Backend::Container,
                path: PathBuf::from("data/prices.pvc"),
                insert_policy: InsertPolicy::Reject,
            },
            tickers: TickersConfig {
                path: PathBuf::from("config/tickers.txt"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
log_level = "debug"

[repository]
backend = "null"
path = "/var/lib/pricevault/prices.pvc"
insert_policy = "overwrite"

[tickers]
path = "tickers.txt"
"#;

    #[test]
    fn parses_full_config() {
        let cfg = VaultConfig::from_toml(FULL).unwrap();
        assert_eq!(cfg.level(), Level::DEBUG);
        assert_eq!(cfg.repository.backend, Backend::Null);
        assert_eq!(cfg.repository.insert_policy, InsertPolicy::Overwrite);
        assert_eq!(cfg.tickers.path, PathBuf::from("tickers.txt"));
    }

    #[test]
    fn defaults_for_optional_fields() {
        let cfg = VaultConfig::from_toml(
            r#"
[repository]
path = "prices.pvc"

[tickers]
path = "tickers.txt"
"#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, "INFO");
        assert_eq!(cfg.repository.backend, Backend::Container);
        assert_eq!(cfg.repository.insert_policy, InsertPolicy::Reject);
    }

    #[test]
    fn unrecognized_level_is_info() {
        let mut cfg = VaultConfig::default();
        cfg.log_level = "chatty".into();
        assert_eq!(cfg.level(), Level::INFO);
        cfg.log_level = "Warning".into();
        assert_eq!(cfg.level(), Level::WARN);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = VaultConfig::from_toml(
            r#"
[repository]
backend = "hdf5"
path = "prices.pvc"

[tickers]
path = "tickers.txt"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn resolve_paths_only_touches_relative_paths() {
        let cfg = VaultConfig::from_toml(FULL)
            .unwrap()
            .resolve_paths(Path::new("/etc/pricevault"));
        assert_eq!(
            cfg.repository.path,
            PathBuf::from("/var/lib/pricevault/prices.pvc")
        );
        assert_eq!(cfg.tickers.path, PathBuf::from("/etc/pricevault/tickers.txt"));
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = VaultConfig::default();
        let parsed = VaultConfig::from_toml(&cfg.to_toml().unwrap()).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = VaultConfig::from_file(Path::new("/nonexistent/pricevault.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
