//! Locating and reading the analyzer's TOML configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::pattern::RuleError;

use super::AnalyzerConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SESSION_LENS_CONFIG";

const LOCAL_FILE: &str = ".session-lens.toml";

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Finds the first existing config file among a list of candidates.
#[derive(Debug)]
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Candidates in priority order: `$SESSION_LENS_CONFIG`, then
    /// `./.session-lens.toml`, then `<config_dir>/session-lens/config.toml`.
    #[must_use]
    pub fn new() -> Self {
        let mut candidates = Vec::new();
        if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.push(PathBuf::from(LOCAL_FILE));
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("session-lens").join("config.toml"));
        }
        Self { candidates }
    }

    /// Only consult `path`.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            candidates: vec![path],
        }
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load(&self) -> Result<AnalyzerConfig, ConfigError> {
        self.load_with_source().map(|(config, _)| config)
    }

    /// Like [`load`](Self::load), also reporting which file was used.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_source(&self) -> Result<(AnalyzerConfig, ConfigSource), ConfigError> {
        let (config, source) = match self.find_config_file() {
            Some(path) => (read_file(&path)?, ConfigSource::File(path)),
            None => (AnalyzerConfig::default(), ConfigSource::Defaults),
        };
        config.validate()?;
        tracing::debug!(source = %source, "Configuration loaded");
        Ok((config, source))
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that is an existing file.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|p| p.is_file()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_file(path: &Path) -> Result<AnalyzerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A configured rule pattern does not compile.
    #[error(transparent)]
    Rule(#[from] RuleError),
}
