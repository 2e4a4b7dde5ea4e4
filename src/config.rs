//! Configuration loaded from TOML. Every section has defaults, so an empty
//! file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::source::charset_for_label;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the voter database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `sqlite://` connection URL
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://voters.db".to_string(),
            max_connections: 4,
        }
    }
}

/// How extracts are read and buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records buffered before a flush
    pub batch_size: usize,
    /// Column separator; must be ASCII
    pub delimiter: char,
    /// WHATWG encoding label of the extract, e.g. `utf-8` or `windows-1252`
    pub charset: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 5_000,
            delimiter: ',',
            charset: "utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.store.database_url.trim().is_empty() {
            errors.push("store.database_url must not be empty".to_string());
        }
        if self.store.max_connections == 0 {
            errors.push("store.max_connections must be positive".to_string());
        }
        if self.ingest.batch_size == 0 {
            errors.push("ingest.batch_size must be positive".to_string());
        }
        if !self.ingest.delimiter.is_ascii() || self.ingest.delimiter == '"' {
            errors.push(format!(
                "ingest.delimiter {:?} must be an ASCII character other than '\"'",
                self.ingest.delimiter
            ));
        }
        if charset_for_label(&self.ingest.charset).is_err() {
            errors.push(format!("ingest.charset {:?} is not a known encoding", self.ingest.charset));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "invalid configuration:\n  - {}",
                errors.join("\n  - ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ingest.batch_size, 5_000);
        assert_eq!(config.ingest.delimiter, ',');
        assert_eq!(config.store.database_url, "sqlite://voters.db");
        assert_eq!(config.logging.level, LogLevel::Info);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ingest]
            batch_size = 250
            charset = "windows-1252"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.ingest.delimiter, ',');
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Info);
        config.validate().unwrap();
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        config.ingest.delimiter = 'é';
        config.ingest.charset = "klingon".to_string();
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("batch_size"), "{message}");
        assert!(message.contains("delimiter"), "{message}");
        assert!(message.contains("charset"), "{message}");
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, "[store]\ndatabase_url = \"sqlite://test.db\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.database_url, "sqlite://test.db");
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
