//! Configuration loading and management

mod io;
mod settings;

pub use settings::{RoutingSettings, SessionSettings, TranscriptSettings};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default log filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// PTY session settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Terminal routing settings
    #[serde(default)]
    pub routing: RoutingSettings,

    /// Transcript watching settings
    #[serde(default)]
    pub transcript: TranscriptSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            session: SessionSettings::default(),
            routing: RoutingSettings::default(),
            transcript: TranscriptSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the buffering invariants
    pub fn validate(&self) -> Result<()> {
        if self.session.max_output_entries == 0 {
            anyhow::bail!("session.max_output_entries must be greater than 0");
        }
        if self.session.max_line_length == 0 {
            anyhow::bail!("session.max_line_length must be greater than 0");
        }
        if self.session.cols == 0 || self.session.rows == 0 {
            anyhow::bail!("session.cols and session.rows must be greater than 0");
        }
        Ok(())
    }
}
