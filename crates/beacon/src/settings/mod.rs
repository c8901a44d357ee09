//! Configuration loading.
//!
//! Defaults, then an optional TOML file, then `BEACON_*` environment
//! variables (e.g. `BEACON_STREAM__GAP_THRESHOLD_MS=2000`).

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            cors_origins: Vec::new(),
        }
    }
}

/// Tunables for the streaming core. The gap threshold and the coding-tool
/// set are deployment knobs, not code constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Idle interval after which an active session shows `loading`.
    pub gap_threshold_ms: u64,
    /// Tool names (any decoration/case) that count as code execution.
    pub coding_tools: Vec<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            gap_threshold_ms: 5000,
            coding_tools: vec![
                "python_interpreter".to_string(),
                "code_interpreter".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Load settings, layering file and environment over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path).format(FileFormat::Toml).required(true),
            );
        }

        let config = builder
            .add_source(Environment::with_prefix("BEACON").separator("__"))
            .build()
            .context("loading configuration")?;

        config.try_deserialize().context("parsing configuration")
    }
}
