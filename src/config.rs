//! Engine startup configuration.
//!
//! A config file is a JSON list of engines to start. The format carries only
//! session-startup parameters; it is otherwise opaque to the protocol core.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::Engine;
use crate::uci::UciError;

/// Startup parameters for one engine subprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Name to display for the engine. When empty, defaults to the
    /// engine-reported name once the `uci` handshake completes.
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Path to the engine executable. Required.
    pub path: String,
    /// Extra argv passed to the executable.
    pub args: Vec<String>,
    /// Max entries retained in the info buffer; 0 keeps everything.
    #[serde(rename = "infoBufCap")]
    pub info_buf_cap: usize,
    /// Stdout line buffer size in bytes; 0 selects the default.
    #[serde(rename = "lineBufSize")]
    pub line_buf_size: usize,
    /// Options applied after the handshake, in order.
    #[serde(rename = "UCIOptions")]
    pub uci_options: Vec<OptionConfig>,
}

/// One `{name, value}` option entry from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OptionConfig {
    pub name: String,
    pub value: String,
}

impl EngineConfig {
    /// Convenience constructor for callers that do not use a config file.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check the config rules: a path is required, and an option value
    /// without a name is meaningless.
    pub fn validate(&self) -> Result<(), UciError> {
        if self.path.is_empty() {
            return Err(UciError::InvalidConfig(
                "no path specified for engine".to_string(),
            ));
        }

        for option in &self.uci_options {
            if option.name.is_empty() && !option.value.is_empty() {
                return Err(UciError::InvalidOption(format!(
                    "option value {:?} specified without a name",
                    option.value
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate a JSON config file describing a list of engines.
pub fn load_config(path: impl AsRef<Path>) -> Result<Vec<EngineConfig>, UciError> {
    let raw = std::fs::read_to_string(path)?;
    let configs: Vec<EngineConfig> = serde_json::from_str(&raw)?;

    for config in &configs {
        config.validate()?;
    }
    Ok(configs)
}

/// Start every engine described in a JSON config file: spawn, handshake,
/// apply options, and wait for readiness.
pub async fn engines_from_config(path: impl AsRef<Path>) -> Result<Vec<Engine>, UciError> {
    let mut engines = Vec::new();
    for config in load_config(path)? {
        engines.push(Engine::startup(config).await?);
    }
    Ok(engines)
}
