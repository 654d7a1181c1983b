use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::logging::Severity;

fn default_log_id() -> String {
    "session".to_string()
}

fn default_log_severity() -> Severity {
    Severity::Warning
}

fn default_stream_pool_capacity() -> usize {
    4
}

/// Session-wide settings, usually read from a JSON settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionOptions {
    #[serde(default = "default_log_id")]
    pub log_id: String,
    #[serde(default = "default_log_severity")]
    pub log_severity: Severity,
    /// Record a trace event for every executed step.
    #[serde(default)]
    pub trace_enabled: bool,
    /// Maximum number of idle stream collections kept for full runs.
    #[serde(default = "default_stream_pool_capacity")]
    pub stream_pool_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            log_id: default_log_id(),
            log_severity: default_log_severity(),
            trace_enabled: false,
            stream_pool_capacity: default_stream_pool_capacity(),
        }
    }
}

impl SessionOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid session options")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read session options {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Apply `STEPWISE_LOG_SEVERITY` and `STEPWISE_TRACE_EVENTS` overrides.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(value) = env::var("STEPWISE_LOG_SEVERITY") {
            self.log_severity = Severity::from_ident(&value)
                .ok_or_else(|| anyhow!("invalid STEPWISE_LOG_SEVERITY value: {}", value))?;
        }
        if let Ok(value) = env::var("STEPWISE_TRACE_EVENTS") {
            self.trace_enabled = matches!(value.trim(), "1" | "true" | "on");
        }
        Ok(self)
    }
}
