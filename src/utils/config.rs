// src/utils/config.rs
//! Interceptor configuration
//!
//! Values come from an optional `interceptor.toml` followed by environment
//! overrides such as `INTERCEPTOR__ANCHOR_STAGE=packet_handler` or
//! `INTERCEPTOR__TELEMETRY__JSON_LOGS=true`.

use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "interceptor";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "INTERCEPTOR";

/// Top-level interceptor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Stage the interception stage is inserted in front of
    pub anchor_stage: String,

    /// Prefix of the per-connection insertion key
    pub key_prefix: String,

    /// Dispatches slower than this are reported (microseconds)
    pub slow_dispatch_threshold_us: u64,

    /// Emit a trace line for every intercepted packet
    pub trace_packets: bool,

    pub telemetry: TelemetryConfig,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            anchor_stage: "packet_handler".to_string(),
            key_prefix: "packet_interceptor".to_string(),
            slow_dispatch_threshold_us: 500,
            trace_packets: false,
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_filter: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

impl InterceptorConfig {
    /// Load from `interceptor.{toml,json,yaml}` if present, then the environment
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Self::environment())
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from an explicit file, then the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Insertion key for a connection with the given name
    pub fn insertion_key(&self, connection_name: &str) -> String {
        format!("{}:{}", self.key_prefix, connection_name)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
