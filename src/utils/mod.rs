// src/utils/mod.rs
//! Common utilities: configuration and error types

pub mod config;
pub mod errors;

pub use self::config::{InterceptorConfig, TelemetryConfig};
pub use self::errors::{InterceptError, Result};
