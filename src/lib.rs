// src/lib.rs
//! Packet Interceptor Library
//!
//! Per-connection packet interception: every message entering or leaving a
//! connection is exposed to observers as a cancellable event before the
//! transport processes or sends it.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **pipeline**: host-agnostic duplex stage chain per connection
//! - **interception**: events, observers, the interception stage, binder and gateway
//! - **host**: the host boundary and an in-memory host
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use packet_interceptor::host::{LocalHost, Owner};
//! use packet_interceptor::interception::{InterceptionGateway, Interest, PacketEvent};
//! use std::sync::Arc;
//!
//! let host = LocalHost::new();
//! let gateway = InterceptionGateway::default();
//!
//! gateway.observers().subscribe(
//!     Interest::Outbound,
//!     Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
//!         if event.packet().kind() == "chat" {
//!             event.cancel();
//!         }
//!         Ok(())
//!     }),
//! );
//!
//! gateway.activate(&host, &Owner::new("moderation")).unwrap();
//! ```

// Public module exports
pub mod host;
pub mod interception;
pub mod observability;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use host::{Connection, ConnectionListener, Host, LocalHost, Owner};
pub use interception::{
    Direction, InterceptionGateway, Interest, ObserverRegistry, PacketEvent, PacketObserver,
};
pub use pipeline::{Message, Packet, Pipeline, Signal, Stage};
pub use utils::config::InterceptorConfig;
pub use utils::errors::{InterceptError, Result};

use chrono::{DateTime, Utc};
use std::fmt;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build metadata embedded by `build.rs`, logged at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    /// Seconds since the Unix epoch, `0` when the clock was unavailable
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }

    /// Build time, if the embedded timestamp is usable
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.build_timestamp.parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0).filter(|_| secs > 0)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet-interceptor {} ({})", self.version, self.git_hash)?;
        if let Some(built_at) = self.built_at() {
            write!(f, ", built {}", built_at.format("%Y-%m-%d %H:%M UTC"))?;
        }
        write!(f, ", {}", self.rustc_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_display() {
        let info = BuildInfo::current();
        let rendered = info.to_string();

        assert!(!info.git_hash.is_empty());
        assert!(rendered.starts_with(&format!("packet-interceptor {VERSION} (")));
        assert!(rendered.ends_with(info.rustc_version));
    }

    #[test]
    fn test_built_at_parses_epoch_seconds() {
        let info = BuildInfo {
            build_timestamp: "1700000000",
            ..BuildInfo::current()
        };
        assert_eq!(info.built_at().map(|t| t.timestamp()), Some(1_700_000_000));

        let unknown = BuildInfo {
            build_timestamp: "0",
            ..BuildInfo::current()
        };
        assert!(unknown.built_at().is_none());
        assert!(!unknown.to_string().contains("built"));
    }
}
