// src/utils/errors.rs
//! Error types for the interception core

use crate::interception::event::Direction;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InterceptError>;

/// Interception error
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The gateway was activated a second time
    #[error("packet interception is already active (activated by {owner})")]
    AlreadyActive { owner: String },

    /// A stage with this key is already present on the pipeline
    #[error("pipeline already contains a stage named {key:?}")]
    DuplicateStage { key: String },

    /// The stage a new stage should be placed next to does not exist
    #[error("pipeline has no stage named {anchor:?}")]
    AnchorNotFound { anchor: String },

    /// An observer failed while handling an event
    #[error("observer {observer} failed on {direction} packet")]
    Observer {
        observer: String,
        direction: Direction,
        #[source]
        source: anyhow::Error,
    },

    /// A host already has a live connection with this name
    #[error("connection {name:?} is already open")]
    DuplicateConnection { name: String },

    /// The head of the pipeline could not hand the message to the wire
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl InterceptError {
    /// Whether the error came from observer code rather than the core
    pub fn is_observer_failure(&self) -> bool {
        matches!(self, InterceptError::Observer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_error_keeps_source() {
        let err = InterceptError::Observer {
            observer: "audit".to_string(),
            direction: Direction::Outbound,
            source: anyhow::anyhow!("boom"),
        };

        assert!(err.is_observer_failure());
        assert_eq!(err.to_string(), "observer audit failed on outbound packet");

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn test_duplicate_stage_message() {
        let err = InterceptError::DuplicateStage {
            key: "packet_interceptor:alice".to_string(),
        };
        assert!(err.to_string().contains("packet_interceptor:alice"));
        assert!(!err.is_observer_failure());
    }
}
