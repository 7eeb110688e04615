// src/interception/binder.rs
//! Connection binder
//!
//! Splices a fresh `InterceptionStage` into every connection the host
//! announces, directly in front of the terminal packet handler stage:
//!
//! ```text
//! [framer] ──► [packet_interceptor:<name>] ──► [packet_handler]
//! ```
//!
//! The binder makes no decisions of its own.

use crate::host::{Connection, ConnectionListener};
use crate::interception::observer::ObserverRegistry;
use crate::interception::stage::InterceptionStage;
use crate::utils::config::InterceptorConfig;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::debug;

pub struct ConnectionBinder {
    observers: Arc<ObserverRegistry>,
    config: InterceptorConfig,
}

impl ConnectionBinder {
    pub fn new(observers: Arc<ObserverRegistry>, config: InterceptorConfig) -> Self {
        Self { observers, config }
    }

    /// Stage the interception stage is inserted in front of
    pub fn anchor(&self) -> &str {
        &self.config.anchor_stage
    }

    /// Insertion key used for `connection`
    pub fn key_for(&self, connection: &Connection) -> String {
        self.config.insertion_key(connection.name())
    }

    /// Insert an interception stage into `connection`'s pipeline
    ///
    /// Fails with `DuplicateStage` if the connection is already bound and
    /// with `AnchorNotFound` if the pipeline has no anchor stage.
    pub fn bind(&self, connection: &Connection) -> Result<()> {
        let stage = InterceptionStage::for_connection(
            connection.identity().clone(),
            Arc::clone(&self.observers),
            &self.config,
        );
        let key = stage.insertion_key().to_string();

        connection
            .pipeline()
            .add_before(&self.config.anchor_stage, key.clone(), Arc::new(stage))?;

        debug!(
            "Bound {} to {} before {}",
            key,
            connection.identity(),
            self.config.anchor_stage
        );
        Ok(())
    }

    /// Remove the interception stage, if present
    pub fn unbind(&self, connection: &Connection) -> bool {
        let removed = connection
            .pipeline()
            .remove(&self.key_for(connection))
            .is_some();

        if removed {
            debug!("Unbound interception stage from {}", connection.identity());
        }
        removed
    }
}

impl ConnectionListener for ConnectionBinder {
    fn on_connection_ready(&self, connection: &Arc<Connection>) -> Result<()> {
        self.bind(connection)
    }

    fn on_connection_closed(&self, connection: &Arc<Connection>) {
        self.unbind(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::event::ConnectionIdentity;
    use crate::pipeline::chain::Pipeline;
    use crate::pipeline::test_support::{RecordingStage, RecordingTransport};
    use crate::utils::errors::InterceptError;

    fn connection(name: &str, stages: &[&str]) -> Arc<Connection> {
        let pipeline = Pipeline::new(Arc::new(RecordingTransport::default()));
        for key in stages {
            pipeline
                .add_last(*key, Arc::new(RecordingStage::default()))
                .unwrap();
        }
        Arc::new(Connection::new(ConnectionIdentity::new(name), pipeline))
    }

    fn binder() -> ConnectionBinder {
        ConnectionBinder::new(
            Arc::new(ObserverRegistry::default()),
            InterceptorConfig::default(),
        )
    }

    #[test]
    fn test_bind_inserts_before_anchor() {
        let binder = binder();
        let conn = connection("alice", &["framer", "decoder", "packet_handler"]);

        binder.on_connection_ready(&conn).unwrap();

        assert_eq!(binder.anchor(), "packet_handler");
        assert_eq!(
            conn.pipeline().keys(),
            vec!["framer", "decoder", "packet_interceptor:alice", "packet_handler"]
        );
    }

    #[test]
    fn test_double_bind_rejected() {
        let binder = binder();
        let conn = connection("alice", &["packet_handler"]);

        binder.bind(&conn).unwrap();
        let err = binder.bind(&conn).unwrap_err();

        assert!(
            matches!(err, InterceptError::DuplicateStage { ref key } if key == "packet_interceptor:alice")
        );
        let bound = conn
            .pipeline()
            .keys()
            .into_iter()
            .filter(|key| key.starts_with("packet_interceptor:"))
            .count();
        assert_eq!(bound, 1);
    }

    #[test]
    fn test_missing_anchor() {
        let binder = binder();
        let conn = connection("alice", &["framer"]);

        let err = binder.bind(&conn).unwrap_err();
        assert!(matches!(err, InterceptError::AnchorNotFound { .. }));
        assert_eq!(conn.pipeline().len(), 1);
    }

    #[test]
    fn test_custom_anchor_and_prefix() {
        let config = InterceptorConfig {
            anchor_stage: "decoder".to_string(),
            key_prefix: "audit".to_string(),
            ..InterceptorConfig::default()
        };
        let binder = ConnectionBinder::new(Arc::new(ObserverRegistry::default()), config);
        let conn = connection("bob", &["framer", "decoder", "packet_handler"]);

        binder.bind(&conn).unwrap();
        assert_eq!(
            conn.pipeline().keys(),
            vec!["framer", "audit:bob", "decoder", "packet_handler"]
        );
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let binder = binder();
        let conn = connection("alice", &["packet_handler"]);
        binder.bind(&conn).unwrap();

        binder.on_connection_closed(&conn);
        assert!(!binder.unbind(&conn));
        assert_eq!(conn.pipeline().keys(), vec!["packet_handler"]);

        // Rebinding after removal works
        binder.bind(&conn).unwrap();
        assert!(conn.pipeline().contains(&binder.key_for(&conn)));
    }
}
