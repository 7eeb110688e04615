// src/host/mod.rs
//! Host boundary
//!
//! The host owns connections and their pipelines. The interception core only
//! needs three things from it: a handle per connection, a notification when
//! a connection is ready (pipeline built, no application data yet), and a
//! way to register for those notifications.
//!
//! `local::LocalHost` is an in-memory host used by the binary, tests and
//! benchmarks.

pub mod local;

use crate::interception::event::{ConnectionId, ConnectionIdentity};
use crate::pipeline::chain::Pipeline;
use crate::pipeline::message::{Message, Packet};
use crate::pipeline::promise::WriteFuture;
use crate::utils::errors::Result;
use std::fmt;
use std::sync::Arc;
use tracing::error;

pub use local::{LocalConnection, LocalHost};

/// The application or module that activates interception
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    name: String,
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A live connection and its pipeline
#[derive(Debug)]
pub struct Connection {
    identity: ConnectionIdentity,
    pipeline: Pipeline,
}

impl Connection {
    pub fn new(identity: ConnectionIdentity, pipeline: Pipeline) -> Self {
        Self { identity, pipeline }
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    pub fn id(&self) -> ConnectionId {
        self.identity.id()
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Feed a message read from the peer into the pipeline
    ///
    /// Failures are logged here and returned; the connection stays usable.
    pub fn receive(&self, msg: Message) -> Result<()> {
        self.pipeline.fire_inbound(msg).map_err(|e| {
            error!("Inbound processing failed on {}: {}", self.identity, e);
            e
        })
    }

    pub fn send(&self, packet: Packet) -> Result<WriteFuture> {
        self.write(Message::packet(packet))
    }

    pub fn write(&self, msg: Message) -> Result<WriteFuture> {
        self.pipeline.write(msg).map_err(|e| {
            error!("Outbound processing failed on {}: {}", self.identity, e);
            e
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.pipeline.flush()
    }
}

/// Receives connection lifecycle notifications from a host
pub trait ConnectionListener: Send + Sync {
    /// Called once per connection, after its pipeline exists and before
    /// application data flows
    fn on_connection_ready(&self, connection: &Arc<Connection>) -> Result<()>;

    /// Called when the host tears the connection down
    fn on_connection_closed(&self, _connection: &Arc<Connection>) {}
}

/// A host that announces new connections
pub trait Host: Send + Sync {
    fn register_connection_listener(
        &self,
        owner: &Owner,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::message::Signal;
    use crate::pipeline::test_support::{RecordingStage, RecordingTransport};

    #[test]
    fn test_connection_accessors() {
        let identity = ConnectionIdentity::new("alice");
        let connection = Connection::new(
            identity.clone(),
            Pipeline::new(Arc::new(RecordingTransport::default())),
        );

        assert_eq!(connection.name(), "alice");
        assert_eq!(connection.id(), identity.id());
        assert!(connection.pipeline().is_empty());
    }

    #[test]
    fn test_connection_send_and_receive() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = Pipeline::new(transport.clone());
        let handler = Arc::new(RecordingStage::default());
        pipeline.add_last("packet_handler", handler.clone()).unwrap();
        let connection = Connection::new(ConnectionIdentity::new("bob"), pipeline);

        connection.send(Packet::new("chat", &b"hi"[..])).unwrap();
        connection.receive(Signal::Active.into()).unwrap();
        connection.flush().unwrap();

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(handler.inbound().len(), 1);
    }

    #[test]
    fn test_send_returns_transport_errors() {
        let connection = Connection::new(
            ConnectionIdentity::new("carol"),
            Pipeline::new(Arc::new(RecordingTransport::failing())),
        );

        assert!(connection.send(Packet::new("chat", &b"hi"[..])).is_err());
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(Owner::new("anticheat").to_string(), "anticheat");
    }
}
