// src/interception/event.rs
//! Cancellable packet events
//!
//! One `PacketEvent` is created per packet transit through an interception
//! stage. Observers see it by `&mut` and may flip the cancelled flag; the
//! stage then consumes it with `into_verdict`, so the decision is read once
//! and the event cannot outlive the transit.

use crate::pipeline::message::Packet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Which way a packet is travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the peer
    Inbound,
    /// Being sent to the peer
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique id of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Ulid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the connection that owns a packet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    id: ConnectionId,
    name: Arc<str>,
}

impl ConnectionIdentity {
    /// `name` must be unique among the host's live connections
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::new(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Outcome of a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Drop,
}

/// A packet passing through an interception stage
#[derive(Debug)]
pub struct PacketEvent {
    direction: Direction,
    packet: Arc<Packet>,
    connection: ConnectionIdentity,
    cancelled: bool,
}

impl PacketEvent {
    pub fn new(direction: Direction, packet: Arc<Packet>, connection: ConnectionIdentity) -> Self {
        Self {
            direction,
            packet,
            connection,
            cancelled: false,
        }
    }

    pub fn inbound(packet: Arc<Packet>, connection: ConnectionIdentity) -> Self {
        Self::new(Direction::Inbound, packet, connection)
    }

    pub fn outbound(packet: Arc<Packet>, connection: ConnectionIdentity) -> Self {
        Self::new(Direction::Outbound, packet, connection)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The in-flight packet, shared with the transport
    pub fn packet(&self) -> &Arc<Packet> {
        &self.packet
    }

    pub fn connection(&self) -> &ConnectionIdentity {
        &self.connection
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    /// Shorthand for `set_cancelled(true)`
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Consume the event once dispatch is over
    pub fn into_verdict(self) -> Verdict {
        if self.cancelled {
            Verdict::Drop
        } else {
            Verdict::Deliver
        }
    }
}
