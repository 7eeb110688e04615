// src/pipeline/message.rs
//! Messages carried through a connection pipeline
//!
//! A pipeline carries two kinds of traffic: protocol packets, which are
//! surfaced to observers, and transport-internal control signals, which are
//! not.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// An in-flight protocol message
///
/// The payload is already encoded (or not yet decoded) by the protocol layer
/// and is never interpreted here. Packets travel as `Arc<Packet>`, so the
/// same allocation is handed from stage to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: String,
    payload: Bytes,
}

impl Packet {
    pub fn new(kind: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Protocol-level label, e.g. `"clientbound/chat"`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether two handles point at the same in-flight packet
    pub fn same(a: &Arc<Packet>, b: &Arc<Packet>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

/// Transport-internal control signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The connection became active
    Active,
    /// The connection is going away
    Inactive,
    /// Flush buffered writes to the wire
    Flush,
    /// Host-defined notification
    User(String),
}

/// Anything that travels through a pipeline
#[derive(Debug, Clone)]
pub enum Message {
    Packet(Arc<Packet>),
    Control(Signal),
}

impl Message {
    pub fn packet(packet: Packet) -> Self {
        Message::Packet(Arc::new(packet))
    }

    pub fn as_packet(&self) -> Option<&Arc<Packet>> {
        match self {
            Message::Packet(packet) => Some(packet),
            Message::Control(_) => None,
        }
    }

    pub fn is_packet(&self) -> bool {
        matches!(self, Message::Packet(_))
    }
}

impl From<Arc<Packet>> for Message {
    fn from(packet: Arc<Packet>) -> Self {
        Message::Packet(packet)
    }
}

impl From<Signal> for Message {
    fn from(signal: Signal) -> Self {
        Message::Control(signal)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Packet(packet) => write!(f, "packet {} ({} bytes)", packet.kind, packet.len()),
            Message::Control(signal) => write!(f, "control {:?}", signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_identity() {
        let a = Arc::new(Packet::new("chat", &b"hi"[..]));
        let b = Arc::new(Packet::new("chat", &b"hi"[..]));

        // Equal content, different packets
        assert_eq!(*a, *b);
        assert!(!Packet::same(&a, &b));
        assert!(Packet::same(&a, &Arc::clone(&a)));
    }

    #[test]
    fn test_message_classification() {
        let msg = Message::packet(Packet::new("keep_alive", Bytes::new()));
        assert!(msg.is_packet());
        assert_eq!(msg.as_packet().map(|p| p.kind()), Some("keep_alive"));

        let msg: Message = Signal::Flush.into();
        assert!(!msg.is_packet());
        assert!(msg.as_packet().is_none());
    }

    #[test]
    fn test_display() {
        let msg = Message::packet(Packet::new("chat", &b"abc"[..]));
        assert_eq!(msg.to_string(), "packet chat (3 bytes)");
        assert_eq!(Message::from(Signal::Flush).to_string(), "control Flush");
    }
}
