// src/host/local.rs
//! In-memory host
//!
//! Builds a two-stage pipeline per connection and exposes both ends through
//! channels: what the application layer received, and what went out on the
//! wire.
//!
//! ```text
//! wire ◄──► [framer] ◄──► [packet_handler] ──► delivered
//! ```

use crate::host::{Connection, ConnectionListener, Host, Owner};
use crate::interception::event::{ConnectionId, ConnectionIdentity};
use crate::pipeline::chain::{Pipeline, StageContext};
use crate::pipeline::message::{Message, Packet, Signal};
use crate::pipeline::promise::{WriteFuture, WritePromise};
use crate::pipeline::stage::{Stage, Transport};
use crate::utils::errors::{InterceptError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Head stage key
pub const FRAMER_STAGE: &str = "framer";

/// Terminal stage key; the interception stage is inserted in front of it
pub const PACKET_HANDLER_STAGE: &str = "packet_handler";

/// Writes to an in-memory wire
struct ChannelTransport {
    wire: Sender<Message>,
}

impl Transport for ChannelTransport {
    fn transmit(&self, msg: Message) -> Result<()> {
        self.wire
            .send(msg)
            .map_err(|_| InterceptError::Transport("peer hung up".to_string()))
    }
}

/// Counts packets crossing the wire boundary
#[derive(Default)]
struct Framer {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Framer {
    fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

impl Stage for Framer {
    fn handle_inbound(&self, ctx: &StageContext<'_>, msg: Message) -> Result<()> {
        if let Some(packet) = msg.as_packet() {
            self.frames_in.fetch_add(1, Ordering::Relaxed);
            self.bytes_in.fetch_add(packet.len() as u64, Ordering::Relaxed);
        }
        ctx.fire_inbound(msg)
    }

    fn handle_outbound(
        &self,
        ctx: &StageContext<'_>,
        msg: Message,
        promise: WritePromise,
    ) -> Result<()> {
        if let Some(packet) = msg.as_packet() {
            self.frames_out.fetch_add(1, Ordering::Relaxed);
            self.bytes_out.fetch_add(packet.len() as u64, Ordering::Relaxed);
        }
        ctx.forward_outbound(msg, promise)
    }
}

/// Terminal stage handing decoded packets to the application layer
struct PacketHandler {
    delivered: Sender<Arc<Packet>>,
}

impl Stage for PacketHandler {
    fn handle_inbound(&self, _ctx: &StageContext<'_>, msg: Message) -> Result<()> {
        match msg {
            Message::Packet(packet) => {
                // Application side may already be gone
                let _ = self.delivered.send(packet);
            }
            Message::Control(signal) => trace!("packet_handler consumed {:?}", signal),
        }
        Ok(())
    }
}

/// Packet counters measured at the wire end of a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// A connection opened on a `LocalHost`, with both ends exposed
pub struct LocalConnection {
    connection: Arc<Connection>,
    delivered: Receiver<Arc<Packet>>,
    wire: Receiver<Message>,
    framer: Arc<Framer>,
}

impl LocalConnection {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Simulate the peer sending `packet`
    pub fn receive_from_peer(&self, packet: Arc<Packet>) -> Result<()> {
        self.connection.receive(Message::Packet(packet))
    }

    /// Application-side write toward the peer
    pub fn send(&self, packet: Arc<Packet>) -> Result<WriteFuture> {
        self.connection.write(Message::Packet(packet))
    }

    /// Packets that reached the application layer so far
    pub fn drain_delivered(&self) -> Vec<Arc<Packet>> {
        self.delivered.try_iter().collect()
    }

    /// Messages that reached the wire so far
    pub fn drain_wire(&self) -> Vec<Message> {
        self.wire.try_iter().collect()
    }

    pub fn delivered(&self) -> &Receiver<Arc<Packet>> {
        &self.delivered
    }

    pub fn wire(&self) -> &Receiver<Message> {
        &self.wire
    }

    pub fn traffic(&self) -> TrafficStats {
        self.framer.snapshot()
    }
}

type ListenerEntry = (Owner, Arc<dyn ConnectionListener>);

/// In-memory host
#[derive(Default)]
pub struct LocalHost {
    listeners: RwLock<Vec<ListenerEntry>>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    names: DashMap<String, ConnectionId>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection and announce it to every listener
    ///
    /// Connection names are unique among live connections. Listener failures
    /// are logged; the connection opens regardless. If the pipeline rejects
    /// the activation signal the connection is torn down and the name freed.
    pub fn open(&self, name: &str) -> Result<LocalConnection> {
        let (wire_tx, wire_rx) = unbounded();
        let (delivered_tx, delivered_rx) = unbounded();
        let framer = Arc::new(Framer::default());

        let pipeline = Pipeline::new(Arc::new(ChannelTransport { wire: wire_tx }));
        pipeline.add_last(FRAMER_STAGE, framer.clone())?;
        pipeline.add_last(
            PACKET_HANDLER_STAGE,
            Arc::new(PacketHandler {
                delivered: delivered_tx,
            }),
        )?;

        let identity = ConnectionIdentity::new(name);
        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(InterceptError::DuplicateConnection {
                    name: name.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(identity.id());
            }
        }

        let connection = Arc::new(Connection::new(identity, pipeline));
        self.connections
            .insert(connection.id(), Arc::clone(&connection));
        debug!("Opened connection {}", connection.identity());

        for (owner, listener) in self.listeners_snapshot() {
            if let Err(e) = listener.on_connection_ready(&connection) {
                error!(
                    "Connection listener of {} failed for {}: {}",
                    owner,
                    connection.identity(),
                    e
                );
            }
        }

        if let Err(e) = connection.receive(Signal::Active.into()) {
            self.discard(&connection);
            return Err(e);
        }

        Ok(LocalConnection {
            connection,
            delivered: delivered_rx,
            wire: wire_rx,
            framer,
        })
    }

    /// Tear a connection down; closing an unknown id is a no-op
    pub fn close(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(&id)?;
        self.names.remove(connection.name());

        // Already logged by the connection
        let _ = connection.receive(Signal::Inactive.into());

        self.notify_closed(&connection);
        debug!("Closed connection {}", connection.identity());
        Some(connection)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn listeners_snapshot(&self) -> Vec<ListenerEntry> {
        self.listeners.read().clone()
    }

    fn notify_closed(&self, connection: &Arc<Connection>) {
        for (_, listener) in self.listeners_snapshot() {
            listener.on_connection_closed(connection);
        }
    }

    /// Drop a connection that never finished opening
    fn discard(&self, connection: &Arc<Connection>) {
        self.connections.remove(&connection.id());
        self.names
            .remove_if(connection.name(), |_, id| *id == connection.id());
        self.notify_closed(connection);
        debug!("Discarded connection {}", connection.identity());
    }
}

impl Host for LocalHost {
    fn register_connection_listener(
        &self,
        owner: &Owner,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<()> {
        self.listeners.write().push((owner.clone(), listener));
        info!("Registered connection listener for {}", owner);
        Ok(())
    }
}
