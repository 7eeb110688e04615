// src/interception/stage.rs
//! Per-connection interception stage
//!
//! Sits in one connection's pipeline and turns every packet passing through
//! it, in either direction, into a `PacketEvent`. Observers run inline
//! before the packet moves on; a cancelled packet stops here.
//!
//! Control signals pass through without producing events.
//!
//! # Write contract
//!
//! A cancelled outbound write still completes: its promise resolves with
//! `WriteStatus::Cancelled`, which is a success value. An observer error
//! fails the promise and is returned to whoever drove the write.

use crate::interception::event::{ConnectionIdentity, Direction, PacketEvent, Verdict};
use crate::interception::observer::ObserverRegistry;
use crate::observability::{CANCELLED_TOTAL, EVENTS_TOTAL};
use crate::pipeline::chain::StageContext;
use crate::pipeline::message::{Message, Packet};
use crate::pipeline::promise::{WriteFailure, WritePromise, WriteStatus};
use crate::pipeline::stage::Stage;
use crate::utils::config::InterceptorConfig;
use crate::utils::errors::Result;
use metrics::counter;
use std::sync::Arc;
use tracing::trace;

/// Duplex stage bound to a single connection
pub struct InterceptionStage {
    connection: ConnectionIdentity,
    insertion_key: String,
    observers: Arc<ObserverRegistry>,
    trace_packets: bool,
}

impl InterceptionStage {
    pub fn new(
        connection: ConnectionIdentity,
        insertion_key: impl Into<String>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            connection,
            insertion_key: insertion_key.into(),
            observers,
            trace_packets: false,
        }
    }

    /// Build a stage with its key derived from the connection name
    pub fn for_connection(
        connection: ConnectionIdentity,
        observers: Arc<ObserverRegistry>,
        config: &InterceptorConfig,
    ) -> Self {
        let key = config.insertion_key(connection.name());
        Self {
            trace_packets: config.trace_packets,
            ..Self::new(connection, key, observers)
        }
    }

    pub fn connection(&self) -> &ConnectionIdentity {
        &self.connection
    }

    pub fn insertion_key(&self) -> &str {
        &self.insertion_key
    }

    fn intercept(&self, direction: Direction, packet: &Arc<Packet>) -> Result<Verdict> {
        let mut event = PacketEvent::new(direction, Arc::clone(packet), self.connection.clone());
        counter!(EVENTS_TOTAL, "direction" => direction.as_str()).increment(1);

        self.observers.dispatch(&mut event)?;

        let verdict = event.into_verdict();
        if verdict == Verdict::Drop {
            counter!(CANCELLED_TOTAL, "direction" => direction.as_str()).increment(1);
        }

        if self.trace_packets {
            trace!(
                "{} {} on {}: {:?}",
                direction,
                packet.kind(),
                self.connection,
                verdict
            );
        }

        Ok(verdict)
    }
}

impl Stage for InterceptionStage {
    fn handle_inbound(&self, ctx: &StageContext<'_>, msg: Message) -> Result<()> {
        if let Message::Packet(packet) = &msg {
            if self.intercept(Direction::Inbound, packet)? == Verdict::Drop {
                return Ok(());
            }
        }

        ctx.fire_inbound(msg)
    }

    fn handle_outbound(
        &self,
        ctx: &StageContext<'_>,
        msg: Message,
        promise: WritePromise,
    ) -> Result<()> {
        if let Message::Packet(packet) = &msg {
            match self.intercept(Direction::Outbound, packet) {
                Ok(Verdict::Deliver) => {}
                Ok(Verdict::Drop) => {
                    promise.succeed(WriteStatus::Cancelled);
                    return Ok(());
                }
                Err(e) => {
                    promise.fail(WriteFailure::new(e.to_string()));
                    return Err(e);
                }
            }
        }

        ctx.forward_outbound(msg, promise)
    }
}
