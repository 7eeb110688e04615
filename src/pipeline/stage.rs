// src/pipeline/stage.rs
//! Stage and transport contracts

use crate::pipeline::chain::StageContext;
use crate::pipeline::message::Message;
use crate::pipeline::promise::WritePromise;
use crate::utils::errors::Result;

/// One duplex step in a connection pipeline
///
/// Both entry points receive the message and a context whose `fire_inbound`
/// / `forward_outbound` continue the chain. A stage that returns without
/// calling the continuation consumes the message. The defaults pass
/// everything through.
pub trait Stage: Send + Sync {
    /// Message read from the peer, travelling toward the pipeline tail
    fn handle_inbound(&self, ctx: &StageContext<'_>, msg: Message) -> Result<()> {
        ctx.fire_inbound(msg)
    }

    /// Message written by the application, travelling toward the transport
    ///
    /// A stage that consumes the message must resolve `promise`.
    fn handle_outbound(
        &self,
        ctx: &StageContext<'_>,
        msg: Message,
        promise: WritePromise,
    ) -> Result<()> {
        ctx.forward_outbound(msg, promise)
    }
}

/// Head of the pipeline: hands outbound messages to the wire
pub trait Transport: Send + Sync {
    fn transmit(&self, msg: Message) -> Result<()>;
}
