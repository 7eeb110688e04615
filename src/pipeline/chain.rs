// src/pipeline/chain.rs
//! Ordered, named stage chain for a single connection
//!
//! Inbound messages enter at index 0 and travel toward the tail. Outbound
//! writes enter at the tail and travel toward index 0, then into the
//! transport.
//!
//! ```text
//! transport ◄── [0] decoder ◄── [1] interceptor ◄── [2] packet_handler ◄── write()
//! peer      ──► [0] decoder ──► [1] interceptor ──► [2] packet_handler
//! ```
//!
//! The stage list is copy-on-write: mutation swaps in a new `Arc<Vec<_>>`,
//! while a message already in flight keeps walking the snapshot it started
//! with.

use crate::pipeline::message::{Message, Signal};
use crate::pipeline::promise::{WriteFailure, WriteFuture, WritePromise, WriteStatus};
use crate::pipeline::stage::{Stage, Transport};
use crate::utils::errors::{InterceptError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone)]
struct StageEntry {
    key: String,
    stage: Arc<dyn Stage>,
}

/// Per-connection stage chain
pub struct Pipeline {
    stages: RwLock<Arc<Vec<StageEntry>>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Create an empty pipeline writing to `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            stages: RwLock::new(Arc::new(Vec::new())),
            transport,
        }
    }

    /// Append a stage at the tail
    pub fn add_last(&self, key: impl Into<String>, stage: Arc<dyn Stage>) -> Result<()> {
        self.insert_with(key.into(), stage, |stages| Ok(stages.len()))
    }

    /// Prepend a stage at the head
    pub fn add_first(&self, key: impl Into<String>, stage: Arc<dyn Stage>) -> Result<()> {
        self.insert_with(key.into(), stage, |_| Ok(0))
    }

    /// Insert a stage immediately in front of `anchor` (closer to the transport)
    pub fn add_before(
        &self,
        anchor: &str,
        key: impl Into<String>,
        stage: Arc<dyn Stage>,
    ) -> Result<()> {
        self.insert_with(key.into(), stage, |stages| position_of(stages, anchor))
    }

    /// Insert a stage immediately behind `anchor` (closer to the tail)
    pub fn add_after(
        &self,
        anchor: &str,
        key: impl Into<String>,
        stage: Arc<dyn Stage>,
    ) -> Result<()> {
        self.insert_with(key.into(), stage, |stages| {
            position_of(stages, anchor).map(|index| index + 1)
        })
    }

    fn insert_with<F>(&self, key: String, stage: Arc<dyn Stage>, position: F) -> Result<()>
    where
        F: FnOnce(&[StageEntry]) -> Result<usize>,
    {
        let mut stages = self.stages.write();

        if stages.iter().any(|entry| entry.key == key) {
            return Err(InterceptError::DuplicateStage { key });
        }

        let index = position(stages.as_slice())?;
        let mut next = Vec::with_capacity(stages.len() + 1);
        next.extend(stages.iter().cloned());
        debug!("Inserting stage {} at position {}", key, index);
        next.insert(index, StageEntry { key, stage });
        *stages = Arc::new(next);

        Ok(())
    }

    /// Remove a stage by key; removing an absent key is a no-op
    pub fn remove(&self, key: &str) -> Option<Arc<dyn Stage>> {
        let mut stages = self.stages.write();
        let index = stages.iter().position(|entry| entry.key == key)?;

        let mut next: Vec<StageEntry> = stages.iter().cloned().collect();
        let removed = next.remove(index);
        *stages = Arc::new(next);

        debug!("Removed stage {}", key);
        Some(removed.stage)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Stage>> {
        self.stages
            .read()
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| Arc::clone(&entry.stage))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stages.read().iter().any(|entry| entry.key == key)
    }

    /// Stage keys from head to tail
    pub fn keys(&self) -> Vec<String> {
        self.stages
            .read()
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    /// Push a message read from the peer through the chain
    pub fn fire_inbound(&self, msg: Message) -> Result<()> {
        let stages = self.snapshot();
        self.inbound_from(&stages, 0, msg)
    }

    /// Write a message from the tail toward the transport
    pub fn write(&self, msg: Message) -> Result<WriteFuture> {
        let (promise, future) = WritePromise::channel();
        self.write_with(msg, promise)?;
        Ok(future)
    }

    /// Write with a caller-supplied promise
    pub fn write_with(&self, msg: Message, promise: WritePromise) -> Result<()> {
        let stages = self.snapshot();
        self.outbound_from(&stages, stages.len(), msg, promise)
    }

    pub fn flush(&self) -> Result<()> {
        self.write_with(Message::Control(Signal::Flush), WritePromise::detached())
    }

    fn snapshot(&self) -> Arc<Vec<StageEntry>> {
        Arc::clone(&self.stages.read())
    }

    fn inbound_from(&self, stages: &[StageEntry], index: usize, msg: Message) -> Result<()> {
        match stages.get(index) {
            Some(entry) => {
                let ctx = StageContext {
                    pipeline: self,
                    stages,
                    index,
                };
                entry.stage.handle_inbound(&ctx, msg)
            }
            None => {
                trace!("Inbound {} reached the pipeline tail unhandled", msg);
                Ok(())
            }
        }
    }

    fn outbound_from(
        &self,
        stages: &[StageEntry],
        end: usize,
        msg: Message,
        promise: WritePromise,
    ) -> Result<()> {
        if end == 0 {
            return match self.transport.transmit(msg) {
                Ok(()) => {
                    promise.succeed(WriteStatus::Delivered);
                    Ok(())
                }
                Err(e) => {
                    promise.fail(WriteFailure::new(e.to_string()));
                    Err(e)
                }
            };
        }

        let index = end - 1;
        let ctx = StageContext {
            pipeline: self,
            stages,
            index,
        };
        stages[index].stage.handle_outbound(&ctx, msg, promise)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.keys())
            .finish()
    }
}

fn position_of(stages: &[StageEntry], anchor: &str) -> Result<usize> {
    stages
        .iter()
        .position(|entry| entry.key == anchor)
        .ok_or_else(|| InterceptError::AnchorNotFound {
            anchor: anchor.to_string(),
        })
}

/// A stage's position within one message's traversal
pub struct StageContext<'a> {
    pipeline: &'a Pipeline,
    stages: &'a [StageEntry],
    index: usize,
}

impl StageContext<'_> {
    /// Key of the stage being invoked
    pub fn key(&self) -> &str {
        &self.stages[self.index].key
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline
    }

    /// Hand an inbound message to the next stage toward the tail
    pub fn fire_inbound(&self, msg: Message) -> Result<()> {
        self.pipeline.inbound_from(self.stages, self.index + 1, msg)
    }

    /// Hand an outbound message to the next stage toward the transport
    pub fn forward_outbound(&self, msg: Message, promise: WritePromise) -> Result<()> {
        self.pipeline
            .outbound_from(self.stages, self.index, msg, promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::message::Packet;
    use crate::pipeline::test_support::{RecordingStage, RecordingTransport, Sink};

    fn pipeline_with(keys: &[&str]) -> (Pipeline, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = Pipeline::new(transport.clone());
        for key in keys {
            pipeline
                .add_last(*key, Arc::new(RecordingStage::default()))
                .unwrap();
        }
        (pipeline, transport)
    }

    #[test]
    fn test_add_before_anchor() {
        let (pipeline, _) = pipeline_with(&["decoder", "packet_handler"]);

        pipeline
            .add_before("packet_handler", "interceptor", Arc::new(Sink::default()))
            .unwrap();

        assert_eq!(
            pipeline.keys(),
            vec!["decoder", "interceptor", "packet_handler"]
        );
    }

    #[test]
    fn test_add_first_and_after() {
        let (pipeline, _) = pipeline_with(&["decoder"]);

        pipeline.add_first("framer", Arc::new(Sink::default())).unwrap();
        pipeline
            .add_after("decoder", "packet_handler", Arc::new(Sink::default()))
            .unwrap();

        assert_eq!(pipeline.keys(), vec!["framer", "decoder", "packet_handler"]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (pipeline, _) = pipeline_with(&["decoder", "packet_handler"]);

        let err = pipeline
            .add_before("packet_handler", "decoder", Arc::new(Sink::default()))
            .unwrap_err();

        assert!(matches!(err, InterceptError::DuplicateStage { ref key } if key == "decoder"));
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_missing_anchor() {
        let (pipeline, _) = pipeline_with(&["decoder"]);

        let err = pipeline
            .add_before("packet_handler", "interceptor", Arc::new(Sink::default()))
            .unwrap_err();

        assert!(matches!(err, InterceptError::AnchorNotFound { .. }));
        assert!(!pipeline.contains("interceptor"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (pipeline, _) = pipeline_with(&["decoder", "packet_handler"]);

        assert!(pipeline.remove("decoder").is_some());
        assert!(pipeline.remove("decoder").is_none());
        assert_eq!(pipeline.keys(), vec!["packet_handler"]);
    }

    #[test]
    fn test_inbound_travels_head_to_tail() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = Pipeline::new(transport);
        let first = Arc::new(RecordingStage::default());
        let second = Arc::new(RecordingStage::default());
        pipeline.add_last("first", first.clone()).unwrap();
        pipeline.add_last("second", second.clone()).unwrap();

        let packet = Arc::new(Packet::new("chat", &b"hi"[..]));
        pipeline.fire_inbound(Message::Packet(packet.clone())).unwrap();

        assert_eq!(first.inbound().len(), 1);
        let seen = second.inbound();
        assert_eq!(seen.len(), 1);
        assert!(Packet::same(seen[0].as_packet().unwrap(), &packet));
    }

    #[test]
    fn test_outbound_travels_tail_to_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = Pipeline::new(transport.clone());
        let head = Arc::new(RecordingStage::default());
        let tail = Arc::new(RecordingStage::default());
        pipeline.add_last("head", head.clone()).unwrap();
        pipeline.add_last("tail", tail.clone()).unwrap();

        let mut future = pipeline
            .write(Message::packet(Packet::new("chat", &b"hi"[..])))
            .unwrap();

        assert_eq!(tail.outbound().len(), 1);
        assert_eq!(head.outbound().len(), 1);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(future.try_wait(), Some(Ok(WriteStatus::Delivered)));
    }

    #[test]
    fn test_consuming_stage_stops_traversal() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = Pipeline::new(transport.clone());
        let sink = Arc::new(Sink::default());
        let after = Arc::new(RecordingStage::default());
        pipeline.add_last("sink", sink.clone()).unwrap();
        pipeline.add_last("after", after.clone()).unwrap();

        pipeline
            .fire_inbound(Message::packet(Packet::new("chat", &b"hi"[..])))
            .unwrap();

        assert_eq!(sink.count(), 1);
        assert!(after.inbound().is_empty());
    }

    #[test]
    fn test_transport_failure_fails_promise() {
        let transport = Arc::new(RecordingTransport::failing());
        let pipeline = Pipeline::new(transport);

        let (promise, mut future) = WritePromise::channel();
        let result = pipeline.write_with(
            Message::packet(Packet::new("chat", &b"hi"[..])),
            promise,
        );

        assert!(matches!(result, Err(InterceptError::Transport(_))));
        assert!(matches!(future.try_wait(), Some(Err(_))));
    }

    #[test]
    fn test_flush_reaches_transport() {
        let (pipeline, transport) = pipeline_with(&["decoder"]);
        pipeline.flush().unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Message::Control(Signal::Flush)));
    }

    #[test]
    fn test_context_key() {
        struct KeyCheck;
        impl Stage for KeyCheck {
            fn handle_inbound(&self, ctx: &StageContext<'_>, msg: Message) -> Result<()> {
                assert_eq!(ctx.key(), "checker");
                assert!(ctx.pipeline().contains("checker"));
                ctx.fire_inbound(msg)
            }
        }

        let (pipeline, _) = pipeline_with(&[]);
        pipeline.add_last("checker", Arc::new(KeyCheck)).unwrap();
        pipeline.fire_inbound(Signal::Active.into()).unwrap();
    }
}
