// src/pipeline/mod.rs
//! Host-agnostic connection pipeline
//!
//! Each connection owns a `Pipeline`: an ordered list of named duplex stages
//! with a `Transport` at its head. Stages can be spliced in relative to a
//! named anchor while the connection is live.
//!
//! - **message**: packets and control signals
//! - **stage**: the `Stage` and `Transport` contracts
//! - **chain**: the `Pipeline` itself and the per-call `StageContext`
//! - **promise**: write completion (`WritePromise` / `WriteFuture`)

pub mod chain;
pub mod message;
pub mod promise;
pub mod stage;

// Re-export commonly used types
pub use chain::{Pipeline, StageContext};
pub use message::{Message, Packet, Signal};
pub use promise::{WriteFailure, WriteFuture, WritePromise, WriteResult, WriteStatus};
pub use stage::{Stage, Transport};
