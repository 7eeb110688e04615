// src/interception/mod.rs
//! Packet interception layer
//!
//! This module surfaces every packet on every connection as a cancellable
//! event:
//!
//! - **Event**: `PacketEvent`, tagged with its `Direction`
//! - **Observer**: subscription lists and synchronous dispatch
//! - **Stage**: the per-connection duplex stage that builds and enforces events
//! - **Binder**: splices a stage into each new connection's pipeline
//! - **Gateway**: one-time activation against a host
//!
//! # Architecture
//!
//! ```text
//! InterceptionGateway::activate(host)
//!     │
//!     └─ ConnectionBinder (connection listener)
//!            │  on connection ready
//!            └─ InterceptionStage ──► PacketEvent ──► Observers
//!                                          │
//!                                  cancelled? drop : forward
//! ```

pub mod binder;
pub mod event;
pub mod gateway;
pub mod observer;
pub mod stage;

// Re-export commonly used types
pub use binder::ConnectionBinder;
pub use event::{ConnectionId, ConnectionIdentity, Direction, PacketEvent, Verdict};
pub use gateway::{GatewayState, InterceptionGateway};
pub use observer::{
    Interest, ObserverRegistry, PacketObserver, Priority, SubscribeOptions, SubscriptionId,
};
pub use stage::InterceptionStage;
