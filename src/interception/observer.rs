// src/interception/observer.rs
//! Observer subscriptions and synchronous dispatch
//!
//! Every observer sees every event of the directions it subscribed to, for
//! every connection, and does its own filtering. Dispatch runs inline on the
//! thread driving the connection's pipeline.
//!
//! # Ordering
//!
//! Observers run by ascending `Priority`, then in subscription order. With
//! every observer at the default `Priority::Normal` this is plain
//! subscription order.
//!
//! # Concurrency
//!
//! Each direction's list is a copy-on-write snapshot. Dispatch clones the
//! current `Arc` and iterates it without holding the lock, so subscribing
//! (even from inside an observer) never blocks or races in-flight dispatch
//! on other connections.

use crate::interception::event::{Direction, PacketEvent};
use crate::observability::OBSERVER_ERRORS_TOTAL;
use crate::utils::config::InterceptorConfig;
use crate::utils::errors::{InterceptError, Result};
use metrics::counter;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Receives packet events and may cancel them
pub trait PacketObserver: Send + Sync {
    /// Handle one event. Returning an error aborts the packet's transit.
    fn on_packet(&self, event: &mut PacketEvent) -> anyhow::Result<()>;

    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> PacketObserver for F
where
    F: Fn(&mut PacketEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_packet(&self, event: &mut PacketEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Which event lists a subscription joins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Inbound,
    Outbound,
    Both,
}

impl Interest {
    pub fn includes(&self, direction: Direction) -> bool {
        match self {
            Interest::Inbound => direction == Direction::Inbound,
            Interest::Outbound => direction == Direction::Outbound,
            Interest::Both => true,
        }
    }
}

impl From<Direction> for Interest {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Inbound => Interest::Inbound,
            Direction::Outbound => Interest::Outbound,
        }
    }
}

/// Dispatch priority, lowest runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    /// Runs last; meant for observers that only record the final decision
    Monitor,
}

/// Per-subscription options
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    pub priority: Priority,

    /// Skip this observer once an earlier one has cancelled the event
    pub ignore_cancelled: bool,
}

impl SubscribeOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn ignoring_cancelled(mut self) -> Self {
        self.ignore_cancelled = true;
        self
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Registered {
    id: SubscriptionId,
    options: SubscribeOptions,
    observer: Arc<dyn PacketObserver>,
}

type Snapshot = Arc<Vec<Registered>>;

/// Process-wide observer lists, one per direction
pub struct ObserverRegistry {
    inbound: RwLock<Snapshot>,
    outbound: RwLock<Snapshot>,
    next_id: AtomicU64,

    /// Zero disables the slow dispatch warning
    slow_dispatch: Duration,
}

impl ObserverRegistry {
    pub fn new(config: &InterceptorConfig) -> Self {
        Self {
            inbound: RwLock::new(Arc::new(Vec::new())),
            outbound: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            slow_dispatch: Duration::from_micros(config.slow_dispatch_threshold_us),
        }
    }

    /// Subscribe at `Priority::Normal`
    pub fn subscribe(
        &self,
        interest: Interest,
        observer: Arc<dyn PacketObserver>,
    ) -> SubscriptionId {
        self.subscribe_with(interest, SubscribeOptions::default(), observer)
    }

    pub fn subscribe_with(
        &self,
        interest: Interest,
        options: SubscribeOptions,
        observer: Arc<dyn PacketObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registered = Registered {
            id,
            options,
            observer,
        };

        for direction in [Direction::Inbound, Direction::Outbound] {
            if !interest.includes(direction) {
                continue;
            }

            let mut list = self.list(direction).write();
            let mut next: Vec<Registered> = list.iter().cloned().collect();
            let position = next
                .iter()
                .position(|r| r.options.priority > options.priority)
                .unwrap_or(next.len());
            next.insert(position, registered.clone());
            *list = Arc::new(next);
        }

        debug!(
            "Subscribed observer {} as {} ({:?}, {:?})",
            registered.observer.name(),
            id,
            interest,
            options.priority
        );
        id
    }

    /// Remove a subscription from every list it joined
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;

        for direction in [Direction::Inbound, Direction::Outbound] {
            let mut list = self.list(direction).write();
            if list.iter().any(|r| r.id == id) {
                let next: Vec<Registered> = list.iter().filter(|r| r.id != id).cloned().collect();
                *list = Arc::new(next);
                removed = true;
            }
        }

        if removed {
            debug!("Unsubscribed {}", id);
        }
        removed
    }

    pub fn observer_count(&self, direction: Direction) -> usize {
        self.list(direction).read().len()
    }

    /// Deliver `event` to every observer of its direction, in order
    ///
    /// The first observer error stops dispatch and is returned.
    pub fn dispatch(&self, event: &mut PacketEvent) -> Result<()> {
        let direction = event.direction();
        let observers: Snapshot = Arc::clone(&self.list(direction).read());
        let started = Instant::now();

        for registered in observers.iter() {
            if registered.options.ignore_cancelled && event.is_cancelled() {
                continue;
            }

            if let Err(source) = registered.observer.on_packet(event) {
                counter!(OBSERVER_ERRORS_TOTAL, "direction" => direction.as_str()).increment(1);
                return Err(InterceptError::Observer {
                    observer: registered.observer.name().to_string(),
                    direction,
                    source,
                });
            }
        }

        let elapsed = started.elapsed();
        if !self.slow_dispatch.is_zero() && elapsed > self.slow_dispatch {
            warn!(
                "Slow {} dispatch for {} on {}: {:?} across {} observers",
                direction,
                event.packet().kind(),
                event.connection(),
                elapsed,
                observers.len()
            );
        }

        Ok(())
    }

    fn list(&self, direction: Direction) -> &RwLock<Snapshot> {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new(&InterceptorConfig::default())
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("inbound", &self.observer_count(Direction::Inbound))
            .field("outbound", &self.observer_count(Direction::Outbound))
            .finish()
    }
}
