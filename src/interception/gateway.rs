// src/interception/gateway.rs
//! Registration gateway
//!
//! One-time activation: attaches a `ConnectionBinder` to a host's
//! connection notifications. The gateway has exactly two states and one
//! transition:
//!
//! ```text
//! Inactive ──activate──► Activating ──host accepts──► Active
//!                             │
//!                             └──host refuses──► Inactive
//! ```
//!
//! A second `activate` fails with `AlreadyActive` and changes nothing, so
//! each packet is never intercepted twice. There is no deactivation.
//!
//! The state lock is not held while the host registers the listener, so a
//! host may query the gateway from inside `register_connection_listener`.

use crate::host::{Host, Owner};
use crate::interception::binder::ConnectionBinder;
use crate::interception::observer::ObserverRegistry;
use crate::utils::config::InterceptorConfig;
use crate::utils::errors::{InterceptError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Gateway lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayState {
    Inactive,
    /// Host registration in progress
    Activating { owner: Owner },
    Active {
        owner: Owner,
        activated_at: DateTime<Utc>,
    },
}

/// Entry point for turning packet interception on
pub struct InterceptionGateway {
    state: Mutex<GatewayState>,
    observers: Arc<ObserverRegistry>,
    config: InterceptorConfig,
}

impl InterceptionGateway {
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            state: Mutex::new(GatewayState::Inactive),
            observers: Arc::new(ObserverRegistry::new(&config)),
            config,
        }
    }

    /// Shared observer registry; subscribe here before or after activation
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn state(&self) -> GatewayState {
        self.state.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.lock(), GatewayState::Active { .. })
    }

    /// Attach interception to `host` on behalf of `owner`
    ///
    /// Concurrent calls race for the `Activating` slot; exactly one reaches
    /// the host. Calls arriving while registration is in flight are rejected
    /// even if that registration later fails.
    pub fn activate(&self, host: &dyn Host, owner: &Owner) -> Result<()> {
        {
            let mut state = self.state.lock();
            match &*state {
                GatewayState::Inactive => {
                    *state = GatewayState::Activating {
                        owner: owner.clone(),
                    };
                }
                GatewayState::Activating { owner: current }
                | GatewayState::Active { owner: current, .. } => {
                    warn!(
                        "Rejected activation by {}: already claimed by {}",
                        owner, current
                    );
                    return Err(InterceptError::AlreadyActive {
                        owner: current.to_string(),
                    });
                }
            }
        }

        let binder = ConnectionBinder::new(Arc::clone(&self.observers), self.config.clone());
        if let Err(e) = host.register_connection_listener(owner, Arc::new(binder)) {
            *self.state.lock() = GatewayState::Inactive;
            warn!("Host refused interception for {}: {}", owner, e);
            return Err(e);
        }

        *self.state.lock() = GatewayState::Active {
            owner: owner.clone(),
            activated_at: Utc::now(),
        };
        info!(
            "Packet interception activated by {} (anchor: {})",
            owner, self.config.anchor_stage
        );
        Ok(())
    }
}

impl Default for InterceptionGateway {
    fn default() -> Self {
        Self::new(InterceptorConfig::default())
    }
}

static GLOBAL: Lazy<InterceptionGateway> = Lazy::new(InterceptionGateway::default);

/// Process-wide gateway with default configuration
pub fn global() -> &'static InterceptionGateway {
    &GLOBAL
}
