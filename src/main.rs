// src/main.rs
//! Packet Interceptor demo
//!
//! Wires the interception gateway into an in-memory host, registers a couple
//! of observers and pushes traffic through two connections.

use anyhow::Result;
use packet_interceptor::host::{LocalHost, Owner};
use packet_interceptor::interception::{
    Direction, InterceptionGateway, Interest, PacketEvent, Priority, SubscribeOptions,
};
use packet_interceptor::observability::{init_metrics, init_tracing};
use packet_interceptor::pipeline::{Packet, WriteStatus};
use packet_interceptor::utils::config::InterceptorConfig;
use packet_interceptor::BuildInfo;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = InterceptorConfig::load()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.telemetry)?;
    let metrics = if config.telemetry.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    info!("Starting {}", BuildInfo::current());
    debug!("Configuration loaded: {:?}", config);

    let gateway = InterceptionGateway::new(config);
    let host = LocalHost::new();

    // Drop outbound chat packets carrying a blocked word
    gateway.observers().subscribe(
        Interest::Outbound,
        Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
            if event.packet().kind() == "chat"
                && event.packet().payload().windows(6).any(|w| w == b"secret")
            {
                event.cancel();
            }
            Ok(())
        }),
    );

    // Ignore inbound keep-alives from clients that flood them
    gateway.observers().subscribe_with(
        Interest::Inbound,
        SubscribeOptions::default().with_priority(Priority::High),
        Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
            if event.packet().kind() == "keep_alive" && event.connection().name() == "mallory" {
                event.cancel();
            }
            Ok(())
        }),
    );

    // Audit the final decision
    gateway.observers().subscribe_with(
        Interest::Both,
        SubscribeOptions::default().with_priority(Priority::Monitor),
        Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
            let arrow = match event.direction() {
                Direction::Inbound => "<-",
                Direction::Outbound => "->",
            };
            info!(
                "{} {} {} ({} bytes){}",
                event.connection().name(),
                arrow,
                event.packet().kind(),
                event.packet().len(),
                if event.is_cancelled() { " [cancelled]" } else { "" }
            );
            Ok(())
        }),
    );

    gateway.activate(&host, &Owner::new("demo"))?;

    let alice = host.open("alice")?;
    let mallory = host.open("mallory")?;

    for connection in [&alice, &mallory] {
        connection.receive_from_peer(Arc::new(Packet::new("keep_alive", &b"\x00"[..])))?;
        connection.receive_from_peer(Arc::new(Packet::new("move", &b"x=1,z=4"[..])))?;
    }

    let writes = vec![
        alice.send(Arc::new(Packet::new("chat", &b"hello world"[..])))?,
        alice.send(Arc::new(Packet::new("chat", &b"the secret is 42"[..])))?,
        mallory.send(Arc::new(Packet::new("time_update", &b"\x00\x01"[..])))?,
    ];

    for write in writes {
        match write.wait().await {
            Ok(WriteStatus::Delivered) => debug!("Write delivered"),
            Ok(WriteStatus::Cancelled) => info!("Write cancelled by an observer"),
            Err(e) => warn!("Write failed: {}", e),
        }
    }

    for connection in [&alice, &mallory] {
        let name = connection.connection().name().to_string();
        info!(
            "{}: {} delivered to application, {} sent on the wire, {:?}",
            name,
            connection.drain_delivered().len(),
            connection.drain_wire().len(),
            connection.traffic()
        );
    }

    host.close(alice.id());
    host.close(mallory.id());

    if let Some(handle) = metrics {
        info!("Metrics snapshot:\n{}", handle.render());
    }

    Ok(())
}
