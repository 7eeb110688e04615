// benches/interception_bench.rs
//! Overhead of the interception stage on the read and write paths

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packet_interceptor::host::{LocalHost, Owner};
use packet_interceptor::interception::{InterceptionGateway, Interest, PacketEvent};
use packet_interceptor::pipeline::Packet;
use std::sync::Arc;

fn bench_outbound(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_write");

    for observers in [0usize, 1, 8] {
        let host = LocalHost::new();
        let gateway = InterceptionGateway::default();
        for _ in 0..observers {
            gateway.observers().subscribe(
                Interest::Outbound,
                Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
                    black_box(event.packet().kind());
                    Ok(())
                }),
            );
        }
        gateway.activate(&host, &Owner::new("bench")).unwrap();

        let connection = host.open("bench").unwrap();
        let packet = Arc::new(Packet::new("chat", vec![0u8; 256]));

        group.bench_with_input(
            BenchmarkId::from_parameter(observers),
            &observers,
            |b, _| {
                b.iter(|| {
                    connection.send(Arc::clone(&packet)).unwrap();
                    connection.drain_wire();
                })
            },
        );
    }

    group.finish();
}

fn bench_inbound_cancelled(c: &mut Criterion) {
    let host = LocalHost::new();
    let gateway = InterceptionGateway::default();
    gateway.observers().subscribe(
        Interest::Inbound,
        Arc::new(|event: &mut PacketEvent| -> anyhow::Result<()> {
            event.cancel();
            Ok(())
        }),
    );
    gateway.activate(&host, &Owner::new("bench")).unwrap();

    let connection = host.open("bench").unwrap();
    let packet = Arc::new(Packet::new("move", vec![0u8; 64]));

    c.bench_function("inbound_cancelled", |b| {
        b.iter(|| connection.receive_from_peer(Arc::clone(&packet)).unwrap())
    });
}

criterion_group!(benches, bench_outbound, bench_inbound_cancelled);
criterion_main!(benches);
