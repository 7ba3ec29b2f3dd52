//! Latency benchmarks for LinkPulse.
//!
//! These benchmarks focus on measuring producer-to-subscriber latency.

use criterion::{criterion_group, criterion_main, Criterion};
use linkpulse_bench::ZeroAnalytics;
use linkpulse_core::{Hub, HubConfig};
use linkpulse_transport::{ConnectionHandle, ConnectionId, Outbound};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Benchmark broadcast + receive latency for one subscriber.
fn bench_broadcast_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_latency");
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("single_subscriber", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let token = CancellationToken::new();
            let (hub, handle) = Hub::new(
                HubConfig {
                    ping_interval: Duration::from_secs(3600),
                    ..HubConfig::default()
                },
                Arc::new(ZeroAnalytics),
                token.clone(),
            );
            tokio::spawn(hub.run());

            let (conn, mut rx) = ConnectionHandle::channel(
                ConnectionId::new("bench"),
                16,
                Duration::from_secs(1),
                &token,
            );
            handle.register(conn.clone()).await.unwrap();
            handle.subscribe(conn.id().clone(), "abc123").await.unwrap();
            // Initial snapshot
            rx.recv().await;

            let start = Instant::now();
            for _ in 0..iters {
                handle
                    .broadcast_click("abc123", "203.0.113.7", "bench", "")
                    .unwrap();
                while let Some(frame) = rx.recv().await {
                    if matches!(frame, Outbound::Text(_)) {
                        break;
                    }
                }
            }
            let elapsed = start.elapsed();

            token.cancel();
            elapsed
        });
    });

    group.finish();
}

/// Benchmark the control round-trip of an introspection query.
fn bench_query_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_latency");
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("active_connection_count", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let token = CancellationToken::new();
            let (hub, handle) = Hub::new(HubConfig::default(), Arc::new(ZeroAnalytics), token.clone());
            tokio::spawn(hub.run());

            let start = Instant::now();
            for _ in 0..iters {
                handle.active_connection_count().await.unwrap();
            }
            let elapsed = start.elapsed();

            token.cancel();
            elapsed
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast_latency, bench_query_latency);
criterion_main!(benches);
