//! Throughput benchmarks for LinkPulse.
//!
//! These benchmarks measure the raw throughput of the hub's building blocks
//! and of fan-out through a running hub.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use linkpulse_bench::{subscribe_drained, wait_for, ZeroAnalytics};
use linkpulse_core::{
    AggregateAnalytics, ClickEvent, Hub, HubConfig, HubError, SubscriptionIndex, Update,
};
use linkpulse_transport::ConnectionId;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark update encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let click = Update::click(
        "abc123",
        &ClickEvent {
            ip_address: "203.0.113.7".into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".into(),
            referrer: "https://news.ycombinator.com".into(),
        },
    );
    group.bench_function("click", |b| b.iter(|| black_box(&click).encode()));

    let mut snapshot = AggregateAnalytics::empty("abc123", 7);
    snapshot.total_clicks = 12_345;
    let snapshot = Update::analytics_snapshot("abc123", &snapshot);
    group.bench_function("snapshot", |b| b.iter(|| black_box(&snapshot).encode()));

    group.finish();
}

/// Benchmark subscription index operations.
fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    group.bench_function("subscribe", |b| {
        let mut index = SubscriptionIndex::new();
        let mut i = 0u64;
        b.iter(|| {
            let conn = ConnectionId::new(format!("conn-{}", i % 1000));
            let topic = format!("code{}", i);
            i += 1;
            index.subscribe(&conn, &topic)
        });
    });

    group.bench_function("unregister_10_topics", |b| {
        let mut index = SubscriptionIndex::new();
        let conn = ConnectionId::new("conn-1");
        let topics: Vec<String> = (0..10).map(|i| format!("code{}", i)).collect();
        b.iter(|| {
            for topic in &topics {
                index.subscribe(&conn, topic);
            }
            index.unregister_all(black_box(&conn))
        });
    });

    group.finish();
}

/// Benchmark fan-out through a running hub.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let rt = runtime();

    for size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
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
                let received = subscribe_drained(&handle, size, "broadcast", &token).await;

                let start = Instant::now();
                for _ in 0..iters {
                    loop {
                        match handle.broadcast_click("broadcast", "203.0.113.7", "bench", "") {
                            Err(HubError::QueueFull(_)) => tokio::task::yield_now().await,
                            _ => break,
                        }
                    }
                }
                wait_for(&received, iters * size as u64).await;
                let elapsed = start.elapsed();

                token.cancel();
                received.store(0, Ordering::SeqCst);
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_index, bench_fanout);
criterion_main!(benches);
