//! Codec benchmarks for linkpulse-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linkpulse_protocol::{codec, MessageType, ServerMessage};
use serde_json::json;

fn bench_encode_click(c: &mut Criterion) {
    let message = ServerMessage::new(
        MessageType::Click,
        "abc123",
        json!({
            "ip_address": "203.0.113.7",
            "user_agent": "Mozilla/5.0 (X11; Linux x86_64)",
            "referrer": "https://news.example.com/",
        }),
    );

    c.bench_function("encode_click", |b| {
        b.iter(|| codec::encode(black_box(&message)))
    });
}

fn bench_decode_subscribe(c: &mut Criterion) {
    let text = r#"{"type":"subscribe","short_code":"abc123"}"#;

    c.bench_function("decode_subscribe", |b| b.iter(|| codec::decode(black_box(text))));
}

criterion_group!(benches, bench_encode_click, bench_decode_subscribe);
criterion_main!(benches);
