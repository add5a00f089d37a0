use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rask_sentry_hook::classify::FieldClassifier;
use rask_sentry_hook::normalize::normalize;
use rask_sentry_hook::transport::serialization::DEFAULT_COMPRESS_THRESHOLD;
use rask_sentry_hook::transport::{DeliveryCallback, encode_packet};
use rask_sentry_hook::{FieldValue, LogEntry, LogLevel, Packet, SentryHook, Transport};

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
struct BenchError;

struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _packet: Packet, on_complete: DeliveryCallback) {
        on_complete(Ok(()));
    }
}

fn sample_entry() -> LogEntry {
    LogEntry::new(LogLevel::Error, "upstream request failed")
        .with_field("order", 13)
        .with_field("latency_ms", 12.5)
        .with_field("path", "/api/checkout")
        .with_field("cause", FieldValue::error(BenchError))
        .with_field("user_id", "u-42")
        .with_field("fingerprint", vec!["checkout", "upstream"])
        .with_field("payload", serde_json::json!({"items": [1, 2, 3]}))
}

fn benchmark_normalize(c: &mut Criterion) {
    let values = [
        FieldValue::error(BenchError),
        FieldValue::from("plain"),
        FieldValue::from(42_i64),
        FieldValue::from(serde_json::json!({"k": "v"})),
        FieldValue::display(std::net::Ipv4Addr::LOCALHOST),
    ];

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("mixed_values", |b| {
        b.iter(|| {
            for value in &values {
                std::hint::black_box(normalize(std::hint::black_box(value)));
            }
        });
    });
    group.finish();
}

fn benchmark_classify(c: &mut Criterion) {
    let entry = sample_entry();
    let mut classifier = FieldClassifier::new();
    classifier.add_ignore("latency_ms");
    classifier.add_extra_filter("path", |_| FieldValue::from("[redacted]"));

    c.bench_function("classify_fields", |b| {
        b.iter(|| std::hint::black_box(classifier.classify(std::hint::black_box(&entry.fields))));
    });
}

fn benchmark_fire(c: &mut Criterion) {
    let hook = SentryHook::with_transport(NullTransport, &[LogLevel::Error]);
    let entry = sample_entry();

    c.bench_function("fire_null_transport", |b| {
        b.iter(|| hook.fire(std::hint::black_box(&entry)));
    });

    let packet = hook.packet_for(&entry);
    c.bench_function("encode_packet", |b| {
        b.iter(|| encode_packet(std::hint::black_box(&packet), DEFAULT_COMPRESS_THRESHOLD));
    });
}

criterion_group!(
    benches,
    benchmark_normalize,
    benchmark_classify,
    benchmark_fire
);
criterion_main!(benches);
