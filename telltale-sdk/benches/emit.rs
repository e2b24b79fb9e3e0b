use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::thread;
use telltale_sdk::{labels, Client, Kind, Labels, Message, Output, Timestamp};

fn discarding_client() -> Client {
    Client::builder()
        .output(Output::callback(|_| Ok(())))
        .app_name("bench")
        .build()
}

/// Benchmark timestamp normalization for each input unit
fn bench_timestamp_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("timestamp_normalization");

    let inputs = [
        ("seconds", Timestamp::Integer(1_700_000_000)),
        ("millis", Timestamp::Integer(1_700_000_000_000)),
        ("micros", Timestamp::Integer(1_700_000_000_000_000)),
        ("nanos", Timestamp::Integer(1_700_000_000_000_000_000)),
        ("float_seconds", Timestamp::Float(1_700_000_000.25)),
        ("now", Timestamp::Now),
    ];

    for (name, timestamp) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(name), &timestamp, |b, ts| {
            b.iter(|| black_box(ts).to_micros());
        });
    }
    group.finish();
}

/// Benchmark one counter emission (hot path)
fn bench_counter(c: &mut Criterion) {
    let client = discarding_client();

    c.bench_function("counter", |b| {
        b.iter(|| {
            client
                .counter(black_box("requests"), None, Timestamp::Now, Labels::new())
                .unwrap();
        });
    });
}

/// Benchmark emission with caller labels merged over the defaults
fn bench_counter_with_labels(c: &mut Criterion) {
    let client = discarding_client();
    client.add_default_labels(labels([("env", "bench"), ("region", "eu")]));

    c.bench_function("counter_with_labels", |b| {
        b.iter(|| {
            client
                .counter(
                    black_box("requests"),
                    Some(2),
                    Timestamp::Now,
                    labels([("route", "/orders"), ("status", "200")]),
                )
                .unwrap();
        });
    });
}

/// Benchmark event emission with subjects that need truncation
fn bench_event_truncation(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_truncation");
    let client = discarding_client();

    for size in [100usize, 3_000, 10_000].iter() {
        let subject = "s".repeat(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &subject, |b, subject| {
            b.iter(|| {
                client
                    .event(
                        "bench",
                        Some(black_box(subject.as_str())),
                        Some(black_box(subject.as_str())),
                        &["ops"],
                        Timestamp::Now,
                        Labels::new(),
                    )
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark wire encoding of typical messages
fn bench_json_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_encoding");

    let counter = Message::builder(Kind::Counter)
        .name("requests")
        .value(1_i64)
        .timestamp(1_700_000_000_000_000)
        .labels(labels([("app", "bench"), ("pid", "4242"), ("tid", "1")]))
        .build();
    let log = Message::builder(Kind::Log)
        .subject("slow query")
        .data(json!({ "sql": "select 1", "ms": 812, "rows": [1, 2, 3] }))
        .timestamp(1_700_000_000_000_000)
        .labels(labels([("app", "bench"), ("pid", "4242"), ("tid", "1")]))
        .build();

    for (name, message) in [("counter", counter), ("log", log)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &message, |b, m| {
            b.iter(|| black_box(m).to_json().unwrap());
        });
    }
    group.finish();
}

/// Benchmark concurrent emission from several threads sharing one client
fn bench_concurrent_emission(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_emission");

    for thread_count in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*thread_count as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::new("threads", thread_count),
            thread_count,
            |b, &thread_count| {
                let client = discarding_client();
                b.iter(|| {
                    let workers: Vec<_> = (0..thread_count)
                        .map(|_| {
                            let client = client.clone();
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    client
                                        .gauge(
                                            black_box("depth"),
                                            black_box(3.0),
                                            Timestamp::Now,
                                            Labels::new(),
                                        )
                                        .unwrap();
                                }
                            })
                        })
                        .collect();

                    for worker in workers {
                        worker.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_timestamp_normalization,
    bench_counter,
    bench_counter_with_labels,
    bench_event_truncation,
    bench_json_encoding,
    bench_concurrent_emission
);

criterion_main!(benches);
