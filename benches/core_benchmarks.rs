//! Core Infrastructure Benchmarks
//!
//! Registry fast path, bus dispatch and topic matching.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use maison_core::events::{handler_fn, EventBus, EventData, TopicPattern};
use maison_core::queue::{CallbackRegistry, Payload, RetryQueue};
use maison_core::registry::ServiceRegistry;
use std::sync::Arc;

struct Inventaire {
    articles: Vec<String>,
}

fn benchmark_registry(c: &mut Criterion) {
    let registry = ServiceRegistry::new();
    registry.register(
        "inventaire",
        || {
            Ok::<_, std::io::Error>(Inventaire {
                articles: vec!["farine".to_string()],
            })
        },
        &["domain"],
    );
    // build once so the loop measures the fast path
    let _ = registry.get("inventaire");

    c.bench_function("registry_get_built", |b| {
        b.iter(|| registry.get(black_box("inventaire")))
    });

    c.bench_function("registry_get_typed_built", |b| {
        b.iter(|| {
            registry
                .get_typed::<Inventaire>(black_box("inventaire"))
                .map(|service| service.articles.len())
        })
    });
}

fn benchmark_bus_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");
    for handlers in [1usize, 10, 50] {
        let bus = EventBus::new();
        for i in 0..handlers {
            let pattern = match i % 3 {
                0 => "stock.modifie",
                1 => "stock.*",
                _ => "*",
            };
            bus.subscribe(pattern, handler_fn(format!("h{i}"), |_| Ok(())), i as i32);
        }
        group.bench_with_input(BenchmarkId::from_parameter(handlers), &bus, |b, bus| {
            b.iter(|| bus.publish(black_box("stock.modifie"), EventData::new(), "bench"))
        });
    }
    group.finish();
}

fn benchmark_topic_matching(c: &mut Criterion) {
    let pattern = TopicPattern::parse("maison.entretien.*");
    c.bench_function("topic_wildcard_match", |b| {
        b.iter(|| pattern.matches(black_box("maison.entretien.routine_creee")))
    });
}

fn benchmark_queue_sweep(c: &mut Criterion) {
    let callbacks = Arc::new(CallbackRegistry::new());
    callbacks.register("noop", |_| Ok(()));
    let queue = RetryQueue::in_memory(callbacks);

    c.bench_function("queue_enqueue_and_sweep_100", |b| {
        b.iter(|| {
            for _ in 0..100 {
                queue.enqueue("bench", Payload::new(), "noop", None);
            }
            queue.process_batch()
        })
    });
}

criterion_group!(
    benches,
    benchmark_registry,
    benchmark_bus_publish,
    benchmark_topic_matching,
    benchmark_queue_sweep
);
criterion_main!(benches);
