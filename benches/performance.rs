//! Performance benchmarks for the subscription graph.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use facet::{Params, Selector, Stage, Store, StoreConfig};
use serde_json::json;

fn create_store() -> Store {
    Store::new(StoreConfig {
        name: "bench".to_string(),
        initial_state: json!({"value": 0, "items": (0..100).collect::<Vec<_>>()}),
    })
}

/// Register a linear selector chain: level_0 reads state, level_i combines
/// over level_{i-1}.
fn register_chain(store: &Store, depth: usize) {
    store
        .register_selector(Selector::reader("level_0", |state, _| state["items"].clone()))
        .unwrap();

    for level in 1..depth {
        store
            .register_selector(Selector::pipeline(
                format!("level_{}", level),
                vec![
                    Stage::selector_ref(format!("level_{}", level - 1)),
                    Stage::combine(|args, _| args[0].as_ref().clone()),
                ],
            ))
            .unwrap();
    }
}

/// Benchmark subscribe/unsubscribe churn on a flat selector
fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let store = create_store();
    store
        .register_selector(Selector::reader("value", |state, _| state["value"].clone()))
        .unwrap();

    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            let mut handle = store.subscribe("value", Params::none()).unwrap();
            black_box(handle.last_value().cloned());
            handle.unsubscribe();
        });
    });
}

/// Benchmark memoized reads (no version bump between reads)
fn bench_memoized_read(c: &mut Criterion) {
    let store = create_store();
    store
        .register_selector(Selector::reader("items", |state, _| state["items"].clone()))
        .unwrap();
    let mut handle = store.subscribe("items", Params::none()).unwrap();

    c.bench_function("memoized_read", |b| {
        b.iter(|| {
            black_box(store.select(&mut handle).unwrap());
        });
    });

    handle.unsubscribe();
}

/// Benchmark reads that recompute after a version bump
fn bench_recompute_read(c: &mut Criterion) {
    let store = create_store();
    store
        .register_selector(Selector::reader("value", |state, _| state["value"].clone()))
        .unwrap();
    let mut handle = store.subscribe("value", Params::none()).unwrap();

    let mut tick = 0i64;
    c.bench_function("recompute_read", |b| {
        b.iter(|| {
            tick += 1;
            store.mutate(|state| state["value"] = json!(tick));
            black_box(store.select(&mut handle).unwrap());
        });
    });

    handle.unsubscribe();
}

/// Benchmark chain resolution with varying depths
fn bench_chain_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_resolution");

    for depth in [2, 4, 8, 16] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let store = create_store();
            register_chain(&store, depth);
            let root = format!("level_{}", depth - 1);

            b.iter(|| {
                let mut handle = store.subscribe(root.as_str(), Params::none()).unwrap();
                black_box(handle.last_value().cloned());
                handle.unsubscribe();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_memoized_read,
    bench_recompute_read,
    bench_chain_resolution,
);

criterion_main!(benches);
