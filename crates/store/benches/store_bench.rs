use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use store::{Options, Store};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn keys() -> Vec<Vec<u8>> {
    (0..N_KEYS).map(|i| format!("key{:06}", i).into_bytes()).collect()
}

fn open_store(dir: &std::path::Path) -> Store {
    Store::open(
        Options::default()
            .dir(dir)
            .total_chunks(32)
            .collision_chunks(4),
    )
    .unwrap()
}

fn set_benchmark(c: &mut Criterion) {
    c.bench_function("store_set_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path());
                (dir, store, keys())
            },
            |(_dir, store, keys)| {
                let value = vec![b'x'; VALUE_SIZE];
                for key in &keys {
                    store.set(key, &value, 0).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("store_get_hit_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path());
                let value = vec![b'x'; VALUE_SIZE];
                let keys = keys();
                for key in &keys {
                    store.set(key, &value, 0).unwrap();
                }
                (dir, store, keys)
            },
            |(_dir, store, keys)| {
                for key in &keys {
                    let v = store.get(key).unwrap();
                    assert_eq!(v.len(), VALUE_SIZE);
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn overwrite_same_class_benchmark(c: &mut Criterion) {
    c.bench_function("store_overwrite_in_place_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path());
                let value = vec![b'x'; VALUE_SIZE];
                let keys = keys();
                for key in &keys {
                    store.set(key, &value, 0).unwrap();
                }
                (dir, store, keys)
            },
            |(_dir, store, keys)| {
                // same length -> same size class -> in-place rewrites
                let value = vec![b'y'; VALUE_SIZE];
                for key in &keys {
                    store.set(key, &value, 0).unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn counter_benchmark(c: &mut Criterion) {
    c.bench_function("store_incr_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path());
                (dir, store)
            },
            |(_dir, store)| {
                for _ in 0..N_KEYS {
                    store.incr(b"hits", 1).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    set_benchmark,
    get_hit_benchmark,
    overwrite_same_class_benchmark,
    counter_benchmark
);
criterion_main!(benches);
