//! Cached Table Benchmarks
//!
//! ## Cache Modes
//!
//! Every group runs once per cache mode:
//! - `exclusive`: ordered map under one lock
//! - `shared`: sharded concurrent map
//!
//! ## Key Access Patterns
//!
//! - `hot_key`: Single key, repeated access (best case, cache-friendly)
//! - `uniform`: Random keys from a preloaded keyspace
//! - `miss`: Key the backend does not have (load path, then cached)
//!
//! ## Deterministic Randomness
//!
//! All "random" access patterns use a fixed seed (BENCH_SEED) for reproducibility.
//!
//! ## What These Benchmarks Prove
//!
//! | Benchmark | Semantic Guarantee | Regression Detection |
//! |-----------|-------------------|----------------------|
//! | select/* | Cached rows returned without a backend fetch | Cache lookup and condition cost |
//! | insert/* | Appended row is recorded and dirtied | Slot resolution overhead |
//! | hash/* | Digest covers dirty rows in key order | Sort and SHA-256 cost |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench table_ops
//! cargo bench --bench table_ops -- "select"  # specific group
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use statecache::{AccessOptions, CacheMode, CachedTable, Condition, Entry, MemBackend, TableInfo};

// =============================================================================
// Constants and Configuration
// =============================================================================

/// Fixed seed for deterministic "random" key selection.
const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

const KEYSPACE: usize = 10_000;

const MODES: [CacheMode; 2] = [CacheMode::Exclusive, CacheMode::Shared];

// =============================================================================
// Test Utilities - All allocation happens here, outside timed loops
// =============================================================================

fn info() -> TableInfo {
    TableInfo::new("t_bench", ["balance", "owner"])
}

fn row(i: usize) -> Entry {
    Entry::new()
        .with_field("balance", i.to_string())
        .with_field("owner", format!("user{}", i))
}

fn keys() -> Vec<String> {
    (0..KEYSPACE).map(|i| format!("key{:06}", i)).collect()
}

/// Table whose backend holds one row for every key in the keyspace
fn preloaded(mode: CacheMode, keys: &[String]) -> CachedTable {
    let backend = Arc::new(MemBackend::new());
    for (i, key) in keys.iter().enumerate() {
        backend.put("t_bench", key, vec![row(i)]);
    }
    CachedTable::new(info(), mode).with_backend(backend)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_select(c: &mut Criterion) {
    let keys = keys();
    let mut group = c.benchmark_group("select");
    group.throughput(Throughput::Elements(1));

    for mode in MODES {
        let table = preloaded(mode, &keys);
        let all = Condition::new();
        let filtered = Condition::new().ge("balance", "5000");

        // Warm the cache so timed loops measure the cached path
        for key in &keys {
            table.select(key, &all).ok();
        }

        group.bench_with_input(BenchmarkId::new("hot_key", mode), &mode, |b, _| {
            b.iter(|| black_box(table.select(&keys[0], &all).ok()))
        });

        let mut rng = StdRng::seed_from_u64(BENCH_SEED);
        group.bench_with_input(BenchmarkId::new("uniform", mode), &mode, |b, _| {
            b.iter(|| {
                let key = &keys[rng.gen_range(0..KEYSPACE)];
                black_box(table.select(key, &filtered).ok())
            })
        });

        group.bench_with_input(BenchmarkId::new("miss", mode), &mode, |b, _| {
            b.iter(|| black_box(table.select("absent", &all).ok()))
        });
    }
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let keys = keys();
    let opts = AccessOptions::new("bench");
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    for mode in MODES {
        group.bench_with_input(BenchmarkId::new("uniform", mode), &mode, |b, &mode| {
            let table = CachedTable::new(info(), mode);
            let mut rng = StdRng::seed_from_u64(BENCH_SEED);
            b.iter(|| {
                let i = rng.gen_range(0..KEYSPACE);
                black_box(table.insert_with(&keys[i], row(i), &opts, false).ok())
            })
        });
    }
    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let keys = keys();
    let opts = AccessOptions::new("bench");
    let mut group = c.benchmark_group("hash");

    for &dirty in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(dirty as u64));
        for mode in MODES {
            let table = CachedTable::new(info(), mode);
            for (i, key) in keys.iter().take(dirty).enumerate() {
                table.insert_with(key, row(i), &opts, false).ok();
            }
            group.bench_with_input(
                BenchmarkId::new(format!("{}", mode), dirty),
                &dirty,
                |b, _| b.iter(|| black_box(table.hash())),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_select, bench_insert, bench_hash);
criterion_main!(benches);
