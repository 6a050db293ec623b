//! Table benchmarks: write, scan, seek, and point lookup.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports. Tables live in [`MemFs`] so the numbers
//! reflect encoding and block work rather than disk I/O.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench sstable              # run everything
//! cargo bench --bench sstable -- seek      # filter by name
//! ```

use std::sync::Arc;

use criterion::{
    BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use aeternus_sstable::{
    BlockCache, BloomFilterPolicy, CacheOpts, CompressionType, FileSystem, InternalKey,
    InternalKeyKind, MemFs, Reader, ReaderOptions, Writer, WriterOptions,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

const ENTRIES: u64 = 20_000;

/// Default value payload (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

fn write_table(fs: &MemFs, name: &str, opts: WriterOptions) {
    let mut writer = Writer::new(fs.create(name).unwrap(), opts).unwrap();
    for i in 0..ENTRIES {
        let key = InternalKey::new(make_key(i), i + 1, InternalKeyKind::Set);
        writer.add(&key, VALUE_128B).unwrap();
    }
    writer.close().unwrap();
}

fn bloom_options() -> WriterOptions {
    WriterOptions {
        filter_policy: Some(Arc::new(BloomFilterPolicy::default())),
        ..WriterOptions::default()
    }
}

fn open_cached(fs: &MemFs, name: &str) -> Reader {
    let cache = Arc::new(BlockCache::new(64 << 20));
    let cache_id = cache.new_id();
    Reader::open(
        fs.open(name).unwrap(),
        ReaderOptions {
            filter_policy: Some(Arc::new(BloomFilterPolicy::default())),
            cache: Some(CacheOpts {
                cache,
                cache_id,
                file_num: 1,
            }),
            ..ReaderOptions::default()
        },
    )
    .unwrap()
}

// ================================================================================================
// Write
// ================================================================================================

/// Build a 20,000-entry table with each compression setting.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(ENTRIES));
    group.sample_size(20);

    for compression in [CompressionType::None, CompressionType::Snappy] {
        group.bench_function(BenchmarkId::from_parameter(compression.name()), |b| {
            let fs = MemFs::new();
            b.iter(|| {
                let opts = WriterOptions {
                    compression,
                    ..bloom_options()
                };
                write_table(&fs, "bench.sst", opts);
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Read
// ================================================================================================

/// Full forward and backward scans over a cached table.
fn bench_scan(c: &mut Criterion) {
    let fs = MemFs::new();
    write_table(&fs, "bench.sst", bloom_options());
    let reader = open_cached(&fs, "bench.sst");

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(ENTRIES));
    group.sample_size(20);

    group.bench_function("forward", |b| {
        b.iter(|| {
            let mut iter = reader.iter(None, None);
            let mut n = 0u64;
            let mut more = iter.first().unwrap();
            while more {
                n += black_box(iter.value()).len() as u64;
                more = iter.next().unwrap();
            }
            n
        });
    });

    group.bench_function("backward", |b| {
        b.iter(|| {
            let mut iter = reader.iter(None, None);
            let mut n = 0u64;
            let mut more = iter.last().unwrap();
            while more {
                n += black_box(iter.value()).len() as u64;
                more = iter.prev().unwrap();
            }
            n
        });
    });

    group.finish();
}

/// Random `seek_ge` and `get` against a cached table; misses are pruned
/// by the bloom filter.
fn bench_seek(c: &mut Criterion) {
    let fs = MemFs::new();
    write_table(&fs, "bench.sst", bloom_options());
    let reader = open_cached(&fs, "bench.sst");
    let mut rng = StdRng::seed_from_u64(7);

    let mut group = c.benchmark_group("seek");

    group.bench_function("seek_ge", |b| {
        let mut iter = reader.iter(None, None);
        b.iter(|| {
            let key = make_key(rng.random_range(0..ENTRIES));
            iter.seek_ge(black_box(&key)).unwrap()
        });
    });

    group.bench_function("get_hit", |b| {
        b.iter(|| {
            let key = make_key(rng.random_range(0..ENTRIES));
            reader.get(black_box(&key)).unwrap()
        });
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| {
            let key = make_key(rng.random_range(ENTRIES..ENTRIES * 2));
            reader.get(black_box(&key)).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_scan, bench_seek);
criterion_main!(benches);
