//! Performance benchmarks for rebuild and redefinition.
//!
//! Run with: `cargo bench --bench rebuild`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Rebuild (1000 elements) | <10ms | Warm parse cache |
//! | In-place update | Linear in dependents | No rebuild |
//! | Batch commit | One rebuild | Independent of batch size |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use construction_kernel::{CodecKind, Construction, ConstructionConfig};

/// Chain `e0 = 1`, `e{i} = e{i-1} + 1`, with a free constant `k` at the end.
fn make_chain(len: usize, codec: CodecKind) -> Construction {
    let config = ConstructionConfig { codec, auto_store_undo: false, ..Default::default() };
    let mut c = Construction::with_config(config);
    c.define("e0", "1").unwrap();
    for i in 1..len {
        c.define(&format!("e{}", i), &format!("e{} + 1", i - 1)).unwrap();
    }
    c.define("k", "2").unwrap();
    c
}

/// Benchmark rebuilding from the current snapshot text.
fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild");

    for codec in [CodecKind::Json, CodecKind::Xml] {
        for len in [10, 100, 1000] {
            let mut construction = make_chain(len, codec);
            let text = construction.current_undo_xml().unwrap();

            group.throughput(Throughput::Elements(len as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", codec).to_lowercase(), len),
                &text,
                |b, text| b.iter(|| construction.rebuild(black_box(text)).unwrap()),
            );
        }
    }

    group.finish();
}

/// Benchmark a constant update propagated through a chain.
fn bench_update_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_in_place");

    for len in [10, 100, 1000] {
        let mut construction = make_chain(len, CodecKind::Json);
        let mut value = 0u64;

        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(BenchmarkId::new("chain", len), |b| {
            b.iter(|| {
                value += 1;
                construction.replace("e0", black_box(&value.to_string())).unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark committing a batch of redefinitions.
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");

    for batch in [1, 10, 50] {
        let mut construction = make_chain(500, CodecKind::Json);

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(BenchmarkId::new("redefines", batch), |b| {
            b.iter(|| {
                construction.start_collecting_redefines();
                for i in 1..=batch {
                    let label = format!("e{}", i * 5);
                    let definition = format!("e{} * k", i * 5 - 1);
                    construction.replace(&label, &definition).unwrap();
                }
                let rebuilt = construction.commit().unwrap();
                construction.stop_collecting_redefines();
                rebuilt
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rebuild, bench_update_in_place, bench_batch_commit);
criterion_main!(benches);
