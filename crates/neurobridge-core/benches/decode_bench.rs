//! Decode path benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use neurobridge_core::decode::decode;
use neurobridge_core::mapping::{MappingEntry, MappingTable, SchemeKind};
use neurobridge_core::types::SpikeBatch;

fn build_table(populations: usize, window: usize) -> MappingTable {
    let entries = (0..populations)
        .map(|i| MappingEntry {
            node_id: format!("V{i}"),
            channel: format!("joint:{}", i % 8),
            scheme: match i % 4 {
                0 => SchemeKind::BipolarSplit,
                1 => SchemeKind::Addition,
                2 => SchemeKind::BooleanThreshold,
                _ => SchemeKind::BipolarScalar,
            },
            gain: 0.5,
            per_step_max: 0.004,
        })
        .collect();
    MappingTable::new(entries, window).unwrap()
}

fn build_batch(populations: usize, window: usize) -> SpikeBatch {
    let mut batch = SpikeBatch::new(0);
    for i in 0..populations {
        let bits = (0..window).map(|b| u32::from((b + i) % 3 == 0)).collect();
        batch.spikes.insert(format!("V{i}"), bits);
    }
    batch
}

fn bench_decode(c: &mut Criterion) {
    let table = build_table(64, 32);
    let batch = build_batch(64, 32);

    c.bench_function("decode_64pop_w32", |b| {
        b.iter(|| decode(black_box(&table), black_box(&batch)));
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
