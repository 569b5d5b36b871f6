use criterion::{black_box, criterion_group, criterion_main, Criterion};
use packlock_core::{resolve_lock, DiscoveryInput, LockRequest, Pipeline};
use packlock_schema::{PackId, Record};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Layered pack graph: every pack in layer `n` requires two packs of layer
/// `n - 1`, and layer 0 packs each own a surface.
fn layered_records(layers: usize, width: usize) -> Vec<Value> {
    let mut records = Vec::new();
    for layer in 0..layers {
        for i in 0..width {
            let requires: Vec<String> = if layer == 0 {
                Vec::new()
            } else {
                vec![
                    format!("pack-{}-{i}", layer - 1),
                    format!("pack-{}-{}", layer - 1, (i + 1) % width),
                ]
            };
            let owns: Vec<String> = if layer == 0 {
                vec![format!("surface-{i}")]
            } else {
                Vec::new()
            };
            records.push(json!({
                "id": format!("pack-{layer}-{i}"),
                "version": "1.0.0",
                "compat": {"engine_min": "1.0.0", "engine_max": "9.9.9"},
                "requires": requires,
                "owns_surfaces": owns,
            }));
        }
    }
    records
}

fn mapping(records: &[Value]) -> BTreeMap<PackId, Record> {
    records
        .iter()
        .filter_map(|v| {
            let record = v.as_object()?.clone();
            let id = PackId::from(record.get("id")?.as_str()?);
            Some((id, record))
        })
        .collect()
}

fn top_layer(layers: usize, width: usize) -> Vec<String> {
    (0..width)
        .map(|i| format!("pack-{}-{i}", layers - 1))
        .collect()
}

fn bench_resolve_small(c: &mut Criterion) {
    let manifests = mapping(&layered_records(3, 4));
    let selected = top_layer(3, 4);
    c.bench_function("resolve_12_packs", |b| {
        b.iter(|| resolve_lock(black_box(&manifests), black_box(&selected), "2.0.0").unwrap());
    });
}

fn bench_resolve_large(c: &mut Criterion) {
    let manifests = mapping(&layered_records(10, 20));
    let selected = top_layer(10, 20);
    c.bench_function("resolve_200_packs", |b| {
        b.iter(|| resolve_lock(black_box(&manifests), black_box(&selected), "2.0.0").unwrap());
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let records = layered_records(5, 10);
    let (installer, user) = records.split_at(records.len() / 2);
    let request = LockRequest {
        candidates: DiscoveryInput {
            workspace: Vec::new(),
            installer: installer.to_vec(),
            user: user.to_vec(),
        },
        selected: top_layer(5, 10),
        engine_version: "2.0.0".to_owned(),
        ..Default::default()
    };
    c.bench_function("pipeline_50_packs", |b| {
        b.iter(|| Pipeline::run(black_box(&request)).unwrap());
    });
}

fn bench_lock_serialize(c: &mut Criterion) {
    let manifests = mapping(&layered_records(10, 20));
    let lock = resolve_lock(&manifests, &top_layer(10, 20), "2.0.0").unwrap();
    c.bench_function("lock_to_file_contents_200_packs", |b| {
        b.iter(|| black_box(&lock).to_file_contents().unwrap());
    });
}

criterion_group!(
    benches,
    bench_resolve_small,
    bench_resolve_large,
    bench_pipeline,
    bench_lock_serialize,
);
criterion_main!(benches);
