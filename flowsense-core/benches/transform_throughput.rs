//! Benchmarks for the preprocessing transform
//!
//! Measures per-record encoding over the CIC-IDS2017 schema and whole-batch
//! encoding from raw rows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowsense_core::{
    FeatureSchema, InMemoryShard, InMemoryShardSet, PipelineConfig, RecordBatch, RecordTransform,
};

fn synthetic_rows(schema: &FeatureSchema, count: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let header: Vec<String> = schema
        .feature_columns()
        .map(str::to_string)
        .chain(std::iter::once(schema.label_column().to_string()))
        .collect();
    let rows = (0..count)
        .map(|i| {
            let numeric = (0..schema.numeric().len()).map(|j| ((i * 31 + j * 7) % 1000).to_string());
            let categorical = (0..schema.categorical().len()).map(|j| ((i + j) % 3).to_string());
            let label = if i % 5 == 0 { "DDoS" } else { "BENIGN" };
            numeric
                .chain(categorical)
                .chain(std::iter::once(label.to_string()))
                .collect()
        })
        .collect();
    (header, rows)
}

fn bench_transform(c: &mut Criterion) {
    let schema = FeatureSchema::cic_ids2017();
    let (header, rows) = synthetic_rows(&schema, 5000);
    let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
    let set = InMemoryShardSet::new(vec![InMemoryShard::new("bench", &header_refs, rows.clone())]);
    let (metadata, _) =
        flowsense_core::collect_metadata(&set, &schema, &PipelineConfig::default()).expect("metadata pass");
    let preprocessor = metadata.preprocessor(1e9).expect("preprocessor");

    let mut group = c.benchmark_group("transform");

    let batch = RecordBatch::new(&header, rows);
    let records: Vec<_> = batch
        .to_records(&schema)
        .expect("records")
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("records_5000", |b| {
        b.iter(|| {
            for record in &records {
                black_box(preprocessor.apply(black_box(record)).expect("encode"));
            }
        });
    });

    for size in [500usize, 5000] {
        let (header, rows) = synthetic_rows(&schema, size);
        let batch = RecordBatch::new(&header, rows);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("raw_batch", size), &batch, |b, batch| {
            b.iter(|| black_box(preprocessor.apply_batch(batch, &schema).expect("batch")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
