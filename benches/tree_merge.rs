//! Benchmarks for topic tree merging and filtering
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use prost::Message as _;
use topic_tree::pipeline::sparkplug::{metric, DataType, Metric, Payload};
use topic_tree::pipeline::Preprocessor;
use topic_tree::{filter_tree, IncomingMessage, Message, PayloadValue, PreprocessorKind, Tree};

/// `count` messages spread over a few hundred topics, 4 levels deep
fn messages(count: usize) -> Vec<IncomingMessage> {
    (0..count)
        .map(|i| {
            let topic = format!("site{}/area{}/line{}/sensor{}", i % 3, i % 7, i % 11, i % 13);
            IncomingMessage::new(topic, Some(format!("{{\"value\":{}}}", i).into_bytes()))
        })
        .collect()
}

fn bench_batch_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_merge");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let batch = messages(size);
            b.iter(|| {
                let mut tree: Tree = Tree::new();
                for message in batch.iter().cloned() {
                    tree.receive(message);
                }
                black_box(tree.apply_unmerged_changes())
            });
        });
    }

    group.finish();
}

fn bench_merge_into_populated(c: &mut Criterion) {
    let mut tree: Tree = Tree::new();
    for message in messages(10_000) {
        tree.receive(message);
    }
    tree.apply_unmerged_changes();
    let batch = messages(1_000);

    c.bench_function("merge_1000_into_populated", |b| {
        b.iter(|| {
            for message in batch.iter().cloned() {
                tree.receive(message);
            }
            black_box(tree.apply_unmerged_changes())
        });
    });
}

fn bench_filter(c: &mut Criterion) {
    let mut tree: Tree = Tree::new();
    for message in messages(10_000) {
        tree.receive(message);
    }
    tree.apply_unmerged_changes();

    let mut group = c.benchmark_group("filter_tree");
    for needle in ["line3", "\"value\":99", "nomatch"].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(needle), needle, |b, needle| {
            b.iter(|| {
                let filtered = filter_tree(&tree, needle).unwrap();
                black_box(filtered.child_topic_count())
            });
        });
    }
    group.finish();
}

fn bench_namespace_expansion(c: &mut Criterion) {
    let metrics = (0..50)
        .map(|i| Metric {
            name: Some(format!("motor{}:rpm", i)),
            datatype: Some(DataType::Double as u32),
            value: Some(metric::Value::DoubleValue(i as f64)),
            ..Default::default()
        })
        .collect();
    let bytes = Payload {
        timestamp: Some(1),
        seq: Some(0),
        metrics,
        ..Default::default()
    }
    .encode_to_vec();
    let message = Message::new(
        "spBv1.0/plant:hall1/NDATA/edge1",
        Some(PayloadValue::from_bytes(bytes)),
    );
    let preprocessor = Preprocessor::from_kind(PreprocessorKind::NamespaceExpanding);

    c.bench_function("expand_50_metrics", |b| {
        b.iter(|| black_box(preprocessor.apply(message.clone())))
    });
}

criterion_group!(
    benches,
    bench_batch_merge,
    bench_merge_into_populated,
    bench_filter,
    bench_namespace_expansion
);
criterion_main!(benches);
