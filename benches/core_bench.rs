use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jianzhen_core::{
    fingerprint, DecisionEngine, DetectorKind, DetectorResult, EnsembleAggregator,
    ProvenanceResult,
};

fn detections() -> Vec<DetectorResult> {
    vec![
        DetectorResult::scored(DetectorKind::VisionModel, 88.0, 0.91),
        DetectorResult::scored(DetectorKind::ArtifactForensics, 72.5, 0.64),
        DetectorResult::scored(DetectorKind::FrequencyAnalysis, 80.0, 0.55),
        DetectorResult::unavailable(DetectorKind::TextClassifier, "no text attached"),
    ]
}

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = EnsembleAggregator::default();
    let results = detections();

    c.bench_function("ensemble_aggregate", |b| {
        b.iter(|| aggregator.aggregate(black_box(&results)))
    });
}

fn bench_decide(c: &mut Criterion) {
    let aggregator = EnsembleAggregator::default();
    let engine = DecisionEngine::default();
    let results = detections();

    c.bench_function("aggregate_and_decide", |b| {
        b.iter(|| engine.decide(aggregator.aggregate(black_box(&results)), None))
    });

    c.bench_function("provenance_override", |b| {
        b.iter(|| {
            engine.decide(
                aggregator.skipped("bench"),
                Some(ProvenanceResult::verified("bench", None)),
            )
        })
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    // 非图片字节：只计算 SHA256
    let payload = vec![0xA5u8; 256 * 1024];
    c.bench_function("fingerprint_sha256_256k", |b| {
        b.iter(|| fingerprint::fingerprint_bytes(black_box(&payload)))
    });
}

criterion_group!(benches, bench_aggregate, bench_decide, bench_fingerprint);
criterion_main!(benches);
