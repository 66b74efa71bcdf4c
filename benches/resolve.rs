//! Benchmarks for the request hot path.
//!
//! Benchmark targets:
//! - Tokenizing a typical label: <50us
//! - Heuristic classification: <10us per name
//! - Retrieval query over the bootstrap dataset: <1ms
//! - Offline analysis of a fully known list: <5ms

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use ingrisk::embedding::HashEmbedder;
use ingrisk::llm::UnavailableClient;
use ingrisk::services::{AnalysisService, KnowledgeBase, heuristic_record, tokenize};
use ingrisk::storage::{
    KnowledgeStore, MemoryKnowledgeStore, RetrievalIndex, VectorIndex, bootstrap_records,
};

const SHORT_LABEL: &str = "Water, Glycerin, Niacinamide";
const LONG_LABEL: &str = "Aqua (Water), Glycerin, Cetearyl Alcohol, Caprylic/Capric Triglyceride, \
    Butyrospermum Parkii (Shea) Butter, Niacinamide, Dimethicone, Panthenol, Tocopherol; \
    Sodium Hyaluronate, Phenoxyethanol, Ethylhexylglycerin, Xanthan Gum, Citric Acid, \
    Parfum (Fragrance), Limonene, Linalool";

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");
    group.measurement_time(Duration::from_secs(5));

    for (label, text) in [("short", SHORT_LABEL), ("long", LONG_LABEL)] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), text, |b, text| {
            b.iter(|| tokenize(black_box(text)));
        });
    }

    group.finish();
}

fn bench_heuristic(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic");

    let names = [
        ("exfoliant", "Mandelic Acid"),
        ("emollient", "Marula Oil"),
        ("silicone", "Cyclopentasiloxane"),
        ("generic", "Xanthan Gum"),
        ("placeholder_name", "Unknown Botanical Blend"),
    ];
    for (label, name) in names {
        group.bench_function(label, |b| {
            b.iter(|| heuristic_record(black_box(name)));
        });
    }

    group.finish();
}

fn bench_index_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_query");

    let records = bootstrap_records().expect("bootstrap");
    let index = VectorIndex::in_memory(Arc::new(HashEmbedder::new()));
    index.rebuild(&records).expect("rebuild");

    for top_k in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("top_k", top_k), &top_k, |b, &top_k| {
            b.iter(|| {
                index
                    .query(black_box("Find safety info for cosmetic ingredient: retinol"), top_k)
                    .expect("query")
            });
        });
    }

    group.finish();
}

fn bench_analyze_known(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    group.measurement_time(Duration::from_secs(5));

    let store = Arc::new(MemoryKnowledgeStore::bootstrap().expect("bootstrap"));
    let index = Arc::new(VectorIndex::in_memory(Arc::new(HashEmbedder::new())));
    let knowledge = Arc::new(KnowledgeBase::open(store, index).expect("knowledge base"));
    let service = AnalysisService::new(knowledge, Arc::new(UnavailableClient));

    let known: Vec<String> = service
        .knowledge()
        .store()
        .snapshot()
        .keys()
        .take(12)
        .map(ToString::to_string)
        .collect();
    let text = known.join(", ");

    group.throughput(Throughput::Elements(known.len() as u64));
    group.bench_function("known_offline", |b| {
        b.iter(|| service.analyze(black_box(&text)).expect("analyze"));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenize,
    bench_heuristic,
    bench_index_query,
    bench_analyze_known
);
criterion_main!(benches);
