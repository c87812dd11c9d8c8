use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hr_rag_agent::curation::{compute_similarity, EmbeddingGroup, Metric};
use hr_rag_agent::kg::{Chunk, Chunker, EntityExtractor};

/// Deterministic pseudo-embeddings (no RNG needed for a stable benchmark).
fn synthetic_group(count: usize, dim: usize) -> BTreeMap<String, EmbeddingGroup> {
    let embeddings: Vec<Vec<f32>> = (0..count)
        .map(|i| {
            (0..dim)
                .map(|d| ((i * 31 + d * 7) as f32 * 0.01).sin())
                .collect()
        })
        .collect();

    let mut groups = BTreeMap::new();
    groups.insert(
        "CONCEPT".to_string(),
        EmbeddingGroup {
            entity_names: (0..count).map(|i| format!("entity_{i}")).collect(),
            embeddings,
            indices: (0..count).collect(),
        },
    );
    groups
}

fn similarity_benchmark(c: &mut Criterion) {
    let groups = synthetic_group(128, 256);

    c.bench_function("pairwise_cosine_128x256", |b| {
        b.iter(|| {
            let results =
                compute_similarity(black_box(&groups), Metric::Cosine, 0.8).unwrap();
            black_box(results.len());
        });
    });

    c.bench_function("pairwise_euclidean_128x256", |b| {
        b.iter(|| {
            let results =
                compute_similarity(black_box(&groups), Metric::Euclidean, 0.8).unwrap();
            black_box(results.len());
        });
    });
}

fn chunker_benchmark(c: &mut Criterion) {
    let chunker = Chunker::new(64, 8);
    let text = "Die Kündigungsfrist richtet sich nach § 622 BGB und verlängert \
        sich mit der Dauer der Betriebszugehörigkeit des Arbeitnehmers."
        .repeat(64);

    c.bench_function("chunker_split_long_text", |b| {
        b.iter(|| {
            let chunks = chunker.chunk(black_box(text.as_str()), "bench");
            black_box(chunks.len());
        });
    });
}

fn extractor_benchmark(c: &mut Criterion) {
    let extractor = EntityExtractor::new();
    let base_text = "Anna Schmidt verhandelt mit der Müller GmbH über das \
        Bundesurlaubsgesetz, die Probezeit und § 622 BGB in Berlin."
        .repeat(32);
    let token_count = base_text.split_whitespace().count();
    let chunk = Chunk::new(base_text.clone(), 0, token_count, "bench_source");

    c.bench_function("entity_extractor_dense_text", |b| {
        b.iter(|| {
            let (entities, relations) = extractor.extract(black_box(&chunk));
            black_box((entities.len(), relations.len()));
        });
    });
}

criterion_group!(
    benches,
    similarity_benchmark,
    chunker_benchmark,
    extractor_benchmark
);
criterion_main!(benches);
