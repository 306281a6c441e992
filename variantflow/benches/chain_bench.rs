//! Benchmarks for chain discovery.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use variantflow::attributes::{MatchingCache, StrictMatcher};
use variantflow::chain::ChainFinder;
use variantflow::testing::{attrs, noop_registry};
use std::sync::Arc;

fn chain_benchmark(c: &mut Criterion) {
    let registry = noop_registry(&[
        ("unzip", &[("type", "jar")], &[("type", "classes")]),
        ("analyze", &[("type", "classes")], &[("type", "analyzed")]),
        ("minify", &[("type", "jar")], &[("type", "minified-jar")]),
        ("index", &[("type", "analyzed")], &[("type", "indexed")]),
    ]);
    let sources = vec![attrs(&[("type", "jar")])];
    let requested = attrs(&[("type", "indexed")]);

    c.bench_function("three_step_chain_cold", |b| {
        b.iter(|| {
            let finder = ChainFinder::new(
                registry.clone(),
                MatchingCache::new(Arc::new(StrictMatcher)),
            );
            black_box(finder.find_transform_chains(&sources, &requested))
        });
    });

    let warm = ChainFinder::new(
        registry.clone(),
        MatchingCache::new(Arc::new(StrictMatcher)),
    );
    warm.find_transform_chains(&sources, &requested);
    c.bench_function("three_step_chain_memoized", |b| {
        b.iter(|| black_box(warm.find_transform_chains(&sources, &requested)));
    });
}

criterion_group!(benches, chain_benchmark);
criterion_main!(benches);
