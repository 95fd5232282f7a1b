//! Criterion benchmarks for u-evolve.
//!
//! Uses a shifted Sphere function so every score is positive and the
//! whole population can breed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use u_evolve::ga::{
    BreedingPool, Chromosome, ChromosomeType, EvolutionConfig, EvolutionManager, GeneType,
    Generation,
};
use u_numflow::random::create_rng;

// ===========================================================================
// Shifted Sphere: maximize 1000 - sum(x_i^2)
// ===========================================================================

fn sphere(c: &Chromosome) -> f64 {
    let sum: f64 = c
        .genes()
        .iter()
        .filter_map(|g| g.value().as_f64())
        .map(|x| x * x)
        .sum();
    1000.0 - sum
}

fn gene_types(dim: usize) -> Vec<GeneType> {
    (0..dim)
        .map(|i| GeneType::real(format!("x{i}"), -5.0, 5.0).with_mutation(0.0, 0.5))
        .collect()
}

fn evaluated_generation(dim: usize, pop: usize) -> Generation {
    let template = Arc::new(ChromosomeType::new(gene_types(dim), sphere).expect("valid template"));
    let mut rng = create_rng(42);
    let mut generation = Generation::random(template, pop, &mut rng);
    generation.evaluate(1).expect("no perfect match");
    generation
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_breeding_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("breeding_pool_draw");

    for &pop in &[100usize, 1_000, 10_000] {
        let generation = evaluated_generation(2, pop);
        let pool = BreedingPool::new(generation.population().iter().collect()).expect("pool");
        group.bench_with_input(BenchmarkId::from_parameter(pop), &pool, |b, pool| {
            let mut rng = create_rng(7);
            b.iter(|| black_box(pool.get(&mut rng)))
        });
    }
    group.finish();
}

fn bench_next_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_generation");
    group.sample_size(20);

    for (dim, pop) in [(10usize, 100usize), (10, 1_000), (50, 1_000)] {
        let params = EvolutionConfig::default()
            .with_population_size(pop)
            .with_elitism(pop / 100)
            .breeding_params();
        group.bench_function(BenchmarkId::new(format!("d{dim}"), pop), |b| {
            let mut generation = evaluated_generation(dim, pop);
            let mut rng = create_rng(3);
            b.iter(|| black_box(generation.next_generation(&params, &mut rng)))
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(20);

    for &workers in &[1usize, 4] {
        let template = Arc::new(ChromosomeType::new(gene_types(100), sphere).expect("template"));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &w| {
            b.iter_batched(
                || Generation::random(Arc::clone(&template), 2_000, &mut create_rng(5)),
                |mut generation| black_box(generation.evaluate(w)),
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolution_run");
    group.sample_size(10);

    for (dim, pop, gen) in [(10usize, 50usize, 50usize), (50, 100, 30)] {
        let config = EvolutionConfig::default()
            .with_population_size(pop)
            .with_elitism(1)
            .with_max_generations(gen)
            .with_seed(42);
        group.bench_with_input(
            BenchmarkId::new(format!("d{}_p{}_g{}", dim, pop, gen), dim),
            &config,
            |b, config| {
                b.iter(|| {
                    let mut manager = EvolutionManager::new(config.clone(), sphere);
                    for gene_type in gene_types(dim) {
                        manager.add_gene_type(gene_type).expect("configuring");
                    }
                    black_box(manager.run())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_breeding_pool,
    bench_next_generation,
    bench_evaluate,
    bench_full_run
);
criterion_main!(benches);
