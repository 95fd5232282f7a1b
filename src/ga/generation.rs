//! Populations and the generation step.

use super::breeding_pool::BreedingPool;
use super::chromosome::{Chromosome, ChromosomeType, Evaluation};
use crate::error::EvolveError;
use rand::Rng;
use rayon::prelude::*;
use std::sync::Arc;

/// Parameters for producing the next generation.
#[derive(Debug, Clone, PartialEq)]
pub struct BreedingParams {
    /// Size of the new generation.
    pub target_size: usize,
    /// Number of most-fit chromosomes carried over unchanged.
    pub elitism: usize,
    /// Number of fresh random chromosomes added to the breeding pool.
    pub random_individuals: usize,
    /// Lower bound applied to the fitness of random chromosomes.
    pub random_fitness_floor: Option<f64>,
    /// Mean number of mutations per gene.
    pub mutation_rate: f64,
    /// Standard deviation of the number of mutations per gene.
    pub mutation_stdev: f64,
}

/// A population of chromosomes sharing one template.
#[derive(Debug, Clone)]
pub struct Generation {
    template: Arc<ChromosomeType>,
    population: Vec<Chromosome>,
}

impl Generation {
    pub fn new(template: Arc<ChromosomeType>, population: Vec<Chromosome>) -> Self {
        Self {
            template,
            population,
        }
    }

    /// A generation of `size` random chromosomes.
    pub fn random<R: Rng>(template: Arc<ChromosomeType>, size: usize, rng: &mut R) -> Self {
        let population = (0..size).map(|_| template.random_chromosome(rng)).collect();
        Self::new(template, population)
    }

    pub fn template(&self) -> &Arc<ChromosomeType> {
        &self.template
    }

    pub fn population(&self) -> &[Chromosome] {
        &self.population
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    pub(crate) fn population_mut(&mut self) -> &mut [Chromosome] {
        &mut self.population
    }

    pub(crate) fn extend(&mut self, chromosomes: impl IntoIterator<Item = Chromosome>) {
        self.population.extend(chromosomes);
    }

    /// Evaluates every chromosome that has no memoized fitness.
    ///
    /// With `workers <= 1` chromosomes are evaluated in order on the calling
    /// thread. Otherwise the population is split into `workers` contiguous
    /// chunks (the last one absorbing the remainder); each chunk runs as an
    /// independent rayon task that reads its slice and returns plain
    /// [`Evaluation`] values. Results are written back only after every
    /// chunk has finished.
    ///
    /// # Errors
    ///
    /// [`EvolveError::PerfectMatch`] carrying the first terminal chromosome,
    /// after all results have been merged.
    pub fn evaluate(&mut self, workers: usize) -> Result<(), EvolveError> {
        if workers <= 1 || self.population.len() <= 1 {
            for chromosome in &mut self.population {
                chromosome.evaluate();
            }
        } else {
            let results: Vec<Vec<Evaluation>> = chunk_bounds(self.population.len(), workers)
                .into_par_iter()
                .map(|(lo, hi)| self.population[lo..hi].iter().map(Chromosome::score).collect())
                .collect();

            let merged = results.into_iter().flatten();
            for (chromosome, evaluation) in self.population.iter_mut().zip(merged) {
                chromosome.record(evaluation);
            }
        }

        match self.population.iter().find(|c| c.is_terminal()) {
            Some(terminal) => Err(EvolveError::PerfectMatch(Box::new(terminal.clone()))),
            None => Ok(()),
        }
    }

    /// The `n` most-fit chromosomes, best first.
    ///
    /// Unevaluated chromosomes are evaluated on the calling thread first.
    /// Returns the whole population when `n` exceeds its size.
    pub fn n_most_fit(&mut self, n: usize) -> Vec<&Chromosome> {
        if n == 0 {
            return Vec::new();
        }
        for chromosome in &mut self.population {
            chromosome.evaluate();
        }
        let mut ranked: Vec<&Chromosome> = self.population.iter().collect();
        ranked.sort_by(|a, b| b.fitness_cmp(a));
        ranked.truncate(n);
        ranked
    }

    /// The most-fit evaluated chromosome, if any chromosome is evaluated.
    pub fn best(&self) -> Option<&Chromosome> {
        self.population
            .iter()
            .filter(|c| c.is_evaluated())
            .max_by(|a, b| a.fitness_cmp(b))
    }

    /// Breeds the next generation.
    ///
    /// 1. The `elitism` most-fit chromosomes are copied over unchanged.
    /// 2. Every chromosome with fitness `> 0`, plus `random_individuals`
    ///    fresh random chromosomes (evaluated immediately and raised to
    ///    `random_fitness_floor` when set), forms the breeding input.
    /// 3. Parents are drawn with replacement from a [`BreedingPool`] over that
    ///    input; each child is crossed over and mutated, until the new
    ///    generation holds `target_size` chromosomes.
    ///
    /// # Errors
    ///
    /// - [`EvolveError::EmptyBreedingPool`] if no chromosome qualifies for
    ///   breeding
    /// - [`EvolveError::PerfectMatch`] if a random chromosome is a perfect match
    pub fn next_generation<R: Rng>(
        &mut self,
        params: &BreedingParams,
        rng: &mut R,
    ) -> Result<Generation, EvolveError> {
        let mut next: Vec<Chromosome> = self
            .n_most_fit(params.elitism.min(params.target_size))
            .into_iter()
            .cloned()
            .collect();

        let mut randoms = Vec::with_capacity(params.random_individuals);
        for _ in 0..params.random_individuals {
            let mut rando = self.template.random_chromosome(rng);
            if rando.evaluate() == Evaluation::PerfectMatch {
                return Err(EvolveError::PerfectMatch(Box::new(rando)));
            }
            if let Some(floor) = params.random_fitness_floor {
                rando.raise_fitness(floor);
            }
            randoms.push(rando);
        }

        let parents: Vec<&Chromosome> = self
            .population
            .iter()
            .chain(randoms.iter())
            .filter(|c| c.fitness().is_some_and(|f| f > 0.0))
            .collect();

        if next.len() < params.target_size {
            let pool = BreedingPool::new(parents)?;
            while next.len() < params.target_size {
                let mother = pool.get(rng);
                let father = pool.get(rng);
                let mut child = mother.crossover(father, rng);
                child.mutate(params.mutation_rate, params.mutation_stdev, rng);
                next.push(child);
            }
        }

        Ok(Generation::new(Arc::clone(&self.template), next))
    }
}

/// Splits `len` items into at most `workers` contiguous `(lo, hi)` ranges.
///
/// All ranges hold `len / workers` items except the last, which takes the
/// remainder.
fn chunk_bounds(len: usize, workers: usize) -> Vec<(usize, usize)> {
    let workers = workers.clamp(1, len.max(1));
    let size = len / workers;
    (0..workers)
        .map(|i| {
            let lo = i * size;
            let hi = if i + 1 == workers { len } else { lo + size };
            (lo, hi)
        })
        .collect()
}
