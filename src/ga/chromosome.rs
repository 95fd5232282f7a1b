//! Chromosomes and chromosome templates.
//!
//! A [`ChromosomeType`] fixes the ordered set of genes and the fitness
//! function; a [`Chromosome`] is one candidate solution built from it.
//! Fitness is evaluated at most once per chromosome and memoized.

use super::gene::{normal, Gene, GeneKind, GeneType, GeneValue};
use crate::error::EvolveError;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of a fitness evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// A finite score; higher is better. Scores `<= 0` exclude the
    /// individual from breeding.
    Score(f64),
    /// The exact optimum was found; the run stops immediately.
    PerfectMatch,
}

impl From<f64> for Evaluation {
    fn from(score: f64) -> Self {
        Evaluation::Score(score)
    }
}

/// `None` signals a perfect match.
impl From<Option<f64>> for Evaluation {
    fn from(score: Option<f64>) -> Self {
        match score {
            Some(s) => Evaluation::Score(s),
            None => Evaluation::PerfectMatch,
        }
    }
}

/// A fitness function over chromosomes.
///
/// Implemented for every `Fn(&Chromosome) -> impl Into<Evaluation>` closure.
/// Fitness functions may be called from several worker threads at once and
/// must not rely on shared mutable state.
pub trait FitnessFunction: Send + Sync {
    fn evaluate(&self, chromosome: &Chromosome) -> Evaluation;
}

impl<F, R> FitnessFunction for F
where
    F: Fn(&Chromosome) -> R + Send + Sync,
    R: Into<Evaluation>,
{
    fn evaluate(&self, chromosome: &Chromosome) -> Evaluation {
        self(chromosome).into()
    }
}

/// Template for building and evaluating chromosomes.
pub struct ChromosomeType {
    gene_types: Vec<Arc<GeneType>>,
    index: HashMap<String, usize>,
    fitness: Arc<dyn FitnessFunction>,
}

impl ChromosomeType {
    /// Creates a template from gene types in declared order.
    ///
    /// Fails if two gene types share a description, a gene type is
    /// malformed, or a step-gene reference does not name a step gene of
    /// this template.
    pub fn new<F>(gene_types: Vec<GeneType>, fitness: F) -> Result<Self, EvolveError>
    where
        F: FitnessFunction + 'static,
    {
        Self::with_fitness(gene_types, Arc::new(fitness))
    }

    pub(crate) fn with_fitness(
        gene_types: Vec<GeneType>,
        fitness: Arc<dyn FitnessFunction>,
    ) -> Result<Self, EvolveError> {
        let mut index = HashMap::with_capacity(gene_types.len());
        for (i, gt) in gene_types.iter().enumerate() {
            gt.validate().map_err(EvolveError::Configuration)?;
            if index.insert(gt.description().to_string(), i).is_some() {
                return Err(EvolveError::Configuration(format!(
                    "duplicate gene description `{}`",
                    gt.description()
                )));
            }
        }

        for gt in &gene_types {
            if let Some(step) = gt.step_gene() {
                let is_step = index.get(step).is_some_and(|&i| {
                    matches!(
                        gene_types[i].kind(),
                        GeneKind::StepSize(_) | GeneKind::InverseFitness(_)
                    )
                });
                if !is_step {
                    return Err(EvolveError::Configuration(format!(
                        "gene `{}` references `{step}`, which is not a step gene",
                        gt.description()
                    )));
                }
            }
        }

        Ok(Self {
            gene_types: gene_types.into_iter().map(Arc::new).collect(),
            index,
            fitness,
        })
    }

    pub fn gene_types(&self) -> &[Arc<GeneType>] {
        &self.gene_types
    }

    /// Position of the gene with the given description.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Builds a chromosome with one random gene per gene type, in order.
    pub fn random_chromosome<R: Rng>(self: &Arc<Self>, rng: &mut R) -> Chromosome {
        let genes = self.gene_types.iter().map(|gt| gt.random_gene(rng)).collect();
        Chromosome::from_genes(Arc::clone(self), genes)
    }
}

impl fmt::Debug for ChromosomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromosomeType")
            .field("gene_types", &self.gene_types)
            .finish_non_exhaustive()
    }
}

/// One candidate solution.
#[derive(Clone)]
pub struct Chromosome {
    template: Arc<ChromosomeType>,
    genes: Vec<Gene>,
    fitness: Option<f64>,
    terminal: bool,
}

impl Chromosome {
    pub(crate) fn from_genes(template: Arc<ChromosomeType>, genes: Vec<Gene>) -> Self {
        debug_assert_eq!(genes.len(), template.gene_types.len());
        Self {
            template,
            genes,
            fitness: None,
            terminal: false,
        }
    }

    pub fn template(&self) -> &Arc<ChromosomeType> {
        &self.template
    }

    /// Genes in template order.
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Value of the gene with the given description.
    pub fn get(&self, key: &str) -> Result<&GeneValue, EvolveError> {
        let i = self
            .template
            .position(key)
            .ok_or_else(|| EvolveError::UnknownGene(key.to_string()))?;
        Ok(self.genes[i].value())
    }

    /// Numeric value of a real, step-size or integer gene.
    pub fn get_f64(&self, key: &str) -> Result<f64, EvolveError> {
        let value = self.get(key)?;
        value.as_f64().ok_or_else(|| EvolveError::GeneValueMismatch {
            key: key.to_string(),
            expected: "numeric",
        })
    }

    /// Replaces the value of the gene with the given description.
    ///
    /// Clears any memoized fitness.
    pub fn set(&mut self, key: &str, value: GeneValue) -> Result<(), EvolveError> {
        let i = self
            .template
            .position(key)
            .ok_or_else(|| EvolveError::UnknownGene(key.to_string()))?;
        let gene_type = &self.template.gene_types[i];
        if !gene_type.accepts(&value) {
            return Err(EvolveError::GeneValueMismatch {
                key: key.to_string(),
                expected: gene_type.expected_kind(),
            });
        }
        self.genes[i].set_value(value);
        self.fitness = None;
        self.terminal = false;
        Ok(())
    }

    /// Memoized fitness, if evaluated and not terminal.
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Whether the fitness function reported a perfect match.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_evaluated(&self) -> bool {
        self.terminal || self.fitness.is_some()
    }

    /// Evaluates fitness, calling the fitness function at most once.
    pub fn evaluate(&mut self) -> Evaluation {
        let evaluation = self.score();
        self.record(evaluation);
        evaluation
    }

    /// Returns the memoized result, or computes one without storing it.
    pub(crate) fn score(&self) -> Evaluation {
        if self.terminal {
            Evaluation::PerfectMatch
        } else if let Some(f) = self.fitness {
            Evaluation::Score(f)
        } else {
            self.template.fitness.evaluate(self)
        }
    }

    pub(crate) fn record(&mut self, evaluation: Evaluation) {
        match evaluation {
            Evaluation::Score(f) => self.fitness = Some(f),
            Evaluation::PerfectMatch => {
                self.fitness = None;
                self.terminal = true;
            }
        }
    }

    pub(crate) fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
        self.terminal = false;
    }

    /// Raises an evaluated fitness to at least `floor`.
    pub(crate) fn raise_fitness(&mut self, floor: f64) {
        if let Some(f) = self.fitness {
            self.fitness = Some(f.max(floor));
        }
    }

    /// Sort key: terminal above every score, unevaluated below every score.
    pub fn rank_key(&self) -> f64 {
        if self.terminal {
            f64::INFINITY
        } else {
            self.fitness.unwrap_or(f64::NEG_INFINITY)
        }
    }

    /// Orders chromosomes by [`rank_key`](Self::rank_key), using IEEE total order.
    pub fn fitness_cmp(&self, other: &Self) -> Ordering {
        self.rank_key().total_cmp(&other.rank_key())
    }

    /// Uniform per-gene crossover.
    ///
    /// Every position independently takes one parent's gene (or the gene
    /// type's blend of both). Fitness-derived genes take their value from the
    /// fitter parent's fitness instead. The child is unevaluated and shares no
    /// mutable state with either parent.
    pub fn crossover<R: Rng>(&self, other: &Chromosome, rng: &mut R) -> Chromosome {
        debug_assert!(Arc::ptr_eq(&self.template, &other.template));
        let parent_fitness = match (self.fitness, other.fitness) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let genes = self
            .genes
            .iter()
            .zip(&other.genes)
            .map(|(a, b)| {
                let gene_type = a.gene_type();
                let value = gene_type
                    .derive_from_fitness(parent_fitness)
                    .unwrap_or_else(|| gene_type.combine(a.value(), b.value(), rng));
                Gene::with_value(Arc::clone(gene_type), value)
            })
            .collect();
        Chromosome::from_genes(Arc::clone(&self.template), genes)
    }

    /// Mutates every gene a random number of times.
    ///
    /// For each gene a count `x ~ N(rate, stdev)` is drawn; the gene is
    /// mutated `floor(x)` times plus once more with probability
    /// `x - floor(x)`. Each mutation sees the chromosome as it stands after
    /// the previous one. Clears any memoized fitness.
    pub fn mutate<R: Rng>(&mut self, rate: f64, stdev: f64, rng: &mut R) {
        for i in 0..self.genes.len() {
            for _ in 0..mutation_count(rate, stdev, rng) {
                let gene_type = Arc::clone(self.genes[i].gene_type());
                let next = gene_type.mutate(self.genes[i].value(), self, rng);
                self.genes[i].set_value(next);
            }
        }
        self.fitness = None;
        self.terminal = false;
    }
}

fn mutation_count<R: Rng>(rate: f64, stdev: f64, rng: &mut R) -> usize {
    let draw = normal(rng, rate, stdev);
    if !(draw > 0.0) {
        return 0;
    }
    let whole = draw.floor();
    let mut count = whole as usize;
    if rng.random::<f64>() < draw - whole {
        count += 1;
    }
    count
}

impl fmt::Debug for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chromosome")
            .field("genes", &self.genes)
            .field("fitness", &self.fitness)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.terminal, self.fitness) {
            (true, _) => writeln!(f, "fitness: perfect match")?,
            (false, Some(fit)) => writeln!(f, "fitness: {fit}")?,
            (false, None) => writeln!(f, "fitness: not evaluated")?,
        }
        for gene in &self.genes {
            writeln!(f, "  {gene}")?;
        }
        Ok(())
    }
}
