//! Genes and gene templates.
//!
//! A [`GeneType`] describes one decision variable: how to generate a random
//! value, how to mutate it, and how two parents' values combine during
//! crossover. A [`Gene`] is one instance of that variable inside a
//! [`Chromosome`].
//!
//! Gene kinds form a closed set ([`GeneKind`]). A real or integer gene may
//! name a step gene and scale its mutation strength by that gene's current
//! value. Two kinds can serve as step genes: [`GeneKind::StepSize`] evolves
//! log-normally (self-adaptive), and [`GeneKind::InverseFitness`] is derived
//! from the parents' fitness, so mutations shrink as the population improves.

use super::chromosome::Chromosome;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The value held by a gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneValue {
    Real(f64),
    Integer(i64),
    Boolean(bool),
}

impl GeneValue {
    /// Returns the value as `f64` for real and integer genes.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            GeneValue::Real(v) => Some(v),
            GeneValue::Integer(v) => Some(v as f64),
            GeneValue::Boolean(_) => None,
        }
    }

    /// Returns the value of an integer gene.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            GeneValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value of a boolean gene.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            GeneValue::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            GeneValue::Real(_) => "real",
            GeneValue::Integer(_) => "integer",
            GeneValue::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for GeneValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneValue::Real(v) => write!(f, "{v}"),
            GeneValue::Integer(v) => write!(f, "{v}"),
            GeneValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// How new real values are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RealInit {
    /// Uniform over the gene's `[min, max]` bounds.
    Uniform,
    /// Normal with the given mean and standard deviation, clamped to bounds.
    Normal { mean: f64, stdev: f64 },
}

/// A real-valued gene.
#[derive(Debug, Clone, PartialEq)]
pub struct RealGene {
    pub min: f64,
    pub max: f64,
    pub init: RealInit,
    /// Mean of the additive mutation noise.
    pub mutation_mean: f64,
    /// Standard deviation of the additive mutation noise.
    pub mutation_stdev: f64,
    /// Description of a [`GeneKind::StepSize`] gene scaling `mutation_stdev`.
    pub step_gene: Option<String>,
}

/// An integer gene with inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerGene {
    pub min: i64,
    pub max: i64,
    /// Standard deviation of the (rounded) additive mutation noise.
    pub mutation_stdev: f64,
    pub step_gene: Option<String>,
}

/// A boolean gene. Mutation flips the value.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanGene {
    /// Probability that a freshly generated value is `true`.
    pub true_probability: f64,
}

/// A self-adaptive mutation strength.
///
/// Mutation multiplies the value by `exp(learning_rate · N(0, 1))` and clamps
/// the result to `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSizeGene {
    pub min: f64,
    pub max: f64,
    /// Starting value for random genes; uniform over the bounds when `None`.
    pub initial: Option<f64>,
    pub learning_rate: f64,
}

/// A mutation strength derived from fitness.
///
/// A child's value is `min(1 / f, max)` where `f` is the fitness of its
/// fitter parent. The value never mutates on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseFitnessGene {
    pub max: f64,
    /// Value of random genes, before any fitness is known.
    pub initial: f64,
}

/// The closed set of gene kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneKind {
    Real(RealGene),
    Integer(IntegerGene),
    Boolean(BooleanGene),
    StepSize(StepSizeGene),
    InverseFitness(InverseFitnessGene),
}

/// How a child gene is produced from two parent genes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    /// Copy one parent's gene, chosen uniformly.
    #[default]
    Inherit,
    /// Interpolate uniformly between numeric parent values.
    /// Boolean genes fall back to [`Combine::Inherit`].
    Blend,
}

/// Template for one decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneType {
    description: String,
    kind: GeneKind,
    combine: Combine,
}

impl GeneType {
    /// Creates a gene type from an explicit kind.
    pub fn new(description: impl Into<String>, kind: GeneKind) -> Self {
        Self {
            description: description.into(),
            kind,
            combine: Combine::Inherit,
        }
    }

    /// Real gene drawn uniformly from `[min, max]`, mutated by `N(0, 1)`.
    pub fn real(description: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(
            description,
            GeneKind::Real(RealGene {
                min,
                max,
                init: RealInit::Uniform,
                mutation_mean: 0.0,
                mutation_stdev: 1.0,
                step_gene: None,
            }),
        )
    }

    /// Integer gene drawn uniformly from `[min, max]`, mutated by a rounded `N(0, 1)`.
    pub fn integer(description: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(
            description,
            GeneKind::Integer(IntegerGene {
                min,
                max,
                mutation_stdev: 1.0,
                step_gene: None,
            }),
        )
    }

    /// Boolean gene, `true` with probability 0.5 when generated.
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(
            description,
            GeneKind::Boolean(BooleanGene {
                true_probability: 0.5,
            }),
        )
    }

    /// Self-adaptive step gene over `[min, max]`.
    pub fn step_size(description: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(
            description,
            GeneKind::StepSize(StepSizeGene {
                min,
                max,
                initial: None,
                learning_rate: 0.2,
            }),
        )
    }

    /// Fitness-derived step gene capped at `max`.
    pub fn inverse_fitness(description: impl Into<String>, max: f64, initial: f64) -> Self {
        Self::new(
            description,
            GeneKind::InverseFitness(InverseFitnessGene { max, initial }),
        )
    }

    /// Sets the crossover rule.
    pub fn with_combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    /// Sets the mutation noise of a real or integer gene.
    ///
    /// The mean is ignored for integer genes.
    pub fn with_mutation(mut self, mean: f64, stdev: f64) -> Self {
        match &mut self.kind {
            GeneKind::Real(g) => {
                g.mutation_mean = mean;
                g.mutation_stdev = stdev;
            }
            GeneKind::Integer(g) => g.mutation_stdev = stdev,
            GeneKind::Boolean(_) | GeneKind::StepSize(_) | GeneKind::InverseFitness(_) => {}
        }
        self
    }

    /// Draws new real values from `N(mean, stdev)` instead of uniformly.
    pub fn with_normal_init(mut self, mean: f64, stdev: f64) -> Self {
        if let GeneKind::Real(g) = &mut self.kind {
            g.init = RealInit::Normal { mean, stdev };
        }
        self
    }

    /// Links a real or integer gene to a step gene by description.
    pub fn with_step_gene(mut self, step: impl Into<String>) -> Self {
        let step = Some(step.into());
        match &mut self.kind {
            GeneKind::Real(g) => g.step_gene = step,
            GeneKind::Integer(g) => g.step_gene = step,
            GeneKind::Boolean(_) | GeneKind::StepSize(_) | GeneKind::InverseFitness(_) => {}
        }
        self
    }

    /// Unique description key within a chromosome template.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &GeneKind {
        &self.kind
    }

    pub fn combine_rule(&self) -> Combine {
        self.combine
    }

    /// The step gene this gene reads its mutation strength from, if any.
    pub fn step_gene(&self) -> Option<&str> {
        match &self.kind {
            GeneKind::Real(g) => g.step_gene.as_deref(),
            GeneKind::Integer(g) => g.step_gene.as_deref(),
            GeneKind::Boolean(_) | GeneKind::StepSize(_) | GeneKind::InverseFitness(_) => None,
        }
    }

    /// Returns `true` if `value` is of the variant this gene holds.
    pub fn accepts(&self, value: &GeneValue) -> bool {
        matches!(
            (&self.kind, value),
            (GeneKind::Real(_), GeneValue::Real(_))
                | (GeneKind::StepSize(_), GeneValue::Real(_))
                | (GeneKind::InverseFitness(_), GeneValue::Real(_))
                | (GeneKind::Integer(_), GeneValue::Integer(_))
                | (GeneKind::Boolean(_), GeneValue::Boolean(_))
        )
    }

    pub(crate) fn expected_kind(&self) -> &'static str {
        match self.kind {
            GeneKind::Real(_) | GeneKind::StepSize(_) | GeneKind::InverseFitness(_) => "real",
            GeneKind::Integer(_) => "integer",
            GeneKind::Boolean(_) => "boolean",
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let key = &self.description;
        match &self.kind {
            GeneKind::Real(g) => {
                if !(g.min <= g.max) {
                    return Err(format!("gene `{key}`: min must not exceed max"));
                }
                if g.init == RealInit::Uniform && !(g.min.is_finite() && g.max.is_finite()) {
                    return Err(format!("gene `{key}`: uniform init needs finite bounds"));
                }
                if !(g.mutation_stdev >= 0.0) {
                    return Err(format!("gene `{key}`: mutation stdev must be non-negative"));
                }
            }
            GeneKind::Integer(g) => {
                if g.min > g.max {
                    return Err(format!("gene `{key}`: min must not exceed max"));
                }
                if !(g.mutation_stdev >= 0.0) {
                    return Err(format!("gene `{key}`: mutation stdev must be non-negative"));
                }
            }
            GeneKind::Boolean(g) => {
                if !(0.0..=1.0).contains(&g.true_probability) {
                    return Err(format!("gene `{key}`: probability must be in [0, 1]"));
                }
            }
            GeneKind::StepSize(g) => {
                if !(g.min > 0.0 && g.min <= g.max && g.max.is_finite()) {
                    return Err(format!("gene `{key}`: step bounds must satisfy 0 < min <= max"));
                }
            }
            GeneKind::InverseFitness(g) => {
                if !(g.max > 0.0 && g.max.is_finite() && g.initial > 0.0 && g.initial.is_finite()) {
                    return Err(format!("gene `{key}`: max and initial must be finite and positive"));
                }
            }
        }
        Ok(())
    }

    /// Creates a gene holding a freshly generated value.
    pub fn random_gene<R: Rng>(self: &Arc<Self>, rng: &mut R) -> Gene {
        Gene {
            gene_type: Arc::clone(self),
            value: self.generate(rng),
        }
    }

    /// Generates a random value of this gene's kind.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> GeneValue {
        match &self.kind {
            GeneKind::Real(g) => {
                let v = match g.init {
                    RealInit::Uniform => uniform(rng, g.min, g.max),
                    RealInit::Normal { mean, stdev } => normal(rng, mean, stdev),
                };
                GeneValue::Real(v.clamp(g.min, g.max))
            }
            GeneKind::Integer(g) => GeneValue::Integer(rng.random_range(g.min..=g.max)),
            GeneKind::Boolean(g) => GeneValue::Boolean(rng.random_bool(g.true_probability)),
            GeneKind::StepSize(g) => {
                let v = g.initial.unwrap_or_else(|| uniform(rng, g.min, g.max));
                GeneValue::Real(v.clamp(g.min, g.max))
            }
            GeneKind::InverseFitness(g) => GeneValue::Real(g.initial),
        }
    }

    /// Mutates `value` once.
    ///
    /// `context` is the chromosome owning the gene; step genes are read from it.
    pub fn mutate<R: Rng>(&self, value: &GeneValue, context: &Chromosome, rng: &mut R) -> GeneValue {
        match (&self.kind, *value) {
            (GeneKind::Real(g), GeneValue::Real(v)) => {
                let stdev = g.mutation_stdev * step_strength(g.step_gene.as_deref(), context);
                GeneValue::Real((v + normal(rng, g.mutation_mean, stdev)).clamp(g.min, g.max))
            }
            (GeneKind::Integer(g), GeneValue::Integer(v)) => {
                let stdev = g.mutation_stdev * step_strength(g.step_gene.as_deref(), context);
                let delta = normal(rng, 0.0, stdev).round() as i64;
                GeneValue::Integer(v.saturating_add(delta).clamp(g.min, g.max))
            }
            (GeneKind::Boolean(_), GeneValue::Boolean(v)) => GeneValue::Boolean(!v),
            (GeneKind::StepSize(g), GeneValue::Real(v)) => {
                let factor = (g.learning_rate * normal(rng, 0.0, 1.0)).exp();
                GeneValue::Real((v * factor).clamp(g.min, g.max))
            }
            (GeneKind::InverseFitness(_), value @ GeneValue::Real(_)) => value,
            // Kind/value mismatches are rejected at every entry point.
            (_, other) => other,
        }
    }

    /// Value a child takes regardless of its parents' gene values.
    ///
    /// `Some` only for [`GeneKind::InverseFitness`] genes when the fitter
    /// parent has a finite positive fitness.
    pub fn derive_from_fitness(&self, parent_fitness: Option<f64>) -> Option<GeneValue> {
        match (&self.kind, parent_fitness) {
            (GeneKind::InverseFitness(g), Some(f)) if f > 0.0 && f.is_finite() => {
                Some(GeneValue::Real((1.0 / f).min(g.max)))
            }
            _ => None,
        }
    }

    /// Produces a child value from two parent values.
    pub fn combine<R: Rng>(&self, a: &GeneValue, b: &GeneValue, rng: &mut R) -> GeneValue {
        match (self.combine, *a, *b) {
            (Combine::Blend, GeneValue::Real(x), GeneValue::Real(y)) => {
                let t: f64 = rng.random();
                GeneValue::Real(x * (1.0 - t) + y * t)
            }
            (Combine::Blend, GeneValue::Integer(x), GeneValue::Integer(y)) => {
                let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
                GeneValue::Integer(rng.random_range(lo..=hi))
            }
            _ => {
                if rng.random_bool(0.5) {
                    *a
                } else {
                    *b
                }
            }
        }
    }
}

impl fmt::Display for GeneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.expected_kind())
    }
}

/// One decision variable inside a chromosome.
///
/// Cloning a gene is a deep copy of its value; only the immutable template
/// is shared.
#[derive(Clone)]
pub struct Gene {
    gene_type: Arc<GeneType>,
    value: GeneValue,
}

impl Gene {
    pub(crate) fn with_value(gene_type: Arc<GeneType>, value: GeneValue) -> Self {
        Self { gene_type, value }
    }

    pub fn gene_type(&self) -> &Arc<GeneType> {
        &self.gene_type
    }

    pub fn description(&self) -> &str {
        self.gene_type.description()
    }

    pub fn value(&self) -> &GeneValue {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: GeneValue) {
        self.value = value;
    }

    /// Mutates this gene once, reading sibling genes from `context`.
    ///
    /// Genes owned by `context` are mutated through
    /// [`Chromosome::mutate`](super::Chromosome::mutate) instead.
    pub fn mutate<R: Rng>(&mut self, context: &Chromosome, rng: &mut R) {
        self.value = self.gene_type.mutate(&self.value, context, rng);
    }
}

impl PartialEq for Gene {
    fn eq(&self, other: &Self) -> bool {
        self.gene_type.description() == other.gene_type.description() && self.value == other.value
    }
}

impl fmt::Debug for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.description(), self.value)
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.value)
    }
}

/// Interpolates instead of sampling a range so `max - min` never overflows.
fn uniform<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    let t: f64 = rng.random();
    (min * (1.0 - t) + max * t).clamp(min, max)
}

pub(crate) fn normal<R: Rng>(rng: &mut R, mean: f64, stdev: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + stdev.max(0.0) * z
}

fn step_strength(step_gene: Option<&str>, context: &Chromosome) -> f64 {
    step_gene
        .and_then(|key| context.get(key).ok())
        .and_then(|v| v.as_f64())
        .unwrap_or(1.0)
}
