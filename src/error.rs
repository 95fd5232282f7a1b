//! Error kinds shared across the engine.

use crate::ga::Chromosome;
use thiserror::Error;

/// Errors produced while configuring or running an evolution.
///
/// [`EvolveError::PerfectMatch`] is a success signal rather than a failure:
/// it carries the chromosome whose fitness function reported an exact
/// optimum. [`EvolutionManager::run`](crate::ga::EvolutionManager::run)
/// converts it into [`Termination::PerfectMatch`](crate::ga::Termination).
#[derive(Debug, Error)]
pub enum EvolveError {
    /// Invalid configuration or template setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A gene was addressed by a description key the template does not declare.
    #[error("unknown gene `{0}`")]
    UnknownGene(String),

    /// A gene was assigned a value of the wrong kind.
    #[error("gene `{key}` expects a {expected} value")]
    GeneValueMismatch {
        key: String,
        expected: &'static str,
    },

    /// No individual with positive fitness was available for breeding.
    #[error("breeding pool is empty: no individual has positive fitness")]
    EmptyBreedingPool,

    /// A breeding pool member had an unset, non-positive or non-finite fitness.
    #[error("breeding pool members need a finite positive fitness, got {fitness:?}")]
    InvalidBreedingFitness { fitness: Option<f64> },

    /// The fitness function reported a perfect match.
    #[error("perfect match found")]
    PerfectMatch(Box<Chromosome>),

    /// A snapshot did not fit the chromosome template.
    #[error("malformed snapshot: {0}")]
    Serialization(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvolveError {
    /// Returns `true` for the perfect-match signal.
    pub fn is_perfect_match(&self) -> bool {
        matches!(self, EvolveError::PerfectMatch(_))
    }
}
