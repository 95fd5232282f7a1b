//! Generational genetic algorithm.
//!
//! Problems are described with typed genes rather than a user-implemented
//! individual: register [`GeneType`]s on an [`EvolutionManager`], supply a
//! fitness function over [`Chromosome`]s, and the manager handles
//! initialization, fitness-proportional breeding, elitism, mutation and
//! checkpointing.
//!
//! # Key Types
//!
//! - [`GeneType`] / [`Gene`]: gene descriptors (real, integer, boolean,
//!   self-adaptive and fitness-derived step sizes) and their values
//! - [`ChromosomeType`] / [`Chromosome`]: the finalized gene layout and one
//!   candidate solution
//! - [`BreedingPool`]: O(log n) roulette-wheel parent selection
//! - [`Generation`]: one population, its evaluation and breeding step
//! - [`EvolutionConfig`]: run parameters
//! - [`EvolutionManager`]: executes the generation loop
//! - [`EvolutionResult`]: best chromosome, termination reason and history
//!
//! # References
//!
//! - Holland (1975), *Adaptation in Natural and Artificial Systems*
//! - Goldberg (1989), *Genetic Algorithms in Search, Optimization, and Machine Learning*
//! - Schwefel (1981), *Numerical Optimization of Computer Models* (self-adaptive step sizes)

mod breeding_pool;
mod chromosome;
mod config;
mod gene;
mod generation;
mod runner;
mod snapshot;

pub use breeding_pool::BreedingPool;
pub use chromosome::{Chromosome, ChromosomeType, Evaluation, FitnessFunction};
pub use config::{EvolutionConfig, MAX_MUTATION_RATE};
pub use gene::{
    BooleanGene, Combine, Gene, GeneKind, GeneType, GeneValue, IntegerGene, InverseFitnessGene,
    RealGene, RealInit, StepSizeGene,
};
pub use generation::{BreedingParams, Generation};
pub use runner::{EvolutionManager, EvolutionResult, State, Termination};
pub use snapshot::{
    load_generation, read_snapshot, ChromosomeSnapshot, GenerationSnapshot, JsonDirectoryStore,
    SnapshotStore,
};
