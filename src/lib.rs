//! Generational genetic-algorithm engine.
//!
//! - **Typed genes**: real, integer, boolean and self-adaptive step-size
//!   genes with bounds, mutation and per-gene crossover rules.
//! - **Breeding**: elitism, random-individual injection and
//!   fitness-proportional parent selection over a balanced interval tree.
//! - **Evaluation**: sequential or chunked parallel fitness evaluation
//!   with a perfect-match early stop.
//! - **Control**: generation cap, fitness threshold, wall-clock limit and
//!   cancellation, with periodic and rolling generation snapshots.
//!
//! # Architecture
//!
//! The crate contains no problem-specific concepts. Callers describe a
//! problem as a list of [`ga::GeneType`]s plus a fitness function over
//! [`ga::Chromosome`]s.

pub mod error;
pub mod ga;

pub use error::EvolveError;
