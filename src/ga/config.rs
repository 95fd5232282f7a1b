//! Evolution run configuration.
//!
//! [`EvolutionConfig`] holds every parameter that controls the generation
//! loop: population shape, breeding, termination, checkpointing and
//! parallelism.

use super::generation::BreedingParams;
use crate::error::EvolveError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on `mutation_rate` and `mutation_stdev`.
///
/// Each unit of rate is one more mutation per gene per child.
pub const MAX_MUTATION_RATE: f64 = 1_000.0;

/// Configuration for an evolution run.
///
/// # Defaults
///
/// ```
/// use u_evolve::ga::EvolutionConfig;
///
/// let config = EvolutionConfig::default();
/// assert_eq!(config.population_size, 1000);
/// assert_eq!(config.elitism, 0);
/// assert!(config.max_generations.is_none());
/// ```
///
/// # Builder Pattern
///
/// ```
/// use u_evolve::ga::EvolutionConfig;
///
/// let config = EvolutionConfig::default()
///     .with_population_size(200)
///     .with_elitism(2)
///     .with_mutation(0.5, 0.2)
///     .with_max_generations(500)
///     .with_workers(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Number of chromosomes in each generation.
    pub population_size: usize,

    /// Number of most-fit chromosomes copied unchanged into the next generation.
    pub elitism: usize,

    /// Number of fresh random chromosomes added to each breeding pool.
    pub random_individuals: usize,

    /// Lower bound for the fitness of injected random chromosomes.
    ///
    /// Random chromosomes often score poorly; a floor keeps them in the
    /// breeding pool. The floored value is not a measurement.
    pub random_fitness_floor: Option<f64>,

    /// Mean number of mutations applied to each gene of a child.
    pub mutation_rate: f64,

    /// Standard deviation of the number of mutations per gene.
    pub mutation_stdev: f64,

    /// Stop after breeding this many generations. `None` means no cap.
    pub max_generations: Option<usize>,

    /// Stop once the best fitness reaches this value.
    pub fitness_threshold: Option<f64>,

    /// Optional wall-clock budget in milliseconds.
    ///
    /// Checked between generations only, so a slow generation can overrun it.
    pub time_limit_ms: Option<u64>,

    /// Keep every generation whose trial number is a multiple of this.
    pub snapshot_interval: Option<usize>,

    /// Keep the most recent `keep_recent` generations not already kept by
    /// `snapshot_interval`.
    pub keep_recent: usize,

    /// Number of fitness-evaluation workers. `0` and `1` evaluate sequentially.
    pub workers: usize,

    /// Directory receiving retained generations when the run ends.
    pub checkpoint_dir: Option<PathBuf>,

    /// Snapshot file to seed the first generation from.
    pub initial_generation: Option<PathBuf>,

    /// Random seed for reproducibility. `None` uses a random seed.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
            elitism: 0,
            random_individuals: 0,
            random_fitness_floor: None,
            mutation_rate: 1.0,
            mutation_stdev: 0.0,
            max_generations: None,
            fitness_threshold: None,
            time_limit_ms: None,
            snapshot_interval: None,
            keep_recent: 0,
            workers: 1,
            checkpoint_dir: None,
            initial_generation: None,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Reads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EvolveError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the population size.
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    /// Sets the number of elites.
    pub fn with_elitism(mut self, n: usize) -> Self {
        self.elitism = n;
        self
    }

    /// Injects `n` random chromosomes per generation, optionally floored.
    pub fn with_random_individuals(mut self, n: usize, fitness_floor: Option<f64>) -> Self {
        self.random_individuals = n;
        self.random_fitness_floor = fitness_floor;
        self
    }

    /// Sets the mutation count distribution.
    pub fn with_mutation(mut self, rate: f64, stdev: f64) -> Self {
        self.mutation_rate = rate;
        self.mutation_stdev = stdev;
        self
    }

    /// Sets the generation cap.
    pub fn with_max_generations(mut self, n: usize) -> Self {
        self.max_generations = Some(n);
        self
    }

    /// Sets the fitness threshold.
    pub fn with_fitness_threshold(mut self, threshold: f64) -> Self {
        self.fitness_threshold = Some(threshold);
        self
    }

    /// Sets the wall-clock time limit in milliseconds.
    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Keeps every `interval`-th generation.
    pub fn with_snapshot_interval(mut self, interval: usize) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Keeps the `k` most recent generations.
    pub fn with_keep_recent(mut self, k: usize) -> Self {
        self.keep_recent = k;
        self
    }

    /// Sets the number of evaluation workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Writes retained generations under `dir`.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Seeds the first generation from a snapshot file.
    pub fn with_initial_generation(mut self, path: impl Into<PathBuf>) -> Self {
        self.initial_generation = Some(path.into());
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Breeding parameters for [`Generation::next_generation`](super::Generation::next_generation).
    pub fn breeding_params(&self) -> BreedingParams {
        BreedingParams {
            target_size: self.population_size,
            elitism: self.elitism,
            random_individuals: self.random_individuals,
            random_fitness_floor: self.random_fitness_floor,
            mutation_rate: self.mutation_rate,
            mutation_stdev: self.mutation_stdev,
        }
    }

    /// Validates the configuration.
    ///
    /// Zero elitism, zero random individuals and unset thresholds are valid.
    pub fn validate(&self) -> Result<(), EvolveError> {
        let fail = |msg: &str| Err(EvolveError::Configuration(msg.into()));

        if self.population_size == 0 {
            return fail("population_size must be at least 1");
        }
        if self.elitism > self.population_size {
            return fail("elitism must not exceed population_size");
        }
        if !(self.mutation_rate.abs() <= MAX_MUTATION_RATE) {
            return fail("mutation_rate must be finite and within MAX_MUTATION_RATE");
        }
        if !(self.mutation_stdev >= 0.0 && self.mutation_stdev <= MAX_MUTATION_RATE) {
            return fail("mutation_stdev must be non-negative and within MAX_MUTATION_RATE");
        }
        if self.random_fitness_floor.is_some_and(|f| !f.is_finite()) {
            return fail("random_fitness_floor must be finite");
        }
        if self.time_limit_ms == Some(0) {
            return fail("time_limit_ms must be positive or None");
        }
        if self.snapshot_interval == Some(0) {
            return fail("snapshot_interval must be positive or None");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvolutionConfig::default();
        assert_eq!(config.population_size, 1000);
        assert_eq!(config.elitism, 0);
        assert_eq!(config.random_individuals, 0);
        assert!(config.random_fitness_floor.is_none());
        assert!((config.mutation_rate - 1.0).abs() < 1e-15);
        assert!((config.mutation_stdev - 0.0).abs() < 1e-15);
        assert!(config.max_generations.is_none());
        assert!(config.fitness_threshold.is_none());
        assert!(config.time_limit_ms.is_none());
        assert!(config.snapshot_interval.is_none());
        assert_eq!(config.keep_recent, 0);
        assert_eq!(config.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EvolutionConfig::default()
            .with_population_size(50)
            .with_elitism(2)
            .with_random_individuals(5, Some(0.1))
            .with_mutation(0.3, 0.1)
            .with_max_generations(200)
            .with_fitness_threshold(99.0)
            .with_time_limit_ms(5_000)
            .with_snapshot_interval(10)
            .with_keep_recent(3)
            .with_workers(4)
            .with_seed(42);

        assert_eq!(config.population_size, 50);
        assert_eq!(config.elitism, 2);
        assert_eq!(config.random_individuals, 5);
        assert_eq!(config.random_fitness_floor, Some(0.1));
        assert_eq!(config.max_generations, Some(200));
        assert_eq!(config.fitness_threshold, Some(99.0));
        assert_eq!(config.time_limit_ms, Some(5_000));
        assert_eq!(config.snapshot_interval, Some(10));
        assert_eq!(config.keep_recent, 3);
        assert_eq!(config.workers, 4);
        assert_eq!(config.seed, Some(42));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_breeding_params_mirror_config() {
        let config = EvolutionConfig::default()
            .with_population_size(20)
            .with_elitism(1)
            .with_mutation(2.0, 0.5);
        let params = config.breeding_params();
        assert_eq!(params.target_size, 20);
        assert_eq!(params.elitism, 1);
        assert!((params.mutation_rate - 2.0).abs() < 1e-15);
        assert!((params.mutation_stdev - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_validate_empty_population() {
        let config = EvolutionConfig::default().with_population_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_elitism_too_high() {
        let config = EvolutionConfig::default()
            .with_population_size(10)
            .with_elitism(11);
        assert!(config.validate().is_err());
        assert!(config.with_elitism(10).validate().is_ok());
    }

    #[test]
    fn test_validate_negative_stdev() {
        let config = EvolutionConfig::default().with_mutation(1.0, -0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_mutation_rate_bounded() {
        assert!(EvolutionConfig::default().with_mutation(1e15, 0.0).validate().is_err());
        assert!(EvolutionConfig::default().with_mutation(f64::NAN, 0.0).validate().is_err());
        assert!(EvolutionConfig::default().with_mutation(1.0, 1e15).validate().is_err());
        assert!(EvolutionConfig::default()
            .with_mutation(MAX_MUTATION_RATE, MAX_MUTATION_RATE)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_zero_time_limit() {
        let config = EvolutionConfig::default().with_time_limit_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_snapshot_interval() {
        let config = EvolutionConfig::default().with_snapshot_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config: EvolutionConfig =
            serde_json::from_str(r#"{ "population_size": 64, "elitism": 2 }"#).unwrap();
        assert_eq!(config.population_size, 64);
        assert_eq!(config.elitism, 2);
        assert_eq!(config.workers, 1);
        assert!(config.max_generations.is_none());
    }

    #[test]
    fn test_from_json_file_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "population_size": 0 }"#).unwrap();
        let result = EvolutionConfig::from_json_file(&path);
        assert!(matches!(result, Err(EvolveError::Configuration(_))));
    }
}
