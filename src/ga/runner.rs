//! Evolution control loop.
//!
//! [`EvolutionManager`] drives the run: it collects gene types, finalizes
//! the chromosome template, builds and evaluates the first generation, then
//! repeats checkpoint → termination checks → breed → evaluate until a stop
//! condition holds. Retained generations are flushed to the snapshot store
//! when the run ends, whatever the reason.

use super::chromosome::{Chromosome, ChromosomeType, FitnessFunction};
use super::config::EvolutionConfig;
use super::gene::GeneType;
use super::generation::Generation;
use super::snapshot::{load_generation, JsonDirectoryStore, SnapshotStore};
use crate::error::EvolveError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use u_numflow::random::create_rng;

/// Lifecycle of an [`EvolutionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Gene types may still be registered.
    Configuring,
    /// The template is final and the generation loop may run.
    Running,
    /// A run has finished.
    Terminated,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `max_generations` generations were bred.
    GenerationCap,
    /// The best fitness reached `fitness_threshold`.
    FitnessThreshold,
    /// The wall-clock budget ran out.
    TimeLimit,
    /// The cancellation token was set.
    Cancelled,
    /// The fitness function reported a perfect match.
    PerfectMatch,
}

/// Result of an evolution run.
#[derive(Debug, Clone)]
pub struct EvolutionResult {
    /// The best chromosome seen during the run, or the terminal chromosome
    /// for [`Termination::PerfectMatch`].
    pub best: Chromosome,

    /// Fitness of `best`; `None` for a perfect match.
    pub best_fitness: Option<f64>,

    /// Number of generations bred after the initial one.
    pub generations: usize,

    /// Why the run stopped.
    pub termination: Termination,

    /// Best-known fitness after the initial generation and after each bred
    /// generation. Never decreases.
    pub fitness_history: Vec<f64>,
}

/// Generations kept for checkpointing.
#[derive(Debug, Default)]
struct Retained {
    permanent: BTreeMap<usize, Generation>,
    recent: VecDeque<(usize, Generation)>,
}

impl Retained {
    fn checkpoint(&mut self, trial: usize, generation: &Generation, config: &EvolutionConfig) {
        if config.snapshot_interval.is_some_and(|every| trial % every == 0) {
            self.permanent.insert(trial, generation.clone());
        } else if config.keep_recent > 0 {
            self.recent.push_back((trial, generation.clone()));
            while self.recent.len() > config.keep_recent {
                self.recent.pop_front();
            }
        }
    }

    fn keep(&mut self, trial: usize, generation: Generation) {
        self.recent.retain(|(t, _)| *t != trial);
        self.permanent.insert(trial, generation);
    }

    /// All retained generations in ascending trial order.
    fn drain(&mut self) -> Vec<(usize, Generation)> {
        let mut all: Vec<(usize, Generation)> = std::mem::take(&mut self.permanent)
            .into_iter()
            .chain(std::mem::take(&mut self.recent))
            .collect();
        all.sort_by_key(|(trial, _)| *trial);
        all.dedup_by_key(|(trial, _)| *trial);
        all
    }
}

/// Runs a generational genetic algorithm.
///
/// # Usage
///
/// ```
/// use u_evolve::ga::{Chromosome, EvolutionConfig, EvolutionManager, GeneType, Termination};
///
/// let config = EvolutionConfig::default()
///     .with_population_size(30)
///     .with_elitism(1)
///     .with_max_generations(20)
///     .with_seed(7);
///
/// let mut manager = EvolutionManager::new(config, |c: &Chromosome| {
///     let x = c.get_f64("x").unwrap_or(0.0);
///     100.0 - (x - 3.0).powi(2)
/// });
/// manager.add_gene_type(GeneType::real("x", -10.0, 10.0)).unwrap();
///
/// let result = manager.run().unwrap();
/// assert_eq!(result.termination, Termination::GenerationCap);
/// ```
pub struct EvolutionManager {
    config: EvolutionConfig,
    fitness: Arc<dyn FitnessFunction>,
    gene_types: Vec<GeneType>,
    template: Option<Arc<ChromosomeType>>,
    seeds: Vec<Chromosome>,
    store: Option<Box<dyn SnapshotStore>>,
    cancel: Option<Arc<AtomicBool>>,
    state: State,
}

impl EvolutionManager {
    /// Creates a manager in the [`State::Configuring`] state.
    pub fn new<F>(config: EvolutionConfig, fitness: F) -> Self
    where
        F: FitnessFunction + 'static,
    {
        let store = config
            .checkpoint_dir
            .as_ref()
            .map(|dir| Box::new(JsonDirectoryStore::new(dir)) as Box<dyn SnapshotStore>);
        Self {
            config,
            fitness: Arc::new(fitness),
            gene_types: Vec::new(),
            template: None,
            seeds: Vec::new(),
            store,
            cancel: None,
            state: State::Configuring,
        }
    }

    /// Replaces the snapshot store.
    pub fn with_store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Sets a cancellation token checked between generations.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Registers a gene type.
    ///
    /// # Errors
    ///
    /// [`EvolveError::Configuration`] once the template has been finalized.
    pub fn add_gene_type(&mut self, gene_type: GeneType) -> Result<(), EvolveError> {
        if self.state != State::Configuring {
            return Err(EvolveError::Configuration(format!(
                "gene type `{}` added after the chromosome template was finalized",
                gene_type.description()
            )));
        }
        self.gene_types.push(gene_type);
        Ok(())
    }

    /// Finalizes and returns the chromosome template.
    ///
    /// Useful for building chromosomes to pass to
    /// [`add_chromosome`](Self::add_chromosome). Later calls return the same
    /// template.
    pub fn template(&mut self) -> Result<Arc<ChromosomeType>, EvolveError> {
        if let Some(template) = &self.template {
            return Ok(Arc::clone(template));
        }
        let template = Arc::new(ChromosomeType::with_fitness(
            self.gene_types.clone(),
            Arc::clone(&self.fitness),
        )?);
        self.template = Some(Arc::clone(&template));
        self.state = State::Running;
        Ok(template)
    }

    /// Adds a chromosome to the first generation.
    ///
    /// # Errors
    ///
    /// [`EvolveError::Configuration`] if the chromosome was not built from
    /// this manager's template.
    pub fn add_chromosome(&mut self, chromosome: Chromosome) -> Result<(), EvolveError> {
        let template = self.template()?;
        if !Arc::ptr_eq(&template, chromosome.template()) {
            return Err(EvolveError::Configuration(
                "chromosome was built from a different template".into(),
            ));
        }
        self.seeds.push(chromosome);
        Ok(())
    }

    /// Runs the evolution until a termination condition holds.
    ///
    /// # Errors
    ///
    /// - [`EvolveError::Configuration`] for an invalid configuration or a
    ///   second run
    /// - [`EvolveError::EmptyBreedingPool`] when no individual can breed;
    ///   retained generations are flushed first on a best-effort basis
    /// - I/O and serialization errors from loading the starting generation
    ///   or flushing snapshots
    pub fn run(&mut self) -> Result<EvolutionResult, EvolveError> {
        self.config.validate()?;
        if self.state == State::Terminated {
            return Err(EvolveError::Configuration("run has already completed".into()));
        }
        let template = self.template()?;

        // Seeds are consumed, so every exit from here on ends the run.
        let result = self.evolve(template);
        self.state = State::Terminated;
        result
    }

    fn evolve(&mut self, template: Arc<ChromosomeType>) -> Result<EvolutionResult, EvolveError> {
        let config = self.config.clone();
        let mut rng = match config.seed {
            Some(seed) => create_rng(seed),
            None => create_rng(rand::random()),
        };

        let mut current = Generation::new(Arc::clone(&template), std::mem::take(&mut self.seeds));
        if let Some(path) = &config.initial_generation {
            let loaded = load_generation(path, Arc::clone(&template), &mut rng)?;
            log::info!("loaded {} chromosomes from {}", loaded.len(), path.display());
            current.extend(loaded.population().iter().cloned());
        }
        let missing = config.population_size.saturating_sub(current.len());
        current.extend((0..missing).map(|_| template.random_chromosome(&mut rng)));

        log::info!(
            "starting evolution: population {}, elitism {}, workers {}",
            config.population_size,
            config.elitism,
            config.workers
        );

        let mut retained = Retained::default();
        let mut trial = 0usize;

        if let Err(err) = current.evaluate(config.workers) {
            let terminal = into_terminal(err)?;
            return self.finish_perfect_match(terminal, trial, current, retained, Vec::new());
        }

        let mut best = current
            .best()
            .cloned()
            .ok_or(EvolveError::EmptyBreedingPool)?;
        let mut fitness_history = vec![best.rank_key()];
        log::debug!("generation 0: best fitness {}", best.rank_key());

        let start = Instant::now();
        let termination = loop {
            retained.checkpoint(trial, &current, &config);

            if config.max_generations.is_some_and(|cap| trial >= cap) {
                break Termination::GenerationCap;
            }
            let current_best = current.best().map_or(f64::NEG_INFINITY, Chromosome::rank_key);
            if config.fitness_threshold.is_some_and(|t| current_best >= t) {
                break Termination::FitnessThreshold;
            }
            if config
                .time_limit_ms
                .is_some_and(|ms| start.elapsed().as_millis() >= u128::from(ms))
            {
                break Termination::TimeLimit;
            }
            if self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                break Termination::Cancelled;
            }

            let mut next = match current.next_generation(&config.breeding_params(), &mut rng) {
                Ok(next) => next,
                Err(err) if err.is_perfect_match() => {
                    // An injected random individual matched while breeding
                    // trial + 1; it joins its parents as the terminal generation.
                    let terminal = into_terminal(err)?;
                    current.extend(std::iter::once(terminal.clone()));
                    return self.finish_perfect_match(
                        terminal,
                        trial + 1,
                        current,
                        retained,
                        fitness_history,
                    );
                }
                Err(err) => {
                    log::error!("generation {}: {err}", trial + 1);
                    self.flush_best_effort(&mut retained);
                    return Err(err);
                }
            };
            trial += 1;

            let evaluated = next.evaluate(config.workers);
            current = next;
            if let Err(err) = evaluated {
                let terminal = into_terminal(err)?;
                return self.finish_perfect_match(terminal, trial, current, retained, fitness_history);
            }

            if let Some(gen_best) = current.best() {
                if gen_best.fitness_cmp(&best).is_gt() {
                    best = gen_best.clone();
                }
            }
            fitness_history.push(best.rank_key());
            log::debug!(
                "generation {trial}: best fitness {}, best known {}",
                current.best().map_or(f64::NEG_INFINITY, Chromosome::rank_key),
                best.rank_key()
            );
        };

        log::info!(
            "evolution stopped after {trial} generations ({termination:?}), best fitness {}",
            best.rank_key()
        );
        self.flush(&mut retained)?;

        Ok(EvolutionResult {
            best_fitness: best.fitness(),
            best,
            generations: trial,
            termination,
            fitness_history,
        })
    }

    fn finish_perfect_match(
        &mut self,
        terminal: Chromosome,
        trial: usize,
        generation: Generation,
        mut retained: Retained,
        mut fitness_history: Vec<f64>,
    ) -> Result<EvolutionResult, EvolveError> {
        log::info!("perfect match found at generation {trial}");

        retained.keep(trial, generation);
        self.flush(&mut retained)?;

        fitness_history.push(terminal.rank_key());
        Ok(EvolutionResult {
            best_fitness: None,
            best: terminal,
            generations: trial,
            termination: Termination::PerfectMatch,
            fitness_history,
        })
    }

    fn flush(&mut self, retained: &mut Retained) -> Result<(), EvolveError> {
        let generations = retained.drain();
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        for (trial, generation) in &generations {
            store.save(*trial, &generation.snapshot())?;
        }
        log::info!("flushed {} retained generations", generations.len());
        Ok(())
    }

    fn flush_best_effort(&mut self, retained: &mut Retained) {
        if let Err(err) = self.flush(retained) {
            log::warn!("failed to flush retained generations: {err}");
        }
    }
}

/// Unwraps the chromosome carried by a perfect-match signal.
fn into_terminal(signal: EvolveError) -> Result<Chromosome, EvolveError> {
    match signal {
        EvolveError::PerfectMatch(chromosome) => Ok(*chromosome),
        other => Err(other),
    }
}
