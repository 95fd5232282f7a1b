//! Generation snapshots and their on-disk store.
//!
//! A [`GenerationSnapshot`] is the serializable form of a [`Generation`]:
//! population index → fitness and gene values keyed by description. Loading
//! matches genes by key against a [`ChromosomeType`], so snapshots survive
//! templates that gained or lost genes.

use super::chromosome::{Chromosome, ChromosomeType, Evaluation};
use super::gene::{Gene, GeneValue};
use super::generation::Generation;
use crate::error::EvolveError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serializable form of one chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromosomeSnapshot {
    pub fitness: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
    pub genes: BTreeMap<String, GeneValue>,
}

/// Serializable form of a generation, ordered by population index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationSnapshot {
    pub individuals: BTreeMap<usize, ChromosomeSnapshot>,
}

impl From<&Chromosome> for ChromosomeSnapshot {
    fn from(chromosome: &Chromosome) -> Self {
        Self {
            fitness: chromosome.fitness(),
            terminal: chromosome.is_terminal(),
            genes: chromosome
                .genes()
                .iter()
                .map(|g| (g.description().to_string(), *g.value()))
                .collect(),
        }
    }
}

impl Generation {
    /// Captures the population as a snapshot.
    pub fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            individuals: self
                .population()
                .iter()
                .enumerate()
                .map(|(i, c)| (i, ChromosomeSnapshot::from(c)))
                .collect(),
        }
    }

    /// Rebuilds a generation from a snapshot.
    ///
    /// Snapshot genes the template does not declare are dropped; template
    /// genes missing from the snapshot receive a freshly generated value.
    ///
    /// # Errors
    ///
    /// [`EvolveError::Serialization`] if a stored value has the wrong kind
    /// for its gene.
    pub fn from_snapshot<R: Rng>(
        template: Arc<ChromosomeType>,
        snapshot: &GenerationSnapshot,
        rng: &mut R,
    ) -> Result<Self, EvolveError> {
        let mut population = Vec::with_capacity(snapshot.individuals.len());
        for (index, stored) in &snapshot.individuals {
            let mut genes = Vec::with_capacity(template.gene_types().len());
            for gene_type in template.gene_types() {
                let value = match stored.genes.get(gene_type.description()) {
                    Some(value) if gene_type.accepts(value) => *value,
                    Some(value) => {
                        return Err(EvolveError::Serialization(format!(
                            "individual {index}: gene `{}` expects a {} value, found {}",
                            gene_type.description(),
                            gene_type.expected_kind(),
                            value.kind_name()
                        )))
                    }
                    None => gene_type.generate(rng),
                };
                genes.push(Gene::with_value(Arc::clone(gene_type), value));
            }

            let mut chromosome = Chromosome::from_genes(Arc::clone(&template), genes);
            if stored.terminal {
                chromosome.record(Evaluation::PerfectMatch);
            } else if let Some(fitness) = stored.fitness {
                chromosome.set_fitness(fitness);
            }
            population.push(chromosome);
        }
        Ok(Generation::new(template, population))
    }
}

/// Destination for retained generations.
pub trait SnapshotStore: Send {
    /// Persists the snapshot of the generation at `trial`.
    fn save(&mut self, trial: usize, snapshot: &GenerationSnapshot) -> Result<(), EvolveError>;
}

/// Writes snapshots as pretty-printed JSON files named
/// `generation_<trial>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct JsonDirectoryStore {
    dir: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding the snapshot for `trial`.
    pub fn path_for(&self, trial: usize) -> PathBuf {
        self.dir.join(format!("generation_{trial}.json"))
    }
}

impl SnapshotStore for JsonDirectoryStore {
    fn save(&mut self, trial: usize, snapshot: &GenerationSnapshot) -> Result<(), EvolveError> {
        fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.path_for(trial), text)?;
        Ok(())
    }
}

/// Reads a snapshot file written by [`JsonDirectoryStore`].
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<GenerationSnapshot, EvolveError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Reads a snapshot file and rebuilds the generation against `template`.
pub fn load_generation<R: Rng>(
    path: impl AsRef<Path>,
    template: Arc<ChromosomeType>,
    rng: &mut R,
) -> Result<Generation, EvolveError> {
    let snapshot = read_snapshot(path)?;
    Generation::from_snapshot(template, &snapshot, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::GeneType;
    use tempfile::TempDir;
    use u_numflow::random::create_rng;

    fn template() -> Arc<ChromosomeType> {
        Arc::new(
            ChromosomeType::new(
                vec![
                    GeneType::real("x", -10.0, 10.0),
                    GeneType::integer("n", 0, 50),
                    GeneType::boolean("flag"),
                ],
                |c: &Chromosome| c.get_f64("x").unwrap_or(0.0) + 11.0,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let t = template();
        let mut rng = create_rng(42);
        let mut generation = Generation::random(Arc::clone(&t), 25, &mut rng);
        generation.evaluate(1).unwrap();

        let text = serde_json::to_string(&generation.snapshot()).unwrap();
        let parsed: GenerationSnapshot = serde_json::from_str(&text).unwrap();
        let restored = Generation::from_snapshot(t, &parsed, &mut rng).unwrap();

        assert_eq!(restored.len(), generation.len());
        for (a, b) in generation.population().iter().zip(restored.population()) {
            assert_eq!(a.fitness().map(f64::to_bits), b.fitness().map(f64::to_bits));
            assert_eq!(a.genes(), b.genes());
        }
    }

    #[test]
    fn test_unmatched_keys_are_dropped_and_missing_generated() {
        let t = template();
        let json = r#"{
            "0": { "fitness": 3.5, "genes": { "x": { "real": 1.25 }, "legacy": { "integer": 4 } } }
        }"#;
        let snapshot: GenerationSnapshot = serde_json::from_str(json).unwrap();
        let mut rng = create_rng(1);
        let restored = Generation::from_snapshot(t, &snapshot, &mut rng).unwrap();

        let c = &restored.population()[0];
        assert_eq!(c.fitness(), Some(3.5));
        assert_eq!(c.get("x").unwrap(), &GeneValue::Real(1.25));
        assert!(c.get("n").unwrap().as_i64().is_some());
        assert!(c.get("flag").unwrap().as_bool().is_some());
        assert!(c.get("legacy").is_err());
    }

    #[test]
    fn test_wrong_kind_is_serialization_error() {
        let t = template();
        let json = r#"{ "0": { "fitness": null, "genes": { "n": { "real": 1.5 } } } }"#;
        let snapshot: GenerationSnapshot = serde_json::from_str(json).unwrap();
        let mut rng = create_rng(1);
        assert!(matches!(
            Generation::from_snapshot(t, &snapshot, &mut rng),
            Err(EvolveError::Serialization(_))
        ));
    }

    #[test]
    fn test_malformed_document_is_error() {
        let result: Result<GenerationSnapshot, _> = serde_json::from_str(r#"{ "0": 12 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_terminal_flag_survives() {
        let t = template();
        let mut rng = create_rng(4);
        let mut generation = Generation::random(Arc::clone(&t), 2, &mut rng);
        generation.population_mut()[0].record(Evaluation::PerfectMatch);

        let snapshot = generation.snapshot();
        assert!(snapshot.individuals[&0].terminal);
        let restored = Generation::from_snapshot(t, &snapshot, &mut rng).unwrap();
        assert!(restored.population()[0].is_terminal());
        assert!(!restored.population()[1].is_terminal());
    }

    #[test]
    fn test_directory_store_writes_and_loads() {
        let dir = TempDir::new().unwrap();
        let t = template();
        let mut rng = create_rng(8);
        let mut generation = Generation::random(Arc::clone(&t), 5, &mut rng);
        generation.evaluate(1).unwrap();

        let mut store = JsonDirectoryStore::new(dir.path().join("run"));
        store.save(12, &generation.snapshot()).unwrap();
        let path = store.path_for(12);
        assert!(path.ends_with("generation_12.json"));

        let loaded = load_generation(&path, t, &mut rng).unwrap();

        assert_eq!(loaded.len(), 5);
        for (a, b) in generation.population().iter().zip(loaded.population()) {
            assert_eq!(a.fitness(), b.fitness());
            assert_eq!(a.genes(), b.genes());
        }
    }
}
