//! Fitness-proportional parent selection.
//!
//! [`BreedingPool`] maps each member to a half-open interval
//! `[start, start + fitness)` on the line `[0, total)` and answers draws by
//! descending a balanced binary search tree over those intervals.
//!
//! The tree lives in flat arrays: intervals are sorted by start, and the
//! root of every index range is its median, so the height is
//! `floor(log2 n) + 1` no matter how skewed the fitness values are. A
//! cumulative-sum tree built by insertion would degenerate toward a chain
//! when one member dominates.
//!
//! # Complexity
//!
//! - Construction: O(n log n)
//! - Draw: O(log n)
//!
//! # References
//!
//! - Goldberg (1989), *Genetic Algorithms in Search, Optimization, and
//!   Machine Learning*, ch. 1 (roulette wheel selection)

use super::chromosome::Chromosome;
use crate::error::EvolveError;
use rand::Rng;

const NONE: usize = usize::MAX;

/// One member's slice of `[0, total)`.
#[derive(Debug, Clone, Copy)]
struct Interval {
    start: f64,
    end: f64,
    member: usize,
}

/// Weighted sampler over positive-fitness chromosomes.
///
/// Built fresh for every generation and dropped once breeding is done.
///
/// # Examples
///
/// ```ignore
/// let pool = BreedingPool::new(parents)?;
/// let mother = pool.get(&mut rng);
/// let father = pool.get(&mut rng);
/// ```
#[derive(Debug)]
pub struct BreedingPool<'a> {
    members: Vec<&'a Chromosome>,
    nodes: Vec<Interval>,
    left: Vec<usize>,
    right: Vec<usize>,
    root: usize,
    total: f64,
}

impl<'a> BreedingPool<'a> {
    /// Builds a pool over evaluated chromosomes.
    ///
    /// # Errors
    ///
    /// - [`EvolveError::EmptyBreedingPool`] if `members` is empty
    /// - [`EvolveError::InvalidBreedingFitness`] if a member's fitness is
    ///   unset, non-positive or non-finite
    pub fn new(members: Vec<&'a Chromosome>) -> Result<Self, EvolveError> {
        if members.is_empty() {
            return Err(EvolveError::EmptyBreedingPool);
        }

        let mut nodes = Vec::with_capacity(members.len());
        let mut total = 0.0;
        for (member, chromosome) in members.iter().enumerate() {
            let fitness = match chromosome.fitness() {
                Some(f) if f > 0.0 && f.is_finite() => f,
                other => return Err(EvolveError::InvalidBreedingFitness { fitness: other }),
            };
            nodes.push(Interval {
                start: total,
                end: total + fitness,
                member,
            });
            total += fitness;
        }
        if !total.is_finite() {
            return Err(EvolveError::InvalidBreedingFitness { fitness: Some(total) });
        }

        nodes.sort_by(|a, b| a.start.total_cmp(&b.start));

        let n = nodes.len();
        let mut left = vec![NONE; n];
        let mut right = vec![NONE; n];
        let root = build(0, n, &mut left, &mut right);

        Ok(Self {
            members,
            nodes,
            left,
            right,
            root,
            total,
        })
    }

    /// Draws one member with probability proportional to its fitness.
    pub fn get<R: Rng>(&self, rng: &mut R) -> &'a Chromosome {
        let u = rng.random_range(0.0..self.total);
        self.find(u)
    }

    /// Returns the member whose interval contains `u`.
    ///
    /// Values outside `[0, total)` resolve to the nearest end member.
    fn find(&self, u: f64) -> &'a Chromosome {
        let mut node = self.root;
        loop {
            let interval = &self.nodes[node];
            let next = if u < interval.start {
                self.left[node]
            } else if u >= interval.end {
                self.right[node]
            } else {
                return self.members[interval.member];
            };
            if next == NONE {
                // Only reachable through floating-point round-off at the edges.
                return self.members[interval.member];
            }
            node = next;
        }
    }

    /// Sum of all member fitness values.
    pub fn total_fitness(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            for child in [self.left[node], self.right[node]] {
                if child != NONE {
                    stack.push((child, depth + 1));
                }
            }
        }
        max
    }
}

/// Links the index range `[lo, hi)` into a subtree rooted at its median.
fn build(lo: usize, hi: usize, left: &mut [usize], right: &mut [usize]) -> usize {
    if lo >= hi {
        return NONE;
    }
    let mid = lo + (hi - lo) / 2;
    left[mid] = build(lo, mid, left, right);
    right[mid] = build(mid + 1, hi, left, right);
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::{ChromosomeType, GeneType, GeneValue};
    use u_numflow::random::create_rng;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn population(fitnesses: &[f64]) -> Vec<Chromosome> {
        let template = Arc::new(
            ChromosomeType::new(vec![GeneType::integer("id", 0, i64::MAX)], |_: &Chromosome| {
                1.0_f64
            })
            .unwrap(),
        );
        let mut rng = create_rng(0);
        fitnesses
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let mut c = template.random_chromosome(&mut rng);
                c.set("id", GeneValue::Integer(i as i64)).unwrap();
                c.set_fitness(f);
                c
            })
            .collect()
    }

    fn id(c: &Chromosome) -> usize {
        c.get("id").unwrap().as_i64().unwrap() as usize
    }

    #[test]
    fn test_frequencies_proportional_to_fitness() {
        let fitnesses = [1.0, 2.0, 3.0, 4.0];
        let pop = population(&fitnesses);
        let pool = BreedingPool::new(pop.iter().collect()).unwrap();
        let mut rng = create_rng(42);

        let n = 100_000;
        let mut counts = [0u32; 4];
        for _ in 0..n {
            counts[id(pool.get(&mut rng))] += 1;
        }

        let total: f64 = fitnesses.iter().sum();
        for (i, &f) in fitnesses.iter().enumerate() {
            let observed = counts[i] as f64 / n as f64;
            let expected = f / total;
            assert!(
                (observed - expected).abs() < 0.01,
                "member {i}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_skewed_fitness_keeps_tree_balanced() {
        // One member holds 99% of the total.
        let mut fitnesses = vec![0.01 / 1023.0; 1023];
        fitnesses.push(99.0);
        let pop = population(&fitnesses);
        let pool = BreedingPool::new(pop.iter().collect()).unwrap();

        assert_eq!(pool.len(), 1024);
        assert_eq!(pool.height(), 11);

        let mut rng = create_rng(7);
        let dominant = (0..10_000).filter(|_| id(pool.get(&mut rng)) == 1023).count();
        assert!(dominant > 9_800, "dominant drawn {dominant}/10000");
    }

    #[test]
    fn test_single_member() {
        let pop = population(&[3.0]);
        let pool = BreedingPool::new(pop.iter().collect()).unwrap();
        let mut rng = create_rng(1);
        assert_eq!(id(pool.get(&mut rng)), 0);
        assert_eq!(pool.height(), 1);
    }

    #[test]
    fn test_interval_boundaries_are_half_open() {
        let pop = population(&[1.0, 1.0, 1.0]);
        let pool = BreedingPool::new(pop.iter().collect()).unwrap();
        assert_eq!(id(pool.find(0.0)), 0);
        assert_eq!(id(pool.find(1.0)), 1);
        assert_eq!(id(pool.find(1.999)), 1);
        assert_eq!(id(pool.find(2.0)), 2);
    }

    #[test]
    fn test_empty_pool_is_error() {
        assert!(matches!(
            BreedingPool::new(Vec::new()),
            Err(EvolveError::EmptyBreedingPool)
        ));
    }

    #[test]
    fn test_non_positive_fitness_rejected() {
        let pop = population(&[1.0, 0.0]);
        assert!(matches!(
            BreedingPool::new(pop.iter().collect()),
            Err(EvolveError::InvalidBreedingFitness { fitness: Some(f) }) if f == 0.0
        ));
    }

    proptest! {
        #[test]
        fn prop_intervals_partition_total(fitnesses in prop::collection::vec(0.001f64..1000.0, 1..200)) {
            let pop = population(&fitnesses);
            let pool = BreedingPool::new(pop.iter().collect()).unwrap();

            let mut cursor = 0.0;
            for node in &pool.nodes {
                prop_assert_eq!(node.start, cursor);
                prop_assert!(node.end > node.start);
                cursor = node.end;
            }
            prop_assert_eq!(cursor, pool.total_fitness());

            // Every member is reachable at its own interval start.
            for node in &pool.nodes {
                prop_assert_eq!(id(pool.find(node.start)), node.member);
            }
        }

        #[test]
        fn prop_height_is_logarithmic(fitnesses in prop::collection::vec(0.001f64..1000.0, 1..500)) {
            let pop = population(&fitnesses);
            let pool = BreedingPool::new(pop.iter().collect()).unwrap();
            let n = fitnesses.len();
            let expected = usize::BITS as usize - n.leading_zeros() as usize;
            prop_assert_eq!(pool.height(), expected);
        }
    }
}
