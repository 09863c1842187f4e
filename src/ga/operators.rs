//! Sampling, crossover, mutation and selection over condition sets.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::Rng;

use crate::ga::individual::{Condition, Individual};

/// Draws random valid conditions given each backend's threshold count.
#[derive(Debug, Clone)]
pub struct ConditionSampler {
    sizes: Vec<usize>,
    /// Backends with at least two thresholds.
    eligible: Vec<usize>,
}

impl ConditionSampler {
    pub fn new(sizes: Vec<usize>) -> Self {
        let eligible = sizes
            .iter()
            .enumerate()
            .filter(|(_, &n)| n >= 2)
            .map(|(b, _)| b)
            .collect();
        Self { sizes, eligible }
    }

    pub fn thresholds(&self, backend: usize) -> usize {
        self.sizes.get(backend).copied().unwrap_or(0)
    }

    /// Uniform backend among those with two or more thresholds, then two
    /// distinct indices ordered into (low, high). `None` when no backend
    /// qualifies.
    pub fn sample(&self, rng: &mut StdRng) -> Option<Condition> {
        let &backend = self.eligible.choose(rng)?;
        let picked = index::sample(rng, self.sizes[backend], 2);
        Condition::from_endpoints(backend, picked.index(0), picked.index(1))
    }

    /// Individual from `count` independent draws, keeping backends unique.
    pub fn individual(&self, count: usize, rng: &mut StdRng) -> Individual {
        let mut ind = Individual::new();
        for _ in 0..count {
            if let Some(c) = self.sample(rng) {
                ind.insert_unique(c);
            }
        }
        ind
    }
}

/// Variation operators of the search.
pub trait Variation: Send + Sync {
    fn initial(&self, rng: &mut StdRng) -> Individual;
    fn crossover(&self, a: &Individual, b: &Individual, rng: &mut StdRng) -> (Individual, Individual);
    fn mutate(&self, individual: &mut Individual, rng: &mut StdRng);
}

/// Which mutation fired, mostly for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Remove,
    Add,
    Modify,
}

/// Set-based crossover plus remove/add/modify mutation.
#[derive(Debug, Clone)]
pub struct SetVariation {
    sampler: ConditionSampler,
    initial_conditions: usize,
}

impl SetVariation {
    pub fn new(sampler: ConditionSampler, initial_conditions: usize) -> Self {
        Self {
            sampler,
            initial_conditions,
        }
    }

    pub fn sampler(&self) -> &ConditionSampler {
        &self.sampler
    }

    /// Drops one random condition.
    pub fn mutate_remove(&self, individual: &mut Individual, rng: &mut StdRng) {
        if individual.is_empty() {
            return;
        }
        if let Some(c) = individual.nth(rng.gen_range(0..individual.len())) {
            individual.remove(&c);
        }
    }

    /// Adds a fresh condition when its backend is still free.
    pub fn mutate_add(&self, individual: &mut Individual, rng: &mut StdRng) {
        if let Some(c) = self.sampler.sample(rng) {
            individual.insert_unique(c);
        }
    }

    /// Moves one endpoint of a random condition to a random index; a
    /// condition whose endpoints meet is dropped.
    pub fn mutate_modify(&self, individual: &mut Individual, rng: &mut StdRng) {
        if individual.is_empty() {
            return;
        }
        let Some(old) = individual.nth(rng.gen_range(0..individual.len())) else {
            return;
        };
        let size = self.sampler.thresholds(old.backend());
        if size == 0 {
            return;
        }
        let moved = rng.gen_range(0..size);
        let (a, b) = if rng.gen_bool(0.5) {
            (moved, old.high())
        } else {
            (old.low(), moved)
        };
        individual.remove(&old);
        if let Some(new) = Condition::from_endpoints(old.backend(), a, b) {
            individual.insert(new);
        }
    }

    pub fn mutate_with(&self, kind: Mutation, individual: &mut Individual, rng: &mut StdRng) {
        match kind {
            Mutation::Remove => self.mutate_remove(individual, rng),
            Mutation::Add => self.mutate_add(individual, rng),
            Mutation::Modify => self.mutate_modify(individual, rng),
        }
    }
}

impl Variation for SetVariation {
    fn initial(&self, rng: &mut StdRng) -> Individual {
        self.sampler.individual(self.initial_conditions, rng)
    }

    /// `U = a ∪ b`, `S` a random non-empty subset of `b`;
    /// children are `U Δ S` and `U Δ (U Δ S)`.
    fn crossover(&self, a: &Individual, b: &Individual, rng: &mut StdRng) -> (Individual, Individual) {
        let union = a.union(b);
        let subset: Individual = if b.is_empty() {
            Individual::new()
        } else {
            let size = rng.gen_range(1..=b.len());
            let pool: Vec<Condition> = b.iter().copied().collect();
            index::sample(rng, pool.len(), size)
                .into_iter()
                .map(|i| pool[i])
                .collect()
        };
        let first = union.symmetric_difference(&subset);
        let second = union.symmetric_difference(&first);
        (first, second)
    }

    fn mutate(&self, individual: &mut Individual, rng: &mut StdRng) {
        let kind = match rng.gen_range(0..3) {
            0 => Mutation::Remove,
            1 => Mutation::Add,
            _ => Mutation::Modify,
        };
        self.mutate_with(kind, individual, rng);
    }
}

/// An individual with its fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub individual: Individual,
    pub fitness: f64,
}

/// Survivor selection.
pub trait Select: Send + Sync {
    fn select(&self, pool: &[Evaluated], count: usize, rng: &mut StdRng) -> Vec<Evaluated>;
}

/// Best of `size` uniform draws (with replacement), repeated `count` times.
#[derive(Debug, Clone, Copy)]
pub struct Tournament {
    pub size: usize,
}

impl Select for Tournament {
    fn select(&self, pool: &[Evaluated], count: usize, rng: &mut StdRng) -> Vec<Evaluated> {
        if pool.is_empty() {
            return Vec::new();
        }
        (0..count)
            .filter_map(|_| {
                (0..self.size.max(1))
                    .map(|_| &pool[rng.gen_range(0..pool.len())])
                    .max_by_key(|e| OrderedFloat(e.fitness))
                    .cloned()
            })
            .collect()
    }
}
