//! μ+λ evolutionary loop.
//!
//! INIT builds and scores μ individuals. Each generation then produces λ = μ
//! offspring (crossover with probability `1 - mutation_probability`,
//! mutation otherwise), scores them, and tournament-selects the next μ from
//! parents ∪ offspring. The loop ends after the configured generation count
//! or when the wall-clock budget runs out. The initial population goes
//! straight into the first generation without a selection round.
//!
//! Offspring are built and scored in parallel. Every random choice that
//! decides *which* parents and *which* operator is drawn up front from the
//! master RNG, together with a per-offspring seed, so a seeded run gives the
//! same population no matter how rayon schedules the work.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GaConfig;
use crate::error::Result;
use crate::ga::individual::Individual;
use crate::ga::operators::{Evaluated, Select, Tournament, Variation};

/// Fitness of one individual. Must be pure: it runs concurrently.
pub trait Evaluate: Sync {
    fn evaluate(&self, individual: &Individual) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub evaluations: usize,
    pub best: f64,
    pub mean: f64,
}

impl GenerationStats {
    fn of(generation: usize, evaluations: usize, population: &[Evaluated]) -> Self {
        let best = population
            .iter()
            .map(|e| OrderedFloat(e.fitness))
            .max()
            .map_or(0.0, |f| f.into_inner());
        let mean = if population.is_empty() {
            0.0
        } else {
            population.iter().map(|e| e.fitness).sum::<f64>() / population.len() as f64
        };
        Self {
            generation,
            evaluations,
            best,
            mean,
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct Evolution {
    pub population: Vec<Evaluated>,
    pub history: Vec<GenerationStats>,
    pub generations_run: usize,
    /// Set when the time budget ended the run before the generation count.
    pub budget_exhausted: bool,
}

impl Evolution {
    pub fn best(&self) -> Option<&Evaluated> {
        self.population
            .iter()
            .max_by_key(|e| OrderedFloat(e.fitness))
    }
}

/// One offspring's recipe, drawn sequentially from the master RNG.
struct Draw {
    crossover: bool,
    first: usize,
    second: usize,
    seed: u64,
}

/// Search driver holding its operators explicitly.
pub struct GeneticOptimizer<V, E, S = Tournament> {
    config: GaConfig,
    variation: V,
    evaluator: E,
    selector: S,
}

impl<V: Variation, E: Evaluate> GeneticOptimizer<V, E, Tournament> {
    pub fn new(config: GaConfig, variation: V, evaluator: E) -> Self {
        let selector = Tournament {
            size: config.tournament_size,
        };
        Self {
            config,
            variation,
            evaluator,
            selector,
        }
    }
}

impl<V: Variation, E: Evaluate, S: Select> GeneticOptimizer<V, E, S> {
    pub fn with_selector<T: Select>(self, selector: T) -> GeneticOptimizer<V, E, T> {
        GeneticOptimizer {
            config: self.config,
            variation: self.variation,
            evaluator: self.evaluator,
            selector,
        }
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    pub fn run(&self) -> Result<Evolution> {
        self.config.validate()?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mu = self.config.population_size;

        let seeds: Vec<u64> = (0..mu).map(|_| rng.gen()).collect();
        let mut population: Vec<Evaluated> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut local = StdRng::seed_from_u64(seed);
                let individual = self.variation.initial(&mut local);
                self.score(individual)
            })
            .collect();

        let mut history = vec![GenerationStats::of(0, population.len(), &population)];
        let progress = self.progress_bar();
        let budget = self.config.time_budget();
        let started = Instant::now();
        let mut generations_run = 0;
        let mut budget_exhausted = false;

        for generation in 1..=self.config.generations {
            if budget.is_some_and(|b| started.elapsed() >= b) {
                budget_exhausted = true;
                info!(generation, elapsed = ?started.elapsed(), "Time budget exhausted");
                break;
            }

            let offspring = self.vary(&population, &mut rng);
            let evaluations = offspring.len();
            let mut pool = population;
            pool.extend(offspring);
            population = self.selector.select(&pool, mu, &mut rng);

            let stats = GenerationStats::of(generation, evaluations, &population);
            debug!(generation, best = stats.best, mean = stats.mean, "Generation done");
            history.push(stats);
            generations_run = generation;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let evolution = Evolution {
            population,
            history,
            generations_run,
            budget_exhausted,
        };
        info!(
            generations = evolution.generations_run,
            best = evolution.best().map_or(0.0, |e| e.fitness),
            "Genetic search finished"
        );
        Ok(evolution)
    }

    /// λ = μ offspring from `parents`, built and scored in parallel.
    fn vary(&self, parents: &[Evaluated], rng: &mut StdRng) -> Vec<Evaluated> {
        if parents.is_empty() {
            return Vec::new();
        }
        let crossover_probability = self.config.crossover_probability();
        let draws: Vec<Draw> = (0..self.config.population_size)
            .map(|_| {
                let crossover = rng.gen::<f64>() < crossover_probability;
                let (first, second) = if parents.len() >= 2 {
                    let picked = index::sample(rng, parents.len(), 2);
                    (picked.index(0), picked.index(1))
                } else {
                    (0, 0)
                };
                Draw {
                    crossover,
                    first,
                    second,
                    seed: rng.gen(),
                }
            })
            .collect();

        draws
            .into_par_iter()
            .map(|draw| {
                let mut local = StdRng::seed_from_u64(draw.seed);
                let first = &parents[draw.first].individual;
                let child = if draw.crossover {
                    let second = &parents[draw.second].individual;
                    self.variation.crossover(first, second, &mut local).0
                } else {
                    let mut child = first.clone();
                    self.variation.mutate(&mut child, &mut local);
                    child
                };
                self.score(child)
            })
            .collect()
    }

    fn score(&self, individual: Individual) -> Evaluated {
        let fitness = self.evaluator.evaluate(&individual);
        Evaluated {
            individual,
            fitness,
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.config.generations as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::individual::Condition;
    use crate::ga::operators::{ConditionSampler, SetVariation};

    /// Rewards conditions on backend 0 with band (1, 3), penalises size.
    struct Target;

    impl Evaluate for Target {
        fn evaluate(&self, individual: &Individual) -> f64 {
            let hit = individual.contains(&Condition::new(0, 1, 3).unwrap());
            let extra = individual.len().saturating_sub(1) as f64;
            if hit {
                1.0 / (1.0 + extra)
            } else {
                0.0
            }
        }
    }

    fn config(seed: u64) -> GaConfig {
        GaConfig {
            population_size: 40,
            generations: 60,
            tournament_size: 3,
            seed: Some(seed),
            ..GaConfig::default()
        }
    }

    fn optimizer(seed: u64) -> GeneticOptimizer<SetVariation, Target> {
        let variation = SetVariation::new(ConditionSampler::new(vec![5, 4]), 2);
        GeneticOptimizer::new(config(seed), variation, Target)
    }

    #[test]
    fn finds_the_rewarded_condition() {
        let evolution = optimizer(17).run().unwrap();
        assert_eq!(evolution.population.len(), 40);
        assert_eq!(evolution.generations_run, 60);
        assert_eq!(evolution.history.len(), 61);
        let best = evolution.best().unwrap();
        assert_eq!(best.fitness, 1.0);
        assert_eq!(best.individual.len(), 1);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let a = optimizer(99).run().unwrap();
        let b = optimizer(99).run().unwrap();
        assert_eq!(a.population, b.population);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn zero_generations_returns_initial_population() {
        let mut opt = optimizer(1);
        opt.config.generations = 0;
        let evolution = opt.run().unwrap();
        assert_eq!(evolution.generations_run, 0);
        assert_eq!(evolution.population.len(), 40);
        assert!(evolution
            .population
            .iter()
            .all(|e| e.individual.backends_unique()));
    }

    #[test]
    fn zero_time_budget_stops_before_first_generation() {
        let mut opt = optimizer(1);
        opt.config.time_budget_secs = Some(0.0);
        let evolution = opt.run().unwrap();
        assert!(evolution.budget_exhausted);
        assert_eq!(evolution.generations_run, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut opt = optimizer(1);
        opt.config.population_size = 0;
        assert!(opt.run().is_err());
    }

    #[test]
    fn best_fitness_never_drops_with_large_tournaments() {
        let mut opt = optimizer(5);
        opt.config.tournament_size = 200;
        let evolution = opt.run().unwrap();
        assert!(evolution
            .history
            .windows(2)
            .all(|w| w[1].best >= w[0].best));
    }
}
