//! Catalog → cache → genetic search → best rule.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::builder::{Cache, CacheBuilder};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::ga::individual::{Individual, Phenotype};
use crate::ga::operators::{ConditionSampler, Evaluated, SetVariation};
use crate::ga::optimizer::{GenerationStats, GeneticOptimizer};
use crate::metrics::fitness::FitnessEngine;
use crate::thresholds::{ThresholdCatalog, ThresholdList};
use crate::trace::{Trace, TraceSet};

/// A decoded rule and its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRule {
    pub phenotype: Phenotype,
    pub f_measure: f64,
    pub precision: f64,
    pub recall: f64,
    pub tp: usize,
    pub fp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub best: BestRule,
    /// Distinct final individuals, best first.
    pub population: Vec<BestRule>,
    pub positives: usize,
    pub negatives: usize,
    pub history: Vec<GenerationStats>,
    pub budget_exhausted: bool,
}

pub struct Orchestrator {
    config: RunConfig,
}

impl Orchestrator {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Threshold lists in backend order, each confirmed to end in a
    /// sentinel above the observed maximum.
    pub fn resolve_thresholds(
        &self,
        traces: &TraceSet,
        catalog: &dyn ThresholdCatalog,
    ) -> Result<Vec<ThresholdList>> {
        traces
            .backends
            .iter()
            .enumerate()
            .map(|(b, name)| {
                let values = catalog
                    .thresholds(name)
                    .ok_or_else(|| Error::MissingThresholds(name.clone()))?;
                ThresholdList::new(name, values)?.with_sentinel(name, traces.max_latency(b))
            })
            .collect()
    }

    pub fn build_cache(&self, traces: &TraceSet, thresholds: &[ThresholdList]) -> Result<Cache> {
        CacheBuilder::new(traces, self.config.sla)
            .with_config(self.config.cache.clone())
            .build(thresholds)
    }

    /// Runs the whole pipeline and returns the best rule.
    pub fn run(&self, traces: &TraceSet, catalog: &dyn ThresholdCatalog) -> Result<BestRule> {
        Ok(self.run_report(traces, catalog)?.best)
    }

    pub fn run_report(&self, traces: &TraceSet, catalog: &dyn ThresholdCatalog) -> Result<RunReport> {
        let traces = self.restrict(traces)?;
        let thresholds = self.resolve_thresholds(&traces, catalog)?;
        let cache = self.build_cache(&traces, &thresholds)?;
        if cache.positives() == 0 {
            warn!("No trace falls inside the SLA window; every rule scores 0");
        }

        let engine = FitnessEngine::new(&cache);
        let sampler = ConditionSampler::new(thresholds.iter().map(ThresholdList::len).collect());
        let variation = SetVariation::new(sampler, self.config.ga.initial_conditions);
        let evolution = GeneticOptimizer::new(self.config.ga.clone(), variation, engine).run()?;

        let decode = |individual: &Individual| {
            let score = engine.score(individual);
            BestRule {
                phenotype: individual.phenotype(&traces.backends, &thresholds),
                f_measure: score.f_measure,
                precision: score.precision,
                recall: score.recall,
                tp: score.tp,
                fp: score.fp,
            }
        };

        let mut ranked: Vec<&Evaluated> = evolution.population.iter().collect();
        ranked.sort_by(|a, b| {
            OrderedFloat(b.fitness)
                .cmp(&OrderedFloat(a.fitness))
                .then_with(|| a.individual.cmp(&b.individual))
        });
        ranked.dedup_by(|a, b| a.individual == b.individual);
        let population: Vec<BestRule> = ranked.into_iter().map(|e| decode(&e.individual)).collect();
        let best = population
            .first()
            .cloned()
            .unwrap_or_else(|| decode(&Individual::new()));

        info!(
            f_measure = best.f_measure,
            precision = best.precision,
            recall = best.recall,
            conditions = best.phenotype.bands.len(),
            "Best rule selected"
        );
        Ok(RunReport {
            best,
            population,
            positives: cache.positives(),
            negatives: cache.negatives(),
            history: evolution.history,
            budget_exhausted: evolution.budget_exhausted,
        })
    }

    /// Keeps only the configured backends, in configured order.
    fn restrict(&self, traces: &TraceSet) -> Result<TraceSet> {
        if self.config.backends.is_empty() || self.config.backends == traces.backends {
            return Ok(traces.clone());
        }
        let columns = self
            .config
            .backends
            .iter()
            .map(|name| traces.backend_index(name))
            .collect::<Result<Vec<_>>>()?;
        let rows = traces
            .traces
            .iter()
            .map(|t| Trace {
                trace_id: t.trace_id.clone(),
                backends: columns.iter().map(|&c| t.backends[c]).collect(),
                frontend: t.frontend,
            })
            .collect();
        TraceSet::new(self.config.backends.clone(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GaConfig;
    use crate::thresholds::FixedCatalog;
    use crate::trace::SlaWindow;

    fn traces() -> TraceSet {
        let rows = (0..200)
            .map(|i| {
                let db = (i % 50) as f64;
                let auth = ((i * 7) % 13) as f64;
                // slow requests are exactly those with db latency in [30, 40)
                let frontend = if (30.0..40.0).contains(&db) { 500.0 } else { 100.0 };
                Trace {
                    trace_id: format!("{i:04x}"),
                    backends: vec![auth, db],
                    frontend,
                }
            })
            .collect();
        TraceSet::new(vec!["auth".into(), "db".into()], rows).unwrap()
    }

    fn config() -> RunConfig {
        RunConfig {
            sla: SlaWindow::new(300.0, 1000.0).unwrap(),
            ga: GaConfig {
                population_size: 40,
                generations: 60,
                tournament_size: 5,
                seed: Some(3),
                ..GaConfig::default()
            },
            ..RunConfig::default()
        }
    }

    fn catalog() -> FixedCatalog {
        FixedCatalog::new([
            ("auth".to_string(), vec![0.0, 6.0]),
            ("db".to_string(), vec![0.0, 10.0, 20.0, 30.0, 40.0]),
        ])
    }

    #[test]
    fn recovers_the_planted_band() {
        let orchestrator = Orchestrator::new(config()).unwrap();
        let report = orchestrator.run_report(&traces(), &catalog()).unwrap();
        assert_eq!(report.positives, 40);
        assert_eq!(report.negatives, 160);
        assert_eq!(report.best.f_measure, 1.0);
        let db = report.best.phenotype.bands["db"];
        assert_eq!((db.low, db.high), (30.0, 40.0));
        assert!(report
            .population
            .windows(2)
            .all(|w| w[0].f_measure >= w[1].f_measure));
    }

    #[test]
    fn sentinel_is_appended_from_observed_max() {
        let orchestrator = Orchestrator::new(config()).unwrap();
        let lists = orchestrator.resolve_thresholds(&traces(), &catalog()).unwrap();
        assert_eq!(lists[0].values(), &[0.0, 6.0, 13.0]);
        assert_eq!(lists[1].values(), &[0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn missing_catalog_entry_is_fatal() {
        let orchestrator = Orchestrator::new(config()).unwrap();
        let partial = FixedCatalog::new([("auth".to_string(), vec![0.0, 6.0])]);
        let err = orchestrator.run(&traces(), &partial).unwrap_err();
        assert!(matches!(err, Error::MissingThresholds(ref b) if b == "db"));
    }

    #[test]
    fn configured_backend_subset_is_respected() {
        let mut cfg = config();
        cfg.backends = vec!["db".into()];
        let orchestrator = Orchestrator::new(cfg).unwrap();
        let partial = FixedCatalog::new([("db".to_string(), vec![0.0, 10.0, 20.0, 30.0, 40.0])]);
        let best = orchestrator.run(&traces(), &partial).unwrap();
        assert!(best.phenotype.bands.keys().all(|k| k == "db"));

        let mut cfg = config();
        cfg.backends = vec!["cache".into()];
        let orchestrator = Orchestrator::new(cfg).unwrap();
        assert!(matches!(
            orchestrator.run(&traces(), &partial),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn empty_trace_set_scores_zero() {
        let orchestrator = Orchestrator::new(config()).unwrap();
        let empty = TraceSet::new(vec!["auth".into(), "db".into()], vec![]).unwrap();
        let best = orchestrator.run(&empty, &catalog()).unwrap();
        assert_eq!(best.f_measure, 0.0);
        assert_eq!(best.precision, 0.0);
        assert_eq!(best.recall, 0.0);
    }
}
