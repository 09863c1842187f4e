use serde::{Deserialize, Serialize};

use crate::cache::builder::{Cache, CacheEntry};
use crate::ga::individual::Individual;
use crate::ga::optimizer::Evaluate;

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subset {
    Positives,
    Negatives,
}

/// Confusion counts and derived scores of one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub tp: usize,
    pub fp: usize,
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

/// Stateless scoring of individuals against a built cache.
#[derive(Debug, Clone, Copy)]
pub struct FitnessEngine<'a> {
    cache: &'a Cache,
}

impl<'a> FitnessEngine<'a> {
    pub fn new(cache: &'a Cache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &'a Cache {
        self.cache
    }

    pub fn compute_tp(&self, individual: &Individual) -> usize {
        self.count(individual, Subset::Positives)
    }

    pub fn compute_fp(&self, individual: &Individual) -> usize {
        self.count(individual, Subset::Negatives)
    }

    /// Precision is 0 when nothing is predicted; recall is 0 without
    /// positives.
    pub fn compute_precision_recall(&self, individual: &Individual) -> (f64, f64) {
        let tp = self.compute_tp(individual);
        let fp = self.compute_fp(individual);
        Self::precision_recall(tp, fp, self.cache.positives())
    }

    pub fn compute_f_measure(&self, individual: &Individual) -> f64 {
        let (precision, recall) = self.compute_precision_recall(individual);
        Self::f_measure(precision, recall)
    }

    pub fn score(&self, individual: &Individual) -> Score {
        let tp = self.compute_tp(individual);
        let fp = self.compute_fp(individual);
        let (precision, recall) = Self::precision_recall(tp, fp, self.cache.positives());
        Score {
            tp,
            fp,
            precision,
            recall,
            f_measure: Self::f_measure(precision, recall),
        }
    }

    fn precision_recall(tp: usize, fp: usize, p: usize) -> (f64, f64) {
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if p > 0 { tp as f64 / p as f64 } else { 0.0 };
        (precision, recall)
    }

    fn f_measure(precision: f64, recall: f64) -> f64 {
        if precision > 0.0 || recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    }

    /// popcount of AND over conditions of `v(b, low) AND NOT v(b, high)`,
    /// computed word by word without allocating. A condition outside the
    /// cache matches nothing.
    fn count(&self, individual: &Individual, subset: Subset) -> usize {
        let total = match subset {
            Subset::Positives => self.cache.positives(),
            Subset::Negatives => self.cache.negatives(),
        };
        if individual.is_empty() {
            return total;
        }
        let pick = |entry: &'a CacheEntry| match subset {
            Subset::Positives => entry.tp.words(),
            Subset::Negatives => entry.fp.words(),
        };

        let mut bands: Vec<(&[u64], &[u64])> = Vec::with_capacity(individual.len());
        for c in individual.iter() {
            let low = self.cache.entry(c.backend(), c.low());
            let high = self.cache.entry(c.backend(), c.high());
            match (low, high) {
                (Some(low), Some(high)) => bands.push((pick(low), pick(high))),
                _ => return 0,
            }
        }

        (0..total.div_ceil(WORD_BITS))
            .map(|w| {
                bands
                    .iter()
                    .fold(u64::MAX, |acc, (low, high)| acc & low[w] & !high[w])
                    .count_ones() as usize
            })
            .sum()
    }
}

impl Evaluate for FitnessEngine<'_> {
    fn evaluate(&self, individual: &Individual) -> f64 {
        self.compute_f_measure(individual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::builder::CacheBuilder;
    use crate::ga::individual::Condition;
    use crate::thresholds::ThresholdList;
    use crate::trace::{SlaWindow, Trace, TraceSet};

    fn trace(id: &str, latencies: &[f64], frontend: f64) -> Trace {
        Trace {
            trace_id: id.to_string(),
            backends: latencies.to_vec(),
            frontend,
        }
    }

    fn worked_cache() -> Cache {
        let set = TraceSet::new(
            vec!["B".into()],
            vec![
                trace("1", &[25.0], 40.0),
                trace("2", &[5.0], 60.0),
                trace("3", &[15.0], 45.0),
                trace("4", &[35.0], 70.0),
            ],
        )
        .unwrap();
        let thresholds = vec![ThresholdList::new("B", vec![10.0, 20.0, 31.0]).unwrap()];
        CacheBuilder::new(&set, SlaWindow::new(0.0, 50.0).unwrap())
            .build(&thresholds)
            .unwrap()
    }

    #[test]
    fn scores_single_backend_bands() {
        let cache = worked_cache();
        let engine = FitnessEngine::new(&cache);

        // [10, 31) keeps both positives (25, 15); negatives 5 and 35 fall outside
        let wide: Individual = [Condition::new(0, 0, 2).unwrap()].into_iter().collect();
        let score = engine.score(&wide);
        assert_eq!((score.tp, score.fp), (2, 0));
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.recall, 1.0);
        assert_eq!(score.f_measure, 1.0);

        // [20, 31) keeps only the 25ms positive
        let upper: Individual = [Condition::new(0, 1, 2).unwrap()].into_iter().collect();
        let score = engine.score(&upper);
        assert_eq!((score.tp, score.fp), (1, 0));
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.recall, 0.5);
        assert!((score.f_measure - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_individual_counts_everything() {
        let cache = worked_cache();
        let engine = FitnessEngine::new(&cache);
        let empty = Individual::new();
        assert_eq!(engine.compute_tp(&empty), cache.positives());
        assert_eq!(engine.compute_fp(&empty), cache.negatives());
        let (precision, recall) = engine.compute_precision_recall(&empty);
        assert_eq!(precision, 0.5);
        assert_eq!(recall, 1.0);
    }

    #[test]
    fn zero_guards_yield_zero_scores() {
        let set = TraceSet::new(vec!["B".into()], vec![]).unwrap();
        let thresholds = vec![ThresholdList::new("B", vec![1.0, 2.0]).unwrap()];
        let cache = CacheBuilder::new(&set, SlaWindow::new(0.0, 1.0).unwrap())
            .build(&thresholds)
            .unwrap();
        let engine = FitnessEngine::new(&cache);
        for ind in [
            Individual::new(),
            [Condition::new(0, 0, 1).unwrap()].into_iter().collect(),
        ] {
            let score = engine.score(&ind);
            assert_eq!(score.precision, 0.0);
            assert_eq!(score.recall, 0.0);
            assert_eq!(score.f_measure, 0.0);
        }
    }

    #[test]
    fn out_of_range_condition_matches_nothing() {
        let cache = worked_cache();
        let engine = FitnessEngine::new(&cache);
        let ind: Individual = [Condition::new(0, 0, 9).unwrap()].into_iter().collect();
        assert_eq!(engine.compute_tp(&ind), 0);
        assert_eq!(engine.evaluate(&ind), 0.0);
    }

    #[test]
    fn f_measure_is_bounded_and_zero_only_without_signal() {
        let cache = worked_cache();
        let engine = FitnessEngine::new(&cache);
        for low in 0..3 {
            for high in (low + 1)..3 {
                let ind: Individual = [Condition::new(0, low, high).unwrap()].into_iter().collect();
                let s = engine.score(&ind);
                assert!((0.0..=1.0).contains(&s.f_measure));
                assert_eq!(s.f_measure == 0.0, s.precision == 0.0 && s.recall == 0.0);
                let band = cache.tp(0, low).unwrap().and_not(cache.tp(0, high).unwrap()).unwrap();
                assert!(band.count_ones() <= cache.tp(0, low).unwrap().count_ones());
                assert_eq!(band.count_ones(), s.tp);
            }
        }
    }
}
