//! Candidate cut values per backend.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::trace::TraceSet;

/// Strictly ascending cut values for one backend. The last entry is the
/// sentinel once [`ThresholdList::with_sentinel`] has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdList(Vec<f64>);

impl ThresholdList {
    pub fn new(backend: &str, values: Vec<f64>) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidThresholds {
            backend: backend.to_string(),
            reason: reason.to_string(),
        };
        if values.is_empty() {
            return Err(invalid("empty threshold list"));
        }
        if values.iter().any(|v| v.is_nan()) {
            return Err(invalid("NaN threshold"));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("thresholds must be strictly ascending"));
        }
        Ok(Self(values))
    }

    /// Appends `observed_max + 1` unless the list already ends above the
    /// observed maximum. Past 2^53 the sentinel is the next representable
    /// value instead.
    pub fn with_sentinel(mut self, backend: &str, observed_max: Option<f64>) -> Result<Self> {
        let (Some(max), Some(&last)) = (observed_max, self.0.last()) else {
            return Ok(self);
        };
        if last > max {
            return Ok(self);
        }
        let sentinel = above(max);
        if !(sentinel > max) || !sentinel.is_finite() {
            return Err(Error::InvalidThresholds {
                backend: backend.to_string(),
                reason: format!("no finite sentinel above observed maximum {max}"),
            });
        }
        self.0.push(sentinel);
        Ok(self)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }
}

/// `x + 1`, or the next float above `x` when adding 1 is lost to rounding.
fn above(x: f64) -> f64 {
    let bumped = x + 1.0;
    if bumped > x || !x.is_finite() {
        return bumped;
    }
    // |x| >= 2^53: step one ulp toward +inf
    if x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        f64::from_bits(x.to_bits() - 1)
    }
}

/// Supplier of candidate thresholds, keyed by backend name.
pub trait ThresholdCatalog {
    fn thresholds(&self, backend: &str) -> Option<Vec<f64>>;
}

/// Explicit backend → thresholds mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedCatalog {
    entries: BTreeMap<String, Vec<f64>>,
}

impl FixedCatalog {
    pub fn new(entries: impl IntoIterator<Item = (String, Vec<f64>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn insert(&mut self, backend: impl Into<String>, values: Vec<f64>) {
        self.entries.insert(backend.into(), values);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ThresholdCatalog for FixedCatalog {
    fn thresholds(&self, backend: &str) -> Option<Vec<f64>> {
        self.entries.get(backend).cloned()
    }
}

/// Random subset of the observed latencies: the smallest value plus `k`
/// others drawn without replacement.
#[derive(Debug, Clone)]
pub struct SampledCatalog {
    entries: HashMap<String, Vec<f64>>,
}

impl SampledCatalog {
    pub fn from_traces(traces: &TraceSet, k: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let entries = traces
            .backends
            .iter()
            .enumerate()
            .map(|(b, name)| {
                let pool: Vec<f64> = traces
                    .column(b)
                    .filter(|v| !v.is_nan())
                    .map(OrderedFloat)
                    .sorted()
                    .dedup()
                    .map(|v| v.into_inner())
                    .collect();
                let picked = if k + 1 >= pool.len() {
                    pool
                } else {
                    let mut picked: Vec<f64> = index::sample(&mut rng, pool.len() - 1, k)
                        .into_iter()
                        .map(|i| pool[i + 1])
                        .collect();
                    picked.push(pool[0]);
                    picked.sort_by(|a, b| a.total_cmp(b));
                    picked
                };
                (name.clone(), picked)
            })
            .collect();
        Self { entries }
    }

    pub fn to_fixed(&self) -> FixedCatalog {
        FixedCatalog::new(self.entries.clone())
    }
}

impl ThresholdCatalog for SampledCatalog {
    fn thresholds(&self, backend: &str) -> Option<Vec<f64>> {
        self.entries.get(backend).cloned()
    }
}
