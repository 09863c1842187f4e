//! Genotype and phenotype of a candidate rule.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::thresholds::ThresholdList;

/// `threshold[low] <= latency(backend) < threshold[high]`, with `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Condition {
    backend: usize,
    low: usize,
    high: usize,
}

impl Condition {
    pub fn new(backend: usize, low: usize, high: usize) -> Result<Self> {
        if low >= high {
            return Err(Error::InvalidCondition { backend, low, high });
        }
        Ok(Self { backend, low, high })
    }

    /// Orders two threshold indices into a condition; `None` when they are
    /// equal.
    pub fn from_endpoints(backend: usize, a: usize, b: usize) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { backend, low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { backend, low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn backend(&self) -> usize {
        self.backend
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}∈[t{}, t{})", self.backend, self.low, self.high)
    }
}

/// Conjunction of conditions. Empty means "always true".
///
/// Backend uniqueness is kept by [`Individual::insert_unique`]; set algebra
/// (`union`, `symmetric_difference`) does not repair it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Individual {
    conditions: BTreeSet<Condition>,
}

impl Individual {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> + '_ {
        self.conditions.iter()
    }

    pub fn contains(&self, condition: &Condition) -> bool {
        self.conditions.contains(condition)
    }

    pub fn has_backend(&self, backend: usize) -> bool {
        self.conditions.iter().any(|c| c.backend == backend)
    }

    /// Inserts `condition` unless some condition already uses its backend.
    pub fn insert_unique(&mut self, condition: Condition) -> bool {
        if self.has_backend(condition.backend) {
            return false;
        }
        self.conditions.insert(condition)
    }

    pub fn insert(&mut self, condition: Condition) -> bool {
        self.conditions.insert(condition)
    }

    pub fn remove(&mut self, condition: &Condition) -> bool {
        self.conditions.remove(condition)
    }

    /// Condition at position `index` in sorted order.
    pub fn nth(&self, index: usize) -> Option<Condition> {
        self.conditions.iter().nth(index).copied()
    }

    pub fn union(&self, other: &Individual) -> Individual {
        Individual {
            conditions: self.conditions.union(&other.conditions).copied().collect(),
        }
    }

    pub fn symmetric_difference(&self, other: &Individual) -> Individual {
        Individual {
            conditions: self
                .conditions
                .symmetric_difference(&other.conditions)
                .copied()
                .collect(),
        }
    }

    /// True when no two conditions share a backend.
    pub fn backends_unique(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.conditions.iter().all(|c| seen.insert(c.backend))
    }

    /// Concrete bands per backend name. Conditions sharing a backend are
    /// intersected, matching how they are scored; a backend whose
    /// conditions leave no common range is listed in
    /// [`Phenotype::contradictory`].
    pub fn phenotype(&self, backends: &[String], thresholds: &[ThresholdList]) -> Phenotype {
        let mut ranges: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for c in &self.conditions {
            ranges
                .entry(c.backend)
                .and_modify(|(low, high)| {
                    *low = (*low).max(c.low);
                    *high = (*high).min(c.high);
                })
                .or_insert((c.low, c.high));
        }

        let mut phenotype = Phenotype::default();
        for (backend, (low, high)) in ranges {
            let (Some(name), Some(list)) = (backends.get(backend), thresholds.get(backend)) else {
                continue;
            };
            if low >= high {
                phenotype.contradictory.insert(name.clone());
                continue;
            }
            if let (Some(low), Some(high)) = (list.get(low), list.get(high)) {
                phenotype.bands.insert(name.clone(), Band { low, high });
            }
        }
        phenotype
    }
}

impl FromIterator<Condition> for Individual {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Individual {
            conditions: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "true");
        }
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" ∧ "))
    }
}

/// Latency band `[low, high)` in threshold units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

/// Decoded rule: backend name → band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phenotype {
    pub bands: BTreeMap<String, Band>,
    /// Backends whose conditions have an empty intersection; the rule
    /// matches no trace.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub contradictory: BTreeSet<String>,
}

impl Phenotype {
    pub fn is_satisfiable(&self) -> bool {
        self.contradictory.is_empty()
    }
}
