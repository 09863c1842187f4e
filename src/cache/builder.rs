//! Bit-vector cache construction.
//!
//! Positives and negatives are each sorted by trace id, cut into fixed-size
//! partitions, and every partition computes its bit chunk for all
//! (backend, threshold) pairs in parallel. Chunks are then ordered by offset
//! and concatenated; a merge of two non-adjacent chunks aborts the build, so
//! the order in which partitions finish never shifts a bit.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::bitvec::BitVector;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::thresholds::ThresholdList;
use crate::trace::{SlaWindow, Trace, TraceSet};

/// Bits for traces `[offset, offset + len)` of one labeled subset;
/// `columns[backend][threshold]`.
#[derive(Debug, Clone)]
pub struct BitChunk {
    pub offset: usize,
    pub len: usize,
    pub columns: Vec<Vec<BitVector>>,
}

impl BitChunk {
    /// Bit `j` of `columns[b][i]` is set iff `traces[j]` has latency at
    /// least `thresholds[b][i]` on backend `b`.
    pub fn build(offset: usize, traces: &[&Trace], thresholds: &[ThresholdList]) -> Self {
        let columns = thresholds
            .iter()
            .enumerate()
            .map(|(b, list)| {
                list.values()
                    .iter()
                    .map(|&t| BitVector::from_bools(traces.iter().map(|tr| tr.backends[b] >= t)))
                    .collect()
            })
            .collect();
        Self {
            offset,
            len: traces.len(),
            columns,
        }
    }

    /// Concatenates `next` after `self`. Fails unless `next` starts exactly
    /// where `self` ends.
    pub fn merge(mut self, next: BitChunk) -> Result<BitChunk> {
        let expected = self.offset + self.len;
        if next.offset != expected {
            return Err(Error::MisalignedMerge {
                expected,
                found: next.offset,
            });
        }
        for (mine, theirs) in self.columns.iter_mut().zip(&next.columns) {
            for (bv, other) in mine.iter_mut().zip(theirs) {
                bv.append(other);
            }
        }
        self.len += next.len;
        Ok(self)
    }
}

fn empty_columns(thresholds: &[ThresholdList]) -> Vec<Vec<BitVector>> {
    thresholds
        .iter()
        .map(|list| vec![BitVector::zeros(0); list.len()])
        .collect()
}

/// Builds the full bit columns for one sorted labeled subset.
pub fn build_columns(
    sorted: &[&Trace],
    thresholds: &[ThresholdList],
    chunk_size: usize,
) -> Result<Vec<Vec<BitVector>>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks: Vec<BitChunk> = sorted
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(i, part)| BitChunk::build(i * chunk_size, part, thresholds))
        .collect();
    chunks.sort_by_key(|c| c.offset);

    let merged = chunks
        .into_iter()
        .try_fold(None::<BitChunk>, |acc, chunk| match acc {
            None if chunk.offset != 0 => Err(Error::MisalignedMerge {
                expected: 0,
                found: chunk.offset,
            }),
            None => Ok(Some(chunk)),
            Some(prev) => prev.merge(chunk).map(Some),
        })?;

    match merged {
        Some(chunk) if chunk.len == sorted.len() => Ok(chunk.columns),
        Some(chunk) => Err(Error::MisalignedMerge {
            expected: sorted.len(),
            found: chunk.len,
        }),
        None => Ok(empty_columns(thresholds)),
    }
}

/// TP vector over positives and FP vector over negatives for one
/// (backend, threshold index) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub tp: BitVector,
    pub fp: BitVector,
}

/// Read-only membership bitmaps; `entries[backend][threshold]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
    p: usize,
    n: usize,
    entries: Vec<Vec<CacheEntry>>,
}

impl Cache {
    pub fn positives(&self) -> usize {
        self.p
    }

    pub fn negatives(&self) -> usize {
        self.n
    }

    pub fn backends(&self) -> usize {
        self.entries.len()
    }

    pub fn thresholds(&self, backend: usize) -> usize {
        self.entries.get(backend).map_or(0, Vec::len)
    }

    pub fn entry(&self, backend: usize, threshold: usize) -> Option<&CacheEntry> {
        self.entries.get(backend)?.get(threshold)
    }

    pub fn tp(&self, backend: usize, threshold: usize) -> Option<&BitVector> {
        self.entry(backend, threshold).map(|e| &e.tp)
    }

    pub fn fp(&self, backend: usize, threshold: usize) -> Option<&BitVector> {
        self.entry(backend, threshold).map(|e| &e.fp)
    }
}

/// Turns labeled traces plus per-backend thresholds into a [`Cache`].
pub struct CacheBuilder<'a> {
    traces: &'a TraceSet,
    sla: SlaWindow,
    config: CacheConfig,
}

impl<'a> CacheBuilder<'a> {
    pub fn new(traces: &'a TraceSet, sla: SlaWindow) -> Self {
        Self {
            traces,
            sla,
            config: CacheConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// `thresholds` must follow the trace set's backend order.
    pub fn build(&self, thresholds: &[ThresholdList]) -> Result<Cache> {
        self.sla.validate()?;
        if thresholds.len() != self.traces.backends.len() {
            return Err(Error::InvalidConfig(format!(
                "{} threshold lists for {} backends",
                thresholds.len(),
                self.traces.backends.len()
            )));
        }

        let (positives, negatives) = self.traces.split(&self.sla);
        debug!(
            positives = positives.len(),
            negatives = negatives.len(),
            chunk_size = self.config.chunk_size,
            "Building bit columns"
        );

        let (tp_columns, fp_columns) = rayon::join(
            || build_columns(&positives, thresholds, self.config.chunk_size),
            || build_columns(&negatives, thresholds, self.config.chunk_size),
        );

        let entries = tp_columns?
            .into_iter()
            .zip(fp_columns?)
            .map(|(tps, fps)| {
                tps.into_iter()
                    .zip(fps)
                    .map(|(tp, fp)| CacheEntry { tp, fp })
                    .collect()
            })
            .collect();

        let cache = Cache {
            p: positives.len(),
            n: negatives.len(),
            entries,
        };
        info!(
            p = cache.p,
            n = cache.n,
            backends = cache.backends(),
            "Bit-vector cache built"
        );
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(id: &str, latencies: &[f64], frontend: f64) -> Trace {
        Trace {
            trace_id: id.to_string(),
            backends: latencies.to_vec(),
            frontend,
        }
    }

    fn worked_example() -> (TraceSet, Vec<ThresholdList>) {
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
        (set, thresholds)
    }

    #[test]
    fn builds_expected_bits_for_worked_example() {
        let (set, thresholds) = worked_example();
        let cache = CacheBuilder::new(&set, SlaWindow::new(0.0, 50.0).unwrap())
            .build(&thresholds)
            .unwrap();
        assert_eq!(cache.positives(), 2);
        assert_eq!(cache.negatives(), 2);
        // positives sorted: trace 1 (25), trace 3 (15)
        assert_eq!(cache.tp(0, 0).unwrap(), &BitVector::from_bools([true, true]));
        assert_eq!(cache.tp(0, 1).unwrap(), &BitVector::from_bools([true, false]));
        assert_eq!(cache.tp(0, 2).unwrap(), &BitVector::from_bools([false, false]));
        // negatives sorted: trace 2 (5), trace 4 (35)
        assert_eq!(cache.fp(0, 0).unwrap(), &BitVector::from_bools([false, true]));
        assert_eq!(cache.fp(0, 2).unwrap(), &BitVector::from_bools([false, true]));
    }

    #[test]
    fn chunking_does_not_change_bits() {
        let traces: Vec<Trace> = (0..500)
            .map(|i| trace(&format!("{:04}", (i * 37) % 500), &[(i % 17) as f64, (i % 5) as f64], (i % 11) as f64))
            .collect();
        let set = TraceSet::new(vec!["a".into(), "b".into()], traces).unwrap();
        let thresholds = vec![
            ThresholdList::new("a", vec![0.0, 4.0, 9.0, 18.0]).unwrap(),
            ThresholdList::new("b", vec![1.0, 3.0, 6.0]).unwrap(),
        ];
        let sla = SlaWindow::new(5.0, 9.0).unwrap();
        let whole = CacheBuilder::new(&set, sla)
            .with_config(CacheConfig { chunk_size: 10_000 })
            .build(&thresholds)
            .unwrap();
        for chunk_size in [1, 7, 64, 65, 100] {
            let chunked = CacheBuilder::new(&set, sla)
                .with_config(CacheConfig { chunk_size })
                .build(&thresholds)
                .unwrap();
            for b in 0..2 {
                for i in 0..whole.thresholds(b) {
                    assert_eq!(whole.entry(b, i), chunked.entry(b, i), "chunk_size={chunk_size}");
                }
            }
        }
    }

    #[test]
    fn popcount_is_non_increasing_in_threshold_index() {
        let (set, thresholds) = worked_example();
        let cache = CacheBuilder::new(&set, SlaWindow::new(0.0, 50.0).unwrap())
            .build(&thresholds)
            .unwrap();
        let counts: Vec<usize> = (0..3).map(|i| cache.tp(0, i).unwrap().count_ones()).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn merge_rejects_gaps_and_reordering() {
        let thresholds = vec![ThresholdList::new("B", vec![1.0]).unwrap()];
        let t = trace("x", &[2.0], 0.0);
        let first = BitChunk::build(0, &[&t, &t], &thresholds);
        let far = BitChunk::build(3, &[&t], &thresholds);
        assert!(matches!(
            first.clone().merge(far),
            Err(Error::MisalignedMerge { expected: 2, found: 3 })
        ));
        let next = BitChunk::build(2, &[&t], &thresholds);
        assert!(next.clone().merge(first.clone()).is_err());
        let merged = first.merge(next).unwrap();
        assert_eq!(merged.len, 3);
        assert_eq!(merged.columns[0][0].count_ones(), 3);
    }

    #[test]
    fn empty_trace_set_builds_empty_cache() {
        let set = TraceSet::new(vec!["B".into()], vec![]).unwrap();
        let thresholds = vec![ThresholdList::new("B", vec![1.0, 2.0]).unwrap()];
        let cache = CacheBuilder::new(&set, SlaWindow::new(0.0, 1.0).unwrap())
            .build(&thresholds)
            .unwrap();
        assert_eq!(cache.positives(), 0);
        assert_eq!(cache.negatives(), 0);
        assert_eq!(cache.thresholds(0), 2);
        assert!(cache.tp(0, 1).unwrap().is_empty());
    }

    #[test]
    fn threshold_count_must_match_backends() {
        let (set, _) = worked_example();
        let result = CacheBuilder::new(&set, SlaWindow::new(0.0, 50.0).unwrap()).build(&[]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
