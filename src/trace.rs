//! Flat trace records and the SLA labeling that splits them into positives
//! and negatives.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frontend latency band `(from, to]` whose members count as SLA violations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaWindow {
    pub from: f64,
    pub to: f64,
}

impl SlaWindow {
    pub fn new(from: f64, to: f64) -> Result<Self> {
        let window = Self { from, to };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        // NaN bounds fail the comparison too
        if !(self.from < self.to) {
            return Err(Error::InvalidSlaWindow {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }

    /// True when `latency` lies in `(from, to]`.
    pub fn contains(&self, latency: f64) -> bool {
        latency > self.from && latency <= self.to
    }
}

/// One end-to-end request: per-backend latencies in backend-list order plus
/// the frontend latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub backends: Vec<f64>,
    pub frontend: f64,
}

/// Trace records sharing one ordered backend list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSet {
    pub backends: Vec<String>,
    pub traces: Vec<Trace>,
}

impl TraceSet {
    pub fn new(backends: Vec<String>, traces: Vec<Trace>) -> Result<Self> {
        if let Some(bad) = traces.iter().find(|t| t.backends.len() != backends.len()) {
            return Err(Error::InvalidTraceTable(format!(
                "trace {} has {} backend latencies, expected {}",
                bad.trace_id,
                bad.backends.len(),
                backends.len()
            )));
        }
        Ok(Self { backends, traces })
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn backend_index(&self, name: &str) -> Result<usize> {
        self.backends
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Latencies observed for one backend, in trace order.
    pub fn column(&self, backend: usize) -> impl Iterator<Item = f64> + '_ {
        self.traces.iter().map(move |t| t.backends[backend])
    }

    /// Largest latency observed for `backend`, `None` without traces.
    pub fn max_latency(&self, backend: usize) -> Option<f64> {
        self.column(backend).fold(None, |acc, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
    }

    /// Splits traces into (positives, negatives) for `sla`, each sorted by
    /// trace id. This order fixes bit positions in every cache vector.
    pub fn split(&self, sla: &SlaWindow) -> (Vec<&Trace>, Vec<&Trace>) {
        let (mut positives, mut negatives): (Vec<&Trace>, Vec<&Trace>) =
            self.traces.iter().partition(|t| sla.contains(t.frontend));
        positives.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));
        negatives.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));
        (positives, negatives)
    }
}
