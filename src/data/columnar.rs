use std::collections::HashMap;

use tracing::warn;

use crate::error::{Error, Result};
use crate::trace::{Trace, TraceSet};

/// Trace ids plus named latency columns, all of length `n_rows`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnarTable {
    pub n_rows: usize,
    pub trace_ids: Vec<String>,
    /// Column names in table order.
    pub columns: Vec<String>,
    pub data: HashMap<String, Vec<f64>>,
}

impl ColumnarTable {
    pub fn new(trace_ids: Vec<String>, columns: Vec<String>, data: HashMap<String, Vec<f64>>) -> Result<Self> {
        let n_rows = trace_ids.len();
        for name in &columns {
            let len = data.get(name).map_or(0, Vec::len);
            if len != n_rows {
                return Err(Error::InvalidTraceTable(format!(
                    "column '{name}' has {len} rows, expected {n_rows}"
                )));
            }
        }
        Ok(Self {
            n_rows,
            trace_ids,
            columns,
            data,
        })
    }

    /// Slice of a latency column, or empty slice if not found.
    pub fn column_f64(&self, col: &str) -> &[f64] {
        let out = self.data.get(col).map(|v| v.as_slice()).unwrap_or(&[]);
        if out.iter().any(|v| v.is_nan()) {
            warn!(column = col, "Column contains NaNs");
        }
        out
    }

    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Reshapes into trace records. `backends` empty means every column
    /// except the frontend one, in table order.
    pub fn into_trace_set(self, frontend: &str, backends: &[String]) -> Result<TraceSet> {
        let frontend_values = self
            .data
            .get(frontend)
            .ok_or_else(|| Error::MissingColumn(frontend.to_string()))?;
        let backends: Vec<String> = if backends.is_empty() {
            self.columns.iter().filter(|c| *c != frontend).cloned().collect()
        } else {
            backends.to_vec()
        };
        let backend_columns = backends
            .iter()
            .map(|name| {
                self.data
                    .get(name)
                    .map(Vec::as_slice)
                    .ok_or_else(|| Error::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<&[f64]>>>()?;

        let traces = self
            .trace_ids
            .iter()
            .enumerate()
            .map(|(row, id)| Trace {
                trace_id: id.clone(),
                backends: backend_columns.iter().map(|col| col[row]).collect(),
                frontend: frontend_values[row],
            })
            .collect();
        TraceSet::new(backends, traces)
    }
}
