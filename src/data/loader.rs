use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rayon::prelude::*;
use serde_json::Value;
use tracing::info;

use crate::config::RunConfig;
use crate::data::columnar::ColumnarTable;
use crate::data::sqlite::{load_table, save_table};
use crate::error::{Error, Result};
use crate::trace::TraceSet;

/// Loads the trace table, preferring the SQLite cache when it exists and
/// writing it after a JSON load otherwise.
pub fn load_dataset(
    json_path: &Path,
    sqlite_path: Option<&Path>,
    trace_id_column: &str,
) -> Result<ColumnarTable> {
    if let Some(cache) = sqlite_path.filter(|p| p.exists()) {
        info!(path = %cache.display(), "Loading cached traces from SQLite");
        return load_table(cache);
    }

    info!(path = %json_path.display(), "Loading traces from JSON");
    let file = File::open(json_path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;
    let table = parse_json_table(&value, trace_id_column)?;

    if let Some(cache) = sqlite_path {
        save_table(cache, &table)?;
        info!(path = %cache.display(), rows = table.len(), "Saved SQLite cache for next run");
    }
    Ok(table)
}

/// `load_dataset` followed by reshaping into trace records with every
/// latency column as a backend.
pub fn load_traces(json_path: &Path, sqlite_path: Option<&Path>, config: &RunConfig) -> Result<TraceSet> {
    load_dataset(json_path, sqlite_path, &config.trace_id_column)?
        .into_trace_set(&config.frontend_column, &[])
}

/// Parses `{ "columns": [...], "data": [[...], ...] }`. The id column may
/// hold strings or numbers; every other column must be numeric.
pub fn parse_json_table(value: &Value, trace_id_column: &str) -> Result<ColumnarTable> {
    let header = value["columns"]
        .as_array()
        .ok_or_else(|| Error::InvalidTraceTable("missing 'columns' array".into()))?;
    let rows = value["data"]
        .as_array()
        .ok_or_else(|| Error::InvalidTraceTable("missing 'data' array".into()))?;

    let names = header
        .iter()
        .map(|c| {
            c.as_str()
                .map(String::from)
                .ok_or_else(|| Error::InvalidTraceTable(format!("column name {c} is not a string")))
        })
        .collect::<Result<Vec<String>>>()?;
    let id_idx = names
        .iter()
        .position(|c| c == trace_id_column)
        .ok_or_else(|| Error::MissingColumn(trace_id_column.to_string()))?;

    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, row)| match row.as_array() {
            Some(cells) if cells.len() == names.len() => Ok(cells.as_slice()),
            _ => Err(Error::InvalidTraceTable(format!(
                "row {i} is not an array of {} cells",
                names.len()
            ))),
        })
        .collect::<Result<Vec<&[Value]>>>()?;

    let trace_ids = rows
        .iter()
        .enumerate()
        .map(|(i, cells)| match &cells[id_idx] {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(Error::InvalidTraceTable(format!("row {i} has trace id {other}"))),
        })
        .collect::<Result<Vec<String>>>()?;

    let col_indices: Vec<(String, usize)> = names
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != id_idx)
        .map(|(i, c)| (c.clone(), i))
        .collect();
    let data = col_indices
        .par_iter()
        .map(|(col, idx)| {
            let values = rows
                .iter()
                .enumerate()
                .map(|(i, cells)| {
                    cells[*idx].as_f64().ok_or_else(|| {
                        Error::InvalidTraceTable(format!("row {i} column '{col}' is not a number"))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok((col.clone(), values))
        })
        .collect::<Result<HashMap<String, Vec<f64>>>>()?;

    let columns = col_indices.into_iter().map(|(c, _)| c).collect();
    ColumnarTable::new(trace_ids, columns, data)
}
