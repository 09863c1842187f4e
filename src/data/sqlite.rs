use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::data::columnar::ColumnarTable;
use crate::error::Result;

const TABLE: &str = "traces";
const ID_COLUMN: &str = "trace_id";

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Writes `table` to a fresh `traces` table at `path`, replacing any
/// previous file.
pub fn save_table(path: &Path, table: &ColumnarTable) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut conn = Connection::open(path)?;

    let col_defs: Vec<String> = std::iter::once(format!("{} TEXT NOT NULL", quote(ID_COLUMN)))
        .chain(table.columns.iter().map(|c| format!("{} REAL", quote(c))))
        .collect();
    conn.execute(&format!("CREATE TABLE {TABLE} ({})", col_defs.join(", ")), [])?;

    let names: Vec<String> = std::iter::once(ID_COLUMN)
        .chain(table.columns.iter().map(String::as_str))
        .map(quote)
        .collect();
    let insert_sql = format!(
        "INSERT INTO {TABLE} ({}) VALUES ({})",
        names.join(", "),
        vec!["?"; names.len()].join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for (row, id) in table.trace_ids.iter().enumerate() {
            let values = std::iter::once(Value::Text(id.clone()))
                .chain(table.columns.iter().map(|c| {
                    table
                        .data
                        .get(c)
                        .and_then(|v| v.get(row))
                        .map_or(Value::Null, |&v| Value::Real(v))
                }));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    debug!(path = %path.display(), rows = table.len(), "Saved SQLite trace cache");
    Ok(())
}

/// Reads back a table written by [`save_table`].
pub fn load_table(path: &Path) -> Result<ColumnarTable> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {TABLE}"))?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .skip(1)
        .map(String::from)
        .collect();

    let mut trace_ids = Vec::new();
    let mut data: HashMap<String, Vec<f64>> =
        columns.iter().map(|c| (c.clone(), Vec::new())).collect();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        trace_ids.push(row.get::<_, String>(0)?);
        for (i, col) in columns.iter().enumerate() {
            let value: f64 = row.get(i + 1)?;
            if let Some(values) = data.get_mut(col) {
                values.push(value);
            }
        }
    }
    ColumnarTable::new(trace_ids, columns, data)
}
