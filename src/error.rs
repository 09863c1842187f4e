use thiserror::Error;

/// Errors surfaced by cache construction, rule search and trace I/O.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid SLA window ({from}, {to}]: from must be strictly below to")]
    InvalidSlaWindow { from: f64, to: f64 },

    #[error("no threshold list configured for backend '{0}'")]
    MissingThresholds(String),

    #[error("invalid thresholds for backend '{backend}': {reason}")]
    InvalidThresholds { backend: String, reason: String },

    #[error("invalid condition on backend {backend}: low={low} high={high}")]
    InvalidCondition {
        backend: usize,
        low: usize,
        high: usize,
    },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("column '{0}' not found in trace table")]
    MissingColumn(String),

    #[error("invalid trace table: {0}")]
    InvalidTraceTable(String),

    #[error("bit chunk merge out of order: expected offset {expected}, found {found}")]
    MisalignedMerge { expected: usize, found: usize },

    #[error("bit vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
