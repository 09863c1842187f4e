pub mod config;
pub mod error;
pub mod orchestrator;
pub mod thresholds;
pub mod trace;

pub mod cache {
    pub mod bitvec;
    pub mod builder;
}

pub mod data {
    pub mod columnar;
    pub mod loader;
    pub mod sqlite;
}

pub mod ga {
    pub mod individual;
    pub mod operators;
    pub mod optimizer;
}

pub mod metrics {
    pub mod fitness;
}

pub use error::{Error, Result};
