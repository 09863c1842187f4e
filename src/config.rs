use std::fs::File;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::trace::SlaWindow;

/// Genetic search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Probability an offspring comes from mutation; crossover takes the rest.
    pub mutation_probability: f64,
    pub tournament_size: usize,
    /// Random conditions drawn for each initial individual.
    pub initial_conditions: usize,
    pub seed: Option<u64>,
    /// Wall-clock stop, checked between generations.
    pub time_budget_secs: Option<f64>,
    pub progress: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 400,
            mutation_probability: 0.2,
            tournament_size: 20,
            initial_conditions: 2,
            seed: None,
            time_budget_secs: None,
            progress: false,
        }
    }
}

impl GaConfig {
    pub fn crossover_probability(&self) -> f64 {
        1.0 - self.mutation_probability
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(Error::InvalidConfig("population_size must be > 0".into()));
        }
        if self.tournament_size == 0 {
            return Err(Error::InvalidConfig("tournament_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(Error::InvalidConfig(format!(
                "mutation_probability {} outside [0, 1]",
                self.mutation_probability
            )));
        }
        if let Some(secs) = self.time_budget_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(Error::InvalidConfig(format!("time budget {secs}s is not usable")));
            }
        }
        Ok(())
    }
}

/// Partitioning of cache construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Traces per partition-local bit chunk.
    pub chunk_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

/// Everything a single rule search needs besides the traces and catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub trace_id_column: String,
    pub frontend_column: String,
    /// Backends to search over; empty means every latency column.
    pub backends: Vec<String>,
    pub sla: SlaWindow,
    pub ga: GaConfig,
    pub cache: CacheConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trace_id_column: "traceId".into(),
            frontend_column: "frontend".into(),
            backends: Vec::new(),
            sla: SlaWindow {
                from: 0.0,
                to: f64::MAX,
            },
            ga: GaConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: RunConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sla.validate()?;
        self.ga.validate()?;
        if self.cache.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        Ok(())
    }
}
