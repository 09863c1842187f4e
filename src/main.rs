use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ylatency::config::RunConfig;
use ylatency::data::loader::load_traces;
use ylatency::orchestrator::Orchestrator;
use ylatency::thresholds::{FixedCatalog, SampledCatalog, ThresholdCatalog};
use ylatency::trace::SlaWindow;

#[derive(Parser, Debug)]
#[command(name = "ylatency", about = "Explain SLA violations through backend latency bands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for the rule that best explains the SLA window and print a JSON report.
    Compute(ComputeArgs),
    /// Sample a threshold catalog from observed latencies and print it as JSON.
    Thresholds(ThresholdsArgs),
}

#[derive(Args, Debug)]
struct Input {
    /// JSON trace table `{ "columns": [...], "data": [[...]] }`.
    #[arg(long)]
    traces: PathBuf,
    /// SQLite cache, read when present and written after a JSON load.
    #[arg(long)]
    sqlite: Option<PathBuf>,
    /// Run configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ComputeArgs {
    #[command(flatten)]
    input: Input,
    /// Explicit backend → thresholds catalog as JSON.
    #[arg(long, conflicts_with = "k")]
    thresholds: Option<PathBuf>,
    /// Sample this many thresholds per backend from the observed latencies.
    #[arg(long, default_value_t = 10)]
    k: usize,
    #[arg(long)]
    from: Option<f64>,
    #[arg(long)]
    to: Option<f64>,
    #[arg(long)]
    population: Option<usize>,
    #[arg(long)]
    generations: Option<usize>,
    #[arg(long)]
    mutation: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = false)]
    progress: bool,
}

#[derive(Args, Debug)]
struct ThresholdsArgs {
    #[command(flatten)]
    input: Input,
    #[arg(long, default_value_t = 10)]
    k: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn load_config(input: &Input) -> Result<RunConfig> {
    match &input.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display())),
        None => Ok(RunConfig::default()),
    }
}

fn compute(args: ComputeArgs) -> Result<()> {
    let mut config = load_config(&args.input)?;
    if args.from.is_some() || args.to.is_some() {
        config.sla = SlaWindow::new(
            args.from.unwrap_or(config.sla.from),
            args.to.unwrap_or(config.sla.to),
        )?;
    }
    if let Some(population) = args.population {
        config.ga.population_size = population;
    }
    if let Some(generations) = args.generations {
        config.ga.generations = generations;
    }
    if let Some(mutation) = args.mutation {
        config.ga.mutation_probability = mutation;
    }
    if args.seed.is_some() {
        config.ga.seed = args.seed;
    }
    config.ga.progress |= args.progress;

    let traces = load_traces(&args.input.traces, args.input.sqlite.as_deref(), &config)?;
    info!(traces = traces.len(), backends = traces.backends.len(), "Traces loaded");

    let catalog: Box<dyn ThresholdCatalog> = match &args.thresholds {
        Some(path) => Box::new(
            FixedCatalog::from_file(path)
                .with_context(|| format!("reading thresholds {}", path.display()))?,
        ),
        None => Box::new(SampledCatalog::from_traces(
            &traces,
            args.k,
            config.ga.seed.unwrap_or(0),
        )),
    };

    let orchestrator = Orchestrator::new(config)?;
    let report = orchestrator.run_report(&traces, catalog.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn thresholds(args: ThresholdsArgs) -> Result<()> {
    let config = load_config(&args.input)?;
    let traces = load_traces(&args.input.traces, args.input.sqlite.as_deref(), &config)?;
    let catalog = SampledCatalog::from_traces(&traces, args.k, args.seed).to_fixed();
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Compute(args) => compute(args),
        Command::Thresholds(args) => thresholds(args),
    }
}
