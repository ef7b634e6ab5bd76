//! Lean production line simulator
//!
//! Runs the line with the default model (or a JSON config) and prints lead
//! time, value-added time and the value-added ratio per item.

use clap::Parser;
use lean_line_sim::line::{ConcurrencyMode, LineConfig, LineError, LineSimulation, ReplicationSummary};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lean_line")]
#[command(about = "Discrete-event simulation of a lean production line")]
#[command(version)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of items fed into the line
    #[arg(long)]
    items: Option<usize>,

    /// Minutes between arrivals (0 = all at once)
    #[arg(long)]
    interval: Option<f64>,

    /// Probability that an item fails inspection (0.0 to 1.0)
    #[arg(long)]
    failure_rate: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated minutes to run
    #[arg(long, conflicts_with = "no_limit")]
    until: Option<f64>,

    /// Run until every item is finished
    #[arg(long)]
    no_limit: bool,

    /// Independent replications (seeds seed, seed+1, ...)
    #[arg(long)]
    replications: Option<usize>,

    /// Run replications on the Rayon thread pool
    #[arg(long)]
    parallel: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(LineConfig, bool), LineError> {
        let mut config = match &self.config {
            Some(path) => LineConfig::from_json_file(path)?,
            None => LineConfig::default(),
        };

        if let Some(items) = self.items {
            config = config.with_item_count(items);
        }
        if let Some(interval) = self.interval {
            config = config.with_arrival_interval(interval);
        }
        if let Some(rate) = self.failure_rate {
            config = config.with_failure_rate(rate);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(until) = self.until {
            config = config.with_time_limit(Some(until));
        }
        if self.no_limit {
            config = config.with_time_limit(None);
        }
        if let Some(replications) = self.replications {
            config = config.with_replications(replications);
        }
        if self.parallel {
            config = config.with_concurrency(ConcurrencyMode::Rayon);
        }

        Ok((config, self.json))
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (config, json) = cli.into_config()?;
    let line = LineSimulation::new(config)?;

    if line.config().replications == 1 {
        let report = line.run()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Lean manufacturing simulation");
            println!();
            print!("{}", report);
        }
        return Ok(());
    }

    let reports = line.run_replications()?;
    let summary = ReplicationSummary::from_reports(&reports);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Lean manufacturing simulation");
        println!();
        print!("{}", summary);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
