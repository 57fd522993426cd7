//! The `hpath` command: loads a lab configuration, runs it for one or more
//! replications, and prints the resulting KPI report.
//!
//! Usage:
//! - `hpath run --config lab.json --seed 1` - Run a single replication

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hpath_common::error::SimError;
use hpath_model::{Config, Model, Report};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "hpath", version, about = "Histopathology laboratory discrete-event simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its KPI report.
    Run {
        /// Path to the JSON configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Override the configuration's simulated horizon, in hours.
        #[arg(long)]
        sim_hours: Option<f64>,

        /// Override the configuration's replication count.
        #[arg(long)]
        num_reps: Option<u32>,

        /// Base RNG seed. Replication `i` runs with seed `seed + i`.
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Write the report JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print the output JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a configuration file without running it.
    Validate {
        /// Path to the JSON configuration file.
        #[arg()]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("hpath=debug")
    } else {
        tracing_subscriber::EnvFilter::new("hpath=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Run { config, sim_hours, num_reps, seed, output, pretty } => {
            cmd_run(&config, sim_hours, num_reps, seed, output.as_deref(), pretty)
        }
        Commands::Validate { config } => cmd_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] hpath_common::error::ConfigError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("failed to write output to '{path}': {reason}")]
    Write { path: String, reason: String },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn load_config(path: &std::path::Path) -> Result<Config, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(Config::from_json(&text)?)
}

fn cmd_validate(path: &std::path::Path) -> Result<(), CliError> {
    let config = load_config(path)?;
    config.validate()?;
    println!("valid");
    Ok(())
}

fn cmd_run(
    config_path: &std::path::Path,
    sim_hours: Option<f64>,
    num_reps: Option<u32>,
    seed: u64,
    output: Option<&std::path::Path>,
    pretty: bool,
) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    if let Some(h) = sim_hours {
        config.sim_hours = h;
    }
    if let Some(n) = num_reps {
        config.num_reps = n;
    }
    config.validate()?;

    let reps = config.num_reps.max(1);
    tracing::info!(reps, sim_hours = config.sim_hours, "starting run");

    let mut reports = Vec::with_capacity(reps as usize);
    for i in 0..reps {
        let rep_seed = seed.wrapping_add(i as u64);
        tracing::debug!(replication = i, rep_seed, "running replication");
        let model = Model::new(&config, rep_seed).map_err(CliError::from)?;
        let report = model.run().map_err(CliError::from)?;
        reports.push(report);
    }

    let combined = Report::from_replications(&reports);
    let json = if pretty {
        serde_json::to_string_pretty(&combined)?
    } else {
        serde_json::to_string(&combined)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, &json).map_err(|e| CliError::Write {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            tracing::info!(path = %path.display(), "wrote report");
        }
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_file_is_a_read_error() {
        let err = load_config(std::path::Path::new("/nonexistent/path/lab.json")).unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("lab.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
