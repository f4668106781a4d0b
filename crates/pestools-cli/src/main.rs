use anyhow::Context;
use clap::{Parser, Subcommand};
use pestools_log::{read_rec, read_sen};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pestools")]
#[command(about = "Extract iteration histories from PEST run records and sensitivity files", long_about = None)]
struct Cli {
    /// Log extraction progress at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the optimisation history from a run record and emit JSON
    Rec {
        /// Path to the .rec file
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Print the per-iteration phi/variance table instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Extract parameter and composite sensitivities and emit JSON
    Sen {
        /// Path to the .sen file
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Only print the per-group composite sensitivities of this parameter
        #[arg(long, value_name = "NAME")]
        parameter: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Rec { path, summary } => {
            let history = read_rec(path)
                .with_context(|| format!("failed to extract run record {}", path.display()))?;
            log::info!(
                "{}: {} ({} iterations)",
                path.display(),
                history.run_mode,
                history.iteration_count()
            );
            if *summary {
                let table = history.summary().with_context(|| {
                    format!("{} has no completed optimisation iteration", path.display())
                })?;
                print!("{table}");
            } else {
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        }
        Commands::Sen { path, parameter } => {
            let history = read_sen(path).with_context(|| {
                format!("failed to extract sensitivity file {}", path.display())
            })?;
            log::info!(
                "{}: {} parameters, {} observation groups",
                path.display(),
                history.parameter_count(),
                history.observation_groups.len()
            );
            match parameter {
                Some(name) => {
                    let by_group = history.parameter_sensitivity(name).with_context(|| {
                        format!("parameter {name:?} is not listed in {}", path.display())
                    })?;
                    println!("{}", serde_json::to_string_pretty(&by_group)?);
                }
                None => println!("{}", serde_json::to_string_pretty(&history)?),
            }
        }
    }
    Ok(())
}
