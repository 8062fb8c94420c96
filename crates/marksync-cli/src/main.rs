use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marksync_cli::cli::{parse_script, resolve_config, Simulation};
use marksync_cli::tracing_setup::init_tracing;

#[derive(Parser)]
#[command(name = "marksync")]
#[command(about = "Bookmark list sync across tabs and devices")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (relayChannel, feedChannel, schema, table)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON-lines script of tab, device and backend steps
    Simulate {
        /// Script file, one step per line
        script: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate { script } => {
            let text = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script: {}", script.display()))?;
            let steps = parse_script(&text)?;
            let mut simulation = Simulation::new(config);
            simulation.run(&steps).await?;
            print_json(&simulation.report(), cli.pretty)?;
        }
        Commands::Config => {
            print_json(&config, cli.pretty)?;
        }
    }

    Ok(())
}
