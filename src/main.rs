//! Hegemon CLI - inspect, route and tick persisted worlds.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Hegemon - region simulation for a persistent-world strategy game
#[derive(Parser, Debug)]
#[command(name = "hegemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a world and run every consistency check
    Check {
        /// World directory
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// Print the route between two cells
    Path {
        /// World directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Map name
        #[arg(short, long)]
        map: String,

        /// Source cell
        src: u64,

        /// Destination cell
        dst: u64,

        /// Stop after this many hops (0: no limit)
        #[arg(long, default_value = "0")]
        max: usize,
    },

    /// Print a map in Graphviz format
    Dot {
        /// World directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Map name
        #[arg(short, long)]
        map: String,
    },

    /// Advance a world and save it back
    Tick {
        /// World directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Number of ticks (default: 1)
        #[arg(short, long, default_value = "1")]
        rounds: u32,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Do not write the world back
        #[arg(long)]
        dry_run: bool,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Generate a grid world
    Init {
        /// Target directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Grid width (default: 8)
        #[arg(long, default_value = "8")]
        width: u64,

        /// Grid height (default: 8)
        #[arg(long, default_value = "8")]
        height: u64,

        /// Number of cities (default: 4)
        #[arg(short, long, default_value = "4")]
        cities: usize,

        /// Trained soldiers per city (default: 3)
        #[arg(short, long, default_value = "3")]
        garrison: usize,

        /// Walk taxes to the overlord instead of crediting them
        #[arg(long)]
        transport: bool,

        /// Queue raids between neighbouring cities
        #[arg(long)]
        raids: bool,

        /// Overwrite an existing world
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hegemon=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Check { dir } => cli::check::execute(&dir),

        Commands::Path {
            dir,
            map,
            src,
            dst,
            max,
        } => cli::path::execute(&dir, &map, src, dst, max),

        Commands::Dot { dir, map } => cli::dot::execute(&dir, &map),

        Commands::Tick {
            dir,
            rounds,
            format,
            dry_run,
            progress,
        } => cli::tick::execute(&dir, rounds, format, dry_run, progress),

        Commands::Init {
            dir,
            width,
            height,
            cities,
            garrison,
            transport,
            raids,
            force,
        } => cli::init::execute(
            &dir,
            &hegemon::scenario::Scenario {
                width,
                height,
                cities,
                garrison,
                tax_transfer: if transport {
                    hegemon::TaxTransfer::Transport
                } else {
                    hegemon::TaxTransfer::Instant
                },
                raids,
            },
            force,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
