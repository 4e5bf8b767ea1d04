//! Tick command implementation.

use super::{CliError, OutputFormat};
use hegemon::persist::{JsonDirectory, Persistence};
use hegemon::region::TickReport;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// JSON summary of a tick run.
#[derive(Serialize)]
struct JsonTickResult {
    rounds: u32,
    cities: usize,
    taxes: usize,
    moves: usize,
    arrivals: usize,
    blocked: usize,
    fights: usize,
    next_id: u64,
    saved: bool,
}

/// Execute the tick command.
///
/// # Errors
///
/// Returns an error if the world cannot be loaded or saved.
pub(crate) fn execute(
    dir: &Path,
    rounds: u32,
    format: OutputFormat,
    dry_run: bool,
    progress: bool,
) -> Result<(), CliError> {
    let store = JsonDirectory::new(dir);
    let mut world = store.load()?;

    let pb = if progress {
        let pb = ProgressBar::new(u64::from(rounds));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ticks ({per_sec})")
                .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut total = TickReport::default();
    for _ in 0..rounds {
        total += world.tick();
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let elapsed = start.elapsed();

    if !dry_run {
        store.save(&world)?;
    }

    match format {
        OutputFormat::Text => {
            println!("Ticks:     {rounds} in {elapsed:.2?}");
            println!("Cities:    {}", total.cities);
            println!("Taxes:     {}", total.taxes);
            println!("Moves:     {}", total.moves);
            println!("Arrivals:  {}", total.arrivals);
            println!("Blocked:   {}", total.blocked);
            println!("Fights:    {}", total.fights);
            if dry_run {
                println!("World not saved (dry run).");
            } else {
                println!("World saved to {}", dir.display());
            }
        }
        OutputFormat::Json => {
            let result = JsonTickResult {
                rounds,
                cities: total.cities,
                taxes: total.taxes,
                moves: total.moves,
                arrivals: total.arrivals,
                blocked: total.blocked,
                fights: total.fights,
                next_id: world.ids().last() + 1,
                saved: !dry_run,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
