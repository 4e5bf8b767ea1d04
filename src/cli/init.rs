//! Init command implementation.

use super::CliError;
use hegemon::persist::{JsonDirectory, Persistence};
use hegemon::scenario::Scenario;
use std::path::Path;

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory already holds a world (without
/// `force`), the options are invalid, or the files cannot be written.
pub(crate) fn execute(dir: &Path, scenario: &Scenario, force: bool) -> Result<(), CliError> {
    if !force && dir.join("regions.json").exists() {
        return Err(CliError::new(format!(
            "{} already holds a world (use --force to overwrite)",
            dir.display()
        )));
    }

    let world = scenario.build()?;
    JsonDirectory::new(dir).save(&world)?;

    println!(
        "Created a {}x{} world with {} cities in {}",
        scenario.width,
        scenario.height,
        scenario.cities,
        dir.display()
    );
    if scenario.raids {
        println!("Raids are queued; run `hegemon tick` to play them out.");
    }
    Ok(())
}
