//! Dot command implementation.

use super::CliError;
use hegemon::persist::load_world;
use std::path::Path;

/// Execute the dot command.
///
/// # Errors
///
/// Returns an error if the world cannot be loaded or the map is unknown.
pub(crate) fn execute(dir: &Path, map: &str) -> Result<(), CliError> {
    let world = load_world(dir)?;
    print!("{}", world.maps.get(map)?.dot());
    Ok(())
}
