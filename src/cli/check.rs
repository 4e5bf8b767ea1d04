//! Check command implementation.

use super::CliError;
use hegemon::persist::load_world;
use std::path::Path;

/// Execute the check command.
///
/// # Errors
///
/// Returns an error if the world cannot be loaded or fails a check.
pub(crate) fn execute(dir: &Path) -> Result<(), CliError> {
    let world = load_world(dir)
        .map_err(|e| CliError::new(format!("{}: {e}", dir.display())))?;

    println!("World: {}", dir.display());
    println!();
    println!(
        "Definitions:  {} units, {} buildings, {} knowledge",
        world.definitions.units.len(),
        world.definitions.buildings.len(),
        world.definitions.knowledges.len()
    );
    for map in world.maps.iter() {
        println!(
            "Map {:<10} {} cells, {} roads, {} routes",
            map.id,
            map.cells().len(),
            map.roads().len(),
            map.route_count()
        );
    }
    for region in world.regions() {
        let armies: usize = region
            .cities()
            .iter()
            .map(|c| c.armies().iter().filter(|a| a.is_active()).count())
            .sum();
        println!(
            "Region {:<7} on {}: {} cities, {armies} armies, {} fights",
            region.name,
            region.map,
            region.cities().len(),
            region.fights().len()
        );
    }
    println!();
    println!("Next ID:      {}", world.ids().last() + 1);
    println!("All checks passed.");
    Ok(())
}
