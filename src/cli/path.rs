//! Path command implementation.

use super::CliError;
use hegemon::persist::load_world;
use std::path::Path;

/// Execute the path command.
///
/// # Errors
///
/// Returns an error if the world cannot be loaded, the map is unknown, or
/// there is no route.
pub(crate) fn execute(dir: &Path, map: &str, src: u64, dst: u64, max: usize) -> Result<(), CliError> {
    let world = load_world(dir)?;
    let map = world.maps.get(map)?;
    let hops = map.path(src, dst, max)?;

    let route: Vec<String> = std::iter::once(src)
        .chain(hops.iter().copied())
        .map(|c| c.to_string())
        .collect();
    println!("{}", route.join(" -> "));
    if hops.last() != Some(&dst) {
        println!("(truncated after {} hops)", hops.len());
    }
    Ok(())
}
