//! Loading and saving a world as a tree of JSON files.
//!
//! ```text
//! <root>/
//!   definitions/config.json      WorldConfig
//!   definitions/units.json       [UnitType]
//!   definitions/buildings.json   [BuildingType]
//!   definitions/knowledge.json   [KnowledgeType]
//!   maps/<name>.json             Map (cells and roads, no routing table)
//!   regions.json                 [{ name, map }]
//!   live/<region>/cities.json    [City] with units, buildings, knowledge, armies
//!   live/<region>/fights.json    [Fight]
//! ```
//!
//! Derived state (routing tables, liege lists, ID counters) is never
//! written; [`World::prepare`] rebuilds it after every load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WorldConfig;
use crate::error::{Error, Result};
use crate::map::{Map, MapRegistry};
use crate::region::{City, Definitions, Fight, Region, World};

/// A place worlds are loaded from and saved to.
pub trait Persistence {
    /// Read a world and run the activation pipeline on it.
    ///
    /// # Errors
    ///
    /// I/O and parse errors, or the first failed [`World::check`].
    fn load(&self) -> Result<World>;

    /// Write every persisted record of `world`.
    ///
    /// # Errors
    ///
    /// I/O and serialization errors.
    fn save(&self, world: &World) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RegionEntry {
    name: String,
    map: String,
}

/// The directory layout described in the module docs.
#[derive(Debug, Clone)]
pub struct JsonDirectory {
    root: PathBuf,
}

impl JsonDirectory {
    /// Use `root`, which need not exist before the first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn definitions(&self) -> PathBuf {
        self.root.join("definitions")
    }

    fn maps(&self) -> PathBuf {
        self.root.join("maps")
    }

    fn live(&self, region: &str) -> Result<PathBuf> {
        Ok(self.root.join("live").join(file_stem(region)?))
    }

    fn load_maps(&self) -> Result<MapRegistry> {
        let mut maps = MapRegistry::new();
        let dir = self.maps();
        if !dir.is_dir() {
            return Ok(maps);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let map: Map = read_json(&path)?;
                maps.register(map)?;
            }
        }
        Ok(maps)
    }
}

impl Persistence for JsonDirectory {
    fn load(&self) -> Result<World> {
        let defs = self.definitions();
        let config = WorldConfig::from_json(&fs::read_to_string(defs.join("config.json"))?)?;
        let definitions = Definitions {
            units: read_json_or_default(&defs.join("units.json"))?,
            buildings: read_json_or_default(&defs.join("buildings.json"))?,
            knowledges: read_json_or_default(&defs.join("knowledge.json"))?,
        };
        let maps = self.load_maps()?;

        let entries: Vec<RegionEntry> = read_json_or_default(&self.root.join("regions.json"))?;
        let mut regions = Vec::with_capacity(entries.len());
        for entry in entries {
            let live = self.live(&entry.name)?;
            let cities: Vec<City> = read_json_or_default(&live.join("cities.json"))?;
            let fights: Vec<Fight> = read_json_or_default(&live.join("fights.json"))?;
            regions.push(Region::from_parts(entry.name, entry.map, cities, fights));
        }

        let mut world = World::from_parts(config, definitions, maps, regions);
        world.prepare()?;
        info!(root = %self.root.display(), "world loaded");
        Ok(world)
    }

    fn save(&self, world: &World) -> Result<()> {
        let defs = self.definitions();
        write_json(&defs.join("config.json"), &world.config)?;
        write_json(&defs.join("units.json"), &world.definitions.units)?;
        write_json(&defs.join("buildings.json"), &world.definitions.buildings)?;
        write_json(&defs.join("knowledge.json"), &world.definitions.knowledges)?;

        for map in world.maps.iter() {
            let path = self.maps().join(format!("{}.json", file_stem(&map.id)?));
            write_json(&path, map)?;
        }

        let entries: Vec<RegionEntry> = world
            .regions()
            .iter()
            .map(|r| RegionEntry {
                name: r.name.clone(),
                map: r.map.clone(),
            })
            .collect();
        write_json(&self.root.join("regions.json"), &entries)?;
        for r in world.regions() {
            let live = self.live(&r.name)?;
            write_json(&live.join("cities.json"), &r.cities())?;
            write_json(&live.join("fights.json"), &r.fights())?;
        }
        info!(root = %self.root.display(), regions = entries.len(), "world saved");
        Ok(())
    }
}

/// Load a world from a [`JsonDirectory`].
///
/// # Errors
///
/// See [`Persistence::load`].
pub fn load_world(root: impl Into<PathBuf>) -> Result<World> {
    JsonDirectory::new(root).load()
}

/// Names become file names: no separators, no parent references.
fn file_stem(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::InvalidArgument(format!(
            "{name:?} cannot be used as a file name"
        )));
    }
    Ok(name)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}
