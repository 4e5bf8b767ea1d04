//! Deterministic worlds for tests, benchmarks and the `init` command.
//!
//! Nothing here is random: the same options always give the same world,
//! IDs included.

use crate::Id;
use crate::config::{TaxTransfer, WorldConfig};
use crate::error::{Error, Result};
use crate::map::{Map, MapRegistry};
use crate::region::{
    Action, BuildingType, Command, Definitions, KnowledgeType, ResourceModifiers, Resources,
    ResourcesIncrement, ResourcesMultiplier, UnitType, World,
};

/// Basic infantry, trainable anywhere.
pub const SOLDIER: Id = 1;
/// Heavy unit, needs barracks.
pub const KNIGHT: Id = 2;
/// Adds food production.
pub const FARM: Id = 3;
/// Unique building unlocking knights.
pub const BARRACKS: Id = 4;
/// First knowledge.
pub const WRITING: Id = 5;
/// Needs writing; raises stock capacity.
pub const MASONRY: Id = 6;

/// Name of the map built by [`Scenario::build`].
pub const MAP: &str = "grid";
/// Name of the region built by [`Scenario::build`].
pub const REGION: &str = "main";

/// Two-way 4-neighbour grid. Cell `(x, y)` gets ID `y * width + x + 1`.
#[must_use]
pub fn grid_map(name: &str, width: u64, height: u64) -> Map {
    let mut map = Map::new(name);
    for y in 0..height {
        for x in 0..width {
            let cell = map.cell_create();
            cell.x = x;
            cell.y = y;
        }
    }
    let id = |x: u64, y: u64| y * width + x + 1;
    for y in 0..height {
        for x in 0..width {
            let here = id(x, y);
            let mut link = |there: Id| {
                // Grid IDs are never zero and never equal.
                let _ = map.road_create_raw(here, there);
                let _ = map.road_create_raw(there, here);
            };
            if x + 1 < width {
                link(id(x + 1, y));
            }
            if y + 1 < height {
                link(id(x, y + 1));
            }
        }
    }
    map.post_load();
    map
}

/// A small but complete set of types.
#[must_use]
pub fn standard_definitions() -> Definitions {
    let food = |n: u64| Resources([n, 0, 0, 0, 0, 0]);
    let mut farm = ResourceModifiers::noop();
    farm.plus = ResourcesIncrement([10, 0, 0, 0, 0, 0]);
    let mut masonry = ResourceModifiers::noop();
    masonry.mult = ResourcesMultiplier::uniform(1.5);

    Definitions {
        units: vec![
            UnitType {
                id: SOLDIER,
                name: "soldier".into(),
                health: 10,
                ticks: 2,
                cost: food(2),
                pop_bonus: 0,
                pop_bonus_train: 1,
                pop_required: 0,
                required_building: None,
            },
            UnitType {
                id: KNIGHT,
                name: "knight".into(),
                health: 30,
                ticks: 4,
                cost: Resources([3, 2, 0, 0, 0, 0]),
                pop_bonus: 1,
                pop_bonus_train: 2,
                pop_required: 5,
                required_building: Some(BARRACKS),
            },
        ],
        buildings: vec![
            BuildingType {
                id: FARM,
                name: "farm".into(),
                ticks: 3,
                cost0: food(10),
                cost: food(1),
                unique: false,
                pop_required: 0,
                pop_bonus: 1,
                pop_bonus_build: 1,
                stock: ResourceModifiers::noop(),
                prod: farm,
                requires: vec![],
                conflicts: vec![],
            },
            BuildingType {
                id: BARRACKS,
                name: "barracks".into(),
                ticks: 5,
                cost0: Resources([20, 10, 0, 0, 0, 0]),
                cost: food(2),
                unique: true,
                pop_required: 2,
                pop_bonus: 0,
                pop_bonus_build: 3,
                stock: ResourceModifiers::noop(),
                prod: ResourceModifiers::noop(),
                requires: vec![],
                conflicts: vec![],
            },
        ],
        knowledges: vec![
            KnowledgeType {
                id: WRITING,
                name: "writing".into(),
                ticks: 3,
                cost: Resources([0, 0, 1, 0, 0, 0]),
                pop_bonus: 1,
                pop_bonus_learn: 2,
                stock: ResourceModifiers::noop(),
                prod: ResourceModifiers::noop(),
                requires: vec![],
                conflicts: vec![],
            },
            KnowledgeType {
                id: MASONRY,
                name: "masonry".into(),
                ticks: 4,
                cost: Resources([0, 1, 1, 0, 0, 0]),
                pop_bonus: 0,
                pop_bonus_learn: 1,
                stock: masonry,
                prod: ResourceModifiers::noop(),
                requires: vec![WRITING],
                conflicts: vec![],
            },
        ],
    }
}

/// Knobs of a generated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// Grid width.
    pub width: u64,
    /// Grid height.
    pub height: u64,
    /// Cities, spread evenly over the cells.
    pub cities: usize,
    /// Trained soldiers in each garrison.
    pub garrison: usize,
    /// Tax strategy of the world.
    pub tax_transfer: TaxTransfer,
    /// Every odd city marches its garrison on the previous city.
    pub raids: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
            cities: 4,
            garrison: 3,
            tax_transfer: TaxTransfer::Instant,
            raids: false,
        }
    }
}

impl Scenario {
    /// Build and prepare the world.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the cities do not fit on the grid,
    /// plus anything [`World::prepare`] reports.
    pub fn build(&self) -> Result<World> {
        let cells = self.width.saturating_mul(self.height);
        let cities = u64::try_from(self.cities)
            .map_err(|_| Error::InvalidArgument("too many cities".to_string()))?;
        if cities == 0 || cities > cells {
            return Err(Error::InvalidArgument(format!(
                "{cities} cities do not fit on {cells} cells"
            )));
        }

        let mut maps = MapRegistry::new();
        maps.register(grid_map(MAP, self.width, self.height))?;
        let mut world = World::from_parts(
            WorldConfig::new(self.tax_transfer),
            standard_definitions(),
            maps,
            Vec::new(),
        );
        world.prepare()?;
        world.region_create(REGION, MAP)?;

        let step = cells / cities;
        let mut placed = Vec::with_capacity(self.cities);
        for i in 0..cities {
            let cell = 1 + i * step;
            let id = world.city_create(REGION, cell, i + 1, &format!("city-{}", i + 1))?;
            placed.push(id);
        }

        let r = world.region_mut(REGION)?;
        for &id in &placed {
            let c = r.region.require_city_mut(id)?;
            c.production = Resources([20, 10, 5, 5, 2, 1]);
            c.stock_capacity = Resources::uniform(500);
            c.stock = Resources([50, 20, 10, 0, 0, 0]);
            for _ in 0..self.garrison {
                let unit = c.train(&r.rules, SOLDIER)?;
                c.unit_finish(unit)?;
            }
        }

        if self.raids && self.garrison > 0 {
            for pair in placed.chunks_exact(2) {
                let (target, raider) = (pair[0], pair[1]);
                let cell = r
                    .region
                    .city(target)
                    .map(|c| c.cell)
                    .ok_or_else(|| Error::not_found("city", target))?;
                let army = r
                    .region
                    .require_city_mut(raider)?
                    .create_army_defence(&r.rules)?;
                r.region.defer(
                    r.map,
                    army,
                    Command {
                        cell,
                        action: Action::Overlord,
                    },
                )?;
            }
        }
        Ok(world)
    }
}
