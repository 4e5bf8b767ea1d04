//! Named maps, resolved by the regions that live on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::graph::Map;
use crate::error::{Error, Result};

/// Every map of a world, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapRegistry {
    maps: BTreeMap<String, Map>,
}

impl MapRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a map under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the name is taken.
    pub fn register(&mut self, map: Map) -> Result<()> {
        if self.maps.contains_key(&map.id) {
            return Err(Error::AlreadyExists(format!("map {}", map.id)));
        }
        self.maps.insert(map.id.clone(), map);
        Ok(())
    }

    /// Look a map up by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<&Map> {
        self.maps.get(name).ok_or_else(|| Error::not_found("map", name))
    }

    /// Mutable lookup by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown name.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Map> {
        self.maps
            .get_mut(name)
            .ok_or_else(|| Error::not_found("map", name))
    }

    /// Maps in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Map> {
        self.maps.values()
    }

    /// Number of registered maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether no map is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Run [`Map::post_load`] on every map.
    pub fn post_load(&mut self) {
        for m in self.maps.values_mut() {
            m.post_load();
        }
    }

    /// Check every map.
    ///
    /// # Errors
    ///
    /// The first [`Error::Consistency`] found.
    pub fn check(&self) -> Result<()> {
        for (name, m) in &self.maps {
            if *name != m.id {
                return Err(Error::consistency(format!(
                    "map registered as {name} is named {}",
                    m.id
                )));
            }
            m.check()?;
        }
        Ok(())
    }

    /// Rebuild the routing table of every stale map.
    pub fn rehash_stale(&mut self) {
        for m in self.maps.values_mut().filter(|m| m.needs_rehash()) {
            m.rehash_parallel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut reg = MapRegistry::new();
        reg.register(Map::new("calaquyr")).unwrap();
        assert!(reg.get("calaquyr").is_ok());
        assert!(matches!(reg.get("nope"), Err(Error::NotFound { .. })));
        assert!(matches!(
            reg.register(Map::new("calaquyr")),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_rehash_stale() {
        let mut reg = MapRegistry::new();
        let mut m = Map::new("m");
        m.cell_create();
        m.cell_create();
        m.road_create(1, 2, true).unwrap();
        reg.register(m).unwrap();
        reg.rehash_stale();
        let m = reg.get("m").unwrap();
        assert!(!m.needs_rehash());
        assert_eq!(m.next_step(1, 2).unwrap(), 2);
    }

    #[test]
    fn test_check_detects_renamed_map() {
        let mut reg = MapRegistry::new();
        reg.register(Map::new("a")).unwrap();
        reg.get_mut("a").unwrap().id = "b".to_string();
        assert!(reg.check().is_err());
    }
}
