use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, EnvironmentError};

use super::{Corridor, Environment, ScriptedEnvironment};

/// Builds fresh environments for one map.
pub trait EnvironmentFactory: Send + Sync {
    /// Builds a fresh, unlaunched environment.
    fn create(&self) -> Result<Box<dyn Environment>, EnvironmentError>;
}

impl<F> EnvironmentFactory for F
where
    F: Fn() -> Result<Box<dyn Environment>, EnvironmentError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Environment>, EnvironmentError> {
        self()
    }
}

/// Registry of available maps.
#[derive(Clone, Default)]
pub struct MapCatalog {
    maps: BTreeMap<String, Arc<dyn EnvironmentFactory>>,
}

impl fmt::Debug for MapCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapCatalog")
            .field("maps", &self.maps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MapCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the environments shipped in this crate.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            ScriptedEnvironment::MAP_ID,
            || -> Result<Box<dyn Environment>, EnvironmentError> {
                Ok(Box::new(ScriptedEnvironment::new(vec![1.0, 2.0, 3.0])))
            },
        );
        catalog.register(
            Corridor::MAP_ID,
            || -> Result<Box<dyn Environment>, EnvironmentError> {
                Ok(Box::new(Corridor::new(Corridor::DEFAULT_LENGTH)))
            },
        );
        catalog
    }

    /// Registers (or replaces) a map.
    pub fn register(&mut self, map: impl Into<String>, factory: impl EnvironmentFactory + 'static) {
        self.maps.insert(map.into(), Arc::new(factory));
    }

    /// Map identifiers, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    /// Returns true if `map` is registered.
    #[must_use]
    pub fn contains(&self, map: &str) -> bool {
        self.maps.contains_key(map)
    }

    /// Looks up the factory for `map`.
    pub fn factory(&self, map: &str) -> Result<Arc<dyn EnvironmentFactory>, ConfigError> {
        self.maps
            .get(map)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownMap {
                map: map.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_maps_are_listed_sorted() {
        let catalog = MapCatalog::builtin();
        assert_eq!(catalog.list(), vec!["Corridor".to_string(), "Scripted".to_string()]);
        assert!(catalog.contains("Scripted"));
    }

    #[test]
    fn unknown_map_is_a_config_error() {
        let catalog = MapCatalog::builtin();
        let err = catalog.factory("Atlantis").err().unwrap();
        assert!(matches!(err, ConfigError::UnknownMap { map } if map == "Atlantis"));
    }

    #[test]
    fn factories_build_fresh_environments() {
        let catalog = MapCatalog::builtin();
        let factory = catalog.factory("Corridor").unwrap();
        let env = factory.create().unwrap();
        assert_eq!(env.observation_width(), 2);
    }
}
