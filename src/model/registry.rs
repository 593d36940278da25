//! Class registry: short class name → entity factory.
//!
//! Documents store the short name of each entity's class. The registry turns
//! that name back into a live entity and keeps a long-name ↔ short-name
//! bijection for callers that speak in fully qualified names. It is an
//! explicit value built at startup and passed to every load/create call site.

use std::collections::BTreeMap;

use super::entity::{ClassTraits, Entity};
use crate::error::RegistryError;
use crate::id::EntityId;

/// Builds a fresh entity of one class under the given id.
pub type EntityFactory = fn(EntityId) -> Entity;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, EntityFactory>,
    long_to_short: BTreeMap<String, String>,
    short_to_long: BTreeMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in architectural classes.
    pub fn with_builtin_classes() -> Self {
        let mut registry = Self::new();
        for (short, long, factory) in BUILTIN_CLASSES {
            // Built-in names are distinct; registration into an empty registry cannot fail.
            if let Err(e) = registry.register_class(short, long, *factory) {
                tracing::warn!("built-in class {short} not registered: {e}");
            }
        }
        registry
    }

    /// Register a class. Re-registering an existing short or long name is
    /// rejected; the first registration stays in effect.
    pub fn register_class(
        &mut self,
        short_name: &str,
        long_name: &str,
        factory: EntityFactory,
    ) -> Result<(), RegistryError> {
        if short_name.is_empty() || long_name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(short_name) || self.short_to_long.contains_key(short_name) {
            return Err(RegistryError::AlreadyRegistered(short_name.to_string()));
        }
        if self.long_to_short.contains_key(long_name) {
            return Err(RegistryError::AlreadyRegistered(long_name.to_string()));
        }
        self.factories.insert(short_name.to_string(), factory);
        self.long_to_short
            .insert(long_name.to_string(), short_name.to_string());
        self.short_to_long
            .insert(short_name.to_string(), long_name.to_string());
        tracing::debug!("registered class {short_name} ({long_name})");
        Ok(())
    }

    pub fn resolve(&self, short_name: &str) -> Option<EntityFactory> {
        self.factories.get(short_name).copied()
    }

    pub fn short_name(&self, long_name: &str) -> Option<&str> {
        self.long_to_short.get(long_name).map(String::as_str)
    }

    pub fn long_name(&self, short_name: &str) -> Option<&str> {
        self.short_to_long.get(short_name).map(String::as_str)
    }

    /// Map either a short or a long name to the registered short name.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some((short, _)) = self.factories.get_key_value(name) {
            return Some(short.as_str());
        }
        self.short_name(name)
    }

    /// Build an entity of the named class. The entity's class name is always
    /// the short name, whatever form the caller used.
    pub fn instantiate(&self, name: &str, id: EntityId) -> Result<Entity, RegistryError> {
        let short = self
            .canonical_name(name)
            .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))?;
        let factory = self
            .resolve(short)
            .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))?;
        let mut entity = factory(id);
        entity.id = id;
        entity.class_name = short.to_string();
        Ok(entity)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

// -- Built-in classes --

pub fn layer(id: EntityId) -> Entity {
    Entity::new(id, "Layer", ClassTraits::HOST)
}

pub fn beam(id: EntityId) -> Entity {
    Entity::new(id, "Beam", ClassTraits::HOST)
}

pub fn wall(id: EntityId) -> Entity {
    Entity::new(id, "Wall", ClassTraits::HOST)
}

pub fn slab(id: EntityId) -> Entity {
    Entity::new(id, "Slab", ClassTraits::HOST)
}

pub fn opening(id: EntityId) -> Entity {
    Entity::new(id, "Opening", ClassTraits::DEPENDENT)
}

pub fn panel(id: EntityId) -> Entity {
    Entity::new(id, "Panel", ClassTraits::DEPENDENT)
}

pub fn custom_model(id: EntityId) -> Entity {
    Entity::new(id, "CustomModel", ClassTraits::DEPENDENT)
}

pub fn wall_content(id: EntityId) -> Entity {
    Entity::new(id, "WallContent", ClassTraits::INDEPENDENT)
}

pub fn pipe_run(id: EntityId) -> Entity {
    Entity::new(id, "PipeRun", ClassTraits::INDEPENDENT)
}

const BUILTIN_CLASSES: &[(&str, &str, EntityFactory)] = &[
    ("Layer", "floorplan.model.Layer", layer),
    ("Beam", "floorplan.model.Beam", beam),
    ("Wall", "floorplan.model.Wall", wall),
    ("Slab", "floorplan.model.Slab", slab),
    ("Opening", "floorplan.model.Opening", opening),
    ("Panel", "floorplan.model.Panel", panel),
    ("CustomModel", "floorplan.model.CustomModel", custom_model),
    ("WallContent", "floorplan.model.WallContent", wall_content),
    ("PipeRun", "floorplan.model.mep.PipeRun", pipe_run),
];
