use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::component::{Component, ComponentKind};
use crate::error::ComponentError;
use crate::id::EntityId;

/// Whether an entity can exist without the host it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostDependency {
    /// Cut into or mounted on the host; deleted together with it.
    Dependent,
    /// Meaningful on its own; moved elsewhere when its host goes away.
    Independent,
}

/// Per-class facts supplied by the class factory. Not serialized: loading a
/// document re-derives them from the class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassTraits {
    pub dependency: HostDependency,
    pub accepts_content: bool,
}

impl ClassTraits {
    /// Structural hosts: layers, beams, walls, slabs.
    pub const HOST: ClassTraits = ClassTraits {
        dependency: HostDependency::Independent,
        accepts_content: true,
    };

    /// Openings, mounted panels, anchored models.
    pub const DEPENDENT: ClassTraits = ClassTraits {
        dependency: HostDependency::Dependent,
        accepts_content: false,
    };

    /// Free-standing content that can move between hosts.
    pub const INDEPENDENT: ClassTraits = ClassTraits {
        dependency: HostDependency::Independent,
        accepts_content: false,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub class_name: String,
    pub traits: ClassTraits,
    pub host: Option<EntityId>,
    /// Ids of entities whose `host` is this entity. Maintained by the
    /// document alongside each content's `host` back-reference.
    pub contents: BTreeSet<EntityId>,
    /// Free-form per-entity fields (e.g. {"width": 0.24, "label": "B1"}).
    pub properties: BTreeMap<String, serde_json::Value>,
    components: BTreeMap<ComponentKind, Component>,
}

impl Entity {
    pub fn new(id: EntityId, class_name: impl Into<String>, traits: ClassTraits) -> Self {
        Self {
            id,
            class_name: class_name.into(),
            traits,
            host: None,
            contents: BTreeSet::new(),
            properties: BTreeMap::new(),
            components: BTreeMap::new(),
        }
    }

    pub fn is_dependent(&self) -> bool {
        self.traits.dependency == HostDependency::Dependent
    }

    pub fn accepts_content(&self) -> bool {
        self.traits.accepts_content
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Attach a component, replacing any existing component of the same kind.
    /// Returns the replaced component.
    pub fn set_component(&mut self, component: Component) -> Option<Component> {
        self.components.insert(component.kind(), component)
    }

    pub fn remove_component(&mut self, kind: ComponentKind) -> Option<Component> {
        self.components.remove(&kind)
    }

    /// Serialized form: class name, host link, properties and every component
    /// that asks to be persisted.
    pub fn dump(&self) -> Result<EntityDump, ComponentError> {
        Ok(EntityDump {
            id: self.id,
            class_name: self.class_name.clone(),
            host: self.host,
            properties: self.properties.clone(),
            components: self
                .components
                .values()
                .filter(|c| c.need_dump())
                .map(Component::dump)
                .collect::<Result<Vec<_>, ComponentError>>()?,
        })
    }
}

/// One entity in a saved document. `contents` is not stored; it is rebuilt
/// from the `host` links on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDump {
    pub id: EntityId,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<EntityId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<serde_json::Value>,
}
