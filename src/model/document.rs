use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::component::{Component, ComponentKind};
use super::entity::{Entity, EntityDump};
use super::registry::Registry;
use super::signal::{Signal, SignalKind};
use crate::error::{DocumentError, RegistryError};
use crate::id::{EntityId, IdPool};

/// The entity/component graph being edited.
///
/// Entities link to each other by id only: a content item records its `host`
/// and the host records the item in `contents`. The document keeps both
/// sides in step and owns the id pool, so every live entity id is
/// outstanding in the pool and every destroyed id is recycled.
#[derive(Debug, Clone)]
pub struct Document {
    entities: BTreeMap<EntityId, Entity>,
    ids: IdPool,
    dirty: BTreeSet<EntityId>,
    signals: Vec<Signal>,
    emit_signals: bool,
}

impl Document {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            ids: IdPool::new(),
            dirty: BTreeSet::new(),
            signals: Vec::new(),
            emit_signals: true,
        }
    }

    pub fn set_emit_signals(&mut self, emit: bool) {
        self.emit_signals = emit;
        if !emit {
            self.signals.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity(&self, id: EntityId) -> Result<&Entity, DocumentError> {
        self.entities
            .get(&id)
            .ok_or(DocumentError::EntityNotFound(id))
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, DocumentError> {
        self.entities
            .get_mut(&id)
            .ok_or(DocumentError::EntityNotFound(id))
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> &IdPool {
        &self.ids
    }

    // -- Lifecycle --

    /// Create an entity of the named class (short or long name) with a fresh id.
    pub fn create_entity(
        &mut self,
        registry: &Registry,
        class_name: &str,
    ) -> Result<EntityId, DocumentError> {
        // Instantiate first so an unknown class does not consume an id.
        let entity = registry.instantiate(class_name, 0)?;
        self.allocate(entity)
    }

    /// Give `entity` a fresh id and add it to the document. Any `host` or
    /// `contents` on the prototype are cleared; link it with [`set_host`].
    ///
    /// [`set_host`]: Document::set_host
    pub fn allocate(&mut self, mut entity: Entity) -> Result<EntityId, DocumentError> {
        let id = self.ids.next_id()?;
        entity.id = id;
        entity.host = None;
        entity.contents.clear();
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Add an entity under its own id, claiming that id from the pool.
    /// Links are taken as-is; callers restore hosts and contents together.
    pub fn insert_entity(&mut self, entity: Entity) -> Result<(), DocumentError> {
        if self.entities.contains_key(&entity.id) {
            return Err(DocumentError::DuplicateEntity(entity.id));
        }
        self.ids.reserve(entity.id)?;
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Put a snapshot back: overwrite the live entity with the same id, or
    /// insert it if it is gone.
    pub fn restore_entity(&mut self, entity: Entity) -> Result<(), DocumentError> {
        match self.entities.get_mut(&entity.id) {
            Some(live) => {
                *live = entity;
                Ok(())
            }
            None => self.insert_entity(entity),
        }
    }

    /// Remove an entity without touching the links of other entities and
    /// recycle its id. Used when rewinding to a snapshot.
    pub fn evict_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.ids.recycle(id);
        self.dirty.remove(&id);
        Some(entity)
    }

    /// Remove an entity and its components, unlink it from its host and
    /// recycle its id. Entities that still host content must be emptied first.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<Entity, DocumentError> {
        let entity = self.entity(id)?;
        if !entity.contents.is_empty() {
            return Err(DocumentError::HasContents {
                entity: id,
                count: entity.contents.len(),
            });
        }
        if let Some(host) = entity.host
            && let Some(host) = self.entities.get_mut(&host)
        {
            host.contents.remove(&id);
        }
        self.evict_entity(id).ok_or(DocumentError::EntityNotFound(id))
    }

    // -- Components and fields --

    /// Attach a component, replacing any existing one of the same kind.
    pub fn attach_component(
        &mut self,
        id: EntityId,
        component: Component,
    ) -> Result<Option<Component>, DocumentError> {
        Ok(self.entity_mut(id)?.set_component(component))
    }

    pub fn detach_component(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
    ) -> Result<Component, DocumentError> {
        self.entity_mut(id)?
            .remove_component(kind)
            .ok_or(DocumentError::ComponentNotFound { entity: id, kind })
    }

    pub fn component(&self, id: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.entities.get(&id)?.component(kind)
    }

    fn require_component(
        &self,
        id: EntityId,
        kind: ComponentKind,
    ) -> Result<&Component, DocumentError> {
        self.entity(id)?
            .component(kind)
            .ok_or(DocumentError::ComponentNotFound { entity: id, kind })
    }

    pub fn component_field(
        &self,
        id: EntityId,
        kind: ComponentKind,
        field: &str,
    ) -> Result<Value, DocumentError> {
        Ok(self.require_component(id, kind)?.field(field)?)
    }

    /// Replace one field of a component. Returns the previous value.
    pub fn set_component_field(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
        field: &str,
        value: Value,
    ) -> Result<Value, DocumentError> {
        let current = self.require_component(id, kind)?;
        let old = current.field(field)?;
        let edited = current.with_field(field, value)?;
        self.entity_mut(id)?.set_component(edited);
        Ok(old)
    }

    /// Set (`Some`) or clear (`None`) a property. Returns the previous value.
    pub fn set_property(
        &mut self,
        id: EntityId,
        key: &str,
        value: Option<Value>,
    ) -> Result<Option<Value>, DocumentError> {
        let entity = self.entity_mut(id)?;
        Ok(match value {
            Some(value) => entity.properties.insert(key.to_string(), value),
            None => entity.properties.remove(key),
        })
    }

    // -- Hosting --

    /// Check that `entity` may be hosted by `host` without breaking the tree.
    pub fn check_host(&self, entity: EntityId, host: Option<EntityId>) -> Result<(), DocumentError> {
        self.entity(entity)?;
        let Some(host) = host else {
            return Ok(());
        };
        let target = self.entity(host)?;
        if !target.accepts_content() {
            return Err(DocumentError::HostRejectsContent {
                host,
                class_name: target.class_name.clone(),
            });
        }
        let mut cursor = Some(host);
        while let Some(current) = cursor {
            if current == entity {
                return Err(DocumentError::HostCycle { entity, host });
            }
            cursor = self.entities.get(&current).and_then(|e| e.host);
        }
        Ok(())
    }

    /// Move `entity` under `host` (or detach it with `None`).
    pub fn set_host(&mut self, entity: EntityId, host: Option<EntityId>) -> Result<(), DocumentError> {
        self.check_host(entity, host)?;
        let old = self.entity(entity)?.host;
        if old == host {
            return Ok(());
        }
        if let Some(old) = old
            && let Some(old) = self.entities.get_mut(&old)
        {
            old.contents.remove(&entity);
        }
        if let Some(host) = host {
            self.entity_mut(host)?.contents.insert(entity);
        }
        self.entity_mut(entity)?.host = host;
        Ok(())
    }

    /// `id` followed by everything it hosts, depth first, contents in id order.
    pub fn subtree(&self, id: EntityId) -> Result<Vec<EntityId>, DocumentError> {
        self.entity(id)?;
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some(entity) = self.entities.get(&current) {
                stack.extend(entity.contents.iter().rev());
            }
        }
        Ok(order)
    }

    /// Hosts of `id`, nearest first.
    pub fn ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut cursor = self.entities.get(&id).and_then(|e| e.host);
        while let Some(current) = cursor {
            if chain.contains(&current) {
                break;
            }
            chain.push(current);
            cursor = self.entities.get(&current).and_then(|e| e.host);
        }
        chain
    }

    // -- Dirty flags and notifications --

    pub fn mark_dirty(&mut self, id: EntityId) {
        if self.entities.contains_key(&id) {
            self.dirty.insert(id);
        }
    }

    pub fn is_dirty(&self, id: EntityId) -> bool {
        self.dirty.contains(&id)
    }

    /// Hand the dirty set to whoever recomputes derived state.
    pub fn take_dirty(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Queue a signal and flag the entity for lazy recomputation.
    pub fn notify(&mut self, request_id: u64, kind: SignalKind) {
        if !matches!(kind, SignalKind::EntityRemoved { .. }) {
            self.mark_dirty(kind.entity_id());
        }
        if self.emit_signals {
            self.signals.push(Signal { request_id, kind });
        }
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn drain_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }

    // -- Persistence --

    pub fn dump_entity(&self, id: EntityId) -> Result<EntityDump, DocumentError> {
        Ok(self.entity(id)?.dump()?)
    }

    /// Every entity in id order.
    pub fn dump(&self) -> Result<Vec<EntityDump>, DocumentError> {
        self.entities
            .values()
            .map(|entity| entity.dump().map_err(DocumentError::from))
            .collect()
    }

    /// Rebuild a document from entity dumps. Class names may be short or
    /// long; components are loaded by their `tp` tag; hosts are linked once
    /// every entity exists.
    pub fn load(
        registry: &Registry,
        dumps: impl IntoIterator<Item = EntityDump>,
    ) -> Result<Self, DocumentError> {
        let mut document = Self::new();
        let mut links = Vec::new();
        for dump in dumps {
            let mut entity = registry.instantiate(&dump.class_name, dump.id)?;
            entity.properties = dump.properties;
            for data in &dump.components {
                entity.set_component(Component::load(data, dump.id)?);
            }
            if let Some(host) = dump.host {
                links.push((dump.id, host));
            }
            document.insert_entity(entity)?;
        }
        for (id, host) in links {
            document.set_host(id, Some(host))?;
        }
        tracing::debug!("loaded document with {} entities", document.len());
        Ok(document)
    }

    pub fn to_json(&self) -> Result<Value, DocumentError> {
        Ok(serde_json::to_value(self.dump()?)?)
    }

    pub fn from_json(registry: &Registry, data: &Value) -> Result<Self, DocumentError> {
        let dumps: Vec<EntityDump> = serde_json::from_value(data.clone())?;
        Self::load(registry, dumps)
    }

    /// Resolve a class name against the registry without creating anything.
    pub fn validate_class(registry: &Registry, class_name: &str) -> Result<(), DocumentError> {
        registry
            .canonical_name(class_name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownClass(class_name.to_string()).into())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
