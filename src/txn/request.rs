//! Atomic, reversible mutations against a [`Document`].
//!
//! A request captures a `before` snapshot when it is created and refreshes it
//! at commit, which runs validate → mutate → capture `after` → notify. Undo
//! and redo restore the two snapshots. Field-level edits
//! snapshot only the touched field; structural edits snapshot every entity
//! whose links change.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{DocumentError, TxnError};
use crate::id::EntityId;
use crate::model::component::{Component, ComponentKind};
use crate::model::document::Document;
use crate::model::entity::Entity;
use crate::model::registry::Registry;
use crate::model::signal::SignalKind;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Committed,
    Undone,
    Discarded,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::Committed => "committed",
            RequestState::Undone => "undone",
            RequestState::Discarded => "discarded",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The edit a request performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateEntity {
        class_name: String,
        host: Option<EntityId>,
    },
    /// Deletes the entity and everything it hosts.
    DeleteEntity {
        entity: EntityId,
    },
    SetHost {
        entity: EntityId,
        host: Option<EntityId>,
    },
    /// Whole-component write; replaces any component of the same kind.
    AttachComponent {
        entity: EntityId,
        component: Component,
    },
    DetachComponent {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// Partial edit of one component field. Only allowed on kinds that
    /// report `can_transact_field()`.
    SetComponentField {
        entity: EntityId,
        kind: ComponentKind,
        field: String,
        value: Value,
    },
    SetProperty {
        entity: EntityId,
        key: String,
        value: Option<Value>,
    },
}

impl Mutation {
    /// Short label used for history presentation and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::CreateEntity { .. } => "create_entity",
            Mutation::DeleteEntity { .. } => "delete_entity",
            Mutation::SetHost { .. } => "set_host",
            Mutation::AttachComponent { .. } => "attach_component",
            Mutation::DetachComponent { .. } => "detach_component",
            Mutation::SetComponentField { .. } => "set_component_field",
            Mutation::SetProperty { .. } => "set_property",
        }
    }

    fn validate(&self, doc: &Document) -> Result<(), TxnError> {
        match self {
            Mutation::CreateEntity { host, .. } => {
                if let Some(host) = host {
                    let target = doc.entity(*host)?;
                    if !target.accepts_content() {
                        return Err(DocumentError::HostRejectsContent {
                            host: *host,
                            class_name: target.class_name.clone(),
                        }
                        .into());
                    }
                }
            }
            Mutation::DeleteEntity { entity } | Mutation::AttachComponent { entity, .. } => {
                doc.entity(*entity)?;
            }
            Mutation::SetHost { entity, host } => doc.check_host(*entity, *host)?,
            Mutation::DetachComponent { entity, kind } => {
                if doc.entity(*entity)?.component(*kind).is_none() {
                    return Err(DocumentError::ComponentNotFound {
                        entity: *entity,
                        kind: *kind,
                    }
                    .into());
                }
            }
            Mutation::SetComponentField {
                entity,
                kind,
                field,
                value,
            } => {
                let component = doc.entity(*entity)?.component(*kind).ok_or(
                    DocumentError::ComponentNotFound {
                        entity: *entity,
                        kind: *kind,
                    },
                )?;
                if !component.can_transact_field() {
                    return Err(TxnError::FieldTransactionRejected {
                        entity: *entity,
                        kind: *kind,
                    });
                }
                component
                    .with_field(field, value.clone())
                    .map_err(DocumentError::from)?;
            }
            Mutation::SetProperty { entity, .. } => {
                doc.entity(*entity)?;
            }
        }
        Ok(())
    }

    /// Entities whose state this mutation can change.
    fn targets(&self, doc: &Document) -> Result<Vec<EntityId>, TxnError> {
        let mut ids: Vec<EntityId> = match self {
            Mutation::CreateEntity { host, .. } => host.iter().copied().collect(),
            Mutation::DeleteEntity { entity } => {
                let mut ids = doc.subtree(*entity)?;
                ids.extend(doc.entity(*entity)?.host);
                ids
            }
            Mutation::SetHost { entity, host } => {
                let mut ids = vec![*entity];
                ids.extend(doc.entity(*entity)?.host);
                ids.extend(*host);
                ids
            }
            Mutation::AttachComponent { entity, .. }
            | Mutation::DetachComponent { entity, .. }
            | Mutation::SetComponentField { entity, .. }
            | Mutation::SetProperty { entity, .. } => vec![*entity],
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Snapshot {
    Field {
        entity: EntityId,
        kind: ComponentKind,
        field: String,
        value: Value,
    },
    Property {
        entity: EntityId,
        key: String,
        value: Option<Value>,
    },
    /// `None` means the entity did not exist.
    Entities(BTreeMap<EntityId, Option<Entity>>),
}

impl Snapshot {
    fn capture(mutation: &Mutation, targets: &[EntityId], doc: &Document) -> Result<Self, TxnError> {
        Ok(match mutation {
            Mutation::SetComponentField {
                entity, kind, field, ..
            } => Snapshot::Field {
                entity: *entity,
                kind: *kind,
                field: field.clone(),
                value: doc.component_field(*entity, *kind, field)?,
            },
            Mutation::SetProperty { entity, key, .. } => Snapshot::Property {
                entity: *entity,
                key: key.clone(),
                value: doc.entity(*entity)?.properties.get(key).cloned(),
            },
            _ => Snapshot::Entities(
                targets
                    .iter()
                    .map(|id| (*id, doc.get(*id).cloned()))
                    .collect(),
            ),
        })
    }

    fn restore(&self, doc: &mut Document) -> Result<(), DocumentError> {
        match self {
            Snapshot::Field {
                entity,
                kind,
                field,
                value,
            } => {
                doc.set_component_field(*entity, *kind, field, value.clone())?;
            }
            Snapshot::Property { entity, key, value } => {
                doc.set_property(*entity, key, value.clone())?;
            }
            Snapshot::Entities(entities) => {
                // Evict first so ids freed by the snapshot are available to
                // entities it brings back.
                for (id, state) in entities {
                    if state.is_none() {
                        doc.evict_entity(*id);
                    }
                }
                for state in entities.values().flatten() {
                    doc.restore_entity(state.clone())?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    mutation: Mutation,
    target_ids: Vec<EntityId>,
    /// Class instance for `CreateEntity`, resolved when the request is built.
    prototype: Option<Entity>,
    before: Snapshot,
    after: Option<Snapshot>,
    state: RequestState,
    result: Option<EntityId>,
}

impl Request {
    /// Validate `mutation` against the current document and capture the
    /// state it is about to change.
    pub fn new(
        id: RequestId,
        doc: &Document,
        registry: &Registry,
        mutation: Mutation,
    ) -> Result<Self, TxnError> {
        let prototype = match &mutation {
            Mutation::CreateEntity { class_name, .. } => Some(
                registry
                    .instantiate(class_name, 0)
                    .map_err(DocumentError::from)?,
            ),
            _ => None,
        };
        mutation.validate(doc)?;
        let target_ids = mutation.targets(doc)?;
        let before = Snapshot::capture(&mutation, &target_ids, doc)?;
        Ok(Self {
            id,
            mutation,
            target_ids,
            prototype,
            before,
            after: None,
            state: RequestState::Created,
            result: None,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_committed(&self) -> bool {
        self.state == RequestState::Committed
    }

    pub fn target_ids(&self) -> &[EntityId] {
        &self.target_ids
    }

    /// The entity a `CreateEntity` request produced, once committed.
    pub fn result(&self) -> Option<EntityId> {
        self.result
    }

    fn expect_state(&self, expected: RequestState, action: &'static str) -> Result<(), TxnError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TxnError::IncorrectInvocation {
                action,
                state: self.state,
            })
        }
    }

    pub fn commit(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        self.expect_state(RequestState::Created, "commit")?;
        self.mutation.validate(doc)?;
        // The document may have moved on since creation.
        self.target_ids = self.mutation.targets(doc)?;
        self.before = Snapshot::capture(&self.mutation, &self.target_ids, doc)?;
        if let Err(err) = self.mutate(doc) {
            if let Err(rollback) = self.before.restore(doc) {
                tracing::warn!("request {}: rollback after failed commit: {rollback}", self.id);
            }
            self.forget_allocation();
            return Err(err);
        }
        let after = Snapshot::capture(&self.mutation, &self.target_ids, doc)?;
        notify(self.id, doc, &after, Some(&self.before));
        self.after = Some(after);
        self.state = RequestState::Committed;
        tracing::debug!(
            "request {} committed: {} on {:?}",
            self.id,
            self.mutation.label(),
            self.target_ids
        );
        Ok(())
    }

    pub fn undo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        self.expect_state(RequestState::Committed, "undo")?;
        self.before.restore(doc)?;
        notify(self.id, doc, &self.before, self.after.as_ref());
        self.state = RequestState::Undone;
        tracing::debug!("request {} undone", self.id);
        Ok(())
    }

    pub fn redo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        self.expect_state(RequestState::Undone, "redo")?;
        let Some(after) = &self.after else {
            return Err(TxnError::IncorrectInvocation {
                action: "redo",
                state: self.state,
            });
        };
        after.restore(doc)?;
        notify(self.id, doc, after, Some(&self.before));
        self.state = RequestState::Committed;
        tracing::debug!("request {} redone", self.id);
        Ok(())
    }

    /// Drop the request from history. Terminal.
    pub fn discard(&mut self) -> Result<(), TxnError> {
        if self.state == RequestState::Discarded {
            return Err(TxnError::IncorrectInvocation {
                action: "discard",
                state: self.state,
            });
        }
        self.state = RequestState::Discarded;
        Ok(())
    }

    fn mutate(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        match &self.mutation {
            Mutation::CreateEntity { host, .. } => {
                let Some(prototype) = self.prototype.clone() else {
                    return Err(TxnError::IncorrectInvocation {
                        action: "commit",
                        state: self.state,
                    });
                };
                let id = doc.allocate(prototype)?;
                // The new id joins the targets so undo evicts it and redo restores it.
                if let Snapshot::Entities(entities) = &mut self.before {
                    entities.insert(id, None);
                }
                if !self.target_ids.contains(&id) {
                    self.target_ids.push(id);
                    self.target_ids.sort_unstable();
                }
                self.result = Some(id);
                doc.set_host(id, *host)?;
            }
            Mutation::DeleteEntity { entity } => {
                let order = doc.subtree(*entity)?;
                for id in order.into_iter().rev() {
                    doc.destroy_entity(id)?;
                }
            }
            Mutation::SetHost { entity, host } => doc.set_host(*entity, *host)?,
            Mutation::AttachComponent { entity, component } => {
                doc.attach_component(*entity, component.clone())?;
            }
            Mutation::DetachComponent { entity, kind } => {
                doc.detach_component(*entity, *kind)?;
            }
            Mutation::SetComponentField {
                entity,
                kind,
                field,
                value,
            } => {
                doc.set_component_field(*entity, *kind, field, value.clone())?;
            }
            Mutation::SetProperty { entity, key, value } => {
                doc.set_property(*entity, key, value.clone())?;
            }
        }
        Ok(())
    }

    /// Undo the bookkeeping of a `CreateEntity` whose commit was rolled back,
    /// so a retry does not point at an id the pool has handed back.
    fn forget_allocation(&mut self) {
        let Some(id) = self.result.take() else {
            return;
        };
        if let Snapshot::Entities(entities) = &mut self.before {
            entities.remove(&id);
        }
        self.target_ids.retain(|target| *target != id);
    }
}

/// Emit one signal per snapshot entry describing how it moved from `from`
/// into `to`.
fn notify(request_id: RequestId, doc: &mut Document, to: &Snapshot, from: Option<&Snapshot>) {
    match to {
        Snapshot::Field { entity, .. } | Snapshot::Property { entity, .. } => {
            doc.notify(request_id, SignalKind::GeometryDirty { entity_id: *entity });
        }
        Snapshot::Entities(entities) => {
            for id in entities.keys().copied() {
                let existed = match from {
                    Some(Snapshot::Entities(prior)) => {
                        prior.get(&id).is_some_and(|state| state.is_some())
                    }
                    _ => true,
                };
                let kind = if !doc.contains(id) {
                    SignalKind::EntityRemoved { entity_id: id }
                } else if existed {
                    SignalKind::StructureChanged { entity_id: id }
                } else {
                    SignalKind::EntityCreated { entity_id: id }
                };
                doc.notify(request_id, kind);
            }
        }
    }
}
