use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A change notification queued by the document after a request commits,
/// undoes or redoes. Renderers and UI drain these and recompute lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// The request whose commit, undo or redo produced this signal.
    pub request_id: u64,
    pub kind: SignalKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalKind {
    /// An entity came into existence (creation, or undo of a deletion).
    EntityCreated { entity_id: EntityId },

    /// An entity left the document (deletion, or undo of a creation).
    EntityRemoved { entity_id: EntityId },

    /// An entity's host/contents links or components changed.
    StructureChanged { entity_id: EntityId },

    /// A field or property changed; derived geometry must be recomputed.
    GeometryDirty { entity_id: EntityId },
}

impl SignalKind {
    pub fn entity_id(&self) -> EntityId {
        match self {
            SignalKind::EntityCreated { entity_id }
            | SignalKind::EntityRemoved { entity_id }
            | SignalKind::StructureChanged { entity_id }
            | SignalKind::GeometryDirty { entity_id } => *entity_id,
        }
    }
}
