use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::geometry::Geometry;
use crate::error::ComponentError;
use crate::id::EntityId;

/// Discriminant of a component slot. An entity holds at most one component
/// per kind; the string form is the `tp` tag written by [`Component::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ComponentKind {
    Joint,
    ColdWater,
    HotWater,
    WeakElec,
    Hole,
}

string_enum!(ComponentKind {
    Joint => "Joint",
    ColdWater => "ColdWater",
    HotWater => "HotWater",
    WeakElec => "WeakElec",
    Hole => "Hole",
});

impl ComponentKind {
    /// Tree runs are edited as a whole: a single node edit can reshape the
    /// branch structure, so partial diffs are not meaningful.
    pub fn can_transact_field(self) -> bool {
        !matches!(
            self,
            ComponentKind::ColdWater | ComponentKind::HotWater | ComponentKind::WeakElec
        )
    }

    /// Hole markers are derived from host geometry and rebuilt on demand.
    pub fn need_dump(self) -> bool {
        !matches!(self, ComponentKind::Hole)
    }
}

/// Structural node where members (beams, columns) meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub location: Geometry,
    #[serde(default)]
    pub members: Vec<EntityId>,
    #[serde(default)]
    pub angle: f64,
}

/// One node of a pipe or circuit tree. `parent` is `None` for the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: u32,
    pub parent: Option<u32>,
    pub path: Geometry,
}

/// Branching MEP run shared by the water and low-voltage kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRun {
    #[serde(default)]
    pub nodes: Vec<TreeNode>,
    #[serde(default)]
    pub diameter: f64,
}

impl TreeRun {
    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    pub fn children(&self, node: u32) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(move |n| n.parent == Some(node))
    }
}

/// Temporary cut-out marker left on a host while an opening is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoleMarker {
    pub outline: Geometry,
    #[serde(default)]
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Joint(Joint),
    ColdWater(TreeRun),
    HotWater(TreeRun),
    WeakElec(TreeRun),
    Hole(HoleMarker),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Joint(_) => ComponentKind::Joint,
            Component::ColdWater(_) => ComponentKind::ColdWater,
            Component::HotWater(_) => ComponentKind::HotWater,
            Component::WeakElec(_) => ComponentKind::WeakElec,
            Component::Hole(_) => ComponentKind::Hole,
        }
    }

    pub fn need_dump(&self) -> bool {
        self.kind().need_dump()
    }

    pub fn can_transact_field(&self) -> bool {
        self.kind().can_transact_field()
    }

    /// Serialize as `{ "tp": <kind>, ...fields }`.
    pub fn dump(&self) -> Result<Value, ComponentError> {
        let mut fields = self.fields()?;
        fields.insert("tp".to_string(), Value::String(self.kind().to_string()));
        Ok(Value::Object(fields))
    }

    /// Rebuild a component from its dump, selecting the payload type by `tp`.
    ///
    /// `host` is the entity the component is being loaded onto. It is
    /// accepted for back-reference wiring and not read today.
    pub fn load(data: &Value, host: EntityId) -> Result<Self, ComponentError> {
        let _ = host;
        let tp = data
            .get("tp")
            .and_then(Value::as_str)
            .ok_or(ComponentError::MissingTag)?;
        let kind = ComponentKind::try_from(tp.to_string())
            .map_err(|_| ComponentError::UnknownKind(tp.to_string()))?;
        Self::from_fields(kind, data.clone())
    }

    /// Read one serialized field of the payload.
    pub fn field(&self, name: &str) -> Result<Value, ComponentError> {
        self.fields()?
            .remove(name)
            .ok_or_else(|| ComponentError::UnknownField {
                kind: self.kind(),
                field: name.to_string(),
            })
    }

    /// Return a copy with one field replaced. The payload is re-validated, so
    /// a value of the wrong shape is rejected rather than stored.
    pub fn with_field(&self, name: &str, value: Value) -> Result<Self, ComponentError> {
        let mut fields = self.fields()?;
        match fields.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                return Err(ComponentError::UnknownField {
                    kind: self.kind(),
                    field: name.to_string(),
                });
            }
        }
        Self::from_fields(self.kind(), Value::Object(fields))
    }

    fn fields(&self) -> Result<Map<String, Value>, ComponentError> {
        let kind = self.kind();
        match self {
            Component::Joint(p) => to_fields(kind, p),
            Component::ColdWater(p) | Component::HotWater(p) | Component::WeakElec(p) => {
                to_fields(kind, p)
            }
            Component::Hole(p) => to_fields(kind, p),
        }
    }

    fn from_fields(kind: ComponentKind, data: Value) -> Result<Self, ComponentError> {
        Ok(match kind {
            ComponentKind::Joint => Component::Joint(payload(kind, data)?),
            ComponentKind::ColdWater => Component::ColdWater(payload(kind, data)?),
            ComponentKind::HotWater => Component::HotWater(payload(kind, data)?),
            ComponentKind::WeakElec => Component::WeakElec(payload(kind, data)?),
            ComponentKind::Hole => Component::Hole(payload(kind, data)?),
        })
    }
}

fn to_fields<T: Serialize>(
    kind: ComponentKind,
    payload: &T,
) -> Result<Map<String, Value>, ComponentError> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ComponentError::Payload {
            kind,
            message: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(ComponentError::Payload {
            kind,
            message: e.to_string(),
        }),
    }
}

fn payload<T: DeserializeOwned>(kind: ComponentKind, data: Value) -> Result<T, ComponentError> {
    serde_json::from_value(data).map_err(|e| ComponentError::Payload {
        kind,
        message: e.to_string(),
    })
}
