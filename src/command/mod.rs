pub mod apply;
pub mod cascade;
pub mod manager;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::CommandError;
use crate::id::EntityId;
use crate::model::component::{Component, ComponentKind};
use crate::model::document::Document;
use crate::model::registry::Registry;
use crate::txn::TransactionManager;

pub use cascade::{CascadePlan, Partition};
pub use manager::CommandManager;

pub type CommandId = u64;

/// A user-facing operation: what to do plus how to present it in history.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    /// Shown in the undo history.
    pub description: String,
    /// Grouping label for the undo history.
    pub category: String,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            description: kind.type_key().to_string(),
            category: kind.category().to_string(),
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Every operation a command can perform.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    // -- Structure --
    CreateEntity {
        class_name: String,
        host: Option<EntityId>,
        properties: BTreeMap<String, Value>,
    },
    /// Delete an entity together with everything it hosts.
    DeleteEntity {
        entity: EntityId,
    },
    /// Delete a host, removing dependent contents and moving independent
    /// contents to the nearest ancestor that accepts them.
    DeleteHost {
        host: EntityId,
    },
    MoveContent {
        entity: EntityId,
        host: Option<EntityId>,
    },

    // -- Properties and components --
    SetProperty {
        entity: EntityId,
        key: String,
        value: Option<Value>,
    },
    EditComponentField {
        entity: EntityId,
        kind: ComponentKind,
        field: String,
        value: Value,
    },
    ReplaceComponent {
        entity: EntityId,
        component: Component,
    },
}

impl CommandKind {
    pub const TYPE_KEYS: &'static [&'static str] = &[
        "create_entity",
        "delete_entity",
        "delete_host",
        "move_content",
        "set_property",
        "edit_component_field",
        "replace_component",
    ];

    pub fn type_key(&self) -> &'static str {
        match self {
            CommandKind::CreateEntity { .. } => "create_entity",
            CommandKind::DeleteEntity { .. } => "delete_entity",
            CommandKind::DeleteHost { .. } => "delete_host",
            CommandKind::MoveContent { .. } => "move_content",
            CommandKind::SetProperty { .. } => "set_property",
            CommandKind::EditComponentField { .. } => "edit_component_field",
            CommandKind::ReplaceComponent { .. } => "replace_component",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            CommandKind::CreateEntity { .. }
            | CommandKind::DeleteEntity { .. }
            | CommandKind::DeleteHost { .. } => "structure",
            CommandKind::MoveContent { .. } => "content",
            CommandKind::SetProperty { .. } => "property",
            CommandKind::EditComponentField { .. } | CommandKind::ReplaceComponent { .. } => {
                "component"
            }
        }
    }

    /// Build a command from a type key and a positional argument list, e.g.
    /// `("delete_host", [12])` or `("move_content", [7, 3])`.
    pub fn from_type_key(key: &str, args: &[Value]) -> Result<Self, CommandError> {
        Ok(match key {
            "create_entity" => {
                let args = Args::new("create_entity", args);
                CommandKind::CreateEntity {
                    class_name: args.string(0)?,
                    host: args.optional_id(1)?,
                    properties: args.object(2)?,
                }
            }
            "delete_entity" => CommandKind::DeleteEntity {
                entity: Args::new("delete_entity", args).id(0)?,
            },
            "delete_host" => CommandKind::DeleteHost {
                host: Args::new("delete_host", args).id(0)?,
            },
            "move_content" => {
                let args = Args::new("move_content", args);
                CommandKind::MoveContent {
                    entity: args.id(0)?,
                    host: args.optional_id(1)?,
                }
            }
            "set_property" => {
                let args = Args::new("set_property", args);
                CommandKind::SetProperty {
                    entity: args.id(0)?,
                    key: args.string(1)?,
                    value: args.get(2).filter(|v| !v.is_null()).cloned(),
                }
            }
            "edit_component_field" => {
                let args = Args::new("edit_component_field", args);
                let kind = ComponentKind::try_from(args.string(1)?)
                    .map_err(|message| args.bad(message))?;
                CommandKind::EditComponentField {
                    entity: args.id(0)?,
                    kind,
                    field: args.string(2)?,
                    value: args.required(3)?.clone(),
                }
            }
            "replace_component" => {
                let args = Args::new("replace_component", args);
                let entity = args.id(0)?;
                let component = Component::load(args.required(1)?, entity)
                    .map_err(|e| args.bad(e.to_string()))?;
                CommandKind::ReplaceComponent { entity, component }
            }
            other => return Err(CommandError::UnknownType(other.to_string())),
        })
    }
}

/// Positional argument reader for [`CommandKind::from_type_key`].
struct Args<'a> {
    type_key: &'static str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(type_key: &'static str, values: &'a [Value]) -> Self {
        Self { type_key, values }
    }

    fn bad(&self, message: impl Into<String>) -> CommandError {
        CommandError::BadArguments {
            type_key: self.type_key,
            message: message.into(),
        }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    fn required(&self, index: usize) -> Result<&'a Value, CommandError> {
        self.get(index)
            .ok_or_else(|| self.bad(format!("missing argument {index}")))
    }

    fn id(&self, index: usize) -> Result<EntityId, CommandError> {
        self.required(index)?
            .as_u64()
            .filter(|id| *id > 0)
            .ok_or_else(|| self.bad(format!("argument {index} is not an entity id")))
    }

    fn optional_id(&self, index: usize) -> Result<Option<EntityId>, CommandError> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.id(index).map(Some),
        }
    }

    fn string(&self, index: usize) -> Result<String, CommandError> {
        self.required(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad(format!("argument {index} is not a string")))
    }

    fn object(&self, index: usize) -> Result<BTreeMap<String, Value>, CommandError> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(Value::Object(map)) => Ok(map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            Some(_) => Err(self.bad(format!("argument {index} is not an object"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Pending,
    Executing,
    Completed,
    Cancelled,
    Destroyed,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Pending => "pending",
            CommandState::Executing => "executing",
            CommandState::Completed => "completed",
            CommandState::Cancelled => "cancelled",
            CommandState::Destroyed => "destroyed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, CommandState::Completed | CommandState::Cancelled)
    }
}

/// What a completed command did to the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub created: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    /// `(content, new host)` pairs.
    pub reassigned: Vec<(EntityId, Option<EntityId>)>,
}

impl CommandOutput {
    /// Fold the output of a later step into this one.
    pub fn extend(&mut self, other: CommandOutput) {
        self.created.extend(other.created);
        self.removed.extend(other.removed);
        self.reassigned.extend(other.reassigned);
    }
}

/// Everything a command needs while it runs.
pub struct CommandContext<'a> {
    pub document: &'a mut Document,
    pub registry: &'a Registry,
    pub transactions: &'a mut TransactionManager,
}
