//! Error types for each layer of the transaction core.
//!
//! Low-level document operations return [`DocumentError`]; the request layer
//! wraps those in [`TxnError`]; commands bubble everything into
//! [`CommandError`] with `?`. Invocation errors (calling a method in the wrong
//! state) are distinct variants so callers can tell a programming error from a
//! rejected edit.

use thiserror::Error;

use crate::id::{EntityId, IdError};
use crate::model::component::ComponentKind;
use crate::txn::request::RequestState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComponentError {
    #[error("component data has no `tp` discriminant")]
    MissingTag,

    #[error("unknown component kind: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {message}")]
    Payload { kind: ComponentKind, message: String },

    #[error("{kind} has no field `{field}`")]
    UnknownField { kind: ComponentKind, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("class name cannot be empty")]
    EmptyName,

    #[error("class already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown class: {0}")]
    UnknownClass(String),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),

    #[error("entity {entity} has no {kind} component")]
    ComponentNotFound { entity: EntityId, kind: ComponentKind },

    #[error("entity {host} ({class_name}) does not accept content")]
    HostRejectsContent { host: EntityId, class_name: String },

    #[error("hosting entity {entity} on {host} would create a cycle")]
    HostCycle { entity: EntityId, host: EntityId },

    #[error("entity {entity} still hosts {count} content item(s)")]
    HasContents { entity: EntityId, count: usize },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("incorrect invocation: cannot {action} a request that is {state}")]
    IncorrectInvocation {
        action: &'static str,
        state: RequestState,
    },

    #[error("{kind} on entity {entity} only accepts whole-component requests")]
    FieldTransactionRejected { entity: EntityId, kind: ComponentKind },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("a transaction session is already open")]
    SessionOpen,

    #[error("no transaction session is open")]
    NoSession,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("content {content} of host {host} was not classified")]
    Unclassified { host: EntityId, content: EntityId },

    #[error("content {content} of host {host} was classified twice")]
    Overlap { host: EntityId, content: EntityId },

    #[error("content {content} is not hosted by {host}")]
    Foreign { host: EntityId, content: EntityId },

    #[error("no alternative host for content {content} of deleted host {host}")]
    NoReassignTarget { host: EntityId, content: EntityId },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot {action} command {command} while it is {state}")]
    InvalidState {
        command: u64,
        action: &'static str,
        state: &'static str,
    },

    #[error("unknown command type: {0}")]
    UnknownType(String),

    #[error("bad arguments for `{type_key}`: {message}")]
    BadArguments {
        type_key: &'static str,
        message: String,
    },

    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}
