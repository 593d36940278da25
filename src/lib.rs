pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod flush;
pub mod id;
pub mod model;
pub mod scenario;
pub mod txn;

pub use command::{Command, CommandId, CommandKind, CommandManager, CommandOutput, CommandState};
pub use config::EngineConfig;
pub use editor::Editor;
pub use error::{CascadeError, CommandError, ComponentError, DocumentError, RegistryError, TxnError};
pub use id::{EntityId, IdPool};
pub use model::{
    ClassTraits, Component, ComponentKind, Document, Entity, EntityDump, Geometry, HostDependency,
    Registry, Signal, SignalKind,
};
pub use txn::{Mutation, Request, RequestState, TransactionManager};
