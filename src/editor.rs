use serde_json::Value;

use crate::command::{Command, CommandContext, CommandId, CommandKind, CommandManager, CommandOutput};
use crate::config::EngineConfig;
use crate::error::{CommandError, TxnError};
use crate::id::EntityId;
use crate::model::document::Document;
use crate::model::registry::Registry;
use crate::model::signal::Signal;
use crate::txn::{HistoryEntry, TransactionManager};

/// Owns one open document and everything that edits it.
///
/// All mutation goes through [`Editor::execute`] (or [`Editor::dispatch`]),
/// so every change lands in the undo history.
#[derive(Debug)]
pub struct Editor {
    document: Document,
    registry: Registry,
    transactions: TransactionManager,
    commands: CommandManager,
    config: EngineConfig,
}

impl Editor {
    /// Empty document with the built-in classes registered.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_document(config, Registry::with_builtin_classes(), Document::new())
    }

    pub fn with_document(config: EngineConfig, registry: Registry, mut document: Document) -> Self {
        document.set_emit_signals(config.emit_signals);
        Self {
            document,
            registry,
            transactions: TransactionManager::new(&config),
            commands: CommandManager::new(),
            config,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandManager {
        &self.commands
    }

    /// Swap in another document and forget all history.
    pub fn replace_document(&mut self, mut document: Document) -> Document {
        document.set_emit_signals(self.config.emit_signals);
        self.transactions.clear();
        std::mem::replace(&mut self.document, document)
    }

    /// Run a command as one undo step. The command is released once it
    /// finishes, whatever the outcome.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutput, CommandError> {
        let id = self.commands.create(command);
        let mut ctx = CommandContext {
            document: &mut self.document,
            registry: &self.registry,
            transactions: &mut self.transactions,
        };
        let result = self.commands.run(id, &mut ctx);
        self.release_if_finished(id);
        result
    }

    /// Start an interactive command. Its session stays open, and undo and
    /// redo are refused, until it is completed or cancelled.
    pub fn begin(&mut self, command: Command) -> Result<CommandId, CommandError> {
        let id = self.commands.create(command);
        let mut ctx = CommandContext {
            document: &mut self.document,
            registry: &self.registry,
            transactions: &mut self.transactions,
        };
        let result = self.commands.begin(id, &mut ctx);
        self.release_if_finished(id);
        result.map(|()| id)
    }

    /// Feed one step to an executing command.
    pub fn receive(&mut self, id: CommandId, step: &CommandKind) -> Result<CommandOutput, CommandError> {
        let mut ctx = CommandContext {
            document: &mut self.document,
            registry: &self.registry,
            transactions: &mut self.transactions,
        };
        let result = self.commands.receive(id, step, &mut ctx);
        self.release_if_finished(id);
        result
    }

    pub fn complete(&mut self, id: CommandId) -> Result<CommandOutput, CommandError> {
        let mut ctx = CommandContext {
            document: &mut self.document,
            registry: &self.registry,
            transactions: &mut self.transactions,
        };
        let result = self.commands.complete(id, &mut ctx);
        self.release_if_finished(id);
        result
    }

    pub fn cancel(&mut self, id: CommandId) -> Result<(), CommandError> {
        let mut ctx = CommandContext {
            document: &mut self.document,
            registry: &self.registry,
            transactions: &mut self.transactions,
        };
        let result = self.commands.cancel(id, &mut ctx);
        self.release_if_finished(id);
        result
    }

    fn release_if_finished(&mut self, id: CommandId) {
        if self.commands.state(id).is_some_and(|state| state.is_finished()) {
            if let Err(e) = self.commands.destroy(id) {
                tracing::warn!("command {id} not released: {e}");
            }
            self.commands.prune();
        }
    }

    /// Build a command from a type key and positional arguments and run it.
    pub fn dispatch(&mut self, type_key: &str, args: &[Value]) -> Result<CommandOutput, CommandError> {
        let kind = CommandKind::from_type_key(type_key, args)?;
        self.execute(Command::new(kind))
    }

    pub fn undo(&mut self) -> Result<(), TxnError> {
        self.transactions.undo(&mut self.document)
    }

    pub fn redo(&mut self) -> Result<(), TxnError> {
        self.transactions.redo(&mut self.document)
    }

    pub fn can_undo(&self) -> bool {
        self.transactions.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.transactions.can_redo()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.transactions.history()
    }

    pub fn drain_signals(&mut self) -> Vec<Signal> {
        self.document.drain_signals()
    }

    pub fn take_dirty(&mut self) -> Vec<EntityId> {
        self.document.take_dirty()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatch_and_undo() {
        let mut editor = Editor::default();
        let out = editor.dispatch("create_entity", &[json!("Layer")]).unwrap();
        let layer = out.created[0];
        let out = editor
            .dispatch("create_entity", &[json!("Beam"), json!(layer), json!({"label": "B1"})])
            .unwrap();
        let beam = out.created[0];
        assert_eq!(editor.document().entity(beam).unwrap().properties["label"], json!("B1"));
        assert_eq!(editor.history().len(), 2);

        editor.undo().unwrap();
        assert!(!editor.document().contains(beam));
        editor.redo().unwrap();
        assert_eq!(editor.document().entity(beam).unwrap().properties["label"], json!("B1"));
        assert!(editor.commands().is_empty());
    }

    #[test]
    fn signals_follow_config() {
        let mut quiet = Editor::new(EngineConfig {
            emit_signals: false,
            ..EngineConfig::default()
        });
        quiet.dispatch("create_entity", &[json!("Layer")]).unwrap();
        assert!(quiet.drain_signals().is_empty());
        assert_eq!(quiet.take_dirty(), vec![1]);

        let mut loud = Editor::default();
        loud.dispatch("create_entity", &[json!("Layer")]).unwrap();
        assert!(!loud.drain_signals().is_empty());
    }

    #[test]
    fn replace_document_clears_history() {
        let mut editor = Editor::default();
        editor.dispatch("create_entity", &[json!("Layer")]).unwrap();
        let old = editor.replace_document(Document::new());
        assert_eq!(old.len(), 1);
        assert!(!editor.can_undo());
        assert!(editor.document().is_empty());
    }

    #[test]
    fn interactive_command_blocks_history_until_finished() {
        let mut editor = Editor::default();
        let a = editor.dispatch("create_entity", &[json!("Layer")]).unwrap().created[0];
        let b = editor.dispatch("create_entity", &[json!("Layer")]).unwrap().created[0];
        let item = editor
            .dispatch("create_entity", &[json!("WallContent"), json!(a)])
            .unwrap()
            .created[0];
        let move_to = |host| CommandKind::MoveContent {
            entity: item,
            host: Some(host),
        };

        let id = editor.begin(Command::new(move_to(b))).unwrap();
        editor.receive(id, &move_to(b)).unwrap();
        assert!(!editor.can_undo());
        assert!(matches!(editor.undo(), Err(TxnError::SessionOpen)));

        editor.cancel(id).unwrap();
        assert_eq!(editor.document().entity(item).unwrap().host, Some(a));
        assert!(editor.commands().is_empty());
        assert_eq!(editor.history().len(), 3);

        let id = editor.begin(Command::new(move_to(b))).unwrap();
        editor.receive(id, &move_to(b)).unwrap();
        editor.complete(id).unwrap();
        assert_eq!(editor.document().entity(item).unwrap().host, Some(b));
        assert_eq!(editor.history().len(), 4);
        assert!(editor.commands().is_empty());
    }

    #[test]
    fn unknown_dispatch_leaves_no_trace() {
        let mut editor = Editor::default();
        assert!(matches!(
            editor.dispatch("explode", &[]),
            Err(CommandError::UnknownType(_))
        ));
        assert!(!editor.can_undo());
    }
}
