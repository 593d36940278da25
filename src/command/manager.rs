use std::collections::BTreeMap;

use super::apply::apply;
use super::{Command, CommandContext, CommandId, CommandKind, CommandOutput, CommandState};
use crate::error::CommandError;

#[derive(Debug)]
struct CommandRecord {
    command: Command,
    state: CommandState,
    output: Option<CommandOutput>,
}

/// Tracks commands through `Pending → Executing → Completed | Cancelled →
/// Destroyed`.
///
/// A command holds a transaction session for as long as it is executing.
/// Every step it receives commits into that session; `complete` closes the
/// session as one undo step and `cancel` rolls it back. Sessions do not nest,
/// so at most one command executes at a time.
#[derive(Debug, Default)]
pub struct CommandManager {
    records: BTreeMap<CommandId, CommandRecord>,
    next_id: CommandId,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command without running it.
    pub fn create(&mut self, command: Command) -> CommandId {
        self.next_id += 1;
        let id = self.next_id;
        tracing::debug!("command {id} created: {}", command.description);
        self.records.insert(
            id,
            CommandRecord {
                command,
                state: CommandState::Pending,
                output: None,
            },
        );
        id
    }

    /// Create and run a command in one go.
    pub fn execute(
        &mut self,
        command: Command,
        ctx: &mut CommandContext<'_>,
    ) -> Result<CommandOutput, CommandError> {
        let id = self.create(command);
        self.run(id, ctx)
    }

    /// Run a pending command to completion: begin, apply its own kind as the
    /// only step, complete. On error the command ends `Cancelled` with
    /// nothing left in the document or the history.
    pub fn run(
        &mut self,
        id: CommandId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<CommandOutput, CommandError> {
        self.begin(id, ctx)?;
        let kind = self.records.get(&id).map(|r| r.command.kind.clone());
        if let Some(kind) = kind {
            self.receive(id, &kind, ctx)?;
        }
        self.complete(id, ctx)
    }

    /// Move a pending command to `Executing` and open its session.
    pub fn begin(&mut self, id: CommandId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let record = self.transition(id, "execute", &[CommandState::Pending], CommandState::Executing)?;
        record.output = Some(CommandOutput::default());
        let description = record.command.description.clone();
        let category = record.command.category.clone();
        if let Err(err) = ctx.transactions.start_session(description, category) {
            self.set_state(id, CommandState::Cancelled);
            return Err(err.into());
        }
        tracing::debug!("command {id} executing");
        Ok(())
    }

    /// Apply one more step of an executing command, such as each move of a
    /// drag. A failing step cancels the whole command.
    pub fn receive(
        &mut self,
        id: CommandId,
        step: &CommandKind,
        ctx: &mut CommandContext<'_>,
    ) -> Result<CommandOutput, CommandError> {
        self.transition(id, "receive", &[CommandState::Executing], CommandState::Executing)?;
        match apply(ctx, step) {
            Ok(output) => {
                if let Some(record) = self.records.get_mut(&id) {
                    record
                        .output
                        .get_or_insert_with(CommandOutput::default)
                        .extend(output.clone());
                }
                Ok(output)
            }
            Err(err) => {
                tracing::info!("command {id} step {} failed: {err}", step.type_key());
                if let Err(rollback) = self.roll_back(id, ctx) {
                    tracing::warn!("command {id}: rollback failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    /// Finish an executing command, recording everything it committed as one
    /// undo step. Returns what the command did over all its steps.
    pub fn complete(
        &mut self,
        id: CommandId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<CommandOutput, CommandError> {
        let record = self.transition(id, "complete", &[CommandState::Executing], CommandState::Completed)?;
        let output = record.output.clone().unwrap_or_default();
        if let Err(err) = ctx.transactions.commit_session() {
            self.set_state(id, CommandState::Cancelled);
            return Err(err.into());
        }
        tracing::debug!("command {id} completed");
        Ok(output)
    }

    /// Cancel a command that has not finished. An executing command has its
    /// session rolled back, so nothing it did survives. Anything already
    /// completed is reversed through undo, not through cancel.
    pub fn cancel(&mut self, id: CommandId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        match self.state(id) {
            Some(CommandState::Executing) => self.roll_back(id, ctx)?,
            _ => {
                self.transition(id, "cancel", &[CommandState::Pending], CommandState::Cancelled)?;
            }
        }
        tracing::debug!("command {id} cancelled");
        Ok(())
    }

    /// Release a finished command. Terminal.
    pub fn destroy(&mut self, id: CommandId) -> Result<(), CommandError> {
        let record = self.transition(
            id,
            "destroy",
            &[CommandState::Completed, CommandState::Cancelled],
            CommandState::Destroyed,
        )?;
        record.output = None;
        Ok(())
    }

    pub fn state(&self, id: CommandId) -> Option<CommandState> {
        self.records.get(&id).map(|r| r.state)
    }

    pub fn command(&self, id: CommandId) -> Option<&Command> {
        self.records.get(&id).map(|r| &r.command)
    }

    /// Output so far for an executing command, or the final output once it
    /// has completed.
    pub fn output(&self, id: CommandId) -> Option<&CommandOutput> {
        self.records.get(&id).and_then(|r| r.output.as_ref())
    }

    /// Drop the records of destroyed commands.
    pub fn prune(&mut self) {
        self.records
            .retain(|_, record| record.state != CommandState::Destroyed);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Abort the session of an executing command and mark it `Cancelled`.
    fn roll_back(&mut self, id: CommandId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let record = self.transition(id, "cancel", &[CommandState::Executing], CommandState::Cancelled)?;
        record.output = None;
        tracing::info!("command {id} ({}) rolled back", record.command.description);
        ctx.transactions.abort_session(ctx.document)?;
        Ok(())
    }

    fn transition(
        &mut self,
        id: CommandId,
        action: &'static str,
        from: &[CommandState],
        to: CommandState,
    ) -> Result<&mut CommandRecord, CommandError> {
        let Some(record) = self.records.get_mut(&id) else {
            return Err(CommandError::InvalidState {
                command: id,
                action,
                state: "unknown",
            });
        };
        if !from.contains(&record.state) {
            return Err(CommandError::InvalidState {
                command: id,
                action,
                state: record.state.as_str(),
            });
        }
        record.state = to;
        Ok(record)
    }

    fn set_state(&mut self, id: CommandId, state: CommandState) {
        if let Some(record) = self.records.get_mut(&id) {
            record.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::model::document::Document;
    use crate::model::registry::Registry;
    use crate::txn::TransactionManager;

    struct Bench {
        document: Document,
        registry: Registry,
        transactions: TransactionManager,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                document: Document::new(),
                registry: Registry::with_builtin_classes(),
                transactions: TransactionManager::default(),
            }
        }

        fn ctx(&mut self) -> CommandContext<'_> {
            CommandContext {
                document: &mut self.document,
                registry: &self.registry,
                transactions: &mut self.transactions,
            }
        }
    }

    fn create(class_name: &str, host: Option<u64>) -> Command {
        Command::new(CommandKind::CreateEntity {
            class_name: class_name.to_string(),
            host,
            properties: Default::default(),
        })
    }

    #[test]
    fn execute_completes_and_records_one_step() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let id = mgr.create(create("Layer", None));
        assert_eq!(mgr.state(id), Some(CommandState::Pending));
        let output = mgr.run(id, &mut bench.ctx()).unwrap();
        assert_eq!(output.created, vec![1]);
        assert_eq!(mgr.state(id), Some(CommandState::Completed));
        assert_eq!(mgr.output(id), Some(&output));
        assert_eq!(bench.transactions.history().len(), 1);
        assert_eq!(bench.transactions.history()[0].description, "create_entity");
    }

    #[test]
    fn failing_command_is_cancelled_and_rolled_back() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        mgr.execute(create("Layer", None), &mut bench.ctx()).unwrap();
        let before = bench.document.dump().unwrap();

        // Openings cannot host anything
        let id = mgr.create(create("Opening", Some(1)));
        mgr.run(id, &mut bench.ctx()).unwrap();
        let bad = mgr.create(create("Panel", Some(2)));
        assert!(mgr.run(bad, &mut bench.ctx()).is_err());
        assert_eq!(mgr.state(bad), Some(CommandState::Cancelled));
        assert!(!bench.transactions.in_session());
        assert_eq!(bench.transactions.history().len(), 2);

        bench.transactions.undo(&mut bench.document).unwrap();
        assert_eq!(bench.document.dump().unwrap(), before);
    }

    #[test]
    fn invalid_transitions_fail_fast() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let id = mgr.create(create("Layer", None));
        mgr.run(id, &mut bench.ctx()).unwrap();
        assert!(matches!(
            mgr.run(id, &mut bench.ctx()),
            Err(CommandError::InvalidState {
                action: "execute",
                state: "completed",
                ..
            })
        ));
        assert!(matches!(
            mgr.cancel(id, &mut bench.ctx()),
            Err(CommandError::InvalidState { action: "cancel", .. })
        ));
        assert!(matches!(
            mgr.complete(id, &mut bench.ctx()),
            Err(CommandError::InvalidState { action: "complete", .. })
        ));
        assert!(matches!(
            mgr.receive(id, &CommandKind::DeleteEntity { entity: 1 }, &mut bench.ctx()),
            Err(CommandError::InvalidState { action: "receive", .. })
        ));
        mgr.destroy(id).unwrap();
        assert_eq!(mgr.state(id), Some(CommandState::Destroyed));
        assert!(mgr.output(id).is_none());
        assert!(matches!(
            mgr.destroy(id),
            Err(CommandError::InvalidState {
                state: "destroyed",
                ..
            })
        ));
        assert!(matches!(
            mgr.run(99, &mut bench.ctx()),
            Err(CommandError::InvalidState { state: "unknown", .. })
        ));
    }

    #[test]
    fn cancelled_pending_command_never_runs() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let id = mgr.create(create("Layer", None));
        mgr.cancel(id, &mut bench.ctx()).unwrap();
        assert!(mgr.run(id, &mut bench.ctx()).is_err());
        assert!(bench.document.is_empty());
        mgr.destroy(id).unwrap();
        mgr.prune();
        assert!(mgr.is_empty());
    }

    #[test]
    fn open_session_blocks_execution() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        bench.transactions.start_session("outer", "misc").unwrap();
        let id = mgr.create(create("Layer", None));
        assert!(matches!(
            mgr.run(id, &mut bench.ctx()),
            Err(CommandError::Txn(_))
        ));
        assert_eq!(mgr.state(id), Some(CommandState::Cancelled));
    }

    fn drag(entity: u64, host: u64) -> CommandKind {
        CommandKind::MoveContent {
            entity,
            host: Some(host),
        }
    }

    /// Two layers with a wall content item on the first.
    fn drag_site(bench: &mut Bench, mgr: &mut CommandManager) -> (u64, u64, u64) {
        let a = mgr.execute(create("Layer", None), &mut bench.ctx()).unwrap().created[0];
        let b = mgr.execute(create("Layer", None), &mut bench.ctx()).unwrap().created[0];
        let item = mgr
            .execute(create("WallContent", Some(a)), &mut bench.ctx())
            .unwrap()
            .created[0];
        (a, b, item)
    }

    #[test]
    fn interactive_steps_complete_as_one_step() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let (a, b, item) = drag_site(&mut bench, &mut mgr);
        let steps = bench.transactions.undo_len();

        let id = mgr.create(Command::new(drag(item, b)).with_description("drag item"));
        mgr.begin(id, &mut bench.ctx()).unwrap();
        assert_eq!(mgr.state(id), Some(CommandState::Executing));
        for host in [b, a, b] {
            mgr.receive(id, &drag(item, host), &mut bench.ctx()).unwrap();
        }
        assert_eq!(mgr.output(id).unwrap().reassigned.len(), 3);
        assert!(bench.transactions.in_session());

        let output = mgr.complete(id, &mut bench.ctx()).unwrap();
        assert_eq!(output.reassigned.last(), Some(&(item, Some(b))));
        assert_eq!(bench.transactions.undo_len(), steps + 1);
        assert_eq!(bench.transactions.history()[steps].description, "drag item");
        assert_eq!(bench.transactions.history()[steps].requests, 3);

        bench.transactions.undo(&mut bench.document).unwrap();
        assert_eq!(bench.document.entity(item).unwrap().host, Some(a));
    }

    #[test]
    fn cancelling_an_executing_command_rolls_back_its_steps() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let (_, b, item) = drag_site(&mut bench, &mut mgr);
        let before = bench.document.dump().unwrap();
        let steps = bench.transactions.undo_len();

        let id = mgr.create(Command::new(drag(item, b)));
        mgr.begin(id, &mut bench.ctx()).unwrap();
        mgr.receive(id, &drag(item, b), &mut bench.ctx()).unwrap();
        mgr.receive(id, &CommandKind::DeleteEntity { entity: item }, &mut bench.ctx())
            .unwrap();
        assert!(!bench.document.contains(item));

        mgr.cancel(id, &mut bench.ctx()).unwrap();
        assert_eq!(mgr.state(id), Some(CommandState::Cancelled));
        assert!(mgr.output(id).is_none());
        assert!(!bench.transactions.in_session());
        assert_eq!(bench.document.dump().unwrap(), before);
        assert_eq!(bench.transactions.undo_len(), steps);
        assert!(bench.document.ids().is_outstanding(item));
    }

    #[test]
    fn failing_step_cancels_the_executing_command() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let (a, b, item) = drag_site(&mut bench, &mut mgr);
        let before = bench.document.dump().unwrap();

        let id = mgr.create(Command::new(drag(item, b)));
        mgr.begin(id, &mut bench.ctx()).unwrap();
        mgr.receive(id, &drag(item, b), &mut bench.ctx()).unwrap();
        // Wall content does not accept content
        assert!(mgr.receive(id, &drag(a, item), &mut bench.ctx()).is_err());
        assert_eq!(mgr.state(id), Some(CommandState::Cancelled));
        assert_eq!(bench.document.dump().unwrap(), before);
        assert!(matches!(
            mgr.complete(id, &mut bench.ctx()),
            Err(CommandError::InvalidState { state: "cancelled", .. })
        ));
    }

    #[test]
    fn only_one_command_executes_at_a_time() {
        let mut bench = Bench::new();
        let mut mgr = CommandManager::new();
        let first = mgr.create(create("Layer", None));
        let second = mgr.create(create("Layer", None));
        mgr.begin(first, &mut bench.ctx()).unwrap();
        assert!(mgr.begin(second, &mut bench.ctx()).is_err());
        assert_eq!(mgr.state(second), Some(CommandState::Cancelled));
        assert_eq!(mgr.state(first), Some(CommandState::Executing));
        mgr.complete(first, &mut bench.ctx()).unwrap();
        // Nothing was received, so no step was recorded
        assert!(!bench.transactions.can_undo());
    }
}
