//! Undo/redo history over committed requests.
//!
//! Every commit lands in exactly one undo step. A step holds a single
//! request, unless it was committed inside a session or merged into the
//! previous step. Undo replays a step's requests in reverse order, redo in
//! commit order. If one of them fails, the requests already replayed are put
//! back so the document is never left halfway through a step.

use std::collections::VecDeque;

use serde::Serialize;

use super::request::{Mutation, Request, RequestId};
use crate::config::EngineConfig;
use crate::error::TxnError;
use crate::id::EntityId;
use crate::model::document::Document;
use crate::model::registry::Registry;

/// One undo step.
#[derive(Debug, Clone)]
pub struct Transaction {
    description: String,
    category: String,
    requests: Vec<Request>,
}

impl Transaction {
    fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            requests: Vec::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    fn undo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        for i in (0..self.requests.len()).rev() {
            if let Err(err) = self.requests[i].undo(doc) {
                for request in &mut self.requests[i + 1..] {
                    if let Err(e) = request.redo(doc) {
                        tracing::warn!("restoring request {} after failed undo: {e}", request.id());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn redo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        for i in 0..self.requests.len() {
            if let Err(err) = self.requests[i].redo(doc) {
                for request in self.requests[..i].iter_mut().rev() {
                    if let Err(e) = request.undo(doc) {
                        tracing::warn!("restoring request {} after failed redo: {e}", request.id());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        for request in &mut self.requests {
            // A request that is already discarded has nothing left to release.
            let _ = request.discard();
        }
    }
}

/// Presentation view of one undo step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub description: String,
    pub category: String,
    pub requests: usize,
}

#[derive(Debug)]
pub struct TransactionManager {
    undo_stack: VecDeque<Transaction>,
    redo_stack: Vec<Transaction>,
    session: Option<Transaction>,
    next_request_id: RequestId,
    history_limit: Option<usize>,
}

impl TransactionManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            session: None,
            next_request_id: 1,
            history_limit: config.history_limit,
        }
    }

    /// Build a request against the current document state.
    pub fn create_request(
        &mut self,
        doc: &Document,
        registry: &Registry,
        mutation: Mutation,
    ) -> Result<Request, TxnError> {
        let request = Request::new(self.next_request_id, doc, registry, mutation)?;
        self.next_request_id += 1;
        Ok(request)
    }

    /// Commit a request as its own undo step, or into the open session.
    /// Returns the id of the entity the request created, if any.
    pub fn commit(
        &mut self,
        doc: &mut Document,
        mut request: Request,
    ) -> Result<Option<EntityId>, TxnError> {
        request.commit(doc)?;
        let result = request.result();
        match &mut self.session {
            // Redo survives until the session is committed; an abort keeps it.
            Some(session) => session.requests.push(request),
            None => {
                let mut step = Transaction::new(request.mutation().label(), "request");
                step.requests.push(request);
                self.push_undo(step);
                self.clear_redo();
            }
        }
        Ok(result)
    }

    /// Commit a request into the previous undo step instead of opening a
    /// new one. Inside a session this is the same as [`commit`].
    ///
    /// [`commit`]: TransactionManager::commit
    pub fn commit_merged(
        &mut self,
        doc: &mut Document,
        mut request: Request,
    ) -> Result<Option<EntityId>, TxnError> {
        if self.session.is_some() || self.undo_stack.is_empty() {
            return self.commit(doc, request);
        }
        request.commit(doc)?;
        let result = request.result();
        if let Some(previous) = self.undo_stack.back_mut() {
            previous.requests.push(request);
        }
        self.clear_redo();
        Ok(result)
    }

    // -- Sessions --

    pub fn start_session(
        &mut self,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<(), TxnError> {
        if self.session.is_some() {
            return Err(TxnError::SessionOpen);
        }
        let session = Transaction::new(description, category);
        tracing::debug!("session started: {}", session.description);
        self.session = Some(session);
        Ok(())
    }

    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    /// Close the open session as one undo step. An empty session leaves no
    /// step behind. Returns whether a step was recorded.
    pub fn commit_session(&mut self) -> Result<bool, TxnError> {
        let session = self.session.take().ok_or(TxnError::NoSession)?;
        if session.requests.is_empty() {
            tracing::debug!("session {} closed empty", session.description);
            return Ok(false);
        }
        tracing::debug!(
            "session {} committed with {} requests",
            session.description,
            session.requests.len()
        );
        self.push_undo(session);
        self.clear_redo();
        Ok(true)
    }

    /// Undo everything committed in the open session and drop it.
    pub fn abort_session(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        let mut session = self.session.take().ok_or(TxnError::NoSession)?;
        let undone = session.undo(doc);
        session.discard();
        tracing::info!(
            "session {} aborted, {} requests rolled back",
            session.description,
            session.requests.len()
        );
        undone
    }

    // -- History --

    pub fn undo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        if self.session.is_some() {
            return Err(TxnError::SessionOpen);
        }
        let mut step = self.undo_stack.pop_back().ok_or(TxnError::NothingToUndo)?;
        if let Err(err) = step.undo(doc) {
            self.undo_stack.push_back(step);
            return Err(err);
        }
        tracing::debug!("undo: {}", step.description);
        self.redo_stack.push(step);
        Ok(())
    }

    pub fn redo(&mut self, doc: &mut Document) -> Result<(), TxnError> {
        if self.session.is_some() {
            return Err(TxnError::SessionOpen);
        }
        let mut step = self.redo_stack.pop().ok_or(TxnError::NothingToRedo)?;
        if let Err(err) = step.redo(doc) {
            self.redo_stack.push(step);
            return Err(err);
        }
        tracing::debug!("redo: {}", step.description);
        self.undo_stack.push_back(step);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.session.is_none() && !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.session.is_none() && !self.redo_stack.is_empty()
    }

    /// Undo steps, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.undo_stack
            .iter()
            .map(|step| HistoryEntry {
                description: step.description.clone(),
                category: step.category.clone(),
                requests: step.requests.len(),
            })
            .collect()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget all history. The document keeps its current state.
    pub fn clear(&mut self) {
        for step in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            step.discard();
        }
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, step: Transaction) {
        self.undo_stack.push_back(step);
        if let Some(limit) = self.history_limit {
            while self.undo_stack.len() > limit {
                if let Some(mut oldest) = self.undo_stack.pop_front() {
                    tracing::debug!("history limit {limit} reached, dropping {}", oldest.description);
                    oldest.discard();
                }
            }
        }
    }

    fn clear_redo(&mut self) {
        for step in &mut self.redo_stack {
            step.discard();
        }
        self.redo_stack.clear();
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::request::RequestState;
    use serde_json::json;

    fn setup() -> (Document, Registry, EntityId) {
        let registry = Registry::with_builtin_classes();
        let mut doc = Document::new();
        let layer = doc.create_entity(&registry, "Layer").unwrap();
        (doc, registry, layer)
    }

    fn label(entity: EntityId, text: &str) -> Mutation {
        Mutation::SetProperty {
            entity,
            key: "label".to_string(),
            value: Some(json!(text)),
        }
    }

    fn commit(
        mgr: &mut TransactionManager,
        doc: &mut Document,
        registry: &Registry,
        mutation: Mutation,
    ) -> Option<EntityId> {
        let request = mgr.create_request(doc, registry, mutation).unwrap();
        mgr.commit(doc, request).unwrap()
    }

    #[test]
    fn commit_records_one_step_and_clears_redo() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        commit(&mut mgr, &mut doc, &registry, label(layer, "b"));
        assert_eq!(mgr.undo_len(), 2);

        mgr.undo(&mut doc).unwrap();
        assert!(mgr.can_redo());
        commit(&mut mgr, &mut doc, &registry, label(layer, "c"));
        assert!(!mgr.can_redo());
        assert_eq!(doc.entity(layer).unwrap().properties["label"], json!("c"));
    }

    #[test]
    fn undo_redo_with_empty_history() {
        let (mut doc, _, _) = setup();
        let mut mgr = TransactionManager::default();
        assert!(matches!(mgr.undo(&mut doc), Err(TxnError::NothingToUndo)));
        assert!(matches!(mgr.redo(&mut doc), Err(TxnError::NothingToRedo)));
        assert!(!mgr.can_undo());
    }

    #[test]
    fn session_groups_requests_into_one_step() {
        let (mut doc, registry, layer) = setup();
        let before = doc.dump().unwrap();
        let mut mgr = TransactionManager::default();
        mgr.start_session("Add beam", "structure").unwrap();
        let beam = commit(
            &mut mgr,
            &mut doc,
            &registry,
            Mutation::CreateEntity {
                class_name: "Beam".to_string(),
                host: Some(layer),
            },
        )
        .unwrap();
        commit(&mut mgr, &mut doc, &registry, label(beam, "B1"));
        assert!(mgr.commit_session().unwrap());

        let history = mgr.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].description, "Add beam");
        assert_eq!(history[0].category, "structure");
        assert_eq!(history[0].requests, 2);

        mgr.undo(&mut doc).unwrap();
        assert_eq!(doc.dump().unwrap(), before);
        mgr.redo(&mut doc).unwrap();
        assert_eq!(doc.entity(beam).unwrap().properties["label"], json!("B1"));
    }

    #[test]
    fn empty_session_leaves_no_step() {
        let mut mgr = TransactionManager::default();
        mgr.start_session("noop", "misc").unwrap();
        assert!(!mgr.commit_session().unwrap());
        assert!(!mgr.can_undo());
        assert!(matches!(mgr.commit_session(), Err(TxnError::NoSession)));
    }

    #[test]
    fn abort_session_rolls_back_in_reverse() {
        let (mut doc, registry, layer) = setup();
        let before = doc.dump().unwrap();
        let mut mgr = TransactionManager::default();
        mgr.start_session("doomed", "structure").unwrap();
        let beam = commit(
            &mut mgr,
            &mut doc,
            &registry,
            Mutation::CreateEntity {
                class_name: "Beam".to_string(),
                host: Some(layer),
            },
        )
        .unwrap();
        commit(&mut mgr, &mut doc, &registry, label(beam, "B1"));
        mgr.abort_session(&mut doc).unwrap();
        assert_eq!(doc.dump().unwrap(), before);
        assert!(!mgr.in_session());
        assert!(!mgr.can_undo());
        assert!(!doc.ids().is_outstanding(beam));
    }

    #[test]
    fn aborted_session_keeps_redo() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        mgr.undo(&mut doc).unwrap();
        assert!(mgr.can_redo());

        mgr.start_session("abandoned", "misc").unwrap();
        commit(&mut mgr, &mut doc, &registry, label(layer, "b"));
        mgr.abort_session(&mut doc).unwrap();
        assert!(mgr.can_redo());
        assert_eq!(mgr.redo_len(), 1);

        mgr.redo(&mut doc).unwrap();
        assert_eq!(doc.entity(layer).unwrap().properties["label"], json!("a"));
    }

    #[test]
    fn committed_session_clears_redo_and_empty_one_does_not() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        mgr.undo(&mut doc).unwrap();

        mgr.start_session("noop", "misc").unwrap();
        assert!(!mgr.commit_session().unwrap());
        assert!(mgr.can_redo());

        mgr.start_session("edit", "misc").unwrap();
        commit(&mut mgr, &mut doc, &registry, label(layer, "b"));
        assert!(mgr.commit_session().unwrap());
        assert!(!mgr.can_redo());
    }

    #[test]
    fn nested_session_and_history_moves_rejected_while_open() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        mgr.start_session("outer", "misc").unwrap();
        assert!(matches!(
            mgr.start_session("inner", "misc"),
            Err(TxnError::SessionOpen)
        ));
        assert!(matches!(mgr.undo(&mut doc), Err(TxnError::SessionOpen)));
        assert!(!mgr.can_undo());
        mgr.commit_session().unwrap();
        assert!(mgr.can_undo());
    }

    #[test]
    fn commit_merged_extends_previous_step() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        let request = mgr
            .create_request(
                &doc,
                &registry,
                Mutation::SetProperty {
                    entity: layer,
                    key: "elevation".to_string(),
                    value: Some(json!(3.0)),
                },
            )
            .unwrap();
        mgr.commit_merged(&mut doc, request).unwrap();
        assert_eq!(mgr.undo_len(), 1);
        assert_eq!(mgr.history()[0].requests, 2);

        mgr.undo(&mut doc).unwrap();
        assert!(doc.entity(layer).unwrap().properties.is_empty());
    }

    #[test]
    fn commit_merged_without_history_opens_a_step() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        let request = mgr.create_request(&doc, &registry, label(layer, "a")).unwrap();
        mgr.commit_merged(&mut doc, request).unwrap();
        assert_eq!(mgr.undo_len(), 1);
    }

    #[test]
    fn history_limit_discards_oldest() {
        let (mut doc, registry, layer) = setup();
        let config = EngineConfig {
            history_limit: Some(2),
            ..EngineConfig::default()
        };
        let mut mgr = TransactionManager::new(&config);
        for text in ["a", "b", "c"] {
            commit(&mut mgr, &mut doc, &registry, label(layer, text));
        }
        assert_eq!(mgr.undo_len(), 2);
        mgr.undo(&mut doc).unwrap();
        mgr.undo(&mut doc).unwrap();
        assert!(matches!(mgr.undo(&mut doc), Err(TxnError::NothingToUndo)));
        assert_eq!(doc.entity(layer).unwrap().properties["label"], json!("a"));
    }

    #[test]
    fn failed_commit_records_nothing() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        let stale = mgr.create_request(&doc, &registry, label(layer, "a")).unwrap();
        let delete = mgr
            .create_request(&doc, &registry, Mutation::DeleteEntity { entity: layer })
            .unwrap();
        mgr.commit(&mut doc, delete).unwrap();
        assert!(mgr.commit(&mut doc, stale).is_err());
        assert_eq!(mgr.undo_len(), 1);
    }

    #[test]
    fn clear_discards_requests() {
        let (mut doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        commit(&mut mgr, &mut doc, &registry, label(layer, "a"));
        mgr.clear();
        assert!(!mgr.can_undo());
        assert!(!mgr.can_redo());
        assert_eq!(doc.entity(layer).unwrap().properties["label"], json!("a"));
    }

    #[test]
    fn request_ids_are_sequential() {
        let (doc, registry, layer) = setup();
        let mut mgr = TransactionManager::default();
        let a = mgr.create_request(&doc, &registry, label(layer, "a")).unwrap();
        let b = mgr.create_request(&doc, &registry, label(layer, "b")).unwrap();
        assert_eq!(b.id(), a.id() + 1);
        assert_eq!(a.state(), RequestState::Created);
    }
}
