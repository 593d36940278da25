//! Cascade policy for deleting a structural host.
//!
//! A host's direct contents are split by their class traits: dependent items
//! (openings, panels, custom models) go down with the host, independent items
//! (wall content, pipe runs) move to the nearest surviving ancestor of the host
//! that accepts content. The whole plan is checked before anything is
//! mutated, so a failed check leaves the document untouched.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::CascadeError;
use crate::id::EntityId;
use crate::model::document::Document;

/// Split of a host's direct contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub to_be_removed: Vec<EntityId>,
    pub to_be_reassign: Vec<EntityId>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.to_be_removed.len() + self.to_be_reassign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify every direct content of `host`, in id order.
pub fn classify(doc: &Document, host: EntityId) -> Result<Partition, CascadeError> {
    let host_entity = doc.entity(host)?;
    let mut partition = Partition::default();
    for &content in &host_entity.contents {
        if doc.entity(content)?.is_dependent() {
            partition.to_be_removed.push(content);
        } else {
            partition.to_be_reassign.push(content);
        }
    }
    Ok(partition)
}

/// Check that `partition` covers every content of `host` exactly once and
/// nothing else.
pub fn check_partition(
    doc: &Document,
    host: EntityId,
    partition: &Partition,
) -> Result<(), CascadeError> {
    let contents = &doc.entity(host)?.contents;
    let mut seen = BTreeSet::new();
    for &content in partition
        .to_be_removed
        .iter()
        .chain(partition.to_be_reassign.iter())
    {
        if !contents.contains(&content) {
            return Err(CascadeError::Foreign { host, content });
        }
        if !seen.insert(content) {
            return Err(CascadeError::Overlap { host, content });
        }
    }
    if let Some(&content) = contents.iter().find(|c| !seen.contains(*c)) {
        return Err(CascadeError::Unclassified { host, content });
    }
    Ok(())
}

/// Nearest ancestor of `host` that accepts content.
pub fn reassign_target(
    doc: &Document,
    host: EntityId,
    content: EntityId,
) -> Result<EntityId, CascadeError> {
    doc.ancestors(host)
        .into_iter()
        .find(|id| doc.get(*id).is_some_and(|e| e.accepts_content()))
        .ok_or(CascadeError::NoReassignTarget { host, content })
}

/// Everything a host deletion will do, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadePlan {
    pub host: EntityId,
    pub partition: Partition,
    /// `(content, new host)` for every item in `to_be_reassign`.
    pub reassign: Vec<(EntityId, EntityId)>,
}

impl CascadePlan {
    /// Classify `host`'s contents and resolve every reassignment target.
    pub fn build(doc: &Document, host: EntityId) -> Result<Self, CascadeError> {
        let partition = classify(doc, host)?;
        Self::from_partition(doc, host, partition)
    }

    /// Validate a caller-supplied partition and resolve its targets.
    pub fn from_partition(
        doc: &Document,
        host: EntityId,
        partition: Partition,
    ) -> Result<Self, CascadeError> {
        check_partition(doc, host, &partition)?;
        let reassign = partition
            .to_be_reassign
            .iter()
            .map(|&content| Ok((content, reassign_target(doc, host, content)?)))
            .collect::<Result<Vec<_>, CascadeError>>()?;
        tracing::debug!(
            "cascade plan for host {host}: remove {:?}, reassign {:?}",
            partition.to_be_removed,
            reassign
        );
        Ok(Self {
            host,
            partition,
            reassign,
        })
    }
}
