use std::collections::BTreeMap;

use thiserror::Error;

/// Identifier of a live entity. `0` is reserved as the "no entity" sentinel.
pub type EntityId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id 0 is reserved and cannot be claimed")]
    Sentinel,
    #[error("id {0} is already outstanding")]
    Outstanding(EntityId),
    #[error("entity id space exhausted")]
    Exhausted,
}

/// Issues and recycles entity ids.
///
/// Every positive id starts out free. `next_id` hands out the smallest free
/// id, so recycled ids are reissued before fresh ones and allocation order is
/// deterministic for a given sequence of calls. Free ids are kept as disjoint
/// inclusive ranges, so claiming a far-away id costs the same as a near one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPool {
    /// `start -> end`, inclusive.
    free: BTreeMap<EntityId, EntityId>,
}

impl IdPool {
    pub fn new() -> Self {
        Self {
            free: BTreeMap::from([(1, EntityId::MAX)]),
        }
    }

    pub fn next_id(&mut self) -> Result<EntityId, IdError> {
        let (start, end) = self.free.pop_first().ok_or(IdError::Exhausted)?;
        if start < end {
            self.free.insert(start + 1, end);
        }
        Ok(start)
    }

    /// Return an id to the pool. The sentinel is ignored so callers can
    /// recycle "no entity" values without checking.
    pub fn recycle(&mut self, id: EntityId) {
        if id == 0 {
            return;
        }
        if !self.is_outstanding(id) {
            tracing::warn!("recycle: id {id} is not outstanding");
            return;
        }
        let mut start = id;
        let mut end = id;
        if let Some((&prev_start, &prev_end)) = self.free.range(..id).next_back()
            && prev_end + 1 == id
        {
            self.free.remove(&prev_start);
            start = prev_start;
        }
        if let Some(next) = id.checked_add(1)
            && let Some(next_end) = self.free.remove(&next)
        {
            end = next_end;
        }
        self.free.insert(start, end);
    }

    /// Claim a specific id. Used when a document is loaded and when undo
    /// brings a deleted entity back under its original id.
    pub fn reserve(&mut self, id: EntityId) -> Result<(), IdError> {
        if id == 0 {
            return Err(IdError::Sentinel);
        }
        let (start, end) = self.free_range(id).ok_or(IdError::Outstanding(id))?;
        self.free.remove(&start);
        if start < id {
            self.free.insert(start, id - 1);
        }
        if id < end {
            self.free.insert(id + 1, end);
        }
        Ok(())
    }

    pub fn is_outstanding(&self, id: EntityId) -> bool {
        id != 0 && self.free_range(id).is_none()
    }

    fn free_range(&self, id: EntityId) -> Option<(EntityId, EntityId)> {
        self.free
            .range(..=id)
            .next_back()
            .filter(|&(_, &end)| id <= end)
            .map(|(&start, &end)| (start, end))
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new()
    }
}
