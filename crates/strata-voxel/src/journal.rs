//! Block-change journal.
//!
//! When enabled on a [`VoxelWorld`](crate::VoxelWorld), every write that
//! actually changes a block is appended here in write order. Tests compare
//! journals to check that two generation runs made identical mutations.

use std::sync::{Mutex, PoisonError};

use glam::IVec3;
use strata_math::BlockBox;

use crate::registry::MaterialId;

/// One block write that changed the stored material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockChange {
    pub pos: IVec3,
    pub old: MaterialId,
    pub new: MaterialId,
}

#[derive(Debug, Default)]
pub struct ChangeJournal {
    changes: Mutex<Vec<BlockChange>>,
}

impl ChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, change: BlockChange) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
    }

    /// Copy of every recorded change, oldest first.
    pub fn snapshot(&self) -> Vec<BlockChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes every recorded change, leaving the journal empty.
    pub fn drain(&self) -> Vec<BlockChange> {
        std::mem::take(&mut *self.changes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Changes whose position lies inside `bounds`.
    pub fn within(&self, bounds: &BlockBox) -> Vec<BlockChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| bounds.contains(c.pos))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
