//! Per-ring fixed-file table.
//!
//! Maps small indices to registered handles. Only the owning ring mutates it,
//! and delivery only ever reads it.

use crate::error::{RingError, RingResult};
use crate::registry::Handle;

/// Largest number of slots a table may hold.
pub const FIXED_FILE_LIMIT: u32 = 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FixedFileTable {
    slots: Vec<Option<Handle>>,
}

impl FixedFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any table has been installed, even if every slot is empty.
    pub fn is_registered(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of slots, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot holds a handle, whatever the slot count.
    pub fn has_no_entries(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, index: u32) -> Option<Handle> {
        self.slots.get(index as usize).copied().flatten()
    }

    pub(crate) fn install(&mut self, handles: &[Handle]) -> RingResult<()> {
        if self.is_registered() {
            return Err(RingError::Busy("fixed files already registered"));
        }
        if handles.is_empty() || handles.len() > FIXED_FILE_LIMIT as usize {
            return Err(RingError::InvalidArgument(
                "fixed-file count must be within 1..=1024",
            ));
        }
        self.slots = handles.iter().copied().map(Some).collect();
        Ok(())
    }

    pub(crate) fn set(&mut self, index: u32, handle: Handle) -> RingResult<()> {
        if index >= FIXED_FILE_LIMIT {
            return Err(RingError::InvalidArgument("fixed-file index out of range"));
        }
        let index = index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        match self.slots[index] {
            Some(_) => Err(RingError::Busy("fixed-file slot occupied")),
            None => {
                self.slots[index] = Some(handle);
                Ok(())
            }
        }
    }

    pub(crate) fn clear_slot(&mut self, index: u32) -> RingResult<Handle> {
        self.slots
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or(RingError::InvalidArgument("fixed-file slot not registered"))
    }

    pub(crate) fn clear(&mut self) -> RingResult<()> {
        if !self.is_registered() {
            return Err(RingError::NoFixedFiles);
        }
        self.slots.clear();
        Ok(())
    }
}
