//! Allocation tracking, leak reports and usage statistics.
//!
//! The tracker is pure observation: it records which handles are live but
//! never influences how blocks are split or merged. A heap built with
//! diagnostics disabled performs exactly the same block operations.

use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};

use snafu_utils::Location;

use crate::{
    block::HeapPtr,
    error::{DoubleFreeSnafu, HeapError, UnknownPointerSnafu},
};

/// What the tracker knows about one live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Size originally requested by the caller.
    pub size: usize,
    /// Call site of the allocation.
    pub location: Location,
}

/// A live allocation reported by [`Heap::report_leaks`](crate::Heap::report_leaks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakRecord {
    pub ptr: HeapPtr,
    /// Requested size, or the block's usable capacity when diagnostics are
    /// disabled.
    pub size: usize,
    /// Call site of the allocation, when diagnostics are enabled.
    pub location: Option<Location>,
}

/// Usage statistics of a heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes held by allocated blocks, headers included.
    pub total_allocated: usize,
    /// Bytes held by free blocks, headers included.
    pub total_free: usize,
    pub live_allocation_count: usize,
    pub arena_count: usize,
    /// Usable bytes of all arenas; always `total_allocated + total_free`.
    pub arena_bytes: usize,
    pub free_block_count: usize,
    /// Size of the largest free block, headers included.
    pub largest_free_block: usize,
    /// Extent requests made to the arena provider, successful or not.
    pub growth_count: usize,
    pub split_count: usize,
    pub merge_count: usize,
}

/// Live allocations plus the handles that were freed and not reissued.
///
/// `freed` keeps a handle after its block merges into a neighbour, so a
/// late second free is still told apart from a foreign handle. It holds
/// at most one entry per distinct data offset ever handed out, and an entry
/// leaves the set when the same handle is issued again.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    live: BTreeMap<HeapPtr, AllocationRecord>,
    freed: BTreeSet<HeapPtr>,
}

impl Tracker {
    pub(crate) fn track(&mut self, ptr: HeapPtr, size: usize, location: Location) {
        self.freed.remove(&ptr);
        let old = self.live.insert(ptr, AllocationRecord { size, location });
        debug_assert!(old.is_none(), "handle {ptr} issued twice");
    }

    /// Returns the record of a live allocation.
    ///
    /// Fails with [`HeapError::DoubleFree`] if `ptr` was issued and already
    /// freed, and with [`HeapError::UnknownPointer`] if it was never issued.
    pub(crate) fn get(&self, ptr: HeapPtr) -> Result<&AllocationRecord, HeapError> {
        if let Some(record) = self.live.get(&ptr) {
            return Ok(record);
        }
        if self.freed.contains(&ptr) {
            return DoubleFreeSnafu { ptr }.fail();
        }
        UnknownPointerSnafu { ptr }.fail()
    }

    pub(crate) fn untrack(&mut self, ptr: HeapPtr) -> Result<AllocationRecord, HeapError> {
        let record = *self.get(ptr)?;
        self.live.remove(&ptr);
        self.freed.insert(ptr);
        Ok(record)
    }

    /// Records a new requested size for a block resized in place.
    pub(crate) fn resize(&mut self, ptr: HeapPtr, size: usize) {
        if let Some(record) = self.live.get_mut(&ptr) {
            record.size = size;
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn leaks(&self) -> Vec<LeakRecord> {
        self.live
            .iter()
            .map(|(&ptr, record)| LeakRecord {
                ptr,
                size: record.size,
                location: Some(record.location),
            })
            .collect()
    }
}
