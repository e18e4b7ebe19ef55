//! General-purpose heap built on boundary-tagged blocks.
//!
//! # Algorithm
//!
//! - **Free List**: every free block, across all arenas, is linked into one
//!   doubly linked list (see [`FreeList`]).
//! - **Allocation**: the configured [`FitPolicy`](crate::FitPolicy) picks a
//!   free block of at least `align_up(size) + header_size` bytes. Oversized
//!   blocks are split and the remainder goes back to the free list, unless
//!   the remainder would be too small to be a block on its own.
//! - **Growth**: if no free block fits, one new arena is requested from the
//!   [`ArenaProvider`] and the search is retried exactly once.
//! - **Deallocation**: the block is marked free, listed, and immediately
//!   merged with its free physical neighbours, right first and then left, so
//!   no two free blocks are ever adjacent.
//!
//! # Example
//!
//! ```
//! use heap::{Heap, HeapConfig, SystemProvider};
//!
//! let mut heap = Heap::new(SystemProvider::new(), HeapConfig::default()).unwrap();
//! let ptr = heap.allocate(64).unwrap();
//! heap.data_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
//! assert_eq!(&heap.data(ptr).unwrap()[..5], b"hello");
//!
//! heap.free(ptr).unwrap();
//! assert!(heap.free(ptr).unwrap_err().is_double_free());
//! assert!(heap.report_leaks().is_empty());
//! ```

use alloc::vec::Vec;

use snafu::{OptionExt as _, ensure};
use snafu_utils::Location;

use crate::{
    arena::Arenas,
    block::{BlockLayout, BlockRef, HeapPtr},
    config::HeapConfig,
    diagnostics::{HeapStats, LeakRecord, Tracker},
    error::{
        DoubleFreeSnafu, HeapError, InvalidSizeSnafu, InvariantViolationSnafu, OutOfMemorySnafu,
        UnknownPointerSnafu,
    },
    free_list::FreeList,
    growth::GrowthController,
    log::{LogBuffer, Record},
    provider::ArenaProvider,
};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_allocated: usize,
    live: usize,
    splits: usize,
    merges: usize,
}

/// A dynamic memory allocator handing out [`HeapPtr`] handles.
///
/// The heap owns its arenas and the provider they come from. It is a plain
/// value: several independent heaps can coexist, and concurrent use goes
/// through [`LockedHeap`](crate::LockedHeap).
pub struct Heap<P>
where
    P: ArenaProvider,
{
    provider: P,
    config: HeapConfig,
    layout: BlockLayout,
    arenas: Arenas<P::Extent>,
    free_list: FreeList,
    growth: GrowthController,
    tracker: Option<Tracker>,
    counters: Counters,
    events: LogBuffer,
    poisoned: bool,
}

impl<P> Heap<P>
where
    P: ArenaProvider,
{
    /// Creates an empty heap. No memory is requested until the first
    /// allocation.
    pub fn new(provider: P, config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            layout: BlockLayout::new(config.alignment),
            arenas: Arenas::default(),
            free_list: FreeList::default(),
            growth: GrowthController::new(config.min_arena_size, config.alignment),
            tracker: config.diagnostics_enabled.then(Tracker::default),
            counters: Counters::default(),
            events: LogBuffer::default(),
            poisoned: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Bytes of metadata carried by every block.
    #[must_use]
    pub fn header_size(&self) -> usize {
        self.layout.header_size()
    }

    /// Size of the smallest block the heap ever creates.
    #[must_use]
    pub fn min_block_size(&self) -> usize {
        self.layout.min_block_size()
    }

    /// Total block size reserved for a request of `size` bytes.
    #[must_use]
    pub fn block_size_for(&self, size: usize) -> Option<usize> {
        self.layout.block_size_for(size)
    }

    /// Returns `true` once an invariant violation has been detected.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Holds log messages until [`take_log`](Self::take_log) is called.
    pub(crate) fn defer_logging(&mut self) {
        self.events.defer();
    }

    pub(crate) fn take_log(&mut self) -> Vec<Record> {
        self.events.take()
    }

    /// Allocates a block with room for at least `size` bytes.
    ///
    /// The call site is recorded for leak reports when diagnostics are
    /// enabled.
    #[track_caller]
    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        let location = Location::caller();
        self.allocate_at(size, location)
    }

    /// Allocates a block like [`allocate`](Self::allocate) and zeroes its
    /// whole data region.
    #[track_caller]
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        let location = Location::caller();
        let ptr = self.allocate_at(size, location)?;
        self.data_mut(ptr)?.fill(0);
        Ok(ptr)
    }

    /// Returns a block to the heap.
    pub fn free(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        self.ensure_usable()?;
        let result = self.free_block(ptr);
        self.check(result)
    }

    /// Resizes an allocation, preserving the contents up to the smaller of
    /// the old and new sizes.
    ///
    /// The block is resized in place when it already has room or when its
    /// right neighbour is free and large enough; otherwise the data moves to
    /// a new block and the old one is freed.
    #[track_caller]
    pub fn reallocate(&mut self, ptr: HeapPtr, new_size: usize) -> Result<HeapPtr, HeapError> {
        let location = Location::caller();
        self.ensure_usable()?;
        let result = self.resize_in_place(ptr, new_size);
        if self.check(result)? {
            if let Some(tracker) = &mut self.tracker {
                tracker.resize(ptr, new_size);
            }
            trace!(
                self.events,
                "reallocate in place: ptr={ptr}, new_size={new_size}"
            );
            return Ok(ptr);
        }

        let contents = self.data(ptr)?.to_vec();
        let new_ptr = self.allocate_at(new_size, location)?;
        let data = self.data_mut(new_ptr)?;
        let len = usize::min(contents.len(), data.len());
        data[..len].copy_from_slice(&contents[..len]);
        self.free(ptr)?;
        trace!(
            self.events,
            "reallocate moved: ptr={ptr}, new_ptr={new_ptr}, new_size={new_size}"
        );
        Ok(new_ptr)
    }

    /// Returns the data region of a live allocation.
    ///
    /// The slice covers the block's whole usable capacity, which may exceed
    /// the requested size.
    pub fn data(&self, ptr: HeapPtr) -> Result<&[u8], HeapError> {
        let block = self.locate(ptr)?;
        let (start, end) = self
            .layout
            .data_range(block.offset(), self.arenas.size_of(block));
        let arena = self
            .arenas
            .get(block.arena())
            .context(UnknownPointerSnafu { ptr })?;
        Ok(&arena.bytes()[start..end])
    }

    /// Returns the mutable data region of a live allocation.
    pub fn data_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8], HeapError> {
        let block = self.locate(ptr)?;
        let (start, end) = self
            .layout
            .data_range(block.offset(), self.arenas.size_of(block));
        let arena = self
            .arenas
            .get_mut(block.arena())
            .context(UnknownPointerSnafu { ptr })?;
        Ok(&mut arena.bytes_mut()[start..end])
    }

    /// Returns the usable capacity of a live allocation.
    pub fn usable_size(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let block = self.locate(ptr)?;
        Ok(self.layout.capacity(self.arenas.size_of(block)))
    }

    /// Returns the machine address of a live allocation's data region.
    pub fn addr_of(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        self.locate(ptr)?;
        let arena = self
            .arenas
            .get(ptr.arena())
            .context(UnknownPointerSnafu { ptr })?;
        Ok(arena.base_addr() + ptr.offset())
    }

    /// Iterates over every block of every arena, in acquisition and address
    /// order.
    pub fn blocks(&self) -> Blocks<'_, P::Extent> {
        Blocks {
            arenas: &self.arenas,
            layout: self.layout,
            arena: 0,
            offset: 0,
        }
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let arena_bytes = self.arenas.total_size();
        let (free_block_count, largest_free_block) = self
            .free_list
            .iter(&self.arenas)
            .fold((0, 0), |(count, largest), candidate| {
                (count + 1, usize::max(largest, candidate.size))
            });
        HeapStats {
            total_allocated: self.counters.total_allocated,
            total_free: arena_bytes - self.counters.total_allocated,
            live_allocation_count: self.counters.live,
            arena_count: self.arenas.len(),
            arena_bytes,
            free_block_count,
            largest_free_block,
            growth_count: self.growth.requests(),
            split_count: self.counters.splits,
            merge_count: self.counters.merges,
        }
    }

    /// Lists the allocations that are still live.
    ///
    /// With diagnostics enabled the records carry the requested size and the
    /// allocation call site. Without them, allocated blocks are found by
    /// walking the arenas and reported with their usable capacity.
    #[must_use]
    pub fn report_leaks(&self) -> Vec<LeakRecord> {
        match &self.tracker {
            Some(tracker) => tracker.leaks(),
            None => self
                .blocks()
                .filter(|block| !block.is_free)
                .map(|block| LeakRecord {
                    ptr: block.ptr,
                    size: self.layout.capacity(block.size),
                    location: None,
                })
                .collect(),
        }
    }

    /// Walks every arena and the free list, checking that:
    ///
    /// - blocks tile each arena exactly, with mirrored boundary tags
    /// - no two free blocks are adjacent
    /// - a block is listed in the free list iff it is marked free
    /// - allocation counters and the tracker agree with the blocks
    pub fn check_integrity(&self) -> Result<(), HeapError> {
        let min_block_size = self.layout.min_block_size();
        let alignment = self.layout.alignment();
        let mut allocated_bytes = 0;
        let mut allocated_count = 0;
        let mut free_count = 0;

        for (index, arena) in self.arenas.iter().enumerate() {
            let index = u32::try_from(index).ok().context(InvariantViolationSnafu {
                reason: "arena index exceeds 32 bits",
            })?;
            let mut offset = 0;
            let mut prev_free = false;
            while offset < arena.len() {
                let block = BlockRef::new(index, offset);
                let tag = self.arenas.tag(block);
                ensure!(
                    tag.size() >= min_block_size
                        && tag.size().is_multiple_of(alignment)
                        && self.arenas.foot(block) == Some(tag),
                    InvariantViolationSnafu {
                        reason: "boundary tags are inconsistent",
                    }
                );
                if tag.is_free() {
                    ensure!(
                        !prev_free,
                        InvariantViolationSnafu {
                            reason: "adjacent free blocks were not coalesced",
                        }
                    );
                    free_count += 1;
                } else {
                    allocated_bytes += tag.size();
                    allocated_count += 1;
                }
                prev_free = tag.is_free();
                offset += tag.size();
            }
            ensure!(
                offset == arena.len(),
                InvariantViolationSnafu {
                    reason: "blocks do not cover their arena exactly",
                }
            );
        }

        ensure!(
            free_count == self.free_list.len(),
            InvariantViolationSnafu {
                reason: "free block count differs from free list length",
            }
        );
        self.free_list.verify(&self.arenas)?;
        ensure!(
            allocated_bytes == self.counters.total_allocated
                && allocated_count == self.counters.live,
            InvariantViolationSnafu {
                reason: "allocation counters disagree with the arenas",
            }
        );
        if let Some(tracker) = &self.tracker {
            ensure!(
                tracker.live_count() == allocated_count,
                InvariantViolationSnafu {
                    reason: "tracked allocations disagree with the arenas",
                }
            );
        }
        Ok(())
    }

    fn ensure_usable(&self) -> Result<(), HeapError> {
        ensure!(
            !self.poisoned,
            InvariantViolationSnafu {
                reason: "heap is poisoned by an earlier invariant violation",
            }
        );
        Ok(())
    }

    /// Poisons the heap if `result` reports an invariant violation.
    fn check<T>(&mut self, result: Result<T, HeapError>) -> Result<T, HeapError> {
        if let Err(err @ HeapError::InvariantViolation { .. }) = &result {
            self.poisoned = true;
            error!(self.events, "heap poisoned: {err} (at {})", err.location());
        }
        result
    }

    fn allocate_at(&mut self, size: usize, location: Location) -> Result<HeapPtr, HeapError> {
        self.ensure_usable()?;
        let result = self.allocate_block(size);
        let block = self.check(result)?;
        let ptr = self.layout.data_ptr(block);
        if let Some(tracker) = &mut self.tracker {
            tracker.track(ptr, size, location);
        }
        trace!(
            self.events,
            "allocate: size={size}, ptr={ptr}, block_size={}",
            self.arenas.size_of(block)
        );
        Ok(ptr)
    }

    fn allocate_block(&mut self, size: usize) -> Result<BlockRef, HeapError> {
        ensure!(size > 0, InvalidSizeSnafu { size });
        let needed = self
            .layout
            .block_size_for(size)
            .context(InvalidSizeSnafu { size })?;

        let policy = self.config.fit_policy;
        let block = match self.free_list.find_fit(&self.arenas, needed, policy) {
            Some(block) => block,
            None => {
                self.grow(needed)?;
                self.free_list
                    .find_fit(&self.arenas, needed, policy)
                    .context(InvariantViolationSnafu {
                        reason: "new arena cannot hold the request it was grown for",
                    })?
            }
        };

        self.free_list.remove(&mut self.arenas, block)?;
        self.arenas.mark_allocated(block);
        self.split(block, needed)?;
        self.counters.total_allocated += self.arenas.size_of(block);
        self.counters.live += 1;
        Ok(block)
    }

    fn grow(&mut self, needed: usize) -> Result<(), HeapError> {
        let arena = self.growth.grow(&mut self.provider, needed)?;
        let len = arena.len();
        info!(
            self.events,
            "heap grew: requests={}, usable={len}, base={:#x}",
            self.growth.requests(),
            arena.base_addr()
        );
        let index = self
            .arenas
            .push(arena)
            .context(OutOfMemorySnafu { requested: needed })?;
        let block = BlockRef::new(index, 0);
        self.arenas.set_block(block, len, true);
        self.free_list.insert(&mut self.arenas, block)
    }

    /// Shrinks the allocated `block` to `keep` bytes when the surplus exceeds
    /// a minimal block, listing the surplus as a free block.
    fn split(&mut self, block: BlockRef, keep: usize) -> Result<Option<BlockRef>, HeapError> {
        let size = self.arenas.size_of(block);
        let surplus = size - keep;
        if surplus <= self.layout.split_threshold() {
            return Ok(None);
        }

        self.arenas.set_block(block, keep, false);
        let remainder = BlockRef::new(block.arena, block.offset() + keep);
        self.arenas.set_block(remainder, surplus, true);
        self.free_list.insert(&mut self.arenas, remainder)?;
        self.counters.splits += 1;
        debug!(
            self.events,
            "split: ptr={}, kept={keep}, remainder={surplus}",
            self.layout.data_ptr(block)
        );
        Ok(Some(remainder))
    }

    fn free_block(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        let block = self.live_block(ptr)?;
        if let Some(tracker) = &mut self.tracker {
            tracker.untrack(ptr)?;
        }

        let size = self.arenas.size_of(block);
        self.arenas.mark_free(block);
        self.counters.total_allocated -= size;
        self.counters.live -= 1;
        self.free_list.insert(&mut self.arenas, block)?;
        let merged = self.coalesce(block)?;
        trace!(
            self.events,
            "free: ptr={ptr}, size={size}, merged_size={}",
            self.arenas.size_of(merged)
        );
        Ok(())
    }

    /// Resolves a caller handle to its allocated block, consulting the
    /// tracker first when diagnostics are enabled.
    fn live_block(&mut self, ptr: HeapPtr) -> Result<BlockRef, HeapError> {
        let Some(tracker) = &self.tracker else {
            return self.locate(ptr).inspect_err(|err| {
                warn!(self.events, "rejected handle: {err}");
            });
        };

        tracker.get(ptr).inspect_err(|err| {
            warn!(self.events, "rejected handle: {err}");
        })?;
        match self.locate(ptr) {
            Ok(block) => Ok(block),
            Err(err) => {
                error!(self.events, "tracked handle {ptr} has no intact block: {err}");
                InvariantViolationSnafu {
                    reason: "live allocation has corrupted metadata",
                }
                .fail()
            }
        }
    }

    /// Resolves a handle to its allocated block using block metadata only.
    fn locate(&self, ptr: HeapPtr) -> Result<BlockRef, HeapError> {
        let arena_len = self
            .arenas
            .get(ptr.arena())
            .context(UnknownPointerSnafu { ptr })?
            .len();
        ensure!(ptr.offset() < arena_len, UnknownPointerSnafu { ptr });
        let block = self
            .layout
            .block_of(ptr)
            .context(UnknownPointerSnafu { ptr })?;
        ensure!(
            block.offset().is_multiple_of(self.layout.alignment())
                && block.offset() + self.layout.min_block_size() <= arena_len,
            UnknownPointerSnafu { ptr }
        );

        let tag = self.arenas.tag(block);
        let intact = tag.size() >= self.layout.min_block_size()
            && tag.size().is_multiple_of(self.layout.alignment())
            && self.arenas.foot(block) == Some(tag);
        if !intact {
            return self.classify_stale(ptr);
        }
        ensure!(!tag.is_free(), DoubleFreeSnafu { ptr });
        Ok(block)
    }

    /// Explains why `ptr` does not start an intact block: a handle inside a
    /// free block was freed (and possibly merged away), anything else was
    /// never issued.
    fn classify_stale(&self, ptr: HeapPtr) -> Result<BlockRef, HeapError> {
        let inside_free = self
            .blocks()
            .filter(|block| block.arena == ptr.arena())
            .find(|block| block.offset <= ptr.offset() && ptr.offset() < block.offset + block.size)
            .is_some_and(|block| block.is_free);
        if inside_free {
            DoubleFreeSnafu { ptr }.fail()
        } else {
            UnknownPointerSnafu { ptr }.fail()
        }
    }

    /// Merges a newly freed, listed block with its free physical neighbours.
    ///
    /// At most two merges happen: with the successor, then with the
    /// predecessor. Returns the resulting block.
    fn coalesce(&mut self, block: BlockRef) -> Result<BlockRef, HeapError> {
        let min_block_size = self.layout.min_block_size();
        let mut block = block;

        if let Some(next) = self.arenas.successor(block) {
            let tag = self.arenas.tag(next);
            ensure!(
                tag.size() >= min_block_size && self.arenas.foot(next) == Some(tag),
                InvariantViolationSnafu {
                    reason: "boundary tag mismatch on successor block",
                }
            );
            if tag.is_free() {
                self.merge(block, next)?;
            }
        }

        if let Some(foot) = self.arenas.preceding_foot(block) {
            let prev_offset = block
                .offset()
                .checked_sub(foot.size())
                .filter(|_| foot.size() >= min_block_size)
                .context(InvariantViolationSnafu {
                    reason: "boundary tag mismatch on predecessor block",
                })?;
            let prev = BlockRef::new(block.arena, prev_offset);
            ensure!(
                self.arenas.tag(prev) == foot,
                InvariantViolationSnafu {
                    reason: "boundary tag mismatch on predecessor block",
                }
            );
            if foot.is_free() {
                self.merge(prev, block)?;
                block = prev;
            }
        }

        Ok(block)
    }

    /// Merges two physically adjacent, listed free blocks into `left`.
    fn merge(&mut self, left: BlockRef, right: BlockRef) -> Result<(), HeapError> {
        let size = self.arenas.size_of(left) + self.arenas.size_of(right);
        self.free_list.remove(&mut self.arenas, left)?;
        self.free_list.remove(&mut self.arenas, right)?;
        self.arenas.clear_head(right);
        self.arenas.set_block(left, size, true);
        self.free_list.insert(&mut self.arenas, left)?;
        self.counters.merges += 1;
        debug!(
            self.events,
            "merge: arena={}, offset={:#x}, size={size}",
            left.arena,
            left.offset()
        );
        Ok(())
    }

    /// Tries to resize the block behind `ptr` without moving it.
    ///
    /// Returns `Ok(false)` when the block has to move.
    fn resize_in_place(&mut self, ptr: HeapPtr, new_size: usize) -> Result<bool, HeapError> {
        ensure!(new_size > 0, InvalidSizeSnafu { size: new_size });
        let needed = self
            .layout
            .block_size_for(new_size)
            .context(InvalidSizeSnafu { size: new_size })?;
        let block = self.live_block(ptr)?;
        let size = self.arenas.size_of(block);

        if needed <= size {
            if let Some(remainder) = self.split(block, needed)? {
                self.counters.total_allocated -= size - needed;
                self.coalesce(remainder)?;
            }
            return Ok(true);
        }

        let Some(next) = self.arenas.successor(block) else {
            return Ok(false);
        };
        let next_tag = self.arenas.tag(next);
        ensure!(
            next_tag.size() >= self.layout.min_block_size()
                && self.arenas.foot(next) == Some(next_tag),
            InvariantViolationSnafu {
                reason: "boundary tag mismatch on successor block",
            }
        );
        if !next_tag.is_free() || size + next_tag.size() < needed {
            return Ok(false);
        }

        self.free_list.remove(&mut self.arenas, next)?;
        self.arenas.clear_head(next);
        self.arenas.set_block(block, size + next_tag.size(), false);
        self.counters.merges += 1;
        self.split(block, needed)?;
        self.counters.total_allocated += self.arenas.size_of(block) - size;
        Ok(true)
    }
}

/// A block visited by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Handle of the block's data region.
    pub ptr: HeapPtr,
    pub arena: usize,
    /// Block start offset inside the arena.
    pub offset: usize,
    /// Total block size, headers included.
    pub size: usize,
    pub is_free: bool,
}

/// Iterator over the blocks of a heap. See [`Heap::blocks`].
///
/// A block whose tag does not describe a valid block ends the walk of its
/// arena; [`Heap::check_integrity`] reports such corruption.
pub struct Blocks<'a, E> {
    arenas: &'a Arenas<E>,
    layout: BlockLayout,
    arena: usize,
    offset: usize,
}

impl<E> Iterator for Blocks<'_, E>
where
    E: AsRef<[u8]> + AsMut<[u8]>,
{
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let arena_len = self.arenas.get(self.arena)?.len();
            if self.offset >= arena_len {
                self.arena += 1;
                self.offset = 0;
                continue;
            }

            let block = BlockRef::new(u32::try_from(self.arena).ok()?, self.offset);
            let tag = self.arenas.tag(block);
            if tag.size() < self.layout.min_block_size() || tag.size() > arena_len - self.offset {
                self.offset = arena_len;
                continue;
            }

            self.offset += tag.size();
            return Some(BlockInfo {
                ptr: self.layout.data_ptr(block),
                arena: block.arena(),
                offset: block.offset(),
                size: tag.size(),
                is_free: tag.is_free(),
            });
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::MAX_ARENA_SIZE,
        config::FitPolicy,
        provider::{BufferProvider, SystemProvider},
    };

    /// Fills allocations with a pattern and checks it on free, like a
    /// careless caller that relies on nothing else touching its memory.
    struct TestHeap<P>
    where
        P: ArenaProvider,
    {
        heap: Heap<P>,
    }

    impl<P> TestHeap<P>
    where
        P: ArenaProvider,
    {
        #[track_caller]
        fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
            let ptr = self.heap.allocate(size)?;
            self.heap.data_mut(ptr).unwrap()[..size].fill(0x33);
            Ok(ptr)
        }

        fn free(&mut self, ptr: HeapPtr, size: usize) {
            let data = self.heap.data_mut(ptr).unwrap();
            assert!(data[..size].iter().all(|&b| b == 0x33));
            data[..size].fill(0x55);
            self.heap.free(ptr).unwrap();
        }
    }

    struct CountingProvider {
        inner: SystemProvider,
        calls: usize,
    }

    impl ArenaProvider for CountingProvider {
        type Extent = Box<[u8]>;

        fn granularity(&self) -> usize {
            self.inner.granularity()
        }

        fn request_extent(&mut self, min_bytes: usize) -> Option<Self::Extent> {
            self.calls += 1;
            self.inner.request_extent(min_bytes)
        }
    }

    fn small_config() -> HeapConfig {
        HeapConfig::new()
            .with_alignment(8)
            .with_min_arena_size(1024)
    }

    fn with_heap<F>(config: HeapConfig, test_fn: F)
    where
        F: FnOnce(&mut TestHeap<SystemProvider>),
    {
        let heap = Heap::new(SystemProvider::new(), config).unwrap();
        let mut heap = TestHeap { heap };
        test_fn(&mut heap);
        heap.heap.check_integrity().unwrap();
        assert_conserved(&heap.heap);
    }

    fn assert_conserved<P>(heap: &Heap<P>)
    where
        P: ArenaProvider,
    {
        let stats = heap.stats();
        assert_eq!(stats.total_allocated + stats.total_free, stats.arena_bytes);
        let (live, free) = heap.blocks().fold((0, 0), |(live, free), block| {
            if block.is_free {
                (live, free + block.size)
            } else {
                (live + block.size, free)
            }
        });
        assert_eq!(live, stats.total_allocated);
        assert_eq!(free, stats.total_free);
    }

    fn layout_of<P>(heap: &Heap<P>) -> Vec<(usize, usize, usize, bool)>
    where
        P: ArenaProvider,
    {
        heap.blocks()
            .map(|b| (b.arena, b.offset, b.size, b.is_free))
            .collect()
    }

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn below(&mut self, n: usize) -> usize {
            usize::try_from(self.next() % u64::try_from(n).unwrap()).unwrap()
        }
    }

    #[test]
    fn test_basic_allocation() {
        with_heap(small_config(), |heap| {
            let ptr = heap.allocate(64).unwrap();
            assert!(heap.heap.usable_size(ptr).unwrap() >= 64);
            assert_eq!(heap.heap.stats().live_allocation_count, 1);
            heap.free(ptr, 64);
            assert_eq!(heap.heap.stats().live_allocation_count, 0);
        });
    }

    #[test]
    fn test_multiple_allocations() {
        with_heap(small_config(), |heap| {
            let ptr1 = heap.allocate(64).unwrap();
            let ptr2 = heap.allocate(64).unwrap();
            let ptr3 = heap.allocate(64).unwrap();
            assert_ne!(ptr1, ptr2);
            assert_ne!(ptr2, ptr3);
            assert_ne!(ptr1, ptr3);

            heap.free(ptr1, 64);
            heap.free(ptr2, 64);
            heap.free(ptr3, 64);
        });
    }

    #[test]
    fn test_zero_size_is_invalid() {
        with_heap(small_config(), |heap| {
            let err = heap.heap.allocate(0).unwrap_err();
            assert!(err.is_invalid_size());
            assert_eq!(heap.heap.stats().growth_count, 0);
            assert_eq!(heap.heap.stats().arena_count, 0);
        });
    }

    #[test]
    fn test_overflowing_size_is_invalid() {
        with_heap(small_config(), |heap| {
            assert!(heap.heap.allocate(usize::MAX).unwrap_err().is_invalid_size());
            assert!(heap.heap.allocate(usize::MAX - 7).unwrap_err().is_invalid_size());
            assert!(
                heap.heap
                    .allocate(isize::MAX as usize)
                    .unwrap_err()
                    .is_invalid_size()
            );
            assert_eq!(heap.heap.stats().growth_count, 0);
        });
    }

    #[test]
    fn test_request_larger_than_any_arena() {
        with_heap(small_config(), |heap| {
            let err = heap.heap.allocate(MAX_ARENA_SIZE).unwrap_err();
            assert!(err.is_out_of_memory());
            assert_eq!(heap.heap.provider().handed_out(), 0);
        });
    }

    #[test]
    fn test_growth_on_empty_free_list() {
        let provider = CountingProvider {
            inner: SystemProvider::new(),
            calls: 0,
        };
        let mut heap = Heap::new(provider, small_config()).unwrap();
        let ptr = heap.allocate(8000).unwrap();
        assert_eq!(heap.provider().calls, 1);
        assert_eq!(ptr.arena(), 0);
        assert_eq!(heap.stats().arena_count, 1);
        assert_eq!(heap.stats().growth_count, 1);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn test_growth_when_no_block_fits() {
        let provider = CountingProvider {
            inner: SystemProvider::new(),
            calls: 0,
        };
        let mut heap = Heap::new(provider, small_config()).unwrap();
        let first = heap.allocate(16).unwrap();
        assert_eq!(heap.provider().calls, 1);

        let largest = heap.stats().largest_free_block;
        let big = heap.allocate(largest * 2).unwrap();
        assert_eq!(heap.provider().calls, 2);
        assert_eq!(big.arena(), 1);
        assert_eq!(heap.stats().arena_count, 2);

        heap.free(first).unwrap();
        heap.free(big).unwrap();
        heap.check_integrity().unwrap();
        assert_eq!(heap.stats().free_block_count, 2);
    }

    #[test]
    fn test_out_of_memory_is_propagated() {
        let provider = CountingProvider {
            inner: SystemProvider::new().with_limit(4096),
            calls: 0,
        };
        let mut heap = Heap::new(provider, small_config()).unwrap();
        let ptr = heap.allocate(100).unwrap();
        heap.data_mut(ptr).unwrap()[..100].fill(0x42);
        assert_eq!(heap.provider().calls, 1);

        // one refused extent request, no retry
        let err = heap.allocate(8000).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(heap.provider().calls, 2);
        assert!(!heap.is_poisoned());
        heap.check_integrity().unwrap();
        assert!(heap.data(ptr).unwrap()[..100].iter().all(|&b| b == 0x42));

        let small = heap.allocate(100).unwrap();
        assert_eq!(small.arena(), 0);
        assert_eq!(heap.stats().arena_count, 1);
        assert_eq!(heap.provider().calls, 2);
    }

    #[test]
    fn test_fragmentation_and_coalescing() {
        with_heap(small_config(), |heap| {
            let ptr1 = heap.allocate(64).unwrap();
            let ptr2 = heap.allocate(64).unwrap();
            let ptr3 = heap.allocate(64).unwrap();
            assert!(ptr1 < ptr2 && ptr2 < ptr3);

            heap.free(ptr2, 64);
            heap.free(ptr1, 64);

            // the coalesced space of the first two blocks serves a larger
            // request: 2 * 96 - 32 = 160 usable bytes
            let large = heap.allocate(160).unwrap();
            assert_eq!(large, ptr1);

            heap.free(large, 160);
            heap.free(ptr3, 64);
            assert_eq!(heap.heap.stats().free_block_count, 1);
        });
    }

    #[test]
    fn test_best_fit_selects_smallest_fitting_block() {
        with_heap(small_config(), |heap| {
            // blocks of 40, 64 and 104 bytes, separated by allocated guards
            let a = heap.allocate(8).unwrap();
            let _s1 = heap.allocate(8).unwrap();
            let b = heap.allocate(32).unwrap();
            let _s2 = heap.allocate(8).unwrap();
            let c = heap.allocate(72).unwrap();
            let _s3 = heap.allocate(8).unwrap();
            heap.free(a, 8);
            heap.free(b, 32);
            heap.free(c, 72);

            let sizes = heap
                .heap
                .blocks()
                .filter(|block| block.is_free)
                .map(|block| block.size)
                .take(3)
                .collect::<Vec<_>>();
            assert_eq!(sizes, [40, 64, 104]);

            let ptr = heap.allocate(32).unwrap();
            assert_eq!(ptr, b);

            // a 104-byte block serving a 72-byte need has too little surplus
            // to split, so the whole block is handed out
            let ptr = heap.allocate(33).unwrap();
            assert_eq!(ptr, c);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 72);
        });
    }

    #[test]
    fn test_first_and_worst_fit() {
        for (policy, expect_c) in [(FitPolicy::FirstFit, true), (FitPolicy::WorstFit, false)] {
            with_heap(small_config().with_fit_policy(policy), |heap| {
                let a = heap.allocate(8).unwrap();
                let _s1 = heap.allocate(8).unwrap();
                let b = heap.allocate(32).unwrap();
                let _s2 = heap.allocate(8).unwrap();
                let c = heap.allocate(72).unwrap();
                let s3 = heap.allocate(8).unwrap();
                heap.free(a, 8);
                heap.free(b, 32);
                heap.free(c, 72);

                // free list order is c, b, a, then the arena tail
                let ptr = heap.allocate(32).unwrap();
                if expect_c {
                    assert_eq!(ptr, c);
                } else {
                    assert!(ptr > s3);
                }
            });
        }
    }

    #[test]
    fn test_split_boundary() {
        with_heap(small_config(), |heap| {
            let x = heap.allocate(64).unwrap(); // 96-byte block
            let _guard = heap.allocate(8).unwrap();
            heap.free(x, 64);
            let splits = heap.heap.stats().split_count;

            // 72-byte need leaves 24 bytes: below header + min payload
            let ptr = heap.allocate(40).unwrap();
            assert_eq!(ptr, x);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 64);
            assert_eq!(heap.heap.stats().split_count, splits);
            heap.free(ptr, 40);

            // 56-byte need leaves exactly header + min payload: kept whole
            let ptr = heap.allocate(24).unwrap();
            assert_eq!(ptr, x);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 64);
            assert_eq!(heap.heap.stats().split_count, splits);
            heap.free(ptr, 24);

            // 48-byte need leaves 48 bytes, one alignment unit more
            let ptr = heap.allocate(16).unwrap();
            assert_eq!(ptr, x);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 16);
            assert_eq!(heap.heap.stats().split_count, splits + 1);
            let min_block = heap.heap.min_block_size();
            assert!(
                heap.heap
                    .blocks()
                    .any(|block| block.is_free && block.size == min_block + 8)
            );
            heap.free(ptr, 16);
        });
    }

    #[test]
    fn test_coalescing_order_does_not_matter() {
        let run = |free_a_first: bool| {
            let mut heap = Heap::new(SystemProvider::new(), small_config()).unwrap();
            let a = heap.allocate(24).unwrap();
            let b = heap.allocate(40).unwrap();
            let _guard = heap.allocate(8).unwrap();
            if free_a_first {
                heap.free(a).unwrap();
                heap.free(b).unwrap();
            } else {
                heap.free(b).unwrap();
                heap.free(a).unwrap();
            }
            heap.check_integrity().unwrap();
            layout_of(&heap)
        };
        let together = {
            let mut heap = Heap::new(SystemProvider::new(), small_config()).unwrap();
            let ab = heap.allocate(96).unwrap();
            let _guard = heap.allocate(8).unwrap();
            heap.free(ab).unwrap();
            layout_of(&heap)
        };

        assert_eq!(run(true), run(false));
        assert_eq!(run(true), together);
        assert_eq!(together[0], (0, 0, 128, true));
    }

    #[test]
    fn test_three_way_merge() {
        with_heap(small_config(), |heap| {
            let a = heap.allocate(24).unwrap();
            let b = heap.allocate(24).unwrap();
            let c = heap.allocate(24).unwrap();
            let _guard = heap.allocate(8).unwrap();
            heap.free(a, 24);
            heap.free(c, 24);
            let merges = heap.heap.stats().merge_count;
            let free_blocks = heap.heap.stats().free_block_count;

            heap.free(b, 24);
            assert_eq!(heap.heap.stats().merge_count, merges + 2);
            assert_eq!(heap.heap.stats().free_block_count, free_blocks - 1);
            let first = heap.heap.blocks().next().unwrap();
            assert_eq!((first.offset, first.size, first.is_free), (0, 168, true));
        });
    }

    #[test]
    fn test_allocate_entire_arena() {
        with_heap(small_config(), |heap| {
            let first = heap.allocate(8).unwrap();
            heap.free(first, 8);
            let arena_bytes = heap.heap.stats().arena_bytes;
            let size = arena_bytes - heap.heap.header_size();

            let ptr = heap.allocate(size).unwrap();
            assert_eq!(heap.heap.stats().free_block_count, 0);
            assert_eq!(heap.heap.stats().total_free, 0);
            heap.free(ptr, size);

            let ptr = heap.allocate(size).unwrap();
            assert_eq!(heap.heap.stats().arena_count, 1);
            heap.free(ptr, size);
        });
    }

    #[test]
    fn test_reallocation_after_full_deallocation() {
        let mut buffer = vec![0u8; 8192];
        let provider = BufferProvider::new(&mut buffer);
        let heap = Heap::new(provider, small_config()).unwrap();
        let mut heap = TestHeap { heap };

        let mut ptrs = Vec::new();
        loop {
            match heap.allocate(100) {
                Ok(ptr) => ptrs.push(ptr),
                Err(err) => {
                    assert!(err.is_out_of_memory());
                    break;
                }
            }
        }
        assert!(ptrs.len() > 40);
        assert!(heap.heap.stats().arena_count >= 7);

        for ptr in ptrs {
            heap.free(ptr, 100);
        }
        heap.heap.check_integrity().unwrap();
        assert_eq!(heap.heap.stats().total_allocated, 0);
        assert_eq!(
            heap.heap.stats().free_block_count,
            heap.heap.stats().arena_count
        );

        let ptr = heap.allocate(100).unwrap();
        heap.free(ptr, 100);
    }

    #[test]
    fn test_no_overlap_and_round_trip() {
        with_heap(small_config(), |heap| {
            let mut live = Vec::new();
            for i in 0..120_usize {
                let size = 1 + (i * 37) % 300;
                let ptr = heap.heap.allocate(size).unwrap();
                let byte = u8::try_from(i % 251).unwrap();
                heap.heap.data_mut(ptr).unwrap()[..size].fill(byte);
                live.push((ptr, size, byte));
            }

            // drop every third allocation and refill the holes
            let mut kept = Vec::new();
            for (i, entry) in live.into_iter().enumerate() {
                if i % 3 == 0 {
                    heap.heap.free(entry.0).unwrap();
                } else {
                    kept.push(entry);
                }
            }
            for i in 0..40_usize {
                let size = 1 + (i * 53) % 200;
                let ptr = heap.heap.allocate(size).unwrap();
                heap.heap.data_mut(ptr).unwrap()[..size].fill(0xee);
                kept.push((ptr, size, 0xee));
            }

            for &(ptr, size, byte) in &kept {
                assert!(heap.heap.data(ptr).unwrap()[..size].iter().all(|&b| b == byte));
            }

            let mut ranges = kept
                .iter()
                .map(|&(ptr, size, _)| {
                    let addr = heap.heap.addr_of(ptr).unwrap();
                    (addr, addr + size)
                })
                .collect::<Vec<_>>();
            ranges.sort_unstable();
            for pair in ranges.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "{pair:?}");
            }

            for (ptr, _, _) in kept {
                heap.heap.free(ptr).unwrap();
            }
            assert_eq!(heap.heap.stats().live_allocation_count, 0);
        });
    }

    #[test]
    fn test_random_sequence_preserves_invariants() {
        for policy in [FitPolicy::BestFit, FitPolicy::FirstFit, FitPolicy::WorstFit] {
            let mut rng = XorShift(0x2545_f491_4f6c_dd1d);
            with_heap(small_config().with_fit_policy(policy), |heap| {
                let mut live: Vec<(HeapPtr, usize, u8)> = Vec::new();
                for step in 0..600 {
                    if live.is_empty() || rng.below(3) != 0 {
                        let size = 1 + rng.below(400);
                        let ptr = heap.heap.allocate(size).unwrap();
                        let byte = u8::try_from(step % 256).unwrap();
                        heap.heap.data_mut(ptr).unwrap()[..size].fill(byte);
                        live.push((ptr, size, byte));
                    } else {
                        let (ptr, size, byte) = live.swap_remove(rng.below(live.len()));
                        assert!(heap.heap.data(ptr).unwrap()[..size].iter().all(|&b| b == byte));
                        heap.heap.free(ptr).unwrap();
                    }
                    assert_conserved(&heap.heap);
                    if step % 50 == 0 {
                        heap.heap.check_integrity().unwrap();
                    }
                }
                for (ptr, _, _) in live {
                    heap.heap.free(ptr).unwrap();
                }
            });
        }
    }

    #[test]
    fn test_double_free_is_detected() {
        for diagnostics in [true, false] {
            with_heap(small_config().with_diagnostics(diagnostics), |heap| {
                let ptr = heap.allocate(32).unwrap();
                let _guard = heap.allocate(8).unwrap();
                heap.free(ptr, 32);
                let before = heap.heap.stats();

                let err = heap.heap.free(ptr).unwrap_err();
                assert!(err.is_double_free(), "diagnostics={diagnostics}: {err}");
                assert!(!heap.heap.is_poisoned());
                assert_eq!(heap.heap.stats(), before);
                assert_conserved(&heap.heap);
            });
        }
    }

    #[test]
    fn test_double_free_after_merge_is_detected() {
        for diagnostics in [true, false] {
            with_heap(small_config().with_diagnostics(diagnostics), |heap| {
                let a = heap.allocate(24).unwrap();
                let b = heap.allocate(40).unwrap();
                let _guard = heap.allocate(8).unwrap();
                heap.free(a, 24);
                heap.free(b, 40);

                assert!(heap.heap.free(b).unwrap_err().is_double_free());
                assert!(heap.heap.free(a).unwrap_err().is_double_free());
                assert!(heap.heap.data(b).is_err());
            });
        }
    }

    #[test]
    fn test_unknown_pointer_is_rejected() {
        for diagnostics in [true, false] {
            with_heap(small_config().with_diagnostics(diagnostics), |heap| {
                let ptr = heap.allocate(64).unwrap();
                let forged = [
                    HeapPtr::new(5, 32),
                    HeapPtr::new(0, 3),
                    HeapPtr::new(0, u32::MAX),
                    HeapPtr::new(0, u32::try_from(ptr.offset() + 8).unwrap()),
                ];
                for bad in forged {
                    let err = heap.heap.free(bad).unwrap_err();
                    assert!(err.is_unknown_pointer(), "{bad}: {err}");
                }
                assert!(!heap.heap.is_poisoned());
                heap.free(ptr, 64);
            });
        }
    }

    #[test]
    fn test_leak_report() {
        with_heap(small_config(), |heap| {
            let p16 = heap.heap.allocate(16).unwrap();
            let p32 = heap.heap.allocate(32).unwrap();
            let p48 = heap.heap.allocate(48).unwrap();
            heap.heap.free(p16).unwrap();
            heap.heap.free(p32).unwrap();

            let leaks = heap.heap.report_leaks();
            assert_eq!(leaks.len(), 1);
            assert_eq!(leaks[0].ptr, p48);
            assert_eq!(leaks[0].size, 48);
            let location = leaks[0].location.unwrap().to_string();
            assert!(location.contains("heap.rs"), "{location}");

            heap.heap.free(p48).unwrap();
            assert!(heap.heap.report_leaks().is_empty());
        });
    }

    #[test]
    fn test_leak_report_without_diagnostics() {
        with_heap(small_config().with_diagnostics(false), |heap| {
            let p16 = heap.heap.allocate(16).unwrap();
            let p32 = heap.heap.allocate(32).unwrap();
            let p45 = heap.heap.allocate(45).unwrap();
            heap.heap.free(p16).unwrap();
            heap.heap.free(p32).unwrap();

            let leaks = heap.heap.report_leaks();
            assert_eq!(leaks.len(), 1);
            assert_eq!(leaks[0].ptr, p45);
            assert_eq!(leaks[0].size, 48);
            assert_eq!(leaks[0].location, None);
            heap.heap.free(p45).unwrap();
        });
    }

    #[test]
    fn test_diagnostics_do_not_change_block_operations() {
        let run = |diagnostics: bool| {
            let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
            let config = small_config().with_diagnostics(diagnostics);
            let mut heap = Heap::new(SystemProvider::new(), config).unwrap();
            let mut live = Vec::new();
            for _ in 0..300 {
                if live.is_empty() || rng.below(2) == 0 {
                    live.push(heap.allocate(1 + rng.below(200)).unwrap());
                } else {
                    heap.free(live.swap_remove(rng.below(live.len()))).unwrap();
                }
            }
            let stats = heap.stats();
            (layout_of(&heap), stats.split_count, stats.merge_count)
        };
        assert_eq!(run(true), run(false));
    }

    #[test]
    fn test_invariant_violation_poisons_heap() {
        let mut heap = Heap::new(SystemProvider::new(), small_config()).unwrap();
        let a = heap.allocate(24).unwrap(); // block 0..56
        let _b = heap.allocate(40).unwrap(); // block 56..128
        let c = heap.allocate(8).unwrap();

        // clobber the tail tag of `b`
        heap.arenas.get_mut(0).unwrap().bytes_mut()[120..128].fill(0xab);

        let err = heap.free(a).unwrap_err();
        assert!(err.is_invariant_violation(), "{err}");
        assert!(heap.is_poisoned());
        assert!(heap.allocate(8).unwrap_err().is_invariant_violation());
        assert!(heap.free(c).unwrap_err().is_invariant_violation());
        assert!(heap.check_integrity().unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_predecessor_tag_mismatch_poisons_heap() {
        let mut heap = Heap::new(SystemProvider::new(), small_config()).unwrap();
        let _a = heap.allocate(24).unwrap(); // block 0..56
        let b = heap.allocate(40).unwrap(); // block 56..128
        let _guard = heap.allocate(8).unwrap();

        // clobber the head tag of `a`; its tail tag still claims 56 bytes
        heap.arenas.get_mut(0).unwrap().bytes_mut()[0..8].fill(0xcd);

        let err = heap.free(b).unwrap_err();
        assert!(err.is_invariant_violation(), "{err}");
        assert!(err.to_string().contains("predecessor"), "{err}");
        assert!(heap.is_poisoned());
        assert!(heap.allocate(8).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_reallocate_shrinks_in_place() {
        with_heap(small_config(), |heap| {
            let ptr = heap.allocate(200).unwrap();
            let _guard = heap.allocate(8).unwrap();
            let splits = heap.heap.stats().split_count;

            let new_ptr = heap.heap.reallocate(ptr, 50).unwrap();
            assert_eq!(new_ptr, ptr);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 56);
            assert_eq!(heap.heap.stats().split_count, splits + 1);
            assert!(heap.heap.data(ptr).unwrap()[..50].iter().all(|&b| b == 0x33));
            heap.heap.check_integrity().unwrap();
            heap.free(ptr, 50);
        });
    }

    #[test]
    fn test_reallocate_grows_into_free_neighbour() {
        with_heap(small_config(), |heap| {
            let ptr = heap.allocate(64).unwrap();
            let new_ptr = heap.heap.reallocate(ptr, 500).unwrap();
            assert_eq!(new_ptr, ptr);
            assert_eq!(heap.heap.usable_size(ptr).unwrap(), 504);
            assert!(heap.heap.data(ptr).unwrap()[..64].iter().all(|&b| b == 0x33));
            assert_eq!(heap.heap.report_leaks()[0].size, 500);
            heap.heap.check_integrity().unwrap();
            heap.heap.free(ptr).unwrap();
        });
    }

    #[test]
    fn test_reallocate_moves_when_blocked() {
        with_heap(small_config(), |heap| {
            let ptr = heap.allocate(64).unwrap();
            let guard = heap.allocate(8).unwrap();

            let new_ptr = heap.heap.reallocate(ptr, 1000).unwrap();
            assert_ne!(new_ptr, ptr);
            assert!(heap.heap.data(new_ptr).unwrap()[..64].iter().all(|&b| b == 0x33));
            assert!(heap.heap.free(ptr).unwrap_err().is_double_free());
            assert_eq!(heap.heap.stats().live_allocation_count, 2);

            heap.heap.free(new_ptr).unwrap();
            heap.free(guard, 8);
        });
    }

    #[test]
    fn test_reallocate_rejects_bad_input() {
        with_heap(small_config(), |heap| {
            let ptr = heap.allocate(16).unwrap();
            assert!(heap.heap.reallocate(ptr, 0).unwrap_err().is_invalid_size());
            assert!(
                heap.heap
                    .reallocate(HeapPtr::new(3, 64), 16)
                    .unwrap_err()
                    .is_unknown_pointer()
            );
            heap.free(ptr, 16);
        });
    }

    #[test]
    fn test_allocate_zeroed_clears_reused_memory() {
        with_heap(small_config(), |heap| {
            let ptr = heap.heap.allocate(64).unwrap();
            heap.heap.data_mut(ptr).unwrap().fill(0xff);
            heap.heap.free(ptr).unwrap();

            let zeroed = heap.heap.allocate_zeroed(64).unwrap();
            assert_eq!(zeroed, ptr);
            assert!(heap.heap.data(zeroed).unwrap().iter().all(|&b| b == 0));
            heap.heap.free(zeroed).unwrap();
        });
    }

    #[test]
    fn test_large_alignment() {
        with_heap(small_config().with_alignment(64), |heap| {
            assert_eq!(heap.heap.header_size(), 128);
            let mut ptrs = Vec::new();
            for size in [1, 63, 64, 65, 300] {
                let ptr = heap.allocate(size).unwrap();
                assert_eq!(heap.heap.addr_of(ptr).unwrap() % 64, 0);
                assert_eq!(heap.heap.usable_size(ptr).unwrap() % 64, 0);
                ptrs.push((ptr, size));
            }
            for (ptr, size) in ptrs {
                heap.free(ptr, size);
            }
        });
    }

    #[test]
    fn test_growth_is_logged() {
        let logger = crate::log::tests::capture();
        let mut heap = Heap::new(SystemProvider::new(), small_config()).unwrap();
        let ptr = heap.allocate(16).unwrap();
        heap.free(ptr).unwrap();
        assert!(logger.contains("heap grew"));
        assert!(logger.contains("allocate: size=16"));
    }
}
