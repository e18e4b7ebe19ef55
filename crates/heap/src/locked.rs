use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::{
    block::HeapPtr,
    diagnostics::{HeapStats, LeakRecord},
    error::{HeapError, InvalidSizeSnafu},
    heap::Heap,
    log,
    provider::ArenaProvider,
};

/// A [`Heap`] behind a spin lock, shareable between threads.
///
/// Every operation holds the lock for its whole duration, so operations on
/// a `LockedHeap` are linearizable. Data is accessed through copying
/// [`read`](Self::read) and [`write`](Self::write) or through
/// [`with_lock`](Self::with_lock).
///
/// Log messages produced while the lock is held are buffered and handed to
/// the [`Logger`](crate::log::Logger) after it is released, so a logger may
/// itself use the heap.
pub struct LockedHeap<P>
where
    P: ArenaProvider,
{
    inner: Mutex<Heap<P>>,
}

impl<P> LockedHeap<P>
where
    P: ArenaProvider,
{
    pub fn new(mut heap: Heap<P>) -> Self {
        heap.defer_logging();
        Self {
            inner: Mutex::new(heap),
        }
    }

    /// Runs `f` with the heap locked, for sequences of operations that
    /// must not interleave with other threads.
    ///
    /// `f` runs inside the critical section and must not use this
    /// `LockedHeap` itself.
    pub fn with_lock<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Heap<P>) -> T,
    {
        let mut heap = self.inner.lock();
        let result = f(&mut heap);
        release(heap);
        result
    }

    #[track_caller]
    pub fn allocate(&self, size: usize) -> Result<HeapPtr, HeapError> {
        let mut heap = self.inner.lock();
        let result = heap.allocate(size);
        release(heap);
        result
    }

    #[track_caller]
    pub fn allocate_zeroed(&self, size: usize) -> Result<HeapPtr, HeapError> {
        let mut heap = self.inner.lock();
        let result = heap.allocate_zeroed(size);
        release(heap);
        result
    }

    #[track_caller]
    pub fn reallocate(&self, ptr: HeapPtr, new_size: usize) -> Result<HeapPtr, HeapError> {
        let mut heap = self.inner.lock();
        let result = heap.reallocate(ptr, new_size);
        release(heap);
        result
    }

    pub fn free(&self, ptr: HeapPtr) -> Result<(), HeapError> {
        let mut heap = self.inner.lock();
        let result = heap.free(ptr);
        release(heap);
        result
    }

    /// Copies `buf.len()` bytes starting at `offset` of the allocation's data
    /// region into `buf`.
    pub fn read(&self, ptr: HeapPtr, offset: usize, buf: &mut [u8]) -> Result<(), HeapError> {
        self.with_lock(|heap| {
            let data = heap.data(ptr)?;
            let src = offset
                .checked_add(buf.len())
                .and_then(|end| data.get(offset..end))
                .ok_or_else(|| out_of_bounds(offset, buf.len()))?;
            buf.copy_from_slice(src);
            Ok(())
        })
    }

    /// Copies `buf` into the allocation's data region starting at `offset`.
    pub fn write(&self, ptr: HeapPtr, offset: usize, buf: &[u8]) -> Result<(), HeapError> {
        self.with_lock(|heap| {
            let data = heap.data_mut(ptr)?;
            let dst = offset
                .checked_add(buf.len())
                .and_then(|end| data.get_mut(offset..end))
                .ok_or_else(|| out_of_bounds(offset, buf.len()))?;
            dst.copy_from_slice(buf);
            Ok(())
        })
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().stats()
    }

    pub fn report_leaks(&self) -> Vec<LeakRecord> {
        self.inner.lock().report_leaks()
    }

    pub fn check_integrity(&self) -> Result<(), HeapError> {
        self.inner.lock().check_integrity()
    }

    pub fn into_inner(self) -> Heap<P> {
        let mut heap = self.inner.into_inner();
        log::emit(heap.take_log());
        heap
    }
}

/// Unlocks the heap, then emits the messages it buffered.
fn release<P>(mut heap: MutexGuard<'_, Heap<P>>)
where
    P: ArenaProvider,
{
    let records = heap.take_log();
    drop(heap);
    log::emit(records);
}

/// Reports an access reaching past the end of a data region.
#[track_caller]
fn out_of_bounds(offset: usize, len: usize) -> HeapError {
    InvalidSizeSnafu {
        size: offset.saturating_add(len),
    }
    .build()
}
