//! A general-purpose dynamic memory allocator.
//!
//! The heap manages arenas of bytes obtained from an [`ArenaProvider`] and
//! carves them into variable-sized blocks. Each block carries boundary tags
//! at both ends, which makes freeing a block and merging it with its free
//! neighbours constant-time bookkeeping. Allocation searches a single list of
//! free blocks using a configurable [`FitPolicy`].
//!
//! Allocations are named by [`HeapPtr`] handles rather than raw pointers;
//! [`Heap::data`] and [`Heap::data_mut`] give access to the bytes behind a
//! handle. Misuse such as double frees and foreign handles is detected and
//! reported as a [`HeapError`] instead of corrupting the heap.
//!
//! # Usage
//!
//! ```rust
//! use heap::{FitPolicy, Heap, HeapConfig, SystemProvider};
//!
//! let config = HeapConfig::new()
//!     .with_alignment(16)
//!     .with_fit_policy(FitPolicy::BestFit);
//! let mut heap = Heap::new(SystemProvider::new(), config).unwrap();
//!
//! let a = heap.allocate(16).unwrap();
//! let b = heap.allocate(32).unwrap();
//! let c = heap.allocate(48).unwrap();
//! heap.free(a).unwrap();
//! heap.free(b).unwrap();
//!
//! let leaks = heap.report_leaks();
//! assert_eq!(leaks.len(), 1);
//! assert_eq!((leaks[0].ptr, leaks[0].size), (c, 48));
//!
//! let stats = heap.stats();
//! assert_eq!(stats.total_allocated + stats.total_free, stats.arena_bytes);
//! ```
//!
//! # Concurrency
//!
//! [`Heap`] methods take `&mut self`. [`LockedHeap`] wraps a heap in a spin
//! lock so that it can be shared between threads.
//!
//! # Logging
//!
//! The heap logs growth, splits, merges and rejected operations through a
//! process-wide [`Logger`](log::Logger) installed with [`log::set_logger`].
//! A [`LockedHeap`] hands its messages to the logger only after releasing
//! the lock.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

#[macro_use]
pub mod log;

mod arena;
mod block;
mod config;
mod diagnostics;
mod error;
mod fit;
mod free_list;
mod growth;
mod heap;
mod locked;
mod provider;

pub use self::{
    block::{HeapPtr, MAX_ARENA_SIZE},
    config::{
        DEFAULT_ALIGNMENT, DEFAULT_MIN_ARENA_SIZE, FitPolicy, HeapConfig, MAX_ALIGNMENT,
        MIN_ALIGNMENT, ParseFitPolicyError,
    },
    diagnostics::{AllocationRecord, HeapStats, LeakRecord},
    error::HeapError,
    heap::{BlockInfo, Blocks, Heap},
    locked::LockedHeap,
    provider::{ArenaProvider, BufferProvider, PAGE_SIZE, SystemProvider},
};
