//! Sources of raw memory extents for the heap.
//!
//! The heap never obtains memory by itself. When no free block can satisfy a
//! request it asks its [`ArenaProvider`] for a new extent, which then lives
//! for as long as the heap does; extents are never handed back.

use alloc::{boxed::Box, vec::Vec};
use core::mem;

/// Page size used as the default extent granularity.
pub const PAGE_SIZE: usize = 4096;

/// A supplier of zero-initialized memory extents.
///
/// Requests are all-or-nothing: an implementation either returns an extent
/// of at least `min_bytes` bytes or `None`. The heap treats a shorter extent
/// as a failed request.
pub trait ArenaProvider {
    /// Owned handle to an extent's bytes.
    type Extent: AsRef<[u8]> + AsMut<[u8]>;

    /// Granularity the heap rounds its requests up to.
    fn granularity(&self) -> usize {
        1
    }

    /// Requests a zero-initialized extent of at least `min_bytes` bytes.
    fn request_extent(&mut self, min_bytes: usize) -> Option<Self::Extent>;
}

impl<P> ArenaProvider for &mut P
where
    P: ArenaProvider + ?Sized,
{
    type Extent = P::Extent;

    fn granularity(&self) -> usize {
        (**self).granularity()
    }

    fn request_extent(&mut self, min_bytes: usize) -> Option<Self::Extent> {
        (**self).request_extent(min_bytes)
    }
}

/// Provider backed by the global allocator.
///
/// Extents are page-rounded boxed slices. An optional byte limit makes the
/// provider fail once the total handed out would exceed it, which is useful
/// for exercising out-of-memory paths.
///
/// # Examples
///
/// ```
/// use heap::{ArenaProvider as _, SystemProvider};
///
/// let mut provider = SystemProvider::new().with_limit(8192);
/// assert!(provider.request_extent(4096).is_some());
/// assert!(provider.request_extent(8192).is_none());
/// assert_eq!(provider.handed_out(), 4096);
/// ```
#[derive(Debug, Default, Clone)]
pub struct SystemProvider {
    limit: Option<usize>,
    handed_out: usize,
}

impl SystemProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            limit: None,
            handed_out: 0,
        }
    }

    /// Caps the total number of bytes this provider hands out.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the total number of bytes handed out so far.
    #[must_use]
    pub const fn handed_out(&self) -> usize {
        self.handed_out
    }
}

impl ArenaProvider for SystemProvider {
    type Extent = Box<[u8]>;

    fn granularity(&self) -> usize {
        PAGE_SIZE
    }

    fn request_extent(&mut self, min_bytes: usize) -> Option<Self::Extent> {
        let size = min_bytes.checked_next_multiple_of(PAGE_SIZE)?;
        let total = self.handed_out.checked_add(size)?;
        if self.limit.is_some_and(|limit| total > limit) {
            return None;
        }

        let mut extent = Vec::new();
        extent.try_reserve_exact(size).ok()?;
        extent.resize(size, 0);
        self.handed_out = total;
        Some(extent.into_boxed_slice())
    }
}

/// Provider carving extents out of a caller-supplied buffer.
///
/// This is the analogue of handing a statically reserved memory region to an
/// allocator: the buffer is consumed front to back and every extent is zeroed
/// before it is returned.
///
/// # Examples
///
/// ```
/// use heap::{ArenaProvider as _, BufferProvider};
///
/// let mut buffer = [0xaa_u8; 1024];
/// let mut provider = BufferProvider::new(&mut buffer);
/// let extent = provider.request_extent(256).unwrap();
/// assert_eq!(extent.len(), 256);
/// assert!(extent.iter().all(|&b| b == 0));
/// assert_eq!(provider.remaining(), 768);
/// ```
#[derive(Debug)]
pub struct BufferProvider<'a> {
    remaining: &'a mut [u8],
}

impl<'a> BufferProvider<'a> {
    #[must_use]
    pub const fn new(buffer: &'a mut [u8]) -> Self {
        Self { remaining: buffer }
    }

    /// Returns the number of bytes not yet handed out.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl<'a> ArenaProvider for BufferProvider<'a> {
    type Extent = &'a mut [u8];

    fn request_extent(&mut self, min_bytes: usize) -> Option<Self::Extent> {
        if min_bytes > self.remaining.len() {
            return None;
        }
        let (extent, rest) = mem::take(&mut self.remaining).split_at_mut(min_bytes);
        self.remaining = rest;
        extent.fill(0);
        Some(extent)
    }
}
