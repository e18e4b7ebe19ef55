//! Block header and boundary tag model.
//!
//! Every block carved out of an arena carries its metadata in-band, at both
//! ends of the block. Blocks are addressed by an arena index plus a byte
//! offset relative to the arena's (aligned) start, never by raw pointers.
//!
//! ```text
//! Block Layout:
//! ┌─────────────────────────────────────┬──────────────────┬───────────────┐
//! │ Head (padded to alignment)          │ Data region      │ Tail (padded) │
//! │ ┌──────────┬───────────┬──────────┐ │                  │  ┌──────────┐ │
//! │ │ tag: u64 │ prev: u64 │ next: u64│ │                  │  │ tag: u64 │ │
//! │ └──────────┴───────────┴──────────┘ │                  │  └──────────┘ │
//! └─────────────────────────────────────┴──────────────────┴───────────────┘
//! ```
//!
//! The tag holds the total block size with the lowest bit set when the block
//! is free. The tail tag mirrors the head tag, which lets a block find its
//! physical predecessor by reading the word just before its own head. `prev`
//! and `next` link free blocks into the free list; they are meaningless while
//! the block is allocated.

use core::fmt;

/// Size of a metadata word.
pub(crate) const WORD: usize = size_of::<u64>();

/// Largest arena the heap can manage.
///
/// Block offsets are packed into 32 bits inside free-list links.
pub const MAX_ARENA_SIZE: usize = (u32::MAX as usize) & !(crate::config::MAX_ALIGNMENT - 1);

const FREE_BIT: u64 = 1;
const NIL_LINK: u64 = u64::MAX;

const TAG_FIELD: usize = 0;
const PREV_FIELD: usize = WORD;
const NEXT_FIELD: usize = 2 * WORD;
const HEAD_FIELDS: usize = 3 * WORD;

/// Handle to the data region of an allocated block.
///
/// A `HeapPtr` is the heap's equivalent of the pointer returned by `malloc`:
/// it names an arena and the offset of the data region inside that arena.
/// Handles are plain values; they are only meaningful to the heap that issued
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr {
    arena: u32,
    offset: u32,
}

impl HeapPtr {
    /// Creates a handle from its raw parts.
    ///
    /// Handles built this way are validated by the heap before use; a handle
    /// that was never issued is reported as an unknown pointer.
    #[must_use]
    pub const fn new(arena: u32, offset: u32) -> Self {
        Self { arena, offset }
    }

    /// Returns the index of the arena containing the data region.
    #[must_use]
    pub const fn arena(self) -> usize {
        self.arena as usize
    }

    /// Returns the data region offset relative to the arena start.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset as usize
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.arena, self.offset)
    }
}

/// Location of a block header: arena index plus block start offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockRef {
    pub(crate) arena: u32,
    pub(crate) offset: u32,
}

impl BlockRef {
    #[expect(clippy::cast_possible_truncation)]
    pub(crate) const fn new(arena: u32, offset: usize) -> Self {
        debug_assert!(offset <= MAX_ARENA_SIZE);
        Self {
            arena,
            offset: offset as u32,
        }
    }

    pub(crate) const fn arena(self) -> usize {
        self.arena as usize
    }

    pub(crate) const fn offset(self) -> usize {
        self.offset as usize
    }

    const fn pack(link: Option<Self>) -> u64 {
        match link {
            Some(block) => ((block.arena as u64) << 32) | block.offset as u64,
            None => NIL_LINK,
        }
    }

    #[expect(clippy::cast_possible_truncation)]
    const fn unpack(raw: u64) -> Option<Self> {
        if raw == NIL_LINK {
            return None;
        }
        Some(Self {
            arena: (raw >> 32) as u32,
            offset: raw as u32,
        })
    }
}

/// A boundary tag: block size plus the free flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag(u64);

impl Tag {
    pub(crate) const fn new(size: usize, free: bool) -> Self {
        debug_assert!(size & 1 == 0);
        Self(size as u64 | if free { FREE_BIT } else { 0 })
    }

    #[expect(clippy::cast_possible_truncation)]
    pub(crate) const fn size(self) -> usize {
        (self.0 & !FREE_BIT) as usize
    }

    pub(crate) const fn is_free(self) -> bool {
        self.0 & FREE_BIT != 0
    }
}

/// Block geometry derived from the configured alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    alignment: usize,
    head_len: usize,
    tail_len: usize,
}

impl BlockLayout {
    pub(crate) const fn new(alignment: usize) -> Self {
        assert!(alignment.is_power_of_two() && alignment >= WORD);
        Self {
            alignment,
            head_len: HEAD_FIELDS.next_multiple_of(alignment),
            tail_len: WORD.next_multiple_of(alignment),
        }
    }

    pub(crate) const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes of metadata in every block (head plus tail).
    pub(crate) const fn header_size(&self) -> usize {
        self.head_len + self.tail_len
    }

    /// Smallest usable payload of any block.
    pub(crate) const fn min_payload(&self) -> usize {
        self.alignment
    }

    pub(crate) const fn min_block_size(&self) -> usize {
        self.header_size() + self.min_payload()
    }

    /// Surplus a block must exceed before it is carved into a separate free
    /// block.
    pub(crate) const fn split_threshold(&self) -> usize {
        self.header_size() + self.min_payload()
    }

    /// Total block size needed to serve `requested` bytes.
    ///
    /// Returns `None` if the computation overflows or the result exceeds
    /// `isize::MAX`.
    pub(crate) fn block_size_for(&self, requested: usize) -> Option<usize> {
        let size = requested
            .checked_next_multiple_of(self.alignment)?
            .checked_add(self.header_size())?;
        isize::try_from(size).ok().map(|_| size)
    }

    /// Usable bytes in a block of `size` bytes.
    pub(crate) const fn capacity(&self, size: usize) -> usize {
        size - self.header_size()
    }

    #[expect(clippy::cast_possible_truncation)]
    pub(crate) const fn data_ptr(&self, block: BlockRef) -> HeapPtr {
        HeapPtr::new(block.arena, (block.offset() + self.head_len) as u32)
    }

    /// Recovers the block owning the data region `ptr` points to.
    pub(crate) fn block_of(&self, ptr: HeapPtr) -> Option<BlockRef> {
        let offset = ptr.offset().checked_sub(self.head_len)?;
        Some(BlockRef::new(ptr.arena, offset))
    }

    pub(crate) const fn data_range(&self, offset: usize, size: usize) -> (usize, usize) {
        (offset + self.head_len, offset + size - self.tail_len)
    }
}

fn read_word(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0; WORD];
    word.copy_from_slice(&bytes[at..at + WORD]);
    u64::from_ne_bytes(word)
}

fn write_word(bytes: &mut [u8], at: usize, value: u64) {
    bytes[at..at + WORD].copy_from_slice(&value.to_ne_bytes());
}

pub(crate) fn head_tag(bytes: &[u8], offset: usize) -> Tag {
    Tag(read_word(bytes, offset + TAG_FIELD))
}

/// Reads the tail tag of the block at `offset`, using `size` from its head.
pub(crate) fn foot_tag(bytes: &[u8], offset: usize, size: usize) -> Tag {
    Tag(read_word(bytes, offset + size - WORD))
}

/// Reads the tail tag of the block that physically precedes `offset`.
pub(crate) fn preceding_foot_tag(bytes: &[u8], offset: usize) -> Tag {
    Tag(read_word(bytes, offset - WORD))
}

/// Writes both boundary tags of a block.
pub(crate) fn write_tags(bytes: &mut [u8], offset: usize, size: usize, free: bool) {
    let tag = Tag::new(size, free);
    write_word(bytes, offset + TAG_FIELD, tag.0);
    write_word(bytes, offset + size - WORD, tag.0);
}

/// Erases the head tag of a block absorbed by a merge.
pub(crate) fn clear_head(bytes: &mut [u8], offset: usize) {
    write_word(bytes, offset + TAG_FIELD, 0);
}

pub(crate) fn prev_link(bytes: &[u8], offset: usize) -> Option<BlockRef> {
    BlockRef::unpack(read_word(bytes, offset + PREV_FIELD))
}

pub(crate) fn next_link(bytes: &[u8], offset: usize) -> Option<BlockRef> {
    BlockRef::unpack(read_word(bytes, offset + NEXT_FIELD))
}

pub(crate) fn set_prev_link(bytes: &mut [u8], offset: usize, link: Option<BlockRef>) {
    write_word(bytes, offset + PREV_FIELD, BlockRef::pack(link));
}

pub(crate) fn set_next_link(bytes: &mut [u8], offset: usize, link: Option<BlockRef>) {
    write_word(bytes, offset + NEXT_FIELD, BlockRef::pack(link));
}
