//! Arenas: contiguous extents carved into blocks.

use alloc::vec::Vec;

use crate::block::{self, BlockRef, MAX_ARENA_SIZE, Tag};

/// A contiguous extent obtained from an arena provider.
///
/// The usable region starts at the first `alignment`-aligned byte of the
/// extent and its length is trimmed down to a multiple of `alignment`, so
/// block offsets inside the arena translate to aligned machine addresses.
#[derive(Debug)]
pub(crate) struct Arena<E> {
    extent: E,
    start: usize,
    len: usize,
}

impl<E> Arena<E>
where
    E: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Wraps an extent, returning `None` if nothing usable remains after
    /// alignment.
    pub(crate) fn new(extent: E, alignment: usize) -> Option<Self> {
        let bytes = extent.as_ref();
        let start = bytes.as_ptr().align_offset(alignment);
        let len = bytes.len().checked_sub(start)?;
        let len = (len / alignment * alignment).min(MAX_ARENA_SIZE);
        if len == 0 {
            return None;
        }
        Some(Self { extent, start, len })
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Machine address of the first usable byte.
    pub(crate) fn base_addr(&self) -> usize {
        self.extent.as_ref().as_ptr().addr() + self.start
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.extent.as_ref()[self.start..self.start + self.len]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.extent.as_mut()[self.start..self.start + self.len]
    }
}

/// All arenas of a heap, in acquisition order.
///
/// Block-level metadata accessors live here because a [`BlockRef`] needs the
/// arena table to be resolved. Every `BlockRef` passed in must name a block
/// start inside an existing arena.
#[derive(Debug)]
pub(crate) struct Arenas<E> {
    arenas: Vec<Arena<E>>,
}

impl<E> Default for Arenas<E> {
    fn default() -> Self {
        Self { arenas: Vec::new() }
    }
}

impl<E> Arenas<E>
where
    E: AsRef<[u8]> + AsMut<[u8]>,
{
    pub(crate) fn len(&self) -> usize {
        self.arenas.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Arena<E>> {
        self.arenas.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Arena<E>> {
        self.arenas.get_mut(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arena<E>> {
        self.arenas.iter()
    }

    /// Sum of the usable sizes of all arenas.
    pub(crate) fn total_size(&self) -> usize {
        self.arenas.iter().map(Arena::len).sum()
    }

    /// Appends an arena and returns its index.
    ///
    /// Returns `None` if the arena table is full.
    pub(crate) fn push(&mut self, arena: Arena<E>) -> Option<u32> {
        let index = u32::try_from(self.arenas.len()).ok()?;
        self.arenas.push(arena);
        Some(index)
    }

    fn arena(&self, block: BlockRef) -> &Arena<E> {
        &self.arenas[block.arena()]
    }

    fn arena_mut(&mut self, block: BlockRef) -> &mut Arena<E> {
        &mut self.arenas[block.arena()]
    }

    pub(crate) fn arena_len(&self, block: BlockRef) -> usize {
        self.arena(block).len()
    }

    pub(crate) fn tag(&self, block: BlockRef) -> Tag {
        block::head_tag(self.arena(block).bytes(), block.offset())
    }

    /// Reads the tail tag of `block`, or `None` if the head tag's size does
    /// not describe a block inside the arena.
    pub(crate) fn foot(&self, block: BlockRef) -> Option<Tag> {
        let arena = self.arena(block);
        let size = self.tag(block).size();
        if size < block::WORD || size > arena.len().saturating_sub(block.offset()) {
            return None;
        }
        Some(block::foot_tag(arena.bytes(), block.offset(), size))
    }

    pub(crate) fn size_of(&self, block: BlockRef) -> usize {
        self.tag(block).size()
    }

    pub(crate) fn is_free(&self, block: BlockRef) -> bool {
        self.tag(block).is_free()
    }

    pub(crate) fn mark_free(&mut self, block: BlockRef) {
        let size = self.size_of(block);
        self.set_block(block, size, true);
    }

    pub(crate) fn mark_allocated(&mut self, block: BlockRef) {
        let size = self.size_of(block);
        self.set_block(block, size, false);
    }

    /// Rewrites both boundary tags of `block`.
    pub(crate) fn set_block(&mut self, block: BlockRef, size: usize, free: bool) {
        block::write_tags(self.arena_mut(block).bytes_mut(), block.offset(), size, free);
    }

    pub(crate) fn clear_head(&mut self, block: BlockRef) {
        block::clear_head(self.arena_mut(block).bytes_mut(), block.offset());
    }

    /// Returns the block physically following `block`, if any.
    pub(crate) fn successor(&self, block: BlockRef) -> Option<BlockRef> {
        let end = block.offset() + self.size_of(block);
        (end < self.arena_len(block)).then(|| BlockRef::new(block.arena, end))
    }

    /// Returns the tail tag of the block physically preceding `block`, if
    /// any.
    pub(crate) fn preceding_foot(&self, block: BlockRef) -> Option<Tag> {
        (block.offset() > 0)
            .then(|| block::preceding_foot_tag(self.arena(block).bytes(), block.offset()))
    }

    pub(crate) fn prev_free(&self, block: BlockRef) -> Option<BlockRef> {
        block::prev_link(self.arena(block).bytes(), block.offset())
    }

    pub(crate) fn next_free(&self, block: BlockRef) -> Option<BlockRef> {
        block::next_link(self.arena(block).bytes(), block.offset())
    }

    pub(crate) fn set_prev_free(&mut self, block: BlockRef, link: Option<BlockRef>) {
        block::set_prev_link(self.arena_mut(block).bytes_mut(), block.offset(), link);
    }

    pub(crate) fn set_next_free(&mut self, block: BlockRef, link: Option<BlockRef>) {
        block::set_next_link(self.arena_mut(block).bytes_mut(), block.offset(), link);
    }
}
