//! Doubly linked list of free blocks.
//!
//! The list is intrusive: its `prev`/`next` links live in the head of each
//! free block and are encoded as (arena, offset) pairs, so splitting and
//! merging blocks is plain integer bookkeeping. New blocks are pushed at the
//! front; the list has no ordering key.

use snafu::ensure;

use crate::{
    arena::Arenas,
    block::BlockRef,
    config::FitPolicy,
    error::{HeapError, InvariantViolationSnafu},
    fit::FreeCandidate,
};

#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<BlockRef>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Pushes a free block at the front of the list.
    pub(crate) fn insert<E>(
        &mut self,
        arenas: &mut Arenas<E>,
        block: BlockRef,
    ) -> Result<(), HeapError>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        ensure!(
            arenas.is_free(block),
            InvariantViolationSnafu {
                reason: "block inserted into the free list is not marked free",
            }
        );

        arenas.set_prev_free(block, None);
        arenas.set_next_free(block, self.head);
        if let Some(head) = self.head {
            arenas.set_prev_free(head, Some(block));
        }
        self.head = Some(block);
        self.len += 1;
        Ok(())
    }

    /// Unlinks `block` from the list.
    ///
    /// The links around `block` are checked before anything is modified, so
    /// a block that is not actually listed is reported instead of corrupting
    /// its neighbours.
    pub(crate) fn remove<E>(
        &mut self,
        arenas: &mut Arenas<E>,
        block: BlockRef,
    ) -> Result<(), HeapError>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        ensure!(
            arenas.is_free(block) && self.len > 0,
            InvariantViolationSnafu {
                reason: "block removed from the free list is not free",
            }
        );

        let prev = arenas.prev_free(block);
        let next = arenas.next_free(block);
        let linked_from_prev = match prev {
            Some(prev) => arenas.next_free(prev) == Some(block),
            None => self.head == Some(block),
        };
        let linked_from_next = next.is_none_or(|next| arenas.prev_free(next) == Some(block));
        ensure!(
            linked_from_prev && linked_from_next,
            InvariantViolationSnafu {
                reason: "free list links are inconsistent",
            }
        );

        match prev {
            Some(prev) => arenas.set_next_free(prev, next),
            None => self.head = next,
        }
        if let Some(next) = next {
            arenas.set_prev_free(next, prev);
        }
        arenas.set_prev_free(block, None);
        arenas.set_next_free(block, None);
        self.len -= 1;
        Ok(())
    }

    /// Iterates over the listed blocks in list order.
    ///
    /// The walk stops after `len` entries even if the links form a cycle.
    pub(crate) fn iter<'a, E>(&self, arenas: &'a Arenas<E>) -> FreeBlocks<'a, E>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        FreeBlocks {
            arenas,
            next: self.head,
            remaining: self.len,
        }
    }

    /// Searches for a block of at least `needed` bytes using `policy`.
    pub(crate) fn find_fit<E>(
        &self,
        arenas: &Arenas<E>,
        needed: usize,
        policy: FitPolicy,
    ) -> Option<BlockRef>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut candidates = self.iter(arenas);
        policy
            .strategy()
            .find_fit(needed, &mut candidates)
            .map(|candidate| candidate.block)
    }

    /// Walks the list checking link symmetry and that it ends after exactly
    /// `len` entries.
    pub(crate) fn verify<E>(&self, arenas: &Arenas<E>) -> Result<(), HeapError>
    where
        E: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut prev = None;
        let mut current = self.head;
        for _ in 0..self.len {
            let Some(block) = current else {
                return InvariantViolationSnafu {
                    reason: "free list is shorter than its length",
                }
                .fail();
            };
            ensure!(
                arenas.is_free(block) && arenas.prev_free(block) == prev,
                InvariantViolationSnafu {
                    reason: "free list holds an allocated or misaligned block",
                }
            );
            prev = current;
            current = arenas.next_free(block);
        }
        ensure!(
            current.is_none(),
            InvariantViolationSnafu {
                reason: "free list is longer than its length",
            }
        );
        Ok(())
    }
}

pub(crate) struct FreeBlocks<'a, E> {
    arenas: &'a Arenas<E>,
    next: Option<BlockRef>,
    remaining: usize,
}

impl<E> Iterator for FreeBlocks<'_, E>
where
    E: AsRef<[u8]> + AsMut<[u8]>,
{
    type Item = FreeCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let block = self.next?;
        self.remaining -= 1;
        self.next = self.arenas.next_free(block);
        Some(FreeCandidate {
            block,
            size: self.arenas.size_of(block),
        })
    }
}
