//! Arena acquisition.

use snafu::{OptionExt as _, ensure};

use crate::{
    arena::Arena,
    block::MAX_ARENA_SIZE,
    error::{HeapError, OutOfMemorySnafu},
    provider::ArenaProvider,
};

/// Requests new arenas from the provider when the free list cannot serve a
/// request.
#[derive(Debug)]
pub(crate) struct GrowthController {
    min_arena_size: usize,
    alignment: usize,
    requests: usize,
}

impl GrowthController {
    pub(crate) const fn new(min_arena_size: usize, alignment: usize) -> Self {
        Self {
            min_arena_size,
            alignment,
            requests: 0,
        }
    }

    /// Number of extent requests made to the provider so far.
    pub(crate) const fn requests(&self) -> usize {
        self.requests
    }

    /// Obtains an arena able to hold a block of `min_size` bytes.
    ///
    /// The request to the provider is padded by one alignment unit so that
    /// aligning the extent's start can never leave less than `min_size`
    /// usable bytes, then rounded up to the provider's granularity.
    pub(crate) fn grow<P>(
        &mut self,
        provider: &mut P,
        min_size: usize,
    ) -> Result<Arena<P::Extent>, HeapError>
    where
        P: ArenaProvider,
    {
        ensure!(
            min_size <= MAX_ARENA_SIZE,
            OutOfMemorySnafu {
                requested: min_size,
            }
        );

        let granularity = provider.granularity().max(1);
        let request = usize::max(min_size, self.min_arena_size)
            .min(MAX_ARENA_SIZE)
            .checked_add(self.alignment)
            .and_then(|size| size.checked_next_multiple_of(granularity))
            .context(OutOfMemorySnafu {
                requested: min_size,
            })?;

        self.requests += 1;
        let extent = provider.request_extent(request).context(OutOfMemorySnafu {
            requested: request,
        })?;
        ensure!(
            extent.as_ref().len() >= request,
            OutOfMemorySnafu { requested: request }
        );

        let arena = Arena::new(extent, self.alignment)
            .filter(|arena| arena.len() >= min_size)
            .context(OutOfMemorySnafu { requested: request })?;
        Ok(arena)
    }
}
