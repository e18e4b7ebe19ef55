//! Fit strategies selecting a free block for a request.

use crate::{block::BlockRef, config::FitPolicy};

/// A free block offered to a [`FitStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeCandidate {
    pub(crate) block: BlockRef,
    pub(crate) size: usize,
}

/// Picks one of the candidates able to hold `needed` bytes.
///
/// Candidates are offered in free-list order; among equally good blocks the
/// first one offered wins, which keeps selection deterministic.
pub(crate) trait FitStrategy {
    fn find_fit(
        &self,
        needed: usize,
        candidates: &mut dyn Iterator<Item = FreeCandidate>,
    ) -> Option<FreeCandidate>;
}

struct BestFit;
struct FirstFit;
struct WorstFit;

impl FitStrategy for BestFit {
    fn find_fit(
        &self,
        needed: usize,
        candidates: &mut dyn Iterator<Item = FreeCandidate>,
    ) -> Option<FreeCandidate> {
        let mut best: Option<FreeCandidate> = None;
        for candidate in candidates {
            if candidate.size < needed {
                continue;
            }
            if candidate.size == needed {
                return Some(candidate);
            }
            if best.is_none_or(|b| candidate.size < b.size) {
                best = Some(candidate);
            }
        }
        best
    }
}

impl FitStrategy for FirstFit {
    fn find_fit(
        &self,
        needed: usize,
        candidates: &mut dyn Iterator<Item = FreeCandidate>,
    ) -> Option<FreeCandidate> {
        for candidate in candidates {
            if candidate.size >= needed {
                return Some(candidate);
            }
        }
        None
    }
}

impl FitStrategy for WorstFit {
    fn find_fit(
        &self,
        needed: usize,
        candidates: &mut dyn Iterator<Item = FreeCandidate>,
    ) -> Option<FreeCandidate> {
        let mut worst: Option<FreeCandidate> = None;
        for candidate in candidates {
            if candidate.size >= needed && worst.is_none_or(|w| candidate.size > w.size) {
                worst = Some(candidate);
            }
        }
        worst
    }
}

impl FitPolicy {
    pub(crate) fn strategy(self) -> &'static dyn FitStrategy {
        match self {
            Self::BestFit => &BestFit,
            Self::FirstFit => &FirstFit,
            Self::WorstFit => &WorstFit,
        }
    }
}
