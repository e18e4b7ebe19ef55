//! Errors reported by the heap.

use snafu::Snafu;
use snafu_utils::{Located, Location};

use crate::block::HeapPtr;

/// The error type returned by [`Heap`](crate::Heap) operations.
///
/// Every variant records the [`Location`] where it was raised. All variants
/// except [`InvariantViolation`](Self::InvariantViolation) leave the heap in a
/// consistent state; an invariant violation poisons the heap and every
/// subsequent mutating call fails with the same variant.
#[derive(Debug, Snafu, derive_more::IsVariant)]
#[snafu(visibility(pub(crate)))]
pub enum HeapError {
    #[snafu(display("invalid allocation size: size={size}"))]
    InvalidSize {
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("out of memory: requested={requested}"))]
    OutOfMemory {
        requested: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("double free detected: ptr={ptr}"))]
    DoubleFree {
        ptr: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pointer not issued by this heap: ptr={ptr}"))]
    UnknownPointer {
        ptr: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("heap invariant violated: {reason}"))]
    InvariantViolation {
        reason: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("invalid heap configuration: {reason}"))]
    InvalidConfig {
        reason: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
}

impl HeapError {
    /// Returns the location where this error was raised.
    #[must_use]
    pub fn location(&self) -> Location {
        match self {
            Self::InvalidSize { location, .. }
            | Self::OutOfMemory { location, .. }
            | Self::DoubleFree { location, .. }
            | Self::UnknownPointer { location, .. }
            | Self::InvariantViolation { location, .. }
            | Self::InvalidConfig { location, .. } => *location,
        }
    }
}

impl Located for HeapError {
    fn location(&self) -> Location {
        Self::location(self)
    }
}
