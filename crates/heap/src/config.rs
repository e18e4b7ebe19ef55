//! Construction-time heap configuration.

use core::{fmt, str::FromStr};

use snafu::ensure;

use crate::error::{HeapError, InvalidConfigSnafu};

/// Default lower bound for the size of a newly requested arena.
pub const DEFAULT_MIN_ARENA_SIZE: usize = 64 * 1024;

/// Largest alignment accepted by [`HeapConfig::validate`].
pub const MAX_ALIGNMENT: usize = 4096;

/// Smallest alignment accepted by [`HeapConfig::validate`].
///
/// Boundary tags are 8-byte words, so every block must start on an 8-byte
/// boundary.
pub const MIN_ALIGNMENT: usize = 8;

/// Default alignment: the pointer width, raised to [`MIN_ALIGNMENT`].
pub const DEFAULT_ALIGNMENT: usize = if size_of::<usize>() > MIN_ALIGNMENT {
    size_of::<usize>()
} else {
    MIN_ALIGNMENT
};

/// Rule used to pick a free block for an allocation request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, derive_more::IsVariant)]
pub enum FitPolicy {
    /// Smallest block that fits; ties go to the first block in list order.
    #[default]
    BestFit,
    /// First block in list order that fits.
    FirstFit,
    /// Largest block that fits; ties go to the first block in list order.
    WorstFit,
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BestFit => "best-fit",
            Self::FirstFit => "first-fit",
            Self::WorstFit => "worst-fit",
        };
        f.write_str(name)
    }
}

/// The error returned when parsing an unknown [`FitPolicy`] name.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown fit policy, expected one of best-fit, first-fit, worst-fit")]
pub struct ParseFitPolicyError;

impl FromStr for FitPolicy {
    type Err = ParseFitPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" | "best-fit" => Ok(Self::BestFit),
            "first" | "first-fit" => Ok(Self::FirstFit),
            "worst" | "worst-fit" => Ok(Self::WorstFit),
            _ => Err(ParseFitPolicyError),
        }
    }
}

/// Options recognized when constructing a [`Heap`](crate::Heap).
///
/// # Examples
///
/// ```
/// use heap::{FitPolicy, HeapConfig};
///
/// let config = HeapConfig::new()
///     .with_alignment(16)
///     .with_fit_policy(FitPolicy::FirstFit)
///     .with_min_arena_size(4096);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Granularity of block sizes and data-region alignment.
    pub alignment: usize,
    /// Free block selection rule.
    pub fit_policy: FitPolicy,
    /// Lower bound for the size of each arena requested on growth.
    pub min_arena_size: usize,
    /// Whether live allocations are tracked for leak and double-free
    /// reporting.
    pub diagnostics_enabled: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapConfig {
    /// Returns the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            fit_policy: FitPolicy::BestFit,
            min_arena_size: DEFAULT_MIN_ARENA_SIZE,
            diagnostics_enabled: true,
        }
    }

    #[must_use]
    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    #[must_use]
    pub const fn with_fit_policy(mut self, fit_policy: FitPolicy) -> Self {
        self.fit_policy = fit_policy;
        self
    }

    #[must_use]
    pub const fn with_min_arena_size(mut self, min_arena_size: usize) -> Self {
        self.min_arena_size = min_arena_size;
        self
    }

    #[must_use]
    pub const fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics_enabled = enabled;
        self
    }

    /// Checks that the configuration can be used to build a heap.
    pub fn validate(&self) -> Result<(), HeapError> {
        ensure!(
            self.alignment.is_power_of_two(),
            InvalidConfigSnafu {
                reason: "alignment must be a power of two",
            }
        );
        ensure!(
            self.alignment >= MIN_ALIGNMENT,
            InvalidConfigSnafu {
                reason: "alignment must be at least 8 bytes",
            }
        );
        ensure!(
            self.alignment <= MAX_ALIGNMENT,
            InvalidConfigSnafu {
                reason: "alignment must not exceed 4096 bytes",
            }
        );
        ensure!(
            self.min_arena_size > 0,
            InvalidConfigSnafu {
                reason: "minimum arena size must be non-zero",
            }
        );
        Ok(())
    }
}
