//! Minimal ANSI terminal styling for diagnostics output.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    DarkGray,
    Default,
}

impl Color {
    const fn fg(self) -> u8 {
        match self {
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::DarkGray => 90,
            Self::Default => 39,
        }
    }

    /// Wraps `value` so that it is displayed in this color.
    pub const fn paint<T>(self, value: T) -> Painted<T> {
        Painted {
            color: Some(self),
            bold: false,
            value,
        }
    }
}

/// A value displayed with a foreground color and optional bold weight.
///
/// Styling can be switched off with [`Painted::enabled`], in which case the
/// value is displayed as is.
#[derive(Debug, Clone, Copy)]
pub struct Painted<T> {
    color: Option<Color>,
    bold: bool,
    value: T,
}

impl<T> Painted<T> {
    #[must_use]
    pub const fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Drops all styling unless `enabled` is `true`.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        if !enabled {
            self.color = None;
            self.bold = false;
        }
        self
    }
}

impl<T> fmt::Display for Painted<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = &self.value;
        match (self.color, self.bold) {
            (None, false) => write!(f, "{value}"),
            (None, true) => write!(f, "\x1B[1m{value}\x1B[0m"),
            (Some(color), false) => write!(f, "\x1B[{}m{value}\x1B[0m", color.fg()),
            (Some(color), true) => write!(f, "\x1B[{};1m{value}\x1B[0m", color.fg()),
        }
    }
}
