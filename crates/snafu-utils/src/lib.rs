//! Shared error plumbing: call-site locations, a catch-all error and a
//! colored error report.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

use alloc::{boxed::Box, string::String, vec::Vec};
use core::{error::Error, fmt};

use ansi_term::Color;
use snafu::{GenerateImplicitData, Snafu};

/// Source location captured where an error or allocation was created.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(&'static core::panic::Location<'static>);

impl Location {
    /// Returns the location of the caller, following `#[track_caller]`
    /// frames.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        Self(core::panic::Location::caller())
    }

    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self::caller()
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::caller()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Errors that remember where they were raised.
pub trait Located {
    fn location(&self) -> Location;
}

/// Catch-all error for binaries, built with `whatever!` and
/// `whatever_context`.
#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn Error>, Some)))]
    source: Option<Box<dyn Error>>,
}

impl Located for GenericError {
    fn location(&self) -> Location {
        self.location
    }
}

type Locator = fn(&(dyn Error + 'static)) -> Option<Location>;

fn downcast_location<T>(error: &(dyn Error + 'static)) -> Option<Location>
where
    T: Error + Located + 'static,
{
    error.downcast_ref::<T>().map(Located::location)
}

/// Renders an error and its source chain, one cause per line.
///
/// Locations are printed for [`GenericError`] and for every error type
/// registered with [`locate`](Self::locate).
pub struct Report<E> {
    error: E,
    color: bool,
    locators: Vec<Locator>,
}

impl<E> Report<E> {
    pub const fn new(error: E) -> Self {
        Self {
            error,
            color: true,
            locators: Vec::new(),
        }
    }

    /// Prints the location of errors of type `T` found in the chain.
    #[must_use]
    pub fn locate<T>(mut self) -> Self
    where
        T: Error + Located + 'static,
    {
        self.locators.push(downcast_location::<T>);
        self
    }

    fn location_of(&self, error: &(dyn Error + 'static)) -> Option<Location> {
        downcast_location::<GenericError>(error)
            .or_else(|| self.locators.iter().find_map(|locate| locate(error)))
    }

    /// Disables terminal colors.
    #[must_use]
    pub const fn plain(mut self) -> Self {
        self.color = false;
        self
    }
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = Color::Red.paint(&self.error).bold().enabled(self.color);
        writeln!(f, "Error: {error}")?;
        if let Some(loc) = self.location_of(&self.error) {
            writeln!(f, "  at {}", Color::DarkGray.paint(loc).enabled(self.color))?;
        }
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            let cause = Color::Red.paint(s).bold().enabled(self.color);
            writeln!(f, "{index:4}: {cause}")?;
            if let Some(loc) = self.location_of(s) {
                writeln!(f, "      at {}", Color::DarkGray.paint(loc).enabled(self.color))?;
            }
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}
