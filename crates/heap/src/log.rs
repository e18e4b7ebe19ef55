//! Leveled logging.
//!
//! The heap reports what it does through the `trace!` .. `error!` macros.
//! Messages are forwarded to a process-wide [`Logger`] installed with
//! [`set_logger`]; until one is installed, logging is a no-op.
//!
//! Every macro takes the heap's `LogBuffer` first. A buffer either passes
//! messages straight through or, once deferred, holds them until they are
//! taken and emitted. [`LockedHeap`](crate::LockedHeap) defers its heap's
//! buffer so the logger never runs while the heap lock is held.

use alloc::{string::String, vec::Vec};
use core::{
    fmt, mem,
    panic::Location,
    sync::atomic::{AtomicU8, Ordering},
};

use spin::Once;

macro_rules! log {
    ($buffer:expr, $level:expr, $($arg:tt)*) => {
        $buffer.record($level, format_args!($($arg)*))
    };
}

macro_rules! trace {
    ($buffer:expr, $($arg:tt)*) => {
        log!($buffer, $crate::log::LogLevel::Trace, $($arg)*)
    };
}

macro_rules! debug {
    ($buffer:expr, $($arg:tt)*) => {
        log!($buffer, $crate::log::LogLevel::Debug, $($arg)*)
    };
}

macro_rules! info {
    ($buffer:expr, $($arg:tt)*) => {
        log!($buffer, $crate::log::LogLevel::Info, $($arg)*)
    };
}

macro_rules! warn {
    ($buffer:expr, $($arg:tt)*) => {
        log!($buffer, $crate::log::LogLevel::Warn, $($arg)*)
    };
}

macro_rules! error {
    ($buffer:expr, $($arg:tt)*) => {
        log!($buffer, $crate::log::LogLevel::Error, $($arg)*)
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => " INFO",
            Self::Warn => " WARN",
            Self::Error => "ERROR",
        };
        f.write_str(msg)
    }
}

/// A sink for heap log messages.
pub trait Logger: Sync {
    fn log(
        &self,
        level: LogLevel,
        location: &'static Location<'static>,
        message: fmt::Arguments<'_>,
    );
}

/// The error returned when a logger is already installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("a heap logger is already installed")]
pub struct SetLoggerError;

static LOGGER: Once<&'static dyn Logger> = Once::new();
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Installs the process-wide logger.
///
/// Only the first call succeeds.
pub fn set_logger(logger: &'static dyn Logger) -> Result<(), SetLoggerError> {
    let mut installed = false;
    LOGGER.call_once(|| {
        installed = true;
        logger
    });
    if installed { Ok(()) } else { Err(SetLoggerError) }
}

/// Sets the least severe level that is forwarded to the logger.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[must_use]
pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

fn enabled(level: LogLevel) -> Option<&'static dyn Logger> {
    if level < max_level() {
        return None;
    }
    LOGGER.get().copied()
}

#[track_caller]
pub fn log(level: LogLevel, message: fmt::Arguments<'_>) {
    if let Some(logger) = enabled(level) {
        logger.log(level, Location::caller(), message);
    }
}

/// A formatted message waiting to be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    level: LogLevel,
    location: &'static Location<'static>,
    message: String,
}

/// Per-heap log sink, either immediate or deferred.
#[derive(Debug, Default)]
pub(crate) struct LogBuffer {
    deferred: bool,
    records: Vec<Record>,
}

impl LogBuffer {
    /// Holds subsequent messages until [`take`](Self::take) is called.
    pub(crate) fn defer(&mut self) {
        self.deferred = true;
    }

    #[track_caller]
    pub(crate) fn record(&mut self, level: LogLevel, message: fmt::Arguments<'_>) {
        if !self.deferred {
            log(level, message);
            return;
        }
        if enabled(level).is_none() {
            return;
        }
        self.records.push(Record {
            level,
            location: Location::caller(),
            message: alloc::fmt::format(message),
        });
    }

    pub(crate) fn take(&mut self) -> Vec<Record> {
        mem::take(&mut self.records)
    }
}

/// Forwards held records to the logger.
pub(crate) fn emit(records: Vec<Record>) {
    for record in records {
        if let Some(logger) = enabled(record.level) {
            logger.log(
                record.level,
                record.location,
                format_args!("{}", record.message),
            );
        }
    }
}
