//! Error types for the ovpnstat core crate.
//!
//! Record-level faults ([`ParseError`]) are absorbed inside the status-log
//! parser and never leave it as errors; a corrupt log still yields a
//! (partial) snapshot. Anything that prevents a snapshot from being obtained
//! at all, or the watcher from starting, surfaces as a [`CoreError`].

use thiserror::Error;

/// Top-level error type for snapshot fetching and watcher startup.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The filesystem notification subsystem failed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A configuration error (invalid values, missing fields, parse failures).
    #[error("Config error: {0}")]
    Config(String),

    /// A low-level I/O error (missing or unreadable status log).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}

/// A fault found while parsing a single line of the status log.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A record did not have the number of comma-separated fields its
    /// section requires.
    #[error("{section} line has {found} fields, expected {expected}")]
    FieldCount {
        section: &'static str,
        expected: usize,
        found: usize,
    },

    /// A byte counter was not an unsigned integer.
    #[error("invalid number in field '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// The underlying stream failed mid-read.
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}
