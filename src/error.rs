//! Error types shared by construction and execution.
//!
//! Construction calls return a [`BlockError`], which carries a kind and a
//! message. Anything that goes wrong during a run travels as a [`FlowError`]:
//! the same information plus the address of the block that detected it.

use crate::address::Address;
use std::fmt;
use thiserror::Error;

/// Classification of every failure the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required port, node or value does not exist
    Dne,
    /// Value or port types are incompatible
    Type,
    /// A construction-time binding was made twice
    AlreadyExists,
    /// A write targeted a port that is not an input
    NotInput,
    /// A value failed a semantic check
    Value,
    /// The invocation was told to stop; not a failure
    Stopping,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ErrorKind::Dne => "DNE",
            ErrorKind::Type => "TYPE",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::NotInput => "NOT_INPUT",
            ErrorKind::Value => "VALUE",
            ErrorKind::Stopping => "STOPPING",
        };
        f.write_str(tag)
    }
}

/// A failure not yet attributed to a block instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {info}")]
pub struct BlockError {
    pub kind: ErrorKind,
    pub info: String,
}

impl BlockError {
    pub fn new(kind: ErrorKind, info: impl Into<String>) -> Self {
        Self {
            kind,
            info: info.into(),
        }
    }

    pub fn dne(info: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dne, info)
    }

    pub fn type_mismatch(info: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, info)
    }

    pub fn already_exists(info: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, info)
    }

    pub fn not_input(info: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInput, info)
    }

    pub fn value(info: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, info)
    }

    /// Attributes this error to the block instance at `origin`
    pub fn at(self, origin: Address) -> FlowError {
        FlowError {
            kind: self.kind,
            info: self.info,
            origin,
        }
    }
}

/// A run-time failure, tagged with the block that first detected it.
///
/// Once created it is passed up unchanged through every enclosing graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {origin}: {info}")]
pub struct FlowError {
    pub kind: ErrorKind,
    pub info: String,
    pub origin: Address,
}

impl FlowError {
    pub fn new(kind: ErrorKind, info: impl Into<String>, origin: Address) -> Self {
        Self {
            kind,
            info: info.into(),
            origin,
        }
    }

    /// Marker for an invocation that ended because it was stopped
    pub fn stopping(origin: Address) -> Self {
        Self::new(ErrorKind::Stopping, "stopped", origin)
    }

    pub fn is_stopping(&self) -> bool {
        self.kind == ErrorKind::Stopping
    }
}
