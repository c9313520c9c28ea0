//! Error taxonomy shared by every worker (spec §7).
//!
//! Kinds, not names: each worker converts whatever internal failure it hits
//! into one of these before logging it via C10 and returning to idle.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ElememError {
    /// Shape or index invariant violated (channels, lengths, ranges).
    /// Recoverable at the calling boundary; halts the affected worker.
    #[error("bounds violation: {0}")]
    Bounds(String),

    /// Config or montage malformed or missing. Fatal to session start.
    #[error("file/format error: {0}")]
    FileFormat(String),

    /// Acquisition or stim device error. Worker stops its timer and requires
    /// explicit re-init.
    #[error("device error: {0}")]
    Device(String),

    /// Classifier invoked without callback set, trigger armed twice, profile
    /// exceeds device limits. Reported and skipped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invariant violation in internal state. Session aborts.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ElememError {
    pub fn bounds(msg: impl Into<String>) -> Self {
        Self::Bounds(msg.into())
    }

    pub fn file_format(msg: impl Into<String>) -> Self {
        Self::FileFormat(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether this kind should tear down the whole session (spec §7
    /// propagation policy), as opposed to just the worker that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ElememError::Fatal(_))
    }
}

pub type ElememResult<T> = Result<T, ElememError>;
