//! Error types returned by the storage engine.

use thiserror::Error;

/// Failure modes for every engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A key was absent or consisted only of whitespace, or a TTL given to
    /// `expire` was negative.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// `set` was called with no value.
    #[error("value must not be null")]
    NullValue,

    /// The append would cross the fixed mapped-region boundary.
    #[error("capacity exhausted: need {needed} bytes, {available} available")]
    CapacityExhausted { needed: usize, available: usize },

    /// Opening, sizing, or mapping the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used by every public engine method.
pub type EngineResult<T> = Result<T, EngineError>;
