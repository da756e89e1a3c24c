//! Codec error types.

use thiserror::Error;

use crate::Dialect;

/// Errors raised when building frames.
///
/// Incoming data never produces a `FrameError`: the assembler recovers from
/// malformed input on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the 16-bit length field.
    #[error("payload too large: maximum {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum allowed length.
        max: usize,
        /// Actual length supplied.
        actual: usize,
    },
}

/// Invalid channel configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Version requests and version responses share a signature space and
    /// cannot be told apart on one channel.
    #[error("version request and version response cannot be enabled on the same channel")]
    ConflictingVersionDialects,

    /// A fixed-size body length is outside the range the assembler can resolve.
    #[error("invalid body length {len} for {dialect}: must be between {min} and {max}")]
    InvalidFixedLength {
        /// Dialect the length belongs to.
        dialect: Dialect,
        /// Configured length.
        len: usize,
        /// Smallest accepted length.
        min: usize,
        /// Largest accepted length.
        max: usize,
    },
}
