//! Link error types.

use std::io;

use thiserror::Error;

use botlink_frame::{ConfigError, FrameError};

/// Errors raised by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// `send` or `recv` before a successful `setup`.
    #[error("transport not set up")]
    NotSetUp,

    /// The peer went away.
    #[error("transport disconnected")]
    Disconnected,

    /// A buffer was configured to hold nothing.
    #[error("{queue} queue capacity must be at least 1")]
    ZeroCapacity {
        /// Which buffer ("rx" or "tx").
        queue: &'static str,
    },

    /// Socket or runtime failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the script protocol.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Every attempt timed out without a matching reply.
    #[error("no reply after {attempts} attempts")]
    NoReply {
        /// Transmissions made.
        attempts: u32,
    },

    /// A matching reply arrived but its result could not be decoded.
    #[error("cannot decode {expected} result from {text:?}")]
    Decode {
        /// Result type the caller asked for.
        expected: &'static str,
        /// Reply text, lossily decoded.
        text: String,
    },

    /// The wait was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Script does not fit a length-prefixed frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport failure while sending.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid channel configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while building or using a channel.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Invalid channel configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Outgoing frame cannot be built.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl From<LinkError> for ScriptError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Transport(e) => ScriptError::Transport(e),
            LinkError::Cancelled => ScriptError::Cancelled,
            LinkError::Frame(e) => ScriptError::Frame(e),
            LinkError::Config(e) => ScriptError::Config(e),
        }
    }
}

/// Result type alias for channel operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Result type alias for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
