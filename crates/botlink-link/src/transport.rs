//! The byte transport contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TransportError;

/// Where a transport should connect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    /// Let the transport pick (first device found, default address).
    #[default]
    Auto,
    /// A specific device or address.
    Named(String),
}

impl Port {
    /// The port name, if one was given.
    pub fn name(&self) -> Option<&str> {
        match self {
            Port::Auto => None,
            Port::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Auto => f.write_str("auto"),
            Port::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Port {
    fn from(name: &str) -> Self {
        if name.eq_ignore_ascii_case("auto") {
            Port::Auto
        } else {
            Port::Named(name.to_string())
        }
    }
}

/// A raw byte link to the controller board.
///
/// `recv` never blocks: it hands back whatever chunk a background provider
/// delivered, in arrival order, or `None`. Chunk boundaries carry no meaning.
pub trait Transport: Send {
    /// Open the link.
    fn setup(&mut self, port: &Port) -> Result<(), TransportError>;

    /// Returns true when `send` may be called.
    fn is_ready(&self) -> bool;

    /// Hand bytes to the link.
    fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Take the next received chunk, if any.
    fn recv(&self) -> Option<Vec<u8>>;

    /// Discard every chunk received so far, returning how many were dropped.
    fn clear_rx(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn setup(&mut self, port: &Port) -> Result<(), TransportError> {
        (**self).setup(port)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        (**self).send(data)
    }

    fn recv(&self) -> Option<Vec<u8>> {
        (**self).recv()
    }

    fn clear_rx(&self) -> usize {
        (**self).clear_rx()
    }
}
