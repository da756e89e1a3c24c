//! Botlink Link Layer
//!
//! This crate connects the frame codec to a byte transport and implements the
//! script request/response protocol on top of it.
//!
//! # Layers
//!
//! ```text
//! ScriptClient   request/response with serials and retransmission
//!     |
//! Channel        one FrameAssembler + one Transport, readiness wait
//!     |
//! Transport      loopback pair, TCP serial bridge, or any other byte link
//! ```
//!
//! # Example
//!
//! ```rust
//! use botlink_frame::ChannelConfig;
//! use botlink_link::{loopback_pair, Channel, Port, ScriptClient, Transport};
//!
//! let (host, device) = loopback_pair(16, 16);
//! let channel = Channel::open(host, &Port::Auto, ChannelConfig::default()).unwrap();
//! let mut client = ScriptClient::new(channel);
//!
//! client.fire_and_forget(5, "hi").unwrap();
//! let sent = device.recv().unwrap();
//! assert_eq!(sent, vec![0xF3, 0xF9, 0x06, 0x00, 0x28, 0x00, 0x05, 0x00, 0x68, 0x69, 0xFE, 0xF4]);
//! ```

mod cancel;
mod channel;
mod config;
mod error;
mod loopback;
mod script;
mod tcp;
mod transport;

pub use cancel::*;
pub use channel::*;
pub use config::*;
pub use error::*;
pub use loopback::*;
pub use script::*;
pub use tcp::*;
pub use transport::*;
