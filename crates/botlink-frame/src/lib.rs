//! Botlink Frame Codec
//!
//! This crate turns the raw, arbitrarily chunked byte stream coming from a
//! controller board's transport (BLE GATT or serial) into discrete validated
//! frames, and builds outgoing frames for the opposite direction.
//!
//! # Dialects
//!
//! A single [`FrameAssembler`] recognises up to three framing dialects on the
//! same stream, selected per channel through [`ChannelConfig`]:
//!
//! ```text
//! Length-prefixed : F3 CKH L_lo L_hi payload.. CKB F4
//! Simple-delimited: F0 payload.. F7
//! Fixed-size      : FF 55 body..   (version request, version response, gamepad)
//! ```
//!
//! Malformed input never surfaces as an error: the assembler discards the
//! partial frame and resumes scanning for the next header.
//!
//! # Example
//!
//! ```rust
//! use botlink_frame::{ChannelConfig, Dialect, FrameAssembler, FrameEncoder, FrameKind};
//!
//! let encoded = FrameEncoder::default().encode_length_prefixed(b"hello");
//!
//! let mut assembler = FrameAssembler::new(ChannelConfig::new(Dialect::LengthPrefixed.into()));
//! let frame = assembler.feed(&encoded).expect("complete frame");
//! assert_eq!(frame.kind(), FrameKind::LengthPrefixed);
//! assert_eq!(frame.payload(), b"hello");
//! ```

mod assembler;
mod config;
mod constants;
mod encoder;
mod error;
mod frame;
mod queue;

pub use assembler::*;
pub use config::*;
pub use constants::*;
pub use encoder::*;
pub use error::*;
pub use frame::*;
pub use queue::*;
