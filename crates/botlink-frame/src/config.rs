//! Per-channel configuration.
//!
//! A [`ChannelConfig`] is fixed when a channel is built: which dialects the
//! assembler listens for, the marker bytes, and the fixed-size body lengths.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::ConfigError;

// ============================================================================
// Dialects
// ============================================================================

/// One framing dialect or fixed-size sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `F0 payload.. F7`.
    SimpleDelimited,
    /// `F3 CKH L_lo L_hi payload.. CKB F4`.
    LengthPrefixed,
    /// `FF 55` version request.
    VersionRequest,
    /// `FF 55` version response.
    VersionResponse,
    /// `FF 55` gamepad state with trailing checksum.
    Gamepad,
}

impl Dialect {
    /// Every dialect, in bit order.
    pub const ALL: [Dialect; 5] = [
        Dialect::SimpleDelimited,
        Dialect::LengthPrefixed,
        Dialect::VersionRequest,
        Dialect::VersionResponse,
        Dialect::Gamepad,
    ];

    const fn bit(self) -> u8 {
        match self {
            Dialect::SimpleDelimited => 0x01,
            Dialect::LengthPrefixed => 0x02,
            Dialect::VersionRequest => 0x04,
            Dialect::VersionResponse => 0x08,
            Dialect::Gamepad => 0x10,
        }
    }

    /// Returns the dialect name as used in configuration files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::SimpleDelimited => "simple_delimited",
            Dialect::LengthPrefixed => "length_prefixed",
            Dialect::VersionRequest => "version_request",
            Dialect::VersionResponse => "version_response",
            Dialect::Gamepad => "gamepad",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask of enabled dialects.
///
/// In configuration files this is written as a list of dialect names:
///
/// ```yaml
/// dialects: [length_prefixed, gamepad]
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Dialect>", into = "Vec<Dialect>")]
pub struct Dialects(u8);

impl Dialects {
    /// No dialect enabled; the assembler ignores all input.
    pub const NONE: Dialects = Dialects(0);

    /// Returns true if `dialect` is enabled.
    pub const fn contains(self, dialect: Dialect) -> bool {
        self.0 & dialect.bit() != 0
    }

    /// Returns a copy with `dialect` enabled.
    pub const fn with(self, dialect: Dialect) -> Self {
        Dialects(self.0 | dialect.bit())
    }

    /// Returns true if no dialect is enabled.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if any fixed-size sub-protocol is enabled.
    pub const fn any_fixed(self) -> bool {
        self.contains(Dialect::VersionRequest)
            || self.contains(Dialect::VersionResponse)
            || self.contains(Dialect::Gamepad)
    }

    /// Iterates the enabled dialects in bit order.
    pub fn iter(self) -> impl Iterator<Item = Dialect> {
        Dialect::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

impl From<Dialect> for Dialects {
    fn from(dialect: Dialect) -> Self {
        Dialects::NONE.with(dialect)
    }
}

impl BitOr for Dialects {
    type Output = Dialects;

    fn bitor(self, rhs: Dialects) -> Dialects {
        Dialects(self.0 | rhs.0)
    }
}

impl BitOr<Dialect> for Dialects {
    type Output = Dialects;

    fn bitor(self, rhs: Dialect) -> Dialects {
        self.with(rhs)
    }
}

impl BitOr for Dialect {
    type Output = Dialects;

    fn bitor(self, rhs: Dialect) -> Dialects {
        Dialects::from(self).with(rhs)
    }
}

impl FromIterator<Dialect> for Dialects {
    fn from_iter<I: IntoIterator<Item = Dialect>>(iter: I) -> Self {
        iter.into_iter().fold(Dialects::NONE, Dialects::with)
    }
}

impl From<Vec<Dialect>> for Dialects {
    fn from(list: Vec<Dialect>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Dialects> for Vec<Dialect> {
    fn from(dialects: Dialects) -> Self {
        dialects.iter().collect()
    }
}

impl fmt::Debug for Dialects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ============================================================================
// Markers and layout
// ============================================================================

/// Marker bytes recognised on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Head of a simple-delimited frame.
    pub delimited_head: u8,
    /// Tail of a simple-delimited frame.
    pub delimited_tail: u8,
    /// Head of a length-prefixed frame.
    pub length_head: u8,
    /// Tail of a length-prefixed frame.
    pub length_tail: u8,
    /// Two-byte magic opening fixed-size frames.
    pub magic: [u8; 2],
}

impl Default for Markers {
    fn default() -> Self {
        Markers {
            delimited_head: DELIMITED_HEAD,
            delimited_tail: DELIMITED_TAIL,
            length_head: LENGTH_PREFIXED_HEAD,
            length_tail: LENGTH_PREFIXED_TAIL,
            magic: FIXED_MAGIC,
        }
    }
}

/// Body lengths (bytes after the magic) of the fixed-size frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedLayout {
    /// Version request body length.
    pub version_request_len: usize,
    /// Version response body length.
    pub version_response_len: usize,
    /// Gamepad body length, trailing checksum included.
    pub gamepad_len: usize,
}

impl Default for FixedLayout {
    fn default() -> Self {
        FixedLayout {
            version_request_len: VERSION_REQUEST_LEN,
            version_response_len: VERSION_RESPONSE_LEN,
            gamepad_len: GAMEPAD_LEN,
        }
    }
}

// ============================================================================
// Channel configuration
// ============================================================================

/// Immutable configuration of one channel's assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Enabled dialects.
    pub dialects: Dialects,
    /// Marker bytes.
    pub markers: Markers,
    /// Fixed-size body lengths.
    pub fixed: FixedLayout,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::new(Dialect::LengthPrefixed.into())
    }
}

impl ChannelConfig {
    /// Create a configuration with the conventional markers.
    pub fn new(dialects: Dialects) -> Self {
        ChannelConfig {
            dialects,
            markers: Markers::default(),
            fixed: FixedLayout::default(),
        }
    }

    /// Replace the marker bytes.
    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    /// Replace the fixed-size body lengths.
    pub fn with_fixed_layout(mut self, fixed: FixedLayout) -> Self {
        self.fixed = fixed;
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dialects.contains(Dialect::VersionRequest)
            && self.dialects.contains(Dialect::VersionResponse)
        {
            return Err(ConfigError::ConflictingVersionDialects);
        }

        let lengths = [
            (Dialect::VersionRequest, self.fixed.version_request_len),
            (Dialect::VersionResponse, self.fixed.version_response_len),
            (Dialect::Gamepad, self.fixed.gamepad_len),
        ];
        for (dialect, len) in lengths {
            if !self.dialects.contains(dialect) {
                continue;
            }
            if !(FIXED_PROBE_LEN..=OVERFLOW_LIMIT).contains(&len) {
                return Err(ConfigError::InvalidFixedLength {
                    dialect,
                    len,
                    min: FIXED_PROBE_LEN,
                    max: OVERFLOW_LIMIT,
                });
            }
        }

        Ok(())
    }
}
