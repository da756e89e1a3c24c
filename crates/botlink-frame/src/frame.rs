//! Validated frames.

use std::fmt;

use crate::constants::LENGTH_PREFIXED_OVERHEAD;

/// Which dialect produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `F0 payload.. F7`.
    SimpleDelimited,
    /// `F3 CKH L_lo L_hi payload.. CKB F4`.
    LengthPrefixed,
    /// Fixed-size version request.
    FixedVersionRequest,
    /// Fixed-size version response.
    FixedVersionResponse,
    /// Fixed-size gamepad state.
    FixedGamepad,
}

impl FrameKind {
    /// Returns the kind as a lowercase label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FrameKind::SimpleDelimited => "simple_delimited",
            FrameKind::LengthPrefixed => "length_prefixed",
            FrameKind::FixedVersionRequest => "version_request",
            FrameKind::FixedVersionResponse => "version_response",
            FrameKind::FixedGamepad => "gamepad",
        }
    }

    /// Returns true for frames opened by the two-byte magic.
    pub const fn is_fixed_size(&self) -> bool {
        matches!(
            self,
            FrameKind::FixedVersionRequest | FrameKind::FixedVersionResponse | FrameKind::FixedGamepad
        )
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One complete, validated frame.
///
/// The bytes are the frame exactly as it appeared on the wire, head marker
/// (or two-byte magic) included.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl Frame {
    pub(crate) fn new(kind: FrameKind, bytes: Vec<u8>) -> Self {
        Frame { kind, bytes }
    }

    /// The dialect this frame was assembled from.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Full wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning its wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Wire length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a frame carries at least its header.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The body of the frame without framing bytes.
    ///
    /// - length-prefixed: the declared payload (checksums, length and markers stripped)
    /// - simple-delimited: the bytes between head and tail marker
    /// - gamepad: the body without the magic and the trailing checksum
    /// - version request/response: the body without the magic
    pub fn payload(&self) -> &[u8] {
        let len = self.bytes.len();
        match self.kind {
            FrameKind::LengthPrefixed => &self.bytes[4..len - 2],
            FrameKind::SimpleDelimited => &self.bytes[1..len - 1],
            FrameKind::FixedGamepad => &self.bytes[2..len - 1],
            FrameKind::FixedVersionRequest | FrameKind::FixedVersionResponse => &self.bytes[2..],
        }
    }

    /// Declared payload length of a length-prefixed frame.
    pub fn declared_len(&self) -> Option<usize> {
        match self.kind {
            FrameKind::LengthPrefixed => Some(self.bytes.len() - 1 - LENGTH_PREFIXED_OVERHEAD),
            _ => None,
        }
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("bytes", &format_args!("{:02X?}", self.bytes))
            .finish()
    }
}

/// Eight-bit additive checksum used by every checked dialect.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
