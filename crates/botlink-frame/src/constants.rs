//! Wire constants
//!
//! Marker values are the conventional ones used by the controller firmware.
//! They are the defaults of [`Markers`](crate::Markers) and can be overridden
//! per channel.

// ============================================================================
// Markers
// ============================================================================

/// Head marker of the simple-delimited dialect.
pub const DELIMITED_HEAD: u8 = 0xF0;
/// Tail marker of the simple-delimited dialect.
pub const DELIMITED_TAIL: u8 = 0xF7;
/// Head marker of the length-prefixed dialect.
pub const LENGTH_PREFIXED_HEAD: u8 = 0xF3;
/// Tail marker of the length-prefixed dialect.
pub const LENGTH_PREFIXED_TAIL: u8 = 0xF4;
/// Two-byte magic that opens every fixed-size frame.
pub const FIXED_MAGIC: [u8; 2] = [0xFF, 0x55];

// ============================================================================
// Layout
// ============================================================================

/// Bytes following the head marker that are not payload: header checksum,
/// two length bytes, body checksum and tail marker.
pub const LENGTH_PREFIXED_OVERHEAD: usize = 5;

/// Largest payload the 16-bit length field can describe.
pub const MAX_LENGTH_PREFIXED_PAYLOAD: usize = u16::MAX as usize;

/// Accumulated bytes after which an unresolved header is abandoned.
pub const OVERFLOW_LIMIT: usize = 128;

/// Unwalked input an assembler keeps from earlier calls. Older retained
/// bytes beyond this are trimmed when new input arrives.
pub const PENDING_LIMIT: usize = 4096;

/// Body bytes needed before a fixed-size frame's sub-kind can be told apart.
pub const FIXED_PROBE_LEN: usize = 4;

/// Default body length (after the magic) of a version request.
pub const VERSION_REQUEST_LEN: usize = 4;
/// Default body length (after the magic) of a version response.
pub const VERSION_RESPONSE_LEN: usize = 12;
/// Default body length (after the magic) of a gamepad frame, checksum included.
pub const GAMEPAD_LEN: usize = 6;

// ============================================================================
// Fixed-size signatures
// ============================================================================

/// Version response: `body[1]`.
pub const VERSION_RESPONSE_SIG_1: u8 = 0x04;
/// Version response: `body[2]`.
pub const VERSION_RESPONSE_SIG_2: u8 = 0x09;
/// Version request: `body[0]`.
pub const VERSION_REQUEST_SIG_0: u8 = 0x03;
/// Version request: `body[2]`.
pub const VERSION_REQUEST_SIG_2: u8 = 0x01;
/// Version request: `body[3]`.
pub const VERSION_REQUEST_SIG_3: u8 = 0x00;
