//! Outgoing frame encoding.
//!
//! The length-prefixed layout written by [`FrameEncoder::encode_length_prefixed`]:
//!
//! ```text
//! +------+-----+--------+--------+-------------+-----+------+
//! | head | CKH | len_lo | len_hi | payload..   | CKB | tail |
//! +------+-----+--------+--------+-------------+-----+------+
//! CKH = (head + len_lo + len_hi) & 0xFF
//! CKB = sum(payload) & 0xFF
//! ```

use bytes::BufMut;

use botlink_metrics::{metric_defs, metrics};

use crate::constants::{LENGTH_PREFIXED_OVERHEAD, MAX_LENGTH_PREFIXED_PAYLOAD};
use crate::{checksum, FrameError, Markers};

/// Header checksum of a length-prefixed frame.
pub fn header_checksum(head: u8, len_lo: u8, len_hi: u8) -> u8 {
    head.wrapping_add(len_lo).wrapping_add(len_hi)
}

/// Builds outgoing frames with a channel's markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    markers: Markers,
}

impl FrameEncoder {
    /// Create an encoder for the given markers.
    pub fn new(markers: Markers) -> Self {
        FrameEncoder { markers }
    }

    /// The markers this encoder writes.
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Encode a length-prefixed frame.
    ///
    /// Payloads longer than 65535 bytes violate the 16-bit length field; the
    /// length is truncated in that case. Use
    /// [`try_encode_length_prefixed`](Self::try_encode_length_prefixed) when
    /// the payload size is not known to fit.
    pub fn encode_length_prefixed(&self, payload: &[u8]) -> Vec<u8> {
        let [len_lo, len_hi] = (payload.len() as u16).to_le_bytes();
        let head = self.markers.length_head;

        let mut buf = Vec::with_capacity(1 + LENGTH_PREFIXED_OVERHEAD + payload.len());
        buf.put_u8(head);
        buf.put_u8(header_checksum(head, len_lo, len_hi));
        buf.put_u8(len_lo);
        buf.put_u8(len_hi);
        buf.extend_from_slice(payload);
        buf.put_u8(checksum(payload));
        buf.put_u8(self.markers.length_tail);

        metrics::histogram!(metric_defs::FRAME_ENCODED_SIZE.name).record(buf.len() as f64);
        buf
    }

    /// Encode a length-prefixed frame, rejecting payloads the length field cannot describe.
    pub fn try_encode_length_prefixed(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        if payload.len() > MAX_LENGTH_PREFIXED_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                max: MAX_LENGTH_PREFIXED_PAYLOAD,
                actual: payload.len(),
            });
        }
        Ok(self.encode_length_prefixed(payload))
    }

    /// Encode a simple-delimited frame.
    ///
    /// The dialect has no escaping: the payload must not contain the tail marker.
    pub fn encode_simple_delimited(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(payload.len() + 2);
        buf.put_u8(self.markers.delimited_head);
        buf.extend_from_slice(payload);
        buf.put_u8(self.markers.delimited_tail);
        buf
    }
}
