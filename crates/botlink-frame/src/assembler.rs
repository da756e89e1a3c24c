//! Incremental multi-dialect frame assembler.
//!
//! The assembler is fed whatever the transport delivered (a single byte or a
//! chunk of any size) and walks it one byte at a time. For each byte, with the
//! first matching rule winning:
//!
//! 1. simple-delimited head marker, no header matched: start a delimited frame
//! 2. length-prefixed head marker, no header matched: start a length-prefixed frame
//! 3. second magic byte preceded by the first, no header matched: start a fixed-size frame
//! 4. otherwise: remember the byte and, if a header is matched, append it and
//!    run the completion check of that dialect
//!
//! Malformed input (bad checksum, bad tail, unknown fixed layout, or more than
//! [`OVERFLOW_LIMIT`] bytes behind an unresolved header) discards the partial
//! frame and scanning resumes with the next byte. Nothing is ever reported to
//! the caller; drops are counted in [`AssemblerStats`] and logged.
//!
//! At most one frame is returned per [`feed`](FrameAssembler::feed) call.
//! Input that follows an emitted frame is retained and processed first on the
//! next call, so the sequence of frames is independent of how the stream was
//! chunked. Retained input is capped at [`PENDING_LIMIT`]: when a new chunk
//! would push it past the cap, the oldest retained bytes are trimmed and the
//! partial frame they belonged to is abandoned.

use bytes::{Buf, BufMut, BytesMut};

use botlink_metrics::{metric_defs, metrics};

use crate::constants::*;
use crate::{checksum, header_checksum, ChannelConfig, ConfigError, Dialect, Frame, FrameKind};

/// Why a partial frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Length-prefixed header checksum mismatch.
    HeaderChecksum,
    /// Body checksum mismatch (length-prefixed or gamepad).
    BodyChecksum,
    /// Length-prefixed tail marker missing.
    BadTail,
    /// Too many bytes behind an unresolved header.
    Overflow,
    /// Fixed-size body matched no enabled sub-protocol.
    UnknownLayout,
}

impl DropReason {
    /// Returns the reason as a metric label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropReason::HeaderChecksum => "header_checksum",
            DropReason::BodyChecksum => "body_checksum",
            DropReason::BadTail => "bad_tail",
            DropReason::Overflow => "overflow",
            DropReason::UnknownLayout => "unknown_layout",
        }
    }
}

/// Running counters of an assembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Frames emitted.
    pub frames: u64,
    /// Length-prefixed header checksum failures.
    pub header_checksum_failures: u64,
    /// Body checksum failures.
    pub body_checksum_failures: u64,
    /// Length-prefixed frames with a wrong tail marker.
    pub bad_tails: u64,
    /// Overflow guard resets.
    pub overflows: u64,
    /// Fixed-size bodies matching no enabled sub-protocol.
    pub unknown_layouts: u64,
    /// Retained input bytes trimmed to stay under [`PENDING_LIMIT`].
    pub trimmed_bytes: u64,
}

impl AssemblerStats {
    /// Total partial frames discarded.
    pub fn dropped(&self) -> u64 {
        self.header_checksum_failures
            + self.body_checksum_failures
            + self.bad_tails
            + self.overflows
            + self.unknown_layouts
    }

    fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::HeaderChecksum => self.header_checksum_failures += 1,
            DropReason::BodyChecksum => self.body_checksum_failures += 1,
            DropReason::BadTail => self.bad_tails += 1,
            DropReason::Overflow => self.overflows += 1,
            DropReason::UnknownLayout => self.unknown_layouts += 1,
        }
    }
}

/// The header currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header {
    Delimited,
    /// `total` is the buffered length at completion, known once the header
    /// checksum has been validated.
    LengthPrefixed { total: Option<usize> },
    /// Kind and body size are resolved after [`FIXED_PROBE_LEN`] bytes.
    Fixed { resolved: Option<(FrameKind, usize)> },
}

impl Header {
    /// Whether the accumulation has a known end, which exempts it from the
    /// overflow guard.
    fn is_bounded(&self) -> bool {
        matches!(
            self,
            Header::LengthPrefixed { total: Some(_) } | Header::Fixed { resolved: Some(_) }
        )
    }
}

enum Step {
    Pending,
    Complete(Frame),
    Drop(DropReason),
}

/// Reassembles validated frames from a byte stream.
///
/// One assembler serves one channel and is owned by whoever drives that
/// channel; it never blocks and never fails.
#[derive(Debug)]
pub struct FrameAssembler {
    config: ChannelConfig,
    /// Input received but not yet walked.
    pending: BytesMut,
    /// Bytes accumulated after the matched header marker.
    buffer: BytesMut,
    header: Option<Header>,
    prev_byte: Option<u8>,
    stats: AssemblerStats,
}

impl FrameAssembler {
    /// Create an assembler for a channel.
    ///
    /// An invalid configuration is logged and otherwise tolerated; with both
    /// version dialects enabled, fixed-size bodies resolve as version responses
    /// first.
    pub fn new(config: ChannelConfig) -> Self {
        if let Err(e) = config.validate() {
            log::error!("channel configuration error: {}", e);
        }
        Self::build(config)
    }

    /// Create an assembler, rejecting an invalid configuration.
    pub fn try_new(config: ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ChannelConfig) -> Self {
        FrameAssembler {
            config,
            pending: BytesMut::new(),
            buffer: BytesMut::with_capacity(OVERFLOW_LIMIT),
            header: None,
            prev_byte: None,
            stats: AssemblerStats::default(),
        }
    }

    /// The channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Counters since construction.
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Number of received bytes not yet walked.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of bytes accumulated behind the current header.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The kind being accumulated, once it is known.
    pub fn matched_kind(&self) -> Option<FrameKind> {
        match self.header? {
            Header::Delimited => Some(FrameKind::SimpleDelimited),
            Header::LengthPrefixed { .. } => Some(FrameKind::LengthPrefixed),
            Header::Fixed { resolved } => resolved.map(|(kind, _)| kind),
        }
    }

    /// Feed received bytes, returning the next complete frame if there is one.
    ///
    /// A channel with no dialect enabled ignores its input.
    pub fn feed(&mut self, data: &[u8]) -> Option<Frame> {
        if self.config.dialects.is_empty() {
            return None;
        }

        let retained = self.pending.len();
        if retained > 0 && retained + data.len() > PENDING_LIMIT {
            self.trim_pending((retained + data.len() - PENDING_LIMIT).min(retained));
        }

        self.pending.extend_from_slice(data);
        while self.pending.has_remaining() {
            let byte = self.pending.get_u8();
            if let Some(frame) = self.push_byte(byte) {
                return Some(frame);
            }
        }
        None
    }

    /// Feed a single byte.
    pub fn feed_byte(&mut self, byte: u8) -> Option<Frame> {
        self.feed(&[byte])
    }

    /// Walk retained input without adding any.
    pub fn poll(&mut self) -> Option<Frame> {
        self.feed(&[])
    }

    /// Forget all state, including retained input.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.clear_accumulation();
        self.prev_byte = None;
    }

    /// Drop the `excess` oldest retained bytes. The accumulation in progress
    /// is missing them, so it goes too.
    fn trim_pending(&mut self, excess: usize) {
        log::debug!(
            "retained input over {} bytes, trimming {} oldest",
            PENDING_LIMIT,
            excess
        );
        self.pending.advance(excess);
        self.stats.trimmed_bytes += excess as u64;
        metrics::counter!(metric_defs::INPUT_TRIMMED.name).increment(excess as u64);
        self.clear_accumulation();
        self.prev_byte = None;
    }

    fn clear_accumulation(&mut self) {
        self.buffer.clear();
        self.header = None;
    }

    fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        if self.header.is_none() {
            if let Some(header) = self.match_header(byte) {
                self.buffer.clear();
                self.header = Some(header);
                return None;
            }
        }

        self.prev_byte = Some(byte);
        let header = self.header?;
        self.buffer.put_u8(byte);

        let step = match header {
            Header::Delimited => self.advance_delimited(byte),
            Header::LengthPrefixed { total } => self.advance_length_prefixed(total),
            Header::Fixed { resolved } => self.advance_fixed(resolved),
        };

        match step {
            Step::Complete(frame) => {
                self.clear_accumulation();
                self.stats.frames += 1;
                log::trace!("assembled {} frame ({} bytes)", frame.kind(), frame.len());
                metrics::counter!(metric_defs::FRAMES_ASSEMBLED.name, "kind" => frame.kind().as_str())
                    .increment(1);
                Some(frame)
            }
            Step::Drop(reason) => {
                self.discard(reason);
                None
            }
            Step::Pending => {
                let bounded = self.header.map_or(false, |h| h.is_bounded());
                if !bounded && self.buffer.len() >= OVERFLOW_LIMIT {
                    self.discard(DropReason::Overflow);
                }
                None
            }
        }
    }

    fn discard(&mut self, reason: DropReason) {
        log::debug!(
            "discarding partial frame after {} bytes: {}",
            self.buffer.len(),
            reason.as_str()
        );
        self.stats.record_drop(reason);
        metrics::counter!(metric_defs::FRAMES_DROPPED.name, "reason" => reason.as_str()).increment(1);
        self.clear_accumulation();
    }

    fn match_header(&self, byte: u8) -> Option<Header> {
        let dialects = self.config.dialects;
        let markers = &self.config.markers;

        if dialects.contains(Dialect::SimpleDelimited) && byte == markers.delimited_head {
            Some(Header::Delimited)
        } else if dialects.contains(Dialect::LengthPrefixed) && byte == markers.length_head {
            Some(Header::LengthPrefixed { total: None })
        } else if dialects.any_fixed()
            && byte == markers.magic[1]
            && self.prev_byte == Some(markers.magic[0])
        {
            Some(Header::Fixed { resolved: None })
        } else {
            None
        }
    }

    fn advance_delimited(&self, byte: u8) -> Step {
        let markers = &self.config.markers;
        if byte != markers.delimited_tail {
            return Step::Pending;
        }
        Step::Complete(self.emit(FrameKind::SimpleDelimited, &[markers.delimited_head]))
    }

    fn advance_length_prefixed(&mut self, total: Option<usize>) -> Step {
        let markers = self.config.markers;
        let total = match total {
            Some(total) => total,
            None => {
                if self.buffer.len() < 4 {
                    return Step::Pending;
                }
                let (ckh, len_lo, len_hi) = (self.buffer[0], self.buffer[1], self.buffer[2]);
                if ckh != header_checksum(markers.length_head, len_lo, len_hi) {
                    return Step::Drop(DropReason::HeaderChecksum);
                }
                let total = u16::from_le_bytes([len_lo, len_hi]) as usize + LENGTH_PREFIXED_OVERHEAD;
                self.header = Some(Header::LengthPrefixed { total: Some(total) });
                total
            }
        };

        if self.buffer.len() < total {
            return Step::Pending;
        }

        let body = &self.buffer[3..total - 2];
        let (ckb, tail) = (self.buffer[total - 2], self.buffer[total - 1]);
        if tail != markers.length_tail {
            return Step::Drop(DropReason::BadTail);
        }
        if ckb != checksum(body) {
            return Step::Drop(DropReason::BodyChecksum);
        }
        Step::Complete(self.emit(FrameKind::LengthPrefixed, &[markers.length_head]))
    }

    fn advance_fixed(&mut self, resolved: Option<(FrameKind, usize)>) -> Step {
        let (kind, size) = match resolved {
            Some(resolved) => resolved,
            None => {
                if self.buffer.len() < FIXED_PROBE_LEN {
                    return Step::Pending;
                }
                match self.classify_fixed() {
                    Some(resolved) => {
                        self.header = Some(Header::Fixed {
                            resolved: Some(resolved),
                        });
                        resolved
                    }
                    None => return Step::Drop(DropReason::UnknownLayout),
                }
            }
        };

        if self.buffer.len() < size {
            return Step::Pending;
        }

        if kind == FrameKind::FixedGamepad {
            if let Some((&ck, body)) = self.buffer.split_last() {
                if ck != checksum(body) {
                    return Step::Drop(DropReason::BodyChecksum);
                }
            }
        }
        Step::Complete(self.emit(kind, &self.config.markers.magic))
    }

    fn classify_fixed(&self) -> Option<(FrameKind, usize)> {
        let dialects = self.config.dialects;
        let fixed = &self.config.fixed;
        let body = &self.buffer;

        if dialects.contains(Dialect::VersionResponse)
            && body[1] == VERSION_RESPONSE_SIG_1
            && body[2] == VERSION_RESPONSE_SIG_2
        {
            Some((FrameKind::FixedVersionResponse, fixed.version_response_len))
        } else if dialects.contains(Dialect::VersionRequest)
            && body[0] == VERSION_REQUEST_SIG_0
            && body[2] == VERSION_REQUEST_SIG_2
            && body[3] == VERSION_REQUEST_SIG_3
        {
            Some((FrameKind::FixedVersionRequest, fixed.version_request_len))
        } else if dialects.contains(Dialect::Gamepad) {
            Some((FrameKind::FixedGamepad, fixed.gamepad_len))
        } else {
            None
        }
    }

    fn emit(&self, kind: FrameKind, prefix: &[u8]) -> Frame {
        let mut bytes = Vec::with_capacity(prefix.len() + self.buffer.len());
        bytes.extend_from_slice(prefix);
        bytes.extend_from_slice(&self.buffer);
        Frame::new(kind, bytes)
    }
}
