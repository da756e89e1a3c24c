//! Script request/response protocol.
//!
//! Scripts travel as the payload of length-prefixed frames:
//!
//! ```text
//! request: 28 service serial_lo serial_hi script-utf8..
//! reply:   28 01      serial_lo serial_hi result.. 00
//! ```
//!
//! `service` is 00 for fire-and-forget and 01 when a reply is expected. A
//! request that expects a reply is retransmitted until a reply carrying the
//! same serial arrives or the attempt budget runs out.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use botlink_frame::{ChannelConfig, Frame, FrameEncoder, FrameKind};
use botlink_metrics::{metric_defs, metrics};

use crate::{Channel, Port, ScriptError, ScriptResult, Transport};

/// Protocol identifier leading every script payload.
pub const SCRIPT_PROTOCOL_ID: u8 = 0x28;
/// Service byte of a request without reply.
pub const SERVICE_NOTIFY: u8 = 0x00;
/// Service byte of a request expecting a reply, and of the reply itself.
pub const SERVICE_REQUEST: u8 = 0x01;
/// Byte the device appends after the result.
pub const REPLY_TERMINATOR: u8 = 0x00;

/// Result text meaning "no value".
const NONE_LITERAL: &[u8] = b"None";
/// Head, CKH, length, protocol, service, serial, terminator, CKB, tail.
const MIN_REPLY_FRAME_LEN: usize = 11;

// ============================================================================
// Values
// ============================================================================

/// Expected type of a script result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Any reply means "done"; the content is ignored.
    None,
    /// `True` or `False`.
    Bool,
    /// Decimal integer text.
    Int,
    /// Floating point text.
    Float,
    /// Raw result bytes.
    #[default]
    Str,
}

impl ResultType {
    /// Returns the type name as used in configuration and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResultType::None => "none",
            ResultType::Bool => "bool",
            ResultType::Int => "int",
            ResultType::Float => "float",
            ResultType::Str => "str",
        }
    }

    /// Decode a reply's result region.
    pub fn decode(self, result: &[u8]) -> ScriptResult<ScriptValue> {
        if result == NONE_LITERAL {
            return Ok(ScriptValue::None);
        }

        let decode_error = || ScriptError::Decode {
            expected: self.as_str(),
            text: String::from_utf8_lossy(result).into_owned(),
        };

        match self {
            ResultType::None => Ok(ScriptValue::None),
            ResultType::Bool => match result {
                b"True" => Ok(ScriptValue::Bool(true)),
                b"False" => Ok(ScriptValue::Bool(false)),
                _ => Err(decode_error()),
            },
            ResultType::Int => std::str::from_utf8(result)
                .ok()
                .and_then(|text| text.trim().parse().ok())
                .map(ScriptValue::Int)
                .ok_or_else(decode_error),
            ResultType::Float => std::str::from_utf8(result)
                .ok()
                .and_then(|text| text.trim().parse().ok())
                .map(ScriptValue::Float)
                .ok_or_else(decode_error),
            ResultType::Str => Ok(ScriptValue::Str(result.to_vec())),
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded script result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// The script produced no value.
    None,
    /// Boolean result.
    Bool(bool),
    /// Integer result.
    Int(i64),
    /// Floating point result.
    Float(f64),
    /// Raw result bytes.
    Str(Vec<u8>),
}

impl ScriptValue {
    /// Returns true for [`ScriptValue::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, ScriptValue::None)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The number, if this is an integer or a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScriptValue::Float(x) => Some(*x),
            ScriptValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The raw bytes, if this is a string result.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ScriptValue::Str(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::None => f.write_str("None"),
            ScriptValue::Bool(true) => f.write_str("True"),
            ScriptValue::Bool(false) => f.write_str("False"),
            ScriptValue::Int(i) => write!(f, "{}", i),
            ScriptValue::Float(x) => write!(f, "{}", x),
            ScriptValue::Str(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// One script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    /// Correlates the reply with this request.
    pub serial: u16,
    /// Script source.
    pub script: String,
    /// How to decode the reply.
    pub result_type: ResultType,
    /// Whether the device should reply.
    pub response_required: bool,
}

impl ScriptRequest {
    /// A fire-and-forget request.
    pub fn notify(serial: u16, script: impl Into<String>) -> Self {
        ScriptRequest {
            serial,
            script: script.into(),
            result_type: ResultType::None,
            response_required: false,
        }
    }

    /// A request expecting a reply of `result_type`.
    pub fn request(serial: u16, script: impl Into<String>, result_type: ResultType) -> Self {
        ScriptRequest {
            serial,
            script: script.into(),
            result_type,
            response_required: true,
        }
    }

    /// The service byte.
    pub fn service(&self) -> u8 {
        if self.response_required {
            SERVICE_REQUEST
        } else {
            SERVICE_NOTIFY
        }
    }

    fn service_label(&self) -> &'static str {
        if self.response_required {
            "request"
        } else {
            "notify"
        }
    }

    /// The length-prefixed payload carrying this request.
    pub fn payload(&self) -> Vec<u8> {
        let [serial_lo, serial_hi] = self.serial.to_le_bytes();
        let mut payload = Vec::with_capacity(4 + self.script.len());
        payload.extend_from_slice(&[SCRIPT_PROTOCOL_ID, self.service(), serial_lo, serial_hi]);
        payload.extend_from_slice(self.script.as_bytes());
        payload
    }

    /// Parse a request payload, as a device would.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let (header, script) = payload.split_at(4);
        if header[0] != SCRIPT_PROTOCOL_ID || header[1] > SERVICE_REQUEST {
            return None;
        }
        Some(ScriptRequest {
            serial: u16::from_le_bytes([header[2], header[3]]),
            script: String::from_utf8_lossy(script).into_owned(),
            result_type: ResultType::Str,
            response_required: header[1] == SERVICE_REQUEST,
        })
    }
}

/// A reply as sent by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReply {
    /// Serial of the request being answered.
    pub serial: u16,
    /// Result text, without terminator.
    pub result: Vec<u8>,
}

impl ScriptReply {
    /// A reply carrying `result`.
    pub fn new(serial: u16, result: impl Into<Vec<u8>>) -> Self {
        ScriptReply {
            serial,
            result: result.into(),
        }
    }

    /// A reply meaning "no value".
    pub fn none(serial: u16) -> Self {
        Self::new(serial, NONE_LITERAL)
    }

    /// The length-prefixed payload carrying this reply.
    pub fn payload(&self) -> Vec<u8> {
        let [serial_lo, serial_hi] = self.serial.to_le_bytes();
        let mut payload = Vec::with_capacity(5 + self.result.len());
        payload.extend_from_slice(&[SCRIPT_PROTOCOL_ID, SERVICE_REQUEST, serial_lo, serial_hi]);
        payload.extend_from_slice(&self.result);
        payload.push(REPLY_TERMINATOR);
        payload
    }

    /// The complete reply frame.
    pub fn encode(&self, encoder: &FrameEncoder) -> Vec<u8> {
        encoder.encode_length_prefixed(&self.payload())
    }

    /// Extract a reply from a frame, if the frame is one.
    ///
    /// The result region is everything between the serial and the byte
    /// preceding the body checksum.
    pub fn parse(frame: &Frame) -> Option<Self> {
        if frame.kind() != FrameKind::LengthPrefixed || frame.len() < MIN_REPLY_FRAME_LEN {
            return None;
        }
        let bytes = frame.as_bytes();
        if bytes[4] != SCRIPT_PROTOCOL_ID || bytes[5] != SERVICE_REQUEST {
            return None;
        }
        Some(ScriptReply {
            serial: u16::from_le_bytes([bytes[6], bytes[7]]),
            result: bytes[8..bytes.len() - 3].to_vec(),
        })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Retransmission budget of a request expecting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcTiming {
    /// Transmissions before giving up.
    pub attempts: u32,
    /// Empty channel polls per attempt.
    pub polls: u32,
    /// Sleep after a poll that produced no frame, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RpcTiming {
    fn default() -> Self {
        RpcTiming {
            attempts: 3,
            polls: 200,
            poll_interval_ms: 1,
        }
    }
}

impl RpcTiming {
    /// Sleep after an empty poll.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Time one attempt waits for its reply.
    pub fn attempt_budget(&self) -> Duration {
        self.poll_interval() * self.polls
    }

    /// Time spent waiting before a request is given up.
    pub fn budget(&self) -> Duration {
        self.attempt_budget() * self.attempts.max(1)
    }
}

/// Sends scripts over a channel and waits for their replies.
pub struct ScriptClient<T> {
    channel: Channel<T>,
    timing: RpcTiming,
    next_serial: u16,
}

impl<T: Transport> ScriptClient<T> {
    /// Create a client with the default timing.
    pub fn new(channel: Channel<T>) -> Self {
        ScriptClient {
            channel,
            timing: RpcTiming::default(),
            next_serial: 0,
        }
    }

    /// Set up `transport`, wrap it in a channel and create a client.
    ///
    /// An invalid channel configuration is rejected.
    pub fn open(transport: T, port: &Port, config: ChannelConfig) -> ScriptResult<Self> {
        Ok(Self::new(Channel::try_open(transport, port, config)?))
    }

    /// Replace the retransmission budget.
    pub fn with_timing(mut self, timing: RpcTiming) -> Self {
        self.timing = timing;
        self
    }

    /// The retransmission budget.
    pub fn timing(&self) -> &RpcTiming {
        &self.timing
    }

    /// The underlying channel.
    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// The underlying channel, mutably.
    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    /// Consume the client, returning the channel.
    pub fn into_channel(self) -> Channel<T> {
        self.channel
    }

    /// Allocate a serial number. Wraps after 65535.
    pub fn next_serial(&mut self) -> u16 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        serial
    }

    /// Send a script once without waiting for anything.
    pub fn fire_and_forget(&mut self, serial: u16, script: &str) -> ScriptResult<()> {
        self.send(&ScriptRequest::notify(serial, script))
    }

    /// Send a script and wait for its decoded result.
    ///
    /// Anything received before the request is discarded first. Fails with
    /// [`ScriptError::NoReply`] once every attempt has timed out. Frames that
    /// are not the awaited reply are discarded.
    pub fn request_response(
        &mut self,
        serial: u16,
        script: &str,
        result_type: ResultType,
    ) -> ScriptResult<ScriptValue> {
        let request = ScriptRequest::request(serial, script, result_type);
        let attempts = self.timing.attempts.max(1);
        let started = Instant::now();
        self.channel.clear_rx();

        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!(serial, attempt, "no reply, retransmitting");
                metrics::counter!(metric_defs::SCRIPT_RETRANSMISSIONS.name).increment(1);
            }
            self.send(&request)?;

            if let Some(reply) = self.wait_reply(serial)? {
                let elapsed = started.elapsed();
                debug!(serial, attempt, elapsed_ms = elapsed.as_millis() as u64, "reply received");
                metrics::histogram!(metric_defs::SCRIPT_ROUND_TRIP.name).record(elapsed.as_secs_f64() * 1000.0);
                return result_type.decode(&reply.result);
            }
        }

        warn!(serial, attempts, "script request exhausted");
        metrics::counter!(metric_defs::SCRIPT_EXHAUSTED.name).increment(1);
        Err(ScriptError::NoReply { attempts })
    }

    /// Run a request according to its `response_required` flag.
    ///
    /// Fire-and-forget requests yield [`ScriptValue::None`].
    pub fn execute(&mut self, request: &ScriptRequest) -> ScriptResult<ScriptValue> {
        if request.response_required {
            self.request_response(request.serial, &request.script, request.result_type)
        } else {
            self.send(request)?;
            Ok(ScriptValue::None)
        }
    }

    /// Allocate a serial and run a request expecting a reply.
    pub fn call(&mut self, script: &str, result_type: ResultType) -> ScriptResult<ScriptValue> {
        let serial = self.next_serial();
        self.request_response(serial, script, result_type)
    }

    fn send(&self, request: &ScriptRequest) -> ScriptResult<()> {
        debug!(
            serial = request.serial,
            service = request.service_label(),
            len = request.script.len(),
            "sending script"
        );
        self.channel.send_length_prefixed(&request.payload())?;
        metrics::counter!(metric_defs::SCRIPT_REQUESTS.name, "service" => request.service_label()).increment(1);
        Ok(())
    }

    /// Poll the channel for the reply to `serial`.
    ///
    /// The client sleeps after every empty poll and gives up after `polls` of
    /// them. Frames that are not the reply cost no poll, so a busy channel is
    /// bounded by the attempt's time budget instead.
    fn wait_reply(&mut self, serial: u16) -> ScriptResult<Option<ScriptReply>> {
        let interval = self.timing.poll_interval();
        let deadline = Instant::now() + self.timing.attempt_budget();
        let mut idle_polls = 0;

        while idle_polls < self.timing.polls {
            if self.channel.cancel_token().is_cancelled() {
                return Err(ScriptError::Cancelled);
            }

            let Some(frame) = self.channel.get_frame() else {
                idle_polls += 1;
                thread::sleep(interval);
                continue;
            };
            match ScriptReply::parse(&frame) {
                Some(reply) if reply.serial == serial => return Ok(Some(reply)),
                Some(reply) => debug!(expected = serial, got = reply.serial, "discarding stale reply"),
                None => trace!(kind = %frame.kind(), "discarding non-reply frame"),
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_frame(reply: &ScriptReply) -> Frame {
        let wire = reply.encode(&FrameEncoder::default());
        let mut assembler = botlink_frame::FrameAssembler::new(Default::default());
        assembler.feed(&wire).expect("reply frame")
    }

    #[test]
    fn test_request_payload() {
        let request = ScriptRequest::notify(5, "hi");
        assert_eq!(request.payload(), vec![0x28, 0x00, 0x05, 0x00, 0x68, 0x69]);

        let request = ScriptRequest::request(0x1234, "x", ResultType::Int);
        assert_eq!(request.payload(), vec![0x28, 0x01, 0x34, 0x12, 0x78]);
    }

    #[test]
    fn test_request_parse() {
        let parsed = ScriptRequest::parse(&[0x28, 0x01, 0x34, 0x12, 0x61, 0x62]).unwrap();
        assert_eq!(parsed.serial, 0x1234);
        assert_eq!(parsed.script, "ab");
        assert!(parsed.response_required);

        assert!(ScriptRequest::parse(&[0x29, 0x01, 0x00, 0x00]).is_none());
        assert!(ScriptRequest::parse(&[0x28, 0x01, 0x00]).is_none());
    }

    #[test]
    fn test_reply_round_trip_through_frame() {
        let reply = ScriptReply::new(0xBEEF, "42");
        assert_eq!(reply.payload(), vec![0x28, 0x01, 0xEF, 0xBE, b'4', b'2', 0x00]);

        let parsed = ScriptReply::parse(&reply_frame(&reply)).unwrap();
        assert_eq!(parsed, reply);
    }

    #[test]
    fn test_reply_with_empty_result() {
        let reply = ScriptReply::new(1, Vec::new());
        let parsed = ScriptReply::parse(&reply_frame(&reply)).unwrap();
        assert!(parsed.result.is_empty());
    }

    #[test]
    fn test_request_frame_is_not_a_reply() {
        let wire = FrameEncoder::default().encode_length_prefixed(&ScriptRequest::notify(1, "abc").payload());
        let mut assembler = botlink_frame::FrameAssembler::new(Default::default());
        let frame = assembler.feed(&wire).unwrap();
        assert!(ScriptReply::parse(&frame).is_none());
    }

    #[test]
    fn test_decode_types() {
        assert_eq!(ResultType::Bool.decode(b"True").unwrap(), ScriptValue::Bool(true));
        assert_eq!(ResultType::Bool.decode(b"False").unwrap(), ScriptValue::Bool(false));
        assert_eq!(ResultType::Int.decode(b"-17").unwrap(), ScriptValue::Int(-17));
        assert_eq!(ResultType::Int.decode(b" 8 ").unwrap(), ScriptValue::Int(8));
        assert_eq!(ResultType::Float.decode(b"2.5").unwrap(), ScriptValue::Float(2.5));
        assert_eq!(ResultType::Str.decode(b"abc").unwrap(), ScriptValue::Str(b"abc".to_vec()));
        assert_eq!(ResultType::None.decode(b"anything").unwrap(), ScriptValue::None);
    }

    #[test]
    fn test_none_literal_for_every_type() {
        for ty in [ResultType::None, ResultType::Bool, ResultType::Int, ResultType::Float, ResultType::Str] {
            assert!(ty.decode(b"None").unwrap().is_none());
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ResultType::Bool.decode(b"yes"),
            Err(ScriptError::Decode { expected: "bool", .. })
        ));
        assert!(matches!(ResultType::Int.decode(b"1.5"), Err(ScriptError::Decode { .. })));
        assert!(matches!(ResultType::Float.decode(&[0xFF]), Err(ScriptError::Decode { .. })));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ScriptValue::Bool(true).to_string(), "True");
        assert_eq!(ScriptValue::Int(3).to_string(), "3");
        assert_eq!(ScriptValue::Str(b"ok".to_vec()).to_string(), "ok");
        assert_eq!(ScriptValue::Int(3).as_float(), Some(3.0));
    }

    #[test]
    fn test_timing_defaults() {
        let timing = RpcTiming::default();
        assert_eq!(timing.attempts, 3);
        assert_eq!(timing.polls, 200);
        assert_eq!(timing.attempt_budget(), Duration::from_millis(200));
        assert_eq!(timing.budget(), Duration::from_millis(600));

        let timing: RpcTiming = serde_yaml::from_str("attempts: 5").unwrap();
        assert_eq!(timing.attempts, 5);
        assert_eq!(timing.polls, 200);
    }
}
