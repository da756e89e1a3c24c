//! One logical link: a transport plus the assembler that owns its input.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use botlink_frame::{ChannelConfig, Frame, FrameAssembler, FrameEncoder};

use crate::{CancelToken, LinkError, LinkResult, Port, Transport};

/// Granularity of the readiness wait before a write.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A transport and the frame state belonging to it.
///
/// The channel is driven from one thread; the transport's own provider
/// (if any) only touches the transport's RX queue.
pub struct Channel<T> {
    transport: T,
    assembler: FrameAssembler,
    encoder: FrameEncoder,
    cancel: CancelToken,
}

impl<T: Transport> Channel<T> {
    /// Wrap an already set up transport.
    ///
    /// A configuration error is logged and the channel is built anyway.
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Channel {
            transport,
            assembler: FrameAssembler::new(config),
            encoder: FrameEncoder::new(config.markers),
            cancel: CancelToken::new(),
        }
    }

    /// Set up `transport` on `port` and wrap it.
    pub fn open(mut transport: T, port: &Port, config: ChannelConfig) -> LinkResult<Self> {
        transport.setup(port)?;
        debug!(%port, dialects = ?config.dialects, "channel open");
        Ok(Self::new(transport, config))
    }

    /// Like [`open`](Self::open), but an invalid configuration is an error
    /// and the transport is left untouched.
    pub fn try_open(transport: T, port: &Port, config: ChannelConfig) -> LinkResult<Self> {
        config.validate()?;
        Self::open(transport, port, config)
    }

    /// Share a cancellation token with other waiters.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that aborts this channel's waits.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        self.assembler.config()
    }

    /// The assembler owning this channel's input.
    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the channel, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Return the next complete frame, if any.
    ///
    /// Input retained from earlier chunks is walked first; a new chunk is
    /// pulled from the transport only when that yields nothing.
    pub fn get_frame(&mut self) -> Option<Frame> {
        if let Some(frame) = self.assembler.poll() {
            return Some(frame);
        }
        let chunk = self.transport.recv()?;
        self.assembler.feed(&chunk)
    }

    /// Discard everything received so far: queued chunks, retained input and
    /// any partial frame.
    pub fn clear_rx(&mut self) {
        let chunks = self.transport.clear_rx();
        let retained = self.assembler.pending_len() + self.assembler.buffered_len();
        self.assembler.reset();
        if chunks > 0 || retained > 0 {
            debug!(chunks, retained, "rx cleared");
        }
    }

    /// Write raw bytes, waiting for the transport to become ready.
    ///
    /// The wait has no deadline; only the cancellation token ends it early.
    pub fn write_bytes(&self, data: &[u8]) -> LinkResult<()> {
        self.wait_ready()?;
        trace!(len = data.len(), "write");
        self.transport.send(data)?;
        Ok(())
    }

    /// Encode `payload` as a length-prefixed frame and write it.
    pub fn send_length_prefixed(&self, payload: &[u8]) -> LinkResult<()> {
        let frame = self.encoder.try_encode_length_prefixed(payload)?;
        self.write_bytes(&frame)
    }

    /// Encode `payload` as a simple-delimited frame and write it.
    pub fn send_simple_delimited(&self, payload: &[u8]) -> LinkResult<()> {
        let frame = self.encoder.encode_simple_delimited(payload);
        self.write_bytes(&frame)
    }

    fn wait_ready(&self) -> LinkResult<()> {
        let mut logged = false;
        while !self.transport.is_ready() {
            if self.cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }
            if !logged {
                debug!("transport not ready, waiting");
                logged = true;
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback_pair;
    use botlink_frame::{Dialect, FrameKind};

    fn open_pair() -> (Channel<crate::LoopbackTransport>, crate::LoopbackTransport) {
        let (host, device) = loopback_pair(16, 16);
        let channel = Channel::open(host, &Port::Auto, ChannelConfig::default()).unwrap();
        (channel, device)
    }

    #[test]
    fn test_send_length_prefixed() {
        let (channel, device) = open_pair();
        channel.send_length_prefixed(&[0x28, 0x00, 0x05, 0x00, 0x68, 0x69]).unwrap();
        assert_eq!(
            device.recv(),
            Some(vec![0xF3, 0xF9, 0x06, 0x00, 0x28, 0x00, 0x05, 0x00, 0x68, 0x69, 0xFE, 0xF4])
        );
    }

    #[test]
    fn test_get_frame_across_chunks() {
        let (mut channel, device) = open_pair();
        let wire = FrameEncoder::default().encode_length_prefixed(b"pong");
        device.send(&wire[..3]).unwrap();
        device.send(&wire[3..]).unwrap();

        assert!(channel.get_frame().is_none());
        let frame = channel.get_frame().expect("frame");
        assert_eq!(frame.kind(), FrameKind::LengthPrefixed);
        assert_eq!(frame.payload(), b"pong");
        assert!(channel.get_frame().is_none());
    }

    #[test]
    fn test_retained_frame_returned_without_new_input() {
        let (mut channel, device) = open_pair();
        let mut wire = FrameEncoder::default().encode_length_prefixed(b"a");
        wire.extend_from_slice(&FrameEncoder::default().encode_length_prefixed(b"b"));
        device.send(&wire).unwrap();

        assert_eq!(channel.get_frame().unwrap().payload(), b"a");
        assert_eq!(channel.get_frame().unwrap().payload(), b"b");
    }

    #[test]
    fn test_retained_input_drained_before_new_chunks() {
        let (mut channel, device) = open_pair();
        let mut two = FrameEncoder::default().encode_length_prefixed(b"a");
        two.extend_from_slice(&FrameEncoder::default().encode_length_prefixed(b"b"));

        for _ in 0..1000 {
            device.send(&two).unwrap();
            assert!(channel.get_frame().is_some());
            assert!(channel.get_frame().is_some());
            assert_eq!(channel.assembler().pending_len(), 0);
        }
        assert!(channel.get_frame().is_none());
        assert_eq!(channel.assembler().stats().trimmed_bytes, 0);
    }

    #[test]
    fn test_clear_rx_discards_pending_input() {
        let (mut channel, device) = open_pair();
        let encoder = FrameEncoder::default();
        let mut two = encoder.encode_length_prefixed(b"old1");
        two.extend_from_slice(&encoder.encode_length_prefixed(b"old2"));
        device.send(&two).unwrap();
        device.send(&encoder.encode_length_prefixed(b"old3")).unwrap();
        device.send(&encoder.encode_length_prefixed(b"new")[..4]).unwrap();

        assert_eq!(channel.get_frame().unwrap().payload(), b"old1");
        channel.clear_rx();
        assert_eq!(channel.assembler().pending_len(), 0);
        assert!(channel.transport().inbound().is_empty());
        assert!(channel.get_frame().is_none());

        device.send(&encoder.encode_length_prefixed(b"new")).unwrap();
        assert_eq!(channel.get_frame().unwrap().payload(), b"new");
    }

    #[test]
    fn test_try_open_rejects_conflicting_dialects() {
        let (host, _device) = loopback_pair(4, 4);
        let config = ChannelConfig::new(Dialect::VersionRequest | Dialect::VersionResponse);

        let result = Channel::try_open(host.clone(), &Port::Auto, config);
        assert!(matches!(
            result,
            Err(LinkError::Config(botlink_frame::ConfigError::ConflictingVersionDialects))
        ));
        assert!(!host.is_ready());

        assert!(Channel::try_open(host, &Port::Auto, ChannelConfig::default()).is_ok());
    }

    #[test]
    fn test_custom_markers_used_for_sending() {
        let (host, device) = loopback_pair(4, 4);
        let markers = botlink_frame::Markers {
            length_head: 0xA5,
            length_tail: 0x5A,
            ..Default::default()
        };
        let config = ChannelConfig::new(Dialect::LengthPrefixed.into()).with_markers(markers);
        let channel = Channel::open(host, &Port::Auto, config).unwrap();

        channel.send_length_prefixed(&[0x10]).unwrap();
        assert_eq!(device.recv(), Some(vec![0xA5, 0xA6, 0x01, 0x00, 0x10, 0x10, 0x5A]));
    }

    #[test]
    fn test_write_waits_until_cancelled() {
        let (host, _device) = loopback_pair(4, 4);
        let channel = Channel::new(host, ChannelConfig::default());
        assert!(!channel.transport().is_ready());

        let cancel = channel.cancel_token().clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });

        assert!(matches!(channel.write_bytes(&[1]), Err(LinkError::Cancelled)));
        canceller.join().unwrap();
    }

    #[test]
    fn test_write_proceeds_once_ready() {
        let (host, device) = loopback_pair(4, 4);
        let channel = Channel::new(host.clone(), ChannelConfig::default());

        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            host.set_ready(true);
        });

        channel.write_bytes(&[7, 8]).unwrap();
        waker.join().unwrap();
        assert_eq!(device.recv(), Some(vec![7, 8]));
    }
}
