//! In-memory transport pair.
//!
//! [`loopback_pair`] returns a host end and a device end joined by two
//! overwrite queues, the same RX/TX arrangement a radio link uses. Whatever
//! one end sends, the other end receives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use botlink_frame::BoundedOverwriteQueue;

use crate::{Port, Transport, TransportError};

type ChunkQueue = BoundedOverwriteQueue<Vec<u8>>;

/// One end of a loopback link.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    inbound: Arc<ChunkQueue>,
    outbound: Arc<ChunkQueue>,
    ready: Arc<AtomicBool>,
}

/// Create a connected (host, device) pair.
///
/// The host end starts not ready; it becomes ready on `setup`. The device end
/// is always ready.
pub fn loopback_pair(rx_capacity: usize, tx_capacity: usize) -> (LoopbackTransport, LoopbackTransport) {
    let host_rx = Arc::new(ChunkQueue::with_label(rx_capacity, "rx"));
    let host_tx = Arc::new(ChunkQueue::with_label(tx_capacity, "tx"));

    let host = LoopbackTransport {
        inbound: Arc::clone(&host_rx),
        outbound: Arc::clone(&host_tx),
        ready: Arc::new(AtomicBool::new(false)),
    };
    let device = LoopbackTransport {
        inbound: host_tx,
        outbound: host_rx,
        ready: Arc::new(AtomicBool::new(true)),
    };
    (host, device)
}

impl LoopbackTransport {
    /// Mark this end ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// The queue this end receives from.
    pub fn inbound(&self) -> &BoundedOverwriteQueue<Vec<u8>> {
        &self.inbound
    }

    /// The queue this end sends into.
    pub fn outbound(&self) -> &BoundedOverwriteQueue<Vec<u8>> {
        &self.outbound
    }
}

impl Transport for LoopbackTransport {
    fn setup(&mut self, _port: &Port) -> Result<(), TransportError> {
        self.set_ready(true);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.outbound.enqueue(data.to_vec());
        Ok(())
    }

    fn recv(&self) -> Option<Vec<u8>> {
        self.inbound.dequeue()
    }

    fn clear_rx(&self) -> usize {
        self.inbound.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_crossed() {
        let (mut host, device) = loopback_pair(4, 4);
        assert!(!host.is_ready());
        host.setup(&Port::Auto).unwrap();
        assert!(host.is_ready());

        host.send(&[1, 2]).unwrap();
        assert_eq!(device.recv(), Some(vec![1, 2]));
        assert_eq!(host.recv(), None);

        device.send(&[3]).unwrap();
        assert_eq!(host.recv(), Some(vec![3]));
    }

    #[test]
    fn test_rx_overflow_keeps_newest_chunk() {
        let (host, device) = loopback_pair(2, 2);
        for i in 0..3u8 {
            device.send(&[i]).unwrap();
        }
        assert_eq!(host.recv(), Some(vec![2]));
        assert_eq!(host.recv(), None);
        assert_eq!(host.inbound().overflows(), 1);
    }

    #[test]
    fn test_clear_rx_leaves_other_direction() {
        let (host, device) = loopback_pair(4, 4);
        device.send(&[1]).unwrap();
        device.send(&[2]).unwrap();
        host.send(&[9]).unwrap();

        assert_eq!(host.clear_rx(), 2);
        assert_eq!(host.recv(), None);
        assert_eq!(device.recv(), Some(vec![9]));
    }
}
