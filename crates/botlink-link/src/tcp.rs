//! Serial line bridged over TCP.
//!
//! Boards on a bench are commonly reached through a serial-to-TCP bridge (or
//! a simulator exposing the board's UART on a socket). [`TcpTransport`]
//! connects to such a bridge and runs a background task that pumps socket
//! reads into an RX overwrite queue and drains an outgoing channel into the
//! socket. The protocol side stays synchronous: `recv` pops the RX queue and
//! `send` pushes into the outgoing channel.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use botlink_frame::BoundedOverwriteQueue;

use crate::{Port, Transport, TransportError};

/// Address used for [`Port::Auto`].
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:5000";

const READ_BUF_LEN: usize = 1024;

type ChunkQueue = BoundedOverwriteQueue<Vec<u8>>;

/// Transport speaking to a TCP serial bridge.
///
/// `send` blocks while the outgoing channel is full and must not be called
/// from inside an async context.
pub struct TcpTransport {
    runtime: Runtime,
    incoming: Arc<ChunkQueue>,
    outgoing: Option<mpsc::Sender<Vec<u8>>>,
    tx_capacity: usize,
    connected: Arc<AtomicBool>,
    peer: Option<String>,
}

impl TcpTransport {
    /// Create an unconnected transport.
    ///
    /// `rx_capacity` bounds the RX queue in chunks; `tx_capacity` bounds the
    /// outgoing channel. Both must be at least 1.
    pub fn new(rx_capacity: usize, tx_capacity: usize) -> Result<Self, TransportError> {
        if rx_capacity == 0 {
            return Err(TransportError::ZeroCapacity { queue: "rx" });
        }
        if tx_capacity == 0 {
            return Err(TransportError::ZeroCapacity { queue: "tx" });
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("botlink-bridge")
            .enable_all()
            .build()?;

        Ok(TcpTransport {
            runtime,
            incoming: Arc::new(ChunkQueue::with_label(rx_capacity, "rx")),
            outgoing: None,
            tx_capacity,
            connected: Arc::new(AtomicBool::new(false)),
            peer: None,
        })
    }

    /// Returns true while the bridge connection is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Address of the connected bridge.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// The RX queue fed by the background task.
    pub fn incoming(&self) -> &BoundedOverwriteQueue<Vec<u8>> {
        &self.incoming
    }

    /// Close the connection. The background task exits once the outgoing
    /// channel is drained.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            debug!(peer = ?self.peer, "closing bridge connection");
        }
        self.connected.store(false, Ordering::Release);
    }
}

impl Transport for TcpTransport {
    fn setup(&mut self, port: &Port) -> Result<(), TransportError> {
        self.close();

        let addr = port.name().unwrap_or(DEFAULT_BRIDGE_ADDR).to_string();
        let stream = self.runtime.block_on(TcpStream::connect(&addr))?;
        stream.set_nodelay(true)?;

        let (sender, receiver) = mpsc::channel(self.tx_capacity);
        self.connected.store(true, Ordering::Release);
        self.runtime.spawn(run_bridge(
            stream,
            receiver,
            Arc::clone(&self.incoming),
            Arc::clone(&self.connected),
        ));

        info!(peer = %addr, "connected to serial bridge");
        self.outgoing = Some(sender);
        self.peer = Some(addr);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        match &self.outgoing {
            Some(sender) => self.is_connected() && sender.capacity() > 0,
            None => false,
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let sender = self.outgoing.as_ref().ok_or(TransportError::NotSetUp)?;
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        sender
            .blocking_send(data.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn recv(&self) -> Option<Vec<u8>> {
        self.incoming.dequeue()
    }

    fn clear_rx(&self) -> usize {
        self.incoming.clear()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Own one bridge connection until either side closes it.
async fn run_bridge(
    mut stream: TcpStream,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    incoming: Arc<ChunkQueue>,
    connected: Arc<AtomicBool>,
) {
    let result = pump(&mut stream, &mut outgoing, &incoming).await;
    connected.store(false, Ordering::Release);

    match result {
        Ok(()) => debug!("serial bridge connection closed"),
        Err(e) => warn!(error = %e, "serial bridge connection error"),
    }
}

async fn pump(
    stream: &mut TcpStream,
    outgoing: &mut mpsc::Receiver<Vec<u8>>,
    incoming: &ChunkQueue,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; READ_BUF_LEN];

    loop {
        tokio::select! {
            // Bridge -> RX queue
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                trace!(len = n, data = %hex::encode(&read_buf[..n]), "bridge rx");
                incoming.enqueue(read_buf[..n].to_vec());
            }

            // Outgoing channel -> bridge
            data = outgoing.recv() => {
                let Some(data) = data else {
                    return Ok(());
                };
                trace!(len = data.len(), data = %hex::encode(&data), "bridge tx");
                writer.write_all(&data).await?;
                writer.flush().await?;
            }
        }
    }
}
