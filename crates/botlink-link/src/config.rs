//! Link configuration, loadable from YAML.
//!
//! ```yaml
//! port: !named 192.168.4.1:5000
//! channel:
//!   dialects: [length_prefixed, gamepad]
//! rpc:
//!   attempts: 5
//! queues:
//!   rx: 32
//! ```

use serde::{Deserialize, Serialize};

use botlink_frame::ChannelConfig;

use crate::{Port, RpcTiming};

/// Capacities of the RX and TX buffers, in chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Received chunks held before the RX queue overflows.
    pub rx: usize,
    /// Outgoing chunks held before senders wait.
    pub tx: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig { rx: 16, tx: 16 }
    }
}

/// Everything needed to bring up a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Where to connect.
    pub port: Port,
    /// Framing of the channel.
    pub channel: ChannelConfig,
    /// Script retransmission budget.
    pub rpc: RpcTiming,
    /// Buffer capacities.
    pub queues: QueueConfig,
}

impl LinkConfig {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
