//! Tunneling transport abstraction.
//!
//! The management layer runs on top of an established KNXnet/IP tunnel:
//! something able to send a cEMI message towards the bus and to hand back
//! the stream of inbound cEMI messages. The socket handling, the KNXnet/IP
//! connect handshake and the heartbeat live behind this trait, which keeps
//! the session layer testable and portable across transports.
//!
//! Implementations need interior mutability: the demux loop and the
//! sessions share one tunnel reference.

use crate::addressing::IndividualAddress;
use crate::error::Result;
use crate::protocol::cemi::Message;
use embassy_time::Duration;

pub mod mock;

/// Configuration shared by tunnel implementations.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnelConfig {
    /// How long to wait for a reply the gateway is expected to produce
    /// (connection handshake, acknowledgements).
    pub response_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(10),
        }
    }
}

/// An established KNXnet/IP tunnel.
#[allow(async_fn_in_trait)]
pub trait Tunnel {
    /// The tunnel configuration.
    fn config(&self) -> &TunnelConfig;

    /// The individual address the gateway assigned to this client.
    fn source_addr(&self) -> IndividualAddress;

    /// Send a cEMI message towards the bus.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the tunnel cannot deliver the
    /// message.
    async fn send(&self, msg: &Message) -> Result<()>;

    /// Receive the next inbound cEMI message.
    ///
    /// Blocks until a message arrives. Once the tunnel has shut down this
    /// returns a tunnel-closed error; it never blocks forever afterwards.
    async fn recv(&self) -> Result<Message>;
}
