//! Mock tunnel for testing.
//!
//! An in-memory [`Tunnel`] implementation that records outbound messages
//! and replays pre-programmed inbound messages, so the session state
//! machine can be exercised without network or hardware.
//!
//! ## Example
//!
//! ```rust,ignore
//! let tunnel = MockTunnel::new(IndividualAddress::from(0x1101));
//!
//! // Script the gateway side.
//! tunnel.push_inbound(Message::LDataCon(con_body));
//!
//! // Run the code under test, then inspect what it sent.
//! assert_eq!(tunnel.sent_count(), 1);
//! ```

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::Message;
use crate::tunnel::{Tunnel, TunnelConfig};

/// Depth of the scripted inbound queue.
pub const MOCK_INBOUND_DEPTH: usize = 32;

/// Maximum number of recorded outbound messages.
pub const MOCK_SENT_CAPACITY: usize = 32;

/// In-memory tunnel double.
pub struct MockTunnel {
    config: TunnelConfig,
    source: IndividualAddress,
    inbound: Channel<CriticalSectionRawMutex, Message, MOCK_INBOUND_DEPTH>,
    sent: BlockingMutex<CriticalSectionRawMutex, RefCell<Vec<Message, MOCK_SENT_CAPACITY>>>,
    closed: Signal<CriticalSectionRawMutex, ()>,
}

impl MockTunnel {
    /// Create a mock tunnel with the given local source address.
    pub fn new(source: IndividualAddress) -> Self {
        Self {
            config: TunnelConfig::default(),
            source,
            inbound: Channel::new(),
            sent: BlockingMutex::new(RefCell::new(Vec::new())),
            closed: Signal::new(),
        }
    }

    /// Override the response timeout, e.g. to keep timeout tests fast.
    pub fn with_response_timeout(mut self, timeout: embassy_time::Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Queue a message the tunnel will deliver via [`Tunnel::recv`].
    ///
    /// # Panics
    ///
    /// Panics when the scripted queue is full.
    pub fn push_inbound(&self, msg: Message) {
        self.inbound
            .try_send(msg)
            .expect("mock inbound queue is full");
    }

    /// Simulate the tunnel shutting down. Queued inbound messages are
    /// still delivered before [`Tunnel::recv`] starts failing.
    pub fn close(&self) {
        self.closed.signal(());
    }

    /// Number of messages sent through the tunnel so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock(|sent| sent.borrow().len())
    }

    /// Copy of the `idx`-th sent message.
    pub fn sent(&self, idx: usize) -> Option<Message> {
        self.sent.lock(|sent| sent.borrow().get(idx).cloned())
    }

    /// Copy of the most recently sent message.
    pub fn last_sent(&self) -> Option<Message> {
        self.sent.lock(|sent| sent.borrow().last().cloned())
    }
}

impl Tunnel for MockTunnel {
    fn config(&self) -> &TunnelConfig {
        &self.config
    }

    fn source_addr(&self) -> IndividualAddress {
        self.source
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        if self.closed.signaled() {
            return Err(KnxError::tunnel_closed());
        }
        self.sent.lock(|sent| {
            sent.borrow_mut()
                .push(msg.clone())
                .map_err(|_| KnxError::send_failed())
        })
    }

    async fn recv(&self) -> Result<Message> {
        loop {
            // Drain scripted messages before reporting closure.
            if let Ok(msg) = self.inbound.try_receive() {
                return Ok(msg);
            }
            if self.closed.signaled() {
                return Err(KnxError::tunnel_closed());
            }

            match select(self.closed.wait(), self.inbound.receive()).await {
                Either::First(()) => {
                    // Keep the closed signal latched for other waiters.
                    self.closed.signal(());
                }
                Either::Second(msg) => return Ok(msg),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cemi::Message;

    fn addr(raw: u16) -> IndividualAddress {
        IndividualAddress::from(raw)
    }

    #[tokio::test]
    async fn test_send_is_recorded() {
        let tunnel = MockTunnel::new(addr(0x1101));
        let msg = Message::connect_req(addr(0x1101), addr(0x1105));

        tunnel.send(&msg).await.unwrap();
        assert_eq!(tunnel.sent_count(), 1);
        assert_eq!(tunnel.sent(0), Some(msg));
    }

    #[tokio::test]
    async fn test_recv_fifo_then_closed() {
        let tunnel = MockTunnel::new(addr(0x1101));
        let a = Message::connect_req(addr(0x1101), addr(0x1105));
        let b = Message::disconnect_req(addr(0x1101), addr(0x1105));

        tunnel.push_inbound(a.clone());
        tunnel.push_inbound(b.clone());
        tunnel.close();

        assert_eq!(tunnel.recv().await.unwrap(), a);
        assert_eq!(tunnel.recv().await.unwrap(), b);
        assert!(tunnel.recv().await.unwrap_err().is_tunnel_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let tunnel = MockTunnel::new(addr(0x1101));
        tunnel.close();
        let msg = Message::connect_req(addr(0x1101), addr(0x1105));
        assert!(tunnel.send(&msg).await.unwrap_err().is_tunnel_closed());
    }
}
