//! Point-to-point connection registry.
//!
//! [`Management`] multiplexes [`P2pConnection`] sessions over one tunnel,
//! keyed by the target device's individual address. Its [`run`] future is
//! the single tunnel reader: it fans inbound messages out to the per-
//! session queues in receive order, the way `embassy-net` drives its
//! network stack with `Stack::run()`. Drive it concurrently with your
//! application logic:
//!
//! ```rust,ignore
//! let mgmt = Management::new(&tunnel);
//! join(mgmt.run(), async {
//!     let conn = mgmt.connect(device_addr).await?;
//!     // ...
//!     mgmt.close().await;
//! })
//! .await;
//! ```
//!
//! [`run`]: Management::run

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::p2p::{P2pConnection, Phase};
use crate::protocol::cemi::Message;
use crate::tunnel::Tunnel;

/// Number of connection slots in the registry.
pub const MAX_CONNECTIONS: usize = 4;

/// Registry of point-to-point connections over one tunnel.
///
/// Sessions are owned by the registry; callers hold references into it.
/// A reference to a closed session stays valid but all its operations
/// fail, and the slot is reclaimed on the next registry access.
pub struct Management<'t, T: Tunnel> {
    tunnel: &'t T,
    slots: [P2pConnection<'t, T>; MAX_CONNECTIONS],
    done: Signal<CriticalSectionRawMutex, ()>,
}

impl<'t, T: Tunnel> Management<'t, T> {
    /// Create a registry over the given tunnel.
    pub fn new(tunnel: &'t T) -> Self {
        Self {
            tunnel,
            slots: core::array::from_fn(|_| P2pConnection::new(tunnel)),
            done: Signal::new(),
        }
    }

    /// Establish (or return the existing) connection to a device.
    ///
    /// A live session for `addr` is returned as-is. A session closed in
    /// the meantime is evicted and replaced by a fresh connection
    /// attempt.
    ///
    /// # Errors
    ///
    /// - already connected: a connection attempt for `addr` is still in
    ///   flight elsewhere
    /// - pool exhausted: all [`MAX_CONNECTIONS`] slots are occupied
    /// - response timeout / tunnel closed: the handshake failed
    pub async fn connect(&self, addr: IndividualAddress) -> Result<&P2pConnection<'t, T>> {
        if let Some(slot) = self.lookup(addr) {
            match slot.phase() {
                Phase::Connected => return Ok(slot),
                Phase::Closed => slot.release(),
                // Another caller is mid-handshake or mid-teardown.
                _ => return Err(KnxError::already_connected()),
            }
        }

        let slot = self
            .slots
            .iter()
            .find(|slot| slot.try_claim(addr))
            .ok_or_else(KnxError::pool_exhausted)?;

        match slot.open().await {
            Ok(()) => Ok(slot),
            Err(err) => {
                slot.release();
                Err(err)
            }
        }
    }

    /// Close the connection to a device and drop it from the registry.
    ///
    /// # Errors
    ///
    /// Fails with not found when no session for `addr` exists.
    pub async fn disconnect(&self, addr: IndividualAddress) -> Result<()> {
        let slot = self
            .lookup(addr)
            .ok_or_else(KnxError::connection_not_found)?;

        let res = slot.disconnect().await;
        slot.release();
        res
    }

    /// The current session for a device, if one exists.
    pub fn get(&self, addr: IndividualAddress) -> Option<&P2pConnection<'t, T>> {
        self.lookup(addr)
    }

    /// Shut the registry down: stop the demux loop and close every
    /// session.
    pub async fn close(&self) {
        self.done.signal(());

        for slot in &self.slots {
            if !slot.is_idle() {
                let _ = slot.disconnect().await;
            }
        }
    }

    /// Inbound demux loop.
    ///
    /// Reads the tunnel until [`close`](Self::close) is called or the
    /// tunnel shuts down, routing each message to the session it belongs
    /// to. Must be running for handshakes, acknowledgements and responses
    /// to make progress.
    ///
    /// # Errors
    ///
    /// Returns the tunnel error after marking every session closed.
    pub async fn run(&self) -> Result<()> {
        loop {
            match select(self.done.wait(), self.tunnel.recv()).await {
                Either::First(()) => {
                    // Stay latched for any concurrent waiter.
                    self.done.signal(());
                    return Ok(());
                }
                Either::Second(Ok(msg)) => self.dispatch(msg),
                Either::Second(Err(err)) => {
                    for slot in &self.slots {
                        slot.mark_tunnel_closed();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Route one inbound message to the session whose target matches the
    /// message's peer address. Unroutable messages are dropped.
    fn dispatch(&self, msg: Message) {
        let ldata = msg.ldata();
        let slot = self.slots.iter().find(|slot| {
            !slot.is_idle()
                && (slot.target_raw() == ldata.destination
                    || slot.target_raw() == ldata.source.raw())
        });

        match slot {
            Some(slot) => slot.deliver(msg),
            None => {
                crate::knx_log!(debug, "no p2p session for inbound message, dropping");
            }
        }
    }

    fn lookup(&self, addr: IndividualAddress) -> Option<&P2pConnection<'t, T>> {
        self.slots
            .iter()
            .find(|slot| !slot.is_idle() && slot.target_raw() == addr.raw())
    }
}
