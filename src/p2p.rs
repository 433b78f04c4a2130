//! Point-to-point device connections.
//!
//! A [`P2pConnection`] is a numbered, acknowledged transport session to a
//! single bus device, established with `T_CONNECT` over the tunnel. Sends
//! stamp a 4-bit sequence number, wait for the device's `T_ACK`, then wait
//! for the expected application response and acknowledge it in turn.
//!
//! Connections live in fixed slots owned by
//! [`Management`](crate::management::Management); the registry's demux
//! loop feeds each session's bounded inbound queue. All session state is
//! interior-mutable, so callers, the demux loop and concurrent senders
//! share plain references.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Instant, Timer};

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::Message;
use crate::protocol::tpdu::{Apci, AppData, Tpci, TransportUnit};
use crate::tunnel::Tunnel;

/// Capacity of a session's inbound queue. Overflow drops messages.
pub const INBOUND_QUEUE_DEPTH: usize = 10;

/// Default outbound rate limit in messages per second.
pub const DEFAULT_RATE_LIMIT: u32 = 20;

/// Lifecycle phase of a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Phase {
    /// Slot is free
    Idle,
    /// `T_CONNECT` sent, waiting for the confirmation
    Connecting,
    /// Established
    Connected,
    /// `T_DISCONNECT` on its way out
    Disconnecting,
    /// Torn down; the slot is reclaimed on the next registry access
    Closed,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum CloseReason {
    /// Local disconnect or registry shutdown
    Local,
    /// The device sent `T_DISCONNECT`
    Peer,
    /// The underlying tunnel shut down
    Tunnel,
}

struct SessionState {
    phase: Phase,
    target: IndividualAddress,
    /// Next-to-use is `(seq_number + 1) % 16`; starts at 15 so the first
    /// send uses 0.
    seq_number: u8,
    rate_limit: u32,
    last_send: Option<Instant>,
    close_reason: CloseReason,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            target: IndividualAddress::from(0),
            seq_number: 15,
            rate_limit: DEFAULT_RATE_LIMIT,
            last_send: None,
            close_reason: CloseReason::Local,
        }
    }
}

/// A point-to-point connection to one bus device.
pub struct P2pConnection<'t, T: Tunnel> {
    tunnel: &'t T,
    state: BlockingMutex<CriticalSectionRawMutex, RefCell<SessionState>>,
    inbound: Channel<CriticalSectionRawMutex, Message, INBOUND_QUEUE_DEPTH>,
    done: Signal<CriticalSectionRawMutex, ()>,
    /// Serializes whole send transactions on this session.
    op: Mutex<CriticalSectionRawMutex, ()>,
}

impl<'t, T: Tunnel> core::fmt::Debug for P2pConnection<'t, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("P2pConnection").finish_non_exhaustive()
    }
}

impl<'t, T: Tunnel> P2pConnection<'t, T> {
    pub(crate) fn new(tunnel: &'t T) -> Self {
        Self {
            tunnel,
            state: BlockingMutex::new(RefCell::new(SessionState::idle())),
            inbound: Channel::new(),
            done: Signal::new(),
            op: Mutex::new(()),
        }
    }

    /// Individual address of the target device.
    pub fn target_addr(&self) -> IndividualAddress {
        self.state.lock(|s| s.borrow().target)
    }

    /// Whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.state.lock(|s| s.borrow().phase == Phase::Connected)
    }

    /// Change the outbound rate limit (messages per second).
    pub fn set_rate_limit(&self, msgs_per_second: u32) {
        self.state
            .lock(|s| s.borrow_mut().rate_limit = msgs_per_second.max(1));
    }

    /// Build an `L_Data.req` towards this connection's device.
    ///
    /// [`send`](Self::send) stamps the sequence number.
    pub fn data_req(&self, app: AppData) -> Message {
        Message::data_req(self.tunnel.source_addr(), self.target_addr(), app)
    }

    /// Send a request and wait for the device's response.
    ///
    /// The request must be an `L_Data.req` wrapping application data. The
    /// send is acknowledged by the device within the tunnel's response
    /// timeout; the response matching `expected` must arrive within
    /// `timeout` and is acknowledged back to the device.
    ///
    /// # Errors
    ///
    /// - not connected: the session is not established
    /// - unexpected payload: the request does not wrap application data
    /// - ack mismatch: the device acknowledged the wrong sequence number;
    ///   the session stays usable
    /// - response timeout: no ACK or no matching response in time
    /// - connection closed / tunnel closed: the session ended while
    ///   waiting
    pub async fn send(
        &self,
        mut req: Message,
        expected: Apci,
        timeout: Duration,
    ) -> Result<Message> {
        let _op = self.op.lock().await;

        if !self.is_connected() {
            return Err(KnxError::not_connected());
        }

        let seq = self.next_seq_number();
        set_seq(&mut req, seq)?;

        self.apply_rate_limit().await;
        self.tunnel.send(&req).await?;

        self.await_ack(seq).await?;

        let res = self.await_response(expected, timeout).await?;

        // Acknowledge the response with the device's sequence number.
        self.apply_rate_limit().await;
        let ldata = res.ldata();
        if let Some(app) = ldata.payload.as_app_data() {
            let ack = Message::ack(self.tunnel.source_addr(), ldata.source, app.seq_number);
            self.tunnel.send(&ack).await?;
        }

        Ok(res)
    }

    /// Receive the next message delivered to this session.
    ///
    /// # Errors
    ///
    /// Fails once the session is closed.
    pub async fn recv(&self) -> Result<Message> {
        self.next_inbound().await
    }

    /// Close the connection.
    ///
    /// Sends `T_DISCONNECT` and marks the session closed regardless of
    /// the send outcome. Blocked operations observe the closure and fail.
    /// Closing an already closed connection is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let proceed = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.phase != Phase::Connected {
                return false;
            }
            s.phase = Phase::Disconnecting;
            true
        });
        if !proceed {
            return Ok(());
        }

        self.apply_rate_limit().await;

        let req = Message::disconnect_req(self.tunnel.source_addr(), self.target_addr());
        let sent = self.tunnel.send(&req).await;

        // Closed regardless of whether the T_DISCONNECT went out.
        self.mark_closed(CloseReason::Local);

        sent
    }

    // =========================================================================
    // Registry hooks
    // =========================================================================

    pub(crate) fn is_idle(&self) -> bool {
        self.state.lock(|s| s.borrow().phase == Phase::Idle)
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock(|s| s.borrow().phase)
    }

    pub(crate) fn target_raw(&self) -> u16 {
        self.state.lock(|s| s.borrow().target.raw())
    }

    /// Claim a free slot for a new connection attempt.
    pub(crate) fn try_claim(&self, target: IndividualAddress) -> bool {
        let claimed = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.phase != Phase::Idle {
                return false;
            }
            *s = SessionState::idle();
            s.phase = Phase::Connecting;
            s.target = target;
            true
        });

        if claimed {
            self.drain_inbound();
            self.done.reset();
        }
        claimed
    }

    /// Return the slot to the free pool.
    pub(crate) fn release(&self) {
        self.state.lock(|s| *s.borrow_mut() = SessionState::idle());
        self.drain_inbound();
    }

    /// Connection handshake: send `T_CONNECT` and wait for the
    /// `L_Data.con` carrying the connect confirmation. Everything else
    /// arriving during the handshake is discarded.
    pub(crate) async fn open(&self) -> Result<()> {
        let req = Message::connect_req(self.tunnel.source_addr(), self.target_addr());
        self.tunnel.send(&req).await?;

        let handshake = async {
            loop {
                let msg = self.next_inbound().await?;
                let Message::LDataCon(ldata) = &msg else {
                    continue;
                };
                let Some(control) = ldata.payload.as_control() else {
                    continue;
                };
                if control.command == Tpci::Connect {
                    return Ok(());
                }
            }
        };

        match with_timeout(self.tunnel.config().response_timeout, handshake).await {
            Ok(res) => res?,
            Err(_) => return Err(KnxError::response_timeout()),
        }

        self.state.lock(|s| s.borrow_mut().phase = Phase::Connected);
        Ok(())
    }

    /// Fan in one inbound message from the demux loop.
    ///
    /// Peer-initiated disconnects tear the session down here; everything
    /// else goes to the inbound queue, dropped when the queue is full.
    pub(crate) fn deliver(&self, msg: Message) {
        if self.handle_disconnect(&msg) {
            return;
        }

        if self.inbound.try_send(msg).is_err() {
            crate::knx_log!(
                warn,
                "p2p inbound queue for device {} is full, discarding message",
                self.target_raw()
            );
        }
    }

    /// Tunnel shutdown: terminally close a non-idle session.
    pub(crate) fn mark_tunnel_closed(&self) {
        if !self.is_idle() {
            self.mark_closed(CloseReason::Tunnel);
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Peer-initiated teardown. The session is closed directly from the
    /// demux path; no `T_DISCONNECT` is sent back.
    fn handle_disconnect(&self, msg: &Message) -> bool {
        let Message::LDataInd(ldata) = msg else {
            return false;
        };

        if ldata.source != self.tunnel.source_addr() || ldata.destination != self.target_raw() {
            return false;
        }

        let Some(control) = ldata.payload.as_control() else {
            return false;
        };
        if control.command != Tpci::Disconnect {
            return false;
        }

        if self.phase() == Phase::Connected {
            self.mark_closed(CloseReason::Peer);
        }
        true
    }

    fn mark_closed(&self, reason: CloseReason) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.phase != Phase::Closed {
                s.phase = Phase::Closed;
                s.close_reason = reason;
            }
        });
        self.done.signal(());
    }

    fn closed_error(&self) -> KnxError {
        let reason = self.state.lock(|s| s.borrow().close_reason);
        match reason {
            CloseReason::Tunnel => KnxError::tunnel_closed(),
            CloseReason::Local | CloseReason::Peer => KnxError::connection_closed(),
        }
    }

    /// Next message from the session queue, or an error once `done` is
    /// signaled.
    async fn next_inbound(&self) -> Result<Message> {
        if self.phase() == Phase::Closed {
            return Err(self.closed_error());
        }

        match select(self.done.wait(), self.inbound.receive()).await {
            Either::First(()) => {
                // Keep the signal latched for other blocked operations.
                self.done.signal(());
                Err(self.closed_error())
            }
            Either::Second(msg) => Ok(msg),
        }
    }

    fn next_seq_number(&self) -> u8 {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.seq_number = (s.seq_number + 1) % 16;
            s.seq_number
        })
    }

    /// Wait for the device's `T_ACK` carrying `seq`. Anything else in the
    /// queue is discarded during this phase.
    async fn await_ack(&self, seq: u8) -> Result<()> {
        let wait = async {
            loop {
                let msg = self.next_inbound().await?;
                let Message::LDataInd(ldata) = &msg else {
                    continue;
                };
                let Some(control) = ldata.payload.as_control() else {
                    continue;
                };
                if control.command != Tpci::Ack {
                    continue;
                }

                if control.seq_number != seq {
                    return Err(KnxError::ack_mismatch());
                }
                return Ok(());
            }
        };

        match with_timeout(self.tunnel.config().response_timeout, wait).await {
            Ok(res) => res,
            Err(_) => Err(KnxError::response_timeout()),
        }
    }

    /// Wait for an `L_Data.ind` wrapping application data with the
    /// expected command. Anything else is discarded during this phase.
    async fn await_response(&self, expected: Apci, timeout: Duration) -> Result<Message> {
        let wait = async {
            loop {
                let msg = self.next_inbound().await?;
                let Message::LDataInd(ldata) = &msg else {
                    continue;
                };
                let Some(app) = ldata.payload.as_app_data() else {
                    continue;
                };
                if app.command != expected {
                    continue;
                }
                return Ok(msg);
            }
        };

        match with_timeout(timeout, wait).await {
            Ok(res) => res,
            Err(_) => Err(KnxError::response_timeout()),
        }
    }

    /// Enforce the minimum interval between outbound frames. The state
    /// mutex is released while sleeping.
    async fn apply_rate_limit(&self) {
        let wait = self.state.lock(|s| {
            let s = s.borrow();
            let interval = Duration::from_micros(1_000_000 / u64::from(s.rate_limit.max(1)));
            s.last_send.and_then(|last| {
                let elapsed = Instant::now() - last;
                (elapsed < interval).then(|| interval - elapsed)
            })
        });

        if let Some(wait) = wait {
            Timer::after(wait).await;
        }

        self.state
            .lock(|s| s.borrow_mut().last_send = Some(Instant::now()));
    }

    fn drain_inbound(&self) {
        while self.inbound.try_receive().is_ok() {}
    }
}

/// Stamp the request's application data as numbered with `seq`.
fn set_seq(req: &mut Message, seq: u8) -> Result<()> {
    let Message::LDataReq(ldata) = req else {
        return Err(KnxError::unexpected_payload());
    };
    let TransportUnit::Data(app) = &mut ldata.payload else {
        return Err(KnxError::unexpected_payload());
    };

    app.numbered = true;
    app.seq_number = seq;
    Ok(())
}
