#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

//! # knx-mgmt
//!
//! Connection-oriented KNXnet/IP device management.
//!
//! This crate provides the transport-layer codec and the point-to-point
//! session machinery of a KNXnet/IP client, designed for the Embassy async
//! runtime but usable on any executor:
//!
//! - Transport/application PDU codec (`AppData`, `ControlData`, APCI)
//! - Point-to-point device connections with numbered, acknowledged sends
//! - A [`management::Management`] registry multiplexing sessions over one
//!   tunnel
//! - Search/Description Response DIB and SRP codecs for server discovery
//!
//! The tunneling transport itself is abstracted behind [`tunnel::Tunnel`];
//! implementations wrap a UDP socket and the KNXnet/IP connect handshake.
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_mgmt::management::Management;
//! use knx_mgmt::protocol::tpdu::Apci;
//! use embassy_time::Duration;
//!
//! let mgmt = Management::new(&tunnel);
//! // mgmt.run() must be driven concurrently, like embassy-net's Stack::run.
//! let conn = mgmt.connect("1.1.5".parse()?).await?;
//! let res = conn
//!     .send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(6))
//!     .await?;
//! ```

pub mod addressing;
pub mod error;
pub mod management;
pub mod net;
pub mod p2p;
pub mod protocol;
pub mod tunnel;

// Macro modules (must be declared before use)
#[macro_use]
pub mod logging;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{GroupAddress, IndividualAddress};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use management::Management;
#[doc(inline)]
pub use p2p::P2pConnection;
#[doc(inline)]
pub use protocol::cemi::Message;
#[doc(inline)]
pub use tunnel::{Tunnel, TunnelConfig};
