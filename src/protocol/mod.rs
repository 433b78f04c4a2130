//! KNX protocol codecs.
//!
//! Everything that turns protocol structures into bytes and back: the
//! transport/application PDU codec, the owned cEMI message model, and the
//! discovery structures (DIBs, SRPs, HPAI).

pub mod cemi;
pub mod constants;
pub mod dib;
pub mod hpai;
pub mod srp;
pub mod tpdu;
pub mod wire;

pub use cemi::*;
pub use constants::*;
pub use dib::*;
pub use hpai::*;
pub use srp::*;
pub use tpdu::*;
