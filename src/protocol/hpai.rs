//! Host Protocol Address Information (HPAI).
//!
//! An HPAI tells a KNXnet/IP server where to send its replies. It prefixes
//! the search request/response bodies handled by this crate.

use crate::error::{KnxError, Result};
use crate::net::Ipv4Addr;
use crate::protocol::wire::{Reader, Writer};

/// Host protocol code for IPv4 UDP.
pub const PROTO_UDP4: u8 = 0x01;

/// Host protocol code for IPv4 TCP.
pub const PROTO_TCP4: u8 = 0x02;

/// Host Protocol Address Information
///
/// ```text
/// ┌────────────────────────────────────────────┐
/// │ Structure Length (1 byte, always 8)        │
/// │ Host Protocol Code (1 byte)                │
/// │ IPv4 Address (4 bytes)                     │
/// │ Port (2 bytes)                             │
/// └────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hpai {
    /// Host protocol code (`PROTO_UDP4` or `PROTO_TCP4`)
    pub protocol: u8,
    /// IPv4 address; unspecified for NAT traversal
    pub address: Ipv4Addr,
    /// UDP/TCP port
    pub port: u16,
}

impl Hpai {
    /// Packed size of an IPv4 HPAI.
    pub const SIZE: usize = 8;

    /// Create an IPv4 UDP HPAI.
    pub const fn udp4(address: Ipv4Addr, port: u16) -> Self {
        Self {
            protocol: PROTO_UDP4,
            address,
            port,
        }
    }

    /// An HPAI requesting NAT-traversal routing (unspecified endpoint).
    pub const fn nat() -> Self {
        Self::udp4(Ipv4Addr::UNSPECIFIED, 0)
    }

    /// Packed size including the length byte.
    pub const fn size(&self) -> usize {
        Self::SIZE
    }

    /// Pack the HPAI, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(Self::SIZE as u8)?;
        w.write_u8(self.protocol)?;
        w.write_slice(&self.address.octets())?;
        w.write_u16(self.port)?;
        Ok(w.written())
    }

    /// Unpack an HPAI, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()?;
        if length as usize != Self::SIZE {
            return Err(KnxError::invalid_length());
        }

        let protocol = r.read_u8()?;
        let address = Ipv4Addr::from(r.read_array::<4>()?);
        let port = r.read_u16()?;

        Ok((
            Self {
                protocol,
                address,
                port,
            },
            r.consumed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let hpai = Hpai::udp4(Ipv4Addr::new(192, 168, 1, 29), 3671);
        let mut buf = [0u8; 8];
        let n = hpai.encode(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf, [0x08, 0x01, 192, 168, 1, 29, 0x0E, 0x57]);

        let (decoded, consumed) = Hpai::decode(&buf).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, hpai);
    }

    #[test]
    fn test_bad_length() {
        let data = [0x07, 0x01, 192, 168, 1, 29, 0x0E, 0x57];
        assert!(Hpai::decode(&data).unwrap_err().is_invalid_length());
    }

    #[test]
    fn test_truncated() {
        let data = [0x08, 0x01, 192];
        assert!(Hpai::decode(&data).unwrap_err().is_short_input());
    }
}
