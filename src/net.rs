//! Network address types.
//!
//! A minimal IPv4 address wrapper for `no_std` use. It appears in host
//! protocol address information (HPAI) and in the IP configuration DIBs
//! returned by KNXnet/IP servers.

use core::fmt;

/// IPv4 address as carried on the KNXnet/IP wire (4 octets, network order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ipv4Addr {
    octets: [u8; 4],
}

impl Ipv4Addr {
    /// The unspecified address (0.0.0.0), used for NAT-mode HPAIs.
    pub const UNSPECIFIED: Self = Self::new(0, 0, 0, 0);

    /// Create a new IPv4 address from individual octets.
    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            octets: [a, b, c, d],
        }
    }

    /// Returns the four octets that make up this address.
    #[inline]
    pub const fn octets(&self) -> [u8; 4] {
        self.octets
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        Self { octets }
    }
}

impl From<Ipv4Addr> for [u8; 4] {
    #[inline]
    fn from(addr: Ipv4Addr) -> [u8; 4] {
        addr.octets
    }
}

impl From<u32> for Ipv4Addr {
    #[inline]
    fn from(ip: u32) -> Self {
        Self {
            octets: ip.to_be_bytes(),
        }
    }
}

impl From<Ipv4Addr> for u32 {
    #[inline]
    fn from(addr: Ipv4Addr) -> u32 {
        u32::from_be_bytes(addr.octets)
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.octets[0], self.octets[1], self.octets[2], self.octets[3]
        )
    }
}

impl core::str::FromStr for Ipv4Addr {
    type Err = crate::error::KnxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut octets = [0u8; 4];

        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(crate::error::KnxError::invalid_address)?;
            *octet = part
                .parse()
                .map_err(|_| crate::error::KnxError::invalid_address())?;
        }

        if parts.next().is_some() {
            return Err(crate::error::KnxError::invalid_address());
        }

        Ok(Self { octets })
    }
}
