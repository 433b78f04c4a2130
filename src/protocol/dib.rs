//! Description Information Blocks (DIB).
//!
//! KNXnet/IP servers describe themselves through a sequence of typed,
//! length-prefixed blocks in Search and Description Responses. Every block
//! shares a two-byte prefix:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Structure Length (1 byte, incl.)    │
//! │ Description Type (1 byte)           │
//! │ Payload (length - 2 bytes)          │
//! └─────────────────────────────────────┘
//! ```
//!
//! [`DescriptionBlock`] parses a heterogeneous sequence of DIBs in any
//! order and tolerates unknown types by skipping their declared length.

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::Ipv4Addr;
use crate::protocol::wire::{Reader, Writer};
use heapless::{String, Vec};

/// Maximum friendly name length in a device information DIB.
pub const FRIENDLY_NAME_MAX_LEN: usize = 30;

/// Maximum number of service families in a services DIB.
pub const MAX_SERVICE_FAMILIES: usize = 8;

/// Maximum number of addresses in a KNX addresses DIB.
pub const MAX_KNX_ADDRESSES: usize = 16;

/// Maximum number of slots in a tunnelling information DIB.
pub const MAX_TUNNELLING_SLOTS: usize = 16;

/// Maximum manufacturer-specific payload carried by a manufacturer DIB.
pub const MAX_MANUFACTURER_DATA: usize = 64;

// =============================================================================
// Type codes
// =============================================================================

/// Description type code of a DIB.
///
/// Unknown codes are carried verbatim so unsupported blocks can be skipped
/// without aborting a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptionType(pub u8);

impl DescriptionType {
    /// Device information (KNX medium, addresses, names)
    pub const DEVICE_INFO: Self = Self(0x01);
    /// Service families supported by the device
    pub const SUPPORTED_SERVICES: Self = Self(0x02);
    /// IP configuration
    pub const IP_CONFIG: Self = Self(0x03);
    /// Current IP configuration
    pub const IP_CURRENT_CONFIG: Self = Self(0x04);
    /// KNX individual addresses
    pub const KNX_ADDRESSES: Self = Self(0x05);
    /// Service families that require KNX Secure
    pub const SECURED_SERVICES: Self = Self(0x06);
    /// Tunnelling slot information
    pub const TUNNELLING_INFO: Self = Self(0x07);
    /// Extended device information
    pub const EXTENDED_DEVICE_INFO: Self = Self(0x08);
    /// Manufacturer-specific data
    pub const MANUFACTURER_DATA: Self = Self(0xFE);
}

/// KNX medium carried in a device information DIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxMedium(pub u8);

impl KnxMedium {
    /// Twisted pair 1
    pub const TP1: Self = Self(0x02);
    /// Power line 110
    pub const PL110: Self = Self(0x04);
    /// Radio frequency
    pub const RF: Self = Self(0x10);
    /// IP
    pub const IP: Self = Self(0x20);
}

/// KNXnet/IP service family identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceFamilyType(pub u8);

impl ServiceFamilyType {
    /// KNXnet/IP Core
    pub const IP_CORE: Self = Self(0x02);
    /// KNXnet/IP Device Management
    pub const IP_DEVICE_MANAGEMENT: Self = Self(0x03);
    /// KNXnet/IP Tunnelling
    pub const IP_TUNNELLING: Self = Self(0x04);
    /// KNXnet/IP Routing
    pub const IP_ROUTING: Self = Self(0x05);
    /// KNXnet/IP Remote Logging
    pub const IP_REMOTE_LOGGING: Self = Self(0x06);
    /// KNXnet/IP Remote Configuration and Diagnosis
    pub const IP_REMOTE_CONFIG: Self = Self(0x07);
    /// KNXnet/IP Object Server
    pub const IP_OBJECT_SERVER: Self = Self(0x08);
    /// KNXnet/IP Secure
    pub const IP_SECURE: Self = Self(0x09);
}

/// A service family and its supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceFamily {
    /// Family identifier
    pub family: ServiceFamilyType,
    /// Highest supported version
    pub version: u8,
}

impl ServiceFamily {
    /// Packed size.
    pub const SIZE: usize = 2;
}

// =============================================================================
// DIB structures
// =============================================================================

/// Device information DIB (type 0x01, fixed 54 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfoDib {
    /// KNX medium
    pub medium: KnxMedium,
    /// Device status; bit 0 is programming mode
    pub status: u8,
    /// Individual address of the device
    pub source: IndividualAddress,
    /// Project installation identifier
    pub project_id: u16,
    /// Serial number
    pub serial_number: [u8; 6],
    /// Routing multicast address (0.0.0.0 when routing is unsupported)
    pub routing_multicast: Ipv4Addr,
    /// MAC address
    pub hardware_addr: [u8; 6],
    /// Friendly name, NUL-padded to 30 bytes on the wire
    pub friendly_name: String<FRIENDLY_NAME_MAX_LEN>,
}

impl DeviceInfoDib {
    /// Packed size including the length and type bytes.
    pub const SIZE: usize = 54;

    /// Packed size.
    pub const fn size(&self) -> usize {
        Self::SIZE
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(Self::SIZE as u8)?;
        w.write_u8(DescriptionType::DEVICE_INFO.0)?;
        w.write_u8(self.medium.0)?;
        w.write_u8(self.status)?;
        w.write_u16(self.source.raw())?;
        w.write_u16(self.project_id)?;
        w.write_slice(&self.serial_number)?;
        w.write_slice(&self.routing_multicast.octets())?;
        w.write_slice(&self.hardware_addr)?;

        let name = self.friendly_name.as_bytes();
        w.write_slice(name)?;
        for _ in name.len()..FRIENDLY_NAME_MAX_LEN {
            w.write_u8(0)?;
        }

        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()?;
        let _ty = r.read_u8()?;
        let medium = KnxMedium(r.read_u8()?);
        let status = r.read_u8()?;
        let source = IndividualAddress::from(r.read_u16()?);
        let project_id = r.read_u16()?;
        let serial_number = r.read_array::<6>()?;
        let routing_multicast = Ipv4Addr::from(r.read_array::<4>()?);
        let hardware_addr = r.read_array::<6>()?;

        let name_bytes = r.read_slice(FRIENDLY_NAME_MAX_LEN)?;
        let name_end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRIENDLY_NAME_MAX_LEN);
        let name_str =
            core::str::from_utf8(&name_bytes[..name_end]).map_err(|_| KnxError::invalid_string())?;
        let mut friendly_name = String::new();
        friendly_name
            .push_str(name_str)
            .map_err(|_| KnxError::capacity_exceeded())?;

        if length as usize != Self::SIZE {
            return Err(KnxError::invalid_length());
        }

        Ok((
            Self {
                medium,
                status,
                source,
                project_id,
                serial_number,
                routing_multicast,
                hardware_addr,
                friendly_name,
            },
            r.consumed(),
        ))
    }
}

/// Supported service families DIB (type 0x02).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupportedServicesDib {
    /// Families the server supports
    pub families: Vec<ServiceFamily, MAX_SERVICE_FAMILIES>,
}

/// Secured service families DIB (type 0x06). Same layout as
/// [`SupportedServicesDib`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecuredServicesDib {
    /// Families that require KNX Secure
    pub families: Vec<ServiceFamily, MAX_SERVICE_FAMILIES>,
}

fn family_list_size(families: &[ServiceFamily]) -> usize {
    2 + families.len() * ServiceFamily::SIZE
}

fn encode_family_list(
    ty: DescriptionType,
    families: &[ServiceFamily],
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.write_u8(family_list_size(families) as u8)?;
    w.write_u8(ty.0)?;
    for f in families {
        w.write_u8(f.family.0)?;
        w.write_u8(f.version)?;
    }
    Ok(w.written())
}

fn decode_family_list(data: &[u8]) -> Result<(Vec<ServiceFamily, MAX_SERVICE_FAMILIES>, usize)> {
    let mut r = Reader::new(data);

    let length = r.read_u8()? as usize;
    let _ty = r.read_u8()?;

    let mut families: Vec<ServiceFamily, MAX_SERVICE_FAMILIES> = Vec::new();
    while r.consumed() < length {
        let family = ServiceFamilyType(r.read_u8()?);
        let version = r.read_u8()?;
        families
            .push(ServiceFamily { family, version })
            .map_err(|_| KnxError::capacity_exceeded())?;
    }

    if length != family_list_size(&families) {
        return Err(KnxError::invalid_length());
    }

    Ok((families, r.consumed()))
}

impl SupportedServicesDib {
    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        family_list_size(&self.families)
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_family_list(DescriptionType::SUPPORTED_SERVICES, &self.families, buf)
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (families, n) = decode_family_list(data)?;
        Ok((Self { families }, n))
    }
}

impl SecuredServicesDib {
    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        family_list_size(&self.families)
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_family_list(DescriptionType::SECURED_SERVICES, &self.families, buf)
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (families, n) = decode_family_list(data)?;
        Ok((Self { families }, n))
    }
}

/// IP configuration DIB (type 0x03, fixed 16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IpConfigDib {
    /// Configured IP address
    pub ip: Ipv4Addr,
    /// Subnet mask
    pub subnet: Ipv4Addr,
    /// Default gateway
    pub gateway: Ipv4Addr,
    /// IP capabilities bitmask
    pub capabilities: u8,
    /// Address assignment methods bitmask
    pub assignment: u8,
}

impl IpConfigDib {
    /// Packed size including the length and type bytes.
    pub const SIZE: usize = 16;

    /// Packed size.
    pub const fn size(&self) -> usize {
        Self::SIZE
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(Self::SIZE as u8)?;
        w.write_u8(DescriptionType::IP_CONFIG.0)?;
        w.write_slice(&self.ip.octets())?;
        w.write_slice(&self.subnet.octets())?;
        w.write_slice(&self.gateway.octets())?;
        w.write_u8(self.capabilities)?;
        w.write_u8(self.assignment)?;
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()?;
        let _ty = r.read_u8()?;
        let ip = Ipv4Addr::from(r.read_array::<4>()?);
        let subnet = Ipv4Addr::from(r.read_array::<4>()?);
        let gateway = Ipv4Addr::from(r.read_array::<4>()?);
        let capabilities = r.read_u8()?;
        let assignment = r.read_u8()?;

        if length as usize != Self::SIZE {
            return Err(KnxError::invalid_length());
        }

        Ok((
            Self {
                ip,
                subnet,
                gateway,
                capabilities,
                assignment,
            },
            r.consumed(),
        ))
    }
}

/// Current IP configuration DIB (type 0x04, fixed 20 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IpCurrentConfigDib {
    /// Active IP address
    pub ip: Ipv4Addr,
    /// Active subnet mask
    pub subnet: Ipv4Addr,
    /// Active default gateway
    pub gateway: Ipv4Addr,
    /// DHCP server that assigned the address
    pub dhcp_server: Ipv4Addr,
    /// Active assignment method
    pub assignment: u8,
    /// Reserved byte
    pub reserved: u8,
}

impl IpCurrentConfigDib {
    /// Packed size including the length and type bytes.
    pub const SIZE: usize = 20;

    /// Packed size.
    pub const fn size(&self) -> usize {
        Self::SIZE
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(Self::SIZE as u8)?;
        w.write_u8(DescriptionType::IP_CURRENT_CONFIG.0)?;
        w.write_slice(&self.ip.octets())?;
        w.write_slice(&self.subnet.octets())?;
        w.write_slice(&self.gateway.octets())?;
        w.write_slice(&self.dhcp_server.octets())?;
        w.write_u8(self.assignment)?;
        w.write_u8(self.reserved)?;
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()?;
        let _ty = r.read_u8()?;
        let ip = Ipv4Addr::from(r.read_array::<4>()?);
        let subnet = Ipv4Addr::from(r.read_array::<4>()?);
        let gateway = Ipv4Addr::from(r.read_array::<4>()?);
        let dhcp_server = Ipv4Addr::from(r.read_array::<4>()?);
        let assignment = r.read_u8()?;
        let reserved = r.read_u8()?;

        if length as usize != Self::SIZE {
            return Err(KnxError::invalid_length());
        }

        Ok((
            Self {
                ip,
                subnet,
                gateway,
                dhcp_server,
                assignment,
                reserved,
            },
            r.consumed(),
        ))
    }
}

/// KNX addresses DIB (type 0x05).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxAddressesDib {
    /// Individual addresses assigned to the device
    pub addresses: Vec<IndividualAddress, MAX_KNX_ADDRESSES>,
}

impl KnxAddressesDib {
    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        2 + self.addresses.len() * 2
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(self.size() as u8)?;
        w.write_u8(DescriptionType::KNX_ADDRESSES.0)?;
        for addr in &self.addresses {
            w.write_u16(addr.raw())?;
        }
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()? as usize;
        let _ty = r.read_u8()?;

        let mut addresses: Vec<IndividualAddress, MAX_KNX_ADDRESSES> = Vec::new();
        while r.consumed() < length {
            addresses
                .push(IndividualAddress::from(r.read_u16()?))
                .map_err(|_| KnxError::capacity_exceeded())?;
        }

        let dib = Self { addresses };
        if length != dib.size() {
            return Err(KnxError::invalid_length());
        }

        Ok((dib, r.consumed()))
    }
}

/// One slot of a tunnelling information DIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnellingSlot {
    /// Individual address served by this slot
    pub addr: IndividualAddress,
    /// Slot status bitmask (free / authorized / usable)
    pub status: u16,
}

impl TunnellingSlot {
    /// Packed size.
    pub const SIZE: usize = 4;
}

/// Tunnelling information DIB (type 0x07).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnellingInfoDib {
    /// Maximum APDU size supported over the tunnel
    pub apdu_size: u16,
    /// Available tunnelling slots
    pub slots: Vec<TunnellingSlot, MAX_TUNNELLING_SLOTS>,
}

impl TunnellingInfoDib {
    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        4 + self.slots.len() * TunnellingSlot::SIZE
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(self.size() as u8)?;
        w.write_u8(DescriptionType::TUNNELLING_INFO.0)?;
        w.write_u16(self.apdu_size)?;
        for slot in &self.slots {
            w.write_u16(slot.addr.raw())?;
            w.write_u16(slot.status)?;
        }
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    ///
    /// A slot with address 0 is invalid.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()? as usize;
        let _ty = r.read_u8()?;
        let apdu_size = r.read_u16()?;

        let mut slots: Vec<TunnellingSlot, MAX_TUNNELLING_SLOTS> = Vec::new();
        while r.consumed() < length {
            let addr = IndividualAddress::from(r.read_u16()?);
            let status = r.read_u16()?;
            if addr.raw() == 0 {
                return Err(KnxError::invalid_length());
            }
            slots
                .push(TunnellingSlot { addr, status })
                .map_err(|_| KnxError::capacity_exceeded())?;
        }

        let dib = Self { apdu_size, slots };
        if length != dib.size() {
            return Err(KnxError::invalid_length());
        }

        Ok((dib, r.consumed()))
    }
}

/// Extended device information DIB (type 0x08, fixed 8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtendedDeviceInfoDib {
    /// Medium status (bit 0: communication possible)
    pub medium_status: u8,
    /// Reserved byte
    pub reserved: u8,
    /// Maximum local APDU size
    pub apdu_size: u16,
    /// Device descriptor type 0 (mask version)
    pub device_descriptor: u16,
}

impl ExtendedDeviceInfoDib {
    /// Packed size including the length and type bytes.
    pub const SIZE: usize = 8;

    /// Packed size.
    pub const fn size(&self) -> usize {
        Self::SIZE
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(Self::SIZE as u8)?;
        w.write_u8(DescriptionType::EXTENDED_DEVICE_INFO.0)?;
        w.write_u8(self.medium_status)?;
        w.write_u8(self.reserved)?;
        w.write_u16(self.apdu_size)?;
        w.write_u16(self.device_descriptor)?;
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()?;
        let _ty = r.read_u8()?;
        let medium_status = r.read_u8()?;
        let reserved = r.read_u8()?;
        let apdu_size = r.read_u16()?;
        let device_descriptor = r.read_u16()?;

        if length as usize != Self::SIZE {
            return Err(KnxError::invalid_length());
        }

        Ok((
            Self {
                medium_status,
                reserved,
                apdu_size,
                device_descriptor,
            },
            r.consumed(),
        ))
    }
}

/// Manufacturer data DIB (type 0xFE).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManufacturerDataDib {
    /// KNX manufacturer identifier
    pub id: u16,
    /// Opaque manufacturer payload
    pub data: Vec<u8, MAX_MANUFACTURER_DATA>,
}

impl ManufacturerDataDib {
    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        4 + self.data.len()
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(self.size() as u8)?;
        w.write_u8(DescriptionType::MANUFACTURER_DATA.0)?;
        w.write_u16(self.id)?;
        w.write_slice(&self.data)?;
        Ok(w.written())
    }

    /// Unpack the DIB, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(data);

        let length = r.read_u8()? as usize;
        let _ty = r.read_u8()?;
        let id = r.read_u16()?;

        if length < 4 {
            return Err(KnxError::invalid_length());
        }
        let payload = r.read_slice(length - 4)?;

        let dib = Self {
            id,
            data: Vec::from_slice(payload).map_err(|_| KnxError::capacity_exceeded())?,
        };

        Ok((dib, r.consumed()))
    }
}

// =============================================================================
// Heterogeneous parsing
// =============================================================================

/// Any supported DIB, tagged by its description type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dib {
    /// Device information
    DeviceInfo(DeviceInfoDib),
    /// Supported service families
    SupportedServices(SupportedServicesDib),
    /// IP configuration
    IpConfig(IpConfigDib),
    /// Current IP configuration
    IpCurrentConfig(IpCurrentConfigDib),
    /// KNX addresses
    KnxAddresses(KnxAddressesDib),
    /// Secured service families
    SecuredServices(SecuredServicesDib),
    /// Tunnelling information
    TunnellingInfo(TunnellingInfoDib),
    /// Extended device information
    ExtendedDeviceInfo(ExtendedDeviceInfoDib),
    /// Manufacturer data
    ManufacturerData(ManufacturerDataDib),
}

impl Dib {
    /// The description type of this DIB.
    pub const fn description_type(&self) -> DescriptionType {
        match self {
            Self::DeviceInfo(_) => DescriptionType::DEVICE_INFO,
            Self::SupportedServices(_) => DescriptionType::SUPPORTED_SERVICES,
            Self::IpConfig(_) => DescriptionType::IP_CONFIG,
            Self::IpCurrentConfig(_) => DescriptionType::IP_CURRENT_CONFIG,
            Self::KnxAddresses(_) => DescriptionType::KNX_ADDRESSES,
            Self::SecuredServices(_) => DescriptionType::SECURED_SERVICES,
            Self::TunnellingInfo(_) => DescriptionType::TUNNELLING_INFO,
            Self::ExtendedDeviceInfo(_) => DescriptionType::EXTENDED_DEVICE_INFO,
            Self::ManufacturerData(_) => DescriptionType::MANUFACTURER_DATA,
        }
    }

    /// Packed size including the length and type bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::DeviceInfo(dib) => dib.size(),
            Self::SupportedServices(dib) => dib.size(),
            Self::IpConfig(dib) => dib.size(),
            Self::IpCurrentConfig(dib) => dib.size(),
            Self::KnxAddresses(dib) => dib.size(),
            Self::SecuredServices(dib) => dib.size(),
            Self::TunnellingInfo(dib) => dib.size(),
            Self::ExtendedDeviceInfo(dib) => dib.size(),
            Self::ManufacturerData(dib) => dib.size(),
        }
    }

    /// Pack the DIB, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::DeviceInfo(dib) => dib.encode(buf),
            Self::SupportedServices(dib) => dib.encode(buf),
            Self::IpConfig(dib) => dib.encode(buf),
            Self::IpCurrentConfig(dib) => dib.encode(buf),
            Self::KnxAddresses(dib) => dib.encode(buf),
            Self::SecuredServices(dib) => dib.encode(buf),
            Self::TunnellingInfo(dib) => dib.encode(buf),
            Self::ExtendedDeviceInfo(dib) => dib.encode(buf),
            Self::ManufacturerData(dib) => dib.encode(buf),
        }
    }

    /// Unpack the next DIB from `data`.
    ///
    /// Returns `None` together with the skipped byte count for unknown
    /// description types; parsing a sequence must not abort on them.
    pub fn decode(data: &[u8]) -> Result<(Option<Self>, usize)> {
        if data.len() < 2 {
            return Err(KnxError::short_input());
        }

        let length = data[0] as usize;
        let ty = DescriptionType(data[1]);

        if length < 2 {
            return Err(KnxError::invalid_length());
        }
        if data.len() < length {
            return Err(KnxError::short_input());
        }
        let body = &data[..length];

        let dib = match ty {
            DescriptionType::DEVICE_INFO => Some(Self::DeviceInfo(DeviceInfoDib::decode(body)?.0)),
            DescriptionType::SUPPORTED_SERVICES => {
                Some(Self::SupportedServices(SupportedServicesDib::decode(body)?.0))
            }
            DescriptionType::IP_CONFIG => Some(Self::IpConfig(IpConfigDib::decode(body)?.0)),
            DescriptionType::IP_CURRENT_CONFIG => {
                Some(Self::IpCurrentConfig(IpCurrentConfigDib::decode(body)?.0))
            }
            DescriptionType::KNX_ADDRESSES => {
                Some(Self::KnxAddresses(KnxAddressesDib::decode(body)?.0))
            }
            DescriptionType::SECURED_SERVICES => {
                Some(Self::SecuredServices(SecuredServicesDib::decode(body)?.0))
            }
            DescriptionType::TUNNELLING_INFO => {
                Some(Self::TunnellingInfo(TunnellingInfoDib::decode(body)?.0))
            }
            DescriptionType::EXTENDED_DEVICE_INFO => {
                Some(Self::ExtendedDeviceInfo(ExtendedDeviceInfoDib::decode(body)?.0))
            }
            DescriptionType::MANUFACTURER_DATA => {
                Some(Self::ManufacturerData(ManufacturerDataDib::decode(body)?.0))
            }
            _ => {
                crate::knx_log!(debug, "skipping unsupported DIB with code {:#x}", ty.0);
                None
            }
        };

        Ok((dib, length))
    }
}

/// The full set of DIBs a server may return in a Search or Description
/// Response.
///
/// Blocks arrive in any order and any subset; fields stay `None` for
/// absent blocks. Unknown block types are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptionBlock {
    /// Device information
    pub device_info: Option<DeviceInfoDib>,
    /// Supported service families
    pub supported_services: Option<SupportedServicesDib>,
    /// IP configuration
    pub ip_config: Option<IpConfigDib>,
    /// Current IP configuration
    pub ip_current_config: Option<IpCurrentConfigDib>,
    /// KNX addresses
    pub knx_addresses: Option<KnxAddressesDib>,
    /// Secured service families
    pub secured_services: Option<SecuredServicesDib>,
    /// Tunnelling information
    pub tunnelling_info: Option<TunnellingInfoDib>,
    /// Extended device information
    pub extended_device_info: Option<ExtendedDeviceInfoDib>,
    /// Manufacturer data
    pub manufacturer_data: Option<ManufacturerDataDib>,
}

impl DescriptionBlock {
    /// Parse a sequence of DIBs until the input is exhausted.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut block = Self::default();
        let mut offset = 0;

        while offset < data.len() {
            let (dib, consumed) = Dib::decode(&data[offset..])?;
            offset += consumed;

            match dib {
                Some(Dib::DeviceInfo(dib)) => block.device_info = Some(dib),
                Some(Dib::SupportedServices(dib)) => block.supported_services = Some(dib),
                Some(Dib::IpConfig(dib)) => block.ip_config = Some(dib),
                Some(Dib::IpCurrentConfig(dib)) => block.ip_current_config = Some(dib),
                Some(Dib::KnxAddresses(dib)) => block.knx_addresses = Some(dib),
                Some(Dib::SecuredServices(dib)) => block.secured_services = Some(dib),
                Some(Dib::TunnellingInfo(dib)) => block.tunnelling_info = Some(dib),
                Some(Dib::ExtendedDeviceInfo(dib)) => block.extended_device_info = Some(dib),
                Some(Dib::ManufacturerData(dib)) => block.manufacturer_data = Some(dib),
                None => {}
            }
        }

        Ok((block, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device_info() -> DeviceInfoDib {
        let mut friendly_name = String::new();
        friendly_name.push_str("KNX IP Router").unwrap();
        DeviceInfoDib {
            medium: KnxMedium::TP1,
            status: 0x01,
            source: IndividualAddress::from(0x1100),
            project_id: 0x0007,
            serial_number: [0x00, 0x01, 0x02, 0x03, 0x04, 0x05],
            routing_multicast: Ipv4Addr::new(224, 0, 23, 12),
            hardware_addr: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            friendly_name,
        }
    }

    fn sample_services() -> SupportedServicesDib {
        let mut families = Vec::new();
        families
            .push(ServiceFamily {
                family: ServiceFamilyType::IP_CORE,
                version: 1,
            })
            .unwrap();
        families
            .push(ServiceFamily {
                family: ServiceFamilyType::IP_TUNNELLING,
                version: 2,
            })
            .unwrap();
        SupportedServicesDib { families }
    }

    #[test]
    fn test_device_info_roundtrip() {
        let dib = sample_device_info();
        let mut buf = [0u8; 64];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 54);
        assert_eq!(buf[0], 54);
        assert_eq!(buf[1], 0x01);

        let (decoded, consumed) = DeviceInfoDib::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, 54);
        assert_eq!(decoded, dib);
    }

    #[test]
    fn test_device_info_bad_length() {
        let dib = sample_device_info();
        let mut buf = [0u8; 64];
        let n = dib.encode(&mut buf).unwrap();
        buf[0] = 53;
        assert!(DeviceInfoDib::decode(&buf[..n])
            .unwrap_err()
            .is_invalid_length());
    }

    #[test]
    fn test_supported_services_roundtrip() {
        let dib = sample_services();
        let mut buf = [0u8; 16];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf[..n], &[6, 0x02, 0x02, 1, 0x04, 2]);

        let (decoded, consumed) = SupportedServicesDib::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(decoded, dib);
    }

    #[test]
    fn test_supported_services_length_mismatch() {
        // Declared length 5 cannot hold whole families.
        let data = [5, 0x02, 0x02, 1, 0x04, 2];
        assert!(SupportedServicesDib::decode(&data).is_err());
    }

    #[test]
    fn test_ip_config_roundtrip() {
        let dib = IpConfigDib {
            ip: Ipv4Addr::new(192, 168, 1, 10),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            capabilities: 0x01,
            assignment: 0x04,
        };
        let mut buf = [0u8; 16];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 16);
        assert_eq!(IpConfigDib::decode(&buf).unwrap().0, dib);
    }

    #[test]
    fn test_ip_current_config_roundtrip() {
        let dib = IpCurrentConfigDib {
            ip: Ipv4Addr::new(10, 0, 0, 2),
            subnet: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            dhcp_server: Ipv4Addr::new(10, 0, 0, 1),
            assignment: 0x02,
            reserved: 0,
        };
        let mut buf = [0u8; 20];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 20);
        assert_eq!(IpCurrentConfigDib::decode(&buf).unwrap().0, dib);
    }

    #[test]
    fn test_knx_addresses_roundtrip() {
        let mut addresses = Vec::new();
        addresses.push(IndividualAddress::from(0x1101)).unwrap();
        addresses.push(IndividualAddress::from(0x1102)).unwrap();
        let dib = KnxAddressesDib { addresses };

        let mut buf = [0u8; 8];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[6, 0x05, 0x11, 0x01, 0x11, 0x02]);
        assert_eq!(KnxAddressesDib::decode(&buf[..n]).unwrap().0, dib);
    }

    #[test]
    fn test_tunnelling_info_roundtrip() {
        let mut slots = Vec::new();
        slots
            .push(TunnellingSlot {
                addr: IndividualAddress::from(0x1105),
                status: 0x0007,
            })
            .unwrap();
        let dib = TunnellingInfoDib {
            apdu_size: 248,
            slots,
        };

        let mut buf = [0u8; 16];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(TunnellingInfoDib::decode(&buf[..n]).unwrap().0, dib);
    }

    #[test]
    fn test_tunnelling_slot_zero_address_rejected() {
        let data = [8, 0x07, 0x00, 0xF8, 0x00, 0x00, 0x00, 0x07];
        assert!(TunnellingInfoDib::decode(&data).is_err());
    }

    #[test]
    fn test_extended_device_info_roundtrip() {
        let dib = ExtendedDeviceInfoDib {
            medium_status: 0x01,
            reserved: 0,
            apdu_size: 254,
            device_descriptor: 0x091A,
        };
        let mut buf = [0u8; 8];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(ExtendedDeviceInfoDib::decode(&buf).unwrap().0, dib);
    }

    #[test]
    fn test_manufacturer_data_roundtrip() {
        let dib = ManufacturerDataDib {
            id: 0x00C5,
            data: Vec::from_slice(&[0xDE, 0xAD]).unwrap(),
        };
        let mut buf = [0u8; 8];
        let n = dib.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[6, 0xFE, 0x00, 0xC5, 0xDE, 0xAD]);
        assert_eq!(ManufacturerDataDib::decode(&buf[..n]).unwrap().0, dib);
    }

    #[test]
    fn test_description_block_out_of_order() {
        // SupportedServices first, DeviceInfo second; both must populate.
        let mut buf = [0u8; 128];
        let n1 = sample_services().encode(&mut buf).unwrap();
        let n2 = sample_device_info().encode(&mut buf[n1..]).unwrap();

        let (block, consumed) = DescriptionBlock::decode(&buf[..n1 + n2]).unwrap();
        assert_eq!(consumed, n1 + n2);
        assert_eq!(block.supported_services, Some(sample_services()));
        assert_eq!(block.device_info, Some(sample_device_info()));
        assert_eq!(block.ip_config, None);
    }

    #[test]
    fn test_description_block_skips_unknown() {
        let mut buf = [0u8; 128];
        let n1 = sample_services().encode(&mut buf).unwrap();
        // Unknown DIB type 0x42 with 2 payload bytes.
        buf[n1..n1 + 4].copy_from_slice(&[4, 0x42, 0xAA, 0xBB]);
        let n2 = sample_device_info().encode(&mut buf[n1 + 4..]).unwrap();

        let (block, _) = DescriptionBlock::decode(&buf[..n1 + 4 + n2]).unwrap();
        assert!(block.supported_services.is_some());
        assert!(block.device_info.is_some());
    }

    #[test]
    fn test_description_block_truncated() {
        let mut buf = [0u8; 64];
        let n = sample_device_info().encode(&mut buf).unwrap();
        assert!(DescriptionBlock::decode(&buf[..n - 1])
            .unwrap_err()
            .is_short_input());
    }

    #[test]
    fn test_zero_length_dib_rejected() {
        let data = [0, 0x01, 0x00];
        assert!(Dib::decode(&data).unwrap_err().is_invalid_length());
    }
}
