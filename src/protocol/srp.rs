//! Search Request Parameter (SRP) blocks and the extended search codec.
//!
//! An extended search request narrows which servers answer and which DIBs
//! they include. Each SRP starts with its self-inclusive length and a
//! header byte whose top bit marks the parameter as mandatory:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Structure Length (1 byte, incl.)    │
//! │ M | Parameter Type (1 byte)         │
//! │ Payload (length - 2 bytes)          │
//! └─────────────────────────────────────┘
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::dib::{DescriptionType, Dib, ServiceFamilyType};
use crate::protocol::hpai::Hpai;
use crate::protocol::wire::{Reader, Writer};
use heapless::Vec;

/// Maximum number of description types in a RequestDibs SRP (padding
/// included).
pub const MAX_REQUESTED_DIBS: usize = 16;

/// Maximum number of SRPs in one extended search request.
pub const MAX_SRPS: usize = 8;

/// Maximum number of DIBs in one extended search response.
pub const MAX_RESPONSE_DIBS: usize = 8;

/// Parameter type code of an SRP (low seven bits of the header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParameterType(pub u8);

impl ParameterType {
    /// Select only servers in programming mode
    pub const SELECT_PROG_MODE: Self = Self(0x01);
    /// Select the server with a specific MAC address
    pub const SELECT_MAC_ADDR: Self = Self(0x02);
    /// Select servers supporting a service family
    pub const SELECT_SERVICE: Self = Self(0x03);
    /// Request a specific set of DIBs in the response
    pub const REQUEST_DIBS: Self = Self(0x04);
}

/// A Search Request Parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Srp {
    /// Answer only while the server is in programming mode.
    SelectProgMode {
        /// Servers must understand this SRP when set
        mandatory: bool,
    },
    /// Answer only if the server has this MAC address.
    SelectMacAddr {
        /// Servers must understand this SRP when set
        mandatory: bool,
        /// MAC address to match
        hardware_addr: [u8; 6],
    },
    /// Answer only if the server supports this service family.
    SelectService {
        /// Servers must understand this SRP when set
        mandatory: bool,
        /// Required service family
        family: ServiceFamilyType,
        /// Minimum required version
        version: u8,
    },
    /// Ask the server to include these DIBs in its response.
    RequestDibs {
        /// Servers must understand this SRP when set
        mandatory: bool,
        /// Requested description types; padded with 0x00 to an even
        /// count on the wire
        desc_types: Vec<DescriptionType, MAX_REQUESTED_DIBS>,
    },
}

impl Srp {
    /// The parameter type of this SRP.
    pub const fn parameter_type(&self) -> ParameterType {
        match self {
            Self::SelectProgMode { .. } => ParameterType::SELECT_PROG_MODE,
            Self::SelectMacAddr { .. } => ParameterType::SELECT_MAC_ADDR,
            Self::SelectService { .. } => ParameterType::SELECT_SERVICE,
            Self::RequestDibs { .. } => ParameterType::REQUEST_DIBS,
        }
    }

    /// Whether the server must understand this SRP to answer.
    pub const fn mandatory(&self) -> bool {
        match self {
            Self::SelectProgMode { mandatory }
            | Self::SelectMacAddr { mandatory, .. }
            | Self::SelectService { mandatory, .. }
            | Self::RequestDibs { mandatory, .. } => *mandatory,
        }
    }

    /// Packed size including the length byte.
    pub fn size(&self) -> usize {
        match self {
            Self::SelectProgMode { .. } => 2,
            Self::SelectMacAddr { .. } => 8,
            Self::SelectService { .. } => 4,
            Self::RequestDibs { desc_types, .. } => {
                let mut n = desc_types.len();
                if n % 2 != 0 {
                    n += 1;
                }
                2 + n
            }
        }
    }

    fn header(&self) -> u8 {
        let mut header = self.parameter_type().0 & 0x7F;
        if self.mandatory() {
            header |= 0x80;
        }
        header
    }

    /// Pack the SRP, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(self.size() as u8)?;
        w.write_u8(self.header())?;

        match self {
            Self::SelectProgMode { .. } => {}
            Self::SelectMacAddr { hardware_addr, .. } => {
                w.write_slice(hardware_addr)?;
            }
            Self::SelectService {
                family, version, ..
            } => {
                w.write_u8(family.0)?;
                w.write_u8(*version)?;
            }
            Self::RequestDibs { desc_types, .. } => {
                for ty in desc_types {
                    w.write_u8(ty.0)?;
                }
                if desc_types.len() % 2 != 0 {
                    w.write_u8(0x00)?;
                }
            }
        }

        Ok(w.written())
    }

    /// Unpack the next SRP from `data`.
    ///
    /// Returns `None` together with the skipped byte count for unknown
    /// parameter types.
    pub fn decode(data: &[u8]) -> Result<(Option<Self>, usize)> {
        if data.len() < 2 {
            return Err(KnxError::short_input());
        }

        let length = data[0] as usize;
        let mandatory = data[1] & 0x80 != 0;
        let ty = ParameterType(data[1] & 0x7F);

        if length < 2 {
            return Err(KnxError::invalid_length());
        }
        if data.len() < length {
            return Err(KnxError::short_input());
        }

        let mut r = Reader::new(&data[..length]);
        r.skip(2)?;

        let srp = match ty {
            ParameterType::SELECT_PROG_MODE => Some(Self::SelectProgMode { mandatory }),
            ParameterType::SELECT_MAC_ADDR => Some(Self::SelectMacAddr {
                mandatory,
                hardware_addr: r.read_array::<6>()?,
            }),
            ParameterType::SELECT_SERVICE => Some(Self::SelectService {
                mandatory,
                family: ServiceFamilyType(r.read_u8()?),
                version: r.read_u8()?,
            }),
            ParameterType::REQUEST_DIBS => {
                let mut desc_types: Vec<DescriptionType, MAX_REQUESTED_DIBS> = Vec::new();
                while !r.is_empty() {
                    desc_types
                        .push(DescriptionType(r.read_u8()?))
                        .map_err(|_| KnxError::capacity_exceeded())?;
                }
                Some(Self::RequestDibs {
                    mandatory,
                    desc_types,
                })
            }
            _ => {
                crate::knx_log!(debug, "skipping unsupported SRP with type {:#x}", ty.0);
                None
            }
        };

        if let Some(srp) = &srp {
            if length != srp.size() {
                return Err(KnxError::invalid_length());
            }
        }

        Ok((srp, length))
    }
}

/// An extended search request (`SEARCH_REQUEST_EXTENDED` body).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchReqExt {
    /// Where the server should send its response
    pub control: Hpai,
    /// Search parameters; may be empty
    pub parameters: Vec<Srp, MAX_SRPS>,
}

impl SearchReqExt {
    /// Packed size of the body.
    pub fn size(&self) -> usize {
        self.control.size() + self.parameters.iter().map(Srp::size).sum::<usize>()
    }

    /// Pack the request body: the HPAI followed by the SRPs.
    ///
    /// The enclosing KNXnet/IP frame carries the total length; none is
    /// emitted here.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = self.control.encode(buf)?;
        for param in &self.parameters {
            offset += param.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }

    /// Unpack a request body prefixed with its declared outer length.
    ///
    /// The outer length counts itself and must be at least 6. Unknown
    /// SRPs are skipped.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.is_empty() {
            return Err(KnxError::short_input());
        }

        let outer_length = data[0] as usize;
        if outer_length < 6 {
            return Err(KnxError::invalid_length());
        }
        if data.len() < outer_length {
            return Err(KnxError::short_input());
        }

        let (control, hpai_len) = Hpai::decode(&data[1..])?;
        let mut offset = 1 + hpai_len;

        let mut parameters: Vec<Srp, MAX_SRPS> = Vec::new();
        while offset < outer_length {
            let (srp, consumed) = Srp::decode(&data[offset..outer_length])?;
            offset += consumed;
            if let Some(srp) = srp {
                parameters
                    .push(srp)
                    .map_err(|_| KnxError::capacity_exceeded())?;
            }
        }

        Ok((
            Self {
                control,
                parameters,
            },
            outer_length,
        ))
    }
}

/// An extended search response (`SEARCH_RESPONSE_EXTENDED` body).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchResExt {
    /// Control endpoint of the answering server
    pub control: Hpai,
    /// Description blocks, in wire order
    pub dibs: Vec<Dib, MAX_RESPONSE_DIBS>,
}

impl SearchResExt {
    /// Packed size of the body.
    pub fn size(&self) -> usize {
        self.control.size() + self.dibs.iter().map(Dib::size).sum::<usize>()
    }

    /// Pack the response body: the HPAI followed by the DIBs.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = self.control.encode(buf)?;
        for dib in &self.dibs {
            offset += dib.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }

    /// Unpack a response body, reading DIBs until the input is exhausted.
    /// Unknown DIBs are skipped.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (control, mut offset) = Hpai::decode(data)?;

        let mut dibs: Vec<Dib, MAX_RESPONSE_DIBS> = Vec::new();
        while offset < data.len() {
            let (dib, consumed) = Dib::decode(&data[offset..])?;
            offset += consumed;
            if let Some(dib) = dib {
                dibs.push(dib).map_err(|_| KnxError::capacity_exceeded())?;
            }
        }

        Ok((Self { control, dibs }, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Ipv4Addr;
    use crate::protocol::dib::{ServiceFamily, SupportedServicesDib};

    fn srp_roundtrip(srp: &Srp) {
        let mut buf = [0u8; 32];
        let n = srp.encode(&mut buf).unwrap();
        assert_eq!(n, srp.size());
        let (decoded, consumed) = Srp::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(decoded.as_ref(), Some(srp));
    }

    #[test]
    fn test_select_prog_mode() {
        let srp = Srp::SelectProgMode { mandatory: true };
        assert_eq!(srp.size(), 2);

        let mut buf = [0u8; 4];
        let n = srp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x02, 0x81]);
        srp_roundtrip(&srp);
    }

    #[test]
    fn test_select_mac_addr() {
        let srp = Srp::SelectMacAddr {
            mandatory: false,
            hardware_addr: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        };
        assert_eq!(srp.size(), 8);

        let mut buf = [0u8; 16];
        let n = srp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x08, 0x02, 1, 2, 3, 4, 5, 6]);
        srp_roundtrip(&srp);
    }

    #[test]
    fn test_select_service() {
        let srp = Srp::SelectService {
            mandatory: true,
            family: ServiceFamilyType::IP_TUNNELLING,
            version: 2,
        };
        assert_eq!(srp.size(), 4);

        let mut buf = [0u8; 8];
        let n = srp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x04, 0x83, 0x04, 0x02]);
        srp_roundtrip(&srp);
    }

    #[test]
    fn test_request_dibs_even_count() {
        let mut desc_types = Vec::new();
        desc_types.push(DescriptionType::DEVICE_INFO).unwrap();
        desc_types.push(DescriptionType::TUNNELLING_INFO).unwrap();
        let srp = Srp::RequestDibs {
            mandatory: true,
            desc_types,
        };
        assert_eq!(srp.size(), 4);
        srp_roundtrip(&srp);
    }

    #[test]
    fn test_request_dibs_odd_count_padded() {
        let mut desc_types = Vec::new();
        desc_types.push(DescriptionType::DEVICE_INFO).unwrap();
        let srp = Srp::RequestDibs {
            mandatory: false,
            desc_types,
        };
        assert_eq!(srp.size(), 4);

        let mut buf = [0u8; 8];
        let n = srp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x04, 0x04, 0x01, 0x00]);

        // The padding byte survives as an explicit 0x00 entry.
        let (decoded, _) = Srp::decode(&buf[..n]).unwrap();
        match decoded.unwrap() {
            Srp::RequestDibs { desc_types, .. } => {
                assert_eq!(desc_types.len(), 2);
                assert_eq!(desc_types[1], DescriptionType(0x00));
            }
            other => panic!("unexpected SRP: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_srp_skipped() {
        let data = [0x03, 0x7E, 0xAA];
        let (srp, consumed) = Srp::decode(&data).unwrap();
        assert!(srp.is_none());
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_srp_length_mismatch() {
        // SelectService must be 4 bytes.
        let data = [0x05, 0x03, 0x04, 0x02, 0x00];
        assert!(Srp::decode(&data).unwrap_err().is_invalid_length());
    }

    fn sample_req() -> SearchReqExt {
        let mut parameters = Vec::new();
        parameters.push(Srp::SelectProgMode { mandatory: true }).unwrap();
        parameters
            .push(Srp::SelectService {
                mandatory: false,
                family: ServiceFamilyType::IP_CORE,
                version: 1,
            })
            .unwrap();
        SearchReqExt {
            control: Hpai::udp4(Ipv4Addr::new(192, 168, 1, 29), 50100),
            parameters,
        }
    }

    #[test]
    fn test_search_req_ext_decode() {
        let req = sample_req();

        // The body is packed without the outer length; the KNXnet/IP
        // frame supplies it. Reconstruct the on-wire form for decode.
        let mut body = [0u8; 64];
        let body_len = req.encode(&mut body).unwrap();
        assert_eq!(body_len, req.size());

        let mut wire = [0u8; 64];
        wire[0] = (1 + body_len) as u8;
        wire[1..1 + body_len].copy_from_slice(&body[..body_len]);

        let (decoded, consumed) = SearchReqExt::decode(&wire[..1 + body_len]).unwrap();
        assert_eq!(consumed, 1 + body_len);
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_search_req_ext_outer_length_too_small() {
        let data = [0x05, 0x08, 0x01, 0, 0, 0, 0];
        assert!(SearchReqExt::decode(&data).unwrap_err().is_invalid_length());
    }

    #[test]
    fn test_search_res_ext_roundtrip() {
        let mut families = Vec::new();
        families
            .push(ServiceFamily {
                family: ServiceFamilyType::IP_CORE,
                version: 1,
            })
            .unwrap();

        let mut dibs: Vec<Dib, MAX_RESPONSE_DIBS> = Vec::new();
        dibs.push(Dib::SupportedServices(SupportedServicesDib { families }))
            .unwrap();

        let res = SearchResExt {
            control: Hpai::udp4(Ipv4Addr::new(192, 168, 1, 250), 3671),
            dibs,
        };

        let mut buf = [0u8; 64];
        let n = res.encode(&mut buf).unwrap();
        assert_eq!(n, res.size());

        let (decoded, consumed) = SearchResExt::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(decoded, res);
    }
}
