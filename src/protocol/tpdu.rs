//! Transport and application PDU codec.
//!
//! A TPDU carries either application data or transport-layer control
//! information. The first byte is the NPDU length (number of APDU bytes
//! following the control byte), the second byte mixes the TPCI with the
//! high bits of the APCI:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ byte 0: length (APDU bytes after the ctrl byte)  │
//! ├──────────────────────────────────────────────────┤
//! │ byte 1: C N SSSS AA                              │
//! │   C = control flag, N = numbered                 │
//! │   SSSS = sequence number, AA = APCI bits 9:8     │
//! ├──────────────────────────────────────────────────┤
//! │ byte 2: APCI bits 7:6 | data bits (standard)     │
//! │         APCI bits 7:0             (extended)     │
//! ├──────────────────────────────────────────────────┤
//! │ byte 3+: remaining application data              │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Standard commands encode the APCI entirely in bytes 1-2 and overlay the
//! first payload byte onto the low six bits of byte 2. Extended commands
//! (UserMessage and Escape prefixes, or any APCI with non-zero low bits)
//! spend byte 2 on the APCI alone.

use crate::error::{KnxError, Result};
use crate::protocol::wire::Writer;
use heapless::Vec;

/// Maximum application data length carried by one TPDU.
pub const MAX_APDU_DATA: usize = 255;

/// APCI prefix that selects the user-message command page.
pub const PREFIX_USER_MESSAGE: u8 = 0b1011;

/// APCI prefix that selects the escape command page.
pub const PREFIX_ESCAPE: u8 = 0b1111;

// =============================================================================
// TPCI
// =============================================================================

/// Transport Layer Protocol Control Information (2-bit control command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Tpci {
    /// `T_CONNECT` - open a point-to-point connection
    Connect = 0b00,
    /// `T_DISCONNECT` - close a point-to-point connection
    Disconnect = 0b01,
    /// `T_ACK` - positive acknowledgement of a numbered PDU
    Ack = 0b10,
    /// `T_NAK` - negative acknowledgement of a numbered PDU
    Nak = 0b11,
}

impl Tpci {
    /// Convert from the 2-bit field value.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            0b00 => Self::Connect,
            0b01 => Self::Disconnect,
            0b10 => Self::Ack,
            _ => Self::Nak,
        }
    }

    /// The 2-bit field value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// APCI
// =============================================================================

/// Application Layer Protocol Control Information (10-bit command code).
///
/// Unknown codes round-trip unchanged; the codec never rejects an APCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Apci(u16);

#[rustfmt::skip]
impl Apci {
    // Standard commands
    pub const GROUP_VALUE_READ: Apci          = Apci(0b0000000000);
    pub const GROUP_VALUE_RESPONSE: Apci      = Apci(0b0001000000);
    pub const GROUP_VALUE_WRITE: Apci         = Apci(0b0010000000);
    pub const INDIVIDUAL_ADDR_WRITE: Apci     = Apci(0b0011000000);
    pub const INDIVIDUAL_ADDR_REQUEST: Apci   = Apci(0b0100000000);
    pub const INDIVIDUAL_ADDR_RESPONSE: Apci  = Apci(0b0101000000);
    pub const ADC_READ: Apci                  = Apci(0b0110000000);
    pub const ADC_RESPONSE: Apci              = Apci(0b0111000000);
    pub const MEMORY_READ: Apci               = Apci(0b1000000000);
    pub const MEMORY_RESPONSE: Apci           = Apci(0b1001000000);
    pub const MEMORY_WRITE: Apci              = Apci(0b1010000000);
    pub const MASK_VERSION_READ: Apci         = Apci(0b1100000000);
    pub const MASK_VERSION_RESPONSE: Apci     = Apci(0b1101000000);
    pub const RESTART: Apci                   = Apci(0b1110000000);

    // Extended commands
    pub const SYSTEM_NETWORK_PARAMETER_READ: Apci       = Apci(0b0111001000);
    pub const SYSTEM_NETWORK_PARAMETER_RESPONSE: Apci   = Apci(0b0111001001);
    pub const SYSTEM_NETWORK_PARAMETER_WRITE: Apci      = Apci(0b0111001010);
    pub const PROPERTY_EXT_VALUE_READ: Apci             = Apci(0b0111001100);
    pub const PROPERTY_EXT_VALUE_RESPONSE: Apci         = Apci(0b0111001101);
    pub const PROPERTY_EXT_VALUE_WRITE_CON: Apci        = Apci(0b0111001110);
    pub const PROPERTY_EXT_VALUE_WRITE_CON_RES: Apci    = Apci(0b0111001111);
    pub const PROPERTY_EXT_VALUE_WRITE_UNCON: Apci      = Apci(0b0111010000);
    pub const PROPERTY_EXT_VALUE_INFO_REPORT: Apci      = Apci(0b0111010001);
    pub const PROPERTY_EXT_DESCRIPTION_READ: Apci       = Apci(0b0111010010);
    pub const PROPERTY_EXT_DESCRIPTION_RESPONSE: Apci   = Apci(0b0111010011);
    pub const FUNCTION_PROPERTY_EXT_COMMAND: Apci       = Apci(0b0111010100);
    pub const FUNCTION_PROPERTY_EXT_STATE_READ: Apci    = Apci(0b0111010101);
    pub const FUNCTION_PROPERTY_EXT_STATE_RESPONSE: Apci = Apci(0b0111010110);
    pub const MEMORY_EXTENDED_WRITE: Apci               = Apci(0b0111111011);
    pub const MEMORY_EXTENDED_WRITE_RESPONSE: Apci      = Apci(0b0111111100);
    pub const MEMORY_EXTENDED_READ: Apci                = Apci(0b0111111101);
    pub const MEMORY_EXTENDED_READ_RESPONSE: Apci       = Apci(0b0111111110);

    // User message commands (prefix 0b1011)
    pub const USER_MEMORY_READ: Apci                = Apci(0b1011000000);
    pub const USER_MEMORY_RESPONSE: Apci            = Apci(0b1011000001);
    pub const USER_MEMORY_WRITE: Apci               = Apci(0b1011000010);
    pub const USER_MEMORY_BIT_WRITE: Apci           = Apci(0b1011000100);
    pub const USER_MANUFACTURER_INFO_READ: Apci     = Apci(0b1011000101);
    pub const USER_MANUFACTURER_INFO_RESPONSE: Apci = Apci(0b1011000110);
    pub const FUNCTION_PROPERTY_COMMAND: Apci       = Apci(0b1011000111);
    pub const FUNCTION_PROPERTY_STATE_READ: Apci    = Apci(0b1011001000);
    pub const FUNCTION_PROPERTY_STATE_RESPONSE: Apci = Apci(0b1011001001);

    // Escape commands (prefix 0b1111)
    pub const FILTER_TABLE_OPEN: Apci               = Apci(0b1111000000);
    pub const FILTER_TABLE_READ: Apci               = Apci(0b1111000001);
    pub const FILTER_TABLE_RESPONSE: Apci           = Apci(0b1111000010);
    pub const FILTER_TABLE_WRITE: Apci              = Apci(0b1111000011);
    pub const ROUTER_MEMORY_READ: Apci              = Apci(0b1111001000);
    pub const ROUTER_MEMORY_RESPONSE: Apci          = Apci(0b1111001001);
    pub const ROUTER_MEMORY_WRITE: Apci             = Apci(0b1111001010);
    pub const ROUTER_STATUS_READ: Apci              = Apci(0b1111001101);
    pub const ROUTER_STATUS_RESPONSE: Apci          = Apci(0b1111001110);
    pub const ROUTER_STATUS_WRITE: Apci             = Apci(0b1111001111);
    pub const MEMORY_BIT_WRITE: Apci                = Apci(0b1111010000);
    pub const AUTHORIZE_REQUEST: Apci               = Apci(0b1111010001);
    pub const AUTHORIZE_RESPONSE: Apci              = Apci(0b1111010010);
    pub const KEY_WRITE: Apci                       = Apci(0b1111010011);
    pub const KEY_RESPONSE: Apci                    = Apci(0b1111010100);
    pub const PROPERTY_VALUE_READ: Apci             = Apci(0b1111010101);
    pub const PROPERTY_VALUE_RESPONSE: Apci         = Apci(0b1111010110);
    pub const PROPERTY_VALUE_WRITE: Apci            = Apci(0b1111010111);
    pub const PROPERTY_DESCRIPTION_READ: Apci       = Apci(0b1111011000);
    pub const PROPERTY_DESCRIPTION_RESPONSE: Apci   = Apci(0b1111011001);
    pub const NETWORK_PARAMETER_READ: Apci          = Apci(0b1111011010);
    pub const NETWORK_PARAMETER_RESPONSE: Apci      = Apci(0b1111011011);
    pub const INDIVIDUAL_ADDRESS_SERIAL_NUMBER_READ: Apci     = Apci(0b1111011100);
    pub const INDIVIDUAL_ADDRESS_SERIAL_NUMBER_RESPONSE: Apci = Apci(0b1111011101);
    pub const INDIVIDUAL_ADDRESS_SERIAL_NUMBER_WRITE: Apci    = Apci(0b1111011110);
    pub const DOMAIN_ADDRESS_WRITE: Apci            = Apci(0b1111100000);
    pub const DOMAIN_ADDRESS_READ: Apci             = Apci(0b1111100001);
    pub const DOMAIN_ADDRESS_RESPONSE: Apci         = Apci(0b1111100010);
    pub const DOMAIN_ADDRESS_SELECTIVE_READ: Apci   = Apci(0b1111100011);
    pub const NETWORK_PARAMETER_WRITE: Apci         = Apci(0b1111100100);
    pub const LINK_READ: Apci                       = Apci(0b1111100101);
    pub const LINK_RESPONSE: Apci                   = Apci(0b1111100110);
    pub const LINK_WRITE: Apci                      = Apci(0b1111100111);
    pub const GROUP_PROP_VALUE_READ: Apci           = Apci(0b1111101000);
    pub const GROUP_PROP_VALUE_RESPONSE: Apci       = Apci(0b1111101001);
    pub const GROUP_PROP_VALUE_WRITE: Apci          = Apci(0b1111101010);
    pub const GROUP_PROP_VALUE_INFO_REPORT: Apci    = Apci(0b1111101011);
    pub const DOMAIN_ADDRESS_SERIAL_NUMBER_READ: Apci     = Apci(0b1111101100);
    pub const DOMAIN_ADDRESS_SERIAL_NUMBER_RESPONSE: Apci = Apci(0b1111101101);
    pub const DOMAIN_ADDRESS_SERIAL_NUMBER_WRITE: Apci    = Apci(0b1111101110);
    pub const FILE_STREAM_INFO_REPORT: Apci         = Apci(0b1111110000);
}

impl Apci {
    /// The raw 10-bit command code.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for the group commands (GroupValueRead/Response/Write).
    #[inline]
    pub const fn is_group_command(self) -> bool {
        (self.0 >> 6) < 3
    }

    /// True for commands encoded entirely in the first two APDU bytes.
    ///
    /// `USER_MEMORY_READ` is excluded even though its low six bits are
    /// zero: its prefix selects the user-message page, which always uses
    /// the extended encoding.
    #[inline]
    pub const fn is_standard_command(self) -> bool {
        self.0 != Self::USER_MEMORY_READ.0 && (self.0 & 0x3F) == 0 && (self.0 >> 6) < 15
    }
}

impl From<u16> for Apci {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self(raw & 0x3FF)
    }
}

impl From<Apci> for u16 {
    #[inline(always)]
    fn from(apci: Apci) -> u16 {
        apci.0
    }
}

// =============================================================================
// Transport units
// =============================================================================

/// Application data carried in a transport unit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppData {
    /// Numbered (T_DATA_CONNECTED) flag
    pub numbered: bool,
    /// Sequence number (0-15), meaningful when `numbered` is set
    pub seq_number: u8,
    /// Application command
    pub command: Apci,
    /// Application data; a standard command's first byte shares byte 2
    /// with the APCI, so only its low six bits survive a round trip
    pub data: Vec<u8, MAX_APDU_DATA>,
}

impl AppData {
    /// Create unnumbered application data.
    ///
    /// # Errors
    ///
    /// Fails when `data` exceeds [`MAX_APDU_DATA`] bytes.
    pub fn new(command: Apci, data: &[u8]) -> Result<Self> {
        Ok(Self {
            numbered: false,
            seq_number: 0,
            command,
            data: Vec::from_slice(data).map_err(|_| KnxError::capacity_exceeded())?,
        })
    }

    /// Packed size including the leading length byte.
    pub fn size(&self) -> usize {
        let cmd_length = if self.command.is_standard_command() {
            2
        } else {
            3
        };

        cmd_length + self.data.len().clamp(1, MAX_APDU_DATA)
    }

    /// Pack into a buffer, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let data_length = self.data.len().clamp(1, MAX_APDU_DATA);
        let standard = self.command.is_standard_command();
        let apci = self.command.raw();

        let mut w = Writer::new(buf);
        w.write_u8(if standard {
            data_length as u8
        } else {
            (data_length + 1) as u8
        })?;

        let mut ctrl = (apci >> 8) as u8 & 0x03;
        if self.numbered {
            ctrl |= 1 << 6 | (self.seq_number & 0x0F) << 2;
        }
        w.write_u8(ctrl)?;

        if standard {
            // The upper two bits of the first data byte belong to the APCI.
            let first = self.data.first().copied().unwrap_or(0);
            w.write_u8(((apci >> 6) as u8 & 0x03) << 6 | (first & 0x3F))?;
            if self.data.len() > 1 {
                w.write_slice(&self.data[1..])?;
            }
        } else {
            w.write_u8(apci as u8)?;
            if self.data.is_empty() {
                w.write_u8(0)?;
            } else {
                w.write_slice(&self.data)?;
            }
        }

        Ok(w.written())
    }
}

/// Transport-layer control information in a transport unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlData {
    /// Numbered flag; set for Ack/Nak, clear for Connect/Disconnect
    pub numbered: bool,
    /// Sequence number (0-15), meaningful when `numbered` is set
    pub seq_number: u8,
    /// Control command
    pub command: Tpci,
}

impl ControlData {
    /// Packed size including the leading length byte.
    pub const SIZE: usize = 2;

    /// `T_CONNECT` control unit.
    pub const fn t_connect() -> Self {
        Self {
            numbered: false,
            seq_number: 0,
            command: Tpci::Connect,
        }
    }

    /// `T_DISCONNECT` control unit.
    pub const fn t_disconnect() -> Self {
        Self {
            numbered: false,
            seq_number: 0,
            command: Tpci::Disconnect,
        }
    }

    /// `T_ACK` control unit for the given sequence number.
    pub const fn t_ack(seq_number: u8) -> Self {
        Self {
            numbered: true,
            seq_number,
            command: Tpci::Ack,
        }
    }

    /// `T_NAK` control unit for the given sequence number.
    pub const fn t_nak(seq_number: u8) -> Self {
        Self {
            numbered: true,
            seq_number,
            command: Tpci::Nak,
        }
    }

    /// Pack into a buffer, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        w.write_u8(0)?;

        let mut ctrl = 1 << 7 | self.command.to_u8();
        if self.numbered {
            ctrl |= 1 << 6 | (self.seq_number & 0x0F) << 2;
        }
        w.write_u8(ctrl)?;

        Ok(w.written())
    }
}

/// A transport unit: application data or transport-layer control.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportUnit {
    /// Application data (`T_DATA_*`)
    Data(AppData),
    /// Transport control (`T_CONNECT`, `T_DISCONNECT`, `T_ACK`, `T_NAK`)
    Control(ControlData),
}

impl TransportUnit {
    /// Packed size including the leading length byte.
    pub fn size(&self) -> usize {
        match self {
            Self::Data(app) => app.size(),
            Self::Control(_) => ControlData::SIZE,
        }
    }

    /// Pack into a buffer, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Data(app) => app.encode(buf),
            Self::Control(control) => control.encode(buf),
        }
    }

    /// Unpack a transport unit, returning it and the bytes consumed.
    ///
    /// Trailing bytes beyond the declared length are left untouched.
    ///
    /// # Errors
    ///
    /// Fails with a short-input error when the input is truncated relative
    /// to the declared length.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(KnxError::short_input());
        }

        // Control bit set: a two-byte control unit, no length to honor.
        if data[1] & (1 << 7) != 0 {
            let control = ControlData {
                numbered: data[1] & (1 << 6) != 0,
                seq_number: (data[1] >> 2) & 0x0F,
                command: Tpci::from_u8(data[1] & 0x03),
            };
            return Ok((Self::Control(control), 2));
        }

        let data_length = data[0] as usize;
        if data_length == 0 {
            return Err(KnxError::invalid_length());
        }
        if data.len() < 3 || data.len() < data_length + 2 {
            return Err(KnxError::short_input());
        }

        let numbered = data[1] & (1 << 6) != 0;
        let seq_number = (data[1] >> 2) & 0x0F;
        let prefix = (data[1] & 0x03) << 2 | data[2] >> 6;

        let app = if prefix == PREFIX_USER_MESSAGE || prefix == PREFIX_ESCAPE {
            AppData {
                numbered,
                seq_number,
                command: Apci::from((prefix as u16) << 6 | data[2] as u16),
                data: Vec::from_slice(&data[3..data_length + 2])
                    .map_err(|_| KnxError::capacity_exceeded())?,
            }
        } else {
            let mut payload: Vec<u8, MAX_APDU_DATA> =
                Vec::from_slice(&data[2..data_length + 2])
                    .map_err(|_| KnxError::capacity_exceeded())?;
            // The upper two bits of the first byte belonged to the APCI.
            payload[0] &= 0x3F;

            AppData {
                numbered,
                seq_number,
                command: Apci::from((prefix as u16) << 6),
                data: payload,
            }
        };

        Ok((Self::Data(app), data_length + 2))
    }

    /// The contained application data, if any.
    pub fn as_app_data(&self) -> Option<&AppData> {
        match self {
            Self::Data(app) => Some(app),
            Self::Control(_) => None,
        }
    }

    /// The contained control unit, if any.
    pub fn as_control(&self) -> Option<&ControlData> {
        match self {
            Self::Data(_) => None,
            Self::Control(control) => Some(control),
        }
    }
}
