//! cEMI protocol constants.

/// cEMI message codes for the link-layer data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CemiMessageCode {
    /// `L_Data.req` - link-layer data request (client to bus)
    LDataReq = 0x11,
    /// `L_Data.ind` - link-layer data indication (bus to client)
    LDataInd = 0x29,
    /// `L_Data.con` - link-layer data confirmation
    LDataCon = 0x2E,
}

impl CemiMessageCode {
    /// Convert a raw message code.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2E => Some(Self::LDataCon),
            _ => None,
        }
    }

    /// Raw message code value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// KNX frame priority, carried in control field 1 bits 3-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    /// System priority (highest)
    System = 0b00,
    /// Normal priority
    Normal = 0b01,
    /// Urgent priority
    Urgent = 0b10,
    /// Low priority
    Low = 0b11,
}

impl Priority {
    /// Convert from the 2-bit field value.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }

    /// The 2-bit field value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}
