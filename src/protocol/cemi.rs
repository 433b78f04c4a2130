//! Common External Message Interface (cEMI) `L_Data` messages.
//!
//! This crate works with owned cEMI messages so they can flow through
//! channels between the demux loop and waiting sessions. A message is one
//! of the three link-layer data primitives wrapping an [`LData`] body:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable, skipped)      │
//! ├──────────────────────────────────────────┤
//! │ L_Data                                   │
//! │  ├─ Control Field 1 (1 byte)             │
//! │  ├─ Control Field 2 (1 byte)             │
//! │  ├─ Source Address (2 bytes)             │
//! │  ├─ Destination Address (2 bytes)        │
//! │  └─ TPDU (NPDU length + payload)         │
//! └──────────────────────────────────────────┘
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{CemiMessageCode, Priority};
use crate::protocol::tpdu::{AppData, ControlData, TransportUnit};
use crate::protocol::wire::{Reader, Writer};

/// Hop count used for point-to-point management telegrams.
const MGMT_HOP_COUNT: u8 = 6;

/// Control Field 1 of an `L_Data` frame
///
/// ```text
/// Bit 7: Frame Type (0=extended, 1=standard)
/// Bit 6: Reserved
/// Bit 5: Repeat (0=repeat, 1=do not repeat)
/// Bit 4: System Broadcast (0=system, 1=broadcast)
/// Bit 3-2: Priority
/// Bit 1: Acknowledge Request
/// Bit 0: Confirm (0=no error, 1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField1 {
    raw: u8,
}

impl ControlField1 {
    /// Create a new Control Field 1
    pub const fn new(
        standard_frame: bool,
        do_not_repeat: bool,
        broadcast: bool,
        priority: Priority,
        ack_requested: bool,
        has_error: bool,
    ) -> Self {
        let mut raw = 0u8;

        if standard_frame {
            raw |= 0x80;
        }
        if do_not_repeat {
            raw |= 0x20;
        }
        if broadcast {
            raw |= 0x10;
        }
        raw |= (priority.to_u8() & 0x03) << 2;
        if ack_requested {
            raw |= 0x02;
        }
        if has_error {
            raw |= 0x01;
        }

        Self { raw }
    }

    /// Get raw byte value
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if frame is standard (true) or extended (false)
    #[inline(always)]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Check if repeat flag is set (do not repeat if true)
    #[inline(always)]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Check if this is a plain broadcast (true) or a system broadcast
    #[inline(always)]
    pub const fn is_broadcast(self) -> bool {
        (self.raw & 0x10) != 0
    }

    /// Get priority
    #[inline(always)]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Check if confirm error flag is set
    #[inline(always)]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }
}

impl From<u8> for ControlField1 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

/// Control Field 2 of an `L_Data` frame
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField2 {
    raw: u8,
}

impl ControlField2 {
    /// Create a new Control Field 2
    pub const fn new(is_group: bool, hop_count: u8, extended_format: u8) -> Self {
        let mut raw = 0u8;

        if is_group {
            raw |= 0x80;
        }
        raw |= (hop_count & 0x07) << 4;
        raw |= extended_format & 0x0F;

        Self { raw }
    }

    /// Get raw byte value
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if destination is group address (true) or individual (false)
    #[inline(always)]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Get hop count (0-7)
    #[inline(always)]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }
}

impl From<u8> for ControlField2 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

/// Body of an `L_Data` primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LData {
    /// Control field 1
    pub control1: ControlField1,
    /// Control field 2
    pub control2: ControlField2,
    /// Source address (always individual)
    pub source: IndividualAddress,
    /// Destination address; individual or group per control field 2
    pub destination: u16,
    /// Transport unit carried in the NPDU
    pub payload: TransportUnit,
}

impl LData {
    /// Fixed bytes preceding the NPDU: two control fields and two
    /// addresses.
    const HEADER_SIZE: usize = 6;

    /// Get destination as group address (if applicable)
    #[inline]
    pub fn destination_group(&self) -> Option<GroupAddress> {
        self.control2
            .is_group_address()
            .then(|| GroupAddress::from(self.destination))
    }

    /// Get destination as individual address (if applicable)
    #[inline]
    pub fn destination_individual(&self) -> Option<IndividualAddress> {
        (!self.control2.is_group_address()).then(|| IndividualAddress::from(self.destination))
    }
}

/// A cEMI link-layer data message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    /// `L_Data.req` - request towards the bus
    LDataReq(LData),
    /// `L_Data.ind` - indication from the bus
    LDataInd(LData),
    /// `L_Data.con` - confirmation of a request
    LDataCon(LData),
}

impl Message {
    /// The cEMI message code of this primitive.
    pub const fn code(&self) -> CemiMessageCode {
        match self {
            Self::LDataReq(_) => CemiMessageCode::LDataReq,
            Self::LDataInd(_) => CemiMessageCode::LDataInd,
            Self::LDataCon(_) => CemiMessageCode::LDataCon,
        }
    }

    /// The `L_Data` body.
    pub const fn ldata(&self) -> &LData {
        match self {
            Self::LDataReq(ldata) | Self::LDataInd(ldata) | Self::LDataCon(ldata) => ldata,
        }
    }

    /// Mutable access to the `L_Data` body.
    pub fn ldata_mut(&mut self) -> &mut LData {
        match self {
            Self::LDataReq(ldata) | Self::LDataInd(ldata) | Self::LDataCon(ldata) => ldata,
        }
    }

    /// Packed size: message code, additional-info length and the body.
    pub fn size(&self) -> usize {
        2 + LData::HEADER_SIZE + self.ldata().payload.size()
    }

    /// Pack the message, returning the number of bytes written.
    ///
    /// Additional info is never emitted.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let ldata = self.ldata();

        let mut w = Writer::new(buf);
        w.write_u8(self.code().to_u8())?;
        w.write_u8(0)?; // additional info length
        w.write_u8(ldata.control1.raw())?;
        w.write_u8(ldata.control2.raw())?;
        w.write_u16(ldata.source.raw())?;
        w.write_u16(ldata.destination)?;

        let header = w.written();
        let n = ldata.payload.encode(&mut buf[header..])?;
        Ok(header + n)
    }

    /// Unpack a message, skipping any additional info.
    ///
    /// # Errors
    ///
    /// Fails on truncation or an unrecognized message code.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);

        let code = CemiMessageCode::from_u8(r.read_u8()?)
            .ok_or_else(KnxError::unknown_message_code)?;
        let additional_info = r.read_u8()? as usize;
        r.skip(additional_info)?;

        let control1 = ControlField1::from(r.read_u8()?);
        let control2 = ControlField2::from(r.read_u8()?);
        let source = IndividualAddress::from(r.read_u16()?);
        let destination = r.read_u16()?;

        let (payload, _) = TransportUnit::decode(r.read_slice(r.remaining())?)?;

        let ldata = LData {
            control1,
            control2,
            source,
            destination,
            payload,
        };

        Ok(match code {
            CemiMessageCode::LDataReq => Self::LDataReq(ldata),
            CemiMessageCode::LDataInd => Self::LDataInd(ldata),
            CemiMessageCode::LDataCon => Self::LDataCon(ldata),
        })
    }
}

// =============================================================================
// Management telegram constructors
// =============================================================================

/// Control field 1 for management data and connect/disconnect telegrams:
/// standard frame, do not repeat, no system broadcast.
const CONTROL1_MGMT: ControlField1 =
    ControlField1::new(true, true, true, Priority::System, false, false);

/// Control field 1 for acknowledgements: standard frame, no system
/// broadcast.
const CONTROL1_ACK: ControlField1 =
    ControlField1::new(true, false, true, Priority::System, false, false);

fn mgmt_ldata(
    control1: ControlField1,
    source: IndividualAddress,
    destination: IndividualAddress,
    payload: TransportUnit,
) -> LData {
    LData {
        control1,
        control2: ControlField2::new(false, MGMT_HOP_COUNT, 0),
        source,
        destination: destination.raw(),
        payload,
    }
}

impl Message {
    /// `L_Data.req` wrapping a `T_CONNECT` control unit.
    pub fn connect_req(source: IndividualAddress, destination: IndividualAddress) -> Self {
        Self::LDataReq(mgmt_ldata(
            CONTROL1_MGMT,
            source,
            destination,
            TransportUnit::Control(ControlData::t_connect()),
        ))
    }

    /// `L_Data.req` wrapping a `T_DISCONNECT` control unit.
    pub fn disconnect_req(source: IndividualAddress, destination: IndividualAddress) -> Self {
        Self::LDataReq(mgmt_ldata(
            CONTROL1_MGMT,
            source,
            destination,
            TransportUnit::Control(ControlData::t_disconnect()),
        ))
    }

    /// `L_Data.req` wrapping a `T_ACK` for the given sequence number.
    pub fn ack(
        source: IndividualAddress,
        destination: IndividualAddress,
        seq_number: u8,
    ) -> Self {
        Self::LDataReq(mgmt_ldata(
            CONTROL1_ACK,
            source,
            destination,
            TransportUnit::Control(ControlData::t_ack(seq_number)),
        ))
    }

    /// `L_Data.req` carrying application data to a device.
    ///
    /// The sequence number is stamped by the connection when the request
    /// is sent.
    pub fn data_req(
        source: IndividualAddress,
        destination: IndividualAddress,
        app: AppData,
    ) -> Self {
        Self::LDataReq(mgmt_ldata(
            CONTROL1_MGMT,
            source,
            destination,
            TransportUnit::Data(app),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tpdu::Apci;

    fn addr(raw: u16) -> IndividualAddress {
        IndividualAddress::from(raw)
    }

    #[test]
    fn test_connect_req_bytes() {
        let msg = Message::connect_req(addr(0x1101), addr(0x1105));
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            &[
                0x11, // L_Data.req
                0x00, // no additional info
                0xB0, // std frame, no repeat, no sys broadcast
                0x60, // individual destination, 6 hops
                0x11, 0x01, // source 1.1.1
                0x11, 0x05, // destination 1.1.5
                0x00, 0x80, // T_CONNECT
            ]
        );
        assert_eq!(n, msg.size());
    }

    #[test]
    fn test_ack_bytes() {
        let msg = Message::ack(addr(0x1101), addr(0x1105), 3);
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        // Control1 without the no-repeat flag, T_ACK with sequence 3.
        assert_eq!(buf[2], 0x90);
        assert_eq!(buf[n - 1], 0x80 | 0x40 | 3 << 2 | 0x02);
    }

    #[test]
    fn test_message_roundtrip_data() {
        let mut app = AppData::new(Apci::MASK_VERSION_READ, &[0x00]).unwrap();
        app.numbered = true;
        app.seq_number = 4;
        let msg = Message::data_req(addr(0x1101), addr(0x120A), app);

        let mut buf = [0u8; 64];
        let n = msg.encode(&mut buf).unwrap();
        let decoded = Message::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_skips_additional_info() {
        let data = [
            0x29, // L_Data.ind
            0x02, // two bytes of additional info
            0xAA, 0xBB, // additional info payload
            0x90, 0x60, // control fields
            0x11, 0x05, // source 1.1.5
            0x11, 0x01, // destination 1.1.1
            0x00, 0xC6, // T_ACK seq 1
        ];

        let msg = Message::decode(&data).unwrap();
        assert_eq!(msg.code(), CemiMessageCode::LDataInd);
        let control = msg.ldata().payload.as_control().unwrap();
        assert_eq!(control.seq_number, 1);
    }

    #[test]
    fn test_decode_unknown_code() {
        let data = [0xFF, 0x00, 0x90, 0x60, 0x11, 0x05, 0x11, 0x01, 0x00, 0x80];
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn test_destination_helpers() {
        let msg = Message::connect_req(addr(0x1101), addr(0x1105));
        let ldata = msg.ldata();
        assert_eq!(ldata.destination_individual(), Some(addr(0x1105)));
        assert_eq!(ldata.destination_group(), None);
    }
}
