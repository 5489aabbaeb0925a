//! GS-USB host frame implementation
//!
//! This module provides the `CanFrame` struct, the fixed-size classic CAN frame
//! exchanged with the host over the bulk endpoints.

use embedded_can::{ExtendedId, Id, StandardId};

use crate::constants::{
    CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_MAX_DLC, CAN_MAX_DLEN, CAN_RTR_FLAG,
    CAN_SFF_MASK, GS_USB_FRAME_SIZE, GS_USB_RX_ECHO_ID,
};

/// GS-USB host frame
///
/// `echo_id` is [`GS_USB_RX_ECHO_ID`] for frames the device originates
/// (received from the bus or synthesized error frames). Any other value is a
/// host token that must come back unchanged with the transmit confirmation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// Echo ID (host token for TX, 0xFFFFFFFF for device originated frames)
    pub echo_id: u32,
    /// CAN identifier (with flags like CAN_EFF_FLAG if needed)
    pub can_id: u32,
    /// Data length code
    pub can_dlc: u8,
    /// CAN channel
    pub channel: u8,
    /// Frame flags (overflow)
    pub flags: u8,
    /// Reserved byte
    pub reserved: u8,
    /// Frame data
    pub data: [u8; CAN_MAX_DLEN],
}

impl Default for CanFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl CanFrame {
    /// Create a new empty device-originated frame
    pub const fn new() -> Self {
        Self {
            echo_id: GS_USB_RX_ECHO_ID,
            can_id: 0,
            can_dlc: 0,
            channel: 0,
            flags: 0,
            reserved: 0,
            data: [0u8; CAN_MAX_DLEN],
        }
    }

    /// Create a new CAN frame with the specified ID and data
    ///
    /// # Arguments
    /// * `can_id` - CAN identifier (with flags like CAN_EFF_FLAG if needed)
    /// * `data` - Frame data, truncated to 8 bytes
    pub fn with_data(can_id: u32, data: &[u8]) -> Self {
        let mut frame = Self::new();
        frame.can_id = can_id;
        let len = data.len().min(CAN_MAX_DLEN);
        frame.data[..len].copy_from_slice(&data[..len]);
        frame.can_dlc = len as u8;
        frame
    }

    /// Create a remote transmission request for `dlc` bytes
    pub fn remote(can_id: u32, dlc: u8) -> Self {
        let mut frame = Self::new();
        frame.can_id = can_id | CAN_RTR_FLAG;
        frame.can_dlc = dlc.min(CAN_MAX_DLC);
        frame
    }

    /// Get the arbitration ID (without flags)
    pub fn arbitration_id(&self) -> u32 {
        if self.is_extended_id() {
            self.can_id & CAN_EFF_MASK
        } else {
            self.can_id & CAN_SFF_MASK
        }
    }

    /// Check if this is an extended ID frame (29-bit)
    pub fn is_extended_id(&self) -> bool {
        (self.can_id & CAN_EFF_FLAG) != 0
    }

    /// Check if this is a remote transmission request
    pub fn is_remote_frame(&self) -> bool {
        (self.can_id & CAN_RTR_FLAG) != 0
    }

    /// Check if this is an error frame
    pub fn is_error_frame(&self) -> bool {
        (self.can_id & CAN_ERR_FLAG) != 0
    }

    /// Check if this is an echo frame (TX confirmation for the host)
    pub fn is_echo_frame(&self) -> bool {
        self.echo_id != GS_USB_RX_ECHO_ID
    }

    /// Check if this frame was originated by the device
    pub fn is_rx_frame(&self) -> bool {
        self.echo_id == GS_USB_RX_ECHO_ID
    }

    /// Get the data length, clamped to classic CAN
    pub fn data_length(&self) -> usize {
        (self.can_dlc as usize).min(CAN_MAX_DLEN)
    }

    /// Get frame data as a slice
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_length()]
    }

    /// Pack frame into its 20 byte wire representation
    pub fn pack(&self) -> [u8; GS_USB_FRAME_SIZE] {
        let mut buf = [0u8; GS_USB_FRAME_SIZE];

        // Header: echo_id (4) + can_id (4) + can_dlc (1) + channel (1) + flags (1) + reserved (1)
        buf[0..4].copy_from_slice(&self.echo_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.can_id.to_le_bytes());
        buf[8] = self.can_dlc;
        buf[9] = self.channel;
        buf[10] = self.flags;
        buf[11] = self.reserved;
        buf[12..20].copy_from_slice(&self.data);

        buf
    }

    /// Unpack a frame from its wire representation
    ///
    /// The DLC is clamped to 8 so later translation can rely on it.
    pub fn unpack(buf: &[u8; GS_USB_FRAME_SIZE]) -> Self {
        let mut data = [0u8; CAN_MAX_DLEN];
        data.copy_from_slice(&buf[12..20]);

        Self {
            echo_id: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            can_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            can_dlc: buf[8].min(CAN_MAX_DLC),
            channel: buf[9],
            flags: buf[10],
            reserved: buf[11],
            data,
        }
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLEN {
            return None;
        }
        let can_id = match id.into() {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw() | CAN_EFF_FLAG,
        };
        Some(Self::with_data(can_id, data))
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        let can_id = match id.into() {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw() | CAN_EFF_FLAG,
        };
        Some(Self::remote(can_id, dlc as u8))
    }

    fn is_extended(&self) -> bool {
        self.is_extended_id()
    }

    fn is_remote_frame(&self) -> bool {
        CanFrame::is_remote_frame(self)
    }

    fn id(&self) -> Id {
        if self.is_extended_id() {
            Id::Extended(ExtendedId::new(self.arbitration_id()).unwrap_or(ExtendedId::ZERO))
        } else {
            Id::Standard(StandardId::new(self.arbitration_id() as u16).unwrap_or(StandardId::ZERO))
        }
    }

    fn dlc(&self) -> usize {
        self.data_length()
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

impl core::fmt::Display for CanFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:>8X}   [{}] ", self.arbitration_id(), self.data_length())?;

        if self.is_remote_frame() {
            return write!(f, " remote request");
        }
        for b in self.data() {
            write!(f, " {:02X}", b)?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CanFrame")
            .field("echo_id", &format_args!("0x{:08X}", self.echo_id))
            .field("can_id", &format_args!("0x{:08X}", self.can_id))
            .field("can_dlc", &self.can_dlc)
            .field("channel", &self.channel)
            .field("flags", &format_args!("0x{:02X}", self.flags))
            .field("data", &self.data())
            .finish()
    }
}
