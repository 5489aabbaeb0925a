//! GS-USB protocol structures
//!
//! Payloads of the vendor control transfers: what the host sends to configure a
//! run (mode, bit timing) and the static descriptors the device answers with.

use crate::constants::{
    GS_CAN_FEATURE_IDENTIFY, GS_CAN_FEATURE_LISTEN_ONLY, GS_CAN_FEATURE_LOOP_BACK,
    GS_CAN_FEATURE_ONE_SHOT, GS_CAN_FEATURE_TRIPLE_SAMPLE, GS_CAN_MODE_LISTEN_ONLY,
    GS_CAN_MODE_LOOP_BACK, GS_CAN_MODE_ONE_SHOT, GS_CAN_MODE_TRIPLE_SAMPLE,
};

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Per-run configuration flags carried by a MODE request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags(pub u32);

impl RunFlags {
    /// Listen-only: the controller never acknowledges or transmits
    pub fn listen_only(&self) -> bool {
        (self.0 & GS_CAN_MODE_LISTEN_ONLY) != 0
    }

    /// Internal loopback, served by the polling loop
    pub fn loop_back(&self) -> bool {
        (self.0 & GS_CAN_MODE_LOOP_BACK) != 0
    }

    pub fn triple_sample(&self) -> bool {
        (self.0 & GS_CAN_MODE_TRIPLE_SAMPLE) != 0
    }

    pub fn one_shot(&self) -> bool {
        (self.0 & GS_CAN_MODE_ONE_SHOT) != 0
    }
}

/// Device mode request
///
/// Used by the host to start or stop the CAN channel with specific mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMode {
    /// Mode value (0 = reset/stop, 1 = start)
    pub mode: u32,
    /// Mode flags (combination of GS_CAN_MODE_* constants)
    pub flags: RunFlags,
}

impl DeviceMode {
    /// Payload size of a MODE request
    pub const SIZE: usize = 8;

    /// Create a new device mode request
    pub fn new(mode: u32, flags: u32) -> Self {
        Self {
            mode,
            flags: RunFlags(flags),
        }
    }

    /// Unpack from the control transfer payload
    pub fn unpack(data: &[u8; Self::SIZE]) -> Self {
        Self::new(le_u32(data, 0), le_u32(data, 4))
    }
}

impl core::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Mode: {}\nFlags: 0x{:08x}", self.mode, self.flags.0)
    }
}

/// CAN bit timing requested by the host
///
/// Segment lengths are in time quanta, the prescaler in controller clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBitTiming {
    /// Propagation segment
    pub prop_seg: u32,
    /// Phase segment 1
    pub phase_seg1: u32,
    /// Phase segment 2
    pub phase_seg2: u32,
    /// Synchronization jump width
    pub sjw: u32,
    /// Baud rate prescaler
    pub brp: u32,
}

impl DeviceBitTiming {
    /// Payload size of a BITTIMING request
    pub const SIZE: usize = 20;

    /// Create a new bit timing configuration
    pub fn new(prop_seg: u32, phase_seg1: u32, phase_seg2: u32, sjw: u32, brp: u32) -> Self {
        Self {
            prop_seg,
            phase_seg1,
            phase_seg2,
            sjw,
            brp,
        }
    }

    /// Unpack from the control transfer payload
    pub fn unpack(data: &[u8; Self::SIZE]) -> Self {
        Self::new(
            le_u32(data, 0),
            le_u32(data, 4),
            le_u32(data, 8),
            le_u32(data, 12),
            le_u32(data, 16),
        )
    }

    /// Check that every field is positive and fits its CNF register field
    pub fn fits_controller(&self) -> bool {
        (1..=8).contains(&self.prop_seg)
            && (1..=8).contains(&self.phase_seg1)
            && (1..=8).contains(&self.phase_seg2)
            && (1..=4).contains(&self.sjw)
            && (1..=64).contains(&self.brp)
    }
}

impl core::fmt::Display for DeviceBitTiming {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Prop Seg: {}\nPhase Seg 1: {}\nPhase Seg 2: {}\nSJW: {}\nBRP: {}",
            self.prop_seg, self.phase_seg1, self.phase_seg2, self.sjw, self.brp
        )
    }
}

/// Device information (DEVICE_CONFIG response)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Interface count (number of CAN channels - 1)
    pub icount: u8,
    /// Firmware version
    pub sw_version: u32,
    /// Hardware version
    pub hw_version: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            icount: 0,
            sw_version: 2,
            hw_version: 1,
        }
    }
}

impl DeviceInfo {
    /// Response size of DEVICE_CONFIG
    pub const SIZE: usize = 12;

    /// Pack into bytes for the control IN transfer
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        // reserved1..3 stay zero
        buf[3] = self.icount;
        buf[4..8].copy_from_slice(&self.sw_version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.hw_version.to_le_bytes());
        buf
    }

    /// Get the number of CAN channels
    pub fn channel_count(&self) -> u8 {
        self.icount + 1
    }
}

/// Device capability including bit timing constraints (BT_CONST response)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    /// Feature bitfield (combination of GS_CAN_FEATURE_* constants)
    pub feature: u32,
    /// CAN clock frequency in Hz
    pub fclk_can: u32,
    /// Minimum TSEG1 value
    pub tseg1_min: u32,
    /// Maximum TSEG1 value
    pub tseg1_max: u32,
    /// Minimum TSEG2 value
    pub tseg2_min: u32,
    /// Maximum TSEG2 value
    pub tseg2_max: u32,
    /// Maximum SJW value
    pub sjw_max: u32,
    /// Minimum BRP value
    pub brp_min: u32,
    /// Maximum BRP value
    pub brp_max: u32,
    /// BRP increment value
    pub brp_inc: u32,
}

impl Default for DeviceCapability {
    /// MCP2515 with the 8 MHz clock the host computes timings against
    fn default() -> Self {
        Self {
            feature: GS_CAN_FEATURE_LISTEN_ONLY
                | GS_CAN_FEATURE_LOOP_BACK
                | GS_CAN_FEATURE_IDENTIFY
                | GS_CAN_FEATURE_TRIPLE_SAMPLE
                | GS_CAN_FEATURE_ONE_SHOT,
            fclk_can: 8_000_000,
            tseg1_min: 3,
            tseg1_max: 8,
            tseg2_min: 2,
            tseg2_max: 8,
            sjw_max: 4,
            brp_min: 1,
            brp_max: 64,
            brp_inc: 1,
        }
    }
}

impl DeviceCapability {
    /// Response size of BT_CONST (10 x uint32)
    pub const SIZE: usize = 40;

    /// Pack into bytes for the control IN transfer
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let fields = [
            self.feature,
            self.fclk_can,
            self.tseg1_min,
            self.tseg1_max,
            self.tseg2_min,
            self.tseg2_max,
            self.sjw_max,
            self.brp_min,
            self.brp_max,
            self.brp_inc,
        ];
        let mut buf = [0u8; Self::SIZE];
        for (chunk, field) in buf.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        buf
    }
}

impl core::fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Feature bitfield: 0x{:08x}\n\
             Clock: {} Hz\n\
             TSEG1: {} - {}\n\
             TSEG2: {} - {}\n\
             SJW (max): {}\n\
             BRP: {} - {} (inc: {})",
            self.feature,
            self.fclk_can,
            self.tseg1_min,
            self.tseg1_max,
            self.tseg2_min,
            self.tseg2_max,
            self.sjw_max,
            self.brp_min,
            self.brp_max,
            self.brp_inc
        )
    }
}
