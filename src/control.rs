//! Vendor control surface
//!
//! The USB stack decodes the setup packet and hands the request code and data
//! stage to [`ModeController`], which keeps everything the host configures for
//! the next run: bit timing, run flags and the RESET/START request.

use log::{debug, info, warn};

use crate::constants::{
    GS_CAN_IDENTIFY_OFF, GS_CAN_IDENTIFY_ON, GS_CAN_MODE_RESET, GS_CAN_MODE_START,
    GS_USB_BREQ_BITTIMING, GS_USB_BREQ_BT_CONST, GS_USB_BREQ_DEVICE_CONFIG,
    GS_USB_BREQ_HOST_FORMAT, GS_USB_BREQ_IDENTIFY, GS_USB_BREQ_MODE, GS_USB_HOST_FORMAT_MAGIC,
};
use crate::error::ControlError;
use crate::structures::{DeviceBitTiming, DeviceCapability, DeviceInfo, DeviceMode, RunFlags};

/// Run requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run; the controller is left alone and no frames move
    Reset,
    /// A run was requested and starts or continues on the next poll
    Start,
}

/// Outcome of a host-to-device control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    HostFormat,
    BitTiming(DeviceBitTiming),
    Mode(RunState),
    /// Identify indicator on or off
    Identify(bool),
}

/// Data stage of a device-to-host control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    Capability([u8; DeviceCapability::SIZE]),
    DeviceConfig([u8; DeviceInfo::SIZE]),
}

impl ControlResponse {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ControlResponse::Capability(bytes) => bytes,
            ControlResponse::DeviceConfig(bytes) => bytes,
        }
    }
}

fn payload<const N: usize>(data: &[u8]) -> Result<&[u8; N], ControlError> {
    data.get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(ControlError::ShortPayload {
            expected: N,
            actual: data.len(),
        })
}

fn word(data: &[u8]) -> Result<u32, ControlError> {
    Ok(u32::from_le_bytes(*payload::<4>(data)?))
}

/// Host-facing mode and configuration state
pub struct ModeController {
    state: RunState,
    /// Number of RESET requests seen so far
    resets: u32,
    flags: RunFlags,
    bit_timing: Option<DeviceBitTiming>,
    capability: DeviceCapability,
    device_info: DeviceInfo,
}

impl ModeController {
    pub fn new(capability: DeviceCapability, device_info: DeviceInfo) -> Self {
        Self {
            state: RunState::Reset,
            resets: 0,
            flags: RunFlags::default(),
            bit_timing: None,
            capability,
            device_info,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Count of RESET requests, wrapping
    ///
    /// A run that started at a different count has been reset since, even if
    /// the host already asked for START again.
    pub fn reset_count(&self) -> u32 {
        self.resets
    }

    /// Flags of the last MODE request
    pub fn flags(&self) -> RunFlags {
        self.flags
    }

    pub fn bit_timing(&self) -> Option<DeviceBitTiming> {
        self.bit_timing
    }

    /// Fall back to RESET, as after a failed run start
    pub fn force_reset(&mut self) {
        self.state = RunState::Reset;
    }

    /// Apply a host-to-device vendor request
    ///
    /// # Arguments
    /// * `request` - bRequest of the setup packet (GS_USB_BREQ_*)
    /// * `data` - Data stage, little endian
    pub fn handle_control_out(
        &mut self,
        request: u8,
        data: &[u8],
    ) -> Result<ControlEvent, ControlError> {
        let result = self.apply(request, data);
        if let Err(e) = &result {
            warn!("Rejected control request {}: {}", request, e);
        }
        result
    }

    fn apply(&mut self, request: u8, data: &[u8]) -> Result<ControlEvent, ControlError> {
        match request {
            GS_USB_BREQ_HOST_FORMAT => {
                let marker = word(data)?;
                if marker != GS_USB_HOST_FORMAT_MAGIC {
                    return Err(ControlError::ByteOrder(marker));
                }
                Ok(ControlEvent::HostFormat)
            }
            GS_USB_BREQ_BITTIMING => {
                let timing = DeviceBitTiming::unpack(payload(data)?);
                if !timing.fits_controller() {
                    return Err(ControlError::InvalidBitTiming);
                }
                debug!("Bit timing set: {:?}", timing);
                self.bit_timing = Some(timing);
                Ok(ControlEvent::BitTiming(timing))
            }
            GS_USB_BREQ_MODE => {
                let mode = DeviceMode::unpack(payload(data)?);
                let state = match mode.mode {
                    GS_CAN_MODE_RESET => RunState::Reset,
                    GS_CAN_MODE_START => RunState::Start,
                    other => return Err(ControlError::UnknownMode(other)),
                };
                // flags only matter for the next run start
                self.flags = mode.flags;
                self.state = state;
                if state == RunState::Reset {
                    self.resets = self.resets.wrapping_add(1);
                }
                info!("Host requested {:?} (flags 0x{:08x})", state, mode.flags.0);
                Ok(ControlEvent::Mode(state))
            }
            GS_USB_BREQ_IDENTIFY => match word(data)? {
                GS_CAN_IDENTIFY_OFF => Ok(ControlEvent::Identify(false)),
                GS_CAN_IDENTIFY_ON => Ok(ControlEvent::Identify(true)),
                other => Err(ControlError::UnknownIdentify(other)),
            },
            other => Err(ControlError::UnsupportedRequest(other)),
        }
    }

    /// Answer a device-to-host vendor request
    pub fn control_in(&self, request: u8) -> Result<ControlResponse, ControlError> {
        match request {
            GS_USB_BREQ_BT_CONST => Ok(ControlResponse::Capability(self.capability.pack())),
            GS_USB_BREQ_DEVICE_CONFIG => {
                Ok(ControlResponse::DeviceConfig(self.device_info.pack()))
            }
            other => Err(ControlError::UnsupportedRequest(other)),
        }
    }
}
