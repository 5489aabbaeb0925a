//! Bridge configuration
//!
//! Firmware has no filesystem, so configuration is a plain struct built in
//! code. [`BridgeConfig::default`] describes the MCP2515 board the Linux
//! gs_usb driver talks to.

use crate::constants::GS_USB_HOST_TX_WINDOW;
use crate::error::BridgeError;
use crate::structures::{DeviceCapability, DeviceInfo};

/// Bridge configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Frames the host may have outstanding at once
    ///
    /// The host frame queue is sized to exactly this many frames.
    pub host_tx_window: usize,

    /// Pause between the transmit echo and the receive poll of the loopback
    /// loop, in microseconds
    ///
    /// Driving both USB directions back to back locks the device up. About
    /// 50 µs was enough on a 16 MHz AVR; check it on new hardware.
    pub loopback_idle_delay_us: u32,

    /// CANINTF reads spent waiting for a loopback transmission to complete
    pub send_timeout_polls: u16,

    /// Answer to BT_CONST
    pub capability: DeviceCapability,

    /// Answer to DEVICE_CONFIG
    pub device_info: DeviceInfo,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_tx_window: GS_USB_HOST_TX_WINDOW,
            loopback_idle_delay_us: 50,
            send_timeout_polls: 500,
            capability: DeviceCapability::default(),
            device_info: DeviceInfo::default(),
        }
    }
}

impl BridgeConfig {
    /// Check that a host frame queue of `capacity` entries matches the window
    pub fn validate<E: core::fmt::Debug>(&self, capacity: usize) -> Result<(), BridgeError<E>> {
        if capacity == 0 || capacity != self.host_tx_window {
            return Err(BridgeError::QueueCapacityMismatch {
                capacity,
                window: self.host_tx_window,
            });
        }
        Ok(())
    }
}
