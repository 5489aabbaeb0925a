//! Error types for the bridge
//!
//! This module defines the errors raised while configuring the controller,
//! exchanging frames with it and decoding host control transfers.

use thiserror::Error;

/// Result type alias for bridge operations over a register bus with error `E`
pub type Result<T, E> = core::result::Result<T, BridgeError<E>>;

/// Error types for frame exchange and controller configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BridgeError<E: core::fmt::Debug> {
    /// Error from the register bus (SPI link to the controller)
    #[error("Register bus error: {0:?}")]
    Bus(E),

    /// A configuration register did not read back as written
    #[error("Register 0x{register:02X} read back 0x{actual:02X}, expected 0x{expected:02X}")]
    ConfigReadback {
        register: u8,
        expected: u8,
        actual: u8,
    },

    /// START was requested before any bit timing was received
    #[error("No bit timing configured")]
    MissingBitTiming,

    /// Transmit confirmation did not arrive within the polling budget
    #[error("Transmit timeout on slot {slot}")]
    SendTimeout { slot: u8 },

    /// Host frame queue capacity differs from the host submission window
    #[error("Queue capacity {capacity} does not match host TX window {window}")]
    QueueCapacityMismatch { capacity: usize, window: usize },
}

impl<E: core::fmt::Debug> BridgeError<E> {
    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::SendTimeout { .. })
    }

    /// Check if this error aborts a run during configuration
    pub fn is_config_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::ConfigReadback { .. } | BridgeError::MissingBitTiming
        )
    }
}

/// Errors raised while decoding a vendor control transfer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Payload shorter than the request requires
    #[error("Invalid control payload: expected {expected} bytes, got {actual}")]
    ShortPayload { expected: usize, actual: usize },

    /// HOST_FORMAT carried an unexpected byte order marker
    #[error("Unsupported host byte order marker 0x{0:08X}")]
    ByteOrder(u32),

    /// MODE carried neither RESET nor START
    #[error("Unknown mode value {0}")]
    UnknownMode(u32),

    /// IDENTIFY carried neither OFF nor ON
    #[error("Unknown identify value {0}")]
    UnknownIdentify(u32),

    /// Bit timing outside the controller's register ranges
    #[error("Bit timing out of controller range")]
    InvalidBitTiming,

    /// Request code not handled by this device
    #[error("Unsupported control request {0}")]
    UnsupportedRequest(u8),
}
