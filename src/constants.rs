//! GS-USB protocol constants
//!
//! This module contains the constants of the host-facing GS-USB protocol as seen
//! from the device: mode flags, feature flags, CAN identifier flags, the error
//! frame encoding and the vendor control request codes.

// ============================================================================
// GS-USB Mode Flags (used in DeviceMode.flags)
// ============================================================================

/// Normal operation mode
pub const GS_CAN_MODE_NORMAL: u32 = 0;
/// Listen-only mode (no ACKs sent)
pub const GS_CAN_MODE_LISTEN_ONLY: u32 = 1 << 0;
/// Loopback mode (for testing)
pub const GS_CAN_MODE_LOOP_BACK: u32 = 1 << 1;
/// Triple sample mode
pub const GS_CAN_MODE_TRIPLE_SAMPLE: u32 = 1 << 2;
/// One-shot mode (no retransmission)
pub const GS_CAN_MODE_ONE_SHOT: u32 = 1 << 3;

// ============================================================================
// GS-USB Device Feature Flags (BT_CONST response)
// ============================================================================

/// Device supports listen-only mode
pub const GS_CAN_FEATURE_LISTEN_ONLY: u32 = 1 << 0;
/// Device supports loopback mode
pub const GS_CAN_FEATURE_LOOP_BACK: u32 = 1 << 1;
/// Device supports triple sample mode
pub const GS_CAN_FEATURE_TRIPLE_SAMPLE: u32 = 1 << 2;
/// Device supports one-shot mode
pub const GS_CAN_FEATURE_ONE_SHOT: u32 = 1 << 3;
/// Device supports identify (LED blink)
pub const GS_CAN_FEATURE_IDENTIFY: u32 = 1 << 5;

// ============================================================================
// CAN ID Flags (in CAN frame identifier)
// ============================================================================

/// Extended frame format flag (29-bit ID)
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Error message frame flag
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;

// ============================================================================
// CAN ID Masks
// ============================================================================

/// Standard frame format mask (11-bit ID)
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// Extended frame format mask (29-bit ID)
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

// ============================================================================
// CAN Error Frame Encoding
// ============================================================================

/// Controller problems, details in data[1]
pub const CAN_ERR_CRTL: u32 = 0x0000_0004;
/// Bus off
pub const CAN_ERR_BUSOFF: u32 = 0x0000_0040;
/// Data length of a synthesized error frame
pub const CAN_ERR_DLC: u8 = 8;

/// RX buffer overflow (data[1])
pub const CAN_ERR_CRTL_RX_OVERFLOW: u8 = 0x01;
/// Reached warning level for RX errors (data[1])
pub const CAN_ERR_CRTL_RX_WARNING: u8 = 0x04;
/// Reached warning level for TX errors (data[1])
pub const CAN_ERR_CRTL_TX_WARNING: u8 = 0x08;
/// Reached error passive status RX (data[1])
pub const CAN_ERR_CRTL_RX_PASSIVE: u8 = 0x10;
/// Reached error passive status TX (data[1])
pub const CAN_ERR_CRTL_TX_PASSIVE: u8 = 0x20;

// ============================================================================
// CAN Payload Definitions
// ============================================================================

/// Maximum DLC for classic CAN
pub const CAN_MAX_DLC: u8 = 8;
/// Maximum data length for classic CAN
pub const CAN_MAX_DLEN: usize = 8;

// ============================================================================
// GS-USB Frame Constants
// ============================================================================

/// RX overflow occurred (in gs_host_frame.flags)
pub const GS_CAN_FLAG_OVERFLOW: u8 = 1 << 0;

/// Echo ID value for frames originated by the device (received or error frames)
pub const GS_USB_RX_ECHO_ID: u32 = 0xFFFF_FFFF;

/// Classic CAN host frame size (no timestamp)
pub const GS_USB_FRAME_SIZE: usize = 20;

/// Number of frames the Linux gs_usb driver keeps in flight (`GS_MAX_TX_URBS`)
pub const GS_USB_HOST_TX_WINDOW: usize = 10;

// ============================================================================
// GS-USB Control Request Codes
// ============================================================================

/// Set host byte order (legacy)
pub const GS_USB_BREQ_HOST_FORMAT: u8 = 0;
/// Set bit timing
pub const GS_USB_BREQ_BITTIMING: u8 = 1;
/// Set/start mode
pub const GS_USB_BREQ_MODE: u8 = 2;
/// Get bit timing constants
pub const GS_USB_BREQ_BT_CONST: u8 = 4;
/// Get device configuration
pub const GS_USB_BREQ_DEVICE_CONFIG: u8 = 5;
/// Identify device (blink LED)
pub const GS_USB_BREQ_IDENTIFY: u8 = 7;

/// Byte order marker the host sends with HOST_FORMAT
pub const GS_USB_HOST_FORMAT_MAGIC: u32 = 0x0000_BEEF;

// ============================================================================
// GS-USB Mode Values
// ============================================================================

/// Reset/stop mode
pub const GS_CAN_MODE_RESET: u32 = 0;
/// Start mode
pub const GS_CAN_MODE_START: u32 = 1;

/// Identify indicator off
pub const GS_CAN_IDENTIFY_OFF: u32 = 0;
/// Identify indicator on
pub const GS_CAN_IDENTIFY_ON: u32 = 1;
