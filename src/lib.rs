//! GS-USB Device Bridge for the MCP2515
//!
//! This crate implements the device side of the GS-USB protocol for USB-CAN
//! adapters built around an MCP2515 stand-alone CAN controller. It exchanges
//! frames between the host (the Linux `gs_usb` driver) and the controller's
//! three transmit and two receive buffers.
//!
//! # Features
//!
//! - Classic CAN, standard and extended identifiers, remote frames
//! - Normal, listen-only, loopback, one-shot and triple-sample modes
//! - Transmit order preserved across the three hardware buffers
//! - Transmit echoes carrying the host's echo id
//! - Controller error flags reported as SocketCAN error frames
//! - `no_std`, hardware reached through `embedded-hal` traits
//!
//! # Architecture
//!
//! The USB stack, the SPI peripheral and the interrupt controller stay outside
//! the crate, behind [`HostTransport`], [`RegisterBus`] and
//! [`InterruptControl`]. [`Bridge::handle_control_out`] takes the vendor
//! control requests, [`Bridge::on_interrupt`] belongs in the handler of the
//! MCP2515 INT pin and [`Bridge::poll`] in the main loop. Both reach the
//! bridge through one shared resource; see [`Bridge`] for the wiring.
//!
//! # Example
//!
//! ```ignore
//! use gs_usb_bridge::{Bridge, BridgeConfig, SpiRegisterBus};
//!
//! let bus = SpiRegisterBus::new(spi_device);
//! let mut bridge: Bridge<_, _, _, _, 10> =
//!     Bridge::new(bus, usb_frames, interrupt_mask, delay, BridgeConfig::default())?;
//!
//! loop {
//!     if let Err(e) = bridge.poll() {
//!         log::warn!("{}", e);
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod bridge;
pub mod bus;
pub mod codec;
pub mod config;
pub mod constants;
pub mod control;
pub mod controller;
pub mod critical;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod queue;
pub mod registers;
pub mod scheduler;
pub mod structures;
pub mod transport;

#[cfg(test)]
mod mock;

// Re-export main types at crate root
pub use constants::{
    // CAN ID flags
    CAN_EFF_FLAG,
    // CAN ID masks
    CAN_EFF_MASK,
    CAN_ERR_FLAG,
    CAN_RTR_FLAG,
    CAN_SFF_MASK,
    // Feature flags
    GS_CAN_FEATURE_IDENTIFY,
    GS_CAN_FEATURE_LISTEN_ONLY,
    GS_CAN_FEATURE_LOOP_BACK,
    GS_CAN_FEATURE_ONE_SHOT,
    GS_CAN_FEATURE_TRIPLE_SAMPLE,
    // Frame flags
    GS_CAN_FLAG_OVERFLOW,
    // Mode flags
    GS_CAN_MODE_LISTEN_ONLY,
    GS_CAN_MODE_LOOP_BACK,
    GS_CAN_MODE_NORMAL,
    GS_CAN_MODE_ONE_SHOT,
    GS_CAN_MODE_TRIPLE_SAMPLE,
    // Echo id of device originated frames
    GS_USB_RX_ECHO_ID,
};

pub use bridge::Bridge;
pub use bus::{RegisterBus, SpiRegisterBus};
pub use config::BridgeConfig;
pub use control::{ControlEvent, ControlResponse, ModeController, RunState};
pub use controller::{Mcp2515, OperatingMode};
pub use critical::{CriticalSection, InterruptControl};
pub use dispatch::{ActiveLoop, DispatchLoop, InterruptLoop, LoopbackLoop};
pub use error::{BridgeError, ControlError, Result};
pub use frame::CanFrame;
pub use queue::HostFrameQueue;
pub use scheduler::{TransmitScheduler, TxSlot};
pub use structures::{DeviceBitTiming, DeviceCapability, DeviceInfo, DeviceMode, RunFlags};
pub use transport::HostTransport;
