//! GS-USB bridge
//!
//! This module provides the [`Bridge`] struct, which ties the host control
//! surface, the MCP2515 and the frame exchange together.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::bus::RegisterBus;
use crate::codec::bit_timing_to_registers;
use crate::config::BridgeConfig;
use crate::control::{ControlEvent, ControlResponse, ModeController, RunState};
use crate::controller::{Mcp2515, OperatingMode};
use crate::critical::InterruptControl;
use crate::dispatch::{ActiveLoop, DispatchLoop, Engine, InterruptLoop, LoopbackLoop};
use crate::error::{BridgeError, ControlError, Result};
use crate::transport::HostTransport;

/// Device side of a GS-USB adapter built around an MCP2515
///
/// `N` is the capacity of the host frame queue and must equal
/// [`BridgeConfig::host_tx_window`].
///
/// # Wiring
///
/// [`poll`](Self::poll) and [`on_interrupt`](Self::on_interrupt) both take
/// `&mut self`, so the bridge lives in a resource shared between the main
/// loop and the handler of the MCP2515 INT pin: an RTIC `#[shared]` resource,
/// or a `Mutex<RefCell<_>>` taken in both places. The main loop locks it for
/// one `poll` at a time, never around [`run`](Self::run), and the handler gets
/// in between polls.
///
/// Behind such a lock the INT handler cannot preempt a poll, and
/// [`InterruptControl::disable`] and [`InterruptControl::restore`] may be
/// no-ops. When the handler reaches the bridge without that lock, they must
/// mask the INT line. [`InterruptControl::set_controller_irq`] is always
/// needed: it keeps the line disabled outside interrupt-driven runs.
///
/// # Example
///
/// ```ignore
/// use gs_usb_bridge::{Bridge, BridgeConfig, SpiRegisterBus};
///
/// let bus = SpiRegisterBus::new(spi_device);
/// let bridge: Bridge<_, _, _, _, 10> =
///     Bridge::new(bus, usb_frames, interrupt_mask, delay, BridgeConfig::default())?;
/// // hand `bridge` to the shared resource, e.g. RTIC `#[init]` returns it
///
/// // USB control handler:  bridge.lock(|b| b.handle_control_out(request, data))
/// // MCP2515 INT handler:  bridge.lock(|b| b.on_interrupt())
/// loop {
///     if let Err(e) = bridge.lock(|b| b.poll()) {
///         log::warn!("{}", e);
///     }
/// }
/// ```
pub struct Bridge<B, T, I, D, const N: usize> {
    engine: Engine<B, T, I, D, N>,
    modes: ModeController,
    config: BridgeConfig,
    active: Option<ActiveLoop>,
    /// RESET count when the active run started
    run_resets: u32,
}

impl<B, T, I, D, const N: usize> Bridge<B, T, I, D, N>
where
    B: RegisterBus,
    T: HostTransport,
    I: InterruptControl,
    D: DelayNs,
{
    /// Create a bridge in RESET
    ///
    /// Fails with [`BridgeError::QueueCapacityMismatch`] when `N` does not
    /// match the configured host window.
    pub fn new(
        bus: B,
        transport: T,
        interrupts: I,
        delay: D,
        config: BridgeConfig,
    ) -> Result<Self, B::Error> {
        config.validate(N)?;
        Ok(Self {
            engine: Engine::new(bus, transport, interrupts, delay),
            modes: ModeController::new(config.capability, config.device_info),
            config,
            active: None,
            run_resets: 0,
        })
    }

    /// Run requested by the host
    pub fn state(&self) -> RunState {
        self.modes.state()
    }

    /// Loop serving the current run, if one is active
    pub fn active_loop(&self) -> Option<&ActiveLoop> {
        self.active.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn controller(&self) -> &Mcp2515<B> {
        &self.engine.controller
    }

    pub fn transport(&self) -> &T {
        &self.engine.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.engine.transport
    }

    /// Error flags reported by the last controller error interrupt
    pub fn error_flags(&self) -> u8 {
        self.engine.error_flags()
    }

    /// Apply a host-to-device vendor request
    pub fn handle_control_out(
        &mut self,
        request: u8,
        data: &[u8],
    ) -> core::result::Result<ControlEvent, ControlError> {
        self.modes.handle_control_out(request, data)
    }

    /// Answer a device-to-host vendor request
    pub fn control_in(&self, request: u8) -> core::result::Result<ControlResponse, ControlError> {
        self.modes.control_in(request)
    }

    /// One iteration of the main context
    ///
    /// Starts a run once the host requested START, ends it once the host
    /// requested RESET and otherwise steps the loop of the active run. Nothing
    /// moves while no run is active.
    ///
    /// A RESET ends the run even when the host already asked for START again
    /// before this poll; the new run then starts on the next poll with the
    /// new bit timing and flags.
    pub fn poll(&mut self) -> Result<(), B::Error> {
        if self.active.is_some() && self.modes.reset_count() != self.run_resets {
            return self.end_run();
        }

        match self.modes.state() {
            RunState::Start => match self.active.as_mut() {
                Some(active) => active.step(&mut self.engine),
                None => self.start_run(),
            },
            RunState::Reset => Ok(()),
        }
    }

    /// Controller interrupt handler
    ///
    /// Does nothing unless an interrupt-driven run is active.
    pub fn on_interrupt(&mut self) -> Result<(), B::Error> {
        match &self.active {
            Some(active) if active.services_interrupts() => self.engine.service_interrupt(),
            _ => Ok(()),
        }
    }

    /// Serve the host forever
    ///
    /// Only for a bridge the main loop owns outright, with the INT handler
    /// reaching it some other way; a shared bridge is polled one lock at a
    /// time instead.
    pub fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.poll() {
                if !e.is_timeout() {
                    error!("{}", e);
                }
            }
        }
    }

    /// Configure the controller and select the loop for a new run
    ///
    /// On failure the mode falls back to RESET. Once the controller has been
    /// touched it is also put back into configuration mode, so a half
    /// configured controller does not stay on the bus.
    fn start_run(&mut self) -> Result<(), B::Error> {
        let Some(timing) = self.modes.bit_timing() else {
            warn!("Run start failed: no bit timing");
            self.modes.force_reset();
            return Err(BridgeError::MissingBitTiming);
        };
        let flags = self.modes.flags();
        let mode = OperatingMode::from_flags(flags);
        let cnfs = bit_timing_to_registers(&timing, flags.triple_sample());

        self.engine.clear();
        let configured = self
            .engine
            .controller
            .begin(cnfs, mode)
            .and_then(|()| self.engine.controller.set_one_shot(flags.one_shot()));
        if let Err(e) = configured {
            warn!("Run start failed: {}", e);
            self.modes.force_reset();
            self.engine.interrupts.set_controller_irq(false);
            if let Err(offline) = self.engine.controller.go_offline() {
                warn!("Controller did not go offline: {}", offline);
            }
            return Err(e);
        }

        let active = match mode {
            OperatingMode::Loopback => ActiveLoop::Loopback(LoopbackLoop::new(&self.config)),
            OperatingMode::Normal | OperatingMode::ListenOnly => {
                self.engine.interrupts.set_controller_irq(true);
                ActiveLoop::Interrupt(InterruptLoop)
            }
        };
        info!("Run started: {:?}, flags 0x{:08x}, {:?}", mode, flags.0, active);
        self.active = Some(active);
        self.run_resets = self.modes.reset_count();
        Ok(())
    }

    fn end_run(&mut self) -> Result<(), B::Error> {
        self.engine.interrupts.set_controller_irq(false);
        self.active = None;
        self.engine.clear();
        info!("Run stopped");
        self.engine.controller.go_offline()
    }
}
