//! Frame exchange between the host and the controller
//!
//! [`Engine`] holds the hardware and the state shared between the interrupt
//! handler and the main context. Two [`DispatchLoop`]s drive it:
//!
//! - [`InterruptLoop`] feeds host frames into the transmit buffers while
//!   [`Engine::service_interrupt`] handles receptions, completions and errors
//!   from the controller interrupt.
//! - [`LoopbackLoop`] does everything synchronously through buffer 0 and
//!   polling. The MCP2515 drops receive interrupts in loopback mode, so that
//!   mode runs with every interrupt source disabled.
//!
//! A run uses exactly one of them, chosen when it starts.

use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use crate::bus::RegisterBus;
use crate::codec::{decode_controller_frame, encode_controller_frame, synthesize_error_frame};
use crate::config::BridgeConfig;
use crate::controller::Mcp2515;
use crate::critical::{CriticalSection, InterruptControl};
use crate::error::{BridgeError, Result};
use crate::frame::CanFrame;
use crate::queue::HostFrameQueue;
use crate::registers::{rx_flag, tx_flag, EFLG_RX0OVR, EFLG_RX1OVR, ERRIF, NUM_RX_BUFFERS};
use crate::scheduler::TransmitScheduler;
use crate::transport::HostTransport;

/// Transmit buffer the loopback loop works through
const LOOPBACK_SLOT: u8 = 0;

/// Frame state shared between the interrupt handler and the main context
///
/// The main context only touches it inside a [`CriticalSection`].
pub struct SharedState<const N: usize> {
    pub(crate) queue: HostFrameQueue<N>,
    pub(crate) scheduler: TransmitScheduler,
    /// EFLG captured with the last error interrupt
    pub(crate) error_flags: u8,
    throttled: bool,
}

impl<const N: usize> SharedState<N> {
    const fn new() -> Self {
        Self {
            queue: HostFrameQueue::new(),
            scheduler: TransmitScheduler::new(),
            error_flags: 0,
            throttled: false,
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.scheduler.clear();
        self.error_flags = 0;
        self.throttled = false;
    }

    /// Take one host frame if the queue has room for it
    fn pull_host_frame<T: HostTransport>(&mut self, transport: &mut T) {
        if self.queue.is_full() {
            if !self.throttled {
                debug!("Host frame queue full, holding the host back");
                self.throttled = true;
            }
            return;
        }
        self.throttled = false;

        if let Some(frame) = transport.receive_frame() {
            // room was checked above
            let _ = self.queue.try_push(frame);
        }
    }
}

/// Hardware and shared frame state of a bridge
pub struct Engine<B, T, I, D, const N: usize> {
    pub(crate) controller: Mcp2515<B>,
    pub(crate) transport: T,
    pub(crate) interrupts: I,
    pub(crate) delay: D,
    pub(crate) shared: SharedState<N>,
}

impl<B, T, I, D, const N: usize> Engine<B, T, I, D, N>
where
    B: RegisterBus,
    T: HostTransport,
    I: InterruptControl,
    D: DelayNs,
{
    pub fn new(bus: B, transport: T, interrupts: I, delay: D) -> Self {
        Self {
            controller: Mcp2515::new(bus),
            transport,
            interrupts,
            delay,
            shared: SharedState::new(),
        }
    }

    /// Error flags reported by the last error interrupt
    pub fn error_flags(&self) -> u8 {
        self.shared.error_flags
    }

    /// Forget queued and in-flight frames
    pub(crate) fn clear(&mut self) {
        let _cs = CriticalSection::enter(&mut self.interrupts);
        self.shared.clear();
    }

    /// Handle a controller interrupt
    ///
    /// Runs in interrupt context. CANINTF and EFLG are read once; every flag
    /// found set is serviced and then cleared on its own, so a flag raised
    /// again meanwhile stays pending for the next interrupt.
    pub fn service_interrupt(&mut self) -> Result<(), B::Error> {
        let snapshot = self.controller.read_interrupt_snapshot()?;
        trace!("CANINTF 0x{:02X} EFLG 0x{:02X}", snapshot.flags, snapshot.error_flags);

        for n in 0..NUM_RX_BUFFERS as u8 {
            if (snapshot.flags & rx_flag(n)) != 0 {
                let registers = self.controller.read_rx_slot(n)?;
                let frame = decode_controller_frame(&registers);
                trace!("RXB{}: {}", n, frame);
                self.transport.send_frame(&frame);
                self.controller.clear_interrupt_flags(rx_flag(n))?;
            }
        }

        // oldest request first, so echoes leave in submission order
        for slot in self.shared.scheduler.oldest_first() {
            if (snapshot.flags & tx_flag(slot)) != 0 {
                self.complete_transmission(slot);
                self.controller.clear_interrupt_flags(tx_flag(slot))?;
            }
        }

        if (snapshot.flags & ERRIF) != 0 {
            self.shared.error_flags = snapshot.error_flags;
            let frame = synthesize_error_frame(snapshot.error_flags);
            debug!("Controller error flags 0x{:02X}", snapshot.error_flags);
            self.transport.send_frame(&frame);

            let overruns = snapshot.error_flags & (EFLG_RX0OVR | EFLG_RX1OVR);
            if overruns != 0 {
                self.controller.clear_error_flags(overruns)?;
            }
            self.controller.clear_interrupt_flags(ERRIF)?;
        }

        Ok(())
    }

    fn complete_transmission(&mut self, slot: u8) {
        let Some(origin) = self.shared.scheduler.complete(slot) else {
            warn!("Completion on idle TXB{}", slot);
            return;
        };
        match self.shared.queue.release(origin) {
            Some(mut frame) => {
                frame.flags = 0;
                trace!("TXB{} done, echo 0x{:08X}", slot, frame.echo_id);
                self.transport.send_frame(&frame);
            }
            None => warn!("TXB{} held entry {} which is not in flight", slot, origin),
        }
    }
}

/// Main-context half of a run
pub trait DispatchLoop {
    /// Whether the controller interrupt is serviced during this loop
    fn services_interrupts(&self) -> bool;

    /// One iteration of the loop
    fn step<B, T, I, D, const N: usize>(
        &mut self,
        engine: &mut Engine<B, T, I, D, N>,
    ) -> Result<(), B::Error>
    where
        B: RegisterBus,
        T: HostTransport,
        I: InterruptControl,
        D: DelayNs;
}

/// Main context of an interrupt-driven run
#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptLoop;

impl DispatchLoop for InterruptLoop {
    fn services_interrupts(&self) -> bool {
        true
    }

    fn step<B, T, I, D, const N: usize>(
        &mut self,
        engine: &mut Engine<B, T, I, D, N>,
    ) -> Result<(), B::Error>
    where
        B: RegisterBus,
        T: HostTransport,
        I: InterruptControl,
        D: DelayNs,
    {
        {
            let _cs = CriticalSection::enter(&mut engine.interrupts);
            engine.shared.pull_host_frame(&mut engine.transport);
        }

        let _cs = CriticalSection::enter(&mut engine.interrupts);
        let shared = &mut engine.shared;
        if shared.scheduler.next_free().is_none() {
            return Ok(());
        }
        let Some(index) = shared.queue.claim() else {
            return Ok(());
        };
        let Some(frame) = shared.queue.get(index).copied() else {
            return Ok(());
        };

        if let Err(e) = shared
            .scheduler
            .submit(&mut engine.controller, index, &frame)
        {
            // retried on the next step
            shared.queue.unclaim(index);
            return Err(e);
        }
        Ok(())
    }
}

/// Synchronous run for controller loopback mode
#[derive(Debug, Clone, Copy)]
pub struct LoopbackLoop {
    idle_delay_us: u32,
    timeout_polls: u16,
}

impl LoopbackLoop {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            idle_delay_us: config.loopback_idle_delay_us,
            timeout_polls: config.send_timeout_polls,
        }
    }

    /// Send one frame through buffer 0 and echo it once it is on the bus
    ///
    /// Returns `false` when the transmission timed out and was withdrawn.
    fn transmit<B, T, I, D, const N: usize>(
        &self,
        engine: &mut Engine<B, T, I, D, N>,
        mut frame: CanFrame,
    ) -> Result<bool, B::Error>
    where
        B: RegisterBus,
        T: HostTransport,
        I: InterruptControl,
        D: DelayNs,
    {
        let encoded = encode_controller_frame(&frame);
        engine
            .controller
            .load_tx_slot(LOOPBACK_SLOT, encoded.as_bytes())?;

        if !engine
            .controller
            .wait_tx_complete(LOOPBACK_SLOT, self.timeout_polls)?
        {
            engine.controller.abort_tx_slot(LOOPBACK_SLOT)?;
            warn!(
                "Loopback transmit timed out, dropping echo 0x{:08X}",
                frame.echo_id
            );
            return Ok(false);
        }

        frame.flags = 0;
        engine.transport.send_frame(&frame);
        Ok(true)
    }
}

impl DispatchLoop for LoopbackLoop {
    fn services_interrupts(&self) -> bool {
        false
    }

    fn step<B, T, I, D, const N: usize>(
        &mut self,
        engine: &mut Engine<B, T, I, D, N>,
    ) -> Result<(), B::Error>
    where
        B: RegisterBus,
        T: HostTransport,
        I: InterruptControl,
        D: DelayNs,
    {
        engine.shared.pull_host_frame(&mut engine.transport);
        let sent = match engine.shared.queue.try_pop() {
            Some(frame) => self.transmit(engine, frame)?,
            None => true,
        };

        // back-to-back USB transfers after the echo lock the device up
        engine.delay.delay_us(self.idle_delay_us);

        if let Some((n, registers)) = engine.controller.poll_received()? {
            let frame = decode_controller_frame(&registers);
            trace!("RXB{} (polled): {}", n, frame);
            engine.transport.send_frame(&frame);
        }

        if !sent {
            return Err(BridgeError::SendTimeout {
                slot: LOOPBACK_SLOT,
            });
        }
        Ok(())
    }
}

/// Loop selected for the current run
#[derive(Debug, Clone, Copy)]
pub enum ActiveLoop {
    Interrupt(InterruptLoop),
    Loopback(LoopbackLoop),
}

impl DispatchLoop for ActiveLoop {
    fn services_interrupts(&self) -> bool {
        match self {
            ActiveLoop::Interrupt(l) => l.services_interrupts(),
            ActiveLoop::Loopback(l) => l.services_interrupts(),
        }
    }

    fn step<B, T, I, D, const N: usize>(
        &mut self,
        engine: &mut Engine<B, T, I, D, N>,
    ) -> Result<(), B::Error>
    where
        B: RegisterBus,
        T: HostTransport,
        I: InterruptControl,
        D: DelayNs,
    {
        match self {
            ActiveLoop::Interrupt(l) => l.step(engine),
            ActiveLoop::Loopback(l) => l.step(engine),
        }
    }
}
