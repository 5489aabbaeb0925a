//! Test doubles for the hardware seams
//!
//! [`MockBus`] emulates the MCP2515 register file closely enough for the
//! driver, dispatcher and loops to run against it: bit modify, TXREQ and
//! completion flags, receive buffers and the READ STATUS byte.

use std::collections::VecDeque;
use std::vec::Vec;

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

use crate::bus::RegisterBus;
use crate::critical::InterruptControl;
use crate::frame::CanFrame;
use crate::registers::{
    rx_flag, rxb_sidh, tx_flag, txb_ctrl, CANCTRL, CANINTF, FRAME_REGISTER_LEN, NUM_TX_BUFFERS,
    RX0IF, RX1IF, TXB_TXREQ,
};
use crate::transport::HostTransport;

/// One register bus transaction as seen by [`MockBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Reset,
    Read(u8),
    ReadBurst(u8, usize),
    Write(u8, u8),
    WriteBurst(u8, Vec<u8>),
    Modify(u8, u8, u8),
    Status,
}

/// A transmit request observed by [`MockBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arming {
    pub slot: u8,
    /// TXP of every transmit buffer when the request was made
    pub priorities: [u8; NUM_TX_BUFFERS],
}

/// MCP2515 register file emulator
pub struct MockBus {
    pub regs: [u8; 128],
    /// Register that ignores writes and always reads as the given value
    pub stuck: Option<(u8, u8)>,
    /// Bits of a register that keep their value whatever is written
    pub stuck_bits: Option<(u8, u8)>,
    /// Every transaction fails
    pub unplugged: bool,
    /// Complete transmit requests as soon as they are made
    pub auto_complete: bool,
    /// With `auto_complete`, also receive every transmitted frame back
    pub loopback: bool,
    /// Flags raised right after the next CANINTF burst read
    pub raise_after_snapshot: u8,
    pub log: Vec<BusOp>,
    pub armed: Vec<Arming>,
    pub resets: usize,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            regs: [0; 128],
            stuck: None,
            stuck_bits: None,
            unplugged: false,
            auto_complete: false,
            loopback: false,
            raise_after_snapshot: 0,
            log: Vec::new(),
            armed: Vec::new(),
            resets: 0,
        }
    }

    /// Emulator that completes and echoes every transmission internally
    pub fn looped_back() -> Self {
        Self {
            auto_complete: true,
            loopback: true,
            ..Self::new()
        }
    }

    /// Place a frame in receive buffer `n` and raise its flag
    pub fn inject_rx(&mut self, n: u8, registers: [u8; FRAME_REGISTER_LEN]) {
        let start = rxb_sidh(n) as usize;
        self.regs[start..start + FRAME_REGISTER_LEN].copy_from_slice(&registers);
        self.regs[CANINTF as usize] |= rx_flag(n);
    }

    /// Finish the pending transmission of `slot`
    pub fn complete_tx(&mut self, slot: u8) {
        self.regs[txb_ctrl(slot) as usize] &= !TXB_TXREQ;
        self.regs[CANINTF as usize] |= tx_flag(slot);
    }

    /// Registers loaded into transmit buffer `slot`
    pub fn tx_registers(&self, slot: u8) -> [u8; FRAME_REGISTER_LEN] {
        let start = txb_ctrl(slot) as usize + 1;
        let mut out = [0u8; FRAME_REGISTER_LEN];
        out.copy_from_slice(&self.regs[start..start + FRAME_REGISTER_LEN]);
        out
    }

    pub fn tx_pending(&self, slot: u8) -> bool {
        (self.regs[txb_ctrl(slot) as usize] & TXB_TXREQ) != 0
    }

    fn read(&self, address: u8) -> u8 {
        match self.stuck {
            Some((reg, value)) if reg == address => value,
            _ => self.regs[address as usize & 0x7F],
        }
    }

    fn store(&mut self, address: u8, value: u8) {
        if matches!(self.stuck, Some((reg, _)) if reg == address) {
            return;
        }
        let before = self.regs[address as usize & 0x7F];
        let value = match self.stuck_bits {
            Some((reg, mask)) if reg == address => (value & !mask) | (before & mask),
            _ => value,
        };
        self.regs[address as usize & 0x7F] = value;
        self.after_store(address, before);
    }

    fn after_store(&mut self, address: u8, before: u8) {
        for slot in 0..NUM_TX_BUFFERS as u8 {
            let ctrl = txb_ctrl(slot);
            if address != ctrl || (before & TXB_TXREQ) != 0 {
                continue;
            }
            if (self.regs[ctrl as usize] & TXB_TXREQ) == 0 {
                continue;
            }

            let mut priorities = [0u8; NUM_TX_BUFFERS];
            for (n, p) in priorities.iter_mut().enumerate() {
                *p = self.regs[txb_ctrl(n as u8) as usize] & 0x03;
            }
            self.armed.push(Arming { slot, priorities });

            if self.auto_complete {
                self.complete_tx(slot);
                if self.loopback {
                    let frame = self.tx_registers(slot);
                    let intf = self.regs[CANINTF as usize];
                    if (intf & RX0IF) == 0 {
                        self.inject_rx(0, frame);
                    } else if (intf & RX1IF) == 0 {
                        self.inject_rx(1, frame);
                    }
                }
            }
        }
    }

    fn status(&self) -> u8 {
        let intf = self.regs[CANINTF as usize];
        let mut status = intf & (RX0IF | RX1IF);
        for slot in 0..NUM_TX_BUFFERS as u8 {
            if self.tx_pending(slot) {
                status |= 0x04 << (slot * 2);
            }
            if (intf & tx_flag(slot)) != 0 {
                status |= 0x08 << (slot * 2);
            }
        }
        status
    }

    fn link(&self) -> Result<(), ()> {
        if self.unplugged {
            Err(())
        } else {
            Ok(())
        }
    }
}

impl RegisterBus for MockBus {
    type Error = ();

    fn reset(&mut self) -> Result<(), ()> {
        self.log.push(BusOp::Reset);
        self.link()?;
        self.resets += 1;
        self.regs = [0; 128];
        // configuration mode, clock out enabled, CLKPRE /8
        self.regs[CANCTRL as usize] = 0x87;
        Ok(())
    }

    fn read_register(&mut self, address: u8) -> Result<u8, ()> {
        self.log.push(BusOp::Read(address));
        self.link()?;
        Ok(self.read(address))
    }

    fn read_registers(&mut self, address: u8, values: &mut [u8]) -> Result<(), ()> {
        self.log.push(BusOp::ReadBurst(address, values.len()));
        self.link()?;
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.read(address + i as u8);
        }
        if address == CANINTF && self.raise_after_snapshot != 0 {
            self.regs[CANINTF as usize] |= self.raise_after_snapshot;
            self.raise_after_snapshot = 0;
        }
        Ok(())
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), ()> {
        self.log.push(BusOp::Write(address, value));
        self.link()?;
        self.store(address, value);
        Ok(())
    }

    fn write_registers(&mut self, address: u8, values: &[u8]) -> Result<(), ()> {
        self.log.push(BusOp::WriteBurst(address, values.to_vec()));
        self.link()?;
        for (i, v) in values.iter().enumerate() {
            self.store(address + i as u8, *v);
        }
        Ok(())
    }

    fn modify_register(&mut self, address: u8, mask: u8, data: u8) -> Result<(), ()> {
        self.log.push(BusOp::Modify(address, mask, data));
        self.link()?;
        let current = self.regs[address as usize & 0x7F];
        self.store(address, (current & !mask) | (data & mask));
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, ()> {
        self.log.push(BusOp::Status);
        self.link()?;
        Ok(self.status())
    }
}

/// Host side of the bulk endpoints
#[derive(Default)]
pub struct MockTransport {
    pub incoming: VecDeque<CanFrame>,
    pub sent: Vec<CanFrame>,
    pub receive_calls: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a host frame with the given echo token
    pub fn submit(&mut self, echo_id: u32, can_id: u32, data: &[u8]) {
        let mut frame = CanFrame::with_data(can_id, data);
        frame.echo_id = echo_id;
        self.incoming.push_back(frame);
    }
}

impl HostTransport for MockTransport {
    fn receive_frame(&mut self) -> Option<CanFrame> {
        self.receive_calls += 1;
        self.incoming.pop_front()
    }

    fn send_frame(&mut self, frame: &CanFrame) {
        self.sent.push(*frame);
    }
}

/// Interrupt mask that counts critical sections
pub struct MockInterrupts {
    pub enabled: bool,
    pub disables: usize,
    pub restores: usize,
    pub controller_irq: bool,
}

impl Default for MockInterrupts {
    fn default() -> Self {
        Self {
            enabled: true,
            disables: 0,
            restores: 0,
            controller_irq: false,
        }
    }
}

impl InterruptControl for MockInterrupts {
    fn disable(&mut self) -> bool {
        self.disables += 1;
        core::mem::replace(&mut self.enabled, false)
    }

    fn restore(&mut self, was_enabled: bool) {
        self.restores += 1;
        self.enabled = was_enabled;
    }

    fn set_controller_irq(&mut self, enabled: bool) {
        self.controller_irq = enabled;
    }
}

/// Delay that only records how long it was asked to wait
#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
    pub calls: usize,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ns += ns as u64;
    }
}

/// SPI device replaying a fixed MISO byte stream
///
/// Every transaction records the bytes clocked out on MOSI. Bytes clocked in
/// are taken from the reply script in order, zero once it runs out.
#[derive(Default)]
pub struct ScriptedSpi {
    reply: Vec<u8>,
    cursor: usize,
    pub transactions: Vec<Vec<u8>>,
}

impl ScriptedSpi {
    pub fn with_reply(reply: &[u8]) -> Self {
        Self {
            reply: reply.to_vec(),
            ..Self::default()
        }
    }

    fn next_reply(&mut self) -> u8 {
        let byte = self.reply.get(self.cursor).copied().unwrap_or(0);
        self.cursor += 1;
        byte
    }
}

impl ErrorType for ScriptedSpi {
    type Error = Infallible;
}

impl SpiDevice for ScriptedSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        let mut written = Vec::new();
        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = self.next_reply();
                    }
                }
                Operation::Write(buf) => written.extend_from_slice(buf),
                Operation::Transfer(read, write) => {
                    written.extend_from_slice(write);
                    for b in read.iter_mut() {
                        *b = self.next_reply();
                    }
                }
                Operation::TransferInPlace(buf) => {
                    written.extend_from_slice(buf);
                    for b in buf.iter_mut() {
                        *b = self.next_reply();
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        self.transactions.push(written);
        Ok(())
    }
}
