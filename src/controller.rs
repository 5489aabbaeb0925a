//! MCP2515 driver
//!
//! Configuration, buffer access and interrupt flag handling for the controller,
//! built on the primitives of [`RegisterBus`]. Frame layout lives in
//! [`crate::codec`], transmit ordering in [`crate::scheduler`].

use log::{debug, trace};

use crate::bus::RegisterBus;
use crate::codec::RegisterFrame;
use crate::error::{BridgeError, Result};
use crate::registers::{
    rx_flag, rxb_sidh, tx_flag, txb_ctrl, ALL_FRAME_INT, CANCTRL, CANINTE, CANINTF, CNF1, CNF2,
    CNF3, EFLG, FRAME_REGISTER_LEN, MODE_CONFIG, MODE_LISTEN_ONLY, MODE_LOOPBACK, MODE_MASK,
    MODE_NORMAL, MODE_ONE_SHOT, NO_INT, NUM_TX_BUFFERS, RXB0CTRL, RXB1CTRL, RXB_BUKT,
    RXB_RXM_MASK, RXB_RXM_STDEXT, STATUS_RX0IF, STATUS_RX1IF, TXB_BLOCK_LEN, TXB_TXP_MASK,
    TXB_TXREQ,
};
use crate::scheduler::priority_ladder;
use crate::structures::RunFlags;

/// Operating mode the controller runs a session in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Normal,
    ListenOnly,
    Loopback,
}

impl OperatingMode {
    /// Select the mode from the host's run flags; loopback wins over listen-only
    pub fn from_flags(flags: RunFlags) -> Self {
        if flags.loop_back() {
            OperatingMode::Loopback
        } else if flags.listen_only() {
            OperatingMode::ListenOnly
        } else {
            OperatingMode::Normal
        }
    }

    /// REQOP bits of CANCTRL
    pub fn register_value(&self) -> u8 {
        match self {
            OperatingMode::Normal => MODE_NORMAL,
            OperatingMode::ListenOnly => MODE_LISTEN_ONLY,
            OperatingMode::Loopback => MODE_LOOPBACK,
        }
    }

    /// Interrupt sources enabled in this mode
    ///
    /// Receive interrupts get lost in loopback, so that mode is served by
    /// polling with every source disabled.
    pub fn interrupt_sources(&self) -> u8 {
        match self {
            OperatingMode::Loopback => NO_INT,
            _ => ALL_FRAME_INT,
        }
    }
}

/// CANINTF and EFLG captured by one burst read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptSnapshot {
    /// Pending interrupt flags (CANINTF)
    pub flags: u8,
    /// Error flags (EFLG) at the time of the read
    pub error_flags: u8,
}

/// MCP2515 CAN controller
pub struct Mcp2515<B> {
    bus: B,
}

impl<B: RegisterBus> Mcp2515<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Access the underlying register bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Reset and configure the controller for a run
    ///
    /// # Arguments
    /// * `cnfs` - CNF1, CNF2 and CNF3 values
    /// * `mode` - Operating mode entered once configuration is done
    pub fn begin(&mut self, cnfs: [u8; 3], mode: OperatingMode) -> Result<(), B::Error> {
        self.bus.reset().map_err(BridgeError::Bus)?;
        self.set_ctrl_mode(MODE_CONFIG)?;

        self.write_checked(CNF1, cnfs[0])?;
        self.write_checked(CNF2, cnfs[1])?;
        self.write_checked(CNF3, cnfs[2])?;

        self.init_buffers()?;

        self.bus
            .write_register(CANINTE, mode.interrupt_sources())
            .map_err(BridgeError::Bus)?;
        self.bus
            .modify_register(
                RXB0CTRL,
                RXB_RXM_MASK | RXB_BUKT,
                RXB_RXM_STDEXT | RXB_BUKT,
            )
            .map_err(BridgeError::Bus)?;
        self.bus
            .modify_register(RXB1CTRL, RXB_RXM_MASK, RXB_RXM_STDEXT)
            .map_err(BridgeError::Bus)?;

        self.set_ctrl_mode(mode.register_value())?;
        debug!("Controller configured: {:?}, CNF {:02X?}", mode, cnfs);
        Ok(())
    }

    /// Leave the bus by returning to configuration mode
    pub fn go_offline(&mut self) -> Result<(), B::Error> {
        self.set_ctrl_mode(MODE_CONFIG)
    }

    /// Enable or disable one-shot transmission
    pub fn set_one_shot(&mut self, one_shot: bool) -> Result<(), B::Error> {
        let expected = if one_shot { MODE_ONE_SHOT } else { 0 };
        self.bus
            .modify_register(CANCTRL, MODE_ONE_SHOT, expected)
            .map_err(BridgeError::Bus)?;

        let actual = self.bus.read_register(CANCTRL).map_err(BridgeError::Bus)?;
        if (actual & MODE_ONE_SHOT) != expected {
            return Err(BridgeError::ConfigReadback {
                register: CANCTRL,
                expected,
                actual: actual & MODE_ONE_SHOT,
            });
        }
        Ok(())
    }

    fn set_ctrl_mode(&mut self, mode: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(CANCTRL, MODE_MASK, mode)
            .map_err(BridgeError::Bus)?;

        let actual = self.bus.read_register(CANCTRL).map_err(BridgeError::Bus)? & MODE_MASK;
        if actual != mode {
            return Err(BridgeError::ConfigReadback {
                register: CANCTRL,
                expected: mode,
                actual,
            });
        }
        Ok(())
    }

    fn write_checked(&mut self, register: u8, value: u8) -> Result<(), B::Error> {
        self.bus
            .write_register(register, value)
            .map_err(BridgeError::Bus)?;

        let actual = self.bus.read_register(register).map_err(BridgeError::Bus)?;
        if actual != value {
            return Err(BridgeError::ConfigReadback {
                register,
                expected: value,
                actual,
            });
        }
        Ok(())
    }

    fn init_buffers(&mut self) -> Result<(), B::Error> {
        let zeros = [0u8; TXB_BLOCK_LEN as usize];
        for slot in 0..NUM_TX_BUFFERS as u8 {
            self.bus
                .write_registers(txb_ctrl(slot), &zeros)
                .map_err(BridgeError::Bus)?;
        }
        self.bus
            .write_register(RXB0CTRL, 0)
            .map_err(BridgeError::Bus)?;
        self.bus
            .write_register(RXB1CTRL, 0)
            .map_err(BridgeError::Bus)
    }

    /// Read CANINTF and EFLG in one transaction
    pub fn read_interrupt_snapshot(&mut self) -> Result<InterruptSnapshot, B::Error> {
        let mut buf = [0u8; 2];
        self.bus
            .read_registers(CANINTF, &mut buf)
            .map_err(BridgeError::Bus)?;
        Ok(InterruptSnapshot {
            flags: buf[0],
            error_flags: buf[1],
        })
    }

    /// Clear exactly the CANINTF bits in `mask`
    pub fn clear_interrupt_flags(&mut self, mask: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(CANINTF, mask, 0)
            .map_err(BridgeError::Bus)
    }

    /// Clear the EFLG bits in `mask`
    ///
    /// Only the receive overflow bits are writable.
    pub fn clear_error_flags(&mut self, mask: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(EFLG, mask, 0)
            .map_err(BridgeError::Bus)
    }

    /// Read the registers of receive buffer `n`
    pub fn read_rx_slot(&mut self, n: u8) -> Result<RegisterFrame, B::Error> {
        let mut buf = [0u8; FRAME_REGISTER_LEN];
        self.bus
            .read_registers(rxb_sidh(n), &mut buf)
            .map_err(BridgeError::Bus)?;
        Ok(buf)
    }

    /// Load frame registers into transmit buffer `slot`, leaving TXREQ alone
    pub fn write_tx_buffer(&mut self, slot: u8, registers: &[u8]) -> Result<(), B::Error> {
        self.bus
            .write_registers(txb_ctrl(slot) + 1, registers)
            .map_err(BridgeError::Bus)
    }

    /// Set the arbitration priority (TXP) of transmit buffer `slot`
    pub fn set_tx_priority(&mut self, slot: u8, priority: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(txb_ctrl(slot), TXB_TXP_MASK, priority & TXB_TXP_MASK)
            .map_err(BridgeError::Bus)
    }

    /// Request transmission of `slot` with priority 0
    pub fn request_to_send(&mut self, slot: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(txb_ctrl(slot), TXB_TXREQ | TXB_TXP_MASK, TXB_TXREQ)
            .map_err(BridgeError::Bus)
    }

    /// Load a frame into `slot` and arm it behind every slot armed before it
    ///
    /// The two other slots are moved up the priority ladder first, so the
    /// request just made always loses arbitration against earlier ones.
    pub fn load_tx_slot(&mut self, slot: u8, registers: &[u8]) -> Result<(), B::Error> {
        self.write_tx_buffer(slot, registers)?;
        for (other, priority) in priority_ladder(slot) {
            self.set_tx_priority(other, priority)?;
        }
        self.request_to_send(slot)
    }

    /// Withdraw a pending transmit request
    pub fn abort_tx_slot(&mut self, slot: u8) -> Result<(), B::Error> {
        self.bus
            .modify_register(txb_ctrl(slot), TXB_TXREQ, 0)
            .map_err(BridgeError::Bus)
    }

    /// Poll CANINTF until `slot` reports completion, at most `polls` reads
    ///
    /// The completion flag is cleared before returning `true`.
    pub fn wait_tx_complete(&mut self, slot: u8, polls: u16) -> Result<bool, B::Error> {
        let mask = tx_flag(slot);
        for _ in 0..polls {
            let flags = self.bus.read_register(CANINTF).map_err(BridgeError::Bus)?;
            if (flags & mask) != 0 {
                self.clear_interrupt_flags(mask)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Take a received frame without relying on interrupts
    ///
    /// Returns the receive buffer index and its registers. Buffer 0 is served
    /// first when both hold a frame.
    pub fn poll_received(&mut self) -> Result<Option<(u8, RegisterFrame)>, B::Error> {
        let status = self.bus.read_status().map_err(BridgeError::Bus)?;
        let n = if (status & STATUS_RX0IF) != 0 {
            0
        } else if (status & STATUS_RX1IF) != 0 {
            1
        } else {
            return Ok(None);
        };

        let registers = self.read_rx_slot(n)?;
        self.clear_interrupt_flags(rx_flag(n))?;
        trace!("Polled frame from RXB{}", n);
        Ok(Some((n, registers)))
    }
}
