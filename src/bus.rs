//! Register access to the CAN controller
//!
//! [`RegisterBus`] is the synchronous register interface the bridge drives the
//! controller through. [`SpiRegisterBus`] implements it with the MCP2515 SPI
//! instruction set on top of an `embedded-hal` SPI device, which owns chip
//! select for the duration of each instruction.

use embedded_hal::spi::{Operation, SpiDevice};

use crate::registers::{
    INSTR_BIT_MODIFY, INSTR_READ, INSTR_READ_STATUS, INSTR_RESET, INSTR_WRITE,
};

/// Synchronous register interface of the CAN controller
///
/// Every method is a single bounded-latency transaction.
pub trait RegisterBus {
    /// Error type
    type Error: core::fmt::Debug;

    /// Issue the controller reset instruction
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Read a single register
    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error>;

    /// Read consecutive registers starting at `address`
    fn read_registers(&mut self, address: u8, values: &mut [u8]) -> Result<(), Self::Error>;

    /// Write a single register
    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error>;

    /// Write consecutive registers starting at `address`
    fn write_registers(&mut self, address: u8, values: &[u8]) -> Result<(), Self::Error>;

    /// Change only the bits of `address` selected by `mask`
    fn modify_register(&mut self, address: u8, mask: u8, data: u8) -> Result<(), Self::Error>;

    /// Read the quick status byte
    fn read_status(&mut self) -> Result<u8, Self::Error>;
}

/// MCP2515 register access over SPI
pub struct SpiRegisterBus<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> SpiRegisterBus<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Give the SPI device back
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> RegisterBus for SpiRegisterBus<SPI> {
    type Error = SPI::Error;

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.spi.write(&[INSTR_RESET])
    }

    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error> {
        let mut buf = [INSTR_READ, address, 0x00];
        self.spi.transfer_in_place(&mut buf)?;
        Ok(buf[2])
    }

    fn read_registers(&mut self, address: u8, values: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            Operation::Write(&[INSTR_READ, address]),
            Operation::Read(values),
        ])
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        self.spi.write(&[INSTR_WRITE, address, value])
    }

    fn write_registers(&mut self, address: u8, values: &[u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            Operation::Write(&[INSTR_WRITE, address]),
            Operation::Write(values),
        ])
    }

    fn modify_register(&mut self, address: u8, mask: u8, data: u8) -> Result<(), Self::Error> {
        self.spi.write(&[INSTR_BIT_MODIFY, address, mask, data])
    }

    fn read_status(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [INSTR_READ_STATUS, 0x00];
        self.spi.transfer_in_place(&mut buf)?;
        Ok(buf[1])
    }
}
