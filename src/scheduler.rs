//! Transmit buffer scheduling
//!
//! The MCP2515 arbitrates pending transmit buffers by their TXP field, not by
//! the order they were requested in. Buffers are therefore armed strictly in
//! rotation, and arming buffer `k` raises the two others so that every buffer
//! armed earlier outranks it:
//!
//! | buffer  | TXP |
//! |---------|-----|
//! | k + 1   | 2   |
//! | k + 2   | 1   |
//! | k       | 0   |
//!
//! With rotation, `k + 1` and `k + 2` are the oldest and second oldest
//! requests still pending, so the bus sees frames in submission order.

use log::trace;

use crate::bus::RegisterBus;
use crate::codec::encode_controller_frame;
use crate::controller::Mcp2515;
use crate::error::Result;
use crate::frame::CanFrame;
use crate::registers::NUM_TX_BUFFERS;

/// Occupancy of one transmit buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxSlot {
    Free,
    /// Holds the frame of host queue entry `origin`
    Occupied { origin: usize },
}

/// TXP values forced on the other buffers when `slot` is armed
pub const fn priority_ladder(slot: u8) -> [(u8, u8); 2] {
    let n = NUM_TX_BUFFERS as u8;
    [((slot + 1) % n, 2), ((slot + 2) % n, 1)]
}

/// Transmit buffer allocation in arming order
pub struct TransmitScheduler {
    slots: [TxSlot; NUM_TX_BUFFERS],
    cursor: u8,
}

impl Default for TransmitScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitScheduler {
    pub const fn new() -> Self {
        Self {
            slots: [TxSlot::Free; NUM_TX_BUFFERS],
            cursor: 0,
        }
    }

    /// Buffer the next frame goes to, if its previous frame has completed
    pub fn next_free(&self) -> Option<u8> {
        match self.slots[self.cursor as usize] {
            TxSlot::Free => Some(self.cursor),
            TxSlot::Occupied { .. } => None,
        }
    }

    pub fn slot(&self, slot: u8) -> TxSlot {
        self.slots
            .get(slot as usize)
            .copied()
            .unwrap_or(TxSlot::Free)
    }

    /// Number of buffers waiting for completion
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, TxSlot::Occupied { .. }))
            .count()
    }

    /// Record that the next free buffer now holds queue entry `origin`
    ///
    /// Returns the buffer, or `None` when it is still busy.
    pub fn occupy(&mut self, origin: usize) -> Option<u8> {
        let slot = self.next_free()?;
        self.slots[slot as usize] = TxSlot::Occupied { origin };
        self.cursor = (slot + 1) % NUM_TX_BUFFERS as u8;
        Some(slot)
    }

    /// Encode `frame` into the next free buffer and request transmission
    ///
    /// Returns the buffer used, or `None` without touching the controller when
    /// no buffer is free.
    pub fn submit<B: RegisterBus>(
        &mut self,
        controller: &mut Mcp2515<B>,
        origin: usize,
        frame: &CanFrame,
    ) -> Result<Option<u8>, B::Error> {
        let Some(slot) = self.next_free() else {
            return Ok(None);
        };

        let encoded = encode_controller_frame(frame);
        controller.load_tx_slot(slot, encoded.as_bytes())?;
        self.occupy(origin);
        trace!("TXB{} <- entry {}: {}", slot, origin, frame);
        Ok(Some(slot))
    }

    /// Mark `slot` as transmitted and return the queue entry it held
    pub fn complete(&mut self, slot: u8) -> Option<usize> {
        let entry = self.slots.get_mut(slot as usize)?;
        match core::mem::replace(entry, TxSlot::Free) {
            TxSlot::Occupied { origin } => Some(origin),
            TxSlot::Free => None,
        }
    }

    /// Buffers from the oldest possible request to the newest
    pub fn oldest_first(&self) -> [u8; NUM_TX_BUFFERS] {
        let n = NUM_TX_BUFFERS as u8;
        [self.cursor, (self.cursor + 1) % n, (self.cursor + 2) % n]
    }

    /// Forget every occupant and restart the rotation at buffer 0
    pub fn clear(&mut self) {
        self.slots = [TxSlot::Free; NUM_TX_BUFFERS];
        self.cursor = 0;
    }
}
