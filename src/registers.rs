//! MCP2515 register map
//!
//! Register addresses, SPI instructions and bit masks of the MCP2515 stand-alone
//! CAN controller. Only the parts the bridge touches are listed; acceptance
//! filters and masks are left at their reset values.

// ============================================================================
// SPI Instructions
// ============================================================================

pub const INSTR_WRITE: u8 = 0x02;
pub const INSTR_READ: u8 = 0x03;
pub const INSTR_BIT_MODIFY: u8 = 0x05;
pub const INSTR_READ_STATUS: u8 = 0xA0;
pub const INSTR_RESET: u8 = 0xC0;

// ============================================================================
// Register Addresses
// ============================================================================

pub const CANCTRL: u8 = 0x0F;
pub const CNF3: u8 = 0x28;
pub const CNF2: u8 = 0x29;
pub const CNF1: u8 = 0x2A;
pub const CANINTE: u8 = 0x2B;
pub const CANINTF: u8 = 0x2C;
pub const EFLG: u8 = 0x2D;
pub const TXB0CTRL: u8 = 0x30;
pub const RXB0CTRL: u8 = 0x60;
pub const RXB0SIDH: u8 = 0x61;
pub const RXB1CTRL: u8 = 0x70;
pub const RXB1SIDH: u8 = 0x71;

/// Control register of transmit buffer `n` (TXB0CTRL, TXB1CTRL, TXB2CTRL)
pub const fn txb_ctrl(n: u8) -> u8 {
    TXB0CTRL + (n << 4)
}

/// First ID register of receive buffer `n` (RXB0SIDH, RXB1SIDH)
pub const fn rxb_sidh(n: u8) -> u8 {
    if n == 0 {
        RXB0SIDH
    } else {
        RXB1SIDH
    }
}

/// Size of a transmit buffer control block, control byte included
pub const TXB_BLOCK_LEN: u8 = 14;

/// SIDH, SIDL, EID8, EID0, DLC and eight data bytes
pub const FRAME_REGISTER_LEN: usize = 13;

pub const NUM_TX_BUFFERS: usize = 3;
pub const NUM_RX_BUFFERS: usize = 2;

// ============================================================================
// Frame Register Layout
// ============================================================================

pub const SIDH: usize = 0;
pub const SIDL: usize = 1;
pub const EID8: usize = 2;
pub const EID0: usize = 3;
pub const DLC: usize = 4;
pub const DATA: usize = 5;

/// Extended identifier enable (SIDL)
pub const SIDL_EXIDE: u8 = 0x08;
/// Remote transmission request (DLC register)
pub const DLC_RTR: u8 = 0x40;
pub const DLC_MASK: u8 = 0x0F;

// ============================================================================
// TXBnCTRL
// ============================================================================

pub const TXB_TXREQ: u8 = 0x08;
pub const TXB_TXP_MASK: u8 = 0x03;

// ============================================================================
// RXBnCTRL
// ============================================================================

/// Receive standard or extended frames passing the filters; with the masks
/// left at reset that is every frame
pub const RXB_RXM_STDEXT: u8 = 0x00;
pub const RXB_RXM_MASK: u8 = 0x60;
/// Roll over into RXB1 when RXB0 is full
pub const RXB_BUKT: u8 = 0x04;

// ============================================================================
// CANCTRL
// ============================================================================

pub const MODE_NORMAL: u8 = 0x00;
pub const MODE_LOOPBACK: u8 = 0x40;
pub const MODE_LISTEN_ONLY: u8 = 0x60;
pub const MODE_CONFIG: u8 = 0x80;
pub const MODE_MASK: u8 = 0xE0;
pub const MODE_ONE_SHOT: u8 = 0x08;

// ============================================================================
// CNF1 / CNF2 / CNF3
// ============================================================================

pub const CNF1_SJW_SHIFT: u8 = 6;
pub const CNF2_BTLMODE: u8 = 0x80;
pub const CNF2_SAMPLE_3X: u8 = 0x40;
pub const CNF2_PHSEG1_SHIFT: u8 = 3;
pub const CNF3_SOF: u8 = 0x80;

// ============================================================================
// CANINTE / CANINTF
// ============================================================================

pub const RX0IF: u8 = 0x01;
pub const RX1IF: u8 = 0x02;
pub const TX0IF: u8 = 0x04;
pub const TX1IF: u8 = 0x08;
pub const TX2IF: u8 = 0x10;
pub const ERRIF: u8 = 0x20;

pub const NO_INT: u8 = 0x00;
pub const ALL_FRAME_INT: u8 = RX0IF | RX1IF | TX0IF | TX1IF | TX2IF | ERRIF;

/// Receive-complete flag of receive buffer `n`
pub const fn rx_flag(n: u8) -> u8 {
    RX0IF << n
}

/// Transmit-complete flag of transmit buffer `n`
pub const fn tx_flag(n: u8) -> u8 {
    TX0IF << n
}

// ============================================================================
// EFLG
// ============================================================================

pub const EFLG_RX1OVR: u8 = 0x80;
pub const EFLG_RX0OVR: u8 = 0x40;
pub const EFLG_TXBO: u8 = 0x20;
pub const EFLG_TXEP: u8 = 0x10;
pub const EFLG_RXEP: u8 = 0x08;
pub const EFLG_TXWAR: u8 = 0x04;
pub const EFLG_RXWAR: u8 = 0x02;

// ============================================================================
// READ STATUS
// ============================================================================

pub const STATUS_RX0IF: u8 = 0x01;
pub const STATUS_RX1IF: u8 = 0x02;
