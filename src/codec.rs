//! Translation between host frames and MCP2515 registers
//!
//! The controller stores a frame as 13 consecutive registers: SIDH, SIDL,
//! EID8, EID0, DLC and eight data bytes. Identifier bits are spread across the
//! first four:
//!
//! ```text
//! SIDH  = SID10..SID3
//! SIDL  = SID2..SID0 | - | EXIDE | - | EID17..EID16
//! EID8  = EID15..EID8
//! EID0  = EID7..EID0
//! ```
//!
//! A 29-bit identifier places the 11 SID bits on top of the 18 EID bits.

use crate::constants::{
    CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_BUSOFF, CAN_ERR_CRTL, CAN_ERR_CRTL_RX_OVERFLOW,
    CAN_ERR_CRTL_RX_PASSIVE, CAN_ERR_CRTL_RX_WARNING, CAN_ERR_CRTL_TX_PASSIVE,
    CAN_ERR_CRTL_TX_WARNING, CAN_ERR_DLC, CAN_ERR_FLAG, CAN_MAX_DLEN, CAN_RTR_FLAG, CAN_SFF_MASK,
    GS_CAN_FLAG_OVERFLOW,
};
use crate::frame::CanFrame;
use crate::registers::{
    CNF1_SJW_SHIFT, CNF2_BTLMODE, CNF2_PHSEG1_SHIFT, CNF2_SAMPLE_3X, CNF3_SOF, DATA, DLC,
    DLC_MASK, DLC_RTR, EFLG_RX0OVR, EFLG_RX1OVR, EFLG_RXEP, EFLG_RXWAR, EFLG_TXBO, EFLG_TXEP,
    EFLG_TXWAR, EID0, EID8, FRAME_REGISTER_LEN, SIDH, SIDL, SIDL_EXIDE,
};
use crate::structures::DeviceBitTiming;

/// Raw frame as laid out in a controller transmit or receive buffer
pub type RegisterFrame = [u8; FRAME_REGISTER_LEN];

/// A frame encoded for a transmit buffer
///
/// Only the first `len` bytes are written to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrame {
    pub registers: RegisterFrame,
    pub len: usize,
}

impl EncodedFrame {
    /// The bytes to load into the transmit buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.registers[..self.len]
    }
}

/// Decode a received controller frame into a device-originated host frame
///
/// DLC values above 8 are clamped.
pub fn decode_controller_frame(buf: &RegisterFrame) -> CanFrame {
    let sid = ((buf[SIDH] as u32) << 3) | ((buf[SIDL] as u32) >> 5);

    let mut can_id = if (buf[SIDL] & SIDL_EXIDE) != 0 {
        let id = (sid << 18)
            | (((buf[SIDL] & 0x03) as u32) << 16)
            | ((buf[EID8] as u32) << 8)
            | (buf[EID0] as u32);
        (id & CAN_EFF_MASK) | CAN_EFF_FLAG
    } else {
        sid & CAN_SFF_MASK
    };
    if (buf[DLC] & DLC_RTR) != 0 {
        can_id |= CAN_RTR_FLAG;
    }

    let len = ((buf[DLC] & DLC_MASK) as usize).min(CAN_MAX_DLEN);
    let mut frame = CanFrame::new();
    frame.can_id = can_id;
    frame.can_dlc = len as u8;
    frame.data[..len].copy_from_slice(&buf[DATA..DATA + len]);
    frame
}

/// Encode a host frame for a controller transmit buffer
///
/// The ID width follows the frame's extended flag, not the ID magnitude.
/// Callers must have clamped the DLC to 8.
pub fn encode_controller_frame(frame: &CanFrame) -> EncodedFrame {
    let mut buf = [0u8; FRAME_REGISTER_LEN];

    let len = frame.data_length();
    buf[DATA..DATA + len].copy_from_slice(&frame.data[..len]);

    buf[DLC] = len as u8;
    if frame.is_remote_frame() {
        buf[DLC] |= DLC_RTR;
    }

    if frame.is_extended_id() {
        let id = frame.can_id & CAN_EFF_MASK;
        let high = (id >> 16) as u16;
        buf[EID0] = id as u8;
        buf[EID8] = (id >> 8) as u8;
        buf[SIDL] = (high & 0x03) as u8 | (((high & 0x1C) << 3) as u8) | SIDL_EXIDE;
        buf[SIDH] = (high >> 5) as u8;
    } else {
        let id = (frame.can_id & CAN_SFF_MASK) as u16;
        buf[SIDH] = (id >> 3) as u8;
        buf[SIDL] = ((id & 0x07) << 5) as u8;
    }

    EncodedFrame {
        registers: buf,
        len: DATA + len,
    }
}

/// Translate a bit timing request into CNF1, CNF2 and CNF3
///
/// Each field is written as `value - 1`. Phase segment 2 is always explicit
/// (BTLMODE) and the CLKOUT pin carries the start-of-frame signal.
pub fn bit_timing_to_registers(timing: &DeviceBitTiming, triple_sample: bool) -> [u8; 3] {
    let minus_one = |value: u32| value.wrapping_sub(1) as u8;

    let cnf1 = ((minus_one(timing.sjw) & 0x03) << CNF1_SJW_SHIFT) | (minus_one(timing.brp) & 0x3F);

    let mut cnf2 = CNF2_BTLMODE;
    if triple_sample {
        cnf2 |= CNF2_SAMPLE_3X;
    }
    cnf2 |= ((minus_one(timing.phase_seg1) & 0x07) << CNF2_PHSEG1_SHIFT)
        | (minus_one(timing.prop_seg) & 0x07);

    let cnf3 = CNF3_SOF | (minus_one(timing.phase_seg2) & 0x07);

    [cnf1, cnf2, cnf3]
}

/// Build the error frame reported for a captured EFLG value
///
/// Bus-off is reported alone. Anything else is a controller problem with the
/// individual causes in data[1].
pub fn synthesize_error_frame(error_flags: u8) -> CanFrame {
    let mut frame = CanFrame::new();
    frame.can_dlc = CAN_ERR_DLC;
    frame.can_id = CAN_ERR_FLAG;

    if (error_flags & EFLG_TXBO) != 0 {
        frame.can_id |= CAN_ERR_BUSOFF;
        return frame;
    }

    frame.can_id |= CAN_ERR_CRTL;
    let causes = [
        (EFLG_RX0OVR | EFLG_RX1OVR, CAN_ERR_CRTL_RX_OVERFLOW),
        (EFLG_TXEP, CAN_ERR_CRTL_TX_PASSIVE),
        (EFLG_RXEP, CAN_ERR_CRTL_RX_PASSIVE),
        (EFLG_TXWAR, CAN_ERR_CRTL_TX_WARNING),
        (EFLG_RXWAR, CAN_ERR_CRTL_RX_WARNING),
    ];
    for (mask, cause) in causes {
        if (error_flags & mask) != 0 {
            frame.data[1] |= cause;
        }
    }
    if (error_flags & (EFLG_RX0OVR | EFLG_RX1OVR)) != 0 {
        frame.flags |= GS_CAN_FLAG_OVERFLOW;
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GS_USB_RX_ECHO_ID;

    fn round_trip(frame: &CanFrame) -> CanFrame {
        let encoded = encode_controller_frame(frame);
        decode_controller_frame(&encoded.registers)
    }

    #[test]
    fn test_standard_id_layout() {
        let frame = CanFrame::with_data(0x7FF, &[0xAA]);
        let encoded = encode_controller_frame(&frame);
        assert_eq!(encoded.registers[SIDH], 0xFF);
        assert_eq!(encoded.registers[SIDL], 0xE0);
        assert_eq!(encoded.registers[EID8], 0);
        assert_eq!(encoded.registers[EID0], 0);
        assert_eq!(encoded.registers[DLC], 1);
        assert_eq!(encoded.as_bytes(), &[0xFF, 0xE0, 0, 0, 1, 0xAA]);
    }

    #[test]
    fn test_extended_id_layout() {
        let frame = CanFrame::with_data(0x1234_5678 | CAN_EFF_FLAG, &[]);
        let encoded = encode_controller_frame(&frame);
        // 0x12345678 = SID 0x48D, EID 0x05678
        assert_eq!(encoded.registers[SIDH], 0x91);
        assert_eq!(encoded.registers[SIDL], 0xA0 | SIDL_EXIDE);
        assert_eq!(encoded.registers[EID8], 0x56);
        assert_eq!(encoded.registers[EID0], 0x78);
        assert_eq!(encoded.len, 5);
    }

    #[test]
    fn test_small_extended_id_stays_extended() {
        let frame = CanFrame::with_data(0x5 | CAN_EFF_FLAG, &[1, 2]);
        let encoded = encode_controller_frame(&frame);
        assert_ne!(encoded.registers[SIDL] & SIDL_EXIDE, 0);
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_remote_flag_in_dlc() {
        let frame = CanFrame::remote(0x123, 3);
        let encoded = encode_controller_frame(&frame);
        assert_eq!(encoded.registers[DLC], 3 | DLC_RTR);
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let ids = [0x000, 0x001, 0x2AA, 0x555, 0x7FF];
        let ext_ids = [0x0000_0000, 0x0000_07FF, 0x0003_FFFF, 0x1555_5555, 0x1FFF_FFFF];
        let payload = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];

        for dlc in 0..=8 {
            for (std_id, ext_id) in ids.iter().zip(ext_ids.iter()) {
                for can_id in [*std_id, *ext_id | CAN_EFF_FLAG] {
                    let data = CanFrame::with_data(can_id, &payload[..dlc]);
                    assert_eq!(round_trip(&data), data, "data frame {:?}", data);

                    let remote = CanFrame::remote(can_id, dlc as u8);
                    assert_eq!(round_trip(&remote), remote, "remote frame {:?}", remote);
                }
            }
        }
    }

    #[test]
    fn test_decode_clamps_dlc() {
        let mut registers = [0u8; FRAME_REGISTER_LEN];
        registers[DLC] = 0x0F;
        registers[DATA..].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let frame = decode_controller_frame(&registers);
        assert_eq!(frame.can_dlc, 8);
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.echo_id, GS_USB_RX_ECHO_ID);
    }

    #[test]
    fn test_bit_timing_minimum() {
        let timing = DeviceBitTiming::new(1, 1, 1, 1, 1);
        let cnfs = bit_timing_to_registers(&timing, false);
        assert_eq!(cnfs, [0x00, CNF2_BTLMODE, CNF3_SOF]);
        assert_eq!(cnfs, bit_timing_to_registers(&timing, false));
    }

    #[test]
    fn test_bit_timing_fields() {
        // 125 kbit/s at 8 MHz: 16 tq, sample point 87.5 %
        let timing = DeviceBitTiming::new(2, 7, 2, 1, 2);
        let cnfs = bit_timing_to_registers(&timing, true);
        assert_eq!(cnfs[0], 0x01);
        assert_eq!(cnfs[1], CNF2_BTLMODE | CNF2_SAMPLE_3X | (6 << 3) | 1);
        assert_eq!(cnfs[2], CNF3_SOF | 1);

        let cnfs = bit_timing_to_registers(&DeviceBitTiming::new(8, 8, 8, 4, 64), false);
        assert_eq!(cnfs, [0xFF, 0xBF, 0x87]);
    }

    #[test]
    fn test_error_frame_rx_overflow() {
        let frame = synthesize_error_frame(EFLG_RX0OVR);
        assert_eq!(frame.can_id, CAN_ERR_FLAG | CAN_ERR_CRTL);
        assert_eq!(frame.flags, GS_CAN_FLAG_OVERFLOW);
        assert_eq!(frame.data[1], CAN_ERR_CRTL_RX_OVERFLOW);
        assert_eq!(frame.can_dlc, CAN_ERR_DLC);
        assert_eq!(frame.echo_id, GS_USB_RX_ECHO_ID);

        assert_eq!(synthesize_error_frame(EFLG_RX1OVR), frame);
    }

    #[test]
    fn test_error_frame_bus_off() {
        let frame = synthesize_error_frame(EFLG_TXBO | EFLG_TXEP | EFLG_RX0OVR);
        assert_eq!(frame.can_id, CAN_ERR_FLAG | CAN_ERR_BUSOFF);
        assert_eq!(frame.data, [0; 8]);
        assert_eq!(frame.flags, 0);
    }

    #[test]
    fn test_error_frame_sub_causes() {
        let cases = [
            (EFLG_TXEP, CAN_ERR_CRTL_TX_PASSIVE),
            (EFLG_RXEP, CAN_ERR_CRTL_RX_PASSIVE),
            (EFLG_TXWAR, CAN_ERR_CRTL_TX_WARNING),
            (EFLG_RXWAR, CAN_ERR_CRTL_RX_WARNING),
        ];
        for (flag, cause) in cases {
            let frame = synthesize_error_frame(flag);
            assert_eq!(frame.can_id, CAN_ERR_FLAG | CAN_ERR_CRTL);
            assert_eq!(frame.data[1], cause);
            assert_eq!(frame.flags, 0);
        }

        let all = synthesize_error_frame(EFLG_TXEP | EFLG_RXEP | EFLG_TXWAR | EFLG_RXWAR);
        assert_eq!(all.data[1], 0x3C);
    }
}
