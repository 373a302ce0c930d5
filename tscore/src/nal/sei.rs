//! Supplemental Enhancement Information (NAL type 6) parsing.

use crate::bitreader::BitReader;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub recovery_frame_cnt: u32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
    pub changing_slice_group_idc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
    pub recovery_point: Option<RecoveryPoint>,
}

/// One SEI NAL unit can carry several `sei_message()`s back to back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sei {
    pub messages: Vec<SeiMessage>,
}

fn read_ff_terminated_value(r: &mut BitReader) -> Result<u32> {
    let mut value = 0u32;
    loop {
        let byte = r.read_bits_into_byte(8)? as u32;
        value += byte;
        if byte != 0xFF {
            break;
        }
    }
    Ok(value)
}

impl Sei {
    /// `rbsp` excludes the NAL header byte.
    pub fn parse(rbsp: &[u8]) -> Result<Sei> {
        let mut r = BitReader::new(rbsp);
        let mut messages = Vec::new();

        // rbsp_trailing_bits begins with a single 1 bit followed by zeroes;
        // a byte-aligned reader with no remaining payload bytes (or only the
        // stop bit left) signals no more sei_message()s.
        while r.has_more_data() {
            let payload_type = read_ff_terminated_value(&mut r)?;
            let payload_size = read_ff_terminated_value(&mut r)?;

            let recovery_point = if payload_type == 6 {
                let recovery_frame_cnt = r.read_exp_golomb()?;
                let exact_match_flag = r.read_bit()? == 1;
                let broken_link_flag = r.read_bit()? == 1;
                let changing_slice_group_idc = r.read_bits(2)?;
                Some(RecoveryPoint {
                    recovery_frame_cnt,
                    exact_match_flag,
                    broken_link_flag,
                    changing_slice_group_idc,
                })
            } else {
                // Skip the payload bytes of types we don't otherwise decode.
                for _ in 0..payload_size {
                    if !r.has_more_data() {
                        break;
                    }
                    r.skip_bits(8)?;
                }
                None
            };

            messages.push(SeiMessage {
                payload_type,
                payload_size,
                recovery_point,
            });

            // Stop once only the rbsp_trailing_bits stop bit (and padding)
            // remain: fewer than 8 bits left.
            if rbsp.len() * 8 - r.bits_consumed() < 8 {
                break;
            }
        }

        Ok(Sei { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_ff_terminated(out: &mut Vec<u8>, mut value: u32) {
        while value >= 0xFF {
            out.push(0xFF);
            value -= 0xFF;
        }
        out.push(value as u8);
    }

    #[test]
    fn parses_recovery_point_message() {
        let mut rbsp = Vec::new();
        append_ff_terminated(&mut rbsp, 6); // payload_type = recovery point
        append_ff_terminated(&mut rbsp, 1); // payload_size (1 byte, loose but enough bits)
        // recovery_frame_cnt=0 (ue '1'), exact_match=1, broken_link=0,
        // changing_slice_group_idc=0b01, then stop bit + padding.
        rbsp.push(0b1_1_0_01_100);
        let sei = Sei::parse(&rbsp).unwrap();
        assert_eq!(sei.messages.len(), 1);
        let rp = sei.messages[0].recovery_point.unwrap();
        assert_eq!(rp.recovery_frame_cnt, 0);
        assert!(rp.exact_match_flag);
        assert!(!rp.broken_link_flag);
        assert_eq!(rp.changing_slice_group_idc, 1);
    }

    #[test]
    fn long_payload_type_uses_ff_continuation() {
        let mut rbsp = Vec::new();
        append_ff_terminated(&mut rbsp, 300); // payload_type: 0xFF + 0x2D
        append_ff_terminated(&mut rbsp, 2); // payload_size = 2 bytes
        rbsp.push(0xAA);
        rbsp.push(0x80); // stop bit
        let sei = Sei::parse(&rbsp).unwrap();
        assert_eq!(sei.messages.len(), 1);
        assert_eq!(sei.messages[0].payload_type, 300);
        assert_eq!(sei.messages[0].payload_size, 2);
        assert!(sei.messages[0].recovery_point.is_none());
    }

    #[test]
    fn empty_payload_yields_no_messages() {
        let rbsp: Vec<u8> = vec![0x80];
        let sei = Sei::parse(&rbsp).unwrap();
        assert!(sei.messages.is_empty());
    }
}
