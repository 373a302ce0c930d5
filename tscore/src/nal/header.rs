//! NAL header byte: `forbidden_zero_bit` (1), `nal_ref_idc` (2),
//! `nal_unit_type` (5).

use crate::error::{Error, Result};

/// NAL unit types this toolkit recognizes by number (H.264 §7.4.1 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    NonIdrSlice,
    DataPartitionA,
    DataPartitionB,
    DataPartitionC,
    IdrSlice,
    Sei,
    SeqParameterSet,
    PicParameterSet,
    AccessUnitDelimiter,
    EndOfSeq,
    EndOfStream,
    Filler,
    SeqParameterSetExtension,
    PrefixNalUnit,
    SubsetSeqParameterSet,
    SliceLayerExtension,
    Reserved(u8),
    Unspecified(u8),
}

impl UnitType {
    pub fn from_id(id: u8) -> UnitType {
        use UnitType::*;
        match id {
            1 => NonIdrSlice,
            2 => DataPartitionA,
            3 => DataPartitionB,
            4 => DataPartitionC,
            5 => IdrSlice,
            6 => Sei,
            7 => SeqParameterSet,
            8 => PicParameterSet,
            9 => AccessUnitDelimiter,
            10 => EndOfSeq,
            11 => EndOfStream,
            12 => Filler,
            13 => SeqParameterSetExtension,
            14 => PrefixNalUnit,
            15 => SubsetSeqParameterSet,
            19..=21 => SliceLayerExtension,
            16..=18 | 22 | 23 => Reserved(id),
            _ => Unspecified(id),
        }
    }

    pub fn id(self) -> u8 {
        use UnitType::*;
        match self {
            NonIdrSlice => 1,
            DataPartitionA => 2,
            DataPartitionB => 3,
            DataPartitionC => 4,
            IdrSlice => 5,
            Sei => 6,
            SeqParameterSet => 7,
            PicParameterSet => 8,
            AccessUnitDelimiter => 9,
            EndOfSeq => 10,
            EndOfStream => 11,
            Filler => 12,
            SeqParameterSetExtension => 13,
            PrefixNalUnit => 14,
            SubsetSeqParameterSet => 15,
            SliceLayerExtension => 19,
            Reserved(id) | Unspecified(id) => id,
        }
    }

    pub fn is_vcl(self) -> bool {
        matches!(self, UnitType::NonIdrSlice | UnitType::IdrSlice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_ref_idc: u8,
    pub nal_unit_type: UnitType,
}

impl NalHeader {
    /// Parses the first byte of a NAL unit's payload (i.e. `es_unit.start_code`
    /// in the ES-unit data model). Fails hard on `forbidden_zero_bit != 0`,
    /// which commonly indicates accidental MPEG-2 data.
    pub fn parse(byte: u8) -> Result<NalHeader> {
        if byte & 0x80 != 0 {
            return Err(Error::ForbiddenBitSet);
        }
        Ok(NalHeader {
            nal_ref_idc: (byte >> 5) & 0x03,
            nal_unit_type: UnitType::from_id(byte & 0x1F),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_idr_slice_header() {
        // forbidden=0, ref_idc=3, type=5 (IDR)
        let byte = 0b0_11_00101;
        let h = NalHeader::parse(byte).unwrap();
        assert_eq!(h.nal_ref_idc, 3);
        assert_eq!(h.nal_unit_type, UnitType::IdrSlice);
    }

    #[test]
    fn forbidden_bit_is_hard_error() {
        let byte = 0b1_00_00101;
        assert!(NalHeader::parse(byte).is_err());
    }
}
