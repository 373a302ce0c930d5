//! H.262 / AVS picture assembler.
//!
//! Unlike the H.264 access-unit assembler this one groups by start-code
//! *kind* rather than by comparing decoded slice-header fields: H.262/AVS
//! start codes are self-describing, so "new frame-kind item arrives" is
//! itself the boundary signal, with the same pending-item carry-over shape
//! used by [`crate::access_unit::Assembler`].

use crate::error::{Error, Result};
use crate::es::{EsUnit, Scanner};
use crate::io::ByteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standard {
    H262,
    Avs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    SequenceHeader,
    /// H.262 picture start code (0x00), or AVS I-frame (0xB3).
    Picture,
    /// AVS-only P/B-frame start code (0xB6).
    PbFrame,
    Slice,
    Extension,
    /// H.262-only GOP start code (0xB8).
    Gop,
    SequenceEnd,
    /// AVS-only user-data start code (0xB2).
    UserData,
    Other,
}

impl ItemKind {
    pub fn is_frame_kind(self) -> bool {
        matches!(self, ItemKind::Picture | ItemKind::PbFrame)
    }
}

pub fn classify(standard: Standard, start_code: u8) -> ItemKind {
    match standard {
        Standard::H262 => match start_code {
            0xB3 => ItemKind::SequenceHeader,
            0x00 => ItemKind::Picture,
            0x01..=0xAF => ItemKind::Slice,
            0xB5 => ItemKind::Extension,
            0xB8 => ItemKind::Gop,
            0xB7 => ItemKind::SequenceEnd,
            _ => ItemKind::Other,
        },
        Standard::Avs => match start_code {
            0xB0 => ItemKind::SequenceHeader,
            0xB1 => ItemKind::SequenceEnd,
            0xB2 => ItemKind::UserData,
            0xB3 => ItemKind::Picture,
            0xB5 => ItemKind::Extension,
            0xB6 => ItemKind::PbFrame,
            0x00..=0xAF => ItemKind::Slice,
            _ => ItemKind::Other,
        },
    }
}

pub const AVS_I_PICTURE_CODING: u8 = 1;
pub const AVS_P_PICTURE_CODING: u8 = 2;
pub const AVS_B_PICTURE_CODING: u8 = 3;

/// H.262 `picture_coding_type` values (ISO/IEC 13818-2 picture_header),
/// shared with AVS's numbering.
pub const H262_I_PICTURE_CODING: u8 = 1;

/// One item contributed to a [`Picture`]: its classified kind plus the ES
/// unit it came from (bulk bytes referenced by the unit's own offset and
/// length, not copied into the item).
#[derive(Debug, Clone)]
pub struct PictureItem {
    pub kind: ItemKind,
    pub unit: EsUnit,
}

/// An ordered sequence of ES units forming one sequence-header run or one
/// coded frame.
#[derive(Debug, Clone, Default)]
pub struct Picture {
    pub items: Vec<PictureItem>,
    /// `AVS_{I,P,B}_PICTURE_CODING`; `None` for H.262 (no AVS coding-type
    /// byte to read) or for a picture with no frame-kind item yet.
    pub coding_type: Option<u8>,
    pub picture_distance: u32,
}

impl Picture {
    fn fresh() -> Picture {
        Picture::default()
    }

    pub fn has_frame(&self) -> bool {
        self.items.iter().any(|i| i.kind.is_frame_kind())
    }

    /// H.262 `picture_coding_type` of this picture's frame-kind item, read
    /// directly from the picture_header (not populated by the assembler
    /// loop the way AVS's is, since H.262's picture start code 0x00 is
    /// shared by I/P/B alike — only the header bytes distinguish them).
    /// `Ok(None)` if this picture has no frame-kind item (e.g. a bare
    /// sequence-header run).
    pub fn h262_coding_type(&self) -> Result<Option<u8>> {
        let frame = self.items.iter().find(|i| i.kind.is_frame_kind());
        let frame = match frame {
            Some(f) => f,
            None => return Ok(None),
        };
        let payload = frame.unit.payload();
        if payload.len() < 2 {
            return Err(Error::BrokenUnit(
                "H.262 picture item too short to carry picture_coding_type".to_string(),
            ));
        }
        Ok(Some((payload[1] >> 3) & 0x7))
    }
}

fn avs_frame_info(kind: ItemKind, unit: &EsUnit) -> Result<(u8, u32)> {
    match kind {
        ItemKind::Picture => Ok((AVS_I_PICTURE_CODING, 0)),
        ItemKind::PbFrame => {
            if unit.data.len() < 7 {
                return Err(Error::BrokenUnit(
                    "AVS P/B-frame item too short to carry coding-type byte".to_string(),
                ));
            }
            let byte6 = unit.data[5];
            let byte7 = unit.data[6];
            let coding_type = (byte6 >> 6) & 0x3;
            let coding_type = match coding_type {
                0 | 1 => AVS_P_PICTURE_CODING,
                _ => AVS_B_PICTURE_CODING,
            };
            let picture_distance = ((byte6 as u32) << 2) | ((byte7 as u32) >> 6);
            Ok((coding_type, picture_distance))
        }
        _ => Ok((0, 0)),
    }
}

/// Pull-based assembler over a [`ByteSource`], grouping the ES-unit stream
/// into [`Picture`]s.
pub struct Assembler<S: ByteSource> {
    scanner: Scanner<S>,
    standard: Standard,
    pending: Option<PictureItem>,
}

impl<S: ByteSource> Assembler<S> {
    pub fn new(src: S, standard: Standard) -> Self {
        Assembler {
            scanner: Scanner::new(src),
            standard,
            pending: None,
        }
    }

    fn next_item(&mut self) -> Result<Option<PictureItem>> {
        if let Some(item) = self.pending.take() {
            return Ok(Some(item));
        }
        match self.scanner.next_unit()? {
            Some(unit) => {
                let kind = classify(self.standard, unit.start_code);
                Ok(Some(PictureItem { kind, unit }))
            }
            None => Ok(None),
        }
    }

    pub fn get_next_picture(&mut self) -> Result<Option<Picture>> {
        let mut current = Picture::fresh();

        loop {
            let item = match self.next_item() {
                Ok(Some(i)) => i,
                Ok(None) => {
                    if current.items.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(current));
                }
                Err(Error::BrokenUnit(_)) => continue,
                Err(e) => return Err(e),
            };

            if item.kind.is_frame_kind() {
                if current.has_frame() {
                    self.pending = Some(item);
                    return Ok(Some(current));
                }
                if self.standard == Standard::Avs {
                    let (coding_type, distance) = avs_frame_info(item.kind, &item.unit)?;
                    current.coding_type = Some(coding_type);
                    current.picture_distance = distance;
                }
                current.items.push(item);
            } else if item.kind == ItemKind::SequenceEnd {
                current.items.push(item);
                return Ok(Some(current));
            } else {
                current.items.push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    fn unit(start_code: u8, rest: &[u8]) -> Vec<u8> {
        let mut v = vec![0, 0, 1, start_code];
        v.extend_from_slice(rest);
        v
    }

    #[test]
    fn h262_groups_sequence_header_and_picture_with_slices() {
        let mut stream = Vec::new();
        stream.extend(unit(0xB3, &[1, 2, 3])); // sequence header
        stream.extend(unit(0xB5, &[4])); // extension
        stream.extend(unit(0x00, &[5, 6])); // picture
        stream.extend(unit(0x01, &[7])); // slice
        stream.extend(unit(0x02, &[8])); // slice
        stream.extend(unit(0x00, &[9])); // next picture: new frame-kind

        let mut asm = Assembler::new(SliceSource::new(&stream), Standard::H262);
        let pic1 = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic1.items.len(), 5);
        assert_eq!(pic1.items[2].kind, ItemKind::Picture);

        let pic2 = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic2.items.len(), 1);
        assert_eq!(pic2.items[0].kind, ItemKind::Picture);

        assert!(asm.get_next_picture().unwrap().is_none());
    }

    #[test]
    fn avs_i_frame_synthesizes_coding_type() {
        let mut stream = Vec::new();
        stream.extend(unit(0xB0, &[])); // sequence start
        stream.extend(unit(0xB3, &[0, 0, 0])); // I-frame
        let mut asm = Assembler::new(SliceSource::new(&stream), Standard::Avs);
        let pic = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic.coding_type, Some(AVS_I_PICTURE_CODING));
        assert_eq!(pic.picture_distance, 0);
    }

    #[test]
    fn avs_pb_frame_picture_distance() {
        // byte6 (payload[1]) = 0b01_000000 -> coding bits "01" (P), value bits 0
        // byte7 (payload[2]) = 0b11_000000 -> top 2 bits = 0b11
        let mut stream = Vec::new();
        stream.extend(unit(0xB6, &[0x00, 0b0100_0000, 0b1100_0000]));
        let mut asm = Assembler::new(SliceSource::new(&stream), Standard::Avs);
        let pic = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic.coding_type, Some(AVS_P_PICTURE_CODING));
        // byte6 = data[5] = 0b0100_0000 = 0x40; byte7 = data[6] = 0xC0
        // distance = (0x40 << 2) | (0xC0 >> 6) = 0x100 | 0x3 = 0x103
        assert_eq!(pic.picture_distance, (0x40u32 << 2) | (0xC0u32 >> 6));
    }

    #[test]
    fn h262_coding_type_reads_picture_header_bits() {
        // payload[0] = temporal_reference high bits (don't care)
        // payload[1] = 0b000_01_000 -> picture_coding_type bits (5..3) = 001 = I
        let stream = unit(0x00, &[0x00, 0b0000_1000]);
        let mut asm = Assembler::new(SliceSource::new(&stream), Standard::H262);
        let pic = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic.h262_coding_type().unwrap(), Some(H262_I_PICTURE_CODING));
    }

    #[test]
    fn sequence_end_closes_picture() {
        let mut stream = Vec::new();
        stream.extend(unit(0x00, &[1])); // picture
        stream.extend(unit(0xB7, &[])); // sequence end
        stream.extend(unit(0x00, &[2])); // next picture
        let mut asm = Assembler::new(SliceSource::new(&stream), Standard::H262);
        let pic1 = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic1.items.len(), 2);
        assert_eq!(pic1.items[1].kind, ItemKind::SequenceEnd);
        let pic2 = asm.get_next_picture().unwrap().unwrap();
        assert_eq!(pic2.items.len(), 1);
    }
}
