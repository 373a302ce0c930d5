//! H.264 access-unit assembler.
//!
//! Grounded in the same pull-based "read one unit, decide where it goes"
//! shape as the ES-unit scanner, generalized to the access-unit state
//! machine H.264 7.4.1.2.4 describes. `earlier_primary_start` is always a
//! value-copy summary (never a reference into a NAL that might be dropped
//! with its access unit) to avoid a pointer-graph back-reference into freed
//! memory.

use std::collections::VecDeque;

use crate::es::Scanner;
use crate::io::{ByteSource, Logger};
use crate::nal::{self, NalUnit, PicParameterSet, SeqParameterSet, UnitType};
use crate::params::ParamSetDict;
use crate::error::{Error, Result};

/// Value-copy summary of the fields that distinguish one primary coded
/// picture from the next (H.264 §7.4.1.2.4). Copied out of a NAL unit the
/// moment it is adopted as a primary start; never a pointer into the NAL
/// itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryStartSummary {
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub nal_ref_idc: u8,
    pub pic_order_cnt_type: u32,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt: [Option<i32>; 2],
    pub is_idr: bool,
    pub idr_pic_id: Option<u32>,
}

impl PrimaryStartSummary {
    fn from_nal(nal: &NalUnit, pic_order_cnt_type: u32) -> Option<PrimaryStartSummary> {
        let slice = nal.slice()?;
        Some(PrimaryStartSummary {
            frame_num: slice.frame_num,
            field_pic_flag: slice.field_pic_flag,
            bottom_field_flag: slice.bottom_field_flag,
            nal_ref_idc: nal.nal_ref_idc,
            pic_order_cnt_type,
            pic_order_cnt_lsb: slice.pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom: slice.delta_pic_order_cnt_bottom,
            delta_pic_order_cnt: slice.delta_pic_order_cnt,
            is_idr: nal.nal_unit_type == UnitType::IdrSlice,
            idr_pic_id: slice.idr_pic_id,
        })
    }
}

/// `{index, nal_units, primary_start, started_primary_picture, frame_num,
/// field_pic_flag, bottom_field_flag, ignored_broken_NAL_units}`.
#[derive(Debug, Clone, Default)]
pub struct AccessUnit {
    pub index: u32,
    pub nal_units: Vec<NalUnit>,
    /// Index into `nal_units` of the primary-start NAL, validated at
    /// construction time (a non-owning back-reference).
    pub primary_start: Option<usize>,
    pub started_primary_picture: bool,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub ignored_broken_nal_units: u32,
}

impl AccessUnit {
    fn fresh(index: u32) -> AccessUnit {
        AccessUnit {
            index,
            ..Default::default()
        }
    }

    pub fn primary_nal(&self) -> Option<&NalUnit> {
        self.primary_start.map(|i| &self.nal_units[i])
    }

    /// Start offset and total byte length of this access unit's NAL units in
    /// the original stream, used by the reverse indexer to record
    /// `(start_file, start_pkt, data_len)`. `None` for an empty AU.
    pub fn byte_range(&self) -> Option<(crate::offset::FileOffset, usize)> {
        let first = self.nal_units.first()?;
        let last = self.nal_units.last()?;
        let len = (last.start_posn.infile + last.raw.len() as u64) - first.start_posn.infile;
        Some((first.start_posn, len as usize))
    }

    /// True iff every slice NAL in this access unit is an I slice
    /// (`slice_type % 5 == 2`, H.264 Table 7-6), used by the reverse
    /// indexer's `maybe_remember`.
    pub fn all_slices_are_i(&self) -> bool {
        self.nal_units
            .iter()
            .filter_map(|n| n.slice())
            .all(|s| s.slice_type % 5 == 2)
    }
}

/// The eight first-VCL-of-new-primary-picture rules (H.264 §7.4.1.2.4), in
/// standard order; returns the first rule that fires along with its static
/// `start_reason`.
fn first_vcl_of_new_primary(
    earlier: &PrimaryStartSummary,
    cur: &PrimaryStartSummary,
) -> Option<&'static str> {
    if cur.frame_num != earlier.frame_num {
        return Some("Frame number differs");
    }
    if cur.field_pic_flag != earlier.field_pic_flag {
        return Some("field_pic_flag differs");
    }
    if cur.field_pic_flag
        && earlier.field_pic_flag
        && cur.bottom_field_flag != earlier.bottom_field_flag
    {
        return Some("bottom_field_flag differs");
    }
    if cur.nal_ref_idc != earlier.nal_ref_idc && (cur.nal_ref_idc == 0 || earlier.nal_ref_idc == 0)
    {
        return Some("nal_ref_idc zero-ness changed");
    }
    if cur.pic_order_cnt_type == 0
        && earlier.pic_order_cnt_type == 0
        && (cur.pic_order_cnt_lsb != earlier.pic_order_cnt_lsb
            || cur.delta_pic_order_cnt_bottom != earlier.delta_pic_order_cnt_bottom)
    {
        return Some("pic_order_cnt_type 0 fields differ");
    }
    if cur.pic_order_cnt_type == 1
        && earlier.pic_order_cnt_type == 1
        && cur.delta_pic_order_cnt != earlier.delta_pic_order_cnt
    {
        return Some("pic_order_cnt_type 1 fields differ");
    }
    if cur.is_idr != earlier.is_idr {
        return Some("IDR-ness differs");
    }
    if cur.is_idr && earlier.is_idr && cur.idr_pic_id != earlier.idr_pic_id {
        return Some("idr_pic_id differs");
    }
    None
}

/// Per-stream assembler state: `{pending_nal, pending_list,
/// earlier_primary_start, end_of_sequence, end_of_stream,
/// access_unit_index}`.
pub struct Assembler<S: ByteSource> {
    scanner: Scanner<S>,
    sps_dict: ParamSetDict<SeqParameterSet>,
    pps_dict: ParamSetDict<PicParameterSet>,
    pending_nal: Option<NalUnit>,
    pending_list: VecDeque<NalUnit>,
    earlier_primary_start: Option<PrimaryStartSummary>,
    pub end_of_sequence: Option<NalUnit>,
    pub end_of_stream: Option<NalUnit>,
    access_unit_index: u32,
    no_more_data: bool,
}

impl<S: ByteSource> Assembler<S> {
    pub fn new(src: S) -> Self {
        Assembler {
            scanner: Scanner::new(src),
            sps_dict: ParamSetDict::new(),
            pps_dict: ParamSetDict::new(),
            pending_nal: None,
            pending_list: VecDeque::new(),
            earlier_primary_start: None,
            end_of_sequence: None,
            end_of_stream: None,
            access_unit_index: 0,
            no_more_data: false,
        }
    }

    fn next_nal(&mut self, logger: &mut dyn Logger) -> Result<Option<NalUnit>> {
        if let Some(n) = self.pending_nal.take() {
            return Ok(Some(n));
        }
        loop {
            match self.scanner.next_unit() {
                Ok(Some(unit)) => {
                    return Ok(Some(nal::decode(
                        &unit,
                        &mut self.sps_dict,
                        &mut self.pps_dict,
                        logger,
                    )?))
                }
                Ok(None) => return Ok(None),
                Err(Error::BrokenUnit(msg)) => {
                    logger.message(&format!("ignoring broken ES unit: {}", msg));
                    return Err(Error::BrokenUnit(msg));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn start_new_current(&self) -> AccessUnit {
        AccessUnit::fresh(self.access_unit_index)
    }

    fn adopt_pending_list_into(&mut self, au: &mut AccessUnit) {
        while let Some(nal) = self.pending_list.pop_front() {
            au.nal_units.push(nal);
        }
    }

    /// Drives `{fresh, accumulating, terminal}` forward by one access unit;
    /// returns `Ok(None)` once the stream (and any final partial AU) is
    /// exhausted.
    pub fn get_next_access_unit(&mut self, logger: &mut dyn Logger) -> Result<Option<AccessUnit>> {
        if self.no_more_data && self.pending_nal.is_none() {
            return Ok(None);
        }

        let mut current = self.start_new_current();
        self.adopt_pending_list_into(&mut current);

        loop {
            let nal = match self.next_nal(logger) {
                Ok(Some(n)) => n,
                Ok(None) => {
                    self.no_more_data = true;
                    if current.nal_units.is_empty() {
                        return Ok(None);
                    }
                    self.access_unit_index += 1;
                    return Ok(Some(current));
                }
                Err(Error::BrokenUnit(_)) => {
                    current.ignored_broken_nal_units += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match nal.nal_unit_type {
                UnitType::NonIdrSlice | UnitType::IdrSlice => {
                    let redundant = nal
                        .slice()
                        .map(|s| s.redundant_pic_cnt > 0)
                        .unwrap_or(false);
                    if redundant {
                        logger.message("dropping redundant slice (redundant_pic_cnt > 0)");
                        continue;
                    }
                    if !current.started_primary_picture {
                        if !nal.decoded {
                            logger.message(
                                "dropping VCL NAL that cannot start a picture (no active param sets)",
                            );
                            continue;
                        }
                        let pic_order_cnt_type = nal
                            .slice()
                            .map(|s| {
                                if s.pic_order_cnt_lsb.is_some() {
                                    0
                                } else if s.delta_pic_order_cnt[0].is_some() {
                                    1
                                } else {
                                    2
                                }
                            })
                            .unwrap_or(2);
                        let summary = PrimaryStartSummary::from_nal(&nal, pic_order_cnt_type);
                        current.frame_num = nal.slice().map(|s| s.frame_num).unwrap_or(0);
                        current.field_pic_flag = nal.slice().map(|s| s.field_pic_flag).unwrap_or(false);
                        current.bottom_field_flag =
                            nal.slice().map(|s| s.bottom_field_flag).unwrap_or(false);
                        current.nal_units.push(nal);
                        current.primary_start = Some(current.nal_units.len() - 1);
                        current.started_primary_picture = true;
                        self.earlier_primary_start = summary;
                    } else {
                        let pic_order_cnt_type = nal
                            .slice()
                            .map(|s| {
                                if s.pic_order_cnt_lsb.is_some() {
                                    0
                                } else if s.delta_pic_order_cnt[0].is_some() {
                                    1
                                } else {
                                    2
                                }
                            })
                            .unwrap_or(2);
                        let summary = PrimaryStartSummary::from_nal(&nal, pic_order_cnt_type);
                        let starts_new = match (&self.earlier_primary_start, summary) {
                            (Some(earlier), Some(cur)) => first_vcl_of_new_primary(earlier, &cur),
                            _ => None,
                        };
                        if let Some(reason) = starts_new {
                            let mut nal = nal;
                            nal.starts_picture_decided = true;
                            nal.starts_picture = true;
                            nal.start_reason = reason;
                            self.earlier_primary_start = summary;
                            self.pending_nal = Some(nal);
                            self.access_unit_index += 1;
                            return Ok(Some(current));
                        } else {
                            current.nal_units.push(nal);
                        }
                    }
                }
                UnitType::AccessUnitDelimiter => {
                    if current.started_primary_picture {
                        self.pending_nal = Some(nal);
                        self.access_unit_index += 1;
                        return Ok(Some(current));
                    } else {
                        current.nal_units.push(nal);
                    }
                }
                UnitType::Sei => {
                    if current.started_primary_picture {
                        self.pending_nal = Some(nal);
                        self.access_unit_index += 1;
                        return Ok(Some(current));
                    } else {
                        current.nal_units.push(nal);
                    }
                }
                UnitType::SeqParameterSet
                | UnitType::PicParameterSet
                | UnitType::SeqParameterSetExtension
                | UnitType::PrefixNalUnit
                | UnitType::SubsetSeqParameterSet
                | UnitType::Reserved(_) => {
                    if current.started_primary_picture {
                        self.pending_list.push_back(nal);
                    } else {
                        current.nal_units.push(nal);
                    }
                }
                UnitType::EndOfSeq => {
                    if !self.pending_list.is_empty() {
                        logger.message(&format!(
                            "end_of_seq: discarding {} unattached pending NAL(s)",
                            self.pending_list.len()
                        ));
                        self.pending_list.clear();
                    }
                    self.end_of_sequence = Some(nal);
                    self.access_unit_index += 1;
                    return Ok(Some(current));
                }
                UnitType::EndOfStream => {
                    if !self.pending_list.is_empty() {
                        logger.message(&format!(
                            "end_of_stream: discarding {} unattached pending NAL(s)",
                            self.pending_list.len()
                        ));
                        self.pending_list.clear();
                    }
                    self.end_of_stream = Some(nal);
                    self.no_more_data = true;
                    self.access_unit_index += 1;
                    return Ok(Some(current));
                }
                _ => {
                    // Filler, Unspecified, SliceLayerExtension etc: ignored.
                }
            }
        }
    }
}

/// Merges an H.264 field-pair into a single frame access unit, or reports
/// `LostFieldSync` per the four-case matcher below.
pub fn get_next_h264_frame<S: ByteSource>(
    assembler: &mut Assembler<S>,
    logger: &mut dyn Logger,
) -> Result<Option<AccessUnit>> {
    let first = loop {
        match assembler.get_next_access_unit(logger)? {
            Some(au) if au.started_primary_picture => break au,
            Some(_) => continue,
            None => return Ok(None),
        }
    };

    if !first.field_pic_flag {
        return Ok(Some(first));
    }

    match_second_field(assembler, logger, first, true)
}

fn match_second_field<S: ByteSource>(
    assembler: &mut Assembler<S>,
    logger: &mut dyn Logger,
    first: AccessUnit,
    allow_retry: bool,
) -> Result<Option<AccessUnit>> {
    let second = loop {
        match assembler.get_next_access_unit(logger)? {
            Some(au) if au.started_primary_picture => break au,
            Some(_) => continue,
            None => return Err(Error::LostFieldSync),
        }
    };

    if !second.field_pic_flag {
        logger.message("discarding unpaired field (next AU is a frame)");
        return Ok(Some(second));
    }

    if second.frame_num == first.frame_num {
        let mut merged = first;
        merged.ignored_broken_nal_units += second.ignored_broken_nal_units;
        merged.field_pic_flag = false;
        merged.nal_units.extend(second.nal_units);
        return Ok(Some(merged));
    }

    if allow_retry {
        logger.message("dropping field with no pair, retrying with next field as candidate");
        return match_second_field(assembler, logger, second, false);
    }

    Err(Error::LostFieldSync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{SliceSource, StderrLogger};
    use crate::nal::rbsp::insert_emulation_prevention;

    struct BitWriter {
        bytes: Vec<u8>,
        cur: u8,
        nbits: u8,
    }
    impl BitWriter {
        fn new() -> Self {
            BitWriter { bytes: Vec::new(), cur: 0, nbits: 0 }
        }
        fn put_bit(&mut self, b: u32) {
            self.cur = (self.cur << 1) | (b as u8 & 1);
            self.nbits += 1;
            if self.nbits == 8 {
                self.bytes.push(self.cur);
                self.cur = 0;
                self.nbits = 0;
            }
        }
        fn put_bits(&mut self, v: u32, n: u32) {
            for i in (0..n).rev() {
                self.put_bit((v >> i) & 1);
            }
        }
        fn put_ue(&mut self, v: u32) {
            let v = v + 1;
            let bits = 32 - v.leading_zeros();
            for _ in 0..(bits - 1) {
                self.put_bit(0);
            }
            for i in (0..bits).rev() {
                self.put_bit((v >> i) & 1);
            }
        }
        fn finish(mut self) -> Vec<u8> {
            if self.nbits > 0 {
                self.cur <<= 8 - self.nbits;
                self.bytes.push(self.cur);
            }
            self.bytes
        }
    }

    fn sps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_bits(77, 8);
        w.put_bit(0);
        w.put_bit(1);
        w.put_bit(0);
        w.put_bits(0, 5);
        w.put_bits(30, 8);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(1);
        w.put_bit(0);
        w.put_ue(10);
        w.put_ue(7);
        w.put_bit(1);
        w.put_bit(1);
        w.put_bit(0);
        w.put_bit(0);
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x67];
        nal.extend(insert_emulation_prevention(&rbsp));
        nal
    }

    fn pps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(0);
        w.put_bit(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(0);
        w.put_bits(0, 2);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(0);
        w.put_bit(0);
        w.put_bit(0);
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x68];
        nal.extend(insert_emulation_prevention(&rbsp));
        nal
    }

    fn aud_nal() -> Vec<u8> {
        vec![0, 0, 1, 0x09, 0xF0]
    }

    fn sei_recovery_nal() -> Vec<u8> {
        // payload_type=6, payload_size=1, recovery_frame_cnt=0(ue '1'),
        // exact_match=1, broken_link=0, changing_slice_group_idc=0, stop bit.
        let payload = [0x06u8, 0x01, 0b1_1_0_00_100];
        let mut nal = vec![0, 0, 1, 0x06];
        nal.extend_from_slice(&payload);
        nal
    }

    fn idr_slice_nal(frame_num_bits: u32, idr_pic_id: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(7);
        w.put_ue(0);
        w.put_bits(frame_num_bits, 4);
        w.put_ue(idr_pic_id);
        w.put_bits(0, 4);
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x65];
        nal.extend(insert_emulation_prevention(&rbsp));
        nal
    }

    fn non_idr_slice_nal(frame_num_bits: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(2);
        w.put_ue(0);
        w.put_bits(frame_num_bits, 4);
        w.put_bits(0, 4); // pic_order_cnt_lsb
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x41]; // ref_idc=2, type=1
        nal.extend(insert_emulation_prevention(&rbsp));
        nal
    }

    #[test]
    fn idr_access_unit_framing() {
        let mut stream = Vec::new();
        stream.extend(aud_nal());
        stream.extend(sps_nal());
        stream.extend(pps_nal());
        stream.extend(sei_recovery_nal());
        stream.extend(idr_slice_nal(0, 3));
        stream.extend(idr_slice_nal(0, 3));
        stream.extend(aud_nal());

        let mut logger = StderrLogger::default();
        let mut asm = Assembler::new(SliceSource::new(&stream));
        let au = asm.get_next_access_unit(&mut logger).unwrap().unwrap();
        assert_eq!(au.nal_units.len(), 6);
        assert!(au.started_primary_picture);
        assert_eq!(
            au.primary_nal().unwrap().nal_unit_type,
            UnitType::IdrSlice
        );

        let au2 = asm.get_next_access_unit(&mut logger).unwrap().unwrap();
        assert_eq!(au2.nal_units.len(), 1);
        assert_eq!(au2.nal_units[0].nal_unit_type, UnitType::AccessUnitDelimiter);

        assert!(asm.get_next_access_unit(&mut logger).unwrap().is_none());
    }

    #[test]
    fn frame_num_change_splits_access_units() {
        let mut stream = Vec::new();
        stream.extend(sps_nal());
        stream.extend(pps_nal());
        stream.extend(non_idr_slice_nal(5));
        stream.extend(non_idr_slice_nal(6));

        let mut logger = StderrLogger::default();
        let mut asm = Assembler::new(SliceSource::new(&stream));
        let au1 = asm.get_next_access_unit(&mut logger).unwrap().unwrap();
        assert_eq!(au1.frame_num, 5);

        let au2 = asm.get_next_access_unit(&mut logger).unwrap().unwrap();
        assert_eq!(au2.frame_num, 6);
        let primary = au2.primary_nal().unwrap();
        assert!(primary.starts_picture_decided);
        assert_eq!(primary.start_reason, "Frame number differs");

        assert!(asm.get_next_access_unit(&mut logger).unwrap().is_none());
    }
}
