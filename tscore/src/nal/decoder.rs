//! NAL-unit decoding dispatch.
//!
//! Builds a [`NalUnit`] from a scanned [`EsUnit`], decoding the RBSP payload
//! into the right variant by `nal_unit_type` and populating the dictionary
//! entries SPS/PPS NALs contribute. Slice NALs are only fully decoded when
//! their PPS (and its SPS) are already in the dictionaries: for a slice NAL,
//! `decoded` implies the active SPS was present in the dictionaries at parse
//! time.

use crate::es::EsUnit;
use crate::error::{Error, Result};
use crate::io::Logger;
use crate::nal::header::{NalHeader, UnitType};
use crate::nal::pps::PicParameterSet;
use crate::nal::rbsp;
use crate::nal::sei::{RecoveryPoint, Sei};
use crate::nal::slice::SliceHeader;
use crate::nal::sps::SeqParameterSet;
use crate::offset::FileOffset;
use crate::params::ParamSetDict;

#[derive(Debug, Clone, PartialEq)]
pub enum NalPayload {
    Slice(SliceHeader),
    Sps(SeqParameterSet),
    Pps(PicParameterSet),
    SeiRecovery(RecoveryPoint),
    Other,
}

/// A decoded NAL unit plus the access-unit assembler's derived caches.
#[derive(Debug, Clone, PartialEq)]
pub struct NalUnit {
    pub nal_ref_idc: u8,
    pub nal_unit_type: UnitType,
    pub raw: Vec<u8>,
    pub start_posn: FileOffset,
    pub payload: NalPayload,
    pub decoded: bool,
    /// Set once the access-unit assembler has evaluated whether this NAL
    /// starts a new primary picture; `starts_picture`/`start_reason` are
    /// only meaningful once this is `true`.
    pub starts_picture_decided: bool,
    pub starts_picture: bool,
    pub start_reason: &'static str,
}

impl NalUnit {
    pub fn is_vcl(&self) -> bool {
        self.nal_unit_type.is_vcl()
    }

    pub fn slice(&self) -> Option<&SliceHeader> {
        match &self.payload {
            NalPayload::Slice(s) => Some(s),
            _ => None,
        }
    }
}

/// Decodes one scanned ES unit as an H.264 NAL unit.
///
/// `sps_dict`/`pps_dict` are consulted (slice NALs) and updated in place
/// (SPS/PPS NALs) as a side effect, using the parameter dictionary's
/// insert-or-overwrite semantics.
pub fn decode(
    unit: &EsUnit,
    sps_dict: &mut ParamSetDict<SeqParameterSet>,
    pps_dict: &mut ParamSetDict<PicParameterSet>,
    logger: &mut dyn Logger,
) -> Result<NalUnit> {
    let header = NalHeader::parse(unit.start_code)?;
    let rbsp = rbsp::to_rbsp(unit.payload());

    let (payload, decoded) = match header.nal_unit_type {
        UnitType::SeqParameterSet => {
            let (sps, warn_unsupported) = SeqParameterSet::parse(&rbsp)?;
            if warn_unsupported {
                logger.message(&Error::ProfileUnsupported(sps.profile_idc).to_string());
            }
            sps_dict.remember(
                sps.seq_parameter_set_id,
                sps,
                unit.start_posn,
                unit.data.len(),
            );
            (NalPayload::Sps(sps), true)
        }
        UnitType::PicParameterSet => {
            let pps = PicParameterSet::parse(&rbsp)?;
            pps_dict.remember(
                pps.pic_parameter_set_id,
                pps,
                unit.start_posn,
                unit.data.len(),
            );
            (NalPayload::Pps(pps), true)
        }
        UnitType::Sei => {
            let sei = Sei::parse(&rbsp)?;
            match sei.messages.into_iter().find_map(|m| m.recovery_point) {
                Some(rp) => (NalPayload::SeiRecovery(rp), true),
                None => (NalPayload::Other, true),
            }
        }
        UnitType::NonIdrSlice | UnitType::IdrSlice => {
            // Probe pic_parameter_set_id first; only the first three fields
            // are readable without a dictionary lookup.
            let probe = SliceHeader::parse(&rbsp, header.nal_unit_type, None, None)?;
            let pps = pps_dict.lookup(probe.pic_parameter_set_id);
            let sps = pps.and_then(|p| sps_dict.lookup(p.seq_parameter_set_id));
            match (sps, pps) {
                (Some(sps), Some(pps)) => {
                    let slice = SliceHeader::parse(&rbsp, header.nal_unit_type, Some(sps), Some(pps))?;
                    (NalPayload::Slice(slice), true)
                }
                _ => (NalPayload::Slice(probe), false),
            }
        }
        _ => (NalPayload::Other, false),
    };

    Ok(NalUnit {
        nal_ref_idc: header.nal_ref_idc,
        nal_unit_type: header.nal_unit_type,
        raw: unit.data.clone(),
        start_posn: unit.start_posn,
        payload,
        decoded,
        starts_picture_decided: false,
        starts_picture: false,
        start_reason: "",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{SliceSource, StderrLogger};
    use crate::es::Scanner;

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
        let mut nal = vec![0, 0, 1, 0x67]; // ref_idc=3, type=7
        nal.extend(rbsp::insert_emulation_prevention(&rbsp));
        nal
    }

    fn pps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0); // pps id
        w.put_ue(0); // sps id
        w.put_bit(0);
        w.put_bit(0);
        w.put_ue(0); // num_slice_groups_minus1 = 0
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(0);
        w.put_bits(0, 2);
        w.put_ue(0); // pic_init_qp se(0) -> ue(0)
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(0);
        w.put_bit(0);
        w.put_bit(0);
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x68]; // type=8
        nal.extend(rbsp::insert_emulation_prevention(&rbsp));
        nal
    }

    fn idr_slice_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0); // first_mb_in_slice
        w.put_ue(7); // slice_type
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(0, 4); // frame_num (log2_max_frame_num=4)
        w.put_ue(0); // idr_pic_id
        w.put_bits(0, 4); // pic_order_cnt_lsb
        let rbsp = w.finish();
        let mut nal = vec![0, 0, 1, 0x65]; // ref_idc=3, type=5 (IDR)
        nal.extend(rbsp::insert_emulation_prevention(&rbsp));
        nal
    }

    #[test]
    fn decodes_sps_then_pps_then_slice() {
        let mut stream = Vec::new();
        stream.extend(sps_nal());
        stream.extend(pps_nal());
        stream.extend(idr_slice_nal());

        let mut scanner = Scanner::new(SliceSource::new(&stream));
        let mut sps_dict = ParamSetDict::new();
        let mut pps_dict = ParamSetDict::new();
        let mut logger = StderrLogger::default();

        let sps_unit = scanner.next_unit().unwrap().unwrap();
        let nal = decode(&sps_unit, &mut sps_dict, &mut pps_dict, &mut logger).unwrap();
        assert!(nal.decoded);
        assert!(matches!(nal.payload, NalPayload::Sps(_)));

        let pps_unit = scanner.next_unit().unwrap().unwrap();
        let nal = decode(&pps_unit, &mut sps_dict, &mut pps_dict, &mut logger).unwrap();
        assert!(nal.decoded);
        assert!(matches!(nal.payload, NalPayload::Pps(_)));

        let slice_unit = scanner.next_unit().unwrap().unwrap();
        let nal = decode(&slice_unit, &mut sps_dict, &mut pps_dict, &mut logger).unwrap();
        assert!(nal.decoded);
        let slice = nal.slice().unwrap();
        assert!(slice.decoded);
        assert_eq!(slice.idr_pic_id, Some(0));
    }

    #[test]
    fn slice_before_param_sets_is_undecoded() {
        let stream = idr_slice_nal();
        let mut scanner = Scanner::new(SliceSource::new(&stream));
        let mut sps_dict = ParamSetDict::new();
        let mut pps_dict = ParamSetDict::new();
        let mut logger = StderrLogger::default();
        let unit = scanner.next_unit().unwrap().unwrap();
        let nal = decode(&unit, &mut sps_dict, &mut pps_dict, &mut logger).unwrap();
        assert!(!nal.decoded);
    }

    /// A minimal logger that records messages for assertions, instead of
    /// forwarding them to the `log` crate.
    #[derive(Default)]
    struct RecordingLogger {
        messages: Vec<String>,
    }
    impl Logger for RecordingLogger {
        fn message(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }
        fn error(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }
    }

    #[test]
    fn non_main_profile_sps_without_constraint1_warns_via_logger() {
        // High profile (100), constraint_set1 unset.
        let mut w = BitWriter::new();
        w.put_bits(100, 8);
        w.put_bit(0);
        w.put_bit(0);
        w.put_bit(0);
        w.put_bits(0, 5);
        w.put_bits(40, 8);
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
        let mut nal_bytes = vec![0, 0, 1, 0x67];
        nal_bytes.extend(rbsp::insert_emulation_prevention(&rbsp));

        let mut scanner = Scanner::new(SliceSource::new(&nal_bytes));
        let mut sps_dict = ParamSetDict::new();
        let mut pps_dict = ParamSetDict::new();
        let mut logger = RecordingLogger::default();
        let unit = scanner.next_unit().unwrap().unwrap();
        let nal = decode(&unit, &mut sps_dict, &mut pps_dict, &mut logger).unwrap();

        assert!(nal.decoded);
        assert_eq!(logger.messages.len(), 1);
        assert!(logger.messages[0].contains("100"));
    }
}
