//! Slice header parsing (NAL types 1 and 5).

use crate::bitreader::BitReader;
use crate::error::Result;
use crate::nal::header::UnitType;
use crate::nal::pps::PicParameterSet;
use crate::nal::sps::SeqParameterSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt: [Option<i32>; 2],
    pub redundant_pic_cnt: u32,
    /// False when `sps`/`pps` weren't available at parse time: only the
    /// first three fields (readable without either dictionary) are valid.
    pub decoded: bool,
}

impl SliceHeader {
    /// `rbsp` excludes the NAL header byte. `sps`/`pps` are the dictionary
    /// entries referenced by this slice's (eventual) `pic_parameter_set_id`;
    /// pass `None` when they aren't known yet, in which case only
    /// `first_mb_in_slice`, `slice_type` and `pic_parameter_set_id` are
    /// filled in and `decoded` is left `false` (the access-unit assembler
    /// relies on this partial parse to still recognize slice boundaries
    /// without parameter sets).
    pub fn parse(
        rbsp: &[u8],
        nal_unit_type: UnitType,
        sps: Option<&SeqParameterSet>,
        pps: Option<&PicParameterSet>,
    ) -> Result<SliceHeader> {
        let mut r = BitReader::new(rbsp);
        let first_mb_in_slice = r.read_exp_golomb()?;
        let slice_type = r.read_exp_golomb()?;
        let pic_parameter_set_id = r.read_exp_golomb()?;

        let (sps, pps) = match (sps, pps) {
            (Some(s), Some(p)) => (s, p),
            _ => {
                return Ok(SliceHeader {
                    first_mb_in_slice,
                    slice_type,
                    pic_parameter_set_id,
                    decoded: false,
                    ..Default::default()
                })
            }
        };

        let frame_num = r.read_bits(sps.log2_max_frame_num)?;

        let field_pic_flag = if !sps.frame_mbs_only_flag {
            r.read_bit()? == 1
        } else {
            false
        };
        let bottom_field_flag = if field_pic_flag {
            r.read_bit()? == 1
        } else {
            false
        };

        let idr_pic_id = if nal_unit_type == UnitType::IdrSlice {
            Some(r.read_exp_golomb()?)
        } else {
            None
        };

        let mut pic_order_cnt_lsb = None;
        let mut delta_pic_order_cnt_bottom = None;
        let mut delta_pic_order_cnt = [None, None];

        if sps.pic_order_cnt_type == 0 {
            pic_order_cnt_lsb = Some(r.read_bits(sps.log2_max_pic_order_cnt_lsb)?);
            if pps.pic_order_present_flag && !field_pic_flag {
                delta_pic_order_cnt_bottom = Some(r.read_signed_exp_golomb()?);
            }
        } else if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
            delta_pic_order_cnt[0] = Some(r.read_signed_exp_golomb()?);
            if pps.pic_order_present_flag && !field_pic_flag {
                delta_pic_order_cnt[1] = Some(r.read_signed_exp_golomb()?);
            }
        }

        let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag {
            r.read_exp_golomb()?
        } else {
            0
        };

        Ok(SliceHeader {
            first_mb_in_slice,
            slice_type,
            pic_parameter_set_id,
            frame_num,
            field_pic_flag,
            bottom_field_flag,
            idr_pic_id,
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
            delta_pic_order_cnt,
            redundant_pic_cnt,
            decoded: true,
        })
    }
}
