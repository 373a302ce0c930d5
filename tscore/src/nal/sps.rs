//! Sequence Parameter Set (NAL type 7) parsing.
//!
//! Only a subset of fields is retained; VUI parameters are parsed (so that
//! later bits, were there any, are correctly aligned) but discarded.

use crate::bitreader::BitReader;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeqParameterSet {
    pub profile_idc: u8,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub frame_mbs_only_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_crop: Option<(u32, u32, u32, u32)>,
}

impl SeqParameterSet {
    /// `rbsp` excludes the NAL header byte.
    pub fn parse(rbsp: &[u8]) -> Result<(SeqParameterSet, bool)> {
        let mut r = BitReader::new(rbsp);
        let profile_idc = r.read_bits_into_byte(8)?;
        let constraint_set0_flag = r.read_bit()? == 1;
        let constraint_set1_flag = r.read_bit()? == 1;
        let constraint_set2_flag = r.read_bit()? == 1;
        let reserved_zero_5bits = r.read_bits(5)?;
        if reserved_zero_5bits != 0 {
            return Err(Error::Other(
                "reserved_zero_5bits != 0 in SPS (hard fail)".into(),
            ));
        }
        let level_idc = r.read_bits_into_byte(8)?;
        let seq_parameter_set_id = r.read_exp_golomb()?;

        let log2_max_frame_num = r.read_exp_golomb()? + 4;
        let pic_order_cnt_type = r.read_exp_golomb()?;
        let mut log2_max_pic_order_cnt_lsb = 0;
        let mut delta_pic_order_always_zero_flag = false;
        if pic_order_cnt_type == 0 {
            log2_max_pic_order_cnt_lsb = r.read_exp_golomb()? + 4;
        } else if pic_order_cnt_type == 1 {
            delta_pic_order_always_zero_flag = r.read_bit()? == 1;
            let _offset_for_non_ref_pic = r.read_signed_exp_golomb()?;
            let _offset_for_top_to_bottom_field = r.read_signed_exp_golomb()?;
            let num_ref_frames_in_pic_order_cnt_cycle = r.read_exp_golomb()?;
            for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                let _offset_for_ref_frame = r.read_signed_exp_golomb()?;
            }
        }
        let _max_num_ref_frames = r.read_exp_golomb()?;
        let _gaps_in_frame_num_value_allowed_flag = r.read_bit()?;
        let pic_width_in_mbs_minus1 = r.read_exp_golomb()?;
        let pic_height_in_map_units_minus1 = r.read_exp_golomb()?;
        let frame_mbs_only_flag = r.read_bit()? == 1;
        if !frame_mbs_only_flag {
            let _mb_adaptive_frame_field_flag = r.read_bit()?;
        }
        let _direct_8x8_inference_flag = r.read_bit()?;
        let frame_cropping_flag = r.read_bit()? == 1;
        let frame_crop = if frame_cropping_flag {
            let left = r.read_exp_golomb()?;
            let right = r.read_exp_golomb()?;
            let top = r.read_exp_golomb()?;
            let bottom = r.read_exp_golomb()?;
            Some((left, right, top, bottom))
        } else {
            None
        };
        let vui_parameters_present_flag = r.read_bit()? == 1;
        if vui_parameters_present_flag {
            skip_vui_parameters(&mut r)?;
        }

        let warn_unsupported = profile_idc != 77 && !constraint_set1_flag;

        Ok((
            SeqParameterSet {
                profile_idc,
                constraint_set0_flag,
                constraint_set1_flag,
                constraint_set2_flag,
                level_idc,
                seq_parameter_set_id,
                log2_max_frame_num,
                pic_order_cnt_type,
                log2_max_pic_order_cnt_lsb,
                delta_pic_order_always_zero_flag,
                frame_mbs_only_flag,
                pic_width_in_mbs_minus1,
                pic_height_in_map_units_minus1,
                frame_crop,
            },
            warn_unsupported,
        ))
    }

    /// Luma plane width/height in pixels, per `h264::Parameters::pixel_dimensions`
    /// in the teacher's RTSP client (assumes 4:2:0 chroma, the only chroma
    /// format this parser otherwise recognizes).
    pub fn pixel_dimensions(&self) -> (u32, u32) {
        let width = (self.pic_width_in_mbs_minus1 + 1) * 16;
        let frame_mbs_factor = if self.frame_mbs_only_flag { 1 } else { 2 };
        let height = frame_mbs_factor * (self.pic_height_in_map_units_minus1 + 1) * 16;
        match self.frame_crop {
            Some((left, right, top, bottom)) => {
                let crop_unit_x = 2;
                let crop_unit_y = 2 * frame_mbs_factor;
                (
                    width.saturating_sub(crop_unit_x * (left + right)),
                    height.saturating_sub(crop_unit_y * (top + bottom)),
                )
            }
            None => (width, height),
        }
    }
}

/// Skips `vui_parameters()` (Annex E.1.1). Nothing in it is retained; we only
/// need to consume the right number of bits in case the RBSP continues (it
/// doesn't, in practice, but this keeps the parser honest).
fn skip_vui_parameters(r: &mut BitReader) -> Result<()> {
    if r.read_bit()? == 1 {
        // aspect_ratio_info_present_flag
        let aspect_ratio_idc = r.read_bits_into_byte(8)?;
        if aspect_ratio_idc == 255 {
            // Extended_SAR
            r.skip_bits(32)?;
        }
    }
    if r.read_bit()? == 1 {
        // overscan_info_present_flag
        let _overscan_appropriate_flag = r.read_bit()?;
    }
    if r.read_bit()? == 1 {
        // video_signal_type_present_flag
        let _video_format = r.read_bits(3)?;
        let _video_full_range_flag = r.read_bit()?;
        if r.read_bit()? == 1 {
            // colour_description_present_flag
            r.skip_bits(24)?;
        }
    }
    if r.read_bit()? == 1 {
        // chroma_loc_info_present_flag
        let _chroma_sample_loc_type_top_field = r.read_exp_golomb()?;
        let _chroma_sample_loc_type_bottom_field = r.read_exp_golomb()?;
    }
    if r.read_bit()? == 1 {
        // timing_info_present_flag
        let _num_units_in_tick = r.read_bits(32)?;
        let _time_scale = r.read_bits(32)?;
        let _fixed_frame_rate_flag = r.read_bit()?;
    }
    let nal_hrd_parameters_present_flag = r.read_bit()? == 1;
    if nal_hrd_parameters_present_flag {
        skip_hrd_parameters(r)?;
    }
    let vcl_hrd_parameters_present_flag = r.read_bit()? == 1;
    if vcl_hrd_parameters_present_flag {
        skip_hrd_parameters(r)?;
    }
    if nal_hrd_parameters_present_flag || vcl_hrd_parameters_present_flag {
        let _low_delay_hrd_flag = r.read_bit()?;
    }
    let _pic_struct_present_flag = r.read_bit()?;
    if r.read_bit()? == 1 {
        // bitstream_restriction_flag
        let _motion_vectors_over_pic_boundaries_flag = r.read_bit()?;
        let _max_bytes_per_pic_denom = r.read_exp_golomb()?;
        let _max_bits_per_mb_denom = r.read_exp_golomb()?;
        let _log2_max_mv_length_horizontal = r.read_exp_golomb()?;
        let _log2_max_mv_length_vertical = r.read_exp_golomb()?;
        let _max_num_reorder_frames = r.read_exp_golomb()?;
        let _max_dec_frame_buffering = r.read_exp_golomb()?;
    }
    Ok(())
}

fn skip_hrd_parameters(r: &mut BitReader) -> Result<()> {
    let cpb_cnt_minus1 = r.read_exp_golomb()?;
    let _bit_rate_scale = r.read_bits(4)?;
    let _cpb_size_scale = r.read_bits(4)?;
    for _ in 0..=cpb_cnt_minus1 {
        let _bit_rate_value_minus1 = r.read_exp_golomb()?;
        let _cpb_size_value_minus1 = r.read_exp_golomb()?;
        let _cbr_flag = r.read_bit()?;
    }
    let _initial_cpb_removal_delay_length_minus1 = r.read_bits(5)?;
    let _cpb_removal_delay_length_minus1 = r.read_bits(5)?;
    let _dpb_output_delay_length_minus1 = r.read_bits(5)?;
    let _time_offset_length = r.read_bits(5)?;
    Ok(())
}
