//! Picture Parameter Set (NAL type 8) parsing.

use crate::bitreader::BitReader;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicParameterSet {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub pic_order_present_flag: bool,
    pub num_slice_groups: u32,
    pub redundant_pic_cnt_present_flag: bool,
}

fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    32 - (n - 1).leading_zeros()
}

impl PicParameterSet {
    /// `rbsp` excludes the NAL header byte.
    pub fn parse(rbsp: &[u8]) -> Result<PicParameterSet> {
        let mut r = BitReader::new(rbsp);
        let pic_parameter_set_id = r.read_exp_golomb()?;
        let seq_parameter_set_id = r.read_exp_golomb()?;
        let entropy_coding_mode_flag = r.read_bit()? == 1;
        let pic_order_present_flag = r.read_bit()? == 1;
        let num_slice_groups_minus1 = r.read_exp_golomb()?;
        let num_slice_groups = num_slice_groups_minus1 + 1;

        if num_slice_groups_minus1 > 0 {
            let slice_group_map_type = r.read_exp_golomb()?;
            match slice_group_map_type {
                0 => {
                    for _ in 0..=num_slice_groups_minus1 {
                        let _run_length_minus1 = r.read_exp_golomb()?;
                    }
                }
                2 => {
                    for _ in 0..num_slice_groups_minus1 {
                        let _top_left = r.read_exp_golomb()?;
                        let _bottom_right = r.read_exp_golomb()?;
                    }
                }
                3 | 4 | 5 => {
                    let _slice_group_change_direction_flag = r.read_bit()?;
                    let _slice_group_change_rate_minus1 = r.read_exp_golomb()?;
                }
                6 => {
                    let pic_size_in_map_units_minus1 = r.read_exp_golomb()?;
                    let bits = ceil_log2(num_slice_groups);
                    for _ in 0..=pic_size_in_map_units_minus1 {
                        if bits > 0 {
                            let _slice_group_id = r.read_bits(bits)?;
                        }
                    }
                }
                _ => {}
            }
        }

        let _num_ref_idx_l0_default_active_minus1 = r.read_exp_golomb()?;
        let _num_ref_idx_l1_default_active_minus1 = r.read_exp_golomb()?;
        let _weighted_pred_flag = r.read_bit()?;
        let _weighted_bipred_idc = r.read_bits(2)?;
        let _pic_init_qp_minus26 = r.read_signed_exp_golomb()?;
        let _pic_init_qs_minus26 = r.read_signed_exp_golomb()?;
        let _chroma_qp_index_offset = r.read_signed_exp_golomb()?;
        let _deblocking_filter_control_present_flag = r.read_bit()?;
        let _constrained_intra_pred_flag = r.read_bit()?;
        let redundant_pic_cnt_present_flag = r.read_bit()? == 1;

        Ok(PicParameterSet {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode_flag,
            pic_order_present_flag,
            num_slice_groups,
            redundant_pic_cnt_present_flag,
        })
    }
}
