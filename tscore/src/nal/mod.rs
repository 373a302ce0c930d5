//! H.264 NAL unit decoding.

pub mod decoder;
pub mod header;
pub mod pps;
pub mod rbsp;
pub mod sei;
pub mod slice;
pub mod sps;

pub use decoder::{decode, NalPayload, NalUnit};
pub use header::{NalHeader, UnitType};
pub use pps::PicParameterSet;
pub use sei::{RecoveryPoint, Sei};
pub use slice::SliceHeader;
pub use sps::SeqParameterSet;

/// Converts AVCC (length-prefixed) NAL framing into Annex B (start-code
/// prefixed), for callers reading MP4-adjacent containers rather than raw
/// TS/PS elementary streams. `length_size` is the NAL length field width
/// from the `avcC` box (1, 2 or 4).
///
/// Grounded on `mp4_source.rs`'s `avcc_to_nalu_ebsp` and `h264-reader`'s
/// `avcc` module (see `avcc/src/main.rs`).
pub fn avcc_to_annex_b(avcc: &[u8], length_size: usize) -> crate::error::Result<Vec<u8>> {
    use crate::error::Error;

    if length_size != 1 && length_size != 2 && length_size != 4 {
        return Err(Error::Other(format!(
            "unsupported AVCC length_size {}",
            length_size
        )));
    }
    let mut out = Vec::with_capacity(avcc.len() + avcc.len() / 16 + 4);
    let mut pos = 0;
    while pos < avcc.len() {
        if pos + length_size > avcc.len() {
            return Err(Error::BadFrameSize(
                "AVCC length prefix truncated".to_string(),
            ));
        }
        let len = match length_size {
            1 => avcc[pos] as usize,
            2 => u16::from_be_bytes([avcc[pos], avcc[pos + 1]]) as usize,
            4 => u32::from_be_bytes([
                avcc[pos],
                avcc[pos + 1],
                avcc[pos + 2],
                avcc[pos + 3],
            ]) as usize,
            _ => unreachable!(),
        };
        pos += length_size;
        if pos + len > avcc.len() {
            return Err(Error::BadFrameSize("AVCC NAL length overruns buffer".to_string()));
        }
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(&avcc[pos..pos + len]);
        pos += len;
    }
    Ok(out)
}
