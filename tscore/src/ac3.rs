//! AC-3 frame reader: just enough framing to measure and extract one
//! syncframe, no decoding of the audio itself.

use crate::error::{Error, Result};
use crate::io::ByteSource;

pub const SYNCINFO_LEN: usize = 5;
const SYNC_WORD: [u8; 2] = [0x0B, 0x77];

/// Frame size in 16-bit words, indexed `[frmsizecod >> 1][fscod]`, per ATSC
/// A/52 Table 5.13. `fscod == 1` (44.1 kHz) rows add one more word when
/// `frmsizecod` is odd, handled by the caller rather than doubled up here.
const FRAME_SIZE_WORDS: [[u16; 3]; 19] = [
    [64, 69, 96],
    [80, 87, 120],
    [96, 104, 144],
    [112, 121, 168],
    [128, 139, 192],
    [160, 174, 240],
    [192, 208, 288],
    [224, 243, 336],
    [256, 278, 384],
    [320, 348, 480],
    [384, 417, 576],
    [448, 487, 672],
    [512, 557, 768],
    [576, 626, 864],
    [640, 696, 960],
    [768, 835, 1152],
    [896, 975, 1344],
    [1024, 1114, 1536],
    [1152, 1253, 1728],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    pub fscod: u8,
    pub frmsizecod: u8,
    pub frame_len: usize,
}

/// Parses the 5-byte `syncinfo` at the start of `data` and computes the full
/// frame length.
pub fn parse_syncinfo(data: &[u8]) -> Result<SyncInfo> {
    if data.len() < SYNCINFO_LEN {
        return Err(Error::UnexpectedEof);
    }
    if data[0..2] != SYNC_WORD {
        return Err(Error::LostSync("AC-3 syncinfo missing 0x0B77".to_string()));
    }
    let fscod = data[4] >> 6;
    let frmsizecod = data[4] & 0x3F;
    if fscod == 3 {
        return Err(Error::BadFrameSize("AC-3 fscod == 3 reserved".to_string()));
    }
    if frmsizecod > 37 {
        return Err(Error::BadFrameSize(format!(
            "AC-3 frmsizecod {} out of range",
            frmsizecod
        )));
    }
    let row = &FRAME_SIZE_WORDS[(frmsizecod >> 1) as usize];
    let mut words = row[fscod as usize] as usize;
    if fscod == 1 && frmsizecod & 1 != 0 {
        words += 1;
    }
    Ok(SyncInfo {
        fscod,
        frmsizecod,
        frame_len: words * 2,
    })
}

/// Reads one complete AC-3 frame (syncinfo included) from `src`, assuming
/// `src` is already positioned at a frame boundary.
pub fn read_frame<S: ByteSource>(src: &mut S) -> Result<Vec<u8>> {
    let mut header = [0u8; SYNCINFO_LEN];
    read_exact(src, &mut header)?;
    let info = parse_syncinfo(&header)?;
    let mut frame = vec![0u8; info.frame_len];
    frame[..SYNCINFO_LEN].copy_from_slice(&header);
    read_exact(src, &mut frame[SYNCINFO_LEN..])?;
    Ok(frame)
}

fn read_exact<S: ByteSource>(src: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    #[test]
    fn scenario_48khz_frmsizecod_zero_is_128_bytes() {
        let info = parse_syncinfo(&[0x0B, 0x77, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(info.fscod, 0);
        assert_eq!(info.frmsizecod, 0);
        assert_eq!(info.frame_len, 128);
    }

    #[test]
    fn fscod_44k1_odd_frmsizecod_adds_one_word() {
        // fscod=1 (01), frmsizecod=1 (000001) -> byte[4] = 0b01_000001 = 0x41
        let even = parse_syncinfo(&[0x0B, 0x77, 0x00, 0x00, 0x40]).unwrap(); // frmsizecod=0
        let odd = parse_syncinfo(&[0x0B, 0x77, 0x00, 0x00, 0x41]).unwrap(); // frmsizecod=1
        assert_eq!(odd.frame_len, even.frame_len + 2);
    }

    #[test]
    fn rejects_reserved_fscod() {
        let err = parse_syncinfo(&[0x0B, 0x77, 0x00, 0x00, 0xC0]).unwrap_err();
        assert!(matches!(err, Error::BadFrameSize(_)));
    }

    #[test]
    fn rejects_frmsizecod_over_37() {
        let err = parse_syncinfo(&[0x0B, 0x77, 0x00, 0x00, 0x26]).unwrap_err();
        assert!(matches!(err, Error::BadFrameSize(_)));
    }

    #[test]
    fn missing_sync_word_is_lost_sync() {
        let err = parse_syncinfo(&[0x00, 0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::LostSync(_)));
    }

    #[test]
    fn read_frame_returns_full_frame_including_syncinfo() {
        let mut data = vec![0x0Bu8, 0x77, 0x00, 0x00, 0x00];
        data.extend(vec![0xAAu8; 123]); // 128 - 5 = 123 remaining bytes
        let mut src = SliceSource::new(&data);
        let frame = read_frame(&mut src).unwrap();
        assert_eq!(frame.len(), 128);
        assert_eq!(&frame[0..5], &[0x0B, 0x77, 0x00, 0x00, 0x00]);
    }
}
