//! MPEG program stream (PS) reader (ISO/IEC 13818-1 §2.5).
//!
//! Walks `pack_header` / system header / stream-map / directory / PES units
//! in sequence, the way the container is actually laid out: every unit after
//! the first is announced by its own `00 00 01` start code, so this is a
//! small state machine over [`PsReader::next_unit`] rather than a one-shot
//! parse.

use std::collections::VecDeque;

use crate::ac3;
use crate::config::DvdMode;
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::pes;

pub const PACK_START_CODE: u8 = 0xBA;
pub const SYSTEM_HEADER_START_CODE: u8 = 0xBB;
pub const PROGRAM_STREAM_MAP_ID: u8 = 0xBC;
pub const PRIVATE_STREAM_1_ID: u8 = 0xBD;
pub const PRIVATE_STREAM_2_ID: u8 = 0xBF;
pub const PROGRAM_STREAM_DIRECTORY_ID: u8 = 0xFF;

fn is_audio(id: u8) -> bool {
    (0xC0..=0xDF).contains(&id)
}
fn is_video(id: u8) -> bool {
    (0xE0..=0xEF).contains(&id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    pub scr_base: u64,
    pub scr_extension: u16,
    pub program_mux_rate: u32,
}

/// Parses the 10 fixed bytes of `pack_header()` (ISO/IEC 13818-1 §2.5.3.3),
/// following the `00 00 01 BA` start code. Does not consume stuffing bytes;
/// the caller reads `pack_stuffing_length` more bytes and discards them.
fn parse_pack_header_fixed(b: &[u8; 10]) -> Result<(PackHeader, usize)> {
    let mut v: u128 = 0;
    for &byte in b {
        v = (v << 8) | byte as u128;
    }
    // 80-bit value; extract fields counting from the MSB.
    let bits = |pos: u32, width: u32| -> u64 { ((v >> (80 - pos - width)) & ((1u128 << width) - 1)) as u64 };

    let scr_32_30 = bits(2, 3);
    let scr_29_15 = bits(6, 15);
    let scr_14_0 = bits(22, 15);
    let scr_extension = bits(38, 9);
    let program_mux_rate = bits(48, 22);
    let pack_stuffing_length = bits(77, 3);

    let scr_base = (scr_32_30 << 30) | (scr_29_15 << 15) | scr_14_0;
    Ok((
        PackHeader {
            scr_base,
            scr_extension: scr_extension as u16,
            program_mux_rate: program_mux_rate as u32,
        },
        pack_stuffing_length as usize,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substream {
    Ac3 { bsmod: u8, acmod: u8 },
    Dts,
    Lpcm,
    Subpicture,
    Unknown(u8),
}

/// Classifies a DVD-mode `private_stream_1` substream by its first payload
/// byte. `frame` is the substream's elementary payload, assumed to
/// begin with a 4-byte DVD substream sub-header (substream_id,
/// num_frame_headers, 2-byte first_access_unit_pointer) for the AC-3 case,
/// whose syncframe is assumed to start immediately after it.
pub fn classify_substream(frame: &[u8]) -> Result<Substream> {
    if frame.is_empty() {
        return Err(Error::UnexpectedEof);
    }
    let id = frame[0];
    match id {
        0x80..=0x87 => {
            if frame.len() < 4 + ac3::SYNCINFO_LEN + 2 {
                return Err(Error::UnexpectedEof);
            }
            let ac3_frame = &frame[4..];
            ac3::parse_syncinfo(ac3_frame)?;
            let bsid_bsmod = ac3_frame[5];
            let bsmod = bsid_bsmod & 0x07;
            let acmod = (ac3_frame[6] >> 5) & 0x07;
            Ok(Substream::Ac3 { bsmod, acmod })
        }
        0x88..=0x8F => Ok(Substream::Dts),
        0xA0..=0xA7 => Ok(Substream::Lpcm),
        0x20..=0x3F => Ok(Substream::Subpicture),
        other => Ok(Substream::Unknown(other)),
    }
}

#[derive(Debug, Clone)]
pub enum PsUnit {
    Pack(PackHeader),
    SystemHeader(Vec<u8>),
    StreamMap(Vec<u8>),
    Directory(Vec<u8>),
    PrivateStream1 {
        header: pes::PesHeader,
        substream: Substream,
        payload: Vec<u8>,
    },
    PrivateStream2 {
        payload: Vec<u8>,
    },
    Audio {
        stream_id: u8,
        header: pes::PesHeader,
        payload: Vec<u8>,
    },
    Video {
        stream_id: u8,
        header: pes::PesHeader,
        payload: Vec<u8>,
    },
}

pub struct PsReader<S: ByteSource> {
    src: S,
    lookahead: VecDeque<u8>,
    dvd_mode: DvdMode,
    resyncs: u32,
}

impl<S: ByteSource> PsReader<S> {
    pub fn new(src: S, dvd_mode: DvdMode) -> Self {
        PsReader {
            src,
            lookahead: VecDeque::new(),
            dvd_mode,
            resyncs: 0,
        }
    }

    pub fn resyncs(&self) -> u32 {
        self.resyncs
    }

    fn fill(&mut self, n: usize) -> Result<bool> {
        while self.lookahead.len() < n {
            let mut b = [0u8; 1];
            let read = self.src.read(&mut b)?;
            if read == 0 {
                return Ok(false);
            }
            self.lookahead.push_back(b[0]);
        }
        Ok(true)
    }

    fn take(&mut self, n: usize) -> Result<Vec<u8>> {
        if !self.fill(n)? {
            return Err(Error::UnexpectedEof);
        }
        Ok(self.lookahead.drain(..n).collect())
    }

    fn take_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let v = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&v);
        Ok(out)
    }

    /// Locates the next `00 00 01` start code, returning the following
    /// stream_id byte, or `Ok(None)` at clean end of stream. Resynchronizes
    /// (consuming bytes one at a time) on a
    /// mismatch rather than failing outright.
    fn next_stream_id(&mut self) -> Result<Option<u8>> {
        loop {
            if !self.fill(4)? {
                if self.lookahead.is_empty() {
                    return Ok(None);
                }
                return Err(Error::UnexpectedEof);
            }
            if self.lookahead[0] == 0 && self.lookahead[1] == 0 && self.lookahead[2] == 1 {
                let id = self.lookahead[3];
                self.lookahead.drain(..4);
                return Ok(Some(id));
            }
            self.resyncs += 1;
            self.lookahead.pop_front();
        }
    }

    /// Reads one length-prefixed unit body: a big-endian 16-bit length
    /// followed by that many bytes, the shared framing of every PS unit
    /// except `pack_header`.
    fn take_length_prefixed(&mut self) -> Result<Vec<u8>> {
        let len_bytes = self.take_fixed::<2>()?;
        let len = u16::from_be_bytes(len_bytes) as usize;
        self.take(len)
    }

    fn read_pes_unit(&mut self, stream_id: u8, body_with_len: Vec<u8>) -> Result<(pes::PesHeader, Vec<u8>)> {
        let mut full = vec![stream_id];
        full.extend_from_slice(&(body_with_len.len() as u16).to_be_bytes());
        full.extend_from_slice(&body_with_len);
        let header = pes::parse_header(&full)?;
        let payload = full[header.header_len..].to_vec();
        Ok((header, payload))
    }

    /// Reads and dispatches the next unit, or `Ok(None)` at clean EOF.
    pub fn next_unit(&mut self) -> Result<Option<PsUnit>> {
        let stream_id = match self.next_stream_id()? {
            Some(id) => id,
            None => return Ok(None),
        };

        if stream_id == PACK_START_CODE {
            let fixed = self.take_fixed::<10>()?;
            let (header, stuffing_len) = parse_pack_header_fixed(&fixed)?;
            self.take(stuffing_len)?;
            return Ok(Some(PsUnit::Pack(header)));
        }

        if stream_id == SYSTEM_HEADER_START_CODE {
            return Ok(Some(PsUnit::SystemHeader(self.take_length_prefixed()?)));
        }
        if stream_id == PROGRAM_STREAM_MAP_ID {
            return Ok(Some(PsUnit::StreamMap(self.take_length_prefixed()?)));
        }
        if stream_id == PROGRAM_STREAM_DIRECTORY_ID {
            return Ok(Some(PsUnit::Directory(self.take_length_prefixed()?)));
        }

        let body = self.take_length_prefixed()?;
        if stream_id == PRIVATE_STREAM_1_ID {
            let (header, payload) = self.read_pes_unit(stream_id, body)?;
            let substream = if self.dvd_mode.0 {
                classify_substream(&payload)?
            } else {
                Substream::Unknown(payload.first().copied().unwrap_or(0))
            };
            return Ok(Some(PsUnit::PrivateStream1 {
                header,
                substream,
                payload,
            }));
        }
        if stream_id == PRIVATE_STREAM_2_ID {
            let (_header, payload) = self.read_pes_unit(stream_id, body)?;
            return Ok(Some(PsUnit::PrivateStream2 { payload }));
        }
        if is_audio(stream_id) {
            let (header, payload) = self.read_pes_unit(stream_id, body)?;
            return Ok(Some(PsUnit::Audio {
                stream_id,
                header,
                payload,
            }));
        }
        if is_video(stream_id) {
            let (header, payload) = self.read_pes_unit(stream_id, body)?;
            return Ok(Some(PsUnit::Video {
                stream_id,
                header,
                payload,
            }));
        }

        Err(Error::BadStreamId(stream_id))
    }
}
