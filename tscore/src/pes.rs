//! PES packet framing (ISO/IEC 13818-1 §2.4.3.6) and the TS-mode PES
//! demultiplexer.
//!
//! `parse_header`/`build_header` are the format the muxer and this
//! demultiplexer share. [`TsPesSource`] wraps a TS-packet [`ByteSource`] and
//! presents the concatenated payload of one PID as a [`ByteSource`] in turn,
//! feeding the ES-unit scanner the bytes it needs to find NAL/picture start
//! codes.
//!
//! Scope note: the ES scanner derives `FileOffset` from its own running
//! count of bytes read from its `ByteSource`, not from
//! `ByteSource::tell()`. Fed directly from a file, that count equals the
//! true file position. Fed through this demultiplexer, it instead counts
//! bytes of the demuxed ES stream; `last_pts`/`last_dts`/`last_packet_pid`
//! below are the demultiplexer's side channel for callers that need the
//! true originating TS packet, rather than threading it invisibly through
//! the scanner.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::ts::packet::{self, TsHeader, PACKET_LEN, SYNC_BYTE};

pub const PES_START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PesHeader {
    pub stream_id: u8,
    /// 0 means unbounded length, permitted only for video in TS.
    pub packet_length: u16,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// Total header length (stream_id + length + any optional fields),
    /// counted from the first byte after the `00 00 01` start code.
    pub header_len: usize,
}

/// Stream ids that never carry the optional PES header (H.222 Table 2-21).
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xFF | 0xF8)
}

/// Parses a PES header starting right after the `00 00 01` start code.
pub fn parse_header(data: &[u8]) -> Result<PesHeader> {
    if data.len() < 3 {
        return Err(Error::UnexpectedEof);
    }
    let stream_id = data[0];
    let packet_length = u16::from_be_bytes([data[1], data[2]]);

    if !has_optional_header(stream_id) {
        return Ok(PesHeader {
            stream_id,
            packet_length,
            pts: None,
            dts: None,
            header_len: 3,
        });
    }

    if data.len() < 6 {
        return Err(Error::UnexpectedEof);
    }
    let pts_dts_flags = (data[4] >> 6) & 0x3;
    let header_data_len = data[5] as usize;
    if data.len() < 6 + header_data_len {
        return Err(Error::UnexpectedEof);
    }

    let mut pos = 6;
    let mut pts = None;
    let mut dts = None;
    if pts_dts_flags == 0b10 {
        pts = Some(read_timestamp(&data[pos..pos + 5])?);
        pos += 5;
    } else if pts_dts_flags == 0b11 {
        pts = Some(read_timestamp(&data[pos..pos + 5])?);
        pos += 5;
        dts = Some(read_timestamp(&data[pos..pos + 5])?);
        pos += 5;
    }
    let _ = pos;

    Ok(PesHeader {
        stream_id,
        packet_length,
        pts,
        dts,
        header_len: 6 + header_data_len,
    })
}

fn read_timestamp(b: &[u8]) -> Result<u64> {
    if b.len() < 5 {
        return Err(Error::UnexpectedEof);
    }
    Ok((((b[0] as u64) >> 1) & 0x7) << 30
        | (b[1] as u64) << 22
        | (((b[2] as u64) >> 1) & 0x7F) << 15
        | (b[3] as u64) << 7
        | ((b[4] as u64) >> 1))
}

/// Writes one 33-bit timestamp in the canonical 5-byte PES encoding, with
/// `prefix4` ('0010' for a lone PTS, '0011' for PTS-with-DTS-present, '0001'
/// for the trailing DTS) in the top nibble of the first byte.
pub fn write_timestamp(out: &mut Vec<u8>, prefix4: u8, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF;
    let b0 = (prefix4 << 4) | (((ts >> 30) & 0x7) as u8) << 1 | 1;
    let b1 = ((ts >> 22) & 0xFF) as u8;
    let b2 = ((((ts >> 15) & 0x7F) as u8) << 1) | 1;
    let b3 = ((ts >> 7) & 0xFF) as u8;
    let b4 = (((ts & 0x7F) as u8) << 1) | 1;
    out.extend_from_slice(&[b0, b1, b2, b3, b4]);
}

/// Composes a full PES header (excluding the `00 00 01` start code) for
/// `stream_id` carrying `pts`/`dts`, used by the muxer.
pub fn build_header(stream_id: u8, packet_length: u16, pts: Option<u64>, dts: Option<u64>) -> Vec<u8> {
    let mut out = vec![
        stream_id,
        (packet_length >> 8) as u8,
        (packet_length & 0xFF) as u8,
    ];
    if !has_optional_header(stream_id) {
        return out;
    }
    let pts_dts_flags: u8 = match (pts, dts) {
        (Some(_), Some(_)) => 0b11,
        (Some(_), None) => 0b10,
        _ => 0b00,
    };
    out.push(0b1000_0000); // '10' marker bits, rest reserved/zero
    out.push(pts_dts_flags << 6);

    let mut optional = Vec::new();
    match (pts, dts) {
        (Some(p), Some(d)) => {
            write_timestamp(&mut optional, 0b0011, p);
            write_timestamp(&mut optional, 0b0001, d);
        }
        (Some(p), None) => write_timestamp(&mut optional, 0b0010, p),
        _ => {}
    }
    out.push(optional.len() as u8);
    out.extend_from_slice(&optional);
    out
}

/// Demultiplexes one PID out of a TS byte source, presenting the
/// concatenated PES payload bytes as a [`ByteSource`].
pub struct TsPesSource<S: ByteSource> {
    src: S,
    target_pid: u16,
    out: VecDeque<u8>,
    pos: u64,
    eof: bool,
    pub last_pts: Option<u64>,
    pub last_dts: Option<u64>,
    /// Bytes of PES payload still to come before the current PES packet is
    /// complete, when its `packet_length` was non-zero; `None` for the
    /// unbounded (video-only) case, where the next PUSI is the only
    /// boundary.
    remaining_in_pes: Option<usize>,
    resyncs: u32,
}

impl<S: ByteSource> TsPesSource<S> {
    pub fn new(src: S, target_pid: u16) -> Self {
        TsPesSource {
            src,
            target_pid,
            out: VecDeque::new(),
            pos: 0,
            eof: false,
            last_pts: None,
            last_dts: None,
            remaining_in_pes: None,
            resyncs: 0,
        }
    }

    /// Number of times sync was lost and recovered by scanning forward for
    /// the next `0x47`.
    pub fn resyncs(&self) -> u32 {
        self.resyncs
    }

    fn read_packet(&mut self) -> Result<Option<[u8; PACKET_LEN]>> {
        let mut packet = [0u8; PACKET_LEN];
        let mut filled = 0;
        while filled < PACKET_LEN {
            let n = self.src.read(&mut packet[filled..])?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(Error::UnexpectedEof)
                };
            }
            filled += n;
        }
        Ok(Some(packet))
    }

    /// Scans forward one byte at a time looking for a sync byte that is
    /// also followed (188 bytes later) by another sync byte, the standard
    /// TS resync heuristic. Returns `Ok(false)` at EOF.
    fn resync(&mut self) -> Result<bool> {
        let mut window = VecDeque::new();
        loop {
            let mut b = [0u8; 1];
            let n = self.src.read(&mut b)?;
            if n == 0 {
                return Ok(false);
            }
            window.push_back(b[0]);
            if window.len() > PACKET_LEN * 2 {
                window.pop_front();
            }
            if b[0] == SYNC_BYTE {
                return Ok(true);
            }
        }
    }

    /// Pulls and processes the next TS packet for `target_pid`, appending
    /// any new payload bytes to `out`. Returns `Ok(false)` at end of stream.
    fn advance(&mut self) -> Result<bool> {
        loop {
            let packet = match self.read_packet()? {
                Some(p) => p,
                None => return Ok(false),
            };
            if packet[0] != SYNC_BYTE {
                self.resyncs += 1;
                if !self.resync()? {
                    return Ok(false);
                }
                continue;
            }
            let header = match TsHeader::parse(&packet) {
                Ok(h) => h,
                Err(_) => {
                    self.resyncs += 1;
                    continue;
                }
            };
            if header.pid != self.target_pid {
                continue;
            }
            let pay = packet::payload(&packet, header)?;
            if header.payload_unit_start {
                if pay.len() < 3 || pay[0..3] != PES_START_CODE_PREFIX {
                    return Err(Error::LostSync(
                        "expected PES start code at payload_unit_start".to_string(),
                    ));
                }
                let h = parse_header(&pay[3..])?;
                self.last_pts = h.pts;
                self.last_dts = h.dts;
                let body_start = 3 + h.header_len;
                if body_start > pay.len() {
                    return Err(Error::UnexpectedEof);
                }
                self.remaining_in_pes = if h.packet_length == 0 {
                    None
                } else {
                    Some((h.packet_length as usize).saturating_sub(h.header_len))
                };
                self.push_body(&pay[body_start..]);
            } else {
                self.push_body(pay);
            }
            return Ok(true);
        }
    }

    /// Appends PES body bytes, truncating at `remaining_in_pes` when the
    /// current PES has a known length.
    fn push_body(&mut self, body: &[u8]) {
        match self.remaining_in_pes {
            None => self.out.extend(body.iter().copied()),
            Some(remaining) => {
                let take = body.len().min(remaining);
                self.out.extend(body[..take].iter().copied());
                self.remaining_in_pes = Some(remaining - take);
            }
        }
    }
}

impl<S: ByteSource> ByteSource for TsPesSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.out.is_empty() && !self.eof {
            if !self.advance()? {
                self.eof = true;
            }
        }
        let n = self.out.len().min(buf.len());
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = self.out.pop_front().unwrap();
            let _ = i;
        }
        self.pos += n as u64;
        Ok(n)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::Other(
            "TsPesSource does not support seeking".to_string(),
        ))
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;
    use crate::ts::packet::PACKET_LEN;

    #[test]
    fn header_round_trips_pts_and_dts() {
        let built = build_header(0xE0, 0, Some(90_000), Some(45_000));
        let parsed = parse_header(&built).unwrap();
        assert_eq!(parsed.stream_id, 0xE0);
        assert_eq!(parsed.pts, Some(90_000));
        assert_eq!(parsed.dts, Some(45_000));
    }

    #[test]
    fn header_without_optional_fields_for_program_stream_map() {
        let built = build_header(0xBC, 10, None, None);
        let parsed = parse_header(&built).unwrap();
        assert_eq!(parsed.header_len, 3);
        assert!(parsed.pts.is_none());
    }

    fn ts_packet(pid: u16, pusi: bool, payload: &[u8]) -> [u8; PACKET_LEN] {
        let mut p = [0xFFu8; PACKET_LEN];
        p[0] = SYNC_BYTE;
        p[1] = (if pusi { 0x40 } else { 0 }) | ((pid >> 8) as u8 & 0x1F);
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0b0001_0000; // payload only, cc=0
        let n = payload.len().min(PACKET_LEN - 4);
        p[4..4 + n].copy_from_slice(&payload[..n]);
        p
    }

    #[test]
    fn demuxes_single_pid_pes_payload() {
        let body = b"hello video";
        let header = build_header(0xE0, 0, Some(1000), None);
        // packet_length counts bytes following the length field: optional
        // header fields (header.len() - 3) plus the payload.
        let packet_length = (header.len() - 3 + body.len()) as u16;
        let header = build_header(0xE0, packet_length, Some(1000), None);

        let mut pes = Vec::new();
        pes.extend_from_slice(&PES_START_CODE_PREFIX);
        pes.extend(header);
        pes.extend_from_slice(body);

        let packet = ts_packet(0x100, true, &pes);
        let mut other = ts_packet(0x200, true, b"not this pid");
        other[3] = 0b0001_0000;

        let mut stream = Vec::new();
        stream.extend_from_slice(&other);
        stream.extend_from_slice(&packet);

        let mut src = TsPesSource::new(SliceSource::new(&stream), 0x100);
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = src.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello video");
        assert_eq!(src.last_pts, Some(1000));
    }
}
