//! M2TS (BDAV) reorder buffer.
//!
//! M2TS prefixes each 188-byte TS packet with a 4-byte big-endian arrival
//! timestamp. Packets can arrive slightly out of order; this buffer holds a
//! window of `W` entries and always emits the smallest timestamp once the
//! window is full, restoring ascending order for a bounded amount of jitter.

use std::collections::VecDeque;

use crate::config::M2tsReorderWindow;
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::ts::packet::PACKET_LEN;

pub const ENTRY_LEN: usize = 4 + PACKET_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M2tsEntry {
    /// 32-bit M2TS arrival timestamp. Wraps at `u32::MAX`; this type does not
    /// attempt to reconstruct the wrapped epoch; an accepted limitation,
    /// not handled here.
    pub timestamp: u32,
    pub packet: [u8; PACKET_LEN],
}

impl M2tsEntry {
    pub fn parse(bytes: &[u8]) -> Result<M2tsEntry> {
        if bytes.len() < ENTRY_LEN {
            return Err(Error::UnexpectedEof);
        }
        let timestamp = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let mut packet = [0u8; PACKET_LEN];
        packet.copy_from_slice(&bytes[4..4 + PACKET_LEN]);
        Ok(M2tsEntry { timestamp, packet })
    }

    pub fn to_bytes(self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        out[..4].copy_from_slice(&self.timestamp.to_be_bytes());
        out[4..].copy_from_slice(&self.packet);
        out
    }
}

/// Reorders a stream of [`M2tsEntry`] values within a sliding window of size
/// `W`: holds up to `W` entries, always handing back the one with the
/// smallest timestamp once the window is full.
pub struct ReorderBuffer {
    window: u32,
    held: Vec<M2tsEntry>,
}

impl ReorderBuffer {
    pub fn new(window: M2tsReorderWindow) -> Self {
        ReorderBuffer {
            window: window.0.max(1),
            held: Vec::new(),
        }
    }

    /// Feeds one entry in, returning the entry to emit next if the window is
    /// now full.
    pub fn push(&mut self, entry: M2tsEntry) -> Option<M2tsEntry> {
        self.held.push(entry);
        if self.held.len() as u32 >= self.window {
            Some(self.pop_smallest())
        } else {
            None
        }
    }

    fn pop_smallest(&mut self) -> M2tsEntry {
        let (idx, _) = self
            .held
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.timestamp)
            .expect("pop_smallest called on empty buffer");
        self.held.remove(idx)
    }

    /// Drains the remaining held entries in ascending timestamp order, for
    /// end-of-stream flush.
    pub fn flush(&mut self) -> Vec<M2tsEntry> {
        self.held.sort_by_key(|e| e.timestamp);
        std::mem::take(&mut self.held)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Reads 192-byte M2TS entries from a [`ByteSource`] and presents them in
/// reordered, ascending-timestamp order via [`next_packet`].
pub struct M2tsReader<S: ByteSource> {
    src: S,
    buffer: ReorderBuffer,
    pending: VecDeque<M2tsEntry>,
    eof: bool,
}

impl<S: ByteSource> M2tsReader<S> {
    pub fn new(src: S, window: M2tsReorderWindow) -> Self {
        M2tsReader {
            src,
            buffer: ReorderBuffer::new(window),
            pending: VecDeque::new(),
            eof: false,
        }
    }

    fn read_entry(&mut self) -> Result<Option<M2tsEntry>> {
        let mut raw = [0u8; ENTRY_LEN];
        let mut filled = 0;
        while filled < ENTRY_LEN {
            let n = self.src.read(&mut raw[filled..])?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(Error::UnexpectedEof)
                };
            }
            filled += n;
        }
        Ok(Some(M2tsEntry::parse(&raw)?))
    }

    /// Returns the next reordered entry, or `None` once the source is
    /// exhausted and the window has been fully flushed.
    pub fn next_entry(&mut self) -> Result<Option<M2tsEntry>> {
        loop {
            if let Some(e) = self.pending.pop_front() {
                return Ok(Some(e));
            }
            if self.eof {
                return Ok(None);
            }
            match self.read_entry()? {
                Some(entry) => {
                    if let Some(out) = self.buffer.push(entry) {
                        return Ok(Some(out));
                    }
                }
                None => {
                    self.eof = true;
                    self.pending.extend(self.buffer.flush());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    fn entry(ts: u32, tag: u8) -> M2tsEntry {
        M2tsEntry {
            timestamp: ts,
            packet: [tag; PACKET_LEN],
        }
    }

    #[test]
    fn reorders_within_window() {
        let mut buf = ReorderBuffer::new(M2tsReorderWindow(3));
        assert!(buf.push(entry(30, 1)).is_none());
        assert!(buf.push(entry(10, 2)).is_none());
        // Window full: smallest (10) comes out first.
        let out = buf.push(entry(20, 3)).unwrap();
        assert_eq!(out.timestamp, 10);
    }

    #[test]
    fn flush_drains_in_ascending_order() {
        let mut buf = ReorderBuffer::new(M2tsReorderWindow(10));
        buf.push(entry(5, 1));
        buf.push(entry(1, 2));
        buf.push(entry(3, 3));
        let flushed = buf.flush();
        let timestamps: Vec<u32> = flushed.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1, 3, 5]);
    }

    #[test]
    fn entry_round_trips_through_bytes() {
        let e = entry(0xDEADBEEF, 7);
        let bytes = e.to_bytes();
        let parsed = M2tsEntry::parse(&bytes).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn reader_reorders_then_flushes_at_eof() {
        let window = M2tsReorderWindow(3);
        let mut stream = Vec::new();
        for (ts, tag) in [(30u32, 1u8), (10, 2), (20, 3), (5, 4)] {
            stream.extend_from_slice(&entry(ts, tag).to_bytes());
        }
        let mut reader = M2tsReader::new(SliceSource::new(&stream), window);
        let mut out = Vec::new();
        while let Some(e) = reader.next_entry().unwrap() {
            out.push(e.timestamp);
        }
        // Sliding window of 3: entries become available once the window
        // fills, then the rest flush at EOF in ascending order.
        assert_eq!(out.len(), 4);
        assert_eq!(*out.iter().min().unwrap(), 5);
        assert_eq!(out[0], 10); // first pop once window hits 3: min(30,10,20)
    }
}
