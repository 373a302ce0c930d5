//! Byte-level ES-unit scanner.
//!
//! Finds `00 00 01`-prefixed units inside an arbitrary byte source, whether
//! that source is raw ES or the demultiplexed payload stream handed up by
//! the PES layer. Grounded on the teacher's own NAL splitter
//! (`frame-source/src/h264_annexb_splitter.rs`): a `memchr` finder scanning
//! a growable buffer, remembering the previous unit's start until the next
//! prefix (or EOF) closes it off.

use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::offset::FileOffset;

/// An elementary-stream unit: a start-code-prefixed run of bytes (NAL unit
/// for H.264, or an H.262/AVS start-code item).
///
/// `data` includes the `00 00 01` (or `00 00 00 01`) prefix. Immutable once
/// built; owned by its producer until moved into an enclosing structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsUnit {
    pub start_posn: FileOffset,
    pub data: Vec<u8>,
    /// The byte immediately following the start-code prefix.
    pub start_code: u8,
}

impl EsUnit {
    /// The unit's payload, i.e. `data` with the start-code prefix (3 or 4
    /// bytes) and the `start_code` byte itself stripped.
    pub fn payload(&self) -> &[u8] {
        let prefix_len = self.prefix_len();
        &self.data[prefix_len + 1..]
    }

    /// 3 or 4, depending on whether a leading zero byte preceded `00 00 01`.
    pub fn prefix_len(&self) -> usize {
        if self.data.len() >= 4 && self.data[0] == 0 && self.data[1] == 0 && self.data[2] == 0 {
            4
        } else {
            3
        }
    }
}

/// Scans a [`ByteSource`] for `00 00 01`-prefixed units.
///
/// Each call to [`next_unit`](Scanner::next_unit) returns the unit that was
/// pending (bytes from its start-code to the byte before the next start-code
/// or EOF), or `Ok(None)` at end of stream.
pub struct Scanner<S: ByteSource> {
    src: S,
    buf: Vec<u8>,
    /// File offset corresponding to `buf[0]`.
    buf_base: u64,
    eof: bool,
    /// Local index (into `buf`) of the first byte of the prefix of the unit
    /// currently being accumulated, if any.
    pending_start: Option<usize>,
    /// Local index from which the next `memmem` search should resume; always
    /// `>= ` any previously found prefix's end, so a found match is never
    /// re-discovered.
    search_pos: usize,
}

const READ_CHUNK: usize = 64 * 1024;

impl<S: ByteSource> Scanner<S> {
    pub fn new(src: S) -> Self {
        Scanner {
            src,
            buf: Vec::new(),
            buf_base: 0,
            eof: false,
            pending_start: None,
            search_pos: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.src
    }

    fn fill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }
        let mut chunk = vec![0u8; READ_CHUNK];
        let n = self.src.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn find_prefix_from(&self, from: usize) -> Option<usize> {
        if from >= self.buf.len() {
            return None;
        }
        memchr::memmem::find(&self.buf[from..], &[0x00, 0x00, 0x01]).map(|i| i + from)
    }

    /// Returns the next ES unit, or `None` at end of stream.
    ///
    /// Recoverable failures are surfaced as `Err(Error::BrokenUnit(_))` —
    /// the caller may skip and call again. `Err(Error::Io(_))` is fatal.
    pub fn next_unit(&mut self) -> Result<Option<EsUnit>> {
        loop {
            if let Some(idx) = self.find_prefix_from(self.search_pos) {
                let four_byte = idx > 0 && self.buf[idx - 1] == 0x00;
                let prefix_start = if four_byte { idx - 1 } else { idx };
                self.search_pos = idx + 3;

                if let Some(prev_start) = self.pending_start.take() {
                    let unit = self.build_unit(prev_start, prefix_start)?;
                    self.pending_start = Some(prefix_start);
                    self.compact(prefix_start);
                    return Ok(Some(unit));
                } else {
                    self.pending_start = Some(prefix_start);
                    continue;
                }
            }
            if self.eof {
                if let Some(prev_start) = self.pending_start.take() {
                    let unit = self.build_unit(prev_start, self.buf.len())?;
                    self.compact(self.buf.len());
                    return Ok(Some(unit));
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Drops buffer bytes strictly before `keep_from` (the start of the unit
    /// now pending), shifting indices accordingly. Bounds memory use on long
    /// streams.
    fn compact(&mut self, keep_from: usize) {
        if keep_from > 0 {
            self.buf.drain(0..keep_from);
            self.buf_base += keep_from as u64;
            self.search_pos -= keep_from;
            if let Some(p) = self.pending_start.as_mut() {
                *p -= keep_from;
            }
        }
    }

    fn build_unit(&self, start: usize, end: usize) -> Result<EsUnit> {
        if end <= start {
            return Err(Error::BrokenUnit("zero-length ES unit".into()));
        }
        let data = self.buf[start..end].to_vec();
        let prefix_len = if data.len() >= 4 && data[0] == 0 && data[1] == 0 && data[2] == 0 {
            4
        } else {
            3
        };
        if data.len() <= prefix_len {
            return Err(Error::BrokenUnit("ES unit has no start_code byte".into()));
        }
        let start_code = data[prefix_len];
        Ok(EsUnit {
            start_posn: FileOffset::at(self.buf_base + start as u64),
            data,
            start_code,
        })
    }
}
