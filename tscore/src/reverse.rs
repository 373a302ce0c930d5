//! Reverse-playback indexer.
//!
//! Two halves: recording, offered one primary-bearing access unit / picture
//! at a time during a forward scan (`maybe_remember_*`), and emission, which
//! walks the recorded entries tail-first re-reading bytes from the original
//! (seekable) source. Grounded in the teacher's own forward/offset
//! bookkeeping style (`FileOffset`, `ParamSetDict`) generalized to a
//! parallel-array reverse index.

use crate::config::ReverseFrequency;
use crate::error::{Error, Result};
use crate::h262avs::{Picture, H262_I_PICTURE_CODING};
use crate::io::{ByteSink, ByteSource};
use crate::offset::FileOffset;

use crate::access_unit::AccessUnit;
use crate::nal::UnitType;

#[derive(Debug, Clone)]
struct RecordedEntry {
    index: u32,
    start_file: u64,
    start_pkt: u32,
    data_len: usize,
    /// H.262 only: this entry is a sequence header run, not a picture.
    seq_offset: bool,
}

/// Parallel-array reverse index, built during a forward scan and later
/// driven tail-first by a [`ReverseEmitter`].
#[derive(Debug, Default)]
pub struct ReverseIndex {
    entries: Vec<RecordedEntry>,
    last_posn_added: i64,
    first_written: Option<u32>,
    pictures_kept: u32,
    pictures_written: u32,
}

impl ReverseIndex {
    pub fn new() -> Self {
        ReverseIndex {
            last_posn_added: -1,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pictures_kept(&self) -> u32 {
        self.pictures_kept
    }

    pub fn pictures_written(&self) -> u32 {
        self.pictures_written
    }

    pub fn first_written(&self) -> Option<u32> {
        self.first_written
    }

    pub fn last_posn_added(&self) -> i64 {
        self.last_posn_added
    }

    /// Offers an H.264 access unit for recording: kept iff its primary NAL
    /// is IDR or every slice in the AU is an I slice.
    pub fn maybe_remember_h264(&mut self, au: &AccessUnit) {
        let keep = match au.primary_nal() {
            Some(nal) => nal.nal_unit_type == UnitType::IdrSlice || au.all_slices_are_i(),
            None => false,
        };
        if !keep {
            return;
        }
        if let Some((start, len)) = au.byte_range() {
            self.remember(au.index, start, len, false);
        }
    }

    /// Offers an H.262 picture for recording: a bare sequence-header run is
    /// always kept (marked `seq_offset`); a coded frame is kept iff it's an
    /// I-picture.
    pub fn maybe_remember_h262(&mut self, index: u32, picture: &Picture) -> Result<()> {
        let byte_range = match (picture.items.first(), picture.items.last()) {
            (Some(first), Some(last)) => {
                let len = (last.unit.start_posn.infile + last.unit.data.len() as u64)
                    - first.unit.start_posn.infile;
                Some((first.unit.start_posn, len as usize))
            }
            _ => None,
        };

        if !picture.has_frame() {
            if let Some((start, len)) = byte_range {
                self.remember(index, start, len, true);
            }
            return Ok(());
        }

        let is_i = picture
            .h262_coding_type()?
            .map(|t| t == H262_I_PICTURE_CODING)
            .unwrap_or(false);
        if is_i {
            if let Some((start, len)) = byte_range {
                self.remember(index, start, len, false);
            }
        }
        Ok(())
    }

    fn remember(&mut self, index: u32, start: FileOffset, data_len: usize, seq_offset: bool) {
        self.entries.push(RecordedEntry {
            index,
            start_file: start.infile,
            start_pkt: start.inpacket,
            data_len,
            seq_offset,
        });
        self.last_posn_added = index as i64;
        self.pictures_kept += 1;
    }

    /// Resets the rewind cursor so a future forward scan restarts recording
    /// from entry 0; the underlying source must be seekable.
    pub fn rewind(&mut self) {
        self.last_posn_added = -1;
    }
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

/// Drives tail-first reverse emission of a [`ReverseIndex`] over a seekable
/// [`ByteSource`].
pub struct ReverseEmitter<'a, S: ByteSource> {
    index: &'a mut ReverseIndex,
    src: S,
}

impl<'a, S: ByteSource> ReverseEmitter<'a, S> {
    pub fn new(index: &'a mut ReverseIndex, src: S) -> Self {
        ReverseEmitter { index, src }
    }

    /// Writes recorded entries to `sink` from the tail, keeping one entry in
    /// every `frequency` uniformly. `prepend_params`, if given, is written
    /// once before the first emitted entry — the caller's job is to
    /// serialise the current SPS/PPS NALs for every target PID before the
    /// first emitted frame.
    pub fn emit<K: ByteSink>(
        &mut self,
        frequency: ReverseFrequency,
        prepend_params: Option<Vec<u8>>,
        sink: &mut K,
    ) -> Result<()> {
        if !self.src.is_seekable() {
            return Err(Error::Other(
                "reverse emission requires a seekable byte source".to_string(),
            ));
        }
        let mut prepend_params = prepend_params;
        let total = self.index.entries.len();
        for (i, entry) in self.index.entries.clone().iter().enumerate().rev() {
            let rank_from_tail = total - 1 - i;
            if !frequency.keeps(rank_from_tail) {
                continue;
            }
            if let Some(params) = prepend_params.take() {
                sink.write(&params)?;
            }
            self.src.seek(entry.start_file)?;
            let mut buf = vec![0u8; entry.data_len];
            read_exact(&mut self.src, &mut buf)?;
            sink.write(&buf)?;

            self.index.pictures_written += 1;
            if self.index.first_written.is_none() {
                self.index.first_written = Some(entry.index);
            }
        }
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{SliceSource, VecSink};

    fn index_with_entries(entries: &[(u32, u64, usize)]) -> ReverseIndex {
        let mut idx = ReverseIndex::new();
        for &(index, start_file, data_len) in entries {
            idx.remember(index, FileOffset::at(start_file), data_len, false);
        }
        idx
    }

    #[test]
    fn emits_tail_first_with_full_frequency() {
        // four "pictures", each 4 bytes, at indices 0, 12, 24, 36.
        let data: Vec<u8> = (0..16u8).collect();
        let mut idx = index_with_entries(&[(0, 0, 4), (12, 4, 4), (24, 8, 4), (36, 12, 4)]);

        let mut sink = VecSink::default();
        {
            let mut emitter = ReverseEmitter::new(&mut idx, SliceSource::new(&data));
            emitter
                .emit(ReverseFrequency::new(1), None, &mut sink)
                .unwrap();
        }

        assert_eq!(sink.0, vec![12, 13, 14, 15, 8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3]);
        assert_eq!(idx.pictures_written(), 4);
        assert_eq!(idx.first_written(), Some(36));
    }

    #[test]
    fn decimation_keeps_every_nth_entry_from_tail() {
        let data: Vec<u8> = (0..8u8).collect();
        let mut idx = index_with_entries(&[(0, 0, 2), (1, 2, 2), (2, 4, 2), (3, 6, 2)]);

        let mut sink = VecSink::default();
        {
            let mut emitter = ReverseEmitter::new(&mut idx, SliceSource::new(&data));
            emitter
                .emit(ReverseFrequency::new(2), None, &mut sink)
                .unwrap();
        }

        // rank_from_tail 0 (index 3) and 2 (index 1) are kept.
        assert_eq!(sink.0, vec![6, 7, 2, 3]);
        assert_eq!(idx.pictures_written(), 2);
    }

    #[test]
    fn rewind_resets_last_posn_added() {
        let mut idx = index_with_entries(&[(0, 0, 1)]);
        assert_eq!(idx.last_posn_added(), 0);
        idx.rewind();
        assert_eq!(idx.last_posn_added(), -1);
    }

    #[test]
    fn prepend_params_written_once_before_first_entry() {
        let data: Vec<u8> = (0..4u8).collect();
        let mut idx = index_with_entries(&[(0, 0, 2), (1, 2, 2)]);

        let mut sink = VecSink::default();
        {
            let mut emitter = ReverseEmitter::new(&mut idx, SliceSource::new(&data));
            emitter
                .emit(ReverseFrequency::new(1), Some(vec![0xAA]), &mut sink)
                .unwrap();
        }
        assert_eq!(sink.0, vec![0xAA, 2, 3, 0, 1]);
    }
}
