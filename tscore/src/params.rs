//! Parameter dictionary: insert-or-overwrite by `id`, most-recent write
//! wins. Grounded on the teacher's `h264::Parameters` (built once from an
//! SPS/PPS pair in `rtsp/src/client/video/h264.rs`) generalized here into a
//! small per-id map, since the core parsers see SPS/PPS NALs arrive (and get
//! replaced) throughout a stream rather than once per session.
//!
//! Older MPEG tooling tends to keep file offset and byte length in separate
//! arrays alongside the parsed value, which invites the two arrays drifting
//! out of alignment after a resize; here each entry's value, file offset and
//! byte length live together in one map value, so there is no separate
//! array to misalign in the first place.

use std::collections::HashMap;

use crate::offset::FileOffset;

/// One dictionary entry: the decoded value plus the file position and byte
/// length of the NAL it was parsed from, used by the reverse writer to
/// re-emit parameter sets verbatim.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub value: T,
    pub start_posn: FileOffset,
    pub byte_len: usize,
}

/// `u32 id -> ParamSetData` map. Generic over the stored value so the same
/// type serves both the SPS and PPS dictionaries.
#[derive(Debug, Clone, Default)]
pub struct ParamSetDict<T> {
    entries: HashMap<u32, Entry<T>>,
}

impl<T> ParamSetDict<T> {
    pub fn new() -> Self {
        ParamSetDict {
            entries: HashMap::new(),
        }
    }

    /// Inserts or overwrites the entry for `id`: an immediately following
    /// `lookup(id)` returns `value`.
    pub fn remember(&mut self, id: u32, value: T, start_posn: FileOffset, byte_len: usize) {
        self.entries.insert(
            id,
            Entry {
                value,
                start_posn,
                byte_len,
            },
        );
    }

    pub fn lookup(&self, id: u32) -> Option<&T> {
        self.entries.get(&id).map(|e| &e.value)
    }

    pub fn entry(&self, id: u32) -> Option<&Entry<T>> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ParamSetDict<crate::nal::sps::SeqParameterSet> {
    /// Convenience accessor: luma pixel dimensions for the SPS stored
    /// under `sps_id`, or `None` if that id hasn't been seen yet.
    pub fn pixel_dimensions(&self, sps_id: u32) -> Option<(u32, u32)> {
        self.lookup(sps_id).map(|sps| sps.pixel_dimensions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::sps::SeqParameterSet;

    #[test]
    fn most_recent_write_wins() {
        let mut dict: ParamSetDict<u32> = ParamSetDict::new();
        dict.remember(0, 1, FileOffset::at(10), 5);
        dict.remember(0, 2, FileOffset::at(20), 6);
        assert_eq!(*dict.lookup(0).unwrap(), 2);
        assert_eq!(dict.entry(0).unwrap().start_posn.infile, 20);
        assert_eq!(dict.entry(0).unwrap().byte_len, 6);
    }

    #[test]
    fn missing_id_is_none() {
        let dict: ParamSetDict<u32> = ParamSetDict::new();
        assert!(dict.lookup(5).is_none());
    }

    #[test]
    fn pixel_dimensions_delegates_to_sps() {
        let mut dict: ParamSetDict<SeqParameterSet> = ParamSetDict::new();
        let mut sps = SeqParameterSet::default();
        sps.frame_mbs_only_flag = true;
        sps.pic_width_in_mbs_minus1 = 10;
        sps.pic_height_in_map_units_minus1 = 7;
        dict.remember(0, sps, FileOffset::default(), 0);
        assert_eq!(dict.pixel_dimensions(0), Some((176, 128)));
        assert_eq!(dict.pixel_dimensions(1), None);
    }
}
