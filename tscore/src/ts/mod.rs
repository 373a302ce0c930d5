//! TS packet framing, PAT/PMT construction and the muxer.

pub mod muxer;
pub mod packet;
pub mod pat_pmt;

pub use muxer::{DropPolicy, Muxer};
pub use packet::{Pcr, TsHeader, PACKET_LEN, SYNC_BYTE};
pub use pat_pmt::{ProgramMap, ProgramMapEntry, PAT_PID};
