//! Core engine for reading, parsing, transforming, reversing, and
//! re-emitting MPEG transport streams, program streams, and their
//! H.262/H.264/AVS video and AC-3/DTS/LPCM audio elementary streams.
//!
//! Each module below corresponds to one stage of the pipeline: bytes come in
//! through a [`io::ByteSource`], get demultiplexed and reframed through
//! increasingly structured stages (B through K), and leave through a
//! [`io::ByteSink`].

pub mod ac3;
pub mod access_unit;
pub mod bitreader;
pub mod config;
pub mod error;
pub mod es;
pub mod h262avs;
pub mod io;
pub mod m2ts;
pub mod nal;
pub mod offset;
pub mod params;
pub mod pes;
pub mod ps;
pub mod reverse;
pub mod ts;

pub use error::{Error, Result};
