//! Typed errors for the core parsing/reframing engine.
//!
//! Older MPEG tooling tends to return `extern int` codes that conflate a
//! real error with plain EOF. We replace that with a proper enum: EOF is
//! either handled by the caller explicitly (`Option`-shaped returns at the
//! few spots that need three-way results) or represented here as
//! `UnexpectedEof` when it occurs in the middle of a structured record.

use failure::Fail;

/// Error kinds surfaced by the core parsing/reframing engine.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] std::io::Error),

    #[fail(display = "unexpected end of file inside a structured record")]
    UnexpectedEof,

    #[fail(display = "lost sync: {}", _0)]
    LostSync(String),

    #[fail(display = "broken unit: {}", _0)]
    BrokenUnit(String),

    #[fail(display = "bad frame size: {}", _0)]
    BadFrameSize(String),

    #[fail(display = "bad stream id: 0x{:02x}", _0)]
    BadStreamId(u8),

    #[fail(display = "slice references unknown parameter set id {}", _0)]
    MissingParamSet(u32),

    #[fail(display = "lost field sync: two fields with different frame_num twice in a row")]
    LostFieldSync,

    #[fail(display = "unsupported H.264 profile_idc {}", _0)]
    ProfileUnsupported(u8),

    #[fail(display = "forbidden_zero_bit set on NAL header")]
    ForbiddenBitSet,

    #[fail(display = "ran out of bits while reading {}", _0)]
    OutOfBits(&'static str),

    #[fail(display = "{}", _0)]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Build an ad hoc [`Error::Other`], mirroring the teacher's `format_err!`
/// call sites for conditions not worth a dedicated variant.
#[macro_export]
macro_rules! other_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Other(format!($($arg)*))
    };
}
