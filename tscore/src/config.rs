//! Runtime-configurable knobs the core accepts, grouped into small structs
//! passed into specific constructors rather than one god-object, the same
//! shape the teacher uses for `h264::Parameters` and `client::Credentials`.

/// Governs `private_stream_1` substream classification in the PS reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvdMode(pub bool);

impl Default for DvdMode {
    fn default() -> Self {
        DvdMode(false)
    }
}

/// Decimation during reverse emission. Must be `>= 1`; `1` keeps
/// every recorded entry, `2` keeps every other, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseFrequency(pub u32);

impl ReverseFrequency {
    pub fn new(f: u32) -> Self {
        assert!(f >= 1, "reverse_frequency must be >= 1");
        ReverseFrequency(f)
    }

    /// Whether the `i`-th (0-based, from the end) entry should be kept.
    pub fn keeps(&self, i: usize) -> bool {
        i % (self.0 as usize) == 0
    }
}

impl Default for ReverseFrequency {
    fn default() -> Self {
        ReverseFrequency(1)
    }
}

/// M2TS reorder buffer window. Default 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M2tsReorderWindow(pub u32);

impl Default for M2tsReorderWindow {
    fn default() -> Self {
        M2tsReorderWindow(4)
    }
}

/// Dolby AC-3 stream type tag carried in the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ac3DolbyStreamType {
    Dvb,
    Atsc,
}

impl Ac3DolbyStreamType {
    pub fn stream_type_byte(self) -> u8 {
        match self {
            Ac3DolbyStreamType::Dvb => 0x06,
            Ac3DolbyStreamType::Atsc => 0x81,
        }
    }
}

/// Which video codec the ES scanner/assembler should expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStreamSelection {
    Auto,
    H262,
    H264,
    Avs,
    Explicit(u8),
}
