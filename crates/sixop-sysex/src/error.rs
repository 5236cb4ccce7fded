//! Error types for the sysex codec.

use sixop_voice::FieldViolation;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bulk dump requires {expected} voices, got {got}")]
    VoiceCount { expected: usize, got: usize },

    #[error("invalid voice at slot {slot}: {violation}")]
    InvalidVoice {
        slot: usize,
        violation: FieldViolation,
    },

    #[error("message too short: need {expected} bytes, got {got}")]
    ShortBuffer { expected: usize, got: usize },

    #[error("not a voice dump message (bad framing or format byte)")]
    BadFraming,

    #[error("checksum mismatch: computed {expected:#04x}, message carries {got:#04x}")]
    ChecksumMismatch { expected: u8, got: u8 },
}
