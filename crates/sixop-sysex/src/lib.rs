//! Sysex codec for 6-operator FM voice dumps.
//!
//! Lossless, bit-exact translation between [`sixop_voice::Voice`] and the two
//! Yamaha wire formats: the 163-byte single-voice dump and the 4104-byte
//! 32-voice bulk dump. Packing is all-or-nothing: an out-of-range voice or a
//! wrong voice count produces an error, never a partial message. The codec is
//! pure and stateless; transmitting the finished byte buffer is the caller's
//! transport's job.

pub mod error;
pub use error::{Error, Result};

mod codec;
pub use codec::{
    checksum, pack_bulk, pack_single, strip_envelope, unpack_bulk, unpack_single, BULK_MESSAGE_LEN,
    BULK_VOICES, BULK_VOICE_BYTES, FORMAT_BULK, FORMAT_SINGLE, SINGLE_MESSAGE_LEN, SYSEX_END,
    SYSEX_START, YAMAHA_ID,
};
