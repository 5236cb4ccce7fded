//! Voice data model for 6-operator FM patches.
//!
//! A [`Voice`] is the unit of generation: six [`Oscillator`] parameter sets
//! plus one [`Global`] block, 155 integer parameters in total. Construction
//! from a flat parameter sequence is fail-soft (a wrong-length input yields a
//! zero-filled voice); range checking is the separate, fail-hard
//! [`Voice::validate`] step. Wire serialization lives in `sixop-sysex`.

mod params;
mod voice;

pub use params::logits_to_params;
pub use voice::{FieldViolation, Global, Oscillator, Voice};

/// Oscillators per voice.
pub const OSC_COUNT: usize = 6;

/// Parameters per oscillator, in canonical (bulk dump) order.
pub const OSC_PARAMS: usize = 21;

/// Parameters in the global block, in canonical (bulk dump) order.
pub const GLOBAL_PARAMS: usize = 29;

/// Flat parameters per voice: 6 x 21 oscillator fields + 29 global fields.
pub const PARAM_COUNT: usize = OSC_COUNT * OSC_PARAMS + GLOBAL_PARAMS;
