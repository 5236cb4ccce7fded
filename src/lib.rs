//! # sixop - Neural FM Patch Generator
//!
//! Generates 6-operator FM synthesizer patches from a generative model and
//! serializes them to the Yamaha DX7 sysex dump formats.
//!
//! ## Architecture
//!
//! Umbrella crate coordinating:
//! - **sixop-voice** - Voice data model (155 parameters, range validation,
//!   flat-parameter mapping for the model hand-off)
//! - **sixop-sysex** - Bit-exact wire codec (single-voice and 32-voice bulk
//!   dumps, mod-128 checksum)
//! - **sixop-engine** - Threaded inference scheduler (double-buffered random
//!   batches, latent-keyed cache, debounced pre-generation)
//!
//! ## Quick Start
//!
//! ```ignore
//! use sixop::prelude::*;
//!
//! let engine = VoiceEngine::start(my_model_factory())?;
//! let handle = engine.handle();
//!
//! // Instant batch from the double buffer, serialized for transmission.
//! let batch = handle.take_buffered_random_voices();
//! let dump = sixop::sysex::pack_bulk(&batch)?;
//! midi_transport.send(&dump);
//! ```
//!
//! The generative model and the MIDI transport are external collaborators:
//! the model plugs in behind [`VoiceModel`], and the codec hands back
//! finished byte buffers for any transport to send verbatim.

/// Re-export of sixop-voice for direct access
pub use sixop_voice as voice;

/// Re-export of sixop-sysex for direct access
pub use sixop_sysex as sysex;

/// Re-export of sixop-engine for direct access
pub use sixop_engine as engine;

// Core types
pub use sixop_voice::{FieldViolation, Global, Oscillator, Voice};

// Engine surface
pub use sixop_engine::{
    Debouncer, EngineHandle, Latent, ModelFactory, VoiceEngine, VoiceModel, BATCH_VOICES,
    LATENT_DIM,
};

/// Common imports for working with the full pipeline.
pub mod prelude {
    pub use crate::engine::{
        Debouncer, EngineHandle, Latent, ModelFactory, VoiceEngine, VoiceModel,
    };
    pub use crate::sysex::{pack_bulk, pack_single, strip_envelope, unpack_bulk, unpack_single};
    pub use crate::voice::{Global, Oscillator, Voice};
}
