//! Generative model interface.
//!
//! The engine treats the model as an opaque decoder from latent vectors to
//! per-parameter class logits. The model is not assumed thread-safe; the
//! engine owns exactly one instance on its worker thread and the factory
//! closure runs there too, so construction never happens on a caller thread.

use crate::error::Result;

/// Latent dimensionality agreed with the model.
pub const LATENT_DIM: usize = 8;

/// Batch size of the "random voices" call, one full bulk dump's worth.
pub const BATCH_VOICES: usize = 32;

/// A latent vector controlling which voice the model produces.
pub type Latent = [f32; LATENT_DIM];

/// A decoder from latent vectors to voice parameter logits.
pub trait VoiceModel: Send {
    /// Logit classes per parameter in [`VoiceModel::generate`] output.
    fn vocab_size(&self) -> usize;

    /// Decode a `[batch, LATENT_DIM]` row-major latent tensor into logits
    /// shaped `[batch, PARAM_COUNT, vocab_size]`, flattened row-major.
    ///
    /// The engine reduces each parameter's logit row by argmax; the model
    /// never deals in concrete parameter bytes.
    fn generate(&mut self, latents: &[f32], batch: usize) -> Result<Vec<f32>>;
}

/// Creates the model on the engine thread.
pub type ModelFactory = Box<dyn FnOnce() -> Result<Box<dyn VoiceModel>> + Send>;
