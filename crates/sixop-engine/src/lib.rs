//! Threaded voice generation engine.
//!
//! A single dedicated worker thread owns the generative model and serves a
//! FIFO request queue; callers submit work through a clonable
//! [`EngineHandle`] and receive results on per-request channels. Two read
//! paths answer without inference: a double-buffered batch of random voices
//! and a latent-keyed voice cache. A [`Debouncer`] turns bursty latent
//! changes into a bounded rate of cache pre-generation.
//!
//! The model is plugged in behind [`VoiceModel`]; this crate contains no ML
//! framework dependencies.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sixop_engine::{Debouncer, VoiceEngine};
//!
//! let engine = VoiceEngine::start(my_model_factory())?;
//! let handle = engine.handle();
//!
//! // Instant path: pre-computed random batch.
//! let batch = handle.take_buffered_random_voices();
//!
//! // Custom path: one voice per latent vector, cached.
//! let rx = handle.request_cached_custom_voice([0.0; 8]);
//! let voice = rx.recv()?;
//!
//! // Slider path: debounced cache warming.
//! let debouncer = Debouncer::new(handle)?;
//! debouncer.notify([0.1; 8]);
//! ```

pub mod error;
pub use error::{Error, Result};

mod model;
pub use model::{Latent, ModelFactory, VoiceModel, BATCH_VOICES, LATENT_DIM};

mod cache;
pub use cache::{LatentKey, MAX_CACHE_SIZE};

mod engine;
pub use engine::{EngineHandle, VoiceEngine};

mod debounce;
pub use debounce::{Debouncer, DEBOUNCE_DELAY};
