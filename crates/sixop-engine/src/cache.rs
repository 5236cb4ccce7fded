//! Latent-keyed voice cache with FIFO eviction.
//!
//! Keys quantize each latent component to thousandths, so latents closer
//! than 1/1000 per axis collide on purpose; approximate equality buys a
//! practical hit rate on slider-driven input. Eviction is strict insertion
//! order: a read hit does not refresh an entry's position.

use crate::model::{Latent, LATENT_DIM};
use sixop_voice::Voice;
use std::collections::{HashMap, VecDeque};

/// Maximum cached voices before the oldest insertion is evicted.
pub const MAX_CACHE_SIZE: usize = 64;

/// A latent vector quantized to thousandths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatentKey([i32; LATENT_DIM]);

impl LatentKey {
    /// Truncate each component toward zero at three decimal places.
    pub fn quantize(latent: &Latent) -> Self {
        let mut key = [0i32; LATENT_DIM];
        for (k, &v) in key.iter_mut().zip(latent.iter()) {
            *k = (v * 1000.0) as i32;
        }
        Self(key)
    }
}

pub(crate) struct VoiceCache {
    entries: HashMap<LatentKey, Voice>,
    order: VecDeque<LatentKey>,
    capacity: usize,
}

impl VoiceCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn contains(&self, key: &LatentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a voice. Does not affect eviction order.
    pub(crate) fn get(&self, key: &LatentKey) -> Option<Voice> {
        self.entries.get(key).cloned()
    }

    /// Insert a voice, evicting the oldest insertion first when at capacity.
    /// Re-inserting an existing key replaces the value without changing
    /// its position in the eviction order.
    pub(crate) fn insert(&mut self, key: LatentKey, voice: Voice) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, voice);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                tracing::debug!("evicted oldest cached voice");
            }
        }
        self.entries.insert(key, voice);
        self.order.push_back(key);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
