//! Flat parameter sequences: the hand-off format of the generative model.
//!
//! A voice flattens to 155 bytes in canonical (bulk dump) order: 21 fields
//! per oscillator for oscillators 1-6, then the 29 global fields. The model
//! side produces this sequence by taking the most likely class per parameter
//! from its output logits.

use crate::voice::{Global, Oscillator, Voice};
use crate::{GLOBAL_PARAMS, OSC_PARAMS, PARAM_COUNT};

impl Oscillator {
    fn from_flat(params: &[u8]) -> Self {
        debug_assert_eq!(params.len(), OSC_PARAMS);
        Self {
            eg_rate: [params[0], params[1], params[2], params[3]],
            eg_level: [params[4], params[5], params[6], params[7]],
            breakpoint: params[8],
            left_depth: params[9],
            right_depth: params[10],
            right_curve: params[11],
            left_curve: params[12],
            detune: params[13],
            rate_scaling: params[14],
            key_velocity: params[15],
            amp_mod_sens: params[16],
            output_level: params[17],
            freq_coarse: params[18],
            freq_mode: params[19],
            freq_fine: params[20],
        }
    }

    fn to_flat(self) -> [u8; OSC_PARAMS] {
        [
            self.eg_rate[0],
            self.eg_rate[1],
            self.eg_rate[2],
            self.eg_rate[3],
            self.eg_level[0],
            self.eg_level[1],
            self.eg_level[2],
            self.eg_level[3],
            self.breakpoint,
            self.left_depth,
            self.right_depth,
            self.right_curve,
            self.left_curve,
            self.detune,
            self.rate_scaling,
            self.key_velocity,
            self.amp_mod_sens,
            self.output_level,
            self.freq_coarse,
            self.freq_mode,
            self.freq_fine,
        ]
    }
}

impl Global {
    fn from_flat(params: &[u8]) -> Self {
        debug_assert_eq!(params.len(), GLOBAL_PARAMS);
        let mut name = [0u8; 10];
        name.copy_from_slice(&params[19..29]);
        Self {
            pitch_eg_rate: [params[0], params[1], params[2], params[3]],
            pitch_eg_level: [params[4], params[5], params[6], params[7]],
            algorithm: params[8],
            osc_key_sync: params[9],
            feedback: params[10],
            lfo_speed: params[11],
            lfo_delay: params[12],
            lfo_pitch_mod_depth: params[13],
            lfo_amp_mod_depth: params[14],
            lfo_pitch_mod_sens: params[15],
            lfo_waveform: params[16],
            lfo_key_sync: params[17],
            transpose: params[18],
            name,
        }
    }

    fn to_flat(self) -> [u8; GLOBAL_PARAMS] {
        let mut flat = [0u8; GLOBAL_PARAMS];
        flat[0..4].copy_from_slice(&self.pitch_eg_rate);
        flat[4..8].copy_from_slice(&self.pitch_eg_level);
        flat[8] = self.algorithm;
        flat[9] = self.osc_key_sync;
        flat[10] = self.feedback;
        flat[11] = self.lfo_speed;
        flat[12] = self.lfo_delay;
        flat[13] = self.lfo_pitch_mod_depth;
        flat[14] = self.lfo_amp_mod_depth;
        flat[15] = self.lfo_pitch_mod_sens;
        flat[16] = self.lfo_waveform;
        flat[17] = self.lfo_key_sync;
        flat[18] = self.transpose;
        flat[19..29].copy_from_slice(&self.name);
        flat
    }
}

impl Voice {
    /// Build a voice from a flat 155-parameter sequence in canonical order.
    ///
    /// Fail-soft: any other length yields a zero-filled voice. No range
    /// checking happens here; call [`Voice::validate`] before serializing.
    pub fn from_flat_params(params: &[u8]) -> Self {
        if params.len() != PARAM_COUNT {
            tracing::debug!(
                got = params.len(),
                expected = PARAM_COUNT,
                "flat parameter sequence has wrong length, returning zero voice"
            );
            return Self::default();
        }

        let mut voice = Self::default();
        for (i, osc) in voice.oscillators.iter_mut().enumerate() {
            *osc = Oscillator::from_flat(&params[i * OSC_PARAMS..(i + 1) * OSC_PARAMS]);
        }
        voice.global = Global::from_flat(&params[PARAM_COUNT - GLOBAL_PARAMS..]);
        voice
    }

    /// Flatten to the canonical 155-parameter sequence. Exact inverse of
    /// [`Voice::from_flat_params`].
    pub fn to_flat_params(&self) -> [u8; PARAM_COUNT] {
        let mut flat = [0u8; PARAM_COUNT];
        for (i, osc) in self.oscillators.iter().enumerate() {
            flat[i * OSC_PARAMS..(i + 1) * OSC_PARAMS].copy_from_slice(&osc.to_flat());
        }
        flat[PARAM_COUNT - GLOBAL_PARAMS..].copy_from_slice(&self.global.to_flat());
        flat
    }
}

/// Reduce one voice's model output logits to a flat parameter sequence.
///
/// `logits` holds `PARAM_COUNT * vocab` values, one row of `vocab` class
/// scores per parameter in canonical order; each parameter takes the index
/// of its highest score (first wins on ties), truncated to a byte. A short
/// input produces a short sequence, which [`Voice::from_flat_params`] then
/// turns into a zero voice.
pub fn logits_to_params(logits: &[f32], vocab: usize) -> Vec<u8> {
    if vocab == 0 {
        return Vec::new();
    }
    logits.chunks_exact(vocab).map(|row| argmax(row) as u8).collect()
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &score) in row.iter().enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}
