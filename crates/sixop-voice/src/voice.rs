//! Voice, oscillator, and global parameter types with range validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::OSC_COUNT;

/// One FM operator's parameter set.
///
/// Field order here is the canonical (bulk dump) parameter order; the
/// single-voice wire layout reorders a handful of these (see `sixop-sysex`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Oscillator {
    /// Envelope rates R1-R4 (0-99).
    pub eg_rate: [u8; 4],
    /// Envelope levels L1-L4 (0-99).
    pub eg_level: [u8; 4],
    /// Level-scaling breakpoint (0-99).
    pub breakpoint: u8,
    /// Level-scaling left depth (0-99).
    pub left_depth: u8,
    /// Level-scaling right depth (0-99).
    pub right_depth: u8,
    /// Level-scaling right curve (0-3).
    pub right_curve: u8,
    /// Level-scaling left curve (0-3).
    pub left_curve: u8,
    /// Detune (0-14, center 7).
    pub detune: u8,
    /// Envelope rate scaling (0-7).
    pub rate_scaling: u8,
    /// Key velocity sensitivity (0-7).
    pub key_velocity: u8,
    /// Amplitude modulation sensitivity (0-3).
    pub amp_mod_sens: u8,
    /// Output level (0-99).
    pub output_level: u8,
    /// Frequency coarse (0-31).
    pub freq_coarse: u8,
    /// Frequency mode: 0 = ratio, 1 = fixed.
    pub freq_mode: u8,
    /// Frequency fine (0-99).
    pub freq_fine: u8,
}

/// Per-voice global parameters: algorithm, feedback, LFO, pitch envelope,
/// transpose, and the 10-character patch name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Global {
    /// Pitch envelope rates PR1-PR4 (0-99).
    pub pitch_eg_rate: [u8; 4],
    /// Pitch envelope levels PL1-PL4 (0-99).
    pub pitch_eg_level: [u8; 4],
    /// Algorithm number (0-31).
    pub algorithm: u8,
    /// Oscillator key sync (0-1).
    pub osc_key_sync: u8,
    /// Feedback level (0-7).
    pub feedback: u8,
    /// LFO speed (0-99).
    pub lfo_speed: u8,
    /// LFO delay (0-99).
    pub lfo_delay: u8,
    /// LFO pitch modulation depth (0-99).
    pub lfo_pitch_mod_depth: u8,
    /// LFO amplitude modulation depth (0-99).
    pub lfo_amp_mod_depth: u8,
    /// LFO pitch modulation sensitivity (0-7).
    pub lfo_pitch_mod_sens: u8,
    /// LFO waveform (0-5).
    pub lfo_waveform: u8,
    /// LFO key sync (0-1).
    pub lfo_key_sync: u8,
    /// Transpose (0-48, center 24 = C3).
    pub transpose: u8,
    /// Patch name, 10 ASCII bytes (0-127).
    pub name: [u8; 10],
}

impl Global {
    /// Patch name as printable text; non-printable bytes become spaces.
    pub fn name_str(&self) -> String {
        self.name
            .iter()
            .map(|&b| {
                if (0x20..0x7f).contains(&b) {
                    b as char
                } else {
                    ' '
                }
            })
            .collect()
    }

    /// Set the patch name, space-padded or truncated to 10 characters.
    /// Bytes are masked to the 7-bit ASCII range.
    pub fn set_name(&mut self, name: &str) {
        let mut bytes = [b' '; 10];
        for (dst, src) in bytes.iter_mut().zip(name.bytes()) {
            *dst = src & 0x7F;
        }
        self.name = bytes;
    }
}

/// A complete patch: six oscillators plus the global block.
///
/// `Default` is the all-zero voice, which is valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Voice {
    pub oscillators: [Oscillator; OSC_COUNT],
    pub global: Global,
}

/// A parameter that failed range validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldViolation {
    /// Oscillator index, or `None` for a global parameter.
    pub oscillator: Option<usize>,
    pub field: &'static str,
    pub value: u8,
    pub max: u8,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.oscillator {
            Some(osc) => write!(
                f,
                "osc {} {} = {} exceeds {}",
                osc, self.field, self.value, self.max
            ),
            None => write!(f, "{} = {} exceeds {}", self.field, self.value, self.max),
        }
    }
}

impl std::error::Error for FieldViolation {}

impl Oscillator {
    fn first_violation(&self, index: usize) -> Option<FieldViolation> {
        let checks: [(&'static str, u8, u8); 21] = [
            ("eg_rate[0]", self.eg_rate[0], 99),
            ("eg_rate[1]", self.eg_rate[1], 99),
            ("eg_rate[2]", self.eg_rate[2], 99),
            ("eg_rate[3]", self.eg_rate[3], 99),
            ("eg_level[0]", self.eg_level[0], 99),
            ("eg_level[1]", self.eg_level[1], 99),
            ("eg_level[2]", self.eg_level[2], 99),
            ("eg_level[3]", self.eg_level[3], 99),
            ("breakpoint", self.breakpoint, 99),
            ("left_depth", self.left_depth, 99),
            ("right_depth", self.right_depth, 99),
            ("right_curve", self.right_curve, 3),
            ("left_curve", self.left_curve, 3),
            ("detune", self.detune, 14),
            ("rate_scaling", self.rate_scaling, 7),
            ("key_velocity", self.key_velocity, 7),
            ("amp_mod_sens", self.amp_mod_sens, 3),
            ("output_level", self.output_level, 99),
            ("freq_coarse", self.freq_coarse, 31),
            ("freq_mode", self.freq_mode, 1),
            ("freq_fine", self.freq_fine, 99),
        ];
        checks.iter().find_map(|&(field, value, max)| {
            (value > max).then_some(FieldViolation {
                oscillator: Some(index),
                field,
                value,
                max,
            })
        })
    }
}

impl Global {
    fn first_violation(&self) -> Option<FieldViolation> {
        let checks: [(&'static str, u8, u8); 19] = [
            ("pitch_eg_rate[0]", self.pitch_eg_rate[0], 99),
            ("pitch_eg_rate[1]", self.pitch_eg_rate[1], 99),
            ("pitch_eg_rate[2]", self.pitch_eg_rate[2], 99),
            ("pitch_eg_rate[3]", self.pitch_eg_rate[3], 99),
            ("pitch_eg_level[0]", self.pitch_eg_level[0], 99),
            ("pitch_eg_level[1]", self.pitch_eg_level[1], 99),
            ("pitch_eg_level[2]", self.pitch_eg_level[2], 99),
            ("pitch_eg_level[3]", self.pitch_eg_level[3], 99),
            ("algorithm", self.algorithm, 31),
            ("osc_key_sync", self.osc_key_sync, 1),
            ("feedback", self.feedback, 7),
            ("lfo_speed", self.lfo_speed, 99),
            ("lfo_delay", self.lfo_delay, 99),
            ("lfo_pitch_mod_depth", self.lfo_pitch_mod_depth, 99),
            ("lfo_amp_mod_depth", self.lfo_amp_mod_depth, 99),
            ("lfo_pitch_mod_sens", self.lfo_pitch_mod_sens, 7),
            ("lfo_waveform", self.lfo_waveform, 5),
            ("lfo_key_sync", self.lfo_key_sync, 1),
            ("transpose", self.transpose, 48),
        ];
        let violation = checks.iter().find_map(|&(field, value, max)| {
            (value > max).then_some(FieldViolation {
                oscillator: None,
                field,
                value,
                max,
            })
        });
        // Name bytes only need to be 7-bit; the content is unconstrained.
        violation.or_else(|| {
            self.name.iter().find_map(|&b| {
                (b > 127).then_some(FieldViolation {
                    oscillator: None,
                    field: "name",
                    value: b,
                    max: 127,
                })
            })
        })
    }
}

impl Voice {
    /// The first out-of-range parameter, if any. `None` means the voice is
    /// valid and safe to serialize.
    pub fn first_violation(&self) -> Option<FieldViolation> {
        self.oscillators
            .iter()
            .enumerate()
            .find_map(|(i, osc)| osc.first_violation(i))
            .or_else(|| self.global.first_violation())
    }

    /// Whether every parameter lies within its documented range.
    /// Pure and total; never panics.
    pub fn validate(&self) -> bool {
        self.first_violation().is_none()
    }
}
