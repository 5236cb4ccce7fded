//! Pack/unpack between voices and the two wire layouts.
//!
//! Both formats share the envelope
//! `F0 43 00 <format> <count-hi> <count-lo> <payload> <checksum> F7`.
//! The single-voice payload is one byte per parameter in the single-voice
//! field order; the bulk payload packs several fields per byte and holds
//! exactly 32 voices. The mask/shift table below is used in both directions,
//! so every combined byte is deconstructed exactly as it was constructed.

use crate::error::{Error, Result};
use sixop_voice::{Global, Oscillator, Voice, OSC_COUNT};

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const YAMAHA_ID: u8 = 0x43;

/// Format byte for a single-voice dump.
pub const FORMAT_SINGLE: u8 = 0x00;
/// Format byte for a 32-voice bulk dump.
pub const FORMAT_BULK: u8 = 0x09;

/// Voices in a bulk dump. Exactly this many, always.
pub const BULK_VOICES: usize = 32;
/// Packed bytes per voice in the bulk payload: 6 x 17 oscillator bytes
/// plus 26 global bytes.
pub const BULK_VOICE_BYTES: usize = 128;

const SUB_STATUS: u8 = 0x00;
const HEADER_LEN: usize = 6;
const SINGLE_PAYLOAD_LEN: usize = 155;
const BULK_PAYLOAD_LEN: usize = BULK_VOICES * BULK_VOICE_BYTES;

/// Total single-voice message length: header + 155 + checksum + end.
pub const SINGLE_MESSAGE_LEN: usize = HEADER_LEN + SINGLE_PAYLOAD_LEN + 2;
/// Total bulk message length: header + 4096 + checksum + end.
pub const BULK_MESSAGE_LEN: usize = HEADER_LEN + BULK_PAYLOAD_LEN + 2;

/// Mod-128 checksum over payload bytes: the value that zeroes the low
/// 7 bits of `sum(payload) + checksum`.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum: u32 = payload.iter().map(|&b| u32::from(b)).sum();
    ((128 - (sum & 127)) % 128) as u8
}

/// Drop a leading `F0` and trailing `F7` if present. Some plugin hosts
/// inject sysex without the framing bytes; this is that transport-side trim.
pub fn strip_envelope(message: &[u8]) -> &[u8] {
    let mut inner = message;
    if let [SYSEX_START, rest @ ..] = inner {
        inner = rest;
    }
    if let [rest @ .., SYSEX_END] = inner {
        inner = rest;
    }
    inner
}

/// Pack one voice as a 163-byte single-voice dump.
pub fn pack_single(voice: &Voice) -> Result<Vec<u8>> {
    if let Some(violation) = voice.first_violation() {
        return Err(Error::InvalidVoice { slot: 0, violation });
    }

    let mut msg = Vec::with_capacity(SINGLE_MESSAGE_LEN);
    msg.extend_from_slice(&[SYSEX_START, YAMAHA_ID, SUB_STATUS, FORMAT_SINGLE, 0x01, 0x1B]);
    for osc in &voice.oscillators {
        emit_single_osc(osc, &mut msg);
    }
    emit_single_global(&voice.global, &mut msg);
    msg.push(checksum(&msg[HEADER_LEN..]));
    msg.push(SYSEX_END);
    Ok(msg)
}

/// Decode a single-voice dump. Verifies framing and checksum.
pub fn unpack_single(data: &[u8]) -> Result<Voice> {
    let payload = checked_payload(data, FORMAT_SINGLE, [0x01, 0x1B], SINGLE_MESSAGE_LEN)?;

    let mut voice = Voice::default();
    for (i, osc) in voice.oscillators.iter_mut().enumerate() {
        *osc = parse_single_osc(&payload[i * 21..(i + 1) * 21]);
    }
    voice.global = parse_single_global(&payload[OSC_COUNT * 21..]);
    Ok(voice)
}

/// Pack exactly 32 voices as a 4104-byte bulk dump.
///
/// All-or-nothing: a wrong count or any invalid voice is an error and no
/// bytes are produced.
pub fn pack_bulk(voices: &[Voice]) -> Result<Vec<u8>> {
    if voices.len() != BULK_VOICES {
        return Err(Error::VoiceCount {
            expected: BULK_VOICES,
            got: voices.len(),
        });
    }
    for (slot, voice) in voices.iter().enumerate() {
        if let Some(violation) = voice.first_violation() {
            tracing::warn!(slot, %violation, "refusing to pack bulk dump");
            return Err(Error::InvalidVoice { slot, violation });
        }
    }

    let mut msg = Vec::with_capacity(BULK_MESSAGE_LEN);
    msg.extend_from_slice(&[SYSEX_START, YAMAHA_ID, SUB_STATUS, FORMAT_BULK, 0x20, 0x00]);
    for voice in voices {
        for osc in &voice.oscillators {
            emit_bulk_osc(osc, &mut msg);
        }
        emit_bulk_global(&voice.global, &mut msg);
    }
    msg.push(checksum(&msg[HEADER_LEN..]));
    msg.push(SYSEX_END);
    Ok(msg)
}

/// Decode a bulk dump into its 32 voices. Verifies framing and checksum.
pub fn unpack_bulk(data: &[u8]) -> Result<Vec<Voice>> {
    let payload = checked_payload(data, FORMAT_BULK, [0x20, 0x00], BULK_MESSAGE_LEN)?;

    let mut voices = Vec::with_capacity(BULK_VOICES);
    for slot in payload.chunks_exact(BULK_VOICE_BYTES) {
        let mut voice = Voice::default();
        for (i, osc) in voice.oscillators.iter_mut().enumerate() {
            *osc = parse_bulk_osc(&slot[i * 17..(i + 1) * 17]);
        }
        voice.global = parse_bulk_global(&slot[OSC_COUNT * 17..]);
        voices.push(voice);
    }
    Ok(voices)
}

/// Validate envelope framing and checksum, returning the payload slice.
fn checked_payload(
    data: &[u8],
    format: u8,
    count: [u8; 2],
    message_len: usize,
) -> Result<&[u8]> {
    if data.len() < message_len {
        return Err(Error::ShortBuffer {
            expected: message_len,
            got: data.len(),
        });
    }
    let framed = data[0] == SYSEX_START
        && data[1] == YAMAHA_ID
        && data[3] == format
        && data[4..6] == count
        && data[message_len - 1] == SYSEX_END;
    if !framed {
        return Err(Error::BadFraming);
    }

    let payload = &data[HEADER_LEN..message_len - 2];
    let stored = data[message_len - 2];
    let computed = checksum(payload);
    if computed != stored {
        tracing::debug!(computed, stored, "voice dump checksum mismatch");
        return Err(Error::ChecksumMismatch {
            expected: computed,
            got: stored,
        });
    }
    Ok(payload)
}

// --- single-voice layout: one byte per field, reordered vs. canonical ---
//
// Oscillator byte order: R1-R4 L1-L4 BP LD RD, LC RC (curves swapped),
// RS, AMS KVS (swapped), OL, M, FC, FF, DET (moved last).

fn emit_single_osc(osc: &Oscillator, out: &mut Vec<u8>) {
    for r in osc.eg_rate {
        out.push(r & 0x7F);
    }
    for l in osc.eg_level {
        out.push(l & 0x7F);
    }
    out.push(osc.breakpoint & 0x7F);
    out.push(osc.left_depth & 0x7F);
    out.push(osc.right_depth & 0x7F);
    out.push(osc.left_curve & 0x7F);
    out.push(osc.right_curve & 0x7F);
    out.push(osc.rate_scaling & 0x7F);
    out.push(osc.amp_mod_sens & 0x7F);
    out.push(osc.key_velocity & 0x7F);
    out.push(osc.output_level & 0x7F);
    out.push(osc.freq_mode & 0x7F);
    out.push(osc.freq_coarse & 0x7F);
    out.push(osc.freq_fine & 0x7F);
    out.push(osc.detune & 0x7F);
}

fn parse_single_osc(data: &[u8]) -> Oscillator {
    Oscillator {
        eg_rate: [data[0], data[1], data[2], data[3]],
        eg_level: [data[4], data[5], data[6], data[7]],
        breakpoint: data[8],
        left_depth: data[9],
        right_depth: data[10],
        left_curve: data[11],
        right_curve: data[12],
        rate_scaling: data[13],
        amp_mod_sens: data[14],
        key_velocity: data[15],
        output_level: data[16],
        freq_mode: data[17],
        freq_coarse: data[18],
        freq_fine: data[19],
        detune: data[20],
    }
}

fn emit_single_global(global: &Global, out: &mut Vec<u8>) {
    for r in global.pitch_eg_rate {
        out.push(r & 0x7F);
    }
    for l in global.pitch_eg_level {
        out.push(l & 0x7F);
    }
    out.push(global.algorithm & 0x7F);
    out.push(global.osc_key_sync & 0x7F);
    out.push(global.feedback & 0x7F);
    out.push(global.lfo_speed & 0x7F);
    out.push(global.lfo_delay & 0x7F);
    out.push(global.lfo_pitch_mod_depth & 0x7F);
    out.push(global.lfo_amp_mod_depth & 0x7F);
    out.push(global.lfo_pitch_mod_sens & 0x7F);
    out.push(global.lfo_waveform & 0x7F);
    out.push(global.lfo_key_sync & 0x7F);
    out.push(global.transpose & 0x3F);
    for b in global.name {
        out.push(b & 0x7F);
    }
}

fn parse_single_global(data: &[u8]) -> Global {
    let mut name = [0u8; 10];
    name.copy_from_slice(&data[19..29]);
    Global {
        pitch_eg_rate: [data[0], data[1], data[2], data[3]],
        pitch_eg_level: [data[4], data[5], data[6], data[7]],
        algorithm: data[8],
        osc_key_sync: data[9],
        feedback: data[10],
        lfo_speed: data[11],
        lfo_delay: data[12],
        lfo_pitch_mod_depth: data[13],
        lfo_amp_mod_depth: data[14],
        lfo_pitch_mod_sens: data[15],
        lfo_waveform: data[16],
        lfo_key_sync: data[17],
        transpose: data[18],
        name,
    }
}

// --- bulk layout: shared-byte packing, 17 bytes per oscillator + 26 global ---

fn emit_bulk_osc(osc: &Oscillator, out: &mut Vec<u8>) {
    for r in osc.eg_rate {
        out.push(r & 0x7F);
    }
    for l in osc.eg_level {
        out.push(l & 0x7F);
    }
    out.push(osc.breakpoint & 0x7F);
    out.push(osc.left_depth & 0x7F);
    out.push(osc.right_depth & 0x7F);
    out.push((osc.right_curve & 0x03) << 2 | (osc.left_curve & 0x03));
    out.push((osc.detune & 0x0F) << 3 | (osc.rate_scaling & 0x07));
    out.push((osc.key_velocity & 0x07) << 2 | (osc.amp_mod_sens & 0x03));
    out.push(osc.output_level & 0x7F);
    out.push((osc.freq_coarse & 0x1F) << 1 | (osc.freq_mode & 0x01));
    out.push(osc.freq_fine & 0x7F);
}

fn parse_bulk_osc(data: &[u8]) -> Oscillator {
    Oscillator {
        eg_rate: [data[0], data[1], data[2], data[3]],
        eg_level: [data[4], data[5], data[6], data[7]],
        breakpoint: data[8],
        left_depth: data[9],
        right_depth: data[10],
        right_curve: (data[11] >> 2) & 0x03,
        left_curve: data[11] & 0x03,
        detune: (data[12] >> 3) & 0x0F,
        rate_scaling: data[12] & 0x07,
        key_velocity: (data[13] >> 2) & 0x07,
        amp_mod_sens: data[13] & 0x03,
        output_level: data[14],
        freq_coarse: (data[15] >> 1) & 0x1F,
        freq_mode: data[15] & 0x01,
        freq_fine: data[16],
    }
}

fn emit_bulk_global(global: &Global, out: &mut Vec<u8>) {
    for r in global.pitch_eg_rate {
        out.push(r & 0x7F);
    }
    for l in global.pitch_eg_level {
        out.push(l & 0x7F);
    }
    out.push(global.algorithm & 0x1F);
    out.push((global.osc_key_sync & 0x01) << 3 | (global.feedback & 0x07));
    out.push(global.lfo_speed & 0x7F);
    out.push(global.lfo_delay & 0x7F);
    out.push(global.lfo_pitch_mod_depth & 0x7F);
    out.push(global.lfo_amp_mod_depth & 0x7F);
    out.push(
        (global.lfo_pitch_mod_sens & 0x07) << 4
            | (global.lfo_waveform & 0x07) << 1
            | (global.lfo_key_sync & 0x01),
    );
    out.push(global.transpose & 0x3F);
    for b in global.name {
        out.push(b & 0x7F);
    }
}

fn parse_bulk_global(data: &[u8]) -> Global {
    let mut name = [0u8; 10];
    name.copy_from_slice(&data[16..26]);
    Global {
        pitch_eg_rate: [data[0], data[1], data[2], data[3]],
        pitch_eg_level: [data[4], data[5], data[6], data[7]],
        algorithm: data[8] & 0x1F,
        osc_key_sync: (data[9] >> 3) & 0x01,
        feedback: data[9] & 0x07,
        lfo_speed: data[10],
        lfo_delay: data[11],
        lfo_pitch_mod_depth: data[12],
        lfo_amp_mod_depth: data[13],
        lfo_pitch_mod_sens: (data[14] >> 4) & 0x07,
        lfo_waveform: (data[14] >> 1) & 0x07,
        lfo_key_sync: data[14] & 0x01,
        transpose: data[15] & 0x3F,
        name,
    }
}
