//! End-to-end pipeline tests: model output through the engine to wire bytes.

use parking_lot::Mutex;
use sixop::engine::{Result as EngineResult, VoiceEngine, VoiceModel, BATCH_VOICES, LATENT_DIM};
use sixop::sysex;
use sixop::voice::{Voice, PARAM_COUNT};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const VOCAB: usize = 3;

/// Deterministic stand-in for the generative model: every parameter's
/// winning class is `(voice_index + param_index) % 2`, which is in range
/// for every field.
struct StubModel {
    batches: Arc<Mutex<Vec<usize>>>,
}

impl VoiceModel for StubModel {
    fn vocab_size(&self) -> usize {
        VOCAB
    }

    fn generate(&mut self, _latents: &[f32], batch: usize) -> EngineResult<Vec<f32>> {
        self.batches.lock().push(batch);
        let mut logits = vec![0.0f32; batch * PARAM_COUNT * VOCAB];
        for b in 0..batch {
            for p in 0..PARAM_COUNT {
                logits[(b * PARAM_COUNT + p) * VOCAB + (b + p) % 2] = 1.0;
            }
        }
        Ok(logits)
    }
}

fn start_engine() -> (VoiceEngine, Arc<Mutex<Vec<usize>>>) {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let model_batches = batches.clone();
    let engine = VoiceEngine::start(Box::new(move || {
        Ok(Box::new(StubModel {
            batches: model_batches,
        }) as Box<dyn VoiceModel>)
    }))
    .unwrap();
    (engine, batches)
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn buffered_batch_packs_to_bulk_dump() {
    let (engine, _batches) = start_engine();
    let handle = engine.handle();

    wait_until(|| handle.has_buffered_random_voices());
    let batch = handle.take_buffered_random_voices();
    assert_eq!(batch.len(), BATCH_VOICES);

    let dump = sysex::pack_bulk(&batch).unwrap();
    assert_eq!(dump.len(), sysex::BULK_MESSAGE_LEN);
    assert_eq!(&dump[..6], &[0xF0, 0x43, 0x00, 0x09, 0x20, 0x00]);
    assert_eq!(dump[dump.len() - 1], 0xF7);

    // The wire bytes decode back to the generated batch, every slot.
    assert_eq!(sysex::unpack_bulk(&dump).unwrap(), batch);
}

#[test]
fn custom_voice_roundtrips_through_single_dump() {
    let (engine, _batches) = start_engine();
    let handle = engine.handle();

    let voice = handle
        .request_cached_custom_voice([0.25; LATENT_DIM])
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("generation should succeed");
    assert!(voice.validate());

    let dump = sysex::pack_single(&voice).unwrap();
    assert_eq!(dump.len(), sysex::SINGLE_MESSAGE_LEN);
    assert_eq!(sysex::unpack_single(&dump).unwrap(), voice);

    // Host-side transport trim drops only the framing bytes.
    let inner = sysex::strip_envelope(&dump);
    assert_eq!(inner.len(), dump.len() - 2);
}

#[test]
fn zero_voice_single_dump_bytes() {
    let dump = sysex::pack_single(&Voice::default()).unwrap();
    assert_eq!(dump.len(), 163);
    assert_eq!(&dump[..6], &[0xF0, 0x43, 0x00, 0x00, 0x01, 0x1B]);
    // Zero payload sums to zero, so the checksum byte is zero too.
    assert_eq!(&dump[161..], &[0x00, 0xF7]);
}

#[test]
fn consumption_drives_exactly_one_refill() {
    let (engine, batches) = start_engine();
    let handle = engine.handle();

    wait_until(|| handle.has_buffered_random_voices());
    let first = handle.take_buffered_random_voices();
    assert_eq!(first.len(), BATCH_VOICES);

    wait_until(|| handle.has_buffered_random_voices());
    let refills = batches.lock().iter().filter(|&&b| b == BATCH_VOICES).count();
    assert_eq!(refills, 2); // initial fill + one refill
}
