//! Single-threaded inference scheduler.
//!
//! One dedicated worker thread owns the model and serves a FIFO request
//! queue. Callers never block: every entry point returns immediately and
//! results come back through per-request channels. An empty batch (or
//! `None` voice) on the channel is the uniform failure signal; a request
//! still queued at shutdown is dropped, which callers observe as channel
//! disconnection.
//!
//! The worker also maintains two read paths that bypass inference entirely:
//! a double-buffered batch of random voices for instant consumption, and a
//! latent-keyed cache of single voices (see [`crate::cache`]).

use crate::cache::{LatentKey, VoiceCache, MAX_CACHE_SIZE};
use crate::error::Result;
use crate::model::{Latent, ModelFactory, VoiceModel, BATCH_VOICES, LATENT_DIM};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::Rng;
use sixop_voice::{logits_to_params, Voice, PARAM_COUNT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Bound on the worker's wait for new requests, so the stop flag is polled
/// even when the queue stays empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Latent components are sampled uniformly from the slider range.
const LATENT_RANGE: std::ops::RangeInclusive<f32> = -3.0..=3.0;

enum Request {
    /// Generate a batch of 32 voices from independent random latents and
    /// refresh the double buffer. `reply: None` is the internal refill form.
    RandomVoices { reply: Option<Sender<Vec<Voice>>> },
    /// Legacy multi-voice form: one latent replicated across the batch.
    CustomVoices {
        latent: Latent,
        reply: Sender<Vec<Voice>>,
    },
    /// Generate one voice and offer it to the cache.
    SingleCustomVoice {
        latent: Latent,
        reply: Option<Sender<Option<Voice>>>,
        pre_generation: bool,
    },
}

#[derive(Default)]
struct PregenState {
    in_flight: bool,
    pending: Option<Latent>,
}

struct Shared {
    buffer: Mutex<Vec<Voice>>,
    buffer_ready: AtomicBool,
    refill_in_flight: AtomicBool,
    cache: Mutex<VoiceCache>,
    pregen: Mutex<PregenState>,
    model_ready: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            buffer_ready: AtomicBool::new(false),
            refill_in_flight: AtomicBool::new(false),
            cache: Mutex::new(VoiceCache::new(MAX_CACHE_SIZE)),
            pregen: Mutex::new(PregenState::default()),
            model_ready: AtomicBool::new(false),
        }
    }
}

/// Cheap, clonable handle for submitting work and reading engine state.
///
/// All methods are safe from any thread and never block beyond a short
/// internal lock.
#[derive(Clone)]
pub struct EngineHandle {
    request_tx: Sender<Request>,
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Whether the model factory has completed on the worker thread.
    pub fn is_model_ready(&self) -> bool {
        self.shared.model_ready.load(Ordering::Acquire)
    }

    /// Request a fresh batch of 32 random voices. The receiver yields one
    /// message: the batch, or an empty vec if generation failed.
    pub fn request_random_voices(&self) -> Receiver<Vec<Voice>> {
        let (tx, rx) = bounded(1);
        self.submit(Request::RandomVoices { reply: Some(tx) });
        rx
    }

    /// Request a batch decoded from one latent vector replicated across all
    /// 32 slots.
    pub fn request_custom_voices(&self, latent: Latent) -> Receiver<Vec<Voice>> {
        let (tx, rx) = bounded(1);
        self.submit(Request::CustomVoices { latent, reply: tx });
        rx
    }

    /// Request one voice for a latent vector, going through the cache.
    ///
    /// A cache hit is delivered on the returned channel without touching
    /// the worker thread; a miss is generated, cached, then delivered.
    pub fn request_cached_custom_voice(&self, latent: Latent) -> Receiver<Option<Voice>> {
        let (tx, rx) = bounded(1);
        let key = LatentKey::quantize(&latent);
        if let Some(voice) = self.shared.cache.lock().get(&key) {
            tracing::debug!("cache hit for custom voice");
            let _ = tx.send(Some(voice));
            return rx;
        }
        self.submit(Request::SingleCustomVoice {
            latent,
            reply: Some(tx),
            pre_generation: false,
        });
        rx
    }

    /// Warm the cache for a latent vector without delivering a result.
    ///
    /// At most one pre-generation job runs at a time; a vector arriving
    /// while one is in flight replaces any previously pending vector
    /// (last write wins) and runs when the current job completes.
    pub fn pre_generate_custom_voice(&self, latent: Latent) {
        let key = LatentKey::quantize(&latent);
        if self.shared.cache.lock().contains(&key) {
            return;
        }

        let mut pregen = self.shared.pregen.lock();
        if pregen.in_flight {
            if pregen.pending.is_some() {
                tracing::debug!("overwriting pending pre-generation request");
            }
            pregen.pending = Some(latent);
            return;
        }
        pregen.in_flight = true;
        drop(pregen);

        tracing::debug!("pre-generating custom voice for cache");
        self.submit(Request::SingleCustomVoice {
            latent,
            reply: None,
            pre_generation: true,
        });
    }

    /// Whether a cached voice exists for this latent vector.
    pub fn has_cached_voice(&self, latent: &Latent) -> bool {
        self.shared
            .cache
            .lock()
            .contains(&LatentKey::quantize(latent))
    }

    /// The cached voice for this latent vector, if any. Does not generate.
    pub fn cached_voice(&self, latent: &Latent) -> Option<Voice> {
        self.shared.cache.lock().get(&LatentKey::quantize(latent))
    }

    /// Whether a pre-computed random batch is ready for instant consumption.
    pub fn has_buffered_random_voices(&self) -> bool {
        self.shared.buffer_ready.load(Ordering::Acquire)
    }

    /// Take the buffered random batch, if ready, and schedule its refill.
    ///
    /// Returns an empty vec when the buffer is not ready; callers must not
    /// fall back to synchronous generation.
    pub fn take_buffered_random_voices(&self) -> Vec<Voice> {
        let mut buffer = self.shared.buffer.lock();
        if !self.shared.buffer_ready.swap(false, Ordering::AcqRel) {
            return Vec::new();
        }
        let voices = std::mem::take(&mut *buffer);
        drop(buffer);

        self.schedule_refill();
        voices
    }

    /// Enqueue a buffer refill unless one is already outstanding.
    fn schedule_refill(&self) {
        if !self.shared.refill_in_flight.swap(true, Ordering::AcqRel) {
            self.submit(Request::RandomVoices { reply: None });
        }
    }

    fn submit(&self, request: Request) {
        if self.request_tx.send(request).is_err() {
            tracing::warn!("engine thread is gone, dropping request");
        }
    }
}

/// Owns the worker thread. Dropping the engine shuts it down; requests
/// still queued at that point are dropped unexecuted.
pub struct VoiceEngine {
    handle: EngineHandle,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl VoiceEngine {
    /// Spawn the worker thread. The model factory runs there, so the
    /// engine comes up immediately; [`EngineHandle::is_model_ready`] flips
    /// once the factory completes, after which the worker fills the double
    /// buffer with its first random batch.
    pub fn start(factory: ModelFactory) -> Result<Self> {
        let (request_tx, request_rx) = unbounded();
        let shared = Arc::new(Shared::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = EngineHandle { request_tx, shared };
        let worker_handle = handle.clone();
        let worker_running = running.clone();

        let thread = thread::Builder::new()
            .name("sixop-engine".into())
            .spawn(move || {
                worker_loop(factory, request_rx, &worker_handle, &worker_running);
                worker_running.store(false, Ordering::Release);
            })?;

        Ok(Self {
            handle,
            running,
            thread: Some(thread),
        })
    }

    /// A clonable handle for submitting requests from any thread.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to finish. Queued requests are
    /// dropped; their reply channels disconnect.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    factory: ModelFactory,
    request_rx: Receiver<Request>,
    handle: &EngineHandle,
    running: &AtomicBool,
) {
    tracing::info!("inference thread started, initializing model");
    let mut model = match factory() {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("model initialization failed: {e}");
            return;
        }
    };
    handle.shared.model_ready.store(true, Ordering::Release);
    tracing::info!("model ready");

    // Prime the double buffer as soon as the model is up.
    handle.schedule_refill();

    while running.load(Ordering::Acquire) {
        match request_rx.recv_timeout(POLL_INTERVAL) {
            Ok(request) => {
                process_request(model.as_mut(), handle, request);
                // Drain the whole queue before waiting again.
                while let Ok(request) = request_rx.try_recv() {
                    if !running.load(Ordering::Acquire) {
                        return;
                    }
                    process_request(model.as_mut(), handle, request);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::info!("inference thread exiting");
}

fn process_request(model: &mut dyn VoiceModel, handle: &EngineHandle, request: Request) {
    match request {
        Request::RandomVoices { reply } => {
            tracing::debug!("processing random voices request");
            let voices = random_batch(model);
            {
                let mut buffer = handle.shared.buffer.lock();
                if !voices.is_empty() {
                    *buffer = voices.clone();
                    handle.shared.buffer_ready.store(true, Ordering::Release);
                }
                // A failed refill still releases the gate.
                handle.shared.refill_in_flight.store(false, Ordering::Release);
            }
            if let Some(reply) = reply {
                let _ = reply.send(voices);
            }
        }
        Request::CustomVoices { latent, reply } => {
            tracing::debug!("processing custom voices request");
            let mut latents = Vec::with_capacity(BATCH_VOICES * LATENT_DIM);
            for _ in 0..BATCH_VOICES {
                latents.extend_from_slice(&latent);
            }
            let voices = decode_batch(model, &latents, BATCH_VOICES);
            let _ = reply.send(voices);
        }
        Request::SingleCustomVoice {
            latent,
            reply,
            pre_generation,
        } => {
            tracing::debug!("processing single custom voice request");
            let voice = decode_batch(model, &latent, 1).into_iter().next();
            if let Some(voice) = &voice {
                handle
                    .shared
                    .cache
                    .lock()
                    .insert(LatentKey::quantize(&latent), voice.clone());
            }
            if pre_generation {
                finish_pre_generation(handle);
            }
            if let Some(reply) = reply {
                let _ = reply.send(voice);
            }
        }
    }
}

/// Launch the pending pre-generation request if one accumulated while this
/// one ran; otherwise open the gate for future requests.
fn finish_pre_generation(handle: &EngineHandle) {
    let next = {
        let mut pregen = handle.shared.pregen.lock();
        match pregen.pending.take() {
            Some(next) => Some(next),
            None => {
                pregen.in_flight = false;
                None
            }
        }
    };
    if let Some(latent) = next {
        tracing::debug!("launching pending pre-generation request");
        handle.submit(Request::SingleCustomVoice {
            latent,
            reply: None,
            pre_generation: true,
        });
    }
}

fn random_batch(model: &mut dyn VoiceModel) -> Vec<Voice> {
    let mut rng = rand::thread_rng();
    let mut latents = vec![0.0f32; BATCH_VOICES * LATENT_DIM];
    for v in latents.iter_mut() {
        *v = rng.gen_range(LATENT_RANGE);
    }
    decode_batch(model, &latents, BATCH_VOICES)
}

/// Run the model and reduce its logits to voices. Any model error is
/// contained here and surfaces as an empty batch.
fn decode_batch(model: &mut dyn VoiceModel, latents: &[f32], batch: usize) -> Vec<Voice> {
    let vocab = model.vocab_size();
    let logits = match model.generate(latents, batch) {
        Ok(logits) => logits,
        Err(e) => {
            tracing::error!("voice generation failed: {e}");
            return Vec::new();
        }
    };

    let per_voice = PARAM_COUNT * vocab;
    if per_voice == 0 || logits.len() < per_voice * batch {
        tracing::warn!(
            got = logits.len(),
            expected = per_voice * batch,
            "model returned undersized logits"
        );
        return Vec::new();
    }

    logits
        .chunks_exact(per_voice)
        .take(batch)
        .map(|voice_logits| Voice::from_flat_params(&logits_to_params(voice_logits, vocab)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Instant;

    const VOCAB: usize = 4;

    /// Scripted model: deterministic logits, records the batch size of
    /// every `generate` call, optionally sleeps or fails.
    struct MockModel {
        calls: Arc<Mutex<Vec<usize>>>,
        delay: Duration,
        fail: bool,
    }

    impl VoiceModel for MockModel {
        fn vocab_size(&self) -> usize {
            VOCAB
        }

        fn generate(&mut self, _latents: &[f32], batch: usize) -> Result<Vec<f32>> {
            self.calls.lock().push(batch);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if self.fail {
                return Err(Error::Model("scripted failure".into()));
            }
            let mut logits = vec![0.0f32; batch * PARAM_COUNT * VOCAB];
            for b in 0..batch {
                for p in 0..PARAM_COUNT {
                    let winner = (b + p) % 2;
                    logits[(b * PARAM_COUNT + p) * VOCAB + winner] = 1.0;
                }
            }
            Ok(logits)
        }
    }

    struct TestRig {
        engine: VoiceEngine,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    fn start_engine(delay: Duration, fail: bool) -> TestRig {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model_calls = calls.clone();
        let engine = VoiceEngine::start(Box::new(move || {
            Ok(Box::new(MockModel {
                calls: model_calls,
                delay,
                fail,
            }) as Box<dyn VoiceModel>)
        }))
        .unwrap();
        TestRig { engine, calls }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn single_voice_calls(calls: &Arc<Mutex<Vec<usize>>>) -> usize {
        calls.lock().iter().filter(|&&b| b == 1).count()
    }

    #[test]
    fn start_and_shutdown() {
        let mut rig = start_engine(Duration::ZERO, false);
        assert!(rig.engine.is_running());
        rig.engine.shutdown();
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn model_factory_failure_leaves_engine_not_ready() {
        let engine = VoiceEngine::start(Box::new(|| {
            Err(Error::ModelLoad("no weights".into()))
        }))
        .unwrap();
        let handle = engine.handle();

        wait_until(|| !engine.is_running());
        assert!(!handle.is_model_ready());

        // The worker is gone; requests are dropped and the reply channel
        // disconnects instead of hanging.
        let rx = handle.request_random_voices();
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn random_voices_request_yields_full_valid_batch() {
        let rig = start_engine(Duration::ZERO, false);
        let rx = rig.engine.handle().request_random_voices();
        let voices = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(voices.len(), BATCH_VOICES);
        assert!(voices.iter().all(Voice::validate));
    }

    #[test]
    fn custom_voices_request_replicates_latent_across_batch() {
        let rig = start_engine(Duration::ZERO, false);
        let rx = rig.engine.handle().request_custom_voices([0.5; LATENT_DIM]);
        let voices = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(voices.len(), BATCH_VOICES);
        assert!(rig.calls.lock().contains(&BATCH_VOICES));
    }

    #[test]
    fn failed_generation_surfaces_as_empty_result() {
        let rig = start_engine(Duration::ZERO, true);
        let handle = rig.engine.handle();
        wait_until(|| handle.is_model_ready());

        let voices = handle
            .request_random_voices()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(voices.is_empty());

        let voice = handle
            .request_cached_custom_voice([0.1; LATENT_DIM])
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(voice.is_none());
        assert!(!handle.has_buffered_random_voices());
    }

    #[test]
    fn second_identical_request_hits_cache_without_model_call() {
        let rig = start_engine(Duration::ZERO, false);
        let handle = rig.engine.handle();
        let latent = [1.25; LATENT_DIM];

        let first = handle
            .request_cached_custom_voice(latent)
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("generation should succeed");
        assert_eq!(single_voice_calls(&rig.calls), 1);

        let second = handle
            .request_cached_custom_voice(latent)
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("cache hit");
        assert_eq!(second, first);
        assert_eq!(single_voice_calls(&rig.calls), 1);

        // Nearby latent quantizes to the same key.
        assert!(handle.has_cached_voice(&[1.2503; LATENT_DIM]));
    }

    #[test]
    fn double_buffer_consumes_once_and_refills_once() {
        let rig = start_engine(Duration::from_millis(100), false);
        let handle = rig.engine.handle();

        wait_until(|| handle.has_buffered_random_voices());
        assert_eq!(rig.calls.lock().iter().filter(|&&b| b == BATCH_VOICES).count(), 1);

        let batch = handle.take_buffered_random_voices();
        assert_eq!(batch.len(), BATCH_VOICES);

        // Not yet refilled: a second take comes back empty, and must not
        // generate anything synchronously.
        assert!(handle.take_buffered_random_voices().is_empty());

        wait_until(|| handle.has_buffered_random_voices());
        let refills = rig.calls.lock().iter().filter(|&&b| b == BATCH_VOICES).count();
        assert_eq!(refills, 2, "exactly one refill per consumption");
    }

    #[test]
    fn pre_generation_coalesces_to_last_write() {
        let rig = start_engine(Duration::from_millis(80), false);
        let handle = rig.engine.handle();
        wait_until(|| handle.is_model_ready());

        let a = [0.1; LATENT_DIM];
        let b = [0.2; LATENT_DIM];
        let c = [0.3; LATENT_DIM];

        handle.pre_generate_custom_voice(a);
        // While A is in flight, B then C arrive; C overwrites B.
        thread::sleep(Duration::from_millis(10));
        handle.pre_generate_custom_voice(b);
        handle.pre_generate_custom_voice(c);

        wait_until(|| handle.has_cached_voice(&a) && handle.has_cached_voice(&c));
        assert!(!handle.has_cached_voice(&b));
        assert_eq!(single_voice_calls(&rig.calls), 2);

        // The gate is open again: a fresh vector starts immediately.
        let d = [0.4; LATENT_DIM];
        handle.pre_generate_custom_voice(d);
        wait_until(|| handle.has_cached_voice(&d));
        assert_eq!(single_voice_calls(&rig.calls), 3);
    }

    #[test]
    fn pre_generation_skips_cached_latents() {
        let rig = start_engine(Duration::ZERO, false);
        let handle = rig.engine.handle();
        let latent = [2.0; LATENT_DIM];

        handle.pre_generate_custom_voice(latent);
        wait_until(|| handle.has_cached_voice(&latent));
        let calls = single_voice_calls(&rig.calls);

        handle.pre_generate_custom_voice(latent);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(single_voice_calls(&rig.calls), calls);
    }
}
