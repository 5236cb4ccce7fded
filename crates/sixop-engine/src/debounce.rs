//! Debounced cache pre-generation for a rapidly changing latent vector.
//!
//! Slider drags produce a burst of change events; only the vector still in
//! effect after a quiet window triggers pre-generation. Coalescing of the
//! work itself (at most one job in flight, last write wins) lives in
//! [`crate::EngineHandle::pre_generate_custom_voice`]; this type only
//! bounds the event rate feeding it.

use crate::engine::EngineHandle;
use crate::error::Result;
use crate::model::Latent;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Default quiet window before a change event fires.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(150);

/// Collapses bursts of latent-change events into single pre-generation
/// requests. Dropping the debouncer stops its thread; a window still open
/// at that point never fires.
pub struct Debouncer {
    tx: Option<Sender<Latent>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(handle: EngineHandle) -> Result<Self> {
        Self::with_delay(handle, DEBOUNCE_DELAY)
    }

    pub fn with_delay(handle: EngineHandle, delay: Duration) -> Result<Self> {
        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("sixop-debounce".into())
            .spawn(move || debounce_loop(&rx, &handle, delay))?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Record a latent change. Never blocks; each call restarts the quiet
    /// window, and only the latest vector is honored when it elapses.
    pub fn notify(&self, latent: Latent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(latent);
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        // Closing the channel wakes the thread out of its blocking recv.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn debounce_loop(rx: &Receiver<Latent>, handle: &EngineHandle, delay: Duration) {
    // Block until a burst starts, then keep restarting the window until it
    // goes quiet for a full delay.
    while let Ok(mut latent) = rx.recv() {
        loop {
            match rx.recv_timeout(delay) {
                Ok(next) => latent = next,
                Err(RecvTimeoutError::Timeout) => {
                    handle.pre_generate_custom_voice(latent);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VoiceEngine;
    use crate::error::Result as EngineResult;
    use crate::model::{VoiceModel, LATENT_DIM};

    use parking_lot::Mutex;
    use sixop_voice::PARAM_COUNT;
    use std::sync::Arc;
    use std::time::Instant;

    struct CountingModel {
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl VoiceModel for CountingModel {
        fn vocab_size(&self) -> usize {
            2
        }

        fn generate(&mut self, _latents: &[f32], batch: usize) -> EngineResult<Vec<f32>> {
            self.calls.lock().push(batch);
            let mut logits = vec![0.0f32; batch * PARAM_COUNT * 2];
            for row in logits.chunks_exact_mut(2) {
                row[0] = 1.0;
            }
            Ok(logits)
        }
    }

    fn start() -> (VoiceEngine, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model_calls = calls.clone();
        let engine = VoiceEngine::start(Box::new(move || {
            Ok(Box::new(CountingModel { calls: model_calls }) as Box<dyn VoiceModel>)
        }))
        .unwrap();
        (engine, calls)
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
    fn burst_of_changes_fires_once_for_the_last_vector() {
        let (engine, calls) = start();
        let handle = engine.handle();
        let debouncer = Debouncer::with_delay(handle.clone(), Duration::from_millis(80)).unwrap();

        let a = [0.1; LATENT_DIM];
        let b = [0.2; LATENT_DIM];
        let c = [0.3; LATENT_DIM];
        debouncer.notify(a);
        thread::sleep(Duration::from_millis(10));
        debouncer.notify(b);
        thread::sleep(Duration::from_millis(10));
        debouncer.notify(c);

        wait_until(|| handle.has_cached_voice(&c));
        assert!(!handle.has_cached_voice(&a));
        assert!(!handle.has_cached_voice(&b));
        assert_eq!(single_voice_calls(&calls), 1);
    }

    #[test]
    fn separate_bursts_fire_separately() {
        let (engine, calls) = start();
        let handle = engine.handle();
        let debouncer = Debouncer::with_delay(handle.clone(), Duration::from_millis(40)).unwrap();

        let a = [0.5; LATENT_DIM];
        debouncer.notify(a);
        wait_until(|| handle.has_cached_voice(&a));

        let b = [0.7; LATENT_DIM];
        debouncer.notify(b);
        wait_until(|| handle.has_cached_voice(&b));
        assert_eq!(single_voice_calls(&calls), 2);
    }

    #[test]
    fn already_cached_vector_does_not_regenerate() {
        let (engine, calls) = start();
        let handle = engine.handle();
        let debouncer = Debouncer::with_delay(handle.clone(), Duration::from_millis(30)).unwrap();

        let a = [1.0; LATENT_DIM];
        debouncer.notify(a);
        wait_until(|| handle.has_cached_voice(&a));
        let fired = single_voice_calls(&calls);

        debouncer.notify(a);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(single_voice_calls(&calls), fired);
    }

    #[test]
    fn drop_stops_the_thread_without_firing() {
        let (engine, calls) = start();
        let handle = engine.handle();
        let debouncer =
            Debouncer::with_delay(handle.clone(), Duration::from_millis(500)).unwrap();

        debouncer.notify([2.0; LATENT_DIM]);
        drop(debouncer);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(single_voice_calls(&calls), 0);
        drop(engine);
    }
}
