//! Recording session controller — sequences real-world side effects around
//! the pure state machine.
//!
//! # Flow
//!
//! ```text
//! setup()            ──▶ INITIALIZE → open backend → start worker → INITIALIZED
//! start_recording()  ──▶ new AudioSession → RECORDING_START
//!   capture thread: chunk → mono → resample → buffer → VAD → VAD_UPDATE
//! stop_recording()   ──▶ flush → metrics → RECORDING_STOP → RecordingResult
//! cleanup()          ──▶ release device (retried, logged) → CLEANUP
//! ```
//!
//! Ownership rules: the device handle, capture worker and live
//! [`AudioSession`] exist only inside the controller; external code sees
//! state snapshots and `RecordingResult`s.  One controller = one isolated
//! audio context — construct as many as needed (tests run them
//! concurrently), there is no global.
//!
//! Cancellation has no token type: `cleanup()` bumps a generation counter
//! and in-flight `setup`/`start_recording` calls detect the bump after their
//! suspension points and abort instead of completing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};

use crate::batch::{ExponentialBackoff, RetryPolicy};
use crate::config::EngineConfig;

use super::capture::{AudioChunk, CaptureBackend, CaptureConfig, CaptureHandle};
use super::error::{AudioErrorCode, AudioErrorDetails};
use super::quality::{chunk_samples, QualityLevel};
use super::resample::{mix_to_mono, resample};
use super::session::{AudioSession, RecordingMetrics, RecordingResult};
use super::state::{AudioEvent, AudioState, AudioStateManager, AudioStateSnapshot};
use super::vad::VadDetector;

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Knobs for one controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Analysis sample rate; capture is normalized to this.
    pub sample_rate: u32,
    /// RMS threshold for the VAD (also the silence floor for metrics).
    pub vad_threshold: f32,
    /// Silence duration before the VAD drops the speaking flag.
    pub silence_threshold: Duration,
    /// Device selection for the capture backend.
    pub capture: CaptureConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            vad_threshold: 0.01,
            silence_threshold: Duration::from_millis(600),
            capture: CaptureConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Derive from the persisted engine configuration.
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            vad_threshold: config.audio.vad_threshold,
            silence_threshold: Duration::from_millis(config.audio.silence_threshold_ms),
            capture: CaptureConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture worker shared state
// ---------------------------------------------------------------------------

struct CaptureShared {
    /// Gate: chunks are buffered only while a session is live.
    recording: AtomicBool,
    /// Normalized mono samples of the current session.
    samples: Mutex<Vec<f32>>,
    chunk_count: AtomicU64,
    /// Signals the worker to reset the VAD for a fresh session.
    reset_vad: AtomicBool,
}

// ---------------------------------------------------------------------------
// RecordingController
// ---------------------------------------------------------------------------

/// Orchestrates device acquisition, chunk capture and the audio state
/// machine.
///
/// All public operations are async and may suspend on device acquisition or
/// serialization; every one of them is safe to race with `cleanup()`.
pub struct RecordingController {
    backend: Arc<dyn CaptureBackend>,
    config: ControllerConfig,
    manager: Arc<Mutex<AudioStateManager>>,
    shared: Arc<CaptureShared>,
    handle: Mutex<Option<Box<dyn CaptureHandle>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    last_result: Mutex<Option<RecordingResult>>,
    session_started: Mutex<Option<Instant>>,
    /// Serializes `start_recording`/`stop_recording` — single-flight, not
    /// caller discipline.
    gate: tokio::sync::Mutex<()>,
    /// Bumped by `cleanup()`; in-flight operations compare-and-abort.
    generation: AtomicU64,
    quality_rx: Mutex<Option<watch::Receiver<QualityLevel>>>,
}

impl RecordingController {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: ControllerConfig) -> Self {
        Self {
            backend,
            config,
            manager: Arc::new(Mutex::new(AudioStateManager::new())),
            shared: Arc::new(CaptureShared {
                recording: AtomicBool::new(false),
                samples: Mutex::new(Vec::new()),
                chunk_count: AtomicU64::new(0),
                reset_vad: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
            worker: Mutex::new(None),
            last_result: Mutex::new(None),
            session_started: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            quality_rx: Mutex::new(None),
        }
    }

    /// Let the capture worker size its VAD frames from the adaptive quality
    /// level.  Without this, frames default to 100 ms.
    pub fn with_quality(self, rx: watch::Receiver<QualityLevel>) -> Self {
        *self.quality_rx.lock().unwrap() = Some(rx);
        self
    }

    // -----------------------------------------------------------------------
    // setup
    // -----------------------------------------------------------------------

    /// Acquire the microphone, start the capture worker and drive the state
    /// machine to `Ready`.
    ///
    /// On acquisition failure the error is classified (permission, missing
    /// device, busy device, backend), the machine is driven to `Error`, and
    /// the same [`AudioErrorDetails`] is returned so callers can branch on
    /// `code`/`category`.
    pub async fn setup(&self) -> Result<(), AudioErrorDetails> {
        let generation = self.generation.load(Ordering::SeqCst);

        {
            let mut mgr = self.manager.lock().unwrap();
            match mgr.state() {
                AudioState::Ready | AudioState::Recording => {
                    log::warn!("setup: already {} — ignoring", mgr.state().label());
                    return Ok(());
                }
                AudioState::Initializing => {
                    // A concurrent setup is acquiring the device; do not
                    // disturb its state machine.
                    return Err(AudioErrorDetails::new(
                        AudioErrorCode::InitializationFailed,
                        "setup already in progress",
                    ));
                }
                AudioState::Uninitialized | AudioState::Error => {
                    mgr.transition(AudioEvent::Initialize);
                }
            }
        }

        // Device acquisition can block on platform dialogs; keep it off the
        // async runtime.
        let backend = Arc::clone(&self.backend);
        let capture_config = self.config.capture.clone();
        let opened =
            tokio::task::spawn_blocking(move || backend.open(&capture_config)).await;

        let mut handle = match opened {
            Ok(Ok(handle)) => handle,
            Ok(Err(capture_err)) => {
                let details = capture_err.to_audio_error();
                let mut mgr = self.manager.lock().unwrap();
                mgr.transition(AudioEvent::Fail(details.clone()));
                return Err(details);
            }
            Err(join_err) => {
                let details = AudioErrorDetails::new(
                    AudioErrorCode::SystemError,
                    format!("device acquisition task failed: {join_err}"),
                );
                self.manager
                    .lock()
                    .unwrap()
                    .transition(AudioEvent::Fail(details.clone()));
                return Err(details);
            }
        };

        // cleanup() ran while we were acquiring — abort, releasing the
        // device we just got.
        if self.generation.load(Ordering::SeqCst) != generation {
            log::info!("setup: aborted by cleanup, releasing device");
            let _ = handle.stop();
            return Err(AudioErrorDetails::new(
                AudioErrorCode::InitializationFailed,
                "setup aborted by cleanup",
            ));
        }

        let (tx, rx) = mpsc::channel::<AudioChunk>();
        if let Err(capture_err) = handle.start(tx) {
            let details = capture_err.to_audio_error();
            let mut mgr = self.manager.lock().unwrap();
            mgr.transition(AudioEvent::Fail(details.clone()));
            return Err(details);
        }

        self.spawn_worker(rx);
        *self.handle.lock().unwrap() = Some(handle);

        self.manager
            .lock()
            .unwrap()
            .transition(AudioEvent::Initialized);
        log::info!("audio setup complete ({} Hz analysis)", self.config.sample_rate);
        Ok(())
    }

    /// Capture worker: normalizes chunks, buffers session audio, feeds the
    /// VAD, and forwards informational updates to the state machine.
    fn spawn_worker(&self, rx: mpsc::Receiver<AudioChunk>) {
        let manager = Arc::clone(&self.manager);
        let shared = Arc::clone(&self.shared);
        let quality_rx = self.quality_rx.lock().unwrap().clone();
        let target_rate = self.config.sample_rate;
        let mut vad = VadDetector::new(self.config.vad_threshold, self.config.silence_threshold);

        let worker = std::thread::Builder::new()
            .name("scene-audio-worker".into())
            .spawn(move || {
                let mut pending: Vec<f32> = Vec::new();

                while let Ok(chunk) = rx.recv() {
                    if !shared.recording.load(Ordering::Acquire) {
                        continue;
                    }

                    if shared.reset_vad.swap(false, Ordering::AcqRel) {
                        vad.reset();
                        pending.clear();
                    }

                    let mono = mix_to_mono(&chunk.samples, chunk.channels);
                    let normalized = resample(&mono, chunk.sample_rate, target_rate);

                    shared
                        .samples
                        .lock()
                        .unwrap()
                        .extend_from_slice(&normalized);
                    let count = shared.chunk_count.fetch_add(1, Ordering::AcqRel) + 1;

                    // Frame size follows the adaptive quality level when one
                    // is wired in: constrained conditions → bigger frames →
                    // fewer wakeups.
                    let frame_len = quality_rx
                        .as_ref()
                        .map(|rx| chunk_samples(*rx.borrow(), target_rate))
                        .unwrap_or(target_rate as usize / 10)
                        .max(1);

                    pending.extend_from_slice(&normalized);
                    while pending.len() >= frame_len {
                        let frame: Vec<f32> = pending.drain(..frame_len).collect();
                        let status = vad.process_frame(&frame, target_rate);
                        let mut mgr = manager.lock().unwrap();
                        mgr.set_session_chunks(count);
                        mgr.transition(AudioEvent::VadUpdate(status));
                    }
                }
                log::debug!("capture worker: channel closed, exiting");
            })
            .expect("failed to spawn capture worker thread");

        *self.worker.lock().unwrap() = Some(worker);
    }

    // -----------------------------------------------------------------------
    // start / stop
    // -----------------------------------------------------------------------

    /// Begin a recording session.  Requires `Ready`.
    ///
    /// Idempotent while recording: a second call (double-click, racing UI)
    /// returns the existing session instead of creating a duplicate.
    /// Concurrent calls are serialized internally.
    pub async fn start_recording(&self) -> Result<AudioSession, AudioErrorDetails> {
        let _gate = self.gate.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);

        {
            let mgr = self.manager.lock().unwrap();
            match mgr.state() {
                AudioState::Recording => {
                    let session = mgr.session().ok_or_else(|| {
                        AudioErrorDetails::new(
                            AudioErrorCode::SystemError,
                            "recording state without a session",
                        )
                    })?;
                    log::debug!("start_recording: already recording (session {})", session.id);
                    return Ok(session);
                }
                AudioState::Ready => {}
                other => {
                    return Err(AudioErrorDetails::new(
                        AudioErrorCode::RecordingFailed,
                        format!("cannot start recording while {}", other.label()),
                    ));
                }
            }
        }

        self.shared.samples.lock().unwrap().clear();
        self.shared.chunk_count.store(0, Ordering::Release);
        self.shared.reset_vad.store(true, Ordering::Release);

        let session = AudioSession::begin();
        *self.session_started.lock().unwrap() = Some(Instant::now());
        self.shared.recording.store(true, Ordering::Release);

        if self.generation.load(Ordering::SeqCst) != generation {
            self.shared.recording.store(false, Ordering::Release);
            return Err(AudioErrorDetails::new(
                AudioErrorCode::RecordingFailed,
                "start aborted by cleanup",
            ));
        }

        self.manager
            .lock()
            .unwrap()
            .transition(AudioEvent::RecordingStart(session.clone()));
        log::info!("recording started (session {})", session.id);
        Ok(session)
    }

    /// Finish the active session and return the captured take.
    ///
    /// When nothing is recording: the last known result is returned if one
    /// exists, otherwise `ProcessingFailed` — stale UIs calling stop twice
    /// get the take they expect instead of an error.
    pub async fn stop_recording(&self) -> Result<RecordingResult, AudioErrorDetails> {
        let _gate = self.gate.lock().await;

        let recording = self.manager.lock().unwrap().state() == AudioState::Recording;
        if !recording {
            return self.last_result.lock().unwrap().clone().ok_or_else(|| {
                AudioErrorDetails::new(
                    AudioErrorCode::ProcessingFailed,
                    "no recording in progress and no previous result",
                )
            });
        }

        let flush_started = Instant::now();
        self.shared.recording.store(false, Ordering::Release);

        let samples = std::mem::take(&mut *self.shared.samples.lock().unwrap());
        let chunk_count = self.shared.chunk_count.load(Ordering::Acquire);

        let (mut session, elapsed) = {
            let mut mgr = self.manager.lock().unwrap();
            let session = mgr.session().ok_or_else(|| {
                AudioErrorDetails::new(
                    AudioErrorCode::SystemError,
                    "recording state without a session",
                )
            })?;
            mgr.transition(AudioEvent::RecordingStop);
            let elapsed = self
                .session_started
                .lock()
                .unwrap()
                .take()
                .map(|t| t.elapsed())
                .unwrap_or_default();
            (session, elapsed)
        };

        session.chunk_count = chunk_count;
        session.duration = Some(elapsed);

        let mut metrics =
            RecordingMetrics::compute(&samples, self.config.vad_threshold, Duration::ZERO);
        metrics.processing_time = flush_started.elapsed();

        let result = RecordingResult {
            session,
            samples,
            sample_rate: self.config.sample_rate,
            metrics,
        };
        *self.last_result.lock().unwrap() = Some(result.clone());

        log::info!(
            "recording stopped (session {}, {:.2}s, {} chunks)",
            result.session.id,
            result.audio_secs(),
            result.session.chunk_count
        );
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // cleanup
    // -----------------------------------------------------------------------

    /// Tear everything down and force the machine to `Uninitialized`.
    ///
    /// Safe from any state — including mid-error and while `setup` or
    /// `start_recording` is in flight — and never fails: cleanup is usually
    /// invoked *from* the failure path, so its own failures are logged, not
    /// propagated.  Device release is retried with exponential backoff
    /// (100 ms base) before giving up.
    pub async fn cleanup(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.recording.store(false, Ordering::Release);

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let released = tokio::task::spawn_blocking(move || {
                let mut handle = handle;
                let policy = ExponentialBackoff {
                    base: Duration::from_millis(100),
                    max_attempts: 3,
                };
                for attempt in 1..=policy.max_attempts() {
                    match handle.stop() {
                        Ok(()) => return true,
                        Err(e) => {
                            log::warn!(
                                "cleanup: device release attempt {attempt} failed: {e}"
                            );
                            if attempt < policy.max_attempts() {
                                std::thread::sleep(policy.delay(attempt));
                            }
                        }
                    }
                }
                false
            })
            .await
            .unwrap_or(false);

            if !released {
                // Logged with the taxonomy code, never propagated.
                let details = AudioErrorDetails::new(
                    AudioErrorCode::CleanupFailed,
                    "device release failed after retries",
                );
                log::error!("cleanup: {details}");
            }
        }

        // The worker exits once the stream (and its sender) is gone.
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }

        self.shared.samples.lock().unwrap().clear();
        self.shared.chunk_count.store(0, Ordering::Release);
        *self.session_started.lock().unwrap() = None;

        self.manager.lock().unwrap().transition(AudioEvent::Cleanup);
        log::info!("audio cleanup complete");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Clone of the active session, or `None`.
    pub fn current_session(&self) -> Option<AudioSession> {
        self.manager.lock().unwrap().session()
    }

    /// Owned snapshot of the audio state machine.
    pub fn state(&self) -> AudioStateSnapshot {
        self.manager.lock().unwrap().snapshot()
    }

    /// Subscribe to state snapshots (one per applied transition).
    pub fn subscribe(&self) -> broadcast::Receiver<AudioStateSnapshot> {
        self.manager.lock().unwrap().subscribe()
    }

    /// Most recent finished take, if any.
    pub fn last_result(&self) -> Option<RecordingResult> {
        self.last_result.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
