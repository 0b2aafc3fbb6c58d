//! Microphone acquisition behind an object-safe capability seam.
//!
//! The controller never talks to `cpal` directly: it opens a
//! [`CaptureBackend`] and drives the returned [`CaptureHandle`].  Tests swap
//! in a scripted backend; production uses [`CpalBackend`].
//!
//! `cpal::Stream` is not `Send`, so [`CpalBackend`] confines the stream to a
//! dedicated capture thread.  The handle owns a stop channel; `stop()` (or
//! drop) ends the thread and releases the device.
//!
//! Acquisition failures are classified into [`CaptureError`] variants that
//! convert one-to-one onto the crate's error taxonomy via
//! [`CaptureError::to_audio_error`].

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::error::{AudioErrorCode, AudioErrorDetails};

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One buffer of raw audio as delivered by the device callback.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`, at the device's native
/// rate and channel count.  The capture worker normalizes chunks with
/// [`crate::audio::mix_to_mono`] and [`crate::audio::resample`].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Device-selection options for [`CaptureBackend::open`].
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Input device name; `None` selects the system default.
    pub device_name: Option<String>,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Failures while acquiring or running a capture device.
#[derive(Debug, Error, Clone)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("input device unavailable or busy: {0}")]
    DeviceBusy(String),

    #[error("capture backend error: {0}")]
    Backend(String),
}

impl CaptureError {
    /// Classify into the structured taxonomy the public API speaks.
    pub fn to_audio_error(&self) -> AudioErrorDetails {
        let code = match self {
            CaptureError::NoDevice => AudioErrorCode::DeviceNotFound,
            CaptureError::PermissionDenied(_) => AudioErrorCode::PermissionDenied,
            CaptureError::DeviceBusy(_) => AudioErrorCode::DeviceInUse,
            CaptureError::Backend(_) => AudioErrorCode::InitializationFailed,
        };
        AudioErrorDetails::new(code, self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Capture traits
// ---------------------------------------------------------------------------

/// An open (but not yet streaming) capture device.
///
/// `start` may be called once; `stop` is idempotent and must release the
/// underlying device.  Handles are `Send` so the controller can own them
/// across await points.
pub trait CaptureHandle: Send {
    /// Begin streaming [`AudioChunk`]s to `tx`.  Send errors inside the
    /// device callback are ignored — the receiver side decides when to stop
    /// listening, and the audio thread must never panic.
    fn start(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<(), CaptureError>;

    /// Stop streaming and release the device.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Native sample rate of the device in Hz.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count of each chunk.
    fn channels(&self) -> u16;
}

/// Factory for capture devices — the seam the controller is generic over.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Production backend on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use scene_audio::audio::{AudioChunk, CaptureBackend, CaptureConfig, CpalBackend};
///
/// let backend = CpalBackend;
/// let mut handle = backend.open(&CaptureConfig::default()).unwrap();
/// let (tx, rx) = mpsc::channel::<AudioChunk>();
/// handle.start(tx).unwrap();
/// // rx now receives chunks; handle.stop() releases the microphone.
/// ```
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let host = cpal::default_host();

        let device = match &config.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(name) => host
                .input_devices()
                .map_err(|e| classify_backend_message(&e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or(CaptureError::NoDevice)?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| match e {
                cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                    CaptureError::DeviceBusy("device disappeared or is claimed".into())
                }
                other => classify_backend_message(&other.to_string()),
            })?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let stream_config: cpal::StreamConfig = supported.into();

        log::debug!("cpal: opened input device ({sample_rate} Hz, {channels} ch)");

        Ok(Box::new(CpalHandle {
            device: Some(device),
            stream_config,
            sample_rate,
            channels,
            worker: None,
        }))
    }
}

/// Platform error strings are the only permission signal cpal exposes.
fn classify_backend_message(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("permission") {
        CaptureError::PermissionDenied(message.to_string())
    } else {
        CaptureError::Backend(message.to_string())
    }
}

// ---------------------------------------------------------------------------
// CpalHandle
// ---------------------------------------------------------------------------

struct CpalHandle {
    /// Taken by the capture thread at `start`.
    device: Option<cpal::Device>,
    stream_config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
    worker: Option<(mpsc::Sender<()>, std::thread::JoinHandle<()>)>,
}

impl CaptureHandle for CpalHandle {
    fn start(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Backend("capture already started".into()));
        }
        let device = self
            .device
            .take()
            .ok_or_else(|| CaptureError::Backend("capture handle already consumed".into()))?;

        let stream_config = self.stream_config.clone();
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();

        // The stream is built, played and dropped entirely on this thread;
        // cpal streams are not Send.
        let join = std::thread::Builder::new()
            .name("scene-audio-capture".into())
            .spawn(move || {
                let built = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let chunk = AudioChunk {
                            samples: data.to_vec(),
                            sample_rate,
                            channels,
                        };
                        let _ = tx.send(chunk);
                    },
                    |err: cpal::StreamError| {
                        log::error!("cpal stream error: {err}");
                    },
                    None,
                );

                let stream = match built {
                    Ok(s) => s,
                    Err(e) => {
                        let mapped = match e {
                            cpal::BuildStreamError::DeviceNotAvailable => {
                                CaptureError::DeviceBusy("device not available".into())
                            }
                            other => classify_backend_message(&other.to_string()),
                        };
                        let _ = ready_tx.send(Err(mapped));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(classify_backend_message(&e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Park until stop() drops or signals the channel.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| CaptureError::Backend(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, join));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(CaptureError::Backend("capture thread exited early".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some((stop_tx, join)) = self.worker.take() {
            drop(stop_tx);
            join.join()
                .map_err(|_| CaptureError::Backend("capture thread panicked".into()))?;
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
