//! Audio session core — capture, state machine, VAD, quality adaptation.
//!
//! # Architecture
//!
//! ```text
//! Microphone → CaptureBackend → AudioChunk (mpsc) → mix_to_mono → resample
//!           → session buffer → VadDetector → AudioStateManager (VAD_UPDATE)
//!
//! RecordingController — owns every side effect above, drives the pure
//!                       AudioStateManager, hands out RecordingResults
//! QualityController   — independent; capture consults it for frame sizing
//! ```
//!
//! The state machine ([`AudioStateManager`]) performs no I/O; the controller
//! ([`RecordingController`]) performs all of it.  Everything outward-facing
//! is a snapshot or an owned result — no shared mutable state escapes.

pub mod capture;
pub mod controller;
pub mod error;
pub mod quality;
pub mod resample;
pub mod session;
pub mod state;
pub mod vad;

pub use capture::{AudioChunk, CaptureBackend, CaptureConfig, CaptureError, CaptureHandle, CpalBackend};
pub use controller::{ControllerConfig, RecordingController};
pub use error::{AudioErrorCategory, AudioErrorCode, AudioErrorDetails};
pub use quality::{ConnectionKind, DeviceSignals, QualityController, QualityLevel};
pub use resample::{mix_to_mono, resample};
pub use session::{AudioSession, RecordingMetrics, RecordingResult};
pub use state::{AudioEvent, AudioState, AudioStateManager, AudioStateSnapshot};
pub use vad::{VadDetector, VadStatus};
