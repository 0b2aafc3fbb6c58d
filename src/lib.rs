//! Audio session and analysis core for a scene-rehearsal tool.
//!
//! Two subsystems make up the crate:
//!
//! * [`audio`] — the microphone-backed recording session: device
//!   acquisition, a pure finite state machine, streaming voice-activity
//!   detection, error classification/recovery, and adaptive capture quality.
//! * [`batch`] — the analysis pipeline: prioritized batching of
//!   emotion/timing requests with bounded retries and atomic per-batch
//!   results.
//!
//! [`config`] carries the persisted settings both consume.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scene_audio::audio::{ControllerConfig, CpalBackend, RecordingController};
//!
//! # async fn example() -> Result<(), scene_audio::audio::AudioErrorDetails> {
//! let controller =
//!     RecordingController::new(Arc::new(CpalBackend), ControllerConfig::default());
//! controller.setup().await?;
//! let session = controller.start_recording().await?;
//! // ... actor reads the line ...
//! let take = controller.stop_recording().await?;
//! println!("take {}: {:.2}s", session.id, take.audio_secs());
//! controller.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod batch;
pub mod config;
