//! Structured audio error taxonomy.
//!
//! Every failure the audio subsystem can surface is identified by an
//! [`AudioErrorCode`].  The coarser [`AudioErrorCategory`] and the
//! `retryable` flag are **derived** from the code through a fixed table —
//! they are never stored or decided independently, so callers can branch on
//! `category`/`retryable` without string matching.
//!
//! | Category       | Codes                                              | Retryable |
//! |----------------|----------------------------------------------------|-----------|
//! | Initialization | `InitializationFailed`, `TtsInitializationFailed`  | yes       |
//! | Recording      | `RecordingFailed`                                  | yes       |
//! | Cleanup        | `CleanupFailed`                                    | no        |
//! | Processing     | `ProcessingFailed`, `VadFailed`                    | no        |
//! | Network        | `NetworkTimeout`                                   | yes       |
//! | Permission     | `PermissionDenied`                                 | yes       |
//! | Device         | `DeviceNotFound`, `DeviceInUse`                    | yes       |
//! | System         | `SystemError`                                      | no        |
//!
//! `retryable == true` is the sole signal that a "Try Again" action should
//! be offered; there is no separate severity field.

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioErrorCode
// ---------------------------------------------------------------------------

/// Fixed enumeration of every failure the audio subsystem reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioErrorCode {
    /// Microphone / audio context acquisition failed.
    InitializationFailed,
    /// The synthesized-voice playback engine failed to start.
    TtsInitializationFailed,
    /// An active recording aborted unexpectedly.
    RecordingFailed,
    /// Releasing devices or resetting state failed.
    CleanupFailed,
    /// A recording or analysis step could not be completed.
    ProcessingFailed,
    /// The voice activity detector stopped producing updates.
    VadFailed,
    /// A network call to an analysis service did not complete in time.
    NetworkTimeout,
    /// The user (or platform) denied microphone access.
    PermissionDenied,
    /// No usable input device is present.
    DeviceNotFound,
    /// The input device is claimed by another application.
    DeviceInUse,
    /// An unclassified platform-level failure.
    SystemError,
}

impl AudioErrorCode {
    /// Category this code belongs to (fixed table).
    pub fn category(self) -> AudioErrorCategory {
        use AudioErrorCode::*;
        match self {
            InitializationFailed | TtsInitializationFailed => AudioErrorCategory::Initialization,
            RecordingFailed => AudioErrorCategory::Recording,
            CleanupFailed => AudioErrorCategory::Cleanup,
            ProcessingFailed | VadFailed => AudioErrorCategory::Processing,
            NetworkTimeout => AudioErrorCategory::Network,
            PermissionDenied => AudioErrorCategory::Permission,
            DeviceNotFound | DeviceInUse => AudioErrorCategory::Device,
            SystemError => AudioErrorCategory::System,
        }
    }

    /// Whether automated or user-driven retry is expected to help.
    pub fn retryable(self) -> bool {
        use AudioErrorCategory::*;
        matches!(
            self.category(),
            Initialization | Recording | Network | Permission | Device
        )
    }

    /// The single human-readable recovery hint for this code.
    ///
    /// The UI layer maps each code to exactly one hint string; keeping the
    /// mapping here keeps it exhaustive — adding a code without a hint is a
    /// compile error.
    pub fn recovery_hint(self) -> &'static str {
        use AudioErrorCode::*;
        match self {
            InitializationFailed => "Reload the session and set up audio again.",
            TtsInitializationFailed => "Restart playback; check your output device.",
            RecordingFailed => "Stop and start the recording again.",
            CleanupFailed => "Close the session; resources will be reclaimed on restart.",
            ProcessingFailed => "The last take could not be processed; record a new take.",
            VadFailed => "Voice detection is unavailable; recording still works.",
            NetworkTimeout => "Check your connection and retry the analysis.",
            PermissionDenied => "Grant microphone access in your browser or OS settings.",
            DeviceNotFound => "Plug in or select a microphone, then retry.",
            DeviceInUse => "Close other applications using the microphone, then retry.",
            SystemError => "An unexpected error occurred; reload the page.",
        }
    }
}

// ---------------------------------------------------------------------------
// AudioErrorCategory
// ---------------------------------------------------------------------------

/// Coarse grouping of [`AudioErrorCode`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioErrorCategory {
    Initialization,
    Recording,
    Cleanup,
    Processing,
    Network,
    Permission,
    Device,
    System,
}

// ---------------------------------------------------------------------------
// AudioErrorDetails
// ---------------------------------------------------------------------------

/// A classified failure: code plus the category/retryable lookups and a
/// free-form message describing the concrete cause.
///
/// # Example
///
/// ```rust
/// use scene_audio::audio::{AudioErrorCode, AudioErrorCategory, AudioErrorDetails};
///
/// let err = AudioErrorDetails::new(AudioErrorCode::PermissionDenied, "user dismissed prompt");
/// assert_eq!(err.category, AudioErrorCategory::Permission);
/// assert!(err.retryable);
/// ```
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[error("{code:?} ({category:?}): {message}")]
pub struct AudioErrorDetails {
    pub code: AudioErrorCode,
    pub category: AudioErrorCategory,
    pub retryable: bool,
    pub message: String,
}

impl AudioErrorDetails {
    /// Build an error from a code; `category` and `retryable` come from the
    /// fixed table, never from the caller.
    pub fn new(code: AudioErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category(),
            retryable: code.retryable(),
            message: message.into(),
        }
    }

    /// Recovery hint for this error's code.
    pub fn recovery_hint(&self) -> &'static str {
        self.code.recovery_hint()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
