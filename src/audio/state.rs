//! Audio subsystem state machine.
//!
//! [`AudioStateManager`] is the single source of truth for audio status.  It
//! is deliberately pure: no device I/O, no timers — only bookkeeping and
//! subscriber notification.  All side effects (acquiring a microphone,
//! starting the capture worker) live in the controller, which drives this
//! machine and reacts to it.  That split keeps the machine trivially
//! testable.
//!
//! ```text
//! Uninitialized ──INITIALIZE──▶ Initializing
//! Initializing  ──INITIALIZED─▶ Ready
//! Ready         ──RECORDING_START──▶ Recording
//! Recording     ──RECORDING_STOP──▶ Ready
//! Recording     ──VAD_UPDATE──▶ Recording   (vad field refreshed)
//! any state     ──FAIL──▶ Error
//! Error         ──INITIALIZE──▶ Initializing   (manual recovery)
//! any state     ──CLEANUP──▶ Uninitialized
//! ```
//!
//! Illegal transitions are no-ops with a logged warning — callers never need
//! a fallback path around a pure state transition.  There is no terminal
//! state: `Error` is always recoverable via `INITIALIZE` or `CLEANUP`.

use serde::Serialize;
use tokio::sync::broadcast;

use super::error::AudioErrorDetails;
use super::session::AudioSession;
use super::vad::VadStatus;

/// Buffered snapshots per subscriber before lagging kicks in.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// AudioState
// ---------------------------------------------------------------------------

/// Resting states of the audio subsystem.
///
/// `CLEANUP` is a transition (an event), not a resting state — it always
/// lands back in `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioState {
    Uninitialized,
    Initializing,
    Ready,
    Recording,
    Error,
}

impl AudioState {
    /// Short label for logs and status displays.
    pub fn label(self) -> &'static str {
        match self {
            AudioState::Uninitialized => "uninitialized",
            AudioState::Initializing => "initializing",
            AudioState::Ready => "ready",
            AudioState::Recording => "recording",
            AudioState::Error => "error",
        }
    }
}

impl Default for AudioState {
    fn default() -> Self {
        AudioState::Uninitialized
    }
}

// ---------------------------------------------------------------------------
// AudioEvent
// ---------------------------------------------------------------------------

/// Events that drive the state machine.  Payload-carrying events deliver the
/// data the new state needs, so there is no separate context patch.
#[derive(Debug, Clone)]
pub enum AudioEvent {
    Initialize,
    Initialized,
    RecordingStart(AudioSession),
    RecordingStop,
    VadUpdate(VadStatus),
    Fail(AudioErrorDetails),
    Cleanup,
}

impl AudioEvent {
    fn name(&self) -> &'static str {
        match self {
            AudioEvent::Initialize => "INITIALIZE",
            AudioEvent::Initialized => "INITIALIZED",
            AudioEvent::RecordingStart(_) => "RECORDING_START",
            AudioEvent::RecordingStop => "RECORDING_STOP",
            AudioEvent::VadUpdate(_) => "VAD_UPDATE",
            AudioEvent::Fail(_) => "FAIL",
            AudioEvent::Cleanup => "CLEANUP",
        }
    }
}

// ---------------------------------------------------------------------------
// AudioStateSnapshot
// ---------------------------------------------------------------------------

/// Immutable, owned copy of the subsystem state at a point in time.
///
/// Invariants:
/// * `session` is `Some` only when `state == Recording`.
/// * `error` is `Some` only when `state == Error`.
#[derive(Debug, Clone, Serialize)]
pub struct AudioStateSnapshot {
    pub state: AudioState,
    pub error: Option<AudioErrorDetails>,
    pub session: Option<AudioSession>,
    pub vad: Option<VadStatus>,
}

// ---------------------------------------------------------------------------
// AudioStateManager
// ---------------------------------------------------------------------------

/// The authoritative audio state machine.
///
/// Construct one per controller instance — there is deliberately no global.
/// Callers read state via [`snapshot`](Self::snapshot) (copy-on-read; the
/// returned value is fully owned) or subscribe for pushed snapshots via
/// [`subscribe`](Self::subscribe); dropping the receiver unsubscribes.
pub struct AudioStateManager {
    state: AudioState,
    error: Option<AudioErrorDetails>,
    session: Option<AudioSession>,
    vad: Option<VadStatus>,
    notify: broadcast::Sender<AudioStateSnapshot>,
}

impl AudioStateManager {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            state: AudioState::Uninitialized,
            error: None,
            session: None,
            vad: None,
            notify,
        }
    }

    /// Current resting state.
    pub fn state(&self) -> AudioState {
        self.state
    }

    /// Apply `event` per the transition table.
    ///
    /// Returns `true` when the event was legal and applied.  Illegal events
    /// are ignored with a `warn` — never a panic, never an error value.
    /// Every applied transition publishes a fresh snapshot to subscribers.
    pub fn transition(&mut self, event: AudioEvent) -> bool {
        let applied = match (self.state, event) {
            (AudioState::Uninitialized, AudioEvent::Initialize)
            | (AudioState::Error, AudioEvent::Initialize) => {
                self.state = AudioState::Initializing;
                self.error = None;
                true
            }
            (AudioState::Initializing, AudioEvent::Initialized) => {
                self.state = AudioState::Ready;
                true
            }
            (AudioState::Ready, AudioEvent::RecordingStart(session)) => {
                self.state = AudioState::Recording;
                self.session = Some(session);
                true
            }
            (AudioState::Recording, AudioEvent::RecordingStop) => {
                self.state = AudioState::Ready;
                self.session = None;
                true
            }
            (AudioState::Recording, AudioEvent::VadUpdate(status)) => {
                self.vad = Some(status);
                true
            }
            (_, AudioEvent::Fail(details)) => {
                log::error!("audio state: {} → error: {details}", self.state.label());
                self.state = AudioState::Error;
                self.error = Some(details);
                self.session = None;
                true
            }
            (_, AudioEvent::Cleanup) => {
                self.state = AudioState::Uninitialized;
                self.error = None;
                self.session = None;
                self.vad = None;
                true
            }
            (state, event) => {
                log::warn!(
                    "audio state: ignoring {} while {}",
                    event.name(),
                    state.label()
                );
                false
            }
        };

        if applied {
            self.publish();
        }
        applied
    }

    /// Last-resort recovery: force `Uninitialized`, clearing error, session
    /// and VAD state, and notify subscribers.
    pub fn restore(&mut self) {
        log::warn!("audio state: restore() from {}", self.state.label());
        self.state = AudioState::Uninitialized;
        self.error = None;
        self.session = None;
        self.vad = None;
        self.publish();
    }

    /// Owned deep copy of the current state.  Callers can never observe
    /// in-place mutation through a snapshot.
    pub fn snapshot(&self) -> AudioStateSnapshot {
        AudioStateSnapshot {
            state: self.state,
            error: self.error.clone(),
            session: self.session.clone(),
            vad: self.vad.clone(),
        }
    }

    /// Subscribe to pushed snapshots.  Every applied transition (and
    /// [`restore`](Self::restore)) sends one.
    pub fn subscribe(&self) -> broadcast::Receiver<AudioStateSnapshot> {
        self.notify.subscribe()
    }

    /// Live chunk-count bookkeeping for the active session.
    ///
    /// Not a transition: snapshots are not pushed for chunk arrival (VAD
    /// updates already provide a periodic heartbeat).  No-op unless
    /// recording.
    pub fn set_session_chunks(&mut self, chunk_count: u64) {
        if let Some(session) = self.session.as_mut() {
            session.chunk_count = chunk_count;
        }
    }

    /// Clone of the active session, if any.
    pub fn session(&self) -> Option<AudioSession> {
        self.session.clone()
    }

    fn publish(&self) {
        // No subscribers is fine.
        let _ = self.notify.send(self.snapshot());
    }
}

impl Default for AudioStateManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::error::AudioErrorCode;

    fn some_error() -> AudioErrorDetails {
        AudioErrorDetails::new(AudioErrorCode::RecordingFailed, "stream died")
    }

    fn some_vad() -> VadStatus {
        VadStatus {
            speaking: true,
            noise_level: 0.002,
            confidence: 0.8,
            last_activity_ms: Some(1_200),
        }
    }

    /// Walk the manager into `Recording`.
    fn recording_manager() -> AudioStateManager {
        let mut m = AudioStateManager::new();
        assert!(m.transition(AudioEvent::Initialize));
        assert!(m.transition(AudioEvent::Initialized));
        assert!(m.transition(AudioEvent::RecordingStart(AudioSession::begin())));
        m
    }

    // ---- Legal transition table --------------------------------------------

    #[test]
    fn initial_state_is_uninitialized() {
        let m = AudioStateManager::new();
        assert_eq!(m.state(), AudioState::Uninitialized);
    }

    #[test]
    fn happy_path_to_recording() {
        let m = recording_manager();
        assert_eq!(m.state(), AudioState::Recording);
        assert!(m.snapshot().session.is_some());
    }

    #[test]
    fn stop_returns_to_ready_and_clears_session() {
        let mut m = recording_manager();
        assert!(m.transition(AudioEvent::RecordingStop));
        assert_eq!(m.state(), AudioState::Ready);
        assert!(m.snapshot().session.is_none());
    }

    #[test]
    fn vad_update_keeps_recording_and_refreshes_vad() {
        let mut m = recording_manager();
        assert!(m.transition(AudioEvent::VadUpdate(some_vad())));
        assert_eq!(m.state(), AudioState::Recording);
        let snap = m.snapshot();
        assert_eq!(snap.vad.unwrap().last_activity_ms, Some(1_200));
    }

    #[test]
    fn fail_from_every_state_lands_in_error() {
        let build: [fn() -> AudioStateManager; 4] = [
            AudioStateManager::new,
            || {
                let mut m = AudioStateManager::new();
                m.transition(AudioEvent::Initialize);
                m
            },
            || {
                let mut m = AudioStateManager::new();
                m.transition(AudioEvent::Initialize);
                m.transition(AudioEvent::Initialized);
                m
            },
            recording_manager,
        ];
        for make in build {
            let mut m = make();
            assert!(m.transition(AudioEvent::Fail(some_error())));
            assert_eq!(m.state(), AudioState::Error);
            let snap = m.snapshot();
            assert!(snap.error.is_some());
            assert!(snap.session.is_none(), "session must clear on error");
        }
    }

    #[test]
    fn error_recovers_via_initialize() {
        let mut m = AudioStateManager::new();
        m.transition(AudioEvent::Fail(some_error()));
        assert!(m.transition(AudioEvent::Initialize));
        assert_eq!(m.state(), AudioState::Initializing);
        assert!(m.snapshot().error.is_none(), "error must clear on recovery");
    }

    #[test]
    fn cleanup_from_every_state_lands_uninitialized() {
        let mut from_error = AudioStateManager::new();
        from_error.transition(AudioEvent::Fail(some_error()));

        for mut m in [
            AudioStateManager::new(),
            recording_manager(),
            from_error,
        ] {
            assert!(m.transition(AudioEvent::Cleanup));
            let snap = m.snapshot();
            assert_eq!(snap.state, AudioState::Uninitialized);
            assert!(snap.session.is_none());
            assert!(snap.error.is_none());
            assert!(snap.vad.is_none());
        }
    }

    // ---- Illegal transitions are no-ops ------------------------------------

    #[test]
    fn initialized_without_initialize_is_ignored() {
        let mut m = AudioStateManager::new();
        assert!(!m.transition(AudioEvent::Initialized));
        assert_eq!(m.state(), AudioState::Uninitialized);
    }

    #[test]
    fn recording_start_outside_ready_is_ignored() {
        let mut m = AudioStateManager::new();
        assert!(!m.transition(AudioEvent::RecordingStart(AudioSession::begin())));
        assert_eq!(m.state(), AudioState::Uninitialized);
        assert!(m.snapshot().session.is_none());
    }

    #[test]
    fn recording_stop_outside_recording_is_ignored() {
        let mut m = AudioStateManager::new();
        m.transition(AudioEvent::Initialize);
        m.transition(AudioEvent::Initialized);
        assert!(!m.transition(AudioEvent::RecordingStop));
        assert_eq!(m.state(), AudioState::Ready);
    }

    #[test]
    fn vad_update_outside_recording_is_ignored() {
        let mut m = AudioStateManager::new();
        assert!(!m.transition(AudioEvent::VadUpdate(some_vad())));
        assert!(m.snapshot().vad.is_none());
    }

    #[test]
    fn double_initialize_is_ignored() {
        let mut m = AudioStateManager::new();
        assert!(m.transition(AudioEvent::Initialize));
        assert!(!m.transition(AudioEvent::Initialize));
        assert_eq!(m.state(), AudioState::Initializing);
    }

    // ---- restore -----------------------------------------------------------

    #[test]
    fn restore_forces_uninitialized() {
        let mut m = recording_manager();
        m.transition(AudioEvent::Fail(some_error()));
        m.restore();
        let snap = m.snapshot();
        assert_eq!(snap.state, AudioState::Uninitialized);
        assert!(snap.error.is_none());
        assert!(snap.session.is_none());
    }

    // ---- Snapshots ---------------------------------------------------------

    #[test]
    fn snapshot_is_a_deep_copy() {
        let mut m = recording_manager();
        let snap = m.snapshot();
        m.transition(AudioEvent::RecordingStop);
        // The earlier snapshot is unaffected by later transitions.
        assert_eq!(snap.state, AudioState::Recording);
        assert!(snap.session.is_some());
    }

    #[test]
    fn subscribers_receive_applied_transitions() {
        let mut m = AudioStateManager::new();
        let mut rx = m.subscribe();
        m.transition(AudioEvent::Initialize);
        m.transition(AudioEvent::Initialized);

        let first = rx.try_recv().expect("first snapshot");
        assert_eq!(first.state, AudioState::Initializing);
        let second = rx.try_recv().expect("second snapshot");
        assert_eq!(second.state, AudioState::Ready);
    }

    #[test]
    fn subscribers_do_not_receive_ignored_transitions() {
        let mut m = AudioStateManager::new();
        let mut rx = m.subscribe();
        m.transition(AudioEvent::Initialized); // illegal
        assert!(rx.try_recv().is_err());
    }

    // ---- Chunk bookkeeping -------------------------------------------------

    #[test]
    fn set_session_chunks_updates_live_session() {
        let mut m = recording_manager();
        m.set_session_chunks(7);
        assert_eq!(m.snapshot().session.unwrap().chunk_count, 7);
    }

    #[test]
    fn set_session_chunks_without_session_is_noop() {
        let mut m = AudioStateManager::new();
        m.set_session_chunks(7); // must not panic
        assert!(m.snapshot().session.is_none());
    }
}
