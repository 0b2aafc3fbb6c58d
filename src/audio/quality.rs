//! Adaptive capture-quality selection.
//!
//! The streaming path cannot ask the platform "how constrained are we?" at
//! every chunk, so [`QualityController`] watches coarse device signals
//! (battery, visibility, connection type) and publishes a debounced
//! [`QualityLevel`] over a watch channel.  Downstream capture consults the
//! current level to size analysis frames — larger frames under constrained
//! conditions mean fewer wakeups.
//!
//! ## Decision table
//!
//! | Condition                              | Level  |
//! |----------------------------------------|--------|
//! | backgrounded, offline, or low battery  | Low    |
//! | wifi or 4g                             | High   |
//! | 3g                                     | Medium |
//! | anything else                          | Low    |
//!
//! Signal flapping (e.g. a connection bouncing between wifi and cellular) is
//! debounced: a change only commits after `debounce` of stability, and a
//! flap back to the current level cancels the pending change entirely.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// QualityLevel
// ---------------------------------------------------------------------------

/// Target capture/encoding quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

/// Analysis frame size (in samples) the capture worker should accumulate at
/// this level.  Constrained conditions get larger frames.
pub fn chunk_samples(level: QualityLevel, sample_rate: u32) -> usize {
    let per_sec = sample_rate.max(1) as usize;
    match level {
        QualityLevel::High => per_sec / 10,  // 100 ms
        QualityLevel::Medium => per_sec / 4, // 250 ms
        QualityLevel::Low => per_sec / 2,    // 500 ms
    }
}

// ---------------------------------------------------------------------------
// DeviceSignals
// ---------------------------------------------------------------------------

/// Network connection classes the decision table distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionKind {
    Wifi,
    Cellular4g,
    Cellular3g,
    Cellular2g,
    Other,
}

/// Raw platform signals, as last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSignals {
    /// Window/tab is not visible.
    pub backgrounded: bool,
    pub online: bool,
    pub battery_low: bool,
    pub connection: ConnectionKind,
}

impl Default for DeviceSignals {
    fn default() -> Self {
        Self {
            backgrounded: false,
            online: true,
            battery_low: false,
            connection: ConnectionKind::Wifi,
        }
    }
}

/// The fixed decision table. Pure — the debouncing lives in the controller.
pub fn resolve(signals: &DeviceSignals) -> QualityLevel {
    if signals.backgrounded || !signals.online || signals.battery_low {
        return QualityLevel::Low;
    }
    match signals.connection {
        ConnectionKind::Wifi | ConnectionKind::Cellular4g => QualityLevel::High,
        ConnectionKind::Cellular3g => QualityLevel::Medium,
        ConnectionKind::Cellular2g | ConnectionKind::Other => QualityLevel::Low,
    }
}

// ---------------------------------------------------------------------------
// QualityController
// ---------------------------------------------------------------------------

/// Debounced quality-level publisher.
///
/// Feed it signals with [`update`](Self::update) whenever the platform
/// reports a change; consumers hold a `watch::Receiver` from
/// [`subscribe`](Self::subscribe).  Must be used inside a tokio runtime
/// (the debounce timer is a spawned task).
pub struct QualityController {
    debounce: Duration,
    tx: Arc<watch::Sender<QualityLevel>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl QualityController {
    /// Starts at [`QualityLevel::High`] with the given debounce window.
    pub fn new(debounce: Duration) -> Self {
        let (tx, _) = watch::channel(QualityLevel::High);
        Self {
            debounce,
            tx: Arc::new(tx),
            pending: Mutex::new(None),
        }
    }

    /// Level currently in force (pending changes not yet applied).
    pub fn current(&self) -> QualityLevel {
        *self.tx.borrow()
    }

    /// Watch receiver for committed level changes.
    pub fn subscribe(&self) -> watch::Receiver<QualityLevel> {
        self.tx.subscribe()
    }

    /// Recompute the target level from `signals` and (re)arm the debounce
    /// timer.  Rapid repeated calls within the window collapse to at most
    /// one committed change; a flap back to the current level cancels the
    /// pending change.
    pub fn update(&self, signals: &DeviceSignals) {
        let target = resolve(signals);

        let mut pending = self.pending.lock().unwrap();
        if let Some(task) = pending.take() {
            task.abort();
        }

        if target == self.current() {
            return;
        }

        log::debug!(
            "quality: {:?} → {:?} pending ({} ms debounce)",
            self.current(),
            target,
            self.debounce.as_millis()
        );

        let tx = Arc::clone(&self.tx);
        let debounce = self.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = tx.send(target);
        }));
    }
}

impl Drop for QualityController {
    fn drop(&mut self) {
        if let Some(task) = self.pending.lock().unwrap().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Decision table (pure) ---------------------------------------------

    #[test]
    fn backgrounded_forces_low_regardless_of_connection() {
        for connection in [
            ConnectionKind::Wifi,
            ConnectionKind::Cellular4g,
            ConnectionKind::Cellular3g,
        ] {
            let signals = DeviceSignals {
                backgrounded: true,
                connection,
                ..DeviceSignals::default()
            };
            assert_eq!(resolve(&signals), QualityLevel::Low);
        }
    }

    #[test]
    fn offline_forces_low() {
        let signals = DeviceSignals {
            online: false,
            ..DeviceSignals::default()
        };
        assert_eq!(resolve(&signals), QualityLevel::Low);
    }

    #[test]
    fn low_battery_forces_low() {
        let signals = DeviceSignals {
            battery_low: true,
            ..DeviceSignals::default()
        };
        assert_eq!(resolve(&signals), QualityLevel::Low);
    }

    #[test]
    fn wifi_resolves_high() {
        assert_eq!(resolve(&DeviceSignals::default()), QualityLevel::High);
    }

    #[test]
    fn cellular_tiers() {
        let mk = |connection| DeviceSignals {
            connection,
            ..DeviceSignals::default()
        };
        assert_eq!(resolve(&mk(ConnectionKind::Cellular4g)), QualityLevel::High);
        assert_eq!(
            resolve(&mk(ConnectionKind::Cellular3g)),
            QualityLevel::Medium
        );
        assert_eq!(resolve(&mk(ConnectionKind::Cellular2g)), QualityLevel::Low);
        assert_eq!(resolve(&mk(ConnectionKind::Other)), QualityLevel::Low);
    }

    // ---- Chunk sizing ------------------------------------------------------

    #[test]
    fn constrained_levels_use_larger_chunks() {
        let high = chunk_samples(QualityLevel::High, 16_000);
        let medium = chunk_samples(QualityLevel::Medium, 16_000);
        let low = chunk_samples(QualityLevel::Low, 16_000);
        assert!(high < medium && medium < low);
        assert_eq!(high, 1_600);
        assert_eq!(low, 8_000);
    }

    // ---- Debounce ----------------------------------------------------------

    async fn settle() {
        // Let the (aborted or fired) debounce tasks run to completion.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn change_commits_only_after_debounce() {
        let ctl = QualityController::new(Duration::from_millis(100));
        // Keep a receiver alive: a watch commit is dropped if the channel has
        // no receivers, so `current()` would otherwise never observe a change.
        let _rx = ctl.subscribe();
        let offline = DeviceSignals {
            online: false,
            ..DeviceSignals::default()
        };

        ctl.update(&offline);
        assert_eq!(ctl.current(), QualityLevel::High, "committed too early");
        // Let the spawned debounce task register its sleep deadline before the
        // paused clock advances, otherwise its timer is armed past the jump.
        settle().await;

        tokio::time::advance(Duration::from_millis(101)).await;
        settle().await;
        assert_eq!(ctl.current(), QualityLevel::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn flap_back_cancels_pending_change() {
        let ctl = QualityController::new(Duration::from_millis(100));
        let offline = DeviceSignals {
            online: false,
            ..DeviceSignals::default()
        };

        ctl.update(&offline);
        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;

        // Back to the starting conditions before the window elapses.
        ctl.update(&DeviceSignals::default());
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;

        assert_eq!(ctl.current(), QualityLevel::High, "flap leaked through");
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_toggles_emit_a_single_change() {
        let ctl = QualityController::new(Duration::from_millis(100));
        let mut rx = ctl.subscribe();
        assert!(!rx.has_changed().unwrap());

        let offline = DeviceSignals {
            online: false,
            ..DeviceSignals::default()
        };
        let cell3g = DeviceSignals {
            connection: ConnectionKind::Cellular3g,
            ..DeviceSignals::default()
        };

        // Three updates inside one window: only the last target commits.
        // Each `settle()` lets the freshly spawned debounce task register its
        // sleep deadline before the paused clock advances past it.
        ctl.update(&offline);
        settle().await;
        tokio::time::advance(Duration::from_millis(30)).await;
        ctl.update(&offline);
        settle().await;
        tokio::time::advance(Duration::from_millis(30)).await;
        ctl.update(&cell3g);
        settle().await;
        tokio::time::advance(Duration::from_millis(101)).await;
        settle().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), QualityLevel::Medium);
        assert!(!rx.has_changed().unwrap(), "more than one change emitted");
    }

    #[tokio::test(start_paused = true)]
    async fn same_level_update_is_a_noop() {
        let ctl = QualityController::new(Duration::from_millis(100));
        let mut rx = ctl.subscribe();

        ctl.update(&DeviceSignals::default()); // resolves High == current
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;

        assert!(!rx.has_changed().unwrap());
    }
}
