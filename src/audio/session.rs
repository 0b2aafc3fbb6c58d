//! Recording session and result value types.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AudioSession
// ---------------------------------------------------------------------------

/// One recording attempt.
///
/// Created by the controller at `start_recording`, mutated only by the
/// controller while the session is live, and cleared at stop/cleanup.
/// `duration` stays `None` until the session reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSession {
    pub id: Uuid,
    pub started_at: SystemTime,
    pub duration: Option<Duration>,
    /// Monotonically increasing count of captured audio chunks.
    pub chunk_count: u64,
}

impl AudioSession {
    /// Create a fresh session with a random id and the clock's current time.
    pub fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            duration: None,
            chunk_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingMetrics
// ---------------------------------------------------------------------------

/// Summary metrics over a finished take, computed at `stop_recording`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingMetrics {
    /// Mean absolute amplitude across all samples.
    pub average_amplitude: f32,
    /// Largest absolute amplitude observed.
    pub peak_amplitude: f32,
    /// Fraction of samples below the silence threshold, in `[0.0, 1.0]`.
    pub silence_ratio: f32,
    /// Wall-clock time spent flushing and summarizing the take.
    pub processing_time: Duration,
}

impl RecordingMetrics {
    /// Compute metrics over `samples`, treating amplitudes below
    /// `silence_threshold` as silence.
    pub fn compute(samples: &[f32], silence_threshold: f32, processing_time: Duration) -> Self {
        if samples.is_empty() {
            return Self {
                average_amplitude: 0.0,
                peak_amplitude: 0.0,
                silence_ratio: 1.0,
                processing_time,
            };
        }

        let mut sum = 0.0_f64;
        let mut peak = 0.0_f32;
        let mut silent = 0usize;

        for &s in samples {
            let a = s.abs();
            sum += a as f64;
            peak = peak.max(a);
            if a < silence_threshold {
                silent += 1;
            }
        }

        Self {
            average_amplitude: (sum / samples.len() as f64) as f32,
            peak_amplitude: peak,
            silence_ratio: silent as f32 / samples.len() as f32,
            processing_time,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingResult
// ---------------------------------------------------------------------------

/// Everything `stop_recording` hands back: the finished session, the captured
/// audio (mono, at the configured analysis rate), and summary metrics.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingResult {
    pub session: AudioSession,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub metrics: RecordingMetrics,
}

impl RecordingResult {
    /// Duration of the captured audio derived from the sample count.
    pub fn audio_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_creates_unique_ids() {
        let a = AudioSession::begin();
        let b = AudioSession::begin();
        assert_ne!(a.id, b.id);
        assert!(a.duration.is_none());
        assert_eq!(a.chunk_count, 0);
    }

    // ---- RecordingMetrics ---------------------------------------------------

    #[test]
    fn metrics_over_constant_signal() {
        let samples = vec![0.5_f32; 1_000];
        let m = RecordingMetrics::compute(&samples, 0.01, Duration::from_millis(3));
        assert!((m.average_amplitude - 0.5).abs() < 1e-6);
        assert!((m.peak_amplitude - 0.5).abs() < 1e-6);
        assert_eq!(m.silence_ratio, 0.0);
    }

    #[test]
    fn metrics_over_silence() {
        let samples = vec![0.0_f32; 1_000];
        let m = RecordingMetrics::compute(&samples, 0.01, Duration::ZERO);
        assert_eq!(m.average_amplitude, 0.0);
        assert_eq!(m.peak_amplitude, 0.0);
        assert_eq!(m.silence_ratio, 1.0);
    }

    #[test]
    fn metrics_mixed_signal_silence_ratio() {
        // Half silence, half voice.
        let mut samples = vec![0.0_f32; 500];
        samples.extend(vec![0.4_f32; 500]);
        let m = RecordingMetrics::compute(&samples, 0.01, Duration::ZERO);
        assert!((m.silence_ratio - 0.5).abs() < 1e-6);
        assert!((m.peak_amplitude - 0.4).abs() < 1e-6);
    }

    #[test]
    fn metrics_empty_input() {
        let m = RecordingMetrics::compute(&[], 0.01, Duration::ZERO);
        assert_eq!(m.silence_ratio, 1.0);
        assert_eq!(m.peak_amplitude, 0.0);
    }

    #[test]
    fn audio_secs_from_sample_count() {
        let result = RecordingResult {
            session: AudioSession::begin(),
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
            metrics: RecordingMetrics::compute(&[], 0.01, Duration::ZERO),
        };
        assert!((result.audio_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn audio_secs_zero_rate_is_zero() {
        let result = RecordingResult {
            session: AudioSession::begin(),
            samples: vec![0.0; 100],
            sample_rate: 0,
            metrics: RecordingMetrics::compute(&[], 0.01, Duration::ZERO),
        };
        assert_eq!(result.audio_secs(), 0.0);
    }
}
