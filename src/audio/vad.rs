//! Energy-based streaming Voice Activity Detection (VAD).
//!
//! [`VadDetector`] consumes short mono frames from the live capture path and
//! classifies each one as voice or silence against an adaptive noise floor.
//! The resulting [`VadStatus`] updates are informational: they are forwarded
//! to the state manager and consumed by the UI and by hesitation/timing
//! analysis, but never alter control flow.
//!
//! ## Algorithm
//!
//! A frame is *voice* when its RMS amplitude exceeds the larger of the
//! configured threshold and a multiple of the tracked noise floor.  The
//! noise floor is an exponential moving average of silent-frame RMS, so the
//! detector tightens in a quiet room and loosens next to a fan.
//!
//! Silent→speaking flips immediately; speaking→silent only after
//! `silence_hold` without a voice frame, so brief pauses between words do
//! not chatter.

use std::time::Duration;

use serde::Serialize;

/// Silent-frame RMS must exceed the noise floor by this factor to count as
/// voice.
const NOISE_MARGIN: f32 = 2.0;

/// EWMA weight of the previous noise-floor estimate.
const NOISE_ALPHA: f32 = 0.95;

// ---------------------------------------------------------------------------
// VadStatus
// ---------------------------------------------------------------------------

/// Point-in-time voice activity report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VadStatus {
    /// Debounced speaking flag.
    pub speaking: bool,
    /// Current noise-floor estimate (RMS).
    pub noise_level: f32,
    /// Margin of the last frame above the effective threshold, in `[0, 1]`.
    /// Zero for silent frames.
    pub confidence: f32,
    /// Stream time of the most recent voice frame, in milliseconds since the
    /// detector started.  `None` until the first voice frame.
    pub last_activity_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// VadDetector
// ---------------------------------------------------------------------------

/// Streaming voice/silence classifier with hold-off debouncing.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use scene_audio::audio::VadDetector;
///
/// let mut vad = VadDetector::new(0.01, Duration::from_millis(300));
///
/// // A loud 30 ms frame at 16 kHz flips to speaking immediately.
/// let loud = vec![0.5_f32; 480];
/// let status = vad.process_frame(&loud, 16_000);
/// assert!(status.speaking);
/// assert!(status.confidence > 0.0);
/// ```
pub struct VadDetector {
    threshold: f32,
    silence_hold: Duration,
    noise_floor: f32,
    speaking: bool,
    /// Accumulated stream time in milliseconds (fractional frames allowed).
    clock_ms: f64,
    last_voice_ms: Option<f64>,
}

impl VadDetector {
    /// Create a detector.
    ///
    /// * `threshold` — minimum RMS amplitude for a voice frame, regardless
    ///   of how quiet the room is.  Typical: `0.01`.
    /// * `silence_hold` — how long speech must be absent before the
    ///   `speaking` flag drops.
    pub fn new(threshold: f32, silence_hold: Duration) -> Self {
        Self {
            threshold,
            silence_hold,
            noise_floor: 0.0,
            speaking: false,
            clock_ms: 0.0,
            last_voice_ms: None,
        }
    }

    /// Configured RMS threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one mono frame; returns the updated status.
    ///
    /// Frames advance the detector's internal clock by
    /// `frame.len() / sample_rate`; callers must deliver frames in stream
    /// order.  Empty frames (or a zero sample rate) leave the clock
    /// untouched and return the current status.
    pub fn process_frame(&mut self, frame: &[f32], sample_rate: u32) -> VadStatus {
        if frame.is_empty() || sample_rate == 0 {
            return self.status();
        }

        self.clock_ms += frame.len() as f64 * 1_000.0 / sample_rate as f64;

        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = mean_sq.sqrt();

        let effective = self.threshold.max(self.noise_floor * NOISE_MARGIN);
        let is_voice = rms > effective;

        let confidence = if is_voice {
            (((rms - effective) / effective).min(1.0)).max(0.0)
        } else {
            0.0
        };

        if is_voice {
            self.last_voice_ms = Some(self.clock_ms);
            self.speaking = true;
        } else {
            // Track the room while nobody is talking.
            self.noise_floor = NOISE_ALPHA * self.noise_floor + (1.0 - NOISE_ALPHA) * rms;

            if self.speaking {
                let held = match self.last_voice_ms {
                    Some(last) => self.clock_ms - last,
                    None => f64::MAX,
                };
                if held >= self.silence_hold.as_millis() as f64 {
                    self.speaking = false;
                }
            }
        }

        VadStatus {
            speaking: self.speaking,
            noise_level: self.noise_floor,
            confidence,
            last_activity_ms: self.last_voice_ms.map(|ms| ms as u64),
        }
    }

    /// Current status without consuming a frame.
    pub fn status(&self) -> VadStatus {
        VadStatus {
            speaking: self.speaking,
            noise_level: self.noise_floor,
            confidence: 0.0,
            last_activity_ms: self.last_voice_ms.map(|ms| ms as u64),
        }
    }

    /// Forget everything; used when a new capture stream starts.
    pub fn reset(&mut self) {
        self.noise_floor = 0.0;
        self.speaking = false;
        self.clock_ms = 0.0;
        self.last_voice_ms = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;
    /// 30 ms at 16 kHz.
    const FRAME: usize = 480;

    fn loud() -> Vec<f32> {
        vec![0.5_f32; FRAME]
    }

    fn quiet() -> Vec<f32> {
        vec![0.0_f32; FRAME]
    }

    fn detector(hold_ms: u64) -> VadDetector {
        VadDetector::new(0.01, Duration::from_millis(hold_ms))
    }

    // ---- Flip semantics ----------------------------------------------------

    #[test]
    fn voice_frame_flips_speaking_immediately() {
        let mut vad = detector(300);
        let status = vad.process_frame(&loud(), RATE);
        assert!(status.speaking);
        assert_eq!(status.last_activity_ms, Some(30));
    }

    #[test]
    fn short_pause_does_not_drop_speaking() {
        let mut vad = detector(300);
        vad.process_frame(&loud(), RATE);

        // 5 silent frames = 150 ms < 300 ms hold.
        let mut status = vad.status();
        for _ in 0..5 {
            status = vad.process_frame(&quiet(), RATE);
        }
        assert!(status.speaking, "dropped during a brief pause");
    }

    #[test]
    fn long_silence_drops_speaking() {
        let mut vad = detector(300);
        vad.process_frame(&loud(), RATE);

        // 11 silent frames = 330 ms >= 300 ms hold.
        let mut status = vad.status();
        for _ in 0..11 {
            status = vad.process_frame(&quiet(), RATE);
        }
        assert!(!status.speaking, "still speaking after the hold elapsed");
    }

    #[test]
    fn speech_resumes_after_silence() {
        let mut vad = detector(60);
        vad.process_frame(&loud(), RATE);
        for _ in 0..4 {
            vad.process_frame(&quiet(), RATE);
        }
        assert!(!vad.status().speaking);

        let status = vad.process_frame(&loud(), RATE);
        assert!(status.speaking);
    }

    // ---- Confidence --------------------------------------------------------

    #[test]
    fn silent_frame_has_zero_confidence() {
        let mut vad = detector(300);
        let status = vad.process_frame(&quiet(), RATE);
        assert_eq!(status.confidence, 0.0);
        assert!(!status.speaking);
    }

    #[test]
    fn confidence_is_clamped_to_unit_range() {
        let mut vad = detector(300);
        let status = vad.process_frame(&vec![1.0_f32; FRAME], RATE);
        assert!(status.confidence <= 1.0);
        assert!(status.confidence > 0.0);
    }

    // ---- Noise floor -------------------------------------------------------

    #[test]
    fn noise_floor_rises_with_ambient_noise() {
        let mut vad = detector(300);
        let hum = vec![0.004_f32; FRAME]; // below threshold → silence
        let mut status = vad.status();
        for _ in 0..50 {
            status = vad.process_frame(&hum, RATE);
        }
        assert!(status.noise_level > 0.003, "noise floor did not adapt");
        assert!(!status.speaking);
    }

    #[test]
    fn raised_floor_masks_marginal_signal() {
        let mut vad = detector(300);
        // Sub-threshold hum settles the floor near 0.008, pushing the
        // effective threshold to ~0.016.
        for _ in 0..100 {
            vad.process_frame(&vec![0.008_f32; FRAME], RATE);
        }
        // A frame above the static threshold but under 2x the floor must
        // not register as voice.
        let status = vad.process_frame(&vec![0.012_f32; FRAME], RATE);
        assert!(!status.speaking);
    }

    // ---- Edge cases --------------------------------------------------------

    #[test]
    fn empty_frame_is_a_noop() {
        let mut vad = detector(300);
        vad.process_frame(&loud(), RATE);
        let before = vad.status();
        let after = vad.process_frame(&[], RATE);
        assert_eq!(before, after);
    }

    #[test]
    fn zero_sample_rate_is_a_noop() {
        let mut vad = detector(300);
        let before = vad.status();
        let after = vad.process_frame(&loud(), 0);
        assert_eq!(before, after);
    }

    #[test]
    fn reset_clears_state() {
        let mut vad = detector(300);
        vad.process_frame(&loud(), RATE);
        vad.reset();
        let status = vad.status();
        assert!(!status.speaking);
        assert_eq!(status.last_activity_ms, None);
        assert_eq!(status.noise_level, 0.0);
    }
}
