//! Analysis work-item and result types, and the executor seam.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioErrorDetails;

// ---------------------------------------------------------------------------
// AnalysisItem
// ---------------------------------------------------------------------------

/// Optional per-item tuning knobs forwarded to the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisThresholds {
    pub vad_threshold: Option<f32>,
    pub silence_threshold_ms: Option<u64>,
}

/// What one analysis request carries: the line text, the captured take, and
/// optional thresholds.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    /// Script line the take was read against.
    pub text: String,
    /// Mono samples at `sample_rate`.
    pub audio: Vec<f32>,
    pub sample_rate: u32,
    pub thresholds: Option<AnalysisThresholds>,
}

/// Unit of work submitted to the batch processor.  Higher priority runs
/// sooner.
#[derive(Debug, Clone)]
pub struct AnalysisItem {
    pub id: String,
    pub params: AnalysisParams,
    pub priority: i32,
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// Emotion/timing scores returned by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Dominant emotion label (service vocabulary, e.g. "neutral", "angry").
    pub emotion: String,
    /// Confidence of the emotion label in `[0, 1]`.
    pub confidence: f32,
    /// Estimated speaking pace in words per minute.
    pub pace_wpm: Option<f32>,
    /// Fraction of the take spent hesitating.
    pub hesitation_ratio: Option<f32>,
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Disposition of one item after processing: success, or the error left
/// after retries were exhausted.  Items are never dropped silently.
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub item_id: String,
    /// Attempts actually made (1 on first-try success).
    pub attempts: u32,
    pub outcome: Result<AnalysisResult, AudioErrorDetails>,
}

/// Produced exactly once per batch, after every item has either succeeded or
/// exhausted its retries.  Never partially emitted.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: u64,
    pub results: Vec<ItemResult>,
    pub completed_at: SystemTime,
    pub duration: Duration,
}

impl BatchResult {
    /// Count of items that ultimately succeeded.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Count of items that exhausted their retries.
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

// ---------------------------------------------------------------------------
// AnalysisExecutor
// ---------------------------------------------------------------------------

/// The seam to the speech/emotion analysis service.
///
/// Object-safe and `Send + Sync` so the processor can hold it behind an
/// `Arc<dyn AnalysisExecutor>`.  A failing executor only ever fails its own
/// item; the processor isolates it from siblings.
#[async_trait]
pub trait AnalysisExecutor: Send + Sync {
    async fn execute(&self, item: &AnalysisItem) -> Result<AnalysisResult, AudioErrorDetails>;
}

// Compile-time assertion: Box<dyn AnalysisExecutor> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AnalysisExecutor>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioErrorCode;

    fn ok_result() -> AnalysisResult {
        AnalysisResult {
            emotion: "neutral".into(),
            confidence: 0.9,
            pace_wpm: Some(140.0),
            hesitation_ratio: Some(0.1),
        }
    }

    #[test]
    fn batch_result_counts_outcomes() {
        let result = BatchResult {
            batch_id: 1,
            results: vec![
                ItemResult {
                    item_id: "a".into(),
                    attempts: 1,
                    outcome: Ok(ok_result()),
                },
                ItemResult {
                    item_id: "b".into(),
                    attempts: 3,
                    outcome: Err(AudioErrorDetails::new(
                        AudioErrorCode::NetworkTimeout,
                        "gave up",
                    )),
                },
            ],
            completed_at: SystemTime::now(),
            duration: Duration::from_millis(12),
        };
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
    }

    #[test]
    fn analysis_result_round_trips_json() {
        let original = ok_result();
        let json = serde_json::to_string(&original).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }
}
