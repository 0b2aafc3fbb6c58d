//! HTTP-backed analysis executor.
//!
//! [`RemoteAnalyzer`] posts a compact feature envelope (line text, take
//! duration, amplitude features, optional thresholds) to an emotion/timing
//! scoring service and parses the JSON reply into an
//! [`AnalysisResult`](crate::batch::AnalysisResult).  The envelope is this
//! crate's own shape — vendor wire formats are a non-goal.
//!
//! All connection details come from [`AnalysisSettings`]; nothing is
//! hardcoded.  Timeouts map to `NetworkTimeout`, other transport failures to
//! `ProcessingFailed`, so callers can branch on `retryable` without string
//! matching.

use async_trait::async_trait;

use crate::audio::{AudioErrorCode, AudioErrorDetails};
use crate::config::AnalysisSettings;

use super::types::{AnalysisExecutor, AnalysisItem, AnalysisResult};

// ---------------------------------------------------------------------------
// RemoteAnalyzer
// ---------------------------------------------------------------------------

/// Production [`AnalysisExecutor`] speaking JSON over HTTP.
pub struct RemoteAnalyzer {
    client: reqwest::Client,
    settings: AnalysisSettings,
}

impl RemoteAnalyzer {
    /// Build an analyzer from settings.  The HTTP client carries the
    /// per-request timeout; a default client is the fallback if the builder
    /// fails (it does not in practice).
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl AnalysisExecutor for RemoteAnalyzer {
    async fn execute(&self, item: &AnalysisItem) -> Result<AnalysisResult, AudioErrorDetails> {
        let url = format!("{}/v1/analysis", self.settings.base_url);

        let duration_secs = if item.params.sample_rate > 0 {
            item.params.audio.len() as f32 / item.params.sample_rate as f32
        } else {
            0.0
        };

        // Amplitude envelope instead of raw samples keeps requests small.
        let (peak, mean) = amplitude_features(&item.params.audio);

        let body = serde_json::json!({
            "id": item.id,
            "text": item.params.text,
            "duration_secs": duration_secs,
            "features": {
                "peak_amplitude": peak,
                "average_amplitude": mean,
            },
            "thresholds": item.params.thresholds,
        });

        let mut req = self.client.post(&url).json(&body);

        // Authorization only when a non-empty key is configured.
        let key = self.settings.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AudioErrorDetails::new(
                AudioErrorCode::ProcessingFailed,
                format!("analysis service returned {status}"),
            ));
        }

        response.json::<AnalysisResult>().await.map_err(|e| {
            AudioErrorDetails::new(
                AudioErrorCode::ProcessingFailed,
                format!("unparseable analysis response: {e}"),
            )
        })
    }
}

fn classify_transport(e: reqwest::Error) -> AudioErrorDetails {
    if e.is_timeout() || e.is_connect() {
        AudioErrorDetails::new(AudioErrorCode::NetworkTimeout, e.to_string())
    } else {
        AudioErrorDetails::new(AudioErrorCode::ProcessingFailed, e.to_string())
    }
}

fn amplitude_features(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = 0.0_f32;
    let mut sum = 0.0_f64;
    for &s in samples {
        let a = s.abs();
        peak = peak.max(a);
        sum += a as f64;
    }
    (peak, (sum / samples.len() as f64) as f32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>) -> AnalysisSettings {
        AnalysisSettings {
            base_url: "http://localhost:8900".into(),
            api_key: api_key.map(String::from),
            timeout_secs: 10,
        }
    }

    #[test]
    fn from_settings_builds_without_panic() {
        let _ = RemoteAnalyzer::from_settings(&settings(None));
        let _ = RemoteAnalyzer::from_settings(&settings(Some("")));
        let _ = RemoteAnalyzer::from_settings(&settings(Some("sk-test")));
    }

    #[test]
    fn analyzer_is_object_safe() {
        let analyzer = RemoteAnalyzer::from_settings(&settings(None));
        let _: Box<dyn AnalysisExecutor> = Box::new(analyzer);
    }

    #[test]
    fn amplitude_features_of_empty_are_zero() {
        assert_eq!(amplitude_features(&[]), (0.0, 0.0));
    }

    #[test]
    fn amplitude_features_track_peak_and_mean() {
        let (peak, mean) = amplitude_features(&[0.5, -1.0, 0.0, 0.5]);
        assert!((peak - 1.0).abs() < 1e-6);
        assert!((mean - 0.5).abs() < 1e-6);
    }
}
