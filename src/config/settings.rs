//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they round-trip through TOML files and can be shared across threads.
//! Each section affects only the named subsystem.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Capture normalization and voice-activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Analysis sample rate in Hz; capture is resampled to this.
    pub sample_rate: u32,
    /// Analysis channel count (currently always downmixed to 1).
    pub channels: u16,
    /// Minimum RMS amplitude for a frame to count as voice.
    pub vad_threshold: f32,
    /// Silence duration before the speaking flag drops, in milliseconds.
    pub silence_threshold_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            vad_threshold: 0.01,
            silence_threshold_ms: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSettings
// ---------------------------------------------------------------------------

/// Batch processor throttling and retry behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Total attempts per item, including the first.
    pub max_retries: u32,
    /// Base retry delay in milliseconds; attempt `n` waits `n × retry_delay`.
    pub retry_delay_ms: u64,
    /// Maximum items grouped into one batch.
    pub batch_size: usize,
    /// Average batch latency above which the tuner shrinks batches.
    pub slow_threshold_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            batch_size: 5,
            slow_threshold_ms: 3_000,
        }
    }
}

impl BatchSettings {
    /// Convert into the processor's runtime config.
    pub fn to_batch_config(&self) -> crate::batch::BatchConfig {
        crate::batch::BatchConfig {
            max_retries: self.max_retries,
            retry_delay: std::time::Duration::from_millis(self.retry_delay_ms),
            batch_size: self.batch_size,
            slow_threshold: std::time::Duration::from_millis(self.slow_threshold_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// QualitySettings
// ---------------------------------------------------------------------------

/// Adaptive quality controller behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Debounce window for quality-level changes, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

// ---------------------------------------------------------------------------
// AnalysisSettings
// ---------------------------------------------------------------------------

/// Connection details for the remote emotion/timing analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Base URL of the service endpoint.
    pub base_url: String,
    /// Bearer token — `None` for unauthenticated local deployments.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8900".into(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level engine configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use scene_audio::config::EngineConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = EngineConfig::load().unwrap();
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub audio: AudioSettings,
    pub batch: BatchSettings,
    pub quality: QualitySettings,
    pub analysis: AnalysisSettings,
}

impl EngineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist
    /// yet, so callers never special-case a first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to the platform-appropriate `settings.toml`, creating parent
    /// directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_values_are_documented_ones() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.audio.channels, 1);
        assert!((cfg.audio.vad_threshold - 0.01).abs() < 1e-7);
        assert_eq!(cfg.audio.silence_threshold_ms, 600);
        assert_eq!(cfg.batch.max_retries, 3);
        assert_eq!(cfg.batch.retry_delay_ms, 500);
        assert_eq!(cfg.batch.batch_size, 5);
        assert_eq!(cfg.batch.slow_threshold_ms, 3_000);
        assert_eq!(cfg.quality.debounce_ms, 500);
        assert_eq!(cfg.analysis.base_url, "http://localhost:8900");
        assert!(cfg.analysis.api_key.is_none());
        assert_eq!(cfg.analysis.timeout_secs, 10);
    }

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = EngineConfig::default();
        original.save_to(&path).expect("save");
        let loaded = EngineConfig::load_from(&path).expect("load");

        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.audio.vad_threshold, loaded.audio.vad_threshold);
        assert_eq!(
            original.audio.silence_threshold_ms,
            loaded.audio.silence_threshold_ms
        );
        assert_eq!(original.batch.max_retries, loaded.batch.max_retries);
        assert_eq!(original.batch.retry_delay_ms, loaded.batch.retry_delay_ms);
        assert_eq!(original.quality.debounce_ms, loaded.quality.debounce_ms);
        assert_eq!(original.analysis.base_url, loaded.analysis.base_url);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = EngineConfig::load_from(&path).expect("should not error");
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.batch.batch_size, 5);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = EngineConfig::default();
        cfg.audio.sample_rate = 48_000;
        cfg.audio.vad_threshold = 0.05;
        cfg.batch.max_retries = 7;
        cfg.batch.batch_size = 12;
        cfg.quality.debounce_ms = 1_000;
        cfg.analysis.base_url = "https://analysis.example.com".into();
        cfg.analysis.api_key = Some("sk-test".into());

        cfg.save_to(&path).expect("save");
        let loaded = EngineConfig::load_from(&path).expect("load");

        assert_eq!(loaded.audio.sample_rate, 48_000);
        assert_eq!(loaded.batch.max_retries, 7);
        assert_eq!(loaded.batch.batch_size, 12);
        assert_eq!(loaded.quality.debounce_ms, 1_000);
        assert_eq!(loaded.analysis.base_url, "https://analysis.example.com");
        assert_eq!(loaded.analysis.api_key, Some("sk-test".into()));
    }

    #[test]
    fn to_batch_config_converts_units() {
        let settings = BatchSettings::default();
        let config = settings.to_batch_config();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, std::time::Duration::from_millis(500));
        assert_eq!(config.slow_threshold, std::time::Duration::from_secs(3));
    }
}
