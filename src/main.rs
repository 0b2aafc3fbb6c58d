//! Demonstration binary — records a short live take and runs one analysis
//! batch against the configured service.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Load [`EngineConfig`] from disk (defaults on first run).
//! 3. Build the recording controller (cpal backend) and quality controller.
//! 4. Build the batch processor over a [`RemoteAnalyzer`].
//! 5. Record for five seconds, printing state transitions as they arrive.
//! 6. Submit the take for analysis and print the batch result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use scene_audio::audio::{
    ControllerConfig, CpalBackend, QualityController, RecordingController,
};
use scene_audio::batch::{
    AnalysisItem, AnalysisParams, BatchProcessor, RemoteAnalyzer,
};
use scene_audio::config::EngineConfig;

const TAKE_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("scene-audio demo starting");

    let config = EngineConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        EngineConfig::default()
    });

    // Quality controller: no platform signals on a desktop demo, so it stays
    // at its initial level; it is wired in to exercise the frame-sizing path.
    let quality = QualityController::new(Duration::from_millis(config.quality.debounce_ms));

    let controller = RecordingController::new(
        Arc::new(CpalBackend),
        ControllerConfig::from_engine(&config),
    )
    .with_quality(quality.subscribe());

    // Print state transitions while the demo runs.
    let mut snapshots = controller.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(snap) = snapshots.recv().await {
            match &snap.vad {
                Some(vad) if snap.session.is_some() => log::debug!(
                    "state: {} (speaking: {}, confidence {:.2})",
                    snap.state.label(),
                    vad.speaking,
                    vad.confidence
                ),
                _ => log::info!("state: {}", snap.state.label()),
            }
        }
    });

    if let Err(err) = controller.setup().await {
        log::error!("audio setup failed: {err}");
        eprintln!("{}", err.recovery_hint());
        std::process::exit(1);
    }

    let session = controller.start_recording().await?;
    log::info!("recording session {} for {TAKE_SECS}s — speak now", session.id);
    tokio::time::sleep(Duration::from_secs(TAKE_SECS)).await;

    let take = controller.stop_recording().await?;
    println!(
        "take {}: {:.2}s audio, {} chunks, peak {:.3}, avg {:.4}, {:.0}% silence",
        take.session.id,
        take.audio_secs(),
        take.session.chunk_count,
        take.metrics.peak_amplitude,
        take.metrics.average_amplitude,
        take.metrics.silence_ratio * 100.0
    );

    // One analysis batch over the finished take.
    let analyzer = Arc::new(RemoteAnalyzer::from_settings(&config.analysis));
    let processor = BatchProcessor::new(analyzer, config.batch.to_batch_config());
    processor.init();

    let item = AnalysisItem {
        id: take.session.id.to_string(),
        params: AnalysisParams {
            text: String::new(),
            audio: take.samples.clone(),
            sample_rate: take.sample_rate,
            thresholds: None,
        },
        priority: 1,
    };

    match processor.add(item, 1).await {
        Ok(batch) => {
            for item_result in &batch.results {
                match &item_result.outcome {
                    Ok(analysis) => println!(
                        "analysis {}: {} ({:.0}% confidence, {} attempt(s))",
                        item_result.item_id,
                        analysis.emotion,
                        analysis.confidence * 100.0,
                        item_result.attempts
                    ),
                    Err(err) => println!(
                        "analysis {} failed after {} attempt(s): {} — {}",
                        item_result.item_id,
                        item_result.attempts,
                        err,
                        err.recovery_hint()
                    ),
                }
            }
        }
        Err(_) => log::warn!("batch processor shut down before the result arrived"),
    }

    processor.shutdown();
    controller.cleanup().await;
    watcher.abort();
    Ok(())
}
