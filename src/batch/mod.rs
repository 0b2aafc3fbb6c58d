//! Adaptive batch analysis pipeline.
//!
//! ```text
//! AnalysisItem ─ add(item, prio) ─▶ BatchProcessor ─▶ BatchResult
//!                                       │  retries: LinearBackoff
//!                                       ▼
//!                              AnalysisExecutor (RemoteAnalyzer / mock)
//!
//! BatchSizeTuner — companion loop observing latency + error rate
//! ```

pub mod backoff;
pub mod processor;
pub mod remote;
pub mod tuner;
pub mod types;

pub use backoff::{ExponentialBackoff, LinearBackoff, RetryPolicy};
pub use processor::{BatchConfig, BatchProcessor, ProcessorState};
pub use remote::RemoteAnalyzer;
pub use tuner::BatchSizeTuner;
pub use types::{
    AnalysisExecutor, AnalysisItem, AnalysisParams, AnalysisResult, AnalysisThresholds,
    BatchResult, ItemResult,
};
