//! Engine configuration: typed settings with TOML persistence.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AnalysisSettings, AudioSettings, BatchSettings, EngineConfig, QualitySettings,
};
