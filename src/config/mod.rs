pub mod analysis;
pub mod synthetic;

pub use analysis::{AnalogueConfig, AnalysisConfig, ThresholdMode, TrajectoryConfig, TrendConfig};
pub use synthetic::SyntheticParams;
