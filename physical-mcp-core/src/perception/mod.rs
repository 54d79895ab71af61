pub mod change_detector;
pub mod frame_sampler;
pub mod scene_state;

pub use change_detector::{ChangeDetector, ChangeLevel, ChangeResult, ChangeThresholds};
pub use frame_sampler::{FrameSampler, SamplerConfig};
pub use scene_state::{ChangeLogEntry, SceneState};
