pub mod analyzer;
pub mod json_extract;
pub mod prompts;
pub mod provider;

pub use analyzer::{FrameAnalyzer, ProviderInfo, SceneAnalysis};
pub use json_extract::extract_json;
pub use prompts::{build_analysis_prompt, build_combined_prompt, build_rule_eval_prompt};
pub use provider::{create_provider, AnyProvider, VisionProvider};
