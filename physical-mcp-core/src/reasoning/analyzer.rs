//! Orchestrates vision-provider calls for scene analysis and rule
//! evaluation; the perception loop's only entry point into reasoning.

use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::camera::Frame;
use crate::config::ReasoningConfig;
use crate::error::ProviderError;
use crate::perception::SceneState;
use crate::rules::{RuleEvaluation, WatchRule};

use super::prompts::{build_analysis_prompt, build_combined_prompt, build_rule_eval_prompt};
use super::provider::{AnyProvider, VisionProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub summary: String,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub people_count: u32,
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub notable_changes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub configured: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Multi-provider frame analysis orchestrator. Holds at most one active
/// provider — swapped via `set_provider` when a client hot-configures one
/// through the MCP `configure_provider` tool.
pub struct FrameAnalyzer {
    provider: Option<AnyProvider>,
}

impl FrameAnalyzer {
    pub fn new(provider: Option<AnyProvider>) -> Self {
        FrameAnalyzer { provider }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_info(&self) -> ProviderInfo {
        match &self.provider {
            Some(p) => ProviderInfo {
                configured: true,
                provider: Some(p.provider_name()),
                model: Some(p.model_name()),
            },
            None => ProviderInfo {
                configured: false,
                provider: None,
                model: None,
            },
        }
    }

    pub fn set_provider(&mut self, provider: Option<AnyProvider>) {
        self.provider = provider;
    }

    /// Describes what's in the frame. Propagates provider/rate-limit
    /// errors so the perception loop can apply backoff; a JSON parse
    /// failure is NOT propagated — it falls back to a plain-text summary,
    /// since the API call itself succeeded.
    pub async fn analyze_scene(
        &self,
        frame: &Frame,
        previous_state: &SceneState,
        config: &ReasoningConfig,
        question: &str,
    ) -> Result<SceneAnalysis, ProviderError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::Other("No vision provider configured".to_string()))?;

        let prompt = build_analysis_prompt(previous_state, question);
        let image_b64 = frame
            .to_thumbnail(config.max_thumbnail_dim, config.image_quality)
            .map_err(|e| ProviderError::Other(format!("thumbnail encode failed: {e}")))?;

        match provider.analyze_image_json(&image_b64, &prompt).await {
            Ok(value) => Ok(parse_scene_analysis(value)),
            Err(ProviderError::Other(_)) => {
                // Only a JSON-shape failure lands here as `Other` from
                // `analyze_image_json`'s own extraction step; a genuine
                // API/auth/rate-limit error would have classified before
                // reaching extraction, so retry with plain text.
                match provider.analyze_image(&image_b64, &prompt).await {
                    Ok(text) => Ok(SceneAnalysis {
                        summary: text,
                        objects: Vec::new(),
                        people_count: 0,
                        activity: String::new(),
                        notable_changes: String::new(),
                    }),
                    Err(e) if e.triggers_backoff() => Err(e),
                    Err(e) => {
                        error!("Scene analysis retry failed: {e}");
                        Ok(SceneAnalysis {
                            summary: format!("Analysis error: {e}"),
                            objects: Vec::new(),
                            people_count: 0,
                            activity: String::new(),
                            notable_changes: String::new(),
                        })
                    }
                }
            }
            Err(e) if e.triggers_backoff() => Err(e),
            Err(e) => {
                error!("Scene analysis failed: {e}");
                Ok(SceneAnalysis {
                    summary: format!("Analysis error: {e}"),
                    objects: Vec::new(),
                    people_count: 0,
                    activity: String::new(),
                    notable_changes: String::new(),
                })
            }
        }
    }

    /// Evaluates active watch rules against the current frame + scene
    /// context. Propagates provider errors for backoff; any other failure
    /// degrades to no evaluations rather than aborting the perception loop.
    pub async fn evaluate_rules(
        &self,
        frame: &Frame,
        scene_state: &SceneState,
        rules: &[WatchRule],
        config: &ReasoningConfig,
    ) -> Result<Vec<RuleEvaluation>, ProviderError> {
        let Some(provider) = &self.provider else {
            return Ok(Vec::new());
        };
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_rule_eval_prompt(scene_state, rules);
        let image_b64 = frame
            .to_thumbnail(config.max_thumbnail_dim, config.image_quality)
            .map_err(|e| ProviderError::Other(format!("thumbnail encode failed: {e}")))?;

        match provider.analyze_image_json(&image_b64, &prompt).await {
            Ok(raw) => Ok(parse_rule_evaluations(raw)),
            Err(e) if e.triggers_backoff() => Err(e),
            Err(e) => {
                error!("Rule evaluation failed: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Single-call combination of `analyze_scene` + `evaluate_rules`: one
    /// vision-provider request produces both the scene description and the
    /// watch-rule evaluations, halving the per-cycle API cost. This is what
    /// the perception loop actually calls whenever rules are active and a
    /// frame clears the sampler; `analyze_scene`/`evaluate_rules` stay
    /// available for the on-demand, no-rules `analyze_now` path.
    pub async fn analyze_and_evaluate(
        &self,
        frame: &Frame,
        previous_state: &SceneState,
        rules: &[WatchRule],
        config: &ReasoningConfig,
    ) -> Result<(SceneAnalysis, Vec<RuleEvaluation>), ProviderError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::Other("No vision provider configured".to_string()))?;

        let prompt = build_combined_prompt(previous_state, rules, 1);
        let image_b64 = frame
            .to_thumbnail(config.max_thumbnail_dim, config.image_quality)
            .map_err(|e| ProviderError::Other(format!("thumbnail encode failed: {e}")))?;

        match provider.analyze_image_json(&image_b64, &prompt).await {
            Ok(raw) => {
                let scene = raw
                    .get("scene")
                    .cloned()
                    .map(parse_scene_analysis)
                    .unwrap_or_else(|| parse_scene_analysis(Value::Null));
                let evaluations = parse_rule_evaluations(raw);
                Ok((scene, evaluations))
            }
            Err(e) if e.triggers_backoff() => Err(e),
            Err(e) => {
                error!("Combined analysis failed: {e}");
                Ok((
                    SceneAnalysis {
                        summary: format!("Analysis error: {e}"),
                        objects: Vec::new(),
                        people_count: 0,
                        activity: String::new(),
                        notable_changes: String::new(),
                    },
                    Vec::new(),
                ))
            }
        }
    }
}

fn parse_scene_analysis(value: Value) -> SceneAnalysis {
    serde_json::from_value(value).unwrap_or(SceneAnalysis {
        summary: String::new(),
        objects: Vec::new(),
        people_count: 0,
        activity: String::new(),
        notable_changes: String::new(),
    })
}

fn parse_rule_evaluations(raw: Value) -> Vec<RuleEvaluation> {
    raw.get("evaluations")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value::<RuleEvaluation>(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_info_reflects_no_provider_configured() {
        let analyzer = FrameAnalyzer::new(None);
        assert!(!analyzer.has_provider());
        assert!(!analyzer.provider_info().configured);
    }

    #[test]
    fn parse_scene_analysis_defaults_on_malformed_shape() {
        let analysis = parse_scene_analysis(serde_json::json!("not an object"));
        assert_eq!(analysis.summary, "");
    }

    #[test]
    fn parse_rule_evaluations_skips_malformed_entries() {
        let raw = serde_json::json!({
            "evaluations": [
                {"rule_id": "r1", "triggered": true, "confidence": 0.9, "reasoning": "ok"},
                {"missing": "fields"},
            ]
        });
        let evals = parse_rule_evaluations(raw);
        assert_eq!(evals.len(), 1);
        assert_eq!(evals[0].rule_id, "r1");
    }

    #[test]
    fn parse_rule_evaluations_empty_when_key_absent() {
        let evals = parse_rule_evaluations(serde_json::json!({}));
        assert!(evals.is_empty());
    }

    #[test]
    fn parse_scene_analysis_reads_nested_scene_key() {
        let raw = serde_json::json!({
            "scene": {"summary": "a cat on the couch", "people_count": 0},
            "evaluations": [],
        });
        let scene = raw.get("scene").cloned().map(parse_scene_analysis).unwrap();
        assert_eq!(scene.summary, "a cat on the couch");
    }

    #[tokio::test]
    async fn analyze_and_evaluate_without_provider_errors() {
        let analyzer = FrameAnalyzer::new(None);
        let frame = crate::camera::Frame::new(
            image::DynamicImage::new_rgb8(4, 4),
            "test",
            1,
        );
        let err = analyzer
            .analyze_and_evaluate(&frame, &SceneState::default(), &[], &ReasoningConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Other(_)));
    }
}
