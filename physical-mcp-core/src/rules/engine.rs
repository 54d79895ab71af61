//! `RulesEngine`: rule CRUD, cooldown-gated evaluation post-processing.

use std::collections::HashMap;

use chrono::Utc;
use log::info;
use serde_json::Value;

use super::models::{AlertEvent, RuleEvaluation, WatchRule};

const TRIGGER_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Owns `{id -> WatchRule}`. Not internally locked — callers share it
/// behind whatever mutex/RwLock their state record uses, per the
/// shared-resource policy ("each shared component owns a single mutex").
#[derive(Default)]
pub struct RulesEngine {
    rules: HashMap<String, WatchRule>,
}

impl RulesEngine {
    pub fn new() -> Self {
        RulesEngine {
            rules: HashMap::new(),
        }
    }

    pub fn add_rule(&mut self, rule: WatchRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        self.rules.remove(id).is_some()
    }

    /// Replaces the entire rule set (used on load from `RulesStore`).
    pub fn load_rules(&mut self, rules: Vec<WatchRule>) {
        self.rules = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
    }

    pub fn list_rules(&self) -> Vec<&WatchRule> {
        self.rules.values().collect()
    }

    pub fn get_rule(&self, id: &str) -> Option<&WatchRule> {
        self.rules.get(id)
    }

    pub fn get_rule_mut(&mut self, id: &str) -> Option<&mut WatchRule> {
        self.rules.get_mut(id)
    }

    /// Rules that are enabled, apply to `camera_id`, and whose cooldown has
    /// elapsed — the set the sampler/analyzer should actually evaluate.
    pub fn get_active_rules(&self, camera_id: &str) -> Vec<&WatchRule> {
        let now = Utc::now();
        self.rules
            .values()
            .filter(|r| r.enabled && r.applies_to_camera(camera_id) && r.cooldown_elapsed(now))
            .collect()
    }

    /// An evaluation produces an `AlertEvent` iff `triggered`, confidence
    /// at or above threshold, the rule exists, is enabled, and its cooldown
    /// has elapsed. Emission is the single cooldown gate: `last_triggered`
    /// is set to `now` only when an alert is actually produced.
    pub fn process_evaluations(
        &mut self,
        evaluations: Vec<RuleEvaluation>,
        scene_summary: &str,
        frame_base64: Option<String>,
    ) -> Vec<AlertEvent> {
        let now = Utc::now();
        let mut alerts = Vec::new();

        for eval in evaluations {
            info!(
                "📊 EVAL: rule_id={} triggered={} confidence={:.2} reasoning={}",
                eval.rule_id, eval.triggered, eval.confidence, eval.reasoning
            );

            let Some(rule) = self.rules.get_mut(&eval.rule_id) else {
                continue;
            };
            if !eval.triggered
                || eval.confidence < TRIGGER_CONFIDENCE_THRESHOLD
                || !rule.enabled
                || !rule.cooldown_elapsed(now)
            {
                continue;
            }

            rule.last_triggered = Some(now);
            alerts.push(AlertEvent {
                rule: rule.clone(),
                evaluation: eval,
                scene_summary: scene_summary.to_string(),
                frame_base64: frame_base64.clone(),
            });
        }

        alerts
    }

    /// Tolerant variant for evaluations supplied by an external client
    /// (MCP `report_rule_evaluation`): malformed entries are skipped rather
    /// than failing the whole batch.
    pub fn process_client_evaluations(
        &mut self,
        evaluations: Vec<Value>,
        scene_summary: &str,
        frame_base64: Option<String>,
    ) -> Vec<AlertEvent> {
        let coerced: Vec<RuleEvaluation> = evaluations
            .into_iter()
            .filter_map(|v| coerce_evaluation(&v))
            .collect();
        self.process_evaluations(coerced, scene_summary, frame_base64)
    }
}

fn coerce_evaluation(value: &Value) -> Option<RuleEvaluation> {
    let rule_id = value.get("rule_id")?.as_str()?.to_string();
    let triggered = value.get("triggered").and_then(|v| v.as_bool()).unwrap_or(false);
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    Some(RuleEvaluation {
        rule_id,
        triggered,
        confidence,
        reasoning,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::models::NotificationTarget;

    fn engine_with_rule(cooldown_seconds: u64) -> (RulesEngine, String) {
        let mut engine = RulesEngine::new();
        let mut rule = WatchRule::new("Front door", "someone at the door");
        rule.cooldown_seconds = cooldown_seconds;
        rule.notification = NotificationTarget::default();
        let id = rule.id.clone();
        engine.add_rule(rule);
        (engine, id)
    }

    fn eval(rule_id: &str, triggered: bool, confidence: f64) -> RuleEvaluation {
        RuleEvaluation {
            rule_id: rule_id.to_string(),
            triggered,
            confidence,
            reasoning: "test".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn cooldown_blocks_second_alert() {
        let (mut engine, id) = engine_with_rule(60);
        let alerts = engine.process_evaluations(vec![eval(&id, true, 0.9)], "scene", None);
        assert_eq!(alerts.len(), 1);

        let alerts = engine.process_evaluations(vec![eval(&id, true, 0.9)], "scene", None);
        assert_eq!(alerts.len(), 0);
    }

    #[test]
    fn low_confidence_never_triggers() {
        let (mut engine, id) = engine_with_rule(60);
        let alerts = engine.process_evaluations(vec![eval(&id, true, 0.5)], "scene", None);
        assert!(alerts.is_empty());
    }

    #[test]
    fn not_triggered_produces_no_alert() {
        let (mut engine, id) = engine_with_rule(60);
        let alerts = engine.process_evaluations(vec![eval(&id, false, 0.99)], "scene", None);
        assert!(alerts.is_empty());
    }

    #[test]
    fn unknown_rule_id_is_skipped() {
        let (mut engine, _id) = engine_with_rule(60);
        let alerts = engine.process_evaluations(vec![eval("r_doesnotexist", true, 0.9)], "scene", None);
        assert!(alerts.is_empty());
    }

    #[test]
    fn disabled_rule_never_alerts() {
        let (mut engine, id) = engine_with_rule(60);
        engine.get_rule_mut(&id).unwrap().enabled = false;
        let alerts = engine.process_evaluations(vec![eval(&id, true, 0.95)], "scene", None);
        assert!(alerts.is_empty());
    }

    #[test]
    fn get_active_rules_excludes_disabled_and_camera_mismatch() {
        let mut engine = RulesEngine::new();
        let mut r1 = WatchRule::new("r1", "c1");
        r1.camera_id = "cam1".to_string();
        let mut r2 = WatchRule::new("r2", "c2");
        r2.enabled = false;
        let r3 = WatchRule::new("r3", "c3"); // applies to all cameras
        engine.add_rule(r1);
        engine.add_rule(r2);
        engine.add_rule(r3);

        let active = engine.get_active_rules("cam1");
        assert_eq!(active.len(), 2);

        let active_other = engine.get_active_rules("cam2");
        assert_eq!(active_other.len(), 1);
    }

    #[test]
    fn process_client_evaluations_skips_malformed_entries() {
        let (mut engine, id) = engine_with_rule(60);
        let evaluations = vec![
            serde_json::json!({"rule_id": id, "triggered": true, "confidence": 0.9, "reasoning": "ok"}),
            serde_json::json!({"not_rule_id": "x"}),
            serde_json::json!("garbage"),
        ];
        let alerts = engine.process_client_evaluations(evaluations, "scene", None);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn remove_rule_returns_false_for_unknown_id() {
        let mut engine = RulesEngine::new();
        assert!(!engine.remove_rule("r_nope"));
    }

    #[test]
    fn load_rules_replaces_entire_set() {
        let mut engine = RulesEngine::new();
        engine.add_rule(WatchRule::new("a", "b"));
        engine.load_rules(vec![WatchRule::new("c", "d")]);
        assert_eq!(engine.list_rules().len(), 1);
        assert_eq!(engine.list_rules()[0].name, "c");
    }
}
