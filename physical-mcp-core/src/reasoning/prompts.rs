//! Provider-agnostic prompt templates for scene analysis and rule
//! evaluation.

use crate::perception::SceneState;
use crate::rules::WatchRule;

const STRICT_EVAL: &str = "Evaluate STRICTLY. Only trigger a rule if you see clear, unambiguous visual evidence.\n\
- For gesture rules (waving, pointing): raised hands/arms must be clearly visible\n\
- For action rules (drinking, eating, etc.): the person must be ACTIVELY performing the action, not just near an object\n\
- A water bottle visible near someone does NOT mean they are drinking\n\
- Confidence 0.9+ = certain, 0.7-0.9 = likely, below 0.7 = do not trigger\n\
- When in doubt, set triggered=false. Missing an event is better than a false alert.";

fn frame_preamble(frame_count: usize) -> String {
    if frame_count <= 1 {
        return "Analyze this camera frame.".to_string();
    }
    format!(
        "You are given {frame_count} consecutive camera frames spanning ~1.5 seconds.\n\
Frame 1 = oldest, Frame {frame_count} = most recent.\n\
Analyze the SEQUENCE — look for actions that happen across frames \
(e.g., hand raising to mouth = drinking, arm going up = waving).\n\
A brief action visible in even ONE frame should be detected."
    )
}

pub fn build_analysis_prompt(previous_state: &SceneState, question: &str) -> String {
    let context = if !previous_state.summary.is_empty() {
        format!(
            "Previous scene state:\n{}\n\nDescribe what changed, if anything.\n",
            previous_state.to_context_string()
        )
    } else {
        String::new()
    };

    let question_part = if !question.is_empty() {
        format!("\nAlso answer this specific question: {question}\n")
    } else {
        String::new()
    };

    format!(
        "Analyze this camera frame. Provide a structured description.\n{context}{question_part}\n\
Respond in JSON only:\n\
{{\n  \"summary\": \"<1-2 sentence description of the scene>\",\n  \"objects\": [\"<list of notable objects visible>\"],\n  \"people_count\": <number of people visible>,\n  \"activity\": \"<what is happening in the scene>\",\n  \"notable_changes\": \"<what changed from previous state, or 'none' if first frame>\"\n}}"
    )
}

pub fn build_rule_eval_prompt(scene_state: &SceneState, rules: &[WatchRule]) -> String {
    let rules_text = rules
        .iter()
        .map(|r| format!("  {{\"id\": \"{}\", \"condition\": \"{}\"}}", r.id, r.condition))
        .collect::<Vec<_>>()
        .join("\n");

    let context = if !scene_state.summary.is_empty() {
        format!("Current scene context:\n{}\n\n", scene_state.to_context_string())
    } else {
        String::new()
    };

    format!(
        "You are a visual monitoring system. Analyze the image against these watch rules.\n{context}\
Active watch rules:\n[{rules_text}]\n\n\
For EACH rule, determine if the condition is currently met in the image.\n\
Respond in JSON only:\n\
{{\n  \"evaluations\": [\n    {{\n      \"rule_id\": \"<id>\",\n      \"triggered\": true/false,\n      \"confidence\": 0.0-1.0,\n      \"reasoning\": \"<brief explanation>\"\n    }}\n  ]\n}}\n\n{STRICT_EVAL}"
    )
}

pub fn build_combined_prompt(
    previous_state: &SceneState,
    rules: &[WatchRule],
    frame_count: usize,
) -> String {
    let context = if !previous_state.summary.is_empty() {
        format!("Previous scene state:\n{}\n\n", previous_state.to_context_string())
    } else {
        String::new()
    };

    let rules_text = rules
        .iter()
        .map(|r| format!("    {{\"id\": \"{}\", \"condition\": \"{}\"}}", r.id, r.condition))
        .collect::<Vec<_>>()
        .join("\n");

    let preamble = frame_preamble(frame_count);

    format!(
        "{preamble}\n\nEvaluate watch rules in the same response.\n{context}\
Active watch rules:\n[{rules_text}]\n\n\
IMPORTANT: The camera may be tilted or at an unusual angle. Interpret the scene from the camera's perspective.\n\n\
Respond in JSON only:\n\
{{\n  \"scene\": {{\n    \"summary\": \"<1-2 sentence description>\",\n    \"objects\": [\"<notable objects>\"],\n    \"people_count\": <number>,\n    \"activity\": \"<what is happening>\",\n    \"notable_changes\": \"<what changed or 'none'>\"\n  }},\n  \"evaluations\": [\n    {{\n      \"rule_id\": \"<id>\",\n      \"triggered\": true/false,\n      \"confidence\": 0.0-1.0,\n      \"reasoning\": \"<brief explanation>\"\n    }}\n  ]\n}}\n\n{STRICT_EVAL}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_without_previous_state_has_no_context_block() {
        let state = SceneState::default();
        let prompt = build_analysis_prompt(&state, "");
        assert!(!prompt.contains("Previous scene state"));
    }

    #[test]
    fn analysis_prompt_includes_question_when_given() {
        let state = SceneState::default();
        let prompt = build_analysis_prompt(&state, "is the door open?");
        assert!(prompt.contains("is the door open?"));
    }

    #[test]
    fn rule_eval_prompt_lists_every_rule_condition() {
        let state = SceneState::default();
        let rules = vec![WatchRule::new("r1", "a person is waving")];
        let prompt = build_rule_eval_prompt(&state, &rules);
        assert!(prompt.contains("a person is waving"));
        assert!(prompt.contains(&rules[0].id));
    }

    #[test]
    fn combined_prompt_single_frame_uses_singular_preamble() {
        let state = SceneState::default();
        let prompt = build_combined_prompt(&state, &[], 1);
        assert!(prompt.starts_with("Analyze this camera frame."));
    }

    #[test]
    fn combined_prompt_multi_frame_mentions_sequence() {
        let state = SceneState::default();
        let prompt = build_combined_prompt(&state, &[], 3);
        assert!(prompt.contains("3 consecutive camera frames"));
    }
}
