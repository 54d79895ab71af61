//! Watch-rule CRUD: `GET/POST /rules`, `PUT/DELETE /rules/{id}`.
//!
//! `POST` auto-fills the notification target from the global config when
//! the caller leaves it at the `local` default and an OpenClaw channel is
//! configured, the same auto-selection the MCP `add_watch_rule` tool does.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use physical_mcp_core::rules::{NotificationTarget, NotificationType, WatchRule};
use serde::Deserialize;
use serde_json::json;

use crate::state::DaemonState;

use super::not_found_error;

pub async fn list_rules(State(state): State<Arc<DaemonState>>) -> impl IntoResponse {
    let rules = state.rules.lock().await;
    let list: Vec<&WatchRule> = rules.list_rules();
    Json(json!({ "rules": list }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub condition: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub priority: Option<physical_mcp_core::rules::RulePriority>,
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
    #[serde(default)]
    pub notification: Option<NotificationTarget>,
}

pub async fn create_rule(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<CreateRuleRequest>,
) -> impl IntoResponse {
    let mut rule = WatchRule::new(req.name, req.condition);
    rule.camera_id = req.camera_id;
    if let Some(priority) = req.priority {
        rule.priority = priority;
    }
    if let Some(cooldown) = req.cooldown_seconds {
        rule.cooldown_seconds = cooldown;
    }
    rule.notification = req.notification.unwrap_or_default();

    if rule.notification.kind == NotificationType::Local {
        let config = state.config.lock().await;
        if !config.notifications.openclaw_command.is_empty() {
            rule.notification.kind = NotificationType::Openclaw;
        }
    }

    {
        let mut engine = state.rules.lock().await;
        engine.add_rule(rule.clone());
        persist_rules(&state, &engine).await;
    }

    Json(rule)
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub condition: Option<String>,
    pub camera_id: Option<String>,
    pub priority: Option<physical_mcp_core::rules::RulePriority>,
    pub enabled: Option<bool>,
    pub cooldown_seconds: Option<u64>,
    pub notification: Option<NotificationTarget>,
}

pub async fn update_rule(
    Path(rule_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<UpdateRuleRequest>,
) -> Response {
    let mut engine = state.rules.lock().await;
    let Some(rule) = engine.get_rule_mut(&rule_id) else {
        return not_found_error(format!("unknown rule: {rule_id}")).into_response();
    };
    if let Some(name) = req.name {
        rule.name = name;
    }
    if let Some(condition) = req.condition {
        rule.condition = condition;
    }
    if let Some(camera_id) = req.camera_id {
        rule.camera_id = camera_id;
    }
    if let Some(priority) = req.priority {
        rule.priority = priority;
    }
    if let Some(enabled) = req.enabled {
        rule.enabled = enabled;
    }
    if let Some(cooldown) = req.cooldown_seconds {
        rule.cooldown_seconds = cooldown;
    }
    if let Some(notification) = req.notification {
        rule.notification = notification;
    }
    let updated = rule.clone();
    persist_rules(&state, &engine).await;
    Json(updated).into_response()
}

pub async fn delete_rule(
    Path(rule_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
) -> Response {
    let mut engine = state.rules.lock().await;
    if !engine.remove_rule(&rule_id) {
        return not_found_error(format!("unknown rule: {rule_id}")).into_response();
    }
    persist_rules(&state, &engine).await;
    drop(engine);
    state.alert_queue.flush_rule(&rule_id).await;
    Json(json!({ "deleted": rule_id })).into_response()
}

async fn persist_rules(state: &Arc<DaemonState>, engine: &physical_mcp_core::rules::RulesEngine) {
    let rules: Vec<WatchRule> = engine.list_rules().into_iter().cloned().collect();
    if let Err(e) = state.rules_store.save(&rules) {
        log::warn!("failed to persist rules: {e}");
    }
}
