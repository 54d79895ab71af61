//! The per-camera perception loop: capture, detect, sample, analyze,
//! evaluate rules, alert. One task per open camera, spawned from
//! `main.rs` and cancelled on shutdown — cancellation always finishes the
//! in-flight tick first since nothing here holds a lock across a `.await`
//! boundary that a cancel could interrupt mid-write.
//!
//! Never exits on its own. A camera read failure, a provider error, a
//! notification failure — all of it is recorded and the loop sleeps to
//! the next tick. Only dropping the task's `JoinHandle` stops it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use physical_mcp_core::camera::source::SourceError;
use physical_mcp_core::rules::{ActiveRuleSummary, PendingAlert, WatchRule};
use serde_json::json;

use crate::state::{CameraRuntime, DaemonState};

const SNAPSHOT_PATH: &str = "/tmp/physical-mcp-frame.jpg";
const SNAPSHOT_QUALITY: u8 = 80;
const ALERT_QUEUE_TTL_SECONDS: i64 = 300;

pub async fn run(state: Arc<DaemonState>, camera_id: String, runtime: Arc<CameraRuntime>) {
    info!("perception loop starting for camera {camera_id}");
    loop {
        tick(&state, &camera_id, &runtime).await;
        let fps = state.config.lock().await.perception.capture_fps.max(1);
        tokio::time::sleep(Duration::from_secs_f64(1.0 / fps as f64)).await;
    }
}

async fn tick(state: &Arc<DaemonState>, camera_id: &str, runtime: &Arc<CameraRuntime>) {
    let frame = {
        let handle = runtime.handle.lock().await;
        handle.grab_frame().await
    };

    let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
            record_capture_error(runtime, &e).await;
            return;
        }
    };

    runtime.buffer.push(frame.clone()).await;
    {
        let mut health = runtime.health.lock().await;
        health.record_success();
    }

    if let Ok(bytes) = frame.to_jpeg_bytes(SNAPSHOT_QUALITY) {
        if let Err(e) = tokio::fs::write(SNAPSHOT_PATH, &bytes).await {
            warn!("camera {camera_id}: failed to write snapshot: {e}");
        }
    }

    let change = {
        let mut detector = runtime.detector.lock().await;
        detector.detect(&frame)
    };

    let active_rules: Vec<WatchRule> = {
        let rules = state.rules.lock().await;
        rules
            .get_active_rules(camera_id)
            .into_iter()
            .cloned()
            .collect()
    };

    if !matches!(change.level, physical_mcp_core::perception::ChangeLevel::None) {
        let mut scene = runtime.scene.lock().await;
        scene.record_change(change.description.clone());
    }

    let (should_analyze, change) = {
        let mut sampler = runtime.sampler.lock().await;
        sampler.should_analyze(change, !active_rules.is_empty())
    };

    if !should_analyze {
        return;
    }

    let has_provider = state.analyzer.lock().await.has_provider();
    let budget_exceeded = state.stats.budget_exceeded().await;
    let in_backoff = runtime.health.lock().await.in_backoff();

    if has_provider && !budget_exceeded && !in_backoff {
        run_server_side_analysis(state, camera_id, runtime, &frame, &active_rules).await;
    } else if !has_provider && !active_rules.is_empty() {
        queue_client_side_alert(state, camera_id, runtime, &frame, &change, &active_rules).await;
    }
}

async fn record_capture_error(runtime: &Arc<CameraRuntime>, err: &SourceError) {
    let mut health = runtime.health.lock().await;
    health.record_error(err.to_string());
}

async fn run_server_side_analysis(
    state: &Arc<DaemonState>,
    camera_id: &str,
    runtime: &Arc<CameraRuntime>,
    frame: &physical_mcp_core::camera::Frame,
    active_rules: &[WatchRule],
) {
    let reasoning_config = state.config.lock().await.reasoning.clone();
    let scene_snapshot = runtime.scene.lock().await.clone();

    let result = {
        let analyzer = state.analyzer.lock().await;
        analyzer
            .analyze_and_evaluate(frame, &scene_snapshot, active_rules, &reasoning_config)
            .await
    };

    match result {
        Err(e) => {
            let mut health = runtime.health.lock().await;
            health.record_error(e.to_string());
            drop(health);

            let event_id = state
                .replay
                .record(
                    "provider_error",
                    camera_id,
                    runtime.config.name.clone(),
                    "",
                    "",
                    format!("vision provider error: {e}"),
                )
                .await;
            state
                .mcp_logger
                .send(
                    "warning",
                    &format!("vision provider error: {e}"),
                    "provider_error",
                    camera_id,
                    "",
                    &event_id,
                )
                .await;
        }
        Ok((analysis, evaluations)) => {
            state.stats.record_analysis().await;

            if !analysis.summary.is_empty() {
                let mut scene = runtime.scene.lock().await;
                scene.update(
                    analysis.summary.clone(),
                    analysis.objects.clone(),
                    analysis.people_count,
                    analysis.notable_changes.clone(),
                );
            }

            let frame_b64 = frame.to_base64(SNAPSHOT_QUALITY).ok();
            let alerts = {
                let mut rules = state.rules.lock().await;
                rules.process_evaluations(evaluations, &analysis.summary, frame_b64.clone())
            };

            for alert in alerts {
                handle_alert_event(state, camera_id, runtime, alert).await;
            }
        }
    }
}

/// Fans an `AlertEvent` out to stats, memory, replay, the event bus, and
/// the notification dispatcher. Shared with the MCP `report_rule_evaluation`
/// tool, which produces `AlertEvent`s via the same `RulesEngine::process_evaluations`
/// gate but outside the perception tick.
pub(crate) async fn handle_alert_event(
    state: &Arc<DaemonState>,
    camera_id: &str,
    runtime: &Arc<CameraRuntime>,
    alert: physical_mcp_core::rules::AlertEvent,
) {
    state.stats.record_alert().await;

    let _ = state
        .memory
        .append_event(&format!(
            "ALERT [{}] {}: {}",
            alert.rule.name, camera_id, alert.evaluation.reasoning
        ))
        .await;

    let event_id = state
        .replay
        .record(
            "alert",
            camera_id,
            runtime.config.name.clone(),
            alert.rule.id.clone(),
            alert.rule.name.clone(),
            alert.evaluation.reasoning.clone(),
        )
        .await;

    state
        .events
        .publish(
            "alert",
            json!({
                "event_id": event_id,
                "camera_id": camera_id,
                "rule_id": alert.rule.id,
                "rule_name": alert.rule.name,
                "reasoning": alert.evaluation.reasoning,
                "confidence": alert.evaluation.confidence,
            }),
        )
        .await;

    state.notifier.dispatch(&alert).await;

    state
        .mcp_logger
        .send(
            "info",
            &format!("rule '{}' triggered: {}", alert.rule.name, alert.evaluation.reasoning),
            "alert",
            camera_id,
            &alert.rule.id,
            &event_id,
        )
        .await;
}

async fn queue_client_side_alert(
    state: &Arc<DaemonState>,
    camera_id: &str,
    runtime: &Arc<CameraRuntime>,
    frame: &physical_mcp_core::camera::Frame,
    change: &physical_mcp_core::perception::ChangeResult,
    active_rules: &[WatchRule],
) {
    let frame_base64 = match frame.to_base64(SNAPSHOT_QUALITY) {
        Ok(b64) => b64,
        Err(e) => {
            warn!("camera {camera_id}: failed to encode frame for pending alert: {e}");
            return;
        }
    };
    let scene_context = runtime.scene.lock().await.to_context_string();

    let pending = PendingAlert {
        id: PendingAlert::new_id(),
        camera_id: camera_id.to_string(),
        camera_name: runtime.config.name.clone(),
        timestamp: Utc::now(),
        change_level: format!("{:?}", change.level).to_lowercase(),
        change_description: change.description.clone(),
        frame_base64: frame_base64.clone(),
        scene_context,
        active_rules: active_rules.iter().map(ActiveRuleSummary::from).collect(),
        expires_at: Utc::now() + chrono::Duration::seconds(ALERT_QUEUE_TTL_SECONDS),
    };

    state.alert_queue.push(pending).await;

    let event_id = state
        .replay
        .record(
            "scene_change",
            camera_id,
            runtime.config.name.clone(),
            "",
            "",
            change.description.clone(),
        )
        .await;

    state
        .mcp_logger
        .send(
            "info",
            "CAMERA ALERT: a watched scene changed — call check_camera_alerts() to review it",
            "scene_change",
            camera_id,
            "",
            &event_id,
        )
        .await;

    state
        .events
        .publish(
            "scene_change",
            json!({
                "event_id": event_id,
                "camera_id": camera_id,
                "change_level": format!("{:?}", change.level).to_lowercase(),
                "description": change.description,
            }),
        )
        .await;

    let rule_names: Vec<String> = active_rules.iter().map(|r| r.name.clone()).collect();
    state
        .notifier
        .notify_scene_change(
            &format!("{:?}", change.level).to_lowercase(),
            &rule_names,
            Some(frame_base64.as_str()),
        )
        .await;
}
