//! MCP tool server: the same state the HTTP API reads, exposed as tools
//! an AI chat client can call directly. Every tool that represents a
//! significant event (an alert fired, a rule added, a provider swapped)
//! also emits a `PMCP[...]` line through `McpLogger::send`, mirroring the
//! structured logging `server.py` produced per call.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use physical_mcp_core::config::ReasoningConfig;
use physical_mcp_core::reasoning::create_provider;
use physical_mcp_core::rules::{NotificationType, RuleEvaluation, RulePriority, WatchRule};
use rmcp::handler::server::tool::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::state::DaemonState;

fn parse_priority(s: &str) -> RulePriority {
    match s.to_ascii_lowercase().as_str() {
        "low" => RulePriority::Low,
        "high" => RulePriority::High,
        "critical" => RulePriority::Critical,
        _ => RulePriority::Medium,
    }
}

fn ok_json(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "{}".to_string());
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn tool_error(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Empty {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CameraIdArg {
    #[serde(default)]
    pub camera_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecentChangesArgs {
    #[serde(default)]
    pub camera_id: String,
    #[serde(default = "default_minutes")]
    pub minutes: i64,
}
fn default_minutes() -> i64 {
    10
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeNowArgs {
    #[serde(default)]
    pub camera_id: String,
    #[serde(default = "default_question")]
    pub question: String,
}
fn default_question() -> String {
    "What do you see in this frame?".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReportRuleEvaluationArgs {
    pub rule_id: String,
    pub triggered: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub reasoning: String,
}
fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddWatchRuleArgs {
    pub name: String,
    pub condition: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RuleIdArg {
    pub rule_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTemplatesArgs {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFromTemplateArgs {
    pub template_id: String,
    #[serde(default)]
    pub camera_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConfigureProviderArgs {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SavePreferenceArgs {
    pub key: String,
    pub value: String,
}

#[derive(Clone)]
pub struct PhysicalMcpServer {
    state: Arc<DaemonState>,
    tool_router: rmcp::handler::server::tool::ToolRouter<Self>,
}

#[tool_router]
impl PhysicalMcpServer {
    pub fn new(state: Arc<DaemonState>) -> Self {
        PhysicalMcpServer {
            state,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Capture the latest frame from a camera and return it as an image")]
    async fn capture_frame(
        &self,
        Parameters(args): Parameters<CameraIdArg>,
    ) -> Result<CallToolResult, McpError> {
        let Some((camera_id, camera)) = self.state.resolve_camera(&args.camera_id).await else {
            return Err(tool_error(format!("unknown camera: {}", args.camera_id)));
        };
        let Some(frame) = camera.buffer.latest().await else {
            return Err(tool_error("no frame captured yet"));
        };
        let b64 = frame
            .to_base64(80)
            .map_err(|e| tool_error(format!("encode failed: {e}")))?;
        Ok(CallToolResult::success(vec![
            Content::text(format!("frame from camera {camera_id}")),
            Content::image(b64, "image/jpeg".to_string()),
        ]))
    }

    #[tool(description = "List all configured cameras with their id, name, type, and status")]
    async fn list_cameras(&self, Parameters(_): Parameters<Empty>) -> Result<CallToolResult, McpError> {
        let cameras = self.state.cameras.lock().await;
        let mut out = Vec::new();
        for (id, runtime) in cameras.iter() {
            let health = runtime.health_snapshot().await;
            out.push(json!({
                "id": id,
                "name": runtime.config.name,
                "type": runtime.config.kind,
                "status": format!("{:?}", health.status),
            }));
        }
        ok_json(json!({ "cameras": out }))
    }

    #[tool(description = "Get detailed health/status for one camera")]
    async fn get_camera_status(
        &self,
        Parameters(args): Parameters<CameraIdArg>,
    ) -> Result<CallToolResult, McpError> {
        let health = self.state.default_camera_health_view(&args.camera_id).await;
        ok_json(serde_json::to_value(health).unwrap_or(json!({})))
    }

    #[tool(description = "Get the current scene understanding for a camera: summary, objects, reasoning mode, pending alerts")]
    async fn get_scene_state(
        &self,
        Parameters(args): Parameters<CameraIdArg>,
    ) -> Result<CallToolResult, McpError> {
        let Some((camera_id, camera)) = self.state.resolve_camera(&args.camera_id).await else {
            return Err(tool_error(format!("unknown camera: {}", args.camera_id)));
        };
        let scene = camera.scene.lock().await.clone();
        ok_json(json!({
            "camera_id": camera_id,
            "reasoning_mode": self.state.reasoning_mode().await,
            "pending_alerts": self.state.alert_queue.size().await,
            "scene": scene,
        }))
    }

    #[tool(description = "List the recent scene-change log entries for a camera")]
    async fn get_recent_changes(
        &self,
        Parameters(args): Parameters<RecentChangesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let Some((camera_id, camera)) = self.state.resolve_camera(&args.camera_id).await else {
            return Err(tool_error(format!("unknown camera: {}", args.camera_id)));
        };
        let scene = camera.scene.lock().await;
        let log = scene.get_change_log(args.minutes);
        ok_json(json!({ "camera_id": camera_id, "changes": log }))
    }

    #[tool(description = "Analyze the current frame right now, either with the server's own vision provider or by returning the frame for the calling client to look at")]
    async fn analyze_now(
        &self,
        Parameters(args): Parameters<AnalyzeNowArgs>,
    ) -> Result<CallToolResult, McpError> {
        let Some((camera_id, camera)) = self.state.resolve_camera(&args.camera_id).await else {
            return Err(tool_error(format!("unknown camera: {}", args.camera_id)));
        };
        let Some(frame) = camera.buffer.latest().await else {
            return Err(tool_error("no frame captured yet"));
        };

        let has_provider = self.state.analyzer.lock().await.has_provider();
        if has_provider {
            let reasoning_config = self.state.config.lock().await.reasoning.clone();
            let scene_snapshot = camera.scene.lock().await.clone();
            let analyzer = self.state.analyzer.lock().await;
            let result = analyzer
                .analyze_scene(&frame, &scene_snapshot, &reasoning_config, &args.question)
                .await
                .map_err(|e| tool_error(e.to_string()))?;
            self.state.stats.record_analysis().await;
            ok_json(json!({ "camera_id": camera_id, "mode": "server", "analysis": result }))
        } else {
            let b64 = frame
                .to_base64(80)
                .map_err(|e| tool_error(format!("encode failed: {e}")))?;
            let scene_context = camera.scene.lock().await.to_context_string();
            Ok(CallToolResult::success(vec![
                Content::text(format!(
                    "no vision provider configured; analyze this frame yourself. camera={camera_id} question={} recent context: {scene_context}",
                    args.question
                )),
                Content::image(b64, "image/jpeg".to_string()),
            ]))
        }
    }

    #[tool(description = "Drain any pending camera alerts queued while running in client-reasoning mode")]
    async fn check_camera_alerts(&self, Parameters(_): Parameters<Empty>) -> Result<CallToolResult, McpError> {
        let pending = self.state.alert_queue.pop_all().await;
        if pending.is_empty() {
            return ok_json(json!({ "alerts": [] }));
        }

        if let Some(first) = pending.first() {
            let mut cached = self.state.cached_alert_frame.lock().await;
            *cached = Some((first.camera_id.clone(), first.frame_base64.clone().into_bytes()));
        }

        let summaries: Vec<_> = pending
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "camera_id": p.camera_id,
                    "camera_name": p.camera_name,
                    "timestamp": p.timestamp,
                    "change_level": p.change_level,
                    "change_description": p.change_description,
                    "scene_context": p.scene_context,
                    "active_rules": p.active_rules,
                })
            })
            .collect();

        let mut content = vec![Content::text(serde_json::to_string_pretty(&json!({ "alerts": summaries })).unwrap_or_default())];
        for p in pending.iter().take(4) {
            content.push(Content::image(p.frame_base64.clone(), "image/jpeg".to_string()));
        }
        Ok(CallToolResult::success(content))
    }

    #[tool(description = "Report the result of evaluating a watch rule against a frame the client analyzed itself")]
    async fn report_rule_evaluation(
        &self,
        Parameters(args): Parameters<ReportRuleEvaluationArgs>,
    ) -> Result<CallToolResult, McpError> {
        let evaluation = RuleEvaluation {
            rule_id: args.rule_id.clone(),
            triggered: args.triggered,
            confidence: args.confidence,
            reasoning: args.reasoning.clone(),
            timestamp: chrono::Utc::now(),
        };

        let camera_id = {
            let rules = self.state.rules.lock().await;
            rules.get_rule(&args.rule_id).map(|r| r.camera_id.clone()).unwrap_or_default()
        };
        let (resolved_camera_id, runtime) = match self.state.resolve_camera(&camera_id).await {
            Some(pair) => pair,
            None => return Err(tool_error("no camera available to attach this evaluation to")),
        };

        let scene_summary = runtime.scene.lock().await.summary.clone();
        let cached_frame = {
            let cached = self.state.cached_alert_frame.lock().await;
            cached.as_ref().map(|(_, bytes)| String::from_utf8_lossy(bytes).to_string())
        };

        let alerts = {
            let mut engine = self.state.rules.lock().await;
            engine.process_evaluations(vec![evaluation], &scene_summary, cached_frame)
        };

        let triggered_count = alerts.len();
        for alert in alerts {
            crate::perception_loop::handle_alert_event(&self.state, &resolved_camera_id, &runtime, alert).await;
        }

        ok_json(json!({ "rule_id": args.rule_id, "alerts_produced": triggered_count }))
    }

    #[tool(description = "Create a new watch rule from a natural-language condition")]
    async fn add_watch_rule(
        &self,
        Parameters(args): Parameters<AddWatchRuleArgs>,
    ) -> Result<CallToolResult, McpError> {
        let mut rule = WatchRule::new(args.name, args.condition);
        rule.camera_id = args.camera_id;
        if let Some(priority) = args.priority {
            rule.priority = parse_priority(&priority);
        }
        if let Some(cooldown) = args.cooldown_seconds {
            rule.cooldown_seconds = cooldown;
        }

        {
            let config = self.state.config.lock().await;
            if !config.notifications.openclaw_command.is_empty() {
                rule.notification.kind = NotificationType::Openclaw;
            }
        }

        let persisted = {
            let mut engine = self.state.rules.lock().await;
            engine.add_rule(rule.clone());
            persist_rules(&self.state, &engine).await
        };

        self.state
            .mcp_logger
            .send("info", &format!("rule '{}' created", rule.name), "rule_created", &rule.camera_id, &rule.id, "")
            .await;

        let _ = persisted;
        ok_json(serde_json::to_value(rule).unwrap_or(json!({})))
    }

    #[tool(description = "List all configured watch rules")]
    async fn list_watch_rules(&self, Parameters(_): Parameters<Empty>) -> Result<CallToolResult, McpError> {
        let engine = self.state.rules.lock().await;
        let rules: Vec<&WatchRule> = engine.list_rules();
        ok_json(json!({ "rules": rules }))
    }

    #[tool(description = "Remove a watch rule by id")]
    async fn remove_watch_rule(
        &self,
        Parameters(args): Parameters<RuleIdArg>,
    ) -> Result<CallToolResult, McpError> {
        let removed = {
            let mut engine = self.state.rules.lock().await;
            let removed = engine.remove_rule(&args.rule_id);
            if removed {
                persist_rules(&self.state, &engine).await;
            }
            removed
        };
        if removed {
            self.state.alert_queue.flush_rule(&args.rule_id).await;
        }
        ok_json(json!({ "rule_id": args.rule_id, "removed": removed }))
    }

    #[tool(description = "List built-in rule templates, optionally filtered by category")]
    async fn list_rule_templates(
        &self,
        Parameters(args): Parameters<ListTemplatesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let templates = physical_mcp_core::rules::list_templates(args.category.as_deref());
        ok_json(json!({
            "categories": physical_mcp_core::rules::templates::get_categories(),
            "templates": templates,
        }))
    }

    #[tool(description = "Create a watch rule from a built-in template id")]
    async fn create_rule_from_template(
        &self,
        Parameters(args): Parameters<CreateFromTemplateArgs>,
    ) -> Result<CallToolResult, McpError> {
        let Some(template) = physical_mcp_core::rules::get_template(&args.template_id) else {
            return Err(tool_error(format!("unknown template: {}", args.template_id)));
        };

        let mut rule = WatchRule::new(template.name.to_string(), template.condition.to_string());
        rule.camera_id = args.camera_id;
        rule.priority = parse_priority(template.priority);
        rule.cooldown_seconds = template.cooldown_seconds;

        {
            let mut engine = self.state.rules.lock().await;
            engine.add_rule(rule.clone());
            persist_rules(&self.state, &engine).await;
        }
        ok_json(serde_json::to_value(rule).unwrap_or(json!({})))
    }

    #[tool(description = "Get system stats: analysis counts, estimated cost, budget remaining")]
    async fn get_system_stats(&self, Parameters(_): Parameters<Empty>) -> Result<CallToolResult, McpError> {
        let summary = self.state.stats.summary().await;
        ok_json(serde_json::to_value(summary).unwrap_or(json!({})))
    }

    #[tool(description = "Get detailed health info for one camera, or the default camera")]
    async fn get_camera_health(
        &self,
        Parameters(args): Parameters<CameraIdArg>,
    ) -> Result<CallToolResult, McpError> {
        let health = self.state.default_camera_health_view(&args.camera_id).await;
        ok_json(serde_json::to_value(health).unwrap_or(json!({})))
    }

    #[tool(description = "Hot-swap the vision provider used for server-side analysis; leave fields empty to fall back to client-side reasoning")]
    async fn configure_provider(
        &self,
        Parameters(args): Parameters<ConfigureProviderArgs>,
    ) -> Result<CallToolResult, McpError> {
        let reasoning_config = ReasoningConfig {
            provider: args.provider,
            api_key: args.api_key,
            model: args.model,
            base_url: args.base_url,
            ..Default::default()
        };
        let provider = create_provider(&reasoning_config);
        let had_provider = self.state.analyzer.lock().await.has_provider();
        let has_provider_now = provider.is_some();

        {
            let mut analyzer = self.state.analyzer.lock().await;
            analyzer.set_provider(provider);
        }
        {
            let mut config = self.state.config.lock().await;
            config.reasoning = reasoning_config;
        }

        if had_provider && !has_provider_now {
            if !self.state.provider_mode_warned.swap(true, Ordering::SeqCst) {
                self.state
                    .mcp_logger
                    .send(
                        "warning",
                        "vision provider cleared; falling back to client-side reasoning via check_camera_alerts",
                        "provider_mode_changed",
                        "",
                        "",
                        "",
                    )
                    .await;
            }
        } else if has_provider_now {
            self.state.provider_mode_warned.store(false, Ordering::SeqCst);
        }

        ok_json(json!({ "reasoning_mode": self.state.reasoning_mode().await }))
    }

    #[tool(description = "Read the full persistent memory file (event log, rule context, preferences)")]
    async fn read_memory(&self, Parameters(_): Parameters<Empty>) -> Result<CallToolResult, McpError> {
        let contents = self.state.memory.read_all().await;
        Ok(CallToolResult::success(vec![Content::text(contents)]))
    }

    #[tool(description = "Save a user preference into persistent memory")]
    async fn save_memory(
        &self,
        Parameters(args): Parameters<SavePreferenceArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.state
            .memory
            .set_preference(&args.key, &args.value)
            .await
            .map_err(tool_error)?;
        ok_json(json!({ "saved": true, "key": args.key }))
    }
}

#[tool_handler]
impl ServerHandler for PhysicalMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().enable_logging().build(),
            server_info: Implementation {
                name: "physical-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Watches cameras for scene changes and evaluates user-defined watch rules. \
                 Call get_scene_state or check_camera_alerts to see what's happening; \
                 use add_watch_rule or create_rule_from_template to start watching for something."
                    .to_string(),
            ),
        }
    }
}

async fn persist_rules(state: &Arc<DaemonState>, engine: &physical_mcp_core::rules::RulesEngine) -> bool {
    let rules: Vec<WatchRule> = engine.list_rules().into_iter().cloned().collect();
    match state.rules_store.save(&rules) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("failed to persist rules: {e}");
            false
        }
    }
}

pub async fn serve(state: Arc<DaemonState>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let transport = state.config.lock().await.server.transport.clone();
    let server = PhysicalMcpServer::new(state.clone());

    if transport == "stdio" {
        use rmcp::ServiceExt;
        let service = server.serve(rmcp::transport::io::stdio()).await?;
        service.waiting().await?;
        return Ok(());
    }

    let (host, port) = {
        let config = state.config.lock().await;
        (config.server.host.clone(), config.server.port)
    };

    let mcp_service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(server.clone()),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", mcp_service);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("MCP streamable-http server listening on {addr}/mcp");
    axum::serve(listener, router).await?;
    Ok(())
}

