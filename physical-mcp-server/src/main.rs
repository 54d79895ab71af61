//! Daemon entrypoint: load config, open cameras, spawn one perception
//! loop per camera, serve the HTTP API and the MCP tool server side by
//! side, publish mDNS, and shut everything down in the order the
//! concurrency design calls for — perception loops, capture threads,
//! HTTP server, mDNS, camera closers — so one slow close never blocks
//! the rest.

mod api;
mod camera_registry;
mod mcp;
mod perception_loop;
mod state;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use clap::Parser;
use log::{error, info, warn};
use physical_mcp_core::alert_queue::AlertQueue;
use physical_mcp_core::config::Config;
use physical_mcp_core::events::EventBus;
use physical_mcp_core::mcp_logging::McpLogger;
use physical_mcp_core::memory::MemoryStore;
use physical_mcp_core::notifications::NotificationDispatcher;
use physical_mcp_core::reasoning::{create_provider, FrameAnalyzer};
use physical_mcp_core::replay::ReplayLog;
use physical_mcp_core::rules::{RulesEngine, RulesStore};
use physical_mcp_core::stats::StatsTracker;
use tokio::sync::Mutex;

use state::DaemonState;

#[derive(Parser, Debug)]
#[command(name = "physical-mcp-server")]
struct Args {
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    #[arg(long)]
    transport: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = match Config::from_file(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    if let Some(transport) = args.transport {
        config.server.transport = transport;
    }
    if let Some(port) = args.port {
        config.vision_api.port = port;
    }

    let state = Arc::new(build_state(config, config_path));

    let mut loop_handles = HashMap::new();
    for (camera_id, runtime) in state.cameras.lock().await.iter() {
        match camera_registry::open_camera(runtime).await {
            Ok(_puller) => {
                let handle = tokio::spawn(perception_loop::run(
                    state.clone(),
                    camera_id.clone(),
                    runtime.clone(),
                ));
                loop_handles.insert(camera_id.clone(), handle);
            }
            Err(e) => {
                warn!("camera {camera_id} failed to open: {e}");
            }
        }
    }
    *state.loop_handles.lock().await = loop_handles;

    let vision_api = {
        let config = state.config.lock().await;
        config.vision_api.clone()
    };
    let mdns_publisher = if vision_api.enabled {
        physical_mcp_core::mdns::publish_vision_api_mdns(vision_api.port, None)
    } else {
        None
    };

    let http_state = state.clone();
    let http_server = tokio::spawn(async move {
        if !vision_api.enabled {
            return;
        }
        let addr = format!("{}:{}", vision_api.host, vision_api.port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind vision API on {addr}: {e}");
                return;
            }
        };
        info!("vision API listening on {addr}");
        let router = api::router(http_state);
        if let Err(e) = axum::serve(listener, router).await {
            error!("vision API server error: {e}");
        }
    });

    let mcp_state = state.clone();
    let mcp_server = tokio::spawn(async move {
        if let Err(e) = mcp::serve(mcp_state).await {
            error!("MCP server error: {e}");
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown requested, stopping perception loops");

    for (_, handle) in state.loop_handles.lock().await.drain() {
        handle.abort();
    }
    http_server.abort();
    mcp_server.abort();
    drop(mdns_publisher);

    for (camera_id, runtime) in state.cameras.lock().await.iter() {
        let mut handle = runtime.handle.lock().await;
        if let Err(e) = handle.close().await {
            warn!("camera {camera_id} failed to close cleanly: {e}");
        }
    }

    info!("shutdown complete");
}

fn build_state(config: Config, config_path: std::path::PathBuf) -> DaemonState {
    let rules_store = RulesStore::new(config.resolved_rules_path());
    let mut rules_engine = RulesEngine::new();
    rules_engine.load_rules(rules_store.load());

    let memory = MemoryStore::new(config.resolved_memory_path());

    let provider = create_provider(&config.reasoning);
    let analyzer = FrameAnalyzer::new(provider);

    let stats = StatsTracker::new(config.cost_control.daily_budget_usd, config.cost_control.max_analyses_per_hour);

    let mut cameras = HashMap::new();
    for camera_config in config.cameras.iter().filter(|c| c.enabled) {
        if let Some(runtime) = camera_registry::build_camera_runtime(
            camera_config,
            config.perception.buffer_size,
            &config.perception.change_detection,
            &config.perception.sampling,
        ) {
            cameras.insert(camera_config.id.clone(), Arc::new(runtime));
        }
    }

    let events = Arc::new(EventBus::new());
    let mcp_logger = Arc::new(McpLogger::new(Some(events.clone())));
    let notifier = NotificationDispatcher::new(config.notifications.clone());

    DaemonState {
        config: Mutex::new(config),
        config_path,
        cameras: Mutex::new(cameras),
        rules: Mutex::new(rules_engine),
        rules_store,
        analyzer: Mutex::new(analyzer),
        provider_mode_warned: AtomicBool::new(false),
        stats,
        alert_queue: AlertQueue::default(),
        events,
        replay: ReplayLog::default(),
        mcp_logger,
        memory,
        notifier,
        loop_handles: Mutex::new(HashMap::new()),
        cloud_claims: Mutex::new(HashMap::new()),
        auth_token: ArcSwapOption::from(None),
        cached_alert_frame: Mutex::new(None),
    }
}
