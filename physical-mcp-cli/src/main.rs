//! Command-line front door: config-aware subcommands plus the default
//! daemon launch. A thin `clap` shell over `physical_mcp_core::config`,
//! plus the operational commands the daemon itself can't run against its
//! own still-starting process: `install`/`uninstall` (autostart
//! registration), `tunnel` (expose the HTTP API publicly),
//! `status`/`cameras`/`rules` (query a running daemon's REST endpoints),
//! `discover` (LAN camera scan), and `doctor` (local diagnostics).
//!
//! `physical-mcp-cli` never links `physical-mcp-server` as a library —
//! the two are separate binaries that talk over a process boundary. The
//! default subcommand spawns `physical-mcp-server` as a child process.

use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::time::Duration;

use clap::{Parser, Subcommand};
use physical_mcp_core::config::Config;
use sha2::{Digest, Sha256};

#[derive(Parser)]
#[command(name = "physical-mcp", version, about = "Physical MCP -- give your AI eyes")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    transport: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    headless: bool,

    #[command(subcommand)]
    command: Option<Command_>,
}

#[derive(Subcommand)]
enum Command_ {
    /// Interactive first-run setup: pick a camera, a vision provider, write the config
    Setup,
    /// Run in the background, starting automatically on login
    Install {
        #[arg(long, default_value_t = 8400)]
        port: u16,
    },
    /// Remove the background service
    Uninstall,
    /// Expose the HTTP API over HTTPS via cloudflared or ngrok
    Tunnel {
        #[arg(long, default_value_t = 8090)]
        port: u16,
        #[arg(long, default_value = "auto")]
        provider: String,
    },
    /// Check whether physical-mcp is running and show connection info
    Status,
    /// List configured cameras and their last-known status
    Cameras,
    /// Scan the local network for RTSP-capable IP cameras
    Discover {
        #[arg(long, default_value = "")]
        subnet: String,
        #[arg(long, default_value_t = 2.0)]
        timeout: f64,
    },
    /// Run local diagnostics
    Doctor,
    /// List configured watch rules
    Rules,
    /// Print a SHA-256 hash of a token (for notification/webhook secrets)
    HashToken { token: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let result = match cli.command {
        Some(Command_::Setup) => cmd_setup(config_path.as_deref()),
        Some(Command_::Install { port }) => cmd_install(port),
        Some(Command_::Uninstall) => cmd_uninstall(),
        Some(Command_::Tunnel { port, provider }) => cmd_tunnel(port, &provider),
        Some(Command_::Status) => cmd_status(config_path.as_deref()).await,
        Some(Command_::Cameras) => cmd_cameras(config_path.as_deref()),
        Some(Command_::Discover { subnet, timeout }) => cmd_discover(&subnet, timeout).await,
        Some(Command_::Doctor) => cmd_doctor(config_path.as_deref()),
        Some(Command_::Rules) => cmd_rules(config_path.as_deref()),
        Some(Command_::HashToken { token }) => Ok(cmd_hash_token(&token)),
        None => cmd_run(config_path.as_deref(), cli.transport, cli.port, cli.headless),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn load_config(config_path: Option<&Path>) -> Result<Config, String> {
    Config::from_file(config_path).map_err(|e| format!("config error: {e}"))
}

fn cmd_hash_token(token: &str) -> ExitCode {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    println!("sha256:{}", hex::encode(hasher.finalize()));
    ExitCode::SUCCESS
}

fn cmd_setup(config_path: Option<&Path>) -> Result<ExitCode, String> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    if path.exists() {
        println!("Config already exists at {}.", path.display());
        println!("Edit it directly, or delete it and re-run setup.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Welcome to Physical MCP! Let's set up your camera.\n");
    let config = Config::default();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }
    let yaml = serde_yaml::to_string(&config).map_err(|e| format!("failed to serialize config: {e}"))?;
    std::fs::write(&path, yaml).map_err(|e| format!("failed to write config: {e}"))?;

    println!("Wrote default config to {}.", path.display());
    println!("Edit cameras/reasoning/notifications, then run 'physical-mcp' to start.");
    Ok(ExitCode::SUCCESS)
}

fn server_command() -> Command {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("physical-mcp-server");
            if sibling.exists() {
                return Command::new(sibling);
            }
        }
    }
    Command::new("physical-mcp-server")
}

fn cmd_run(
    config_path: Option<&Path>,
    transport: Option<String>,
    port: Option<u16>,
    _headless: bool,
) -> Result<ExitCode, String> {
    let mut cmd = server_command();
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    if let Some(transport) = transport {
        cmd.arg("--transport").arg(transport);
    }
    if let Some(port) = port {
        cmd.arg("--port").arg(port.to_string());
    }

    let status = cmd
        .status()
        .map_err(|e| format!("failed to launch physical-mcp-server (is it on PATH?): {e}"))?;
    if status.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(status.code().unwrap_or(1) as u8))
    }
}

fn data_dir() -> PathBuf {
    physical_mcp_core::config::home_dir().join(".physical-mcp")
}

fn systemd_unit_path() -> PathBuf {
    physical_mcp_core::config::home_dir().join(".config/systemd/user/physical-mcp.service")
}

fn launchd_plist_path() -> PathBuf {
    physical_mcp_core::config::home_dir().join("Library/LaunchAgents/com.physical-mcp.server.plist")
}

fn cmd_install(port: u16) -> Result<ExitCode, String> {
    let Ok(exe) = which_physical_mcp() else {
        println!("Could not install background service.");
        println!("Make sure 'physical-mcp' is on your PATH.");
        return Ok(ExitCode::from(2));
    };

    let installed = if cfg!(target_os = "macos") {
        install_launchd(&exe, port)
    } else if cfg!(target_os = "windows") {
        install_schtasks(&exe, port)
    } else {
        install_systemd(&exe, port)
    };

    match installed {
        Ok(()) => {
            println!("Physical MCP installed as background service.");
            println!("It will start automatically when you log in.\n");
            if let Some(ip) = physical_mcp_core::mdns::lan_ip() {
                println!("Connect your AI app to: http://{ip}:{port}/mcp");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Could not install background service: {e}");
            Ok(ExitCode::from(2))
        }
    }
}

fn which_physical_mcp() -> Result<PathBuf, ()> {
    if let Ok(path) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join("physical-mcp");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    std::env::current_exe().map_err(|_| ())
}

fn install_systemd(command: &Path, port: u16) -> Result<(), String> {
    let unit_path = systemd_unit_path();
    std::fs::create_dir_all(unit_path.parent().unwrap()).map_err(|e| e.to_string())?;
    let unit = format!(
        "[Unit]\nDescription=Physical MCP Camera Server\nAfter=network.target\n\n\
         [Service]\nExecStart={} --transport streamable-http --port {port}\nRestart=on-failure\nRestartSec=5\n\n\
         [Install]\nWantedBy=default.target\n",
        command.display()
    );
    std::fs::write(&unit_path, unit).map_err(|e| e.to_string())?;
    run_ok(Command::new("systemctl").args(["--user", "daemon-reload"]))?;
    run_ok(Command::new("systemctl").args(["--user", "enable", "--now", "physical-mcp"]))
}

fn install_launchd(command: &Path, port: u16) -> Result<(), String> {
    let plist_path = launchd_plist_path();
    let log_dir = data_dir().join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|e| e.to_string())?;
    std::fs::create_dir_all(plist_path.parent().unwrap()).map_err(|e| e.to_string())?;

    let plist = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\"><dict>\n\
         <key>Label</key><string>com.physical-mcp.server</string>\n\
         <key>ProgramArguments</key><array><string>{}</string><string>--transport</string><string>streamable-http</string><string>--port</string><string>{port}</string></array>\n\
         <key>RunAtLoad</key><true/>\n<key>KeepAlive</key><true/>\n\
         <key>StandardOutPath</key><string>{}/physical-mcp.log</string>\n\
         <key>StandardErrorPath</key><string>{}/physical-mcp.err</string>\n\
         </dict></plist>\n",
        command.display(),
        log_dir.display(),
        log_dir.display(),
    );
    std::fs::write(&plist_path, plist).map_err(|e| e.to_string())?;
    let _ = Command::new("launchctl").arg("unload").arg(&plist_path).output();
    run_ok(Command::new("launchctl").arg("load").arg(&plist_path))
}

fn install_schtasks(command: &Path, port: u16) -> Result<(), String> {
    run_ok(Command::new("schtasks").args([
        "/create",
        "/tn",
        "PhysicalMCP",
        "/tr",
        &format!("\"{}\" --transport streamable-http --port {port}", command.display()),
        "/sc",
        "onlogon",
        "/rl",
        "limited",
        "/f",
    ]))
}

fn run_ok(cmd: &mut Command) -> Result<(), String> {
    let status = cmd.status().map_err(|e| e.to_string())?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("command exited with {status}"))
    }
}

fn cmd_uninstall() -> Result<ExitCode, String> {
    let removed = if cfg!(target_os = "macos") {
        let plist_path = launchd_plist_path();
        if plist_path.exists() {
            let _ = Command::new("launchctl").arg("unload").arg(&plist_path).output();
            std::fs::remove_file(&plist_path).is_ok()
        } else {
            false
        }
    } else if cfg!(target_os = "windows") {
        Command::new("schtasks")
            .args(["/delete", "/tn", "PhysicalMCP", "/f"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    } else {
        let _ = Command::new("systemctl")
            .args(["--user", "disable", "--now", "physical-mcp"])
            .output();
        let unit_path = systemd_unit_path();
        if unit_path.exists() {
            std::fs::remove_file(&unit_path).is_ok()
        } else {
            false
        }
    };

    if removed {
        println!("Background service removed.");
    } else {
        println!("No background service found to remove.");
    }
    Ok(ExitCode::SUCCESS)
}

fn is_autostart_installed() -> bool {
    if cfg!(target_os = "macos") {
        launchd_plist_path().exists()
    } else if cfg!(target_os = "windows") {
        Command::new("schtasks")
            .args(["/query", "/tn", "PhysicalMCP"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    } else {
        systemd_unit_path().exists()
    }
}

fn cmd_tunnel(port: u16, provider: &str) -> Result<ExitCode, String> {
    let try_cloudflare = || -> Result<bool, String> {
        if which("cloudflared").is_none() {
            if provider == "cloudflare" {
                println!("cloudflared not found.");
                println!(
                    "Install Cloudflare Tunnel: https://developers.cloudflare.com/cloudflare-one/connections/connect-networks/downloads/"
                );
            }
            return Ok(false);
        }
        println!("Starting Cloudflare tunnel to http://localhost:{port}...");
        let status = Command::new("cloudflared")
            .args(["tunnel", "--url", &format!("http://localhost:{port}")])
            .status()
            .map_err(|e| e.to_string())?;
        Ok(status.success())
    };

    let try_ngrok = || -> Result<bool, String> {
        if which("ngrok").is_none() {
            println!("Install ngrok CLI and run:");
            println!("  ngrok http {port}");
            return Ok(false);
        }
        println!("Starting ngrok HTTPS tunnel to localhost:{port}...");
        let status = Command::new("ngrok")
            .args(["http", &port.to_string()])
            .status()
            .map_err(|e| e.to_string())?;
        Ok(status.success())
    };

    match provider {
        "cloudflare" => {
            try_cloudflare()?;
        }
        "ngrok" => {
            try_ngrok()?;
        }
        _ => {
            if !try_cloudflare()? {
                try_ngrok()?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn which(bin: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(bin))
            .find(|p| p.exists())
    })
}

async fn cmd_status(config_path: Option<&Path>) -> Result<ExitCode, String> {
    println!("Physical MCP Status");
    println!("{}", "=".repeat(40));
    println!("Platform: {}", std::env::consts::OS);

    let path = config_path.map(PathBuf::from).unwrap_or_else(Config::default_path);
    if !path.exists() {
        println!("Config:   not set up yet (run 'physical-mcp setup')");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Config:   {}", path.display());

    if is_autostart_installed() {
        println!("Service:  installed (starts on login)");
    } else {
        println!("Service:  not installed");
        println!("          Run 'physical-mcp install' to start on login");
    }

    let config = load_config(config_path)?;
    if config.server.transport == "streamable-http" {
        let port = config.server.port;
        println!("\nLocal:    http://127.0.0.1:{port}/mcp");
        if let Some(ip) = physical_mcp_core::mdns::lan_ip() {
            println!("Phone:    http://{ip}:{port}/mcp");
        }

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{}/", config.vision_api.port);
        match client.get(&url).timeout(Duration::from_secs(2)).send().await {
            Ok(resp) if resp.status().is_success() => println!("Vision API: running ({url})"),
            _ => println!("Vision API: not reachable at {url}"),
        }
    } else {
        println!("\nMode:     stdio (Claude Desktop)");
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_cameras(config_path: Option<&Path>) -> Result<ExitCode, String> {
    let config = load_config(config_path)?;
    if config.cameras.is_empty() {
        println!("No cameras configured.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Configured camera(s):");
    for cam in &config.cameras {
        let enabled = if cam.enabled { "" } else { " (disabled)"};
        println!("  {} [{}] {}x{} type={}{enabled}", cam.id, cam.name, cam.width, cam.height, cam.kind);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_discover(subnet: &str, timeout_secs: f64) -> Result<ExitCode, String> {
    const RTSP_PORT: u16 = 554;
    println!("Scanning for cameras...");

    let base = if subnet.is_empty() {
        guess_local_subnet()
    } else {
        subnet.split('/').next().map(|s| s.to_string())
    };

    let Some(base) = base else {
        println!("Could not determine a subnet to scan; pass --subnet a.b.c.0/24");
        return Ok(ExitCode::from(2));
    };

    let prefix: Vec<&str> = base.split('.').take(3).collect();
    if prefix.len() != 3 {
        println!("Invalid subnet: {base}");
        return Ok(ExitCode::from(2));
    }

    let timeout = Duration::from_secs_f64(timeout_secs);
    let mut found = Vec::new();
    for host in 1..255u8 {
        let ip: IpAddr = format!("{}.{}.{}.{host}", prefix[0], prefix[1], prefix[2])
            .parse()
            .map_err(|e| format!("{e}"))?;
        let addr = SocketAddr::new(ip, RTSP_PORT);
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            found.push(ip);
        }
    }

    if found.is_empty() {
        println!("\nNo cameras found.");
        println!("Tips:");
        println!("  - Make sure cameras are on the same network");
        println!("  - Try increasing timeout: --timeout 5");
        println!("  - Check if cameras use non-standard RTSP ports");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nFound {} camera(s) with an open RTSP port:\n", found.len());
    for ip in found {
        println!("  rtsp://{ip}:{RTSP_PORT}/");
    }
    Ok(ExitCode::SUCCESS)
}

fn guess_local_subnet() -> Option<String> {
    physical_mcp_core::mdns::lan_ip().map(|ip| ip.to_string())
}

fn cmd_doctor(config_path: Option<&Path>) -> Result<ExitCode, String> {
    let mut ok_count = 0;
    let mut total = 0;

    let mut check = |label: &str, ok: bool, detail: &str| {
        total += 1;
        if ok {
            ok_count += 1;
        }
        let mark = if ok { "OK" } else { "FAIL" };
        println!("[{mark}] {label}: {detail}");
    };

    let path = config_path.map(PathBuf::from).unwrap_or_else(Config::default_path);
    let config = Config::from_file(config_path);
    check(
        "Config",
        config.is_ok(),
        &path.display().to_string(),
    );

    if let Ok(config) = &config {
        let has_cameras = !config.cameras.is_empty();
        check("Cameras configured", has_cameras, &format!("{} camera(s)", config.cameras.len()));

        let has_provider = !config.reasoning.provider.is_empty() && !config.reasoning.api_key.is_empty();
        check(
            "Vision provider",
            true,
            if has_provider {
                &config.reasoning.provider
            } else {
                "none (client-side reasoning mode)"
            },
        );
    }

    let log_dir = data_dir().join("logs");
    let writable = std::fs::create_dir_all(&log_dir).is_ok();
    check("Log directory writable", writable, &log_dir.display().to_string());

    println!("\n{ok_count}/{total} checks passed.");
    if ok_count == total {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

fn cmd_rules(config_path: Option<&Path>) -> Result<ExitCode, String> {
    let config = load_config(config_path)?;
    let store = physical_mcp_core::rules::RulesStore::new(config.resolved_rules_path());
    let rules = store.load();
    if rules.is_empty() {
        println!("No watch rules configured.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Configured watch rule(s):");
    for rule in rules {
        let state = if rule.enabled { "enabled" } else { "disabled" };
        println!(
            "  [{}] {} -- \"{}\" (camera={}, priority={}, {state})",
            rule.id,
            rule.name,
            rule.condition,
            if rule.camera_id.is_empty() { "all" } else { &rule.camera_id },
            rule.priority.as_str(),
        );
    }
    Ok(ExitCode::SUCCESS)
}
