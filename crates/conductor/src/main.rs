//! Hostlink CLI
//!
//! Loads configuration, wires the host backend and the optional language
//! model, and serves WebSocket clients until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use hostlink_conductor::{Bridge, BridgeConfig, HostBackend};
use hostlink_intent::{LanguageModel, OpenAiChat, OsContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "hostlink")]
#[command(about = "Hostlink - natural-language remote control for this machine", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Allow arbitrary shell commands (dangerous)
    #[arg(long)]
    allow_shell: bool,

    /// Shell command timeout (seconds)
    #[arg(long, value_name = "SECS")]
    shell_timeout: Option<u64>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    // Override with CLI options
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.allow_shell {
        config.allow_shell_execution = true;
    }
    if let Some(secs) = cli.shell_timeout {
        config.shell_timeout_secs = secs;
    }
    config.validate()?;

    let os = OsContext::detect();
    log_banner(&config, &os);

    let model: Option<Arc<dyn LanguageModel>> = match &config.openai_api_key {
        Some(key) => {
            let chat = OpenAiChat::new(&config.llm_base_url, key, &config.llm_model, config.llm_timeout())?;
            log::info!("AI fallback: {} via {}", config.llm_model, config.llm_base_url);
            Some(Arc::new(chat))
        }
        None => {
            log::warn!("OPENAI_API_KEY not set. AI fallback is disabled; only rule matching is available.");
            None
        }
    };

    let bridge = Arc::new(Bridge::from_config(&config, Arc::new(HostBackend::new()), model, os));
    log::info!("{}", bridge.engine().info().replace('\n', " | "));

    let listener = TcpListener::bind(config.listen_addr()).await?;

    tokio::select! {
        result = hostlink_conductor::serve(listener, bridge) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutdown signal received"),
    }

    log::info!("Server stopped.");
    Ok(())
}

fn log_banner(config: &BridgeConfig, os: &OsContext) {
    log::info!("═══════════════════════════════════════");
    log::info!("  Hostlink Bridge");
    log::info!("═══════════════════════════════════════");
    log::info!("Detected OS: {} ({})", os.description, os.family);
    log::info!("Listening on: {}", config.listen_addr());
    log::info!("History depth: {}", config.history_depth);

    if config.allow_shell_execution {
        log::warn!("!!! SECURITY WARNING: Arbitrary shell command execution is ENABLED !!!");
        log::warn!("!!! Any client able to connect can run commands as this user.     !!!");
        log::warn!("!!! Shell commands time out after {} seconds.", config.shell_timeout_secs);
    } else {
        log::info!("Shell command execution: disabled");
    }
}
