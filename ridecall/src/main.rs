mod server;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use ridecall_core::engine::{FakeMediaEngine, MediaEngine, WorkerPool};
use ridecall_core::hub::MessageHub;
use ridecall_core::link::LinkService;
use ridecall_core::registry::MediaRegistry;
use ridecall_core::ride::RideService;
use ridecall_core::{logging, Config};
use ridecall_signaling::{AppState, Gateway};

#[derive(Debug, Parser)]
#[command(name = "ridecall", about = "Signaling server for multi-party ride calls")]
struct Args {
    /// Path to config file (yaml)
    #[arg(long, env = "RIDECALL_CONFIG")]
    config: Option<String>,
}

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. --config flag / RIDECALL_CONFIG environment variable
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (Kubernetes mount path)
/// 4. Fall back to environment variables only
fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = explicit
        .filter(|p| Path::new(p).exists())
        .map(str::to_string)
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .iter()
                .find(|p| Path::new(p).exists())
                .map(|p| (*p).to_string())
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("ridecall server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize the media engine. The in-process engine serves until
    //    a real SFU engine is wired in behind the same trait.
    let engine: Arc<dyn MediaEngine> = Arc::new(FakeMediaEngine::new());
    warn!("no external media engine configured, using in-process engine");

    // 4. Start the worker pool
    let pool = Arc::new(WorkerPool::start(engine.as_ref(), config.engine.worker_pool_size).await?);
    info!(pool_size = pool.size(), "engine worker pool ready");

    // 5. Wire up core services
    let registry = Arc::new(MediaRegistry::new());
    let hub = Arc::new(MessageHub::new());
    let links = Arc::new(LinkService::new());
    let rides = Arc::new(RideService::new(
        Arc::clone(&engine),
        pool,
        Arc::clone(&registry),
        Arc::clone(&hub),
        links,
        &config.engine,
    ));
    let gateway = Arc::new(Gateway::new(rides, Arc::clone(&hub)));

    // 6. Serve
    let state = AppState {
        gateway,
        hub,
        registry,
    };
    server::run(&config, state).await
}
