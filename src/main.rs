//! Relay bot entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build catalog, session store and inference client
//!   6. Spawn Ctrl-C / SIGTERM → shutdown signal watcher
//!   7. Run comms subsystem until shutdown or a fatal channel error

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_bot::error::AppError;
use relay_bot::llm::providers;
use relay_bot::subsystems::comms;
use relay_bot::subsystems::memory::SessionStore;
use relay_bot::subsystems::relay::RelayHandler;
use relay_bot::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        models = config.catalog.list().len(),
        default_model = %config.catalog.default_key(),
        "config loaded"
    );

    let token = config
        .secrets
        .telegram_bot_token
        .clone()
        .ok_or_else(|| AppError::Config("TELEGRAM_BOT_TOKEN is not set".into()))?;

    let inference = providers::build_client(&config.providers, &config.secrets, &config.catalog)
        .map_err(|e| AppError::Provider(e.to_string()))?;
    let catalog = Arc::new(config.catalog);
    let sessions = SessionStore::new(catalog.clone(), config.history_cap);
    let relay = Arc::new(RelayHandler::new(config.bot_name, catalog, sessions, inference));

    // Shared shutdown token; signals cancel it, every channel watches it.
    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    let comms = comms::start(relay, token, shutdown.clone());
    let result = comms.join().await;

    shutdown.cancel();
    info!("shutdown complete");
    result
}

fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("ctrl-c received — initiating shutdown"),
                        _ = term.recv() => info!("SIGTERM received — initiating shutdown"),
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot install SIGTERM handler: {e}");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("ctrl-c received — initiating shutdown");
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received — initiating shutdown");
            }
        }
        shutdown.cancel();
    });
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: relay-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment:");
                println!("  TELEGRAM_BOT_TOKEN         Bot API token (required)");
                println!("  OPENROUTER_API_KEY         Key for OpenRouter models");
                println!("  HUGGINGFACE_API_KEY        Key for Hugging Face models (optional)");
                println!("  RELAY_LOG_LEVEL            Overrides [bot].log_level");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (routing, session and provider flow)
    //   -vvvv+  → trace  (request and response payloads)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
