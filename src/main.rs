//! Entry point of the LFG registry bot
//!
//! Loads configuration, connects to the broker, then serves direct messages
//! until `exit` is typed on stdin or the process is signalled.

use anyhow::Result;
use clap::Parser;
use lfg_registry::config::{validate_config, AppConfig};
use lfg_registry::service::{AppState, StartupOptions};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Sender id used for lines typed on the console in dry-run mode
const CONSOLE_USER: &str = "console";

/// LFG Registry - looking-for-group bot matching players by role and SR
#[derive(Parser)]
#[command(
    name = "lfg-registry",
    version,
    about = "Looking-for-group registry bot",
    long_about = "Keeps player profiles and saved searches, answers direct-message commands \
                  received over AMQP and notifies searchers when new players match."
)]
struct Args {
    /// Broker password of the bot account
    #[arg(value_name = "TOKEN")]
    token: String,

    /// Wipe and recreate the registry store at startup
    #[arg(long)]
    reset: bool,

    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    #[arg(long, value_name = "PORT", help = "Override metrics server port")]
    metrics_port: Option<u16>,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Run without a broker; console lines become direct messages
    #[arg(long)]
    dry_run: bool,

    #[arg(long, help = "Validate configuration and exit")]
    check_config: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.url = amqp_url.clone();
    }
    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    validate_config(&config)?;
    Ok(config)
}

fn display_startup_banner(config: &AppConfig, args: &Args) {
    info!("🚀 LFG Registry {}", lfg_registry::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Metrics port: {}", config.service.metrics_port);
    if args.dry_run {
        info!("   AMQP: disabled (dry run)");
    } else {
        info!("   AMQP: {} as '{}'", config.amqp.url, config.amqp.username);
    }
    if config.registry.persist {
        info!(
            "   Registry: {}{}",
            config.registry.database_path.display(),
            if args.reset { " (reset)" } else { "" }
        );
    } else {
        info!("   Registry: in memory");
    }
    info!("   Sweep interval: {}s", config.registry.sweep_interval_seconds);
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C) signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Read stdin until `exit`; any other line is either handled as a console
/// direct message (dry run) or ignored
async fn console_loop(app_state: &AppState, dry_run: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line == "exit" {
                    info!("Exit requested from console");
                    return;
                }
                if dry_run && !line.is_empty() {
                    let reply = app_state.bot().handle_direct_message(CONSOLE_USER, line).await;
                    if !reply.is_empty() {
                        println!("{}", reply);
                    }
                } else if !line.is_empty() {
                    info!("Type 'exit' to stop the bot");
                }
            }
            Ok(None) => {
                // No console attached; only a signal can stop us now
                std::future::pending::<()>().await;
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config, &args);

    if args.check_config {
        info!("Configuration validation successful");
        return Ok(());
    }

    let options = StartupOptions {
        credential: args.token.clone(),
        reset: args.reset,
        dry_run: args.dry_run,
    };

    let mut app_state = match AppState::new(config.clone(), options).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ LFG Registry is running, type 'exit' to stop");

    tokio::select! {
        _ = console_loop(&app_state, args.dry_run) => {},
        _ = wait_for_shutdown_signal() => {},
    }

    info!("🛑 Shutting down...");
    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    Ok(())
}
