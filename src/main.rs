//! User Service
//!
//! ```sh
//! # Run with default config (~/.config/user-service/config.toml)
//! user-service
//!
//! # Custom config path and port
//! user-service --config /etc/user-service/config.toml --port 8081
//!
//! # Validate config without starting
//! user-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use user_service::config::{default_config_path, AppConfig, ConfigError, CONFIG_PATH_ENV};
use user_service::server::{init_tracing, ServerHandle, ServerOptions};

/// User account service backing the authentication service.
#[derive(Parser, Debug)]
#[command(
    name = "user-service",
    version,
    about = "User management REST API",
    long_about = "User management REST API with bearer-token authorization and \
                  shared-secret internal endpoints.\n\n\
                  Default config: ~/.config/user-service/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let (mut config, missing_file) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, false),
        Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            // Secrets may still arrive through the environment
            let mut cfg = AppConfig::default();
            cfg.apply_env_overrides(|key| std::env::var(key).ok());
            (cfg, true)
        }
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", config_path.display(), e);
            return Err(e.into());
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config);
    if missing_file {
        warn!("No config file at {}, using defaults and environment", config_path.display());
    } else {
        info!("Configuration loaded from {}", config_path.display());
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        if let Err(e) = config.validate() {
            error!("Configuration is invalid: {}", e);
            return Err(e.into());
        }
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API address : {}", config.server.address());
        println!("   JWKS URI    : {}", config.auth.jwks_uri);
        println!("   Issuer      : {}", config.auth.issuer);
        println!("   Audience    : {}", config.auth.audience);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = match ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start user service: {}", e);
            return Err(e.into());
        }
    };

    handle.install_signal_handler();
    info!("Server started. Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    Ok(())
}
