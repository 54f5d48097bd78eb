//! Server runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: database connection and
//! migrations, key set cache, REST API and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::UserService;
use crate::config::{AppConfig, ConfigError, LogFormat};
use crate::domain::UserStore;
use crate::infrastructure::crypto::{
    key_source_from_uri, JwksCache, JwksError, JwtConfig, PasswordHasher, TokenValidator,
};
use crate::infrastructure::{init_database, run_migrations, DatabaseConfig, SeaOrmUserStore};
use crate::interfaces::http::{create_api_router, AuthState, RouterConfig};
use crate::shared::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Key set source error: {0}")]
    KeySource(#[from] JwksError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Options for starting the service.
pub struct ServerOptions {
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

/// Handle to a running service.
pub struct ServerHandle {
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the REST API is bound to.
    pub local_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownSignal,
    api_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Validate the configuration, connect to the database, migrate, then
    /// start serving the REST API.
    pub async fn start(opts: ServerOptions) -> Result<Self, ServerError> {
        let config = opts.config;
        config.validate()?;

        info!("Starting user service...");

        let db = init_database(&DatabaseConfig::from(&config.database)).await?;
        if opts.auto_migrate {
            run_migrations(&db).await?;
        } else {
            info!("Skipping database migrations");
        }

        let router = build_router(&config, db.clone())?;

        let addr = config.server.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!("REST API server listening on http://{}", local_addr);
        if config.server.docs_enabled {
            info!("Swagger UI available at http://{}/docs/", local_addr);
        }

        let shutdown = ShutdownSignal::new();
        let api_shutdown = shutdown.clone();
        let api_task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                api_shutdown.wait().await;
                info!("REST API server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!(error = %e, "REST API server error");
            }
        });

        Ok(Self {
            config,
            local_addr,
            db,
            shutdown,
            api_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait until the server stops. In-flight requests get
    /// `server.shutdown_timeout_secs` to finish once shutdown is triggered.
    pub async fn wait(self) {
        let mut api_task = self.api_task;

        let exited = tokio::select! {
            result = &mut api_task => Some(result),
            _ = self.shutdown.wait() => None,
        };

        match exited {
            Some(result) => log_api_exit(result),
            None => match tokio::time::timeout(self.config.shutdown_timeout(), &mut api_task).await {
                Ok(result) => log_api_exit(result),
                Err(_) => {
                    warn!(
                        timeout_secs = self.config.server.shutdown_timeout_secs,
                        "In-flight requests did not finish in time, aborting"
                    );
                    api_task.abort();
                }
            },
        }

        if let Err(e) = self.db.close().await {
            warn!(error = %e, "Error closing database connection");
        } else {
            info!("Database connection closed");
        }

        info!("User service shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("Shutting down user service...");
        self.trigger_shutdown();
        self.wait().await;
    }
}

fn log_api_exit(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => info!("REST API server stopped"),
        Err(e) => error!(error = %e, "REST API server task panicked"),
    }
}

/// Wire store, services, token validation and routes on top of an open
/// database connection.
pub fn build_router(config: &AppConfig, db: DatabaseConnection) -> Result<Router, ServerError> {
    let store: Arc<dyn UserStore> = Arc::new(SeaOrmUserStore::new(
        db.clone(),
        Duration::from_secs(config.database.query_timeout_secs),
    ));
    let user_service = Arc::new(UserService::new(
        store,
        PasswordHasher::new(config.security.bcrypt_cost),
    ));

    let auth = &config.auth;
    let source = key_source_from_uri(
        &auth.jwks_uri,
        Duration::from_secs(auth.jwks_fetch_timeout_secs),
    )?;
    let keys = Arc::new(JwksCache::new(
        source,
        Duration::from_secs(auth.jwks_cache_ttl_secs),
        Duration::from_secs(auth.jwks_min_refresh_secs),
    ));
    let validator = TokenValidator::new(
        keys,
        JwtConfig::new(&auth.issuer, &auth.audience)
            .with_clock_skew(Duration::from_secs(auth.clock_skew_secs)),
    );
    info!(
        issuer = %auth.issuer,
        audience = %auth.audience,
        jwks_uri = %auth.jwks_uri,
        "Token validation configured"
    );

    Ok(create_api_router(
        user_service,
        db,
        AuthState::new(validator, config.internal.shared_secret.as_str()),
        RouterConfig {
            request_timeout: config.request_timeout(),
            docs_enabled: config.server.docs_enabled,
        },
    ))
}

/// Initialize tracing subscriber based on config. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
