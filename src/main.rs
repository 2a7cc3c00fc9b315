//! Gatekeeper - authentication front door
//! Mission: Register, log in and guard routes with bearer tokens behind a
//! per-client rate limit

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use gatekeeper::{
    auth::{
        AuthService, AuthState, CredentialStore, InMemoryCredentialStore, PasswordHasher,
        SqliteCredentialStore, TokenService,
    },
    config::{AppConfig, LogFormat},
    middleware::{CorsInterceptor, RateLimiter},
    routes::{build_router, RouteContext},
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about = "Authentication gateway")]
struct Args {
    /// TOML config file
    #[arg(long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host, overrides config and SERVER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides config and SERVER_PORT
    #[arg(long)]
    port: Option<u16>,

    /// SQLite path; pass an empty string for an in-memory store
    #[arg(long)]
    database: Option<String>,

    /// pretty | json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load config")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(config.logging.format);

    info!("Gatekeeper starting");

    let store = open_store(&config.database.path)?;
    let hasher = Arc::new(
        PasswordHasher::new(config.auth.bcrypt_cost).context("Failed to prepare password hasher")?,
    );
    let tokens = Arc::new(TokenService::new(
        &config.auth.secret,
        config.token_lifetime(),
    )?);
    info!(
        bcrypt_cost = hasher.cost(),
        token_lifetime_secs = config.auth.token_lifetime_secs,
        "Authentication initialized"
    );

    let limiter = RateLimiter::new(config.rate_limit.limiter_config());
    let janitor = limiter.spawn_janitor(config.sweep_interval());
    info!(
        rate_per_second = config.rate_limit.rate_per_second,
        burst = config.rate_limit.burst,
        "Rate limiter initialized"
    );

    let ctx = RouteContext {
        state: AuthState::new(AuthService::new(store, hasher), tokens),
        limiter,
        cors: CorsInterceptor::new(config.cors.allowed_origins.clone()),
    };
    let app = build_router(ctx, config.request_timeout());

    // Start server
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    janitor.abort();
    info!("Gatekeeper stopped");
    Ok(())
}

fn open_store(path: &str) -> Result<Arc<dyn CredentialStore>> {
    if path.trim().is_empty() {
        warn!("No database path configured, credentials are kept in memory only");
        return Ok(Arc::new(InMemoryCredentialStore::new()));
    }

    let store = SqliteCredentialStore::new(path)
        .with_context(|| format!("Failed to open credential store at {path}"))?;
    info!("Credential store opened at: {}", path);
    Ok(Arc::new(store))
}

/// Initialize tracing with the configured output format
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gatekeeper=debug,tower_http=info".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when run from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
