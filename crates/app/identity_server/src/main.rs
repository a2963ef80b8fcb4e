//! Identity service server binary.
//!
//! Reads configuration from the environment (and `.env`), connects to
//! PostgreSQL, runs migrations and serves the auth API until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use identity_api::config::ApiConfig;
use identity_core::auth::lifecycle::CredentialService;
use identity_core::auth::queries::PgAuthStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

/// CLI arguments for the identity server.
#[derive(Parser, Debug)]
#[command(name = "identity_server", about = "Identity service API server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL. Overrides `DB_CONNECTION_STRING`.
    #[arg(long, env = "DB_CONNECTION_STRING")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,identity_api=debug,identity_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "identity_server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Command-line values win over the environment.
    let config = ApiConfig::from_lookup(|key| match key {
        "BIND_ADDR" => args.bind.clone(),
        "DB_CONNECTION_STRING" => args
            .database_url
            .clone()
            .or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })?;

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        issuer = %config.auth.issuer,
        "starting identity_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(config.auth.store_timeout.max(Duration::from_secs(1)))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    identity_core::migrate::migrate(&pool).await?;

    let service = CredentialService::new(Arc::new(PgAuthStore::new(pool)), &config.auth);
    let state = identity_api::AppState {
        service: Arc::new(service),
    };
    let app = identity_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("identity_server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
