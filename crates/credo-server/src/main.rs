//! Credo Server: application entry point.
//!
//! Wires the store client, token issuer, password hasher and notification
//! pool into a [`RegistrationService`], then runs until Ctrl+C or SIGTERM.

mod config;
mod telemetry;

use std::sync::Arc;

use clap::Parser;
use credo_auth::notify::LoggingVerificationSender;
use credo_auth::{Argon2Hasher, NotificationPool, RegistrationService, TokenIssuer};
use credo_db::repository::SurrealUserRepository;
use credo_db::{StoreClient, run_migrations};
use tokio::signal;

use config::{CliArgs, ServerConfig};
use telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(&config.log_level, config.log_format)?;

    tracing::info!(
        endpoint = %config.store.endpoint,
        namespace = %config.store.namespace,
        database = %config.store.database,
        "Starting Credo server"
    );

    let store = StoreClient::open(&config.store).await?;
    run_migrations(&store).await?;

    let issuer = Arc::new(TokenIssuer::new(&config.auth)?);
    let hasher = match &config.auth.pepper {
        Some(pepper) => Argon2Hasher::with_pepper(pepper.clone()),
        None => Argon2Hasher::new(),
    };
    let notifications = Arc::new(NotificationPool::start(
        LoggingVerificationSender,
        config.notify.clone(),
    ));

    let service = RegistrationService::new(
        SurrealUserRepository::new(store.clone()),
        hasher,
        issuer,
        Arc::clone(&notifications),
        config.auth.clone(),
    );

    tracing::info!(
        addr = %config.listen_addr,
        tls = config.tls.is_some(),
        workers = config.notify.workers,
        "Registration service constructed; no network listener attached"
    );

    shutdown_signal().await;

    drop(service);

    notifications.shutdown().await;
    store.close().await;

    tracing::info!("Credo server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, draining in-flight work");
}
