//! sales_saga - Sales transaction service of the order saga
//!
//! Records sales transactions with optional voucher discounts and relays their
//! outcomes to the saga through a transactional outbox.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sales_saga::bus::{EventBus, InMemoryBus, NatsBus};
use sales_saga::config::BusType;
use sales_saga::handlers::TransactionProcessor;
use sales_saga::outbox::{OutboxRelay, PgOutboxStore, RelayConfig, RetryPolicy};
use sales_saga::saga::SagaConsumer;
use sales_saga::{api, db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sales_saga=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn connect_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    match config.bus_type {
        BusType::Nats => {
            tracing::info!(url = %config.nats_url, "Connecting to NATS");
            Ok(Arc::new(NatsBus::connect(&config.nats_url).await?))
        }
        BusType::InMemory => {
            tracing::warn!("Using in-memory bus; saga peers in other processes will not see events");
            Ok(Arc::new(InMemoryBus::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting sales_saga");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    let bus = connect_bus(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retry_policy = match config.outbox_max_attempts {
        Some(max) => RetryPolicy::with_max_attempts(max),
        None => RetryPolicy::unbounded(),
    };
    let relay = OutboxRelay::with_config(
        Arc::new(PgOutboxStore::new(pool.clone())),
        bus.clone(),
        RelayConfig {
            subject: config.saga_responses_subject.clone(),
            poll_interval: config.outbox_poll_interval,
            retry_policy,
        },
    );
    let relay_handle = relay.start(shutdown_rx.clone());

    let consumer_handle = SagaConsumer::start(
        bus,
        Arc::new(TransactionProcessor::new(pool.clone())),
        &config.saga_commands_subject,
        shutdown_rx,
    )
    .await?;

    // Flips to true when the consumer task ends, for whatever reason
    let (consumer_exit_tx, consumer_exit_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(async move {
        let joined = consumer_handle.await;
        let _ = consumer_exit_tx.send(true);
        joined
    });

    let app = api::build_router(pool.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_trigger(consumer_exit_rx.clone()))
        .await?;

    // Nothing has asked the consumer to stop yet, so an exit here is its own
    let consumer_died = *consumer_exit_rx.borrow();

    tracing::info!("Server stopped; draining background tasks...");
    // Receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(true);

    match consumer_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => tracing::error!(error = %e, "Saga consumer task panicked"),
    }
    if let Err(e) = relay_handle.await {
        tracing::error!(error = %e, "Outbox relay task panicked");
    }

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    if consumer_died {
        return Err(anyhow::anyhow!("Saga consumer stopped unexpectedly"));
    }

    Ok(())
}

/// Resolves on a shutdown signal or when the saga consumer stops on its own
async fn shutdown_trigger(mut consumer_exit: watch::Receiver<bool>) {
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = consumer_exit.wait_for(|exited| *exited) => {
            tracing::error!("Saga consumer stopped; shutting down");
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
