use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use forge_webhooks::config::{Config, StorageBackend};
use forge_webhooks::store::{self, AppState, Backends};
use forge_webhooks::webhook::{queue, service};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("FORGE_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = Config::load();

    let backends = match cfg.storage {
        StorageBackend::Postgres => {
            let pool = store::pool::connect(&cfg.database_url, 10).await?;
            Backends::postgres(&pool, &cfg)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, hook tasks are lost on restart");
            Backends::memory()
        }
    };

    let state = AppState::new(cfg.clone(), backends)?;
    if cfg.disable_webhooks {
        tracing::warn!("webhook delivery is disabled");
    }

    state.service.requeue_pending().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    let workers = tokio::spawn(queue::run(
        state.queue.clone(),
        Arc::clone(&state.service),
        queue::PoolOptions {
            workers: cfg.queue_workers,
            batch: cfg.queue_batch,
        },
        shutdown_rx.clone(),
    ));
    let cleanup = tokio::spawn(service::run_cleanup(
        Arc::clone(&state.service),
        CLEANUP_INTERVAL,
        shutdown_rx,
    ));

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(forge_webhooks::api::router())
        .with_state(state);

    let addr: SocketAddr = cfg.listen.parse()?;
    tracing::info!(%addr, "starting forge-webhooks");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight deliveries finish within their own timeout.
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(workers, cleanup);

    tracing::info!("forge-webhooks stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
