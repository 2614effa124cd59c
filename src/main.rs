//! Catalog Cache admin server
//!
//! Runs the cache layer over the in-memory store and exposes its metrics and
//! invalidation operations over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_cache::api::{create_router, AppState};
use catalog_cache::{
    spawn_cleanup_task, CacheManager, Config, Invalidator, KeyGenerator, MemoryStore,
};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the store, manager (with write-behind worker) and invalidator
/// 4. Start background TTL cleanup task
/// 5. Serve the admin router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to info, overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Catalog Cache admin server");

    let config = Config::from_env();
    info!(
        domain = %config.domain,
        tenant = %config.tenant,
        version = config.key_version,
        max_entries = config.max_entries,
        port = config.server_port,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new(config.max_entries));
    let keys = KeyGenerator::from_config(&config);

    let manager = CacheManager::new(store.clone(), keys.clone());
    let (manager, write_behind_handle) = if config.write_behind_capacity > 0 {
        let (manager, handle) = manager.spawn_write_behind(config.write_behind_capacity);
        (manager, Some(handle))
    } else {
        info!("Write-behind disabled, aggregate writes are synchronous");
        (manager, None)
    };
    let invalidator = Invalidator::from_config(store.clone(), keys, &config)
        .with_cache_stats(manager.stats().clone());
    let manager = Arc::new(manager);
    info!("Cache manager and invalidator initialized");

    let cleanup_handle = spawn_cleanup_task(store, config.cleanup_interval);
    info!("Background cleanup task started");

    let app = create_router(AppState::new(manager.clone(), Arc::new(invalidator)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Drain pending write-behind jobs before the worker goes away
    manager.flush_write_behind().await;
    if let Some(handle) = write_behind_handle {
        stop(handle, "Write-behind worker");
    }
    stop(cleanup_handle, "Cleanup task");

    info!("Server shutdown complete");
    Ok(())
}

fn stop(handle: JoinHandle<()>, name: &str) {
    handle.abort();
    warn!("{} aborted", name);
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
