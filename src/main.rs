//! Cachegate - caching, invalidation, rate limiting and performance
//! observability layer for an AI interview backend.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachegate::api::create_router;
use cachegate::{
    spawn_cache_sweep_task, spawn_metrics_cleanup_task, spawn_system_sampler_task, AppState,
    Config, KeyValueStore, MemoryStore, RedisStore,
};

/// How often the metrics buffers are cleaned, independent of the cache sweep
const METRICS_CLEANUP_INTERVAL_SECS: u64 = 600;

/// Main entry point for the cachegate service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the backing store, falling back to the in-memory store
/// 4. Wire the cache, invalidation, rate-limit and monitor components
/// 5. Start the background maintenance tasks
/// 6. Serve the admin API on the configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachegate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cachegate");

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, port={}, compression={}, rate_limiting={}",
        config.max_entries,
        config.default_ttl,
        config.server_port,
        config.compression_enabled,
        config.rate_limiting_enabled
    );

    // Connect to the backing store; a single-node in-memory store keeps the
    // service available when the remote store cannot be reached.
    let store: Arc<dyn KeyValueStore> = match &config.store_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                warn!(
                    "Store at {} unreachable ({}), falling back to in-memory store",
                    url, err
                );
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            info!("No STORE_URL configured, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Wire the component stack
    let state = AppState::with_store(store, &config);
    info!("Cache, invalidation, rate-limit and monitor components initialized");

    // Start background maintenance
    let task_handles: Vec<JoinHandle<()>> = vec![
        spawn_cache_sweep_task(state.cache.clone(), config.cleanup_interval),
        spawn_system_sampler_task(state.monitor.clone(), config.sampling_interval),
        spawn_metrics_cleanup_task(state.monitor.clone(), METRICS_CLEANUP_INTERVAL_SECS),
    ];
    info!("Background maintenance tasks started");

    let invalidation = state.invalidation.clone();

    // Create router with all endpoints
    let app = create_router(state);

    // Bind to configured port
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Admin API listening on http://{}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_handles))
        .await?;

    // Scheduled invalidations must not outlive the service instance.
    invalidation.shutdown();
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance tasks and allows graceful
/// shutdown of the HTTP server.
async fn shutdown_signal(task_handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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

    for handle in task_handles {
        handle.abort();
    }
    warn!("Background maintenance tasks aborted");
}
