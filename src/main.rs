//! Chat Guard - rate limiting and abuse prevention server
//!
//! HTTP server gating chat requests behind per-identity rate limits, with
//! rewarded-ad bonus credits and one-shot TTS tokens, all backed by a
//! tiered memory + filesystem cache.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatguard::cache::{Cache, FilesystemAdapter, MemoryAdapter, TieredCache};
use chatguard::token::TtsTokenService;
use chatguard::{create_router, spawn_cleanup_task, AppState, Config};

/// Main entry point for the Chat Guard server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the tiered cache (memory + filesystem)
/// 4. Wire the rate limit, credit and token services
/// 5. Start the background cleanup task
/// 6. Start the HTTP server on the configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatguard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Chat Guard Server");

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, anon_limit={}, user_limit={}, ad_rewards={}, cleanup_interval={}s",
        config.server_port,
        config.anon_limit,
        config.user_limit,
        config.ad_rewards_enabled,
        config.cleanup_interval
    );

    // Build the tiered cache: fast memory layer over a durable disk layer
    let memory = Arc::new(MemoryAdapter::new(config.memory_default_ttl));
    let filesystem = Arc::new(
        FilesystemAdapter::new(&config.cache_dir)
            .await
            .with_context(|| format!("failed to initialize cache directory {}", config.cache_dir))?,
    );
    let fast_default_ttl_ms = memory.default_ttl_ms();
    let cache = Cache::new(Arc::new(TieredCache::new(
        memory.clone(),
        filesystem.clone(),
        fast_default_ttl_ms,
    )));
    info!("Tiered cache initialized (dir: {})", config.cache_dir);

    // Wire services; fails fast on inconsistent token configuration
    let state = AppState::with_stub_synthesizer(cache.clone(), &config)
        .context("failed to initialize services")?;

    // Start background cleanup task
    let cleanup_handle = spawn_cleanup_task(
        memory,
        filesystem,
        TtsTokenService::new(cache),
        config.cleanup_interval,
    );
    info!("Background cleanup task started");

    // Create router with all endpoints
    let app = create_router(state);

    // Bind to configured port
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Abort the cleanup task
    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
