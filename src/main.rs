// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gate Check-in API Server
//!
//! Verifies scanned ticket credentials for gate devices and admits each
//! ticket at most once.

use anyhow::Context;
use gate_checkin::{
    config::{Config, RateLimitBackend, StoreBackend},
    db::{CatalogSeed, CatalogStore, FirestoreDb, MemoryStore},
    services::{
        CheckinEngine, CredentialCodec, FirestoreRateLimiter, InMemoryRateLimiter, RateLimiter,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle per-gate windows are dropped from the in-memory limiter.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        store_backend = ?config.store_backend,
        rate_limit_backend = ?config.rate_limit_backend,
        scan_rate_limit_per_minute = config.scan_rate_limit_per_minute,
        "Starting gate check-in API"
    );

    // One Firestore client, shared by the store and the limiter when either needs it
    let needs_firestore = config.store_backend == StoreBackend::Firestore
        || config.rate_limit_backend == RateLimitBackend::Firestore;
    let firestore = if needs_firestore {
        Some(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .context("Failed to connect to Firestore")?,
        )
    } else {
        None
    };

    let store: Arc<dyn CatalogStore> = match (config.store_backend, &firestore) {
        (StoreBackend::Firestore, Some(db)) => Arc::new(db.clone()),
        _ => {
            tracing::warn!("Using in-memory catalog store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let rate_limiter: Arc<dyn RateLimiter> = match (config.rate_limit_backend, &firestore) {
        (RateLimitBackend::Firestore, Some(db)) => Arc::new(FirestoreRateLimiter::new(db.clone())),
        _ => {
            let limiter = Arc::new(InMemoryRateLimiter::new());
            spawn_limiter_pruning(limiter.clone());
            limiter
        }
    };

    let codec = CredentialCodec::new(&config.qr_secret).context("Invalid QR_SECRET")?;

    match &config.catalog_seed_path {
        Some(path) => {
            let seed = CatalogSeed::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load catalog seed {}", path))?;
            let summary = seed
                .apply(&*store, &codec)
                .await
                .context("Failed to apply catalog seed")?;
            tracing::info!(
                path = %path,
                users = summary.users,
                events = summary.events,
                gates = summary.gates,
                orders_created = summary.orders_created,
                orders_skipped = summary.orders_skipped,
                "Applied catalog seed"
            );
        }
        None if config.store_backend == StoreBackend::Memory => {
            tracing::warn!(
                "In-memory store started without CATALOG_SEED_PATH; every scan will be not_found"
            );
        }
        None => {}
    }

    let engine = CheckinEngine::new(store.clone(), codec)
        .with_scan_log_timeout(Duration::from_millis(config.scan_log_timeout_ms));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        rate_limiter,
        engine,
    });

    let state_engine = state.engine.clone();

    // Build router
    let app = gate_checkin::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight audit writes land before exiting
    state_engine.flush_audit().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM (Cloud Run sends SIGTERM before stopping).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
}

/// Periodically drop gates whose window has fully drained.
fn spawn_limiter_pruning(limiter: Arc<InMemoryRateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
            tracing::debug!(tracked_gates = limiter.tracked_gates(), "Pruned rate limit windows");
        }
    });
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gate_checkin=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
