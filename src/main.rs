//! # Repair Workflow Service
//!
//! Serves the technician report workflow over HTTP.
//!
//! ## Architecture
//!
//! - Axum handles HTTP routing and request/response lifecycle
//! - SQLx persists repair orders, coupons, reports and the outbox
//!   (in-memory when `APP_DATABASE_URL` is unset)
//! - The audit dispatcher drains audit entries in the background
//! - The outbox relay publishes completion events in the background

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use repair_workflow::audit::{AuditDispatcher, TracingAuditSink};
use repair_workflow::config::AppConfig;
use repair_workflow::events::{EventSink, HttpEventSink, OutboxRelay, TracingEventSink};
use repair_workflow::store::{MemoryStore, PgStore, Store};
use repair_workflow::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repair_workflow=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting repair workflow service");
    let config = AppConfig::from_env();

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgStore::new(db::connect(&config, url).await?)),
        None => {
            warn!("APP_DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let (audit, audit_handle) = AuditDispatcher::spawn(Arc::new(TracingAuditSink), config.audit_queue_capacity);
    info!("Audit dispatcher started (capacity {})", config.audit_queue_capacity);

    let sink: Arc<dyn EventSink> = match config.event_sink_url.as_deref() {
        Some(url) => {
            info!("Publishing completion events to {}", url);
            Arc::new(HttpEventSink::new(url))
        }
        None => Arc::new(TracingEventSink),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = OutboxRelay::new(
        store.clone(),
        sink,
        config.outbox_batch_size,
        config.outbox_poll_interval,
    );
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    let app = create_app(AppState::new(store, audit));

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // The router (and with it the last dispatcher clone) is gone; let the
    // background tasks finish what is queued.
    let _ = shutdown_tx.send(true);
    relay_handle.await?;
    audit_handle.await?;
    info!("Repair workflow service stopped");
    Ok(())
}
