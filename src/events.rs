//! # Completion events and the outbox relay
//!
//! `complete_work` never talks to the event sink directly. It writes a
//! [`OutboxMessage`] in the same change set as the report and order updates;
//! [`OutboxRelay`] later hands pending messages to the [`EventSink`] and marks
//! them published only once the sink accepted them. Delivery is therefore
//! at-least-once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::store::Store;

pub const REPAIR_ORDER_COMPLETED: &str = "repair.completed";

// ============================================================================
// Event types
// ============================================================================

/// Emitted once a report reaches COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOrderCompleted {
    pub repair_order_id: Uuid,
    pub technician_id: Uuid,
    pub amount: i64,
    pub completed_at: DateTime<Utc>,
}

/// A committed event waiting for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event: RepairOrderCompleted,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn new(event: RepairOrderCompleted) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &RepairOrderCompleted) -> anyhow::Result<()>;
}

/// POSTs each event as JSON to a downstream endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, event: &RepairOrderCompleted) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header("x-event-type", REPAIR_ORDER_COMPLETED)
            .json(event)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Event sink returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Logs events instead of shipping them. Used when no sink URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &RepairOrderCompleted) -> anyhow::Result<()> {
        info!(
            target: "events",
            repair_order_id = %event.repair_order_id,
            technician_id = %event.technician_id,
            amount = event.amount,
            completed_at = %event.completed_at,
            "{}",
            REPAIR_ORDER_COMPLETED
        );
        Ok(())
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Drains the outbox into an [`EventSink`].
pub struct OutboxRelay {
    store: Arc<dyn Store>,
    sink: Arc<dyn EventSink>,
    batch_size: usize,
    poll_interval: Duration,
}

impl OutboxRelay {
    /// `poll_interval` is floored at one millisecond.
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn EventSink>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            batch_size,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Publishes one batch and returns how many messages were delivered.
    ///
    /// Stops at the first sink failure so ordering is kept; the failed
    /// message stays pending for the next pass.
    pub async fn drain_once(&self) -> StoreResult<usize> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        let mut delivered = 0;
        for message in pending {
            if let Err(e) = self.sink.publish(&message.event).await {
                warn!(
                    "Failed to publish completion event {} for repair order {}: {}",
                    message.id, message.event.repair_order_id, e
                );
                break;
            }
            self.store.mark_outbox_published(message.id).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Runs until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Outbox relay started");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(0) => {}
                        Ok(n) => info!("Published {} completion event(s)", n),
                        Err(e) => error!("Outbox relay failed to read pending events: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Outbox relay shutting down");
                        break;
                    }
                }
            }
        }
    }
}
