//! Fire-and-forget audit trail.
//!
//! [`AuditDispatcher::dispatch`] never blocks and never fails: entries go onto
//! a bounded queue drained by a background task, and a full or closed queue
//! just drops the entry with a warning.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Audited report operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateDraft,
    UpdateDraft,
    DeleteDraft,
    SubmitDraft,
    AcceptSubmission,
    RejectSubmission,
    StartWork,
    CompleteWork,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::CreateDraft => "CREATE_DRAFT",
            AuditAction::UpdateDraft => "UPDATE_DRAFT",
            AuditAction::DeleteDraft => "DELETE_DRAFT",
            AuditAction::SubmitDraft => "SUBMIT_DRAFT",
            AuditAction::AcceptSubmission => "ACCEPT_SUBMISSION",
            AuditAction::RejectSubmission => "REJECT_SUBMISSION",
            AuditAction::StartWork => "START_WORK",
            AuditAction::CompleteWork => "COMPLETE_WORK",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub report_id: Uuid,
    pub actor_id: Uuid,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

/// Writes each entry as a structured log record on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        info!(
            target: "audit",
            action = %entry.action,
            report_id = %entry.report_id,
            actor_id = %entry.actor_id,
            "Audit: {} on report {} by {}",
            entry.action,
            entry.report_id,
            entry.actor_id
        );
        Ok(())
    }
}

/// Producer side of the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditDispatcher {
    /// Starts the background worker. It exits once every dispatcher clone has
    /// been dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = sink.record(&entry).await {
                    warn!("Dropping audit entry {} for report {}: {}", entry.action, entry.report_id, e);
                }
            }
        });

        (Self { tx }, handle)
    }

    pub fn dispatch(&self, action: AuditAction, report_id: Uuid, actor_id: Uuid) {
        let entry = AuditEntry {
            action,
            report_id,
            actor_id,
        };
        if let Err(e) = self.tx.try_send(entry) {
            warn!("Audit queue unavailable, dropping entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditSink for Collect {
        async fn record(&self, entry: &AuditEntry) -> anyhow::Result<()> {
            self.0.lock().await.push(entry.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl AuditSink for Broken {
        async fn record(&self, _entry: &AuditEntry) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn test_entries_reach_sink_in_order() {
        let sink = Arc::new(Collect::default());
        let (dispatcher, handle) = AuditDispatcher::spawn(sink.clone(), 8);
        let report_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();

        dispatcher.dispatch(AuditAction::CreateDraft, report_id, actor_id);
        dispatcher.dispatch(AuditAction::SubmitDraft, report_id, actor_id);
        drop(dispatcher);
        handle.await.unwrap();

        let actions: Vec<_> = sink.0.lock().await.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::CreateDraft, AuditAction::SubmitDraft]);
    }

    #[tokio::test]
    async fn test_sink_failures_are_swallowed() {
        let (dispatcher, handle) = AuditDispatcher::spawn(Arc::new(Broken), 2);
        for _ in 0..10 {
            dispatcher.dispatch(AuditAction::StartWork, Uuid::new_v4(), Uuid::new_v4());
        }
        drop(dispatcher);
        handle.await.unwrap();
    }
}
