//! Audit sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{AuditEvent, AuditResult};

/// `tracing` target of audit events.
pub const AUDIT_TARGET: &str = "trustgate::audit";

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one event.
    async fn record(&self, event: AuditEvent) -> AuditResult<()>;
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Most recent event.
    #[must_use]
    pub fn last(&self) -> Option<AuditEvent> {
        self.events.lock().last().cloned()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn record(&self, event: AuditEvent) -> AuditResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Emits events as structured logs.
///
/// Grants log at `info`, denials at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn record(&self, event: AuditEvent) -> AuditResult<()> {
        let policy_id = event.policy_id.map(|id| id.to_string());
        if event.granted {
            info!(
                target: AUDIT_TARGET,
                event_id = %event.event_id,
                occurred_at = %event.occurred_at.to_rfc3339(),
                user_id = %event.user_id,
                device_id = %event.device_id,
                resource = %event.resource,
                access_type = %event.access_type,
                granted = true,
                policy_id = policy_id.as_deref(),
                policy_name = event.policy_name.as_deref(),
                attestation = %event.attestation,
                "access granted"
            );
        } else {
            warn!(
                target: AUDIT_TARGET,
                event_id = %event.event_id,
                occurred_at = %event.occurred_at.to_rfc3339(),
                user_id = %event.user_id,
                device_id = %event.device_id,
                resource = %event.resource,
                access_type = %event.access_type,
                granted = false,
                reason = event.reason.as_deref().unwrap_or_default(),
                policy_id = policy_id.as_deref(),
                policy_name = event.policy_name.as_deref(),
                attestation = %event.attestation,
                "access denied"
            );
        }
        Ok(())
    }
}
