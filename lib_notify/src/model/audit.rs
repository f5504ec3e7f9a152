//! Audit trail entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::tenant::TenantId;

/// Significant actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TenantJoined,
    TenantRemoved,
    Configured,
    Paused,
    Resumed,
    SubscriberAdded,
    SubscriberRemoved,
    SubscribersCleared,
    ManualCheck,
    HistoryCleared,
    NoticesPosted,
    DeliveryFailed,
    DeliverySkipped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantJoined => "tenant_joined",
            Self::TenantRemoved => "tenant_removed",
            Self::Configured => "configured",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::SubscriberAdded => "subscriber_added",
            Self::SubscriberRemoved => "subscriber_removed",
            Self::SubscribersCleared => "subscribers_cleared",
            Self::ManualCheck => "manual_check",
            Self::HistoryCleared => "history_cleared",
            Self::NoticesPosted => "notices_posted",
            Self::DeliveryFailed => "delivery_failed",
            Self::DeliverySkipped => "delivery_skipped",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Audit Entry
///
/// One append-only audit record. `tenant_id` is `None` for global actions such
/// as clearing the notice history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub tenant_id: Option<TenantId>,
    pub action: AuditAction,
    pub details: Option<String>,
    /// Who triggered the action; `None` for the engine itself.
    pub actor_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(tenant_id: Option<TenantId>, action: AuditAction) -> Self {
        Self {
            tenant_id,
            action,
            details: None,
            actor_id: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn by(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }
}
