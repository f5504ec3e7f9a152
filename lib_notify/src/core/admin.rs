//! # Administrative Operations
//!
//! Tenant lifecycle, subscriber management, manual checks and history resets,
//! each recorded in the audit log. These run as short-lived tasks next to the
//! scheduler and never touch the change detector directly: a history reset
//! only raises the shared `RebaselineFlag`.

use std::sync::Arc;

use thiserror::Error;

use crate::core::known_cache::RebaselineFlag;
use crate::core::scheduler::{SchedulerError, SchedulerHandle};
use crate::model::{AuditAction, AuditEntry, SubscriberEntry, Tenant, TenantId, TenantUpdate};
use crate::repository::{
    record_quietly, AuditLog, RepoError, SeenNoticeStore, SubscriberStore, TenantRegistry,
};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("tenant {0} has no delivery target configured")]
    NotConfigured(TenantId),
    #[error("delivery target must not be empty")]
    EmptyTarget,
}

pub struct NoticeAdmin {
    tenants: Arc<dyn TenantRegistry>,
    subscribers: Arc<dyn SubscriberStore>,
    seen: Arc<dyn SeenNoticeStore>,
    audit: Arc<dyn AuditLog>,
    rebaseline: RebaselineFlag,
    scheduler: SchedulerHandle,
}

impl NoticeAdmin {
    pub fn new(
        tenants: Arc<dyn TenantRegistry>,
        subscribers: Arc<dyn SubscriberStore>,
        seen: Arc<dyn SeenNoticeStore>,
        audit: Arc<dyn AuditLog>,
        rebaseline: RebaselineFlag,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            tenants,
            subscribers,
            seen,
            audit,
            rebaseline,
            scheduler,
        }
    }

    async fn record(&self, tenant_id: Option<&TenantId>, action: AuditAction, details: String, actor: Option<&str>) {
        let mut entry = AuditEntry::new(tenant_id.cloned(), action).with_details(details);
        if let Some(actor) = actor {
            entry = entry.by(actor);
        }
        record_quietly(self.audit.as_ref(), entry).await;
    }

    /// A tenant joined. It is (re)set to disabled and keeps any earlier target.
    pub async fn register_tenant(&self, tenant_id: &TenantId, name: &str) -> Result<Tenant, AdminError> {
        let tenant = self.tenants.upsert(tenant_id, TenantUpdate::enabled(false)).await?;
        log::info!("event=tenant_joined tenant={} name={:?}", tenant_id, name);
        self.record(Some(tenant_id), AuditAction::TenantJoined, format!("joined as {}", name), None)
            .await;
        Ok(tenant)
    }

    /// A tenant left. Its settings are kept; only the event is recorded.
    pub async fn tenant_removed(&self, tenant_id: &TenantId, name: &str) {
        log::info!("event=tenant_removed tenant={} name={:?}", tenant_id, name);
        self.record(Some(tenant_id), AuditAction::TenantRemoved, format!("left as {}", name), None)
            .await;
    }

    /// Sets the delivery target and enables the tenant.
    pub async fn configure(&self, tenant_id: &TenantId, target: &str, actor: &str) -> Result<Tenant, AdminError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AdminError::EmptyTarget);
        }
        let tenant = self.tenants.upsert(tenant_id, TenantUpdate::configure(target)).await?;
        self.record(
            Some(tenant_id),
            AuditAction::Configured,
            format!("delivery target set to {}", target),
            Some(actor),
        )
        .await;
        Ok(tenant)
    }

    /// Current settings, or `None` for a tenant that never joined.
    pub async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, AdminError> {
        Ok(self.tenants.get(tenant_id).await?)
    }

    pub async fn pause(&self, tenant_id: &TenantId, actor: &str) -> Result<Tenant, AdminError> {
        let tenant = self.tenants.upsert(tenant_id, TenantUpdate::enabled(false)).await?;
        self.record(Some(tenant_id), AuditAction::Paused, "notifications paused".into(), Some(actor))
            .await;
        Ok(tenant)
    }

    /// # Errors
    /// `AdminError::NotConfigured` when the tenant has no delivery target yet.
    pub async fn resume(&self, tenant_id: &TenantId, actor: &str) -> Result<Tenant, AdminError> {
        let configured = self
            .tenants
            .get(tenant_id)
            .await?
            .is_some_and(|tenant| tenant.delivery_target.is_some());
        if !configured {
            return Err(AdminError::NotConfigured(tenant_id.clone()));
        }

        let tenant = self.tenants.upsert(tenant_id, TenantUpdate::enabled(true)).await?;
        self.record(Some(tenant_id), AuditAction::Resumed, "notifications resumed".into(), Some(actor))
            .await;
        Ok(tenant)
    }

    /// Returns `false` when the subscriber was already listed.
    pub async fn add_subscriber(
        &self,
        tenant_id: &TenantId,
        subscriber_id: &str,
        display_name: &str,
        actor: &str,
    ) -> Result<bool, AdminError> {
        let added = self
            .subscribers
            .add(tenant_id, subscriber_id, display_name, Some(actor))
            .await?;
        if added {
            self.record(
                Some(tenant_id),
                AuditAction::SubscriberAdded,
                format!("{} ({})", display_name, subscriber_id),
                Some(actor),
            )
            .await;
        }
        Ok(added)
    }

    pub async fn remove_subscriber(
        &self,
        tenant_id: &TenantId,
        subscriber_id: &str,
        actor: &str,
    ) -> Result<bool, AdminError> {
        let removed = self.subscribers.remove(tenant_id, subscriber_id).await?;
        if removed {
            self.record(
                Some(tenant_id),
                AuditAction::SubscriberRemoved,
                subscriber_id.to_string(),
                Some(actor),
            )
            .await;
        }
        Ok(removed)
    }

    pub async fn list_subscribers(&self, tenant_id: &TenantId) -> Result<Vec<SubscriberEntry>, AdminError> {
        Ok(self.subscribers.list_for(tenant_id).await?)
    }

    pub async fn clear_subscribers(&self, tenant_id: &TenantId, actor: &str) -> Result<u64, AdminError> {
        let removed = self.subscribers.clear_for(tenant_id).await?;
        self.record(
            Some(tenant_id),
            AuditAction::SubscribersCleared,
            format!("{} subscribers removed", removed),
            Some(actor),
        )
        .await;
        Ok(removed)
    }

    /// Triggers an immediate cycle through the scheduler and returns once the
    /// request is queued.
    pub async fn check_now(&self, tenant_id: Option<&TenantId>, actor: &str) -> Result<(), AdminError> {
        self.scheduler.restart()?;
        self.record(tenant_id, AuditAction::ManualCheck, "manual check requested".into(), Some(actor))
            .await;
        Ok(())
    }

    /// Deletes the whole seen-notice history and schedules a fresh baseline.
    ///
    /// Returns how many records were removed.
    pub async fn clear_history(&self, actor: &str) -> Result<u64, AdminError> {
        let removed = self.seen.clear_all().await?;
        self.rebaseline.request();
        log::warn!("event=history_cleared removed={} actor={}", removed, actor);
        self.record(
            None,
            AuditAction::HistoryCleared,
            format!("{} notices removed", removed),
            Some(actor),
        )
        .await;
        Ok(removed)
    }

    pub async fn history_count(&self) -> Result<u64, AdminError> {
        Ok(self.seen.count().await?)
    }
}
