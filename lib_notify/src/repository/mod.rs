//! # Repository Contracts
//!
//! One capability trait per storage concern. The engine depends only on these
//! traits, so the storage backend can be swapped without touching the cycle or
//! the dispatcher.
//!
//! ## Contained Modules:
//! - **`memory`**: mutex-guarded in-process implementations, used by tests and
//!   when no database is configured.
//!
//! The PostgreSQL implementations live in `crate::connections`.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::identity::IdentityToken;
use crate::model::{AuditEntry, Notice, SubscriberEntry, Tenant, TenantId, TenantUpdate};

/// In-memory repository implementations.
pub mod memory;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage failures surfaced by any repository backend.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

/// Persisted identities of every notice seen so far.
#[async_trait]
pub trait SeenNoticeStore: Send + Sync {
    /// Every identity currently stored.
    async fn all_identities(&self) -> RepoResult<HashSet<IdentityToken>>;

    /// Stores the notices whose identity is absent. Identities already present
    /// are skipped rather than reported as errors.
    ///
    /// Returns how many rows were actually inserted.
    async fn insert_if_absent(&self, notices: &[Notice]) -> RepoResult<usize>;

    async fn is_empty(&self) -> RepoResult<bool>;

    /// Deletes the whole history, returning how many records were removed.
    async fn clear_all(&self) -> RepoResult<u64>;

    async fn count(&self) -> RepoResult<u64>;
}

/// Per-tenant enablement and delivery target.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn get(&self, tenant_id: &TenantId) -> RepoResult<Option<Tenant>>;

    /// Creates the tenant (disabled, no target) if needed, then applies `update`.
    async fn upsert(&self, tenant_id: &TenantId, update: TenantUpdate) -> RepoResult<Tenant>;

    /// Tenants with `enabled = true` and a non-null target, filtered by the store.
    async fn list_enabled_with_target(&self) -> RepoResult<Vec<Tenant>>;
}

/// Per-tenant mention lists.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Returns `false` when the subscriber is already on the tenant's list.
    async fn add(
        &self,
        tenant_id: &TenantId,
        subscriber_id: &str,
        display_name: &str,
        added_by: Option<&str>,
    ) -> RepoResult<bool>;

    async fn remove(&self, tenant_id: &TenantId, subscriber_id: &str) -> RepoResult<bool>;

    /// Entries in the order they were added.
    async fn list_for(&self, tenant_id: &TenantId) -> RepoResult<Vec<SubscriberEntry>>;

    async fn clear_for(&self, tenant_id: &TenantId) -> RepoResult<u64>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> RepoResult<()>;
}

/// Appends to the audit log, swallowing and logging any failure.
pub async fn record_quietly(audit: &dyn AuditLog, entry: AuditEntry) {
    let action = entry.action;
    if let Err(e) = audit.append(entry).await {
        log::warn!("event=audit_append status=error action={} error={}", action, e);
    }
}
