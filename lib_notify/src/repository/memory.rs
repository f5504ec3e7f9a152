//! # In-Memory Repositories
//!
//! Mutex-guarded implementations of every repository contract. They keep the
//! same semantics as the PostgreSQL backend (identity uniqueness, duplicate
//! subscriber rejection, store-level tenant filtering) and can be told to
//! fail, which lets tests exercise the engine's error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{AuditLog, RepoError, RepoResult, SeenNoticeStore, SubscriberStore, TenantRegistry};
use crate::core::identity::IdentityToken;
use crate::model::{AuditEntry, Notice, SeenNotice, SubscriberEntry, Tenant, TenantId, TenantUpdate};

fn injected(operation: &str) -> RepoError {
    RepoError::Unavailable(format!("injected failure during {operation}"))
}

/// Seen-notice history kept in a map keyed by identity.
#[derive(Debug, Default)]
pub struct MemorySeenNotices {
    records: Mutex<HashMap<IdentityToken, SeenNotice>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemorySeenNotices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent insert fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent identity read fail until switched off again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<SeenNotice> {
        let records = self.records.lock().expect("Seen notices lock poisoned");
        records.values().cloned().collect()
    }
}

#[async_trait]
impl SeenNoticeStore for MemorySeenNotices {
    async fn all_identities(&self) -> RepoResult<HashSet<IdentityToken>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("all_identities"));
        }
        let records = self.records.lock().expect("Seen notices lock poisoned");
        Ok(records.keys().cloned().collect())
    }

    async fn insert_if_absent(&self, notices: &[Notice]) -> RepoResult<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("insert_if_absent"));
        }
        let mut records = self.records.lock().expect("Seen notices lock poisoned");
        let mut inserted = 0;
        for notice in notices {
            if !records.contains_key(notice.identity()) {
                records.insert(notice.identity().clone(), SeenNotice::first_seen(notice));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.records.lock().expect("Seen notices lock poisoned").is_empty())
    }

    async fn clear_all(&self) -> RepoResult<u64> {
        let mut records = self.records.lock().expect("Seen notices lock poisoned");
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(self.records.lock().expect("Seen notices lock poisoned").len() as u64)
    }
}

/// Tenant settings keyed by tenant id.
#[derive(Debug, Default)]
pub struct MemoryTenants {
    tenants: Mutex<HashMap<TenantId, Tenant>>,
}

impl MemoryTenants {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRegistry for MemoryTenants {
    async fn get(&self, tenant_id: &TenantId) -> RepoResult<Option<Tenant>> {
        let tenants = self.tenants.lock().expect("Tenants lock poisoned");
        Ok(tenants.get(tenant_id).cloned())
    }

    async fn upsert(&self, tenant_id: &TenantId, update: TenantUpdate) -> RepoResult<Tenant> {
        let mut tenants = self.tenants.lock().expect("Tenants lock poisoned");
        let current = tenants
            .remove(tenant_id)
            .unwrap_or_else(|| Tenant::new(tenant_id.clone()));
        let updated = update.apply(current);
        tenants.insert(tenant_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn list_enabled_with_target(&self) -> RepoResult<Vec<Tenant>> {
        let tenants = self.tenants.lock().expect("Tenants lock poisoned");
        let mut eligible: Vec<Tenant> = tenants
            .values()
            .filter(|tenant| tenant.is_deliverable())
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(eligible)
    }
}

/// Subscriber lists, one insertion-ordered vector per tenant.
#[derive(Debug, Default)]
pub struct MemorySubscribers {
    lists: Mutex<HashMap<TenantId, Vec<SubscriberEntry>>>,
}

impl MemorySubscribers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscribers {
    async fn add(
        &self,
        tenant_id: &TenantId,
        subscriber_id: &str,
        display_name: &str,
        added_by: Option<&str>,
    ) -> RepoResult<bool> {
        let mut lists = self.lists.lock().expect("Subscribers lock poisoned");
        let list = lists.entry(tenant_id.clone()).or_default();
        if list.iter().any(|entry| entry.subscriber_id == subscriber_id) {
            return Ok(false);
        }
        list.push(SubscriberEntry {
            tenant_id: tenant_id.clone(),
            subscriber_id: subscriber_id.to_string(),
            display_name: display_name.to_string(),
            added_by: added_by.map(str::to_string),
            added_at: Utc::now(),
        });
        Ok(true)
    }

    async fn remove(&self, tenant_id: &TenantId, subscriber_id: &str) -> RepoResult<bool> {
        let mut lists = self.lists.lock().expect("Subscribers lock poisoned");
        let Some(list) = lists.get_mut(tenant_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|entry| entry.subscriber_id != subscriber_id);
        Ok(list.len() < before)
    }

    async fn list_for(&self, tenant_id: &TenantId) -> RepoResult<Vec<SubscriberEntry>> {
        let lists = self.lists.lock().expect("Subscribers lock poisoned");
        Ok(lists.get(tenant_id).cloned().unwrap_or_default())
    }

    async fn clear_for(&self, tenant_id: &TenantId) -> RepoResult<u64> {
        let mut lists = self.lists.lock().expect("Subscribers lock poisoned");
        Ok(lists.remove(tenant_id).map_or(0, |list| list.len() as u64))
    }
}

/// Audit entries in append order.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("Audit lock poisoned").clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> RepoResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected("audit append"));
        }
        self.entries.lock().expect("Audit lock poisoned").push(entry);
        Ok(())
    }
}
