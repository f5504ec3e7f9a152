//! # PostgreSQL Repositories
//!
//! `PgStore` implements all four repository contracts over one shared pool.
//! Idempotent inserts rely on `ON CONFLICT DO NOTHING`; tenant eligibility is
//! filtered in SQL.

use std::collections::HashSet;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use tokio_postgres::Row;

use crate::core::identity::IdentityToken;
use crate::model::{AuditEntry, Notice, SubscriberEntry, Tenant, TenantId, TenantUpdate};
use crate::repository::{
    AuditLog, RepoError, RepoResult, SeenNoticeStore, SubscriberStore, TenantRegistry,
};

fn unavailable(e: PoolError) -> RepoError {
    RepoError::Unavailable(e.to_string())
}

fn query(e: tokio_postgres::Error) -> RepoError {
    RepoError::Query(e.to_string())
}

fn tenant_from_row(row: &Row) -> RepoResult<Tenant> {
    Ok(Tenant {
        tenant_id: TenantId::new(row.try_get::<_, String>("tenant_id").map_err(query)?),
        delivery_target: row.try_get("delivery_target").map_err(query)?,
        enabled: row.try_get("enabled").map_err(query)?,
    })
}

/// Repository backend over a `deadpool-postgres` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeenNoticeStore for PgStore {
    async fn all_identities(&self) -> RepoResult<HashSet<IdentityToken>> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let rows = client
            .query("SELECT identity FROM seen_notices", &[])
            .await
            .map_err(query)?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get(0).map_err(query)?;
                if raw.len() != IdentityToken::HEX_LEN {
                    return Err(RepoError::InvalidData(format!("malformed identity `{}`", raw)));
                }
                Ok(IdentityToken::from_stored(raw))
            })
            .collect()
    }

    async fn insert_if_absent(&self, notices: &[Notice]) -> RepoResult<usize> {
        if notices.is_empty() {
            return Ok(0);
        }
        let mut client = self.pool.get().await.map_err(unavailable)?;
        let tx = client.transaction().await.map_err(query)?;
        let stmt = tx
            .prepare_cached(
                "INSERT INTO seen_notices (identity, title, link) VALUES ($1, $2, $3) \
                 ON CONFLICT (identity) DO NOTHING",
            )
            .await
            .map_err(query)?;

        let mut inserted = 0;
        for notice in notices {
            let link = notice.link().as_str();
            inserted += tx
                .execute(&stmt, &[&notice.identity().as_str(), &notice.title(), &link])
                .await
                .map_err(query)?;
        }
        tx.commit().await.map_err(query)?;
        Ok(inserted as usize)
    }

    async fn is_empty(&self) -> RepoResult<bool> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let row = client
            .query_one("SELECT NOT EXISTS (SELECT 1 FROM seen_notices)", &[])
            .await
            .map_err(query)?;
        row.try_get(0).map_err(query)
    }

    async fn clear_all(&self) -> RepoResult<u64> {
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .execute("DELETE FROM seen_notices", &[])
            .await
            .map_err(query)
    }

    async fn count(&self) -> RepoResult<u64> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let row = client
            .query_one("SELECT COUNT(*) FROM seen_notices", &[])
            .await
            .map_err(query)?;
        let count: i64 = row.try_get(0).map_err(query)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl TenantRegistry for PgStore {
    async fn get(&self, tenant_id: &TenantId) -> RepoResult<Option<Tenant>> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let row = client
            .query_opt(
                "SELECT tenant_id, delivery_target, enabled FROM tenants WHERE tenant_id = $1",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(query)?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn upsert(&self, tenant_id: &TenantId, update: TenantUpdate) -> RepoResult<Tenant> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let row = client
            .query_one(
                "INSERT INTO tenants (tenant_id, delivery_target, enabled) \
                 VALUES ($1, $2, COALESCE($3, FALSE)) \
                 ON CONFLICT (tenant_id) DO UPDATE SET \
                     delivery_target = COALESCE(EXCLUDED.delivery_target, tenants.delivery_target), \
                     enabled = COALESCE($3, tenants.enabled), \
                     updated_at = now() \
                 RETURNING tenant_id, delivery_target, enabled",
                &[&tenant_id.as_str(), &update.delivery_target, &update.enabled],
            )
            .await
            .map_err(query)?;
        tenant_from_row(&row)
    }

    async fn list_enabled_with_target(&self) -> RepoResult<Vec<Tenant>> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let rows = client
            .query(
                "SELECT tenant_id, delivery_target, enabled FROM tenants \
                 WHERE enabled AND delivery_target IS NOT NULL ORDER BY tenant_id",
                &[],
            )
            .await
            .map_err(query)?;
        rows.iter().map(tenant_from_row).collect()
    }
}

#[async_trait]
impl SubscriberStore for PgStore {
    async fn add(
        &self,
        tenant_id: &TenantId,
        subscriber_id: &str,
        display_name: &str,
        added_by: Option<&str>,
    ) -> RepoResult<bool> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let inserted = client
            .execute(
                "INSERT INTO tenant_subscribers (tenant_id, subscriber_id, display_name, added_by) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (tenant_id, subscriber_id) DO NOTHING",
                &[&tenant_id.as_str(), &subscriber_id, &display_name, &added_by],
            )
            .await
            .map_err(query)?;
        Ok(inserted == 1)
    }

    async fn remove(&self, tenant_id: &TenantId, subscriber_id: &str) -> RepoResult<bool> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let removed = client
            .execute(
                "DELETE FROM tenant_subscribers WHERE tenant_id = $1 AND subscriber_id = $2",
                &[&tenant_id.as_str(), &subscriber_id],
            )
            .await
            .map_err(query)?;
        Ok(removed > 0)
    }

    async fn list_for(&self, tenant_id: &TenantId) -> RepoResult<Vec<SubscriberEntry>> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let rows = client
            .query(
                "SELECT subscriber_id, display_name, added_by, added_at FROM tenant_subscribers \
                 WHERE tenant_id = $1 ORDER BY added_at, subscriber_id",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(query)?;

        rows.iter()
            .map(|row| {
                Ok(SubscriberEntry {
                    tenant_id: tenant_id.clone(),
                    subscriber_id: row.try_get("subscriber_id").map_err(query)?,
                    display_name: row.try_get("display_name").map_err(query)?,
                    added_by: row.try_get("added_by").map_err(query)?,
                    added_at: row.try_get("added_at").map_err(query)?,
                })
            })
            .collect()
    }

    async fn clear_for(&self, tenant_id: &TenantId) -> RepoResult<u64> {
        let client = self.pool.get().await.map_err(unavailable)?;
        client
            .execute(
                "DELETE FROM tenant_subscribers WHERE tenant_id = $1",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(query)
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn append(&self, entry: AuditEntry) -> RepoResult<()> {
        let client = self.pool.get().await.map_err(unavailable)?;
        let tenant_id = entry.tenant_id.as_ref().map(TenantId::as_str);
        client
            .execute(
                "INSERT INTO audit_log (tenant_id, action, details, actor_id, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &tenant_id,
                    &entry.action.as_str(),
                    &entry.details,
                    &entry.actor_id,
                    &entry.recorded_at,
                ],
            )
            .await
            .map_err(query)?;
        Ok(())
    }
}
