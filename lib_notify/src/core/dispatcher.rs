//! # Fan-out Dispatcher
//!
//! Delivers a batch of freshly discovered notices to every deliverable tenant.
//!
//! ## Core Design Principles:
//!
//! 1.  **Store-level eligibility**: only tenants returned by
//!     `TenantRegistry::list_enabled_with_target` are considered. A tenant whose
//!     target no longer resolves is skipped, not failed.
//!
//! 2.  **Oldest-first delivery**: the detector hands notices over in source
//!     order (newest first); each tenant receives them reversed, one message per
//!     notice, with at least `pacing` between consecutive messages.
//!
//! 3.  **Failure isolation**: a send error stops delivery to that tenant only.
//!     Other tenants keep going, and nothing is retried from scratch.
//!
//! 4.  **Bounded concurrency**: tenants run concurrently up to a cap, while
//!     pacing stays strictly per tenant.
//!
//! Every loaded tenant gets exactly one audit entry once its delivery is over.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::delivery::{DeliveryTransport, MessageTemplate, NoticeMessage};
use crate::model::{AuditAction, AuditEntry, Notice, Tenant, TenantId};
use crate::repository::{record_quietly, AuditLog, SubscriberStore, TenantRegistry};

/// How delivery to one tenant ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every notice was sent.
    Delivered,
    /// The tenant's destination did not resolve; nothing was sent.
    Unresolvable,
    /// Delivery stopped at the first error; earlier messages may have gone out.
    Failed(String),
}

/// Per-tenant result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDelivery {
    pub tenant_id: TenantId,
    pub delivered: usize,
    pub outcome: DeliveryOutcome,
}

/// Results of one dispatch, sorted by tenant id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub tenants: Vec<TenantDelivery>,
}

impl DispatchSummary {
    pub fn total_delivered(&self) -> usize {
        self.tenants.iter().map(|t| t.delivered).sum()
    }

    pub fn failed(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| matches!(t.outcome, DeliveryOutcome::Failed(_)))
            .count()
    }

    pub fn for_tenant(&self, tenant_id: &TenantId) -> Option<&TenantDelivery> {
        self.tenants.iter().find(|t| &t.tenant_id == tenant_id)
    }
}

/// # Fan-out Dispatcher
///
/// Stateless across invocations; all state lives in the repositories.
pub struct FanoutDispatcher {
    tenants: Arc<dyn TenantRegistry>,
    subscribers: Arc<dyn SubscriberStore>,
    audit: Arc<dyn AuditLog>,
    transport: Arc<dyn DeliveryTransport>,
    template: MessageTemplate,
    pacing: Duration,
    max_concurrent: usize,
}

impl FanoutDispatcher {
    pub fn new(
        tenants: Arc<dyn TenantRegistry>,
        subscribers: Arc<dyn SubscriberStore>,
        audit: Arc<dyn AuditLog>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        let defaults = crate::configs::EngineSettings::default();
        Self {
            tenants,
            subscribers,
            audit,
            transport,
            template: MessageTemplate::default(),
            pacing: defaults.delivery_pacing,
            max_concurrent: defaults.max_concurrent_tenants,
        }
    }

    pub fn with_template(mut self, template: MessageTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// # Dispatch
    ///
    /// Sends `notices` (newest first, as fetched) to every eligible tenant.
    ///
    /// A registry failure aborts the dispatch before any tenant is touched and
    /// yields an empty summary; per-tenant failures are recorded in the summary.
    pub async fn dispatch(&self, notices: &[Notice]) -> DispatchSummary {
        if notices.is_empty() {
            return DispatchSummary::default();
        }

        let tenants = match self.tenants.list_enabled_with_target().await {
            Ok(tenants) => tenants,
            Err(e) => {
                log::error!("event=dispatch status=error stage=list_tenants error={}", e);
                return DispatchSummary::default();
            }
        };

        log::info!(
            "event=dispatch status=start notices={} tenants={}",
            notices.len(),
            tenants.len()
        );

        let oldest_first: Vec<&Notice> = notices.iter().rev().collect();
        let mut results: Vec<TenantDelivery> = stream::iter(tenants)
            .map(|tenant| self.deliver_to(tenant, &oldest_first))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        results.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

        let summary = DispatchSummary { tenants: results };
        log::info!(
            "event=dispatch status=done delivered={} failed_tenants={}",
            summary.total_delivered(),
            summary.failed()
        );
        summary
    }

    async fn deliver_to(&self, tenant: Tenant, notices: &[&Notice]) -> TenantDelivery {
        let tenant_id = tenant.tenant_id.clone();

        let (delivered, outcome) = match self.transport.resolve_destination(&tenant).await {
            None => {
                log::warn!(
                    "event=delivery status=skipped tenant={} reason=unresolvable_destination",
                    tenant_id
                );
                (0, DeliveryOutcome::Unresolvable)
            }
            Some(destination) => match self.mentions_for(&tenant).await {
                Err(e) => (0, DeliveryOutcome::Failed(e)),
                Ok(mentions) => {
                    let text = self.template.text(&mentions);
                    let mut delivered = 0;
                    let mut outcome = DeliveryOutcome::Delivered;
                    for notice in notices {
                        if delivered > 0 && !self.pacing.is_zero() {
                            tokio::time::sleep(self.pacing).await;
                        }
                        let payload = NoticeMessage::render(notice, &self.template);
                        if let Err(e) = self.transport.send(&destination, &text, &payload).await {
                            log::error!(
                                "event=delivery status=error tenant={} notice={:?} error={}",
                                tenant_id,
                                notice.title(),
                                e
                            );
                            outcome = DeliveryOutcome::Failed(e.to_string());
                            break;
                        }
                        delivered += 1;
                    }
                    (delivered, outcome)
                }
            },
        };

        self.audit_delivery(&tenant_id, notices.len(), delivered, &outcome).await;
        TenantDelivery {
            tenant_id,
            delivered,
            outcome,
        }
    }

    /// Space-separated mentions of every subscriber that still resolves.
    async fn mentions_for(&self, tenant: &Tenant) -> Result<String, String> {
        let entries = self
            .subscribers
            .list_for(&tenant.tenant_id)
            .await
            .map_err(|e| {
                log::error!(
                    "event=delivery status=error tenant={} stage=subscribers error={}",
                    tenant.tenant_id,
                    e
                );
                e.to_string()
            })?;

        let mut mentions = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.transport.resolve_mention(tenant, entry).await {
                Some(mention) => mentions.push(mention),
                None => log::debug!(
                    "event=mention status=dropped tenant={} subscriber={}",
                    tenant.tenant_id,
                    entry.subscriber_id
                ),
            }
        }
        Ok(mentions.join(" "))
    }

    async fn audit_delivery(
        &self,
        tenant_id: &TenantId,
        batch: usize,
        delivered: usize,
        outcome: &DeliveryOutcome,
    ) {
        let entry = match outcome {
            DeliveryOutcome::Delivered => AuditEntry::new(Some(tenant_id.clone()), AuditAction::NoticesPosted)
                .with_details(format!("{} notices posted", delivered)),
            DeliveryOutcome::Unresolvable => {
                AuditEntry::new(Some(tenant_id.clone()), AuditAction::DeliverySkipped)
                    .with_details("destination could not be resolved")
            }
            DeliveryOutcome::Failed(error) => {
                AuditEntry::new(Some(tenant_id.clone()), AuditAction::DeliveryFailed)
                    .with_details(format!("{} of {} notices posted: {}", delivered, batch, error))
            }
        };
        record_quietly(self.audit.as_ref(), entry).await;
    }
}
