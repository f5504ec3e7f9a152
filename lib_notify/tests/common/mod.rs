//! Shared fixtures for the engine integration tests: a scripted source, a
//! recording transport, and a harness wiring them to in-memory repositories.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use lib_notify::core::{ChangeDetector, FanoutDispatcher, RebaselineFlag};
use lib_notify::delivery::{
    DeliveryError, DeliveryTransport, DestinationHandle, NoticeMessage,
};
use lib_notify::ingestors::SourceClient;
use lib_notify::model::{Notice, SubscriberEntry, Tenant, TenantId, TenantUpdate};
use lib_notify::repository::memory::{
    MemoryAuditLog, MemorySeenNotices, MemorySubscribers, MemoryTenants,
};
use lib_notify::repository::TenantRegistry;

pub fn notice(title: &str) -> Notice {
    Notice::new(title, &format!("https://notices.example.org/files/{title}.pdf"), None).unwrap()
}

pub fn notices(titles: &[&str]) -> Vec<Notice> {
    titles.iter().map(|title| notice(title)).collect()
}

/// Returns whatever page it was last given.
#[derive(Default)]
pub struct ScriptedSource {
    page: Mutex<Vec<Notice>>,
    fetches: AtomicUsize,
    panic_next: AtomicBool,
}

impl ScriptedSource {
    pub fn set(&self, page: Vec<Notice>) {
        *self.page.lock().unwrap() = page;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn panic_on_next_fetch(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch(&self) -> Vec<Notice> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted source exploded");
        }
        self.page.lock().unwrap().clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub tenant_id: TenantId,
    pub text: String,
    pub title: String,
    pub at: Instant,
}

/// Records every send; can be told to fail or refuse particular tenants.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<TenantId>>,
    unresolvable: Mutex<HashSet<TenantId>>,
    gone_subscribers: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn fail_for(&self, tenant: &str) {
        self.failing.lock().unwrap().insert(tenant.into());
    }

    pub fn unresolvable(&self, tenant: &str) {
        self.unresolvable.lock().unwrap().insert(tenant.into());
    }

    pub fn subscriber_gone(&self, subscriber_id: &str) {
        self.gone_subscribers.lock().unwrap().insert(subscriber_id.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles_for(&self, tenant: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.tenant_id.as_str() == tenant)
            .map(|s| s.title)
            .collect()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn resolve_destination(&self, tenant: &Tenant) -> Option<DestinationHandle> {
        if self.unresolvable.lock().unwrap().contains(&tenant.tenant_id) {
            return None;
        }
        Some(DestinationHandle {
            tenant_id: tenant.tenant_id.clone(),
            target: tenant.delivery_target.clone()?,
        })
    }

    async fn resolve_mention(&self, _tenant: &Tenant, subscriber: &SubscriberEntry) -> Option<String> {
        if self.gone_subscribers.lock().unwrap().contains(&subscriber.subscriber_id) {
            return None;
        }
        Some(format!("<@&{}>", subscriber.subscriber_id))
    }

    async fn send(
        &self,
        destination: &DestinationHandle,
        text: &str,
        payload: &NoticeMessage,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().unwrap().contains(&destination.tenant_id) {
            return Err(DeliveryError::Forbidden("missing permission".into()));
        }
        self.sent.lock().unwrap().push(Sent {
            tenant_id: destination.tenant_id.clone(),
            text: text.to_string(),
            title: payload.description.clone(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// In-memory wiring of every collaborator the engine needs.
pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub seen: Arc<MemorySeenNotices>,
    pub tenants: Arc<MemoryTenants>,
    pub subscribers: Arc<MemorySubscribers>,
    pub audit: Arc<MemoryAuditLog>,
    pub transport: Arc<RecordingTransport>,
    pub rebaseline: RebaselineFlag,
    pub pacing: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            source: Arc::new(ScriptedSource::default()),
            seen: Arc::new(MemorySeenNotices::new()),
            tenants: Arc::new(MemoryTenants::new()),
            subscribers: Arc::new(MemorySubscribers::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            transport: Arc::new(RecordingTransport::default()),
            rebaseline: RebaselineFlag::new(),
            pacing: Duration::ZERO,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn dispatcher(&self) -> FanoutDispatcher {
        FanoutDispatcher::new(
            self.tenants.clone(),
            self.subscribers.clone(),
            self.audit.clone(),
            self.transport.clone(),
        )
        .with_pacing(self.pacing)
    }

    /// A fresh detector over the shared stores, as after a process restart.
    pub fn detector(&self) -> ChangeDetector {
        ChangeDetector::new(
            self.source.clone(),
            self.seen.clone(),
            self.dispatcher(),
            self.rebaseline.clone(),
        )
    }

    pub async fn tenant(&self, id: &str, target: Option<&str>, enabled: bool) {
        let update = TenantUpdate {
            delivery_target: target.map(str::to_string),
            enabled: Some(enabled),
        };
        self.tenants.upsert(&id.into(), update).await.unwrap();
    }
}
