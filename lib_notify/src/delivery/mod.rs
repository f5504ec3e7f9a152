//! # Delivery Transport
//!
//! The seam between the fan-out dispatcher and whatever actually carries a
//! message to a tenant. A transport resolves a tenant's configured target into
//! a live destination, turns subscriber entries into mention strings, and
//! sends one message per notice.
//!
//! ## Contained Modules:
//! - **`webhook`**: posts Discord-compatible webhook payloads over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{Notice, SubscriberEntry, Tenant, TenantId};

/// HTTP webhook transport.
#[cfg(feature = "retrieve")]
pub mod webhook;

/// Failures reported by a transport for a single send.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("destination rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("permission denied by destination: {0}")]
    Forbidden(String),
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// A resolved, live destination for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationHandle {
    pub tenant_id: TenantId,
    pub target: String,
}

/// Static text used when rendering a notice into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub heading: String,
    pub announcement: String,
    pub date_label: String,
    pub footer: String,
    /// RGB colour of the embed stripe.
    pub color: u32,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            heading: "📢 New notice".to_string(),
            announcement: "New notice published!".to_string(),
            date_label: "📅 Date".to_string(),
            footer: "Notice Watch".to_string(),
            color: 0x3498db,
        }
    }
}

impl MessageTemplate {
    /// Text line sent alongside the structured payload.
    pub fn text(&self, mentions: &str) -> String {
        if mentions.is_empty() {
            self.announcement.clone()
        } else {
            format!("{} {}", mentions, self.announcement)
        }
    }
}

/// One labelled value shown under the notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// # Notice Message
///
/// Structured payload describing one notice, serialised as an embed by the
/// webhook transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeMessage {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub fields: Vec<MessageField>,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl NoticeMessage {
    pub fn render(notice: &Notice, template: &MessageTemplate) -> Self {
        Self {
            title: template.heading.clone(),
            description: notice.title().to_string(),
            url: notice.link().to_string(),
            color: template.color,
            fields: vec![MessageField {
                name: template.date_label.clone(),
                value: notice.published_label().to_string(),
                inline: true,
            }],
            footer: template.footer.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Carries messages to tenant destinations.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Resolves the tenant's target into a live destination, or `None` when
    /// it cannot be reached in its current form.
    async fn resolve_destination(&self, tenant: &Tenant) -> Option<DestinationHandle>;

    /// Mention string for one subscriber, or `None` when it no longer resolves.
    async fn resolve_mention(&self, tenant: &Tenant, subscriber: &SubscriberEntry) -> Option<String>;

    async fn send(
        &self,
        destination: &DestinationHandle,
        text: &str,
        payload: &NoticeMessage,
    ) -> Result<(), DeliveryError>;
}
