//! # Webhook Transport
//!
//! Delivers notices as Discord-compatible webhook posts. A tenant's delivery
//! target is the webhook URL itself; numeric subscriber ids are role
//! snowflakes and render as `<@&id>` mentions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{DeliveryError, DeliveryTransport, DestinationHandle, MessageField, NoticeMessage};
use crate::model::{SubscriberEntry, Tenant};
use crate::retrieve::ky_http::ApiClient;

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    url: &'a str,
    color: u32,
    fields: &'a [MessageField],
    footer: EmbedFooter<'a>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    embeds: [Embed<'a>; 1],
    allowed_mentions: AllowedMentions,
}

impl<'a> WebhookPayload<'a> {
    fn new(text: &'a str, message: &'a NoticeMessage) -> Self {
        Self {
            content: text,
            embeds: [Embed {
                title: &message.title,
                description: &message.description,
                url: &message.url,
                color: message.color,
                fields: &message.fields,
                footer: EmbedFooter {
                    text: &message.footer,
                },
                timestamp: message.timestamp.to_rfc3339(),
            }],
            allowed_mentions: AllowedMentions { parse: ["roles"] },
        }
    }
}

/// Parses a delivery target as an http(s) webhook URL.
fn webhook_url(target: &str) -> Option<Url> {
    Url::parse(target.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

/// Role mention for an all-digit subscriber id.
fn role_mention(subscriber_id: &str) -> Option<String> {
    let id = subscriber_id.trim();
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| format!("<@&{}>", id))
}

/// Posts each notice to the tenant's webhook through a retrying `ApiClient`.
pub struct WebhookTransport {
    client: Arc<ApiClient>,
}

impl WebhookTransport {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    async fn resolve_destination(&self, tenant: &Tenant) -> Option<DestinationHandle> {
        let target = tenant.delivery_target.as_deref()?;
        let url = webhook_url(target)?;
        Some(DestinationHandle {
            tenant_id: tenant.tenant_id.clone(),
            target: url.to_string(),
        })
    }

    async fn resolve_mention(&self, _tenant: &Tenant, subscriber: &SubscriberEntry) -> Option<String> {
        role_mention(&subscriber.subscriber_id)
    }

    async fn send(
        &self,
        destination: &DestinationHandle,
        text: &str,
        payload: &NoticeMessage,
    ) -> Result<(), DeliveryError> {
        let url = webhook_url(&destination.target).ok_or_else(|| DeliveryError::Rejected {
            status: 0,
            body: format!("invalid webhook url for tenant {}", destination.tenant_id),
        })?;

        let body = WebhookPayload::new(text, payload);
        let response = self
            .client
            .post_json(url, &body)
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        match response.status {
            _ if response.success => Ok(()),
            403 => Err(DeliveryError::Forbidden(response.error_body.unwrap_or_default())),
            status => Err(DeliveryError::Rejected {
                status,
                body: response.error_body.unwrap_or_default(),
            }),
        }
    }
}
