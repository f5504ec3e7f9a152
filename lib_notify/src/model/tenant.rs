//! # Tenants and Subscribers
//!
//! A tenant is one independently configured notification destination. Its
//! settings are changed through `TenantUpdate`, which only touches the fields
//! that are present.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// # Tenant
///
/// Per-destination settings as stored in the tenant registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub tenant_id: TenantId,
    /// Where notices are delivered. `None` until an administrator configures it.
    pub delivery_target: Option<String>,
    /// Tenants start disabled and are enabled by configuration.
    pub enabled: bool,
}

impl Tenant {
    /// A freshly observed tenant: disabled and without a target.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            delivery_target: None,
            enabled: false,
        }
    }

    /// An enabled tenant without a target is skipped, never treated as an error.
    pub fn is_deliverable(&self) -> bool {
        self.enabled && self.delivery_target.is_some()
    }
}

/// Partial tenant settings. Only the fields that are `Some` are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUpdate {
    pub delivery_target: Option<String>,
    pub enabled: Option<bool>,
}

impl TenantUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    /// Sets the target and enables the tenant in one step.
    pub fn configure(delivery_target: impl Into<String>) -> Self {
        Self {
            delivery_target: Some(delivery_target.into()),
            enabled: Some(true),
        }
    }

    /// Applies the present fields onto `tenant`, leaving the rest untouched.
    pub fn apply(self, tenant: Tenant) -> Tenant {
        Tenant {
            tenant_id: tenant.tenant_id,
            delivery_target: self.delivery_target.or(tenant.delivery_target),
            enabled: self.enabled.unwrap_or(tenant.enabled),
        }
    }
}

/// One entry on a tenant's mention list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberEntry {
    pub tenant_id: TenantId,
    pub subscriber_id: String,
    pub display_name: String,
    pub added_by: Option<String>,
    pub added_at: DateTime<Utc>,
}
