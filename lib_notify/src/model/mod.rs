//! # Domain Model
//!
//! Plain data types shared by the engine and its collaborators: notices
//! scraped from the source, tenants with their subscriber lists, and audit
//! entries.

/// Scraped notices and their persisted form.
pub mod notice;
/// Tenant settings, partial updates and subscriber entries.
pub mod tenant;
/// Audit trail entries.
pub mod audit;

pub use audit::{AuditAction, AuditEntry};
pub use notice::{Notice, NoticeError, SeenNotice, DATE_UNAVAILABLE};
pub use tenant::{SubscriberEntry, Tenant, TenantId, TenantUpdate};
