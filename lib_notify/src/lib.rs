//! # lib_notify
//!
//! Change-detection and fan-out notification engine. A scheduler re-samples a
//! notice source on a fixed interval, the change detector persists whatever
//! is new exactly once, and the dispatcher delivers it to every enabled tenant
//! with paced, per-tenant isolated sends.
//!
//! The engine core is always built. Optional features add the concrete
//! collaborators:
//!
//! - **`retrieve`**: HTTP client, notice page scraper and webhook transport.
//! - **`connections`**: PostgreSQL pool and repositories.

pub mod configs;
pub mod core;
pub mod delivery;
pub mod ingestors;
pub mod model;
pub mod repository;

#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "retrieve")]
pub mod retrieve;

pub use configs::{ConfigError, EngineSettings};
pub use self::core::{
    ready_channel, ChangeDetector, CycleOutcome, CycleState, CycleStatus, FanoutDispatcher,
    NoticeAdmin, RebaselineFlag, Scheduler, SchedulerHandle,
};
pub use model::{Notice, Tenant, TenantId};
