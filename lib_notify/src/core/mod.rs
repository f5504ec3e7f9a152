//! # Core Engine Module
//!
//! The change-detection and fan-out engine. Everything here depends only on
//! the repository, source and transport contracts, never on a concrete
//! backend.
//!
//! ## Core Components:
//!
//! - **`identity`**: content hashing of a notice's identifying fields.
//! - **`known_cache`**: the in-process mirror of persisted identities and the
//!   shared re-baseline flag.
//! - **`cycle`**: one poll pass (baseline or delta) and its typed outcome.
//! - **`dispatcher`**: paced, per-tenant isolated delivery of new notices.
//! - **`scheduler`**: the interval loop with ready gate, manual restarts and
//!   panic containment.
//! - **`admin`**: audited administrative operations.

#![forbid(unsafe_code)]

/// Audited tenant, subscriber and history operations.
pub mod admin;
/// One change-detection pass.
pub mod cycle;
/// Paced fan-out to tenants.
pub mod dispatcher;
/// Identity token derivation.
pub mod identity;
/// Known-identity cache and re-baseline flag.
pub mod known_cache;
/// Interval driver for the change detector.
pub mod scheduler;

pub use admin::{AdminError, NoticeAdmin};
pub use cycle::{ChangeDetector, CycleError, CycleOutcome, CycleState, CycleStatus};
pub use dispatcher::{DeliveryOutcome, DispatchSummary, FanoutDispatcher, TenantDelivery};
pub use identity::IdentityToken;
pub use known_cache::{KnownIdentityCache, RebaselineFlag};
pub use scheduler::{
    ready_channel, CycleAck, ReadyGate, ReadyScheduler, ReadySignal, Scheduler, SchedulerError,
    SchedulerHandle,
};
