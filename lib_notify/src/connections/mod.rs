//! # Connections Module
//!
//! Persistent connections to external services: the PostgreSQL pool and the
//! repository implementations that run on top of it.

/// PostgreSQL connection pooling, health checks and schema bootstrap.
pub mod db_postgres;

/// Repository contracts implemented over the PostgreSQL pool.
pub mod pg_repositories;

pub use db_postgres::{Database, DbError};
pub use pg_repositories::PgStore;
