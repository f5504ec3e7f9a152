//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by everything that talks to the network:
//! the notice page source reads through it, and the webhook transport posts
//! through it. Request building, retries, and status handling live here so
//! callers only deal with parsing and their own error mapping.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A retrying `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with exponential backoff on transient failures.

#![forbid(unsafe_code)]

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
