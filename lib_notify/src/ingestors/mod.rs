//! # Data Ingestors Module
//!
//! Sources of notices entering the engine. Every source implements
//! `SourceClient`, whose `fetch` never fails: ordinary network and parse
//! problems are logged by the source and reported as an empty batch, which
//! the change detector treats as "nothing to do this cycle".
//!
//! ## Contained Modules:
//! - **`notice_page`**: scrapes the accordion-style notices listing page.

#![forbid(unsafe_code)]

use async_trait::async_trait;

use crate::model::Notice;

/// Accordion listing page scraper.
#[cfg(feature = "retrieve")]
pub mod notice_page;

#[cfg(feature = "retrieve")]
pub use notice_page::NoticePageSource;

/// A finite, newest-first snapshot of the currently published notices.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self) -> Vec<Notice>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}
