//! # Notice Records
//!
//! A `Notice` is one published item scraped from the watched page. It is built
//! fresh on every fetch and never mutated afterwards; two notices describe the
//! same real-world publication iff their `IdentityToken`s are equal.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::core::identity::IdentityToken;

/// Label used when the page carries no recognisable publication date.
pub const DATE_UNAVAILABLE: &str = "Date unavailable";

/// Validation failures raised while building a `Notice`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoticeError {
    #[error("notice title must not be empty")]
    EmptyTitle,
    #[error("notice link `{0}` is not an absolute URL")]
    InvalidLink(String),
}

/// # Notice
///
/// An immutable record of one published notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    title: String,
    link: Url,
    published_label: String,
    identity: IdentityToken,
}

impl Notice {
    /// Builds a notice, trimming the title and deriving its identity.
    ///
    /// # Errors
    /// Returns `NoticeError::EmptyTitle` for blank titles and
    /// `NoticeError::InvalidLink` when `link` does not parse as an absolute
    /// http(s) URL.
    pub fn new(
        title: &str,
        link: &str,
        published_label: Option<&str>,
    ) -> Result<Self, NoticeError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(NoticeError::EmptyTitle);
        }

        let link = Url::parse(link.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| NoticeError::InvalidLink(link.to_string()))?;

        let published_label = published_label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(DATE_UNAVAILABLE)
            .to_string();

        let identity = IdentityToken::derive(title, link.as_str());

        Ok(Self {
            title: title.to_string(),
            link,
            published_label,
            identity,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn link(&self) -> &Url {
        &self.link
    }

    pub fn published_label(&self) -> &str {
        &self.published_label
    }

    pub fn identity(&self) -> &IdentityToken {
        &self.identity
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.title, self.link)
    }
}

/// A notice as persisted in the seen-notice store.
///
/// Created once, the first time its identity is observed, and only ever
/// removed by a full history reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenNotice {
    pub identity: IdentityToken,
    pub title: String,
    pub link: String,
    pub first_seen_at: DateTime<Utc>,
}

impl SeenNotice {
    /// Captures a freshly discovered notice with the current time.
    pub fn first_seen(notice: &Notice) -> Self {
        Self {
            identity: notice.identity().clone(),
            title: notice.title().to_string(),
            link: notice.link().to_string(),
            first_seen_at: Utc::now(),
        }
    }
}
