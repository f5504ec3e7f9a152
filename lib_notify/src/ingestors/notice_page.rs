//! # Notice Page Source
//!
//! Polls the public notices listing and turns its accordion sections into
//! `Notice` records.
//!
//! Each section has a toggle button whose text is the notice title and whose
//! `data-bs-target` attribute names the id of the section body. The body holds
//! the download link and, usually, a `Belém, D de Mês de YYYY` date line.
//!
//! Extraction is pattern based and deliberately forgiving: a section that
//! cannot produce a valid notice is logged and skipped, and any network or
//! status failure yields an empty batch instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use super::SourceClient;
use crate::model::Notice;
use crate::retrieve::ky_http::ApiClient;

/// Path fragment shared by every downloadable notice file.
const FILES_FRAGMENT: &str = "/sites/default/files/editais/";

/// Default upper bound on notices returned per fetch.
pub const DEFAULT_MAX_NOTICES: usize = 20;

/// Compiled extraction patterns.
struct PagePatterns {
    button: Regex,
    target: Regex,
    class: Regex,
    tag: Regex,
    file_href: Regex,
    numbered_title: Regex,
    date: Regex,
}

impl PagePatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            button: Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button>")?,
            target: Regex::new(r#"(?i)data-bs-target\s*=\s*["']#?([^"']+)["']"#)?,
            class: Regex::new(r#"(?i)class\s*=\s*["'][^"']*\baccordion-button\b"#)?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            file_href: Regex::new(&format!(
                r#"(?i)<a\b[^>]*href\s*=\s*["']([^"']*{}[^"']*)["']"#,
                regex::escape(FILES_FRAGMENT)
            ))?,
            numbered_title: Regex::new(r"(?i)Edital\s*(\d+)-(\d{4})")?,
            date: Regex::new(r"Belém, \d+ de \w+ de \d{4}")?,
        })
    }
}

/// A raw accordion section before validation.
#[derive(Debug)]
struct Section {
    title: String,
    body: String,
}

/// Scrapes notices from the configured listing page.
pub struct NoticePageSource {
    client: Arc<ApiClient>,
    patterns: PagePatterns,
    max_notices: usize,
}

impl NoticePageSource {
    /// Builds a source reading `client`'s base URL.
    ///
    /// # Errors
    /// Only fails if an extraction pattern does not compile.
    pub fn new(client: Arc<ApiClient>, max_notices: usize) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            patterns: PagePatterns::new()?,
            max_notices,
        })
    }

    /// Extracts notices from a listing page, preserving page order.
    pub fn parse_html(&self, html: &str) -> Vec<Notice> {
        let origin = self.client.base_url();
        let mut notices = Vec::new();

        for section in self.sections(html) {
            let Some(link) = self.link_for(&section, origin) else {
                log::warn!(
                    "event=notice_parse status=skipped reason=no_link title={:?}",
                    section.title
                );
                continue;
            };

            let text = self.plain_text(&section.body);
            let date = self.patterns.date.find(&text).map(|m| m.as_str());

            match Notice::new(&section.title, link.as_str(), date) {
                Ok(notice) => notices.push(notice),
                Err(e) => log::warn!(
                    "event=notice_parse status=invalid title={:?} error={}",
                    section.title,
                    e
                ),
            }
        }

        if notices.is_empty() {
            log::warn!("event=notice_parse status=empty reason=no_accordion_sections");
        } else {
            log::info!("event=notice_parse status=ok parsed={}", notices.len());
        }

        notices.truncate(self.max_notices);
        notices
    }

    /// Pairs every accordion toggle with the body it controls.
    ///
    /// A body runs from the element carrying the target id up to the start of
    /// the next accordion toggle, or the end of the page.
    fn sections(&self, html: &str) -> Vec<Section> {
        let buttons: Vec<_> = self
            .patterns
            .button
            .captures_iter(html)
            .filter_map(|caps| {
                let attrs = caps.get(1)?.as_str();
                if !self.patterns.class.is_match(attrs) {
                    return None;
                }
                let target = self.patterns.target.captures(attrs)?.get(1)?.as_str().to_string();
                let title = self.plain_text(caps.get(2)?.as_str());
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), target, title))
            })
            .collect();

        let mut sections = Vec::with_capacity(buttons.len());
        for (idx, (_, after, target, title)) in buttons.iter().enumerate() {
            let Some(start) = find_id_attr(&html[*after..], target).map(|pos| after + pos) else {
                log::debug!("event=notice_parse status=skipped reason=no_body target={}", target);
                continue;
            };
            let end = buttons
                .iter()
                .skip(idx + 1)
                .map(|(next_start, _, _, _)| *next_start)
                .find(|next_start| *next_start > start)
                .unwrap_or(html.len());

            sections.push(Section {
                title: title.clone(),
                body: html[start..end].to_string(),
            });
        }
        sections
    }

    fn link_for(&self, section: &Section, origin: &Url) -> Option<Url> {
        let href = self
            .patterns
            .file_href
            .captures(&section.body)
            .and_then(|caps| caps.get(1))
            .map(|m| decode_entities(m.as_str()));

        let raw = match href {
            Some(href) => href,
            None => {
                let caps = self.patterns.numbered_title.captures(&section.title)?;
                format!("{}edital{}{}.pdf", FILES_FRAGMENT, &caps[1], &caps[2])
            }
        };

        origin.join(&raw).ok()
    }

    /// Tag-stripped, entity-decoded text with collapsed whitespace.
    fn plain_text(&self, fragment: &str) -> String {
        let stripped = self.patterns.tag.replace_all(fragment, " ");
        decode_entities(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl SourceClient for NoticePageSource {
    async fn fetch(&self) -> Vec<Notice> {
        let response = match self.client.fetch_text("").await {
            Ok(response) => response,
            Err(e) => {
                log::error!("event=source_fetch status=error error={}", e);
                return Vec::new();
            }
        };

        match response.data {
            Some(html) if response.success => self.parse_html(&html),
            _ => {
                log::error!("event=source_fetch status=http_error code={}", response.status);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        self.client.base_url().as_str()
    }
}

/// Position of `id="target"` or `id='target'`, whichever comes first.
fn find_id_attr(html: &str, target: &str) -> Option<usize> {
    let double = html.find(&format!("id=\"{}\"", target));
    let single = html.find(&format!("id='{}'", target));
    match (double, single) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
