//! # Known-Identity Cache
//!
//! An in-process mirror of the identities held by the seen-notice store, so
//! the common "nothing new" cycle never needs a store round-trip.
//!
//! The cache is owned by the change detector and only ever touched from the
//! cycle task. Administrative resets never mutate it directly; they raise a
//! `RebaselineFlag` which the detector consumes at the start of its next run.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::identity::IdentityToken;
use crate::model::notice::Notice;

/// Set of identity tokens already persisted.
#[derive(Debug, Default)]
pub struct KnownIdentityCache {
    known: HashSet<IdentityToken>,
}

impl KnownIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set, typically with a fresh read from the store.
    pub fn replace(&mut self, identities: HashSet<IdentityToken>) {
        self.known = identities;
    }

    /// Adds identities that were just written to the store.
    pub fn remember<'a>(&mut self, notices: impl IntoIterator<Item = &'a Notice>) {
        self.known
            .extend(notices.into_iter().map(|notice| notice.identity().clone()));
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Notices whose identity is not cached, in their original order.
    ///
    /// Repeated identities within `notices` are collapsed to their first occurrence.
    pub fn unseen(&self, notices: &[Notice]) -> Vec<Notice> {
        unseen_in(&self.known, notices)
    }
}

/// Filters `notices` against an arbitrary known set, keeping source order and
/// dropping in-batch duplicates.
pub(crate) fn unseen_in(known: &HashSet<IdentityToken>, notices: &[Notice]) -> Vec<Notice> {
    let mut batch = HashSet::new();
    notices
        .iter()
        .filter(|notice| !known.contains(notice.identity()))
        .filter(|notice| batch.insert(notice.identity().clone()))
        .cloned()
        .collect()
}

/// # Rebaseline Flag
///
/// Shared "needs re-baseline" signal between administrative actions and the
/// cycle. Cloning shares the same underlying flag.
///
/// A new flag starts raised, so the very first cycle after startup always
/// performs a baseline pass.
#[derive(Debug, Clone)]
pub struct RebaselineFlag {
    pending: Arc<AtomicBool>,
}

impl Default for RebaselineFlag {
    fn default() -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl RebaselineFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a fresh baseline on the next cycle.
    pub fn request(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending request, returning whether one was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(title: &str) -> Notice {
        Notice::new(title, &format!("https://example.org/{title}.pdf"), None).unwrap()
    }

    #[test]
    fn unseen_keeps_order_and_skips_known() {
        let mut cache = KnownIdentityCache::new();
        cache.remember([&notice("b")]);

        let fetched = vec![notice("c"), notice("b"), notice("a")];
        let fresh = cache.unseen(&fetched);
        let titles: Vec<_> = fresh.iter().map(Notice::title).collect();
        assert_eq!(titles, vec!["c", "a"]);
    }

    #[test]
    fn unseen_collapses_duplicates_within_a_fetch() {
        let cache = KnownIdentityCache::new();
        let dated = Notice::new("a", "https://example.org/a.pdf", Some("Belém, 2 de maio de 2025"))
            .unwrap();
        let fetched = vec![dated, notice("a")];
        let fresh = cache.unseen(&fetched);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].published_label(), "Belém, 2 de maio de 2025");
    }

    #[test]
    fn flag_starts_raised_and_is_consumed_once() {
        let flag = RebaselineFlag::new();
        let shared = flag.clone();
        assert!(shared.take());
        assert!(!flag.take());

        flag.request();
        assert!(shared.is_pending());
        assert!(shared.take());
        assert!(!shared.is_pending());
    }
}
