//! # Change-Detection Cycle
//!
//! One poll pass over the source: fetch, diff against what is already known,
//! persist what is new, and hand it to the fan-out dispatcher.
//!
//! ## States
//!
//! - **Uninitialized**: the next pass is a baseline. Everything the source
//!   currently lists is persisted but never announced.
//! - **Steady**: the next pass is a delta. Only notices missing from the
//!   known-identity cache are persisted and dispatched.
//!
//! The detector moves from Uninitialized to Steady on the first baseline that
//! both fetches something and reaches the store. A raised `RebaselineFlag`
//! sends it back to Uninitialized at the start of the next pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::core::dispatcher::{DispatchSummary, FanoutDispatcher};
use crate::core::known_cache::{unseen_in, KnownIdentityCache, RebaselineFlag};
use crate::ingestors::SourceClient;
use crate::model::Notice;
use crate::repository::{RepoError, SeenNoticeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Uninitialized,
    Steady,
}

/// What a single pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source returned nothing while uninitialized; the baseline waits.
    BaselineDeferred,
    BaselineEstablished {
        fetched: usize,
        persisted: usize,
        known: usize,
    },
    /// The source returned nothing in steady state.
    SourceEmpty,
    NothingNew { fetched: usize },
    Dispatched {
        new: usize,
        summary: DispatchSummary,
    },
    /// New notices were found but could not be stored. They were neither
    /// cached nor dispatched and stay eligible for the next pass.
    PersistFailed { pending: usize, error: String },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BaselineDeferred => "baseline_deferred",
            Self::BaselineEstablished { .. } => "baseline_established",
            Self::SourceEmpty => "source_empty",
            Self::NothingNew { .. } => "nothing_new",
            Self::Dispatched { .. } => "dispatched",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    /// Reading or writing the store failed during a baseline pass. The
    /// detector stays uninitialized and retries on the next pass.
    #[error("baseline failed: {0}")]
    Baseline(#[source] RepoError),
}

/// Snapshot published after every pass, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatus {
    pub state: CycleState,
    pub known: usize,
    pub cycles_run: u64,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl Default for CycleStatus {
    fn default() -> Self {
        Self {
            state: CycleState::Uninitialized,
            known: 0,
            cycles_run: 0,
            last_outcome: None,
            last_error: None,
            last_run_at: None,
            last_delivery_at: None,
        }
    }
}

/// # Change Detector
///
/// Owns the known-identity cache. Only the task driving `run_cycle` ever
/// touches it, which is why `run_cycle` takes `&mut self`.
pub struct ChangeDetector {
    source: Arc<dyn SourceClient>,
    seen: Arc<dyn SeenNoticeStore>,
    dispatcher: FanoutDispatcher,
    cache: KnownIdentityCache,
    state: CycleState,
    rebaseline: RebaselineFlag,
    status: watch::Sender<CycleStatus>,
}

impl ChangeDetector {
    pub fn new(
        source: Arc<dyn SourceClient>,
        seen: Arc<dyn SeenNoticeStore>,
        dispatcher: FanoutDispatcher,
        rebaseline: RebaselineFlag,
    ) -> Self {
        let (status, _) = watch::channel(CycleStatus::default());
        Self {
            source,
            seen,
            dispatcher,
            cache: KnownIdentityCache::new(),
            state: CycleState::Uninitialized,
            rebaseline,
            status,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn known(&self) -> &KnownIdentityCache {
        &self.cache
    }

    pub fn rebaseline_flag(&self) -> RebaselineFlag {
        self.rebaseline.clone()
    }

    /// Receiver for the status snapshot published after each pass.
    pub fn status(&self) -> watch::Receiver<CycleStatus> {
        self.status.subscribe()
    }

    /// # Run Cycle
    ///
    /// Performs one pass. Scheduled runs and manual checks both come through
    /// here.
    ///
    /// # Errors
    /// Only storage failures during a baseline are errors. Everything else,
    /// including a failed write in steady state, is reported as an outcome.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        if self.rebaseline.take() && self.state == CycleState::Steady {
            log::info!("event=cycle status=rebaseline_requested");
            self.state = CycleState::Uninitialized;
            self.cache.clear();
        }

        let result = match self.state {
            CycleState::Uninitialized => self.baseline().await,
            CycleState::Steady => Ok(self.delta().await),
        };

        self.publish(&result);
        result
    }

    async fn baseline(&mut self) -> Result<CycleOutcome, CycleError> {
        log::info!("event=baseline status=start source={}", self.source.name());
        let fetched = self.source.fetch().await;
        if fetched.is_empty() {
            log::warn!("event=baseline status=deferred reason=source_empty");
            return Ok(CycleOutcome::BaselineDeferred);
        }

        let known = self.seen.all_identities().await.map_err(CycleError::Baseline)?;
        let fresh = unseen_in(&known, &fetched);
        let persisted = if fresh.is_empty() {
            0
        } else {
            self.seen
                .insert_if_absent(&fresh)
                .await
                .map_err(CycleError::Baseline)?
        };

        let reloaded = self.seen.all_identities().await.map_err(CycleError::Baseline)?;
        self.cache.replace(reloaded);
        self.state = CycleState::Steady;

        log::info!(
            "event=baseline status=established fetched={} persisted={} known={}",
            fetched.len(),
            persisted,
            self.cache.len()
        );
        Ok(CycleOutcome::BaselineEstablished {
            fetched: fetched.len(),
            persisted,
            known: self.cache.len(),
        })
    }

    async fn delta(&mut self) -> CycleOutcome {
        let fetched = self.source.fetch().await;
        if fetched.is_empty() {
            log::warn!("event=cycle status=source_empty source={}", self.source.name());
            return CycleOutcome::SourceEmpty;
        }

        let fresh: Vec<Notice> = self.cache.unseen(&fetched);
        if fresh.is_empty() {
            log::debug!("event=cycle status=nothing_new fetched={}", fetched.len());
            return CycleOutcome::NothingNew {
                fetched: fetched.len(),
            };
        }

        log::info!("event=cycle status=new_notices count={}", fresh.len());

        if let Err(e) = self.seen.insert_if_absent(&fresh).await {
            log::error!(
                "event=cycle status=persist_failed pending={} error={}",
                fresh.len(),
                e
            );
            return CycleOutcome::PersistFailed {
                pending: fresh.len(),
                error: e.to_string(),
            };
        }
        self.cache.remember(&fresh);

        let summary = self.dispatcher.dispatch(&fresh).await;
        CycleOutcome::Dispatched {
            new: fresh.len(),
            summary,
        }
    }

    fn publish(&self, result: &Result<CycleOutcome, CycleError>) {
        let state = self.state;
        let known = self.cache.len();
        self.status.send_modify(|status| {
            let now = Utc::now();
            status.state = state;
            status.known = known;
            status.cycles_run += 1;
            status.last_run_at = Some(now);
            match result {
                Ok(outcome) => {
                    status.last_outcome = Some(outcome.label().to_string());
                    status.last_error = match outcome {
                        CycleOutcome::PersistFailed { error, .. } => Some(error.clone()),
                        _ => None,
                    };
                    if let CycleOutcome::Dispatched { summary, .. } = outcome {
                        if summary.total_delivered() > 0 {
                            status.last_delivery_at = Some(now);
                        }
                    }
                }
                Err(e) => {
                    status.last_outcome = Some("error".to_string());
                    status.last_error = Some(e.to_string());
                }
            }
        });
    }
}
