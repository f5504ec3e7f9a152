//! # Cycle Scheduler
//!
//! Drives the change detector on a fixed interval, forever, once the host has
//! reported ready.
//!
//! Startup is explicitly two-phase: `Scheduler::await_ready` blocks until the
//! host's `ReadySignal` fires and yields a `ReadyScheduler`, and only that type
//! can `run_forever`. A scheduler therefore cannot start polling early.
//!
//! While running, the loop multiplexes three inputs:
//!
//! - the interval tick, which runs a scheduled cycle;
//! - restart requests from any `SchedulerHandle`, which cut the current wait
//!   short, run a cycle immediately, and restart the interval from there;
//! - the broadcast shutdown signal.
//!
//! Cycles run inside the loop body, so at most one is ever in flight. Restart
//! requests that pile up while a cycle runs are drained together and served
//! by a single follow-up cycle. An error or a panic inside a cycle is logged
//! and the loop carries on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::core::cycle::{ChangeDetector, CycleOutcome, CycleStatus};

/// Result handed back to callers waiting on a manual run.
pub type CycleAck = Result<CycleOutcome, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("host went away before reporting ready")]
    HostGone,
    #[error("scheduler is not running")]
    NotRunning,
    #[error("scheduler dropped the request before answering")]
    NoResponse,
}

/// A restart request, optionally waiting for the cycle it triggers.
pub struct SchedulerRequest {
    pub responder: Option<oneshot::Sender<CycleAck>>,
}

/// Host side of the readiness gate.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }
}

/// Scheduler side of the readiness gate.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    rx: watch::Receiver<bool>,
}

impl ReadyGate {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// # Errors
    /// `SchedulerError::HostGone` when the signal is dropped without firing.
    pub async fn wait(&mut self) -> Result<(), SchedulerError> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| SchedulerError::HostGone)
    }
}

pub fn ready_channel() -> (ReadySignal, ReadyGate) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal { tx }, ReadyGate { rx })
}

/// Cloneable handle used to trigger cycles out of band.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerRequest>,
}

impl SchedulerHandle {
    /// Asks for an immediate cycle without waiting for it.
    pub fn restart(&self) -> Result<(), SchedulerError> {
        self.tx
            .send(SchedulerRequest { responder: None })
            .map_err(|_| SchedulerError::NotRunning)
    }

    /// Asks for an immediate cycle and waits for its result.
    pub async fn run_now(&self) -> Result<CycleAck, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest {
                responder: Some(tx),
            })
            .map_err(|_| SchedulerError::NotRunning)?;
        rx.await.map_err(|_| SchedulerError::NoResponse)
    }
}

/// A scheduler that has not yet seen the host become ready.
pub struct Scheduler {
    detector: ChangeDetector,
    interval: Duration,
    commands: mpsc::UnboundedReceiver<SchedulerRequest>,
}

impl Scheduler {
    pub fn new(detector: ChangeDetector, interval: Duration) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        (
            Self {
                detector,
                interval,
                commands,
            },
            SchedulerHandle { tx },
        )
    }

    pub fn status(&self) -> watch::Receiver<CycleStatus> {
        self.detector.status()
    }

    /// First phase: waits for the host, then hands back a runnable scheduler.
    pub async fn await_ready(self, mut gate: ReadyGate) -> Result<ReadyScheduler, SchedulerError> {
        gate.wait().await?;
        log::info!("event=scheduler status=ready interval_secs={}", self.interval.as_secs());
        Ok(ReadyScheduler { inner: self })
    }
}

/// A scheduler whose host has reported ready.
pub struct ReadyScheduler {
    inner: Scheduler,
}

impl ReadyScheduler {
    /// Second phase: runs cycles until `shutdown` fires.
    ///
    /// The first cycle starts immediately.
    pub async fn run_forever(self, mut shutdown: broadcast::Receiver<()>) {
        let Scheduler {
            mut detector,
            interval,
            mut commands,
        } = self.inner;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    log::info!("event=scheduler status=shutdown");
                    break;
                }
                Some(request) = commands.recv() => {
                    let mut responders: Vec<_> = request.responder.into_iter().collect();
                    let mut coalesced = 1;
                    while let Ok(extra) = commands.try_recv() {
                        responders.extend(extra.responder);
                        coalesced += 1;
                    }
                    log::info!("event=scheduler status=manual_run coalesced={}", coalesced);
                    run_guarded(&mut detector, responders).await;
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    run_guarded(&mut detector, Vec::new()).await;
                }
            }
        }
    }
}

/// Runs one cycle, containing errors and panics, and answers every waiter.
async fn run_guarded(detector: &mut ChangeDetector, responders: Vec<oneshot::Sender<CycleAck>>) {
    let ack: CycleAck = match AssertUnwindSafe(detector.run_cycle()).catch_unwind().await {
        Ok(Ok(outcome)) => {
            log::info!("event=cycle status=done outcome={}", outcome.label());
            Ok(outcome)
        }
        Ok(Err(e)) => {
            log::error!("event=cycle status=error error={}", e);
            Err(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::error!("event=cycle status=panicked error={}", message);
            Err(format!("cycle panicked: {}", message))
        }
    };

    for responder in responders {
        let _ = responder.send(ack.clone());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
