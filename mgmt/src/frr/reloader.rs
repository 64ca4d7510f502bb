// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Debounced and retrying delivery of configurations to the routing daemon.
//!
//! Reconciliation passes hand snapshots to a [`ReloadHandle`] and move on. A single task owns the
//! pending snapshot and a timer: bursts of snapshots are coalesced into one apply, failed applies
//! are retried, and a newer snapshot always supersedes the one being retried.

use crate::frr::ApplyError;
use config::internal::FrrConfig;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Something able to make the routing daemon run a configuration.
pub trait ConfigApplier: Send + Sync + 'static {
    fn apply(&self, config: &FrrConfig) -> impl Future<Output = Result<(), ApplyError>> + Send;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReloadEvent {
    /// A freshly compiled configuration.
    NewSnapshot(FrrConfig),
    /// Apply the pending configuration again, if there is one.
    ReuseLast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReloadTimers {
    /// Delay between the first event of a burst and the apply.
    pub quiet_period: Duration,
    /// Delay before retrying a failed apply.
    pub retry_period: Duration,
}

impl Default for ReloadTimers {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(3),
            retry_period: Duration::from_secs(5),
        }
    }
}

/// Sending side of the reload pipeline. Cheap to clone; the pipeline stops once every handle is
/// gone.
#[derive(Clone, Debug)]
pub struct ReloadHandle {
    events: mpsc::UnboundedSender<ReloadEvent>,
}

impl ReloadHandle {
    /// Queue an event. Returns false if the pipeline is gone.
    pub fn send(&self, event: ReloadEvent) -> bool {
        if self.events.send(event).is_err() {
            warn!("Reload pipeline is gone, dropping event");
            return false;
        }
        true
    }

    pub fn new_snapshot(&self, config: FrrConfig) -> bool {
        self.send(ReloadEvent::NewSnapshot(config))
    }

    pub fn reuse_last(&self) -> bool {
        self.send(ReloadEvent::ReuseLast)
    }
}

/// The task running the pipeline. Dropping it stops the pipeline.
#[derive(Debug)]
pub struct ReloadTask {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ReloadTask {
    /// Stop the pipeline. An apply in progress completes first.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.join.await {
            error!("Reload task failed: {e}");
        }
    }

    /// Wait for the pipeline to end on its own, once every handle is dropped.
    pub async fn finished(self) {
        let ReloadTask { stop, join } = self;
        if let Err(e) = join.await {
            error!("Reload task failed: {e}");
        }
        drop(stop);
    }
}

struct Coordinator<A> {
    applier: A,
    timers: ReloadTimers,
    pending: Option<FrrConfig>,
    deadline: Option<Instant>,
}

impl<A: ConfigApplier> Coordinator<A> {
    fn on_event(&mut self, event: ReloadEvent) {
        match event {
            ReloadEvent::ReuseLast if self.pending.is_none() => {
                debug!("Ignoring reload request: no config yet");
                return;
            }
            ReloadEvent::ReuseLast => {}
            ReloadEvent::NewSnapshot(config) if self.pending.as_ref() == Some(&config) => {
                debug!("Ignoring config: unchanged");
                return;
            }
            ReloadEvent::NewSnapshot(config) => self.pending = Some(config),
        }
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.timers.quiet_period);
        }
    }

    async fn fire(&mut self) {
        self.deadline = None;
        let Some(config) = &self.pending else {
            return;
        };
        match self.applier.apply(config).await {
            Ok(()) => info!("Applied frr config"),
            Err(e) => {
                error!(
                    "Failed to apply frr config: {e}; retrying in {:?}",
                    self.timers.retry_period
                );
                self.deadline = Some(Instant::now() + self.timers.retry_period);
            }
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ReloadEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            let deadline = self.deadline;
            let timer = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!("Reload pipeline stopped");
                    return;
                }
                // a due apply goes before queued events
                () = timer => self.fire().await,
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        debug!("Reload pipeline closed");
                        return;
                    }
                },
            }
        }
    }
}

/// Start the pipeline on the current tokio runtime.
pub fn start<A: ConfigApplier>(applier: A, timers: ReloadTimers) -> (ReloadHandle, ReloadTask) {
    let (events, queue) = mpsc::unbounded_channel();
    let (stop, stopped) = oneshot::channel();
    let coordinator = Coordinator {
        applier,
        timers,
        pending: None,
        deadline: None,
    };
    let join = tokio::spawn(coordinator.run(queue, stopped));
    (ReloadHandle { events }, ReloadTask { stop, join })
}

/// A handle with no pipeline behind it, for observing what gets queued.
#[cfg(test)]
pub(crate) fn detached() -> (ReloadHandle, mpsc::UnboundedReceiver<ReloadEvent>) {
    let (events, queue) = mpsc::unbounded_channel();
    (ReloadHandle { events }, queue)
}
