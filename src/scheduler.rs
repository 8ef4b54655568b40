use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::ledger::QueryKey;
use crate::reader::ContractReader;

// ── Timer service ────────────────────────────────────────────────────

/// Owns every timer and interval the client runs. Each one is handed out
/// as a [`Subscription`]; dropping it cancels the timer, whatever path the
/// owner leaves by.
#[derive(Clone, Default)]
pub struct Scheduler {
    active: Arc<AtomicUsize>,
}

/// Live timer. Aborts its task on drop.
pub struct Subscription {
    name: &'static str,
    handle: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!(timer = self.name, "timer released");
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscriptions not yet dropped.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn track(&self, name: &'static str, handle: JoinHandle<()>) -> Subscription {
        self.active.fetch_add(1, Ordering::SeqCst);
        Subscription {
            name,
            handle,
            active: self.active.clone(),
        }
    }

    /// Run `tick` now and then every `period` until the subscription drops.
    pub fn every<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F) -> Subscription
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        self.track(name, handle)
    }

    /// Run `job` once after `delay` unless the subscription drops first.
    pub fn after<Fut>(&self, name: &'static str, delay: Duration, job: Fut) -> Subscription
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
        self.track(name, handle)
    }
}

// ── Reconciliation ───────────────────────────────────────────────────

/// Re-reads the queries a confirmed write touched at fixed offsets, to
/// absorb the lag between a receipt and the read path catching up. The
/// later read is not guaranteed to see the new state, only to retry.
pub struct ReconciliationScheduler {
    reader: Arc<ContractReader>,
    scheduler: Scheduler,
    offsets: Vec<Duration>,
    pending: Mutex<Vec<Subscription>>,
}

impl ReconciliationScheduler {
    pub fn new(reader: Arc<ContractReader>, scheduler: Scheduler, offsets: Vec<Duration>) -> Self {
        ReconciliationScheduler {
            reader,
            scheduler,
            offsets,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn on_operation_confirmed(&self, affected: Vec<QueryKey>) {
        if affected.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        pending.retain(|s| !s.is_finished());
        for offset in &self.offsets {
            let reader = self.reader.clone();
            let keys = affected.clone();
            let offset = *offset;
            pending.push(self.scheduler.after("reconcile", offset, async move {
                debug!(?offset, queries = keys.len(), "reconciliation read");
                reader.refetch(&keys).await;
            }));
        }
    }

    /// Scheduled re-reads not yet run.
    pub fn pending(&self) -> usize {
        self.pending.lock().iter().filter(|s| !s.is_finished()).count()
    }

    /// Drop every scheduled re-read.
    pub fn cancel_all(&self) {
        self.pending.lock().clear();
    }
}
