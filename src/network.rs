use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::state::NetworkState;
use crate::scheduler::{Scheduler, Subscription};

/// The wallet side of the connection: which chain it is on, and a way to
/// ask it to move.
#[async_trait]
pub trait WalletSession: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// Ask the wallet to switch. The user may decline.
    async fn switch_chain(&self, chain_id: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Correct,
    Wrong,
    Switching,
}

#[derive(Default)]
struct Inner {
    current: Option<u64>,
    switching: bool,
    /// Armed switch, waiting out the settle delay or in flight.
    pending: Option<Subscription>,
    last_error: Option<String>,
}

struct Shared {
    wallet: Arc<dyn WalletSession>,
    target: u64,
    inner: Mutex<Inner>,
}

/// Keeps the wallet on the target chain.
///
/// Each distinct mismatching chain id arms one switch request after the
/// settle delay. A declined switch is not retried until the wallet reports
/// a different chain.
pub struct NetworkReconciler {
    shared: Arc<Shared>,
    settle: Duration,
    scheduler: Scheduler,
}

impl NetworkReconciler {
    pub fn new(wallet: Arc<dyn WalletSession>, target: u64, settle: Duration, scheduler: Scheduler) -> Self {
        NetworkReconciler {
            shared: Arc::new(Shared {
                wallet,
                target,
                inner: Mutex::new(Inner::default()),
            }),
            settle,
            scheduler,
        }
    }

    pub fn target(&self) -> u64 {
        self.shared.target
    }

    pub fn status(&self) -> NetworkStatus {
        let inner = self.shared.inner.lock();
        if inner.switching {
            NetworkStatus::Switching
        } else if inner.current == Some(self.shared.target) {
            NetworkStatus::Correct
        } else {
            NetworkStatus::Wrong
        }
    }

    pub fn state(&self) -> NetworkState {
        let inner = self.shared.inner.lock();
        NetworkState {
            current_chain_id: inner.current,
            target_chain_id: self.shared.target,
            is_switching: inner.switching,
        }
    }

    /// Why the last switch attempt failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.shared.inner.lock().last_error.clone()
    }

    /// Wallet connected, disconnected (`None`) or changed chain.
    pub fn on_chain_changed(&self, chain_id: Option<u64>) {
        let mut inner = self.shared.inner.lock();
        if inner.current == chain_id {
            return;
        }
        debug!(from = ?inner.current, to = ?chain_id, "wallet chain changed");
        inner.current = chain_id;
        inner.pending = None;
        inner.switching = false;

        match chain_id {
            Some(id) if id != self.shared.target => {
                info!(chain_id = id, target = self.shared.target, "wrong network, switch scheduled");
                let shared = self.shared.clone();
                inner.pending = Some(self.scheduler.after("network-switch", self.settle, async move {
                    let _ = request_switch(&shared).await;
                }));
            }
            Some(_) => inner.last_error = None,
            None => {}
        }
    }

    /// Read the wallet's chain id and feed it through `on_chain_changed`.
    pub async fn poll_wallet(&self) -> Result<u64> {
        match self.shared.wallet.chain_id().await {
            Ok(id) => {
                self.on_chain_changed(Some(id));
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "wallet chain id unavailable");
                Err(e)
            }
        }
    }

    /// Manual switch, bypassing the settle delay.
    pub async fn switch_to_local(&self) -> Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.switching {
                debug!("switch already in flight");
                return Ok(());
            }
            inner.pending = None;
        }
        request_switch(&self.shared).await
    }
}

async fn request_switch(shared: &Shared) -> Result<()> {
    shared.inner.lock().switching = true;
    let result = shared.wallet.switch_chain(shared.target).await;

    match result {
        Ok(()) => {
            let now = shared.wallet.chain_id().await.unwrap_or(shared.target);
            info!(chain_id = now, "network switched");
            let mut inner = shared.inner.lock();
            inner.switching = false;
            inner.current = Some(now);
            inner.last_error = None;
            Ok(())
        }
        Err(e) => {
            warn!(target = shared.target, error = %e, "network switch failed");
            let mut inner = shared.inner.lock();
            inner.switching = false;
            inner.last_error = Some(e.to_string());
            Err(e)
        }
    }
}
