use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::U256;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::ledger::{Ledger, QueryKey};
use crate::model::amount::DecimalAmount;
use crate::model::state::Loadable;

/// Last known result of one query.
#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    value: Option<U256>,
    /// When the read behind `value` was issued.
    updated_at: Option<Instant>,
    /// Consecutive failed reads since the last success.
    failures: u32,
}

/// Caches contract reads by [`QueryKey`].
///
/// A failed read keeps the previous value and is retried on the next
/// refresh; errors never reach the consumer, only staleness does.
pub struct ContractReader {
    ledger: Arc<dyn Ledger>,
    entries: Mutex<BTreeMap<QueryKey, Entry>>,
}

impl ContractReader {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        ContractReader {
            ledger,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start tracking `keys`; already-tracked keys keep their values.
    pub fn track(&self, keys: &[QueryKey]) {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.entry(*key).or_default();
        }
    }

    pub fn untrack(&self, keys: &[QueryKey]) {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
    }

    fn tracked(&self) -> Vec<QueryKey> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn current(&self, key: &QueryKey) -> Loadable<U256> {
        self.entries
            .lock()
            .get(key)
            .and_then(|e| e.value)
            .into()
    }

    pub fn current_amount(&self, key: &QueryKey, scale: u8) -> Loadable<DecimalAmount> {
        self.current(key).map(|raw| DecimalAmount::new(raw, scale))
    }

    /// When the read that produced the current value of `key` was issued.
    pub fn updated_at(&self, key: &QueryKey) -> Option<Instant> {
        self.entries.lock().get(key).and_then(|e| e.updated_at)
    }

    pub fn failures(&self, key: &QueryKey) -> u32 {
        self.entries.lock().get(key).map(|e| e.failures).unwrap_or(0)
    }

    /// Read every tracked query.
    pub async fn refetch_all(&self) {
        let keys = self.tracked();
        self.refetch(&keys).await;
    }

    /// Read `keys` now. Untracked keys are tracked from here on.
    ///
    /// A result never replaces a value whose read was issued later, so a
    /// slow read cannot roll the cache back.
    pub async fn refetch(&self, keys: &[QueryKey]) {
        for key in keys {
            let issued_at = Instant::now();
            let result = self.ledger.read(key).await;
            let mut entries = self.entries.lock();
            let entry = entries.entry(*key).or_default();
            match result {
                Ok(_) if entry.updated_at.is_some_and(|at| at > issued_at) => {
                    debug!(?key, "dropping read overtaken by a newer one");
                }
                Ok(value) => {
                    entry.value = Some(value);
                    entry.updated_at = Some(issued_at);
                    entry.failures = 0;
                }
                Err(e) => {
                    entry.failures += 1;
                    if entry.failures == 1 {
                        warn!(?key, error = %e, "read failed, keeping last value");
                    } else {
                        debug!(?key, failures = entry.failures, "read still failing");
                    }
                }
            }
        }
    }
}
