//! The vault client as one explicit context object.
//!
//! [`VaultStore`] owns every piece of client state: the read cache, one
//! tracker per operation kind, the deposit flow, network and liveness. A
//! presentation layer reads [`VaultSnapshot`]s and calls the action methods;
//! it never mutates state directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::accounting::{
    SharePrice, compute_available_profit, compute_share_price, default_yield_amount, preview_assets,
    preview_shares,
};
use crate::config::{AddressBook, RuntimeConfig, Timings};
use crate::donation::compute_donation_metrics;
use crate::error::{Result, VaultError};
use crate::ledger::{Ledger, QueryKey, ReadCall, WriteCall};
use crate::liveness::{LivenessMonitor, LivenessProbe, LivenessStatus};
use crate::model::amount::{ASSET_DECIMALS, DecimalAmount, SHARE_DECIMALS};
use crate::model::operation::{OperationKind, PendingOperation};
use crate::model::state::{Loadable, VaultGlobalState, VaultPosition, VaultSnapshot};
use crate::network::{NetworkReconciler, WalletSession};
use crate::orchestrator::{ApprovalDepositOrchestrator, DepositPhase};
use crate::reader::ContractReader;
use crate::scheduler::{ReconciliationScheduler, Scheduler, Subscription};
use crate::tracker::TransactionTracker;

// ── Query keys ───────────────────────────────────────────────────────

/// Every query the store reads, derived once from the address book.
#[derive(Debug, Clone)]
struct Queries {
    total_assets: QueryKey,
    total_supply: QueryKey,
    watermark: QueryKey,
    /// Per-user reads; `None` without a connected account.
    user: Option<UserQueries>,
    recipients: Vec<QueryKey>,
}

#[derive(Debug, Clone, Copy)]
struct UserQueries {
    asset_balance: QueryKey,
    share_balance: QueryKey,
    allowance: QueryKey,
}

impl Queries {
    fn new(book: &AddressBook, account: Option<Address>) -> Self {
        Queries {
            total_assets: QueryKey::new(book.vault, ReadCall::TotalAssets),
            total_supply: QueryKey::new(book.vault, ReadCall::TotalSupply),
            watermark: QueryKey::new(book.vault, ReadCall::LastRecordedAssets),
            user: account.map(|owner| UserQueries {
                asset_balance: QueryKey::new(book.stable_token, ReadCall::BalanceOf(owner)),
                share_balance: QueryKey::new(book.vault, ReadCall::BalanceOf(owner)),
                allowance: QueryKey::new(
                    book.stable_token,
                    ReadCall::Allowance { owner, spender: book.vault },
                ),
            }),
            recipients: book
                .recipients
                .iter()
                .map(|r| QueryKey::new(book.stable_token, ReadCall::BalanceOf(r.address)))
                .collect(),
        }
    }

    fn all(&self) -> Vec<QueryKey> {
        let mut keys = vec![self.total_assets, self.total_supply, self.watermark];
        if let Some(u) = &self.user {
            keys.extend([u.asset_balance, u.share_balance, u.allowance]);
        }
        keys.extend(self.recipients.iter().copied());
        keys
    }
}

/// Lower bound for the watermark after a confirmed harvest, applied to
/// reads taken before the confirmation.
#[derive(Debug, Clone, Copy)]
struct WatermarkFloor {
    confirmed_at: Instant,
    floor: DecimalAmount,
}

// ── Store ────────────────────────────────────────────────────────────

pub struct VaultStore {
    book: AddressBook,
    account: Option<Address>,
    timings: Timings,
    scheduler: Scheduler,
    queries: Queries,
    reader: Arc<ContractReader>,
    reconciler: Arc<ReconciliationScheduler>,
    trackers: BTreeMap<OperationKind, Arc<TransactionTracker>>,
    deposit_flow: ApprovalDepositOrchestrator,
    network: Arc<NetworkReconciler>,
    liveness: Arc<LivenessMonitor>,
    probe: Option<LivenessProbe>,
    watermark_floor: Mutex<Option<WatermarkFloor>>,
}

/// Keeps polling alive while held. Dropping it stops every interval and
/// any scheduled reconciliation reads.
pub struct ActiveView {
    subscriptions: Vec<Subscription>,
    reconciler: Arc<ReconciliationScheduler>,
}

impl ActiveView {
    pub fn timers(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for ActiveView {
    fn drop(&mut self) {
        self.reconciler.cancel_all();
    }
}

impl VaultStore {
    pub fn new(ledger: Arc<dyn Ledger>, wallet: Arc<dyn WalletSession>, config: &RuntimeConfig) -> Self {
        let scheduler = Scheduler::new();
        let timings = config.timings.clone();
        let book = config.addresses.clone();
        let queries = Queries::new(&book, config.account);

        let reader = Arc::new(ContractReader::new(ledger.clone()));
        reader.track(&queries.all());
        let reconciler = Arc::new(ReconciliationScheduler::new(
            reader.clone(),
            scheduler.clone(),
            timings.reconcile_offsets.clone(),
        ));

        let trackers: BTreeMap<_, _> = OperationKind::ALL
            .iter()
            .map(|&kind| {
                let tracker = TransactionTracker::new(
                    kind,
                    ledger.clone(),
                    scheduler.clone(),
                    timings.receipt_policy,
                    timings.terminal_grace,
                );
                (kind, Arc::new(tracker))
            })
            .collect();

        let deposit_affected = match &queries.user {
            Some(u) => vec![
                u.asset_balance,
                u.share_balance,
                u.allowance,
                queries.total_assets,
                queries.total_supply,
            ],
            None => vec![queries.total_assets, queries.total_supply],
        };
        let deposit_flow = ApprovalDepositOrchestrator::new(
            trackers[&OperationKind::Approve].clone(),
            trackers[&OperationKind::Deposit].clone(),
            reconciler.clone(),
            scheduler.clone(),
            book.clone(),
            deposit_affected,
            &timings,
        );

        let network = Arc::new(NetworkReconciler::new(
            wallet,
            config.chain.chain_id(),
            timings.network_settle,
            scheduler.clone(),
        ));
        let liveness = Arc::new(LivenessMonitor::new(config.chain.chain_id(), timings.liveness_failures));

        VaultStore {
            book,
            account: config.account,
            timings,
            scheduler,
            queries,
            reader,
            reconciler,
            trackers,
            deposit_flow,
            network,
            liveness,
            probe: None,
            watermark_floor: Mutex::new(None),
        }
    }

    /// Probe node liveness over raw JSON-RPC while a view is active.
    pub fn with_liveness_probe(mut self, probe: LivenessProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn addresses(&self) -> &AddressBook {
        &self.book
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn network(&self) -> &NetworkReconciler {
        &self.network
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    pub fn deposit_phase(&self) -> DepositPhase {
        self.deposit_flow.phase()
    }

    /// Start polling. Everything stops when the returned view drops.
    pub fn activate(&self) -> ActiveView {
        let reader = self.reader.clone();
        let network = self.network.clone();
        let mut subscriptions = vec![self.scheduler.every("poll", self.timings.poll_interval, move || {
            let reader = reader.clone();
            let network = network.clone();
            async move {
                reader.refetch_all().await;
                let _ = network.poll_wallet().await;
            }
        })];
        if let Some(probe) = &self.probe {
            subscriptions.push(self.liveness.start(
                probe.clone(),
                &self.scheduler,
                self.timings.liveness_interval,
            ));
        }
        ActiveView {
            subscriptions,
            reconciler: self.reconciler.clone(),
        }
    }

    /// One manual refresh of every query plus the wallet's chain.
    pub async fn refresh(&self) {
        self.reader.refetch_all().await;
        let _ = self.network.poll_wallet().await;
    }

    pub async fn probe_liveness(&self) -> Option<LivenessStatus> {
        let probe = self.probe.as_ref()?;
        Some(self.liveness.record(probe.chain_id().await))
    }

    // ── Snapshot ──

    pub fn snapshot(&self) -> VaultSnapshot {
        let q = &self.queries;
        let total_assets = self.reader.current_amount(&q.total_assets, ASSET_DECIMALS);
        let total_supply = self.reader.current_amount(&q.total_supply, SHARE_DECIMALS);
        let watermark = self.observed_watermark();

        let position = match &q.user {
            Some(u) => VaultPosition {
                asset_balance: self.reader.current_amount(&u.asset_balance, ASSET_DECIMALS),
                share_balance: self.reader.current_amount(&u.share_balance, SHARE_DECIMALS),
                allowance: self.reader.current_amount(&u.allowance, ASSET_DECIMALS),
            },
            None => VaultPosition::not_loaded(),
        };

        let share_price = both(&total_assets, &total_supply)
            .map(|(assets, supply)| compute_share_price(&assets, &supply));
        let available_profit =
            both(&total_assets, &watermark).map(|(assets, wm)| compute_available_profit(&assets, &wm));
        let position_value =
            both(&position.share_balance, &share_price).map(|(shares, price)| preview_assets(&shares, &price));

        let balances: Option<Vec<DecimalAmount>> = q
            .recipients
            .iter()
            .map(|k| self.reader.current_amount(k, ASSET_DECIMALS).as_option().copied())
            .collect();
        let donations = match (balances, available_profit.as_option()) {
            (Some(balances), Some(profit)) => {
                Loadable::Loaded(compute_donation_metrics(&self.book.recipients, &balances, profit))
            }
            _ => Loadable::NotYetLoaded,
        };

        VaultSnapshot {
            global: VaultGlobalState {
                total_assets,
                total_supply,
                watermark,
            },
            position,
            share_price,
            available_profit,
            position_value,
            donations,
            operations: self.operations(),
            network: self.network.state(),
            liveness: self.liveness.status(),
            deposit_busy: self.deposit_flow.is_busy(),
        }
    }

    pub fn operations(&self) -> Vec<PendingOperation> {
        self.trackers.values().map(|t| t.snapshot()).collect()
    }

    pub fn operation(&self, kind: OperationKind) -> PendingOperation {
        self.trackers[&kind].snapshot()
    }

    /// The caller has shown the terminal state of `kind`.
    pub fn acknowledge(&self, kind: OperationKind) {
        self.trackers[&kind].acknowledge();
    }

    fn observed_watermark(&self) -> Loadable<DecimalAmount> {
        let key = self.queries.watermark;
        let read = self.reader.current_amount(&key, ASSET_DECIMALS);
        let Some(floor) = *self.watermark_floor.lock() else {
            return read;
        };
        let stale = match self.reader.updated_at(&key) {
            Some(at) => at < floor.confirmed_at,
            None => true,
        };
        if !stale {
            return read;
        }
        match read {
            Loadable::Loaded(wm) => Loadable::Loaded(wm.max(floor.floor)),
            Loadable::NotYetLoaded => Loadable::Loaded(floor.floor),
        }
    }

    // ── Actions ──

    pub async fn approve(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let amount = positive(amount, ASSET_DECIMALS)?;
        let call = WriteCall::Approve {
            token: self.book.stable_token,
            spender: self.book.vault,
            amount: amount.raw(),
        };
        self.execute(call, vec![user.allowance]).await
    }

    /// Approve when the allowance is short, then deposit.
    pub async fn deposit(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let account = self.account.ok_or(VaultError::NotConnected)?;
        if self.deposit_flow.is_busy() {
            return Err(VaultError::Busy(OperationKind::Deposit));
        }
        let amount = DecimalAmount::parse(amount, ASSET_DECIMALS)?;
        let balance = self.require(&user.asset_balance, ASSET_DECIMALS).await?;
        let allowance = self.require(&user.allowance, ASSET_DECIMALS).await?;
        self.deposit_flow.run(amount, allowance, balance, account).await
    }

    /// Deposit against the allowance already granted; never approves.
    pub async fn deposit_approved(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let account = self.account.ok_or(VaultError::NotConnected)?;
        if self.deposit_flow.is_busy() {
            return Err(VaultError::Busy(OperationKind::Deposit));
        }
        let amount = positive(amount, ASSET_DECIMALS)?;
        let balance = self.require(&user.asset_balance, ASSET_DECIMALS).await?;
        if amount > balance {
            return Err(VaultError::InsufficientFunds {
                requested: amount.to_string(),
                available: balance.to_string(),
            });
        }
        let allowance = self.require(&user.allowance, ASSET_DECIMALS).await?;
        if amount > allowance {
            return Err(VaultError::InsufficientAllowance {
                requested: amount.to_string(),
                approved: allowance.to_string(),
            });
        }
        let call = WriteCall::Deposit {
            vault: self.book.vault,
            assets: amount.raw(),
            receiver: account,
        };
        let mut affected = self.position_queries(&user);
        affected.push(user.allowance);
        self.execute(call, affected).await
    }

    /// Withdraw `amount` of stable asset, burning whatever shares it takes.
    pub async fn withdraw(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let account = self.account.ok_or(VaultError::NotConnected)?;
        let amount = positive(amount, ASSET_DECIMALS)?;
        let available = self.max_withdraw().await?;
        if amount > available {
            return Err(VaultError::InsufficientFunds {
                requested: amount.to_string(),
                available: available.to_string(),
            });
        }
        let call = WriteCall::Withdraw {
            vault: self.book.vault,
            assets: amount.raw(),
            receiver: account,
            owner: account,
        };
        self.execute(call, self.position_queries(&user)).await
    }

    /// Redeem an exact number of shares.
    pub async fn redeem(&self, shares: &str) -> Result<TxHash> {
        let user = self.user()?;
        let shares = positive(shares, SHARE_DECIMALS)?;
        self.redeem_shares(&user, shares).await
    }

    /// Redeem the shares worth `amount` of stable asset at the current price.
    pub async fn redeem_assets(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let amount = positive(amount, ASSET_DECIMALS)?;
        let price = self.share_price().await?;
        let shares = preview_shares(&amount, &price);
        self.redeem_shares(&user, shares).await
    }

    async fn redeem_shares(&self, user: &UserQueries, shares: DecimalAmount) -> Result<TxHash> {
        let account = self.account.ok_or(VaultError::NotConnected)?;
        let held = self.require(&user.share_balance, SHARE_DECIMALS).await?;
        if shares > held {
            return Err(VaultError::InsufficientFunds {
                requested: shares.to_string(),
                available: held.to_string(),
            });
        }
        let call = WriteCall::Redeem {
            vault: self.book.vault,
            shares: shares.raw(),
            receiver: account,
            owner: account,
        };
        self.execute(call, self.position_queries(user)).await
    }

    /// Move profit above the watermark to the donation router.
    pub async fn harvest(&self) -> Result<TxHash> {
        let q = &self.queries;
        let assets = self.require(&q.total_assets, ASSET_DECIMALS).await?;
        let watermark = match self.observed_watermark() {
            Loadable::Loaded(wm) => wm,
            Loadable::NotYetLoaded => self.require(&q.watermark, ASSET_DECIMALS).await?,
        };
        if compute_available_profit(&assets, &watermark).is_zero() {
            return Err(VaultError::NothingToHarvest);
        }

        let mut affected = vec![q.total_assets, q.watermark];
        affected.extend(q.recipients.iter().copied());
        let hash = self.execute(WriteCall::Harvest { vault: self.book.vault }, affected).await?;

        *self.watermark_floor.lock() = Some(WatermarkFloor {
            confirmed_at: Instant::now(),
            floor: assets,
        });
        info!(watermark_floor = %assets, "harvest confirmed");
        Ok(hash)
    }

    /// Mint test stable asset to the connected account.
    pub async fn mint_usdc(&self, amount: &str) -> Result<TxHash> {
        let user = self.user()?;
        let account = self.account.ok_or(VaultError::NotConnected)?;
        let amount = positive(amount, ASSET_DECIMALS)?;
        let call = WriteCall::Mint {
            token: self.book.stable_token,
            to: account,
            amount: amount.raw(),
        };
        self.execute(call, vec![user.asset_balance]).await
    }

    /// Push yield into the vault through the mock adapter. Without an
    /// amount, simulates 10% of the connected position's value.
    pub async fn simulate_yield(&self, amount: Option<&str>) -> Result<TxHash> {
        let amount = match amount {
            Some(text) => positive(text, ASSET_DECIMALS)?,
            None => {
                let value = self.max_withdraw().await?;
                let amount = default_yield_amount(&value);
                if amount.is_zero() {
                    return Err(VaultError::invalid_amount(
                        "",
                        "no position to derive a default yield from",
                    ));
                }
                amount
            }
        };
        let call = WriteCall::SimulateYield {
            adapter: self.book.yield_adapter,
            amount: amount.raw(),
        };
        self.execute(call, vec![self.queries.total_assets]).await
    }

    pub async fn switch_to_local(&self) -> Result<()> {
        self.network.switch_to_local().await
    }

    /// Stable-asset value of the connected position.
    pub async fn max_withdraw(&self) -> Result<DecimalAmount> {
        let user = self.user()?;
        let shares = self.require(&user.share_balance, SHARE_DECIMALS).await?;
        let price = self.share_price().await?;
        Ok(preview_assets(&shares, &price))
    }

    // ── Internals ──

    async fn execute(&self, call: WriteCall, affected: Vec<QueryKey>) -> Result<TxHash> {
        let hash = self.trackers[&call.kind()].execute(call).await?;
        self.reconciler.on_operation_confirmed(affected);
        Ok(hash)
    }

    fn user(&self) -> Result<UserQueries> {
        self.queries.user.ok_or(VaultError::NotConnected)
    }

    fn position_queries(&self, user: &UserQueries) -> Vec<QueryKey> {
        vec![
            user.asset_balance,
            user.share_balance,
            self.queries.total_assets,
            self.queries.total_supply,
        ]
    }

    async fn share_price(&self) -> Result<SharePrice> {
        let assets = self.require(&self.queries.total_assets, ASSET_DECIMALS).await?;
        let supply = self.require(&self.queries.total_supply, SHARE_DECIMALS).await?;
        Ok(compute_share_price(&assets, &supply))
    }

    /// Last known value of `key`, reading it once if it never loaded.
    async fn require(&self, key: &QueryKey, scale: u8) -> Result<DecimalAmount> {
        if let Loadable::Loaded(v) = self.reader.current_amount(key, scale) {
            return Ok(v);
        }
        self.reader.refetch(std::slice::from_ref(key)).await;
        match self.reader.current_amount(key, scale) {
            Loadable::Loaded(v) => Ok(v),
            Loadable::NotYetLoaded => Err(VaultError::RpcUnreachable(format!(
                "{:?} has not loaded yet",
                key.call
            ))),
        }
    }
}

fn positive(text: &str, scale: u8) -> Result<DecimalAmount> {
    let amount = DecimalAmount::parse(text, scale)?;
    if amount.is_zero() {
        return Err(VaultError::invalid_amount(text, "amount must be positive"));
    }
    Ok(amount)
}

fn both<A: Copy, B: Copy>(a: &Loadable<A>, b: &Loadable<B>) -> Loadable<(A, B)> {
    match (a, b) {
        (Loadable::Loaded(a), Loadable::Loaded(b)) => Loadable::Loaded((*a, *b)),
        _ => Loadable::NotYetLoaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{MockLedger, MockWallet, USER, shares, test_book, usdc};
    use crate::model::chain::{Chain, LOCAL_CHAIN_ID};
    use crate::model::operation::LifecycleState;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config(account: Option<Address>) -> RuntimeConfig {
        RuntimeConfig {
            chain: Chain::local(),
            addresses: test_book(),
            account,
            private_key: None,
            wallet_rpc_url: None,
            timings: Timings::default(),
        }
    }

    fn store(ledger: &Arc<MockLedger>) -> VaultStore {
        let wallet = Arc::new(MockWallet::on_chain(LOCAL_CHAIN_ID));
        VaultStore::new(ledger.clone(), wallet, &config(Some(USER)))
    }

    fn amt(s: &str) -> DecimalAmount {
        DecimalAmount::parse(s, ASSET_DECIMALS).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_not_loaded_before_first_poll() {
        let ledger = Arc::new(MockLedger::new());
        let store = store(&ledger);
        let snap = store.snapshot();
        assert_eq!(snap.global.total_assets, Loadable::NotYetLoaded);
        assert_eq!(snap.share_price, Loadable::NotYetLoaded);
        assert_eq!(snap.position, VaultPosition::not_loaded());

        store.refresh().await;
        let snap = store.snapshot();
        assert_eq!(snap.share_price, Loadable::Loaded(SharePrice::NoDeposits));
        assert_eq!(snap.position.asset_balance, Loadable::Loaded(amt("0")));
        assert!(snap.network.is_correct_network());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_session_disables_user_reads() {
        let ledger = Arc::new(MockLedger::new());
        let wallet = Arc::new(MockWallet::on_chain(LOCAL_CHAIN_ID));
        let store = VaultStore::new(ledger.clone(), wallet, &config(None));
        store.refresh().await;

        assert_eq!(store.snapshot().position, VaultPosition::not_loaded());
        assert_eq!(ledger.read_count(&ledger.asset_balance_key(USER)), 0);
        assert_eq!(store.deposit("10").await.unwrap_err(), VaultError::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_harvest_profit_and_watermark_floor() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.vault_key(ReadCall::TotalAssets), usdc(1050));
        ledger.set(ledger.vault_key(ReadCall::TotalSupply), shares(1000));
        ledger.set(ledger.vault_key(ReadCall::LastRecordedAssets), usdc(1000));
        let store = store(&ledger);
        store.refresh().await;

        let snap = store.snapshot();
        assert_eq!(snap.available_profit, Loadable::Loaded(amt("50")));
        assert_eq!(snap.share_price.map(|p| p.value().to_string()), Loadable::Loaded("1.0500".into()));

        store.harvest().await.unwrap();
        // Cached watermark predates the confirmation
        let wm = store.snapshot().global.watermark;
        assert!(matches!(wm, Loadable::Loaded(w) if w >= amt("1050")));
        assert_eq!(store.snapshot().available_profit, Loadable::Loaded(amt("0")));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.snapshot().global.watermark, Loadable::Loaded(amt("1050")));
        assert_eq!(store.harvest().await.unwrap_err(), VaultError::NothingToHarvest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_issued_before_harvest_cannot_lower_watermark() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.vault_key(ReadCall::TotalAssets), usdc(1050));
        ledger.set(ledger.vault_key(ReadCall::TotalSupply), shares(1000));
        ledger.set(ledger.vault_key(ReadCall::LastRecordedAssets), usdc(1000));
        let store = store(&ledger);
        store.refresh().await;

        // A poll read of the old watermark is still on the wire when the
        // harvest confirms.
        ledger.set_read_delay(Some(Duration::from_secs(2)));
        let in_flight = store.reader.refetch(std::slice::from_ref(&store.queries.watermark));
        let harvest = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.harvest().await
        };
        let ((), harvested) = tokio::join!(in_flight, harvest);
        harvested.unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.global.watermark, Loadable::Loaded(amt("1050")));
        assert_eq!(snap.available_profit, Loadable::Loaded(amt("0")));
        assert_eq!(store.harvest().await.unwrap_err(), VaultError::NothingToHarvest);
        assert_eq!(ledger.submitted_kinds(), vec![OperationKind::Harvest]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_approves_then_reconciles() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.asset_balance_key(USER), usdc(500));
        let store = store(&ledger);
        store.refresh().await;

        store.deposit("100").await.unwrap();
        assert_eq!(
            ledger.submitted_kinds(),
            vec![OperationKind::Approve, OperationKind::Deposit]
        );
        assert_eq!(store.operation(OperationKind::Deposit).state, LifecycleState::Confirmed);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snap = store.snapshot();
        assert_eq!(snap.position.asset_balance, Loadable::Loaded(amt("400")));
        assert_eq!(snap.position_value, Loadable::Loaded(amt("100")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_deposit_does_not_block_the_next() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.asset_balance_key(USER), usdc(500));
        ledger.set_manual_mining(true);
        let store = store(&ledger);
        store.refresh().await;

        let timed_out = tokio::time::timeout(Duration::from_secs(1), store.deposit("100")).await;
        assert!(timed_out.is_err());
        assert_eq!(store.operation(OperationKind::Approve).state, LifecycleState::Failed);
        assert!(!store.snapshot().deposit_busy);

        ledger.mine_all();
        ledger.set_manual_mining(false);
        tokio::time::sleep(Duration::from_secs(600)).await;
        store.deposit("100").await.unwrap();
        assert_eq!(store.operation(OperationKind::Deposit).state, LifecycleState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_checks_make_no_calls() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.asset_balance_key(USER), usdc(50));
        let store = store(&ledger);
        store.refresh().await;

        assert!(matches!(store.deposit("1e5").await, Err(VaultError::InvalidAmount { .. })));
        assert!(matches!(store.deposit("100").await, Err(VaultError::InsufficientFunds { .. })));
        assert!(matches!(store.withdraw("1").await, Err(VaultError::InsufficientFunds { .. })));
        assert!(matches!(store.redeem("1").await, Err(VaultError::InsufficientFunds { .. })));
        assert!(matches!(store.mint_usdc("0").await, Err(VaultError::InvalidAmount { .. })));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_without_approval_needs_allowance() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.asset_balance_key(USER), usdc(500));
        ledger.set(ledger.allowance_key(USER), usdc(50));
        let store = store(&ledger);
        store.refresh().await;

        let err = store.deposit_approved("100").await.unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientAllowance {
                requested: "100.000000".into(),
                approved: "50.000000".into(),
            }
        );
        assert!(err.is_preflight());
        assert!(ledger.submitted().is_empty());

        store.deposit_approved("50").await.unwrap();
        assert_eq!(ledger.submitted_kinds(), vec![OperationKind::Deposit]);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.snapshot().position.allowance, Loadable::Loaded(amt("0")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_sends_truncated_amount() {
        let ledger = Arc::new(MockLedger::new());
        let store = store(&ledger);
        store.mint_usdc("100.123456789").await.unwrap();
        assert_eq!(
            ledger.submitted(),
            vec![WriteCall::Mint {
                token: ledger.book().stable_token,
                to: USER,
                amount: alloy::primitives::U256::from(100_123_456u64),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_yield_defaults_to_tenth_of_position() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.vault_key(ReadCall::TotalAssets), usdc(200));
        ledger.set(ledger.vault_key(ReadCall::TotalSupply), shares(200));
        ledger.set(ledger.share_balance_key(USER), shares(200));
        let store = store(&ledger);
        store.refresh().await;

        store.simulate_yield(None).await.unwrap();
        assert_eq!(
            ledger.submitted(),
            vec![WriteCall::SimulateYield {
                adapter: ledger.book().yield_adapter,
                amount: usdc(20),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_and_redeem_assets() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.vault_key(ReadCall::TotalAssets), usdc(100));
        ledger.set(ledger.vault_key(ReadCall::TotalSupply), shares(100));
        ledger.set(ledger.share_balance_key(USER), shares(100));
        let store = store(&ledger);
        store.refresh().await;

        assert_eq!(store.max_withdraw().await.unwrap(), amt("100"));
        store.withdraw("40").await.unwrap();
        store.redeem_assets("10").await.unwrap();
        assert_eq!(
            ledger.submitted()[1],
            WriteCall::Redeem {
                vault: ledger.book().vault,
                shares: shares(10),
                receiver: USER,
                owner: USER,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_view_polls_until_dropped() {
        let ledger = Arc::new(MockLedger::new());
        let store = store(&ledger);
        let key = ledger.vault_key(ReadCall::TotalAssets);

        let view = store.activate();
        tokio::time::sleep(Duration::from_millis(6100)).await;
        assert_eq!(ledger.read_count(&key), 3);

        drop(view);
        assert_eq!(store.scheduler().active(), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ledger.read_count(&key), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_donation_metrics_split_profit() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set(ledger.vault_key(ReadCall::TotalAssets), usdc(1100));
        ledger.set(ledger.vault_key(ReadCall::LastRecordedAssets), usdc(1000));
        let book = ledger.book().clone();
        ledger.set(
            QueryKey::new(book.stable_token, ReadCall::BalanceOf(book.recipients[0].address)),
            usdc(35),
        );
        let store = store(&ledger);
        store.refresh().await;

        let Loadable::Loaded(d) = store.snapshot().donations else {
            panic!("donations not loaded");
        };
        assert_eq!(d.total_donated, amt("35"));
        assert_eq!(d.recipients[0].pending_share, amt("70"));
        assert_eq!(d.recipients[1].pending_share, amt("30"));
    }
}
