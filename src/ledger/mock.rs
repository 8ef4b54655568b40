//! In-memory ledger and wallet for unit tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use alloy::primitives::{Address, B256, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::AddressBook;
use crate::donation::default_recipients;
use crate::error::{Result, VaultError};
use crate::network::WalletSession;

use super::{Ledger, QueryKey, ReadCall, ReceiptOutcome, WriteCall};

pub(crate) const USER: Address = Address::new([0xaa; 20]);

pub(crate) fn test_book() -> AddressBook {
    AddressBook {
        stable_token: Address::new([0x01; 20]),
        vault: Address::new([0x02; 20]),
        donation_router: Address::new([0x03; 20]),
        yield_adapter: Address::new([0x04; 20]),
        recipients: default_recipients(),
    }
}

pub(crate) fn usdc(units: u64) -> U256 {
    U256::from(units) * U256::from(1_000_000u64)
}

pub(crate) fn shares(units: u64) -> U256 {
    U256::from(units) * U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Default)]
struct Inner {
    values: HashMap<QueryKey, U256>,
    failing_reads: HashSet<QueryKey>,
    reads: HashMap<QueryKey, u32>,
    /// Reads see the state at call time but answer this much later.
    read_delay: Option<Duration>,
    submitted: Vec<WriteCall>,
    receipts: HashMap<TxHash, Option<ReceiptOutcome>>,
    calls_by_hash: HashMap<TxHash, WriteCall>,
    reject_submissions: Option<String>,
    revert_with: Option<String>,
    /// Leave receipts unmined until `mine` is called.
    manual_mining: bool,
    chain_id: u64,
    next_hash: u64,
}

/// A tiny vault: approve sets allowance, deposit mints shares 1:1 against
/// the current price, harvest moves the watermark up to total assets.
pub(crate) struct MockLedger {
    book: AddressBook,
    inner: Mutex<Inner>,
}

impl MockLedger {
    pub(crate) fn new() -> Self {
        let book = test_book();
        let ledger = MockLedger {
            book,
            inner: Mutex::new(Inner {
                chain_id: 31337,
                ..Inner::default()
            }),
        };
        for call in [ReadCall::TotalAssets, ReadCall::TotalSupply, ReadCall::LastRecordedAssets] {
            ledger.set(QueryKey::new(ledger.book.vault, call), U256::ZERO);
        }
        ledger
    }

    pub(crate) fn book(&self) -> &AddressBook {
        &self.book
    }

    pub(crate) fn set(&self, key: QueryKey, value: U256) {
        self.inner.lock().values.insert(key, value);
    }

    pub(crate) fn get(&self, key: QueryKey) -> U256 {
        self.inner.lock().values.get(&key).copied().unwrap_or_default()
    }

    pub(crate) fn vault_key(&self, call: ReadCall) -> QueryKey {
        QueryKey::new(self.book.vault, call)
    }

    pub(crate) fn asset_balance_key(&self, account: Address) -> QueryKey {
        QueryKey::new(self.book.stable_token, ReadCall::BalanceOf(account))
    }

    pub(crate) fn share_balance_key(&self, account: Address) -> QueryKey {
        QueryKey::new(self.book.vault, ReadCall::BalanceOf(account))
    }

    pub(crate) fn allowance_key(&self, owner: Address) -> QueryKey {
        QueryKey::new(
            self.book.stable_token,
            ReadCall::Allowance { owner, spender: self.book.vault },
        )
    }

    pub(crate) fn fail_reads(&self, key: QueryKey, fail: bool) {
        let mut inner = self.inner.lock();
        if fail {
            inner.failing_reads.insert(key);
        } else {
            inner.failing_reads.remove(&key);
        }
    }

    pub(crate) fn set_read_delay(&self, delay: Option<Duration>) {
        self.inner.lock().read_delay = delay;
    }

    pub(crate) fn read_count(&self, key: &QueryKey) -> u32 {
        self.inner.lock().reads.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn reject_submissions(&self, reason: Option<&str>) {
        self.inner.lock().reject_submissions = reason.map(str::to_string);
    }

    pub(crate) fn revert_next(&self, reason: &str) {
        self.inner.lock().revert_with = Some(reason.to_string());
    }

    pub(crate) fn set_manual_mining(&self, manual: bool) {
        self.inner.lock().manual_mining = manual;
    }

    pub(crate) fn submitted(&self) -> Vec<WriteCall> {
        self.inner.lock().submitted.clone()
    }

    pub(crate) fn submitted_kinds(&self) -> Vec<crate::model::OperationKind> {
        self.submitted().iter().map(WriteCall::kind).collect()
    }

    /// Mine every transaction still waiting for a receipt.
    pub(crate) fn mine_all(&self) {
        let pending: Vec<TxHash> = {
            let inner = self.inner.lock();
            inner
                .receipts
                .iter()
                .filter(|(_, r)| r.is_none())
                .map(|(h, _)| *h)
                .collect()
        };
        for hash in pending {
            self.mine(hash);
        }
    }

    fn mine(&self, hash: TxHash) {
        let call = {
            let mut inner = self.inner.lock();
            if let Some(reason) = inner.revert_with.take() {
                inner.receipts.insert(hash, Some(ReceiptOutcome::Reverted { reason }));
                return;
            }
            inner.receipts.insert(hash, Some(ReceiptOutcome::Success));
            inner.calls_by_hash.get(&hash).cloned()
        };
        if let Some(call) = call {
            self.apply(&call);
        }
    }

    fn add(&self, key: QueryKey, amount: U256) {
        let v = self.get(key);
        self.set(key, v.saturating_add(amount));
    }

    fn sub(&self, key: QueryKey, amount: U256) {
        let v = self.get(key);
        self.set(key, v.saturating_sub(amount));
    }

    fn apply(&self, call: &WriteCall) {
        let scale = U256::from(10u64).pow(U256::from(12u64));
        match *call {
            WriteCall::Approve { spender, amount, .. } => {
                let key = QueryKey::new(
                    self.book.stable_token,
                    ReadCall::Allowance { owner: USER, spender },
                );
                self.set(key, amount);
            }
            WriteCall::Deposit { assets, receiver, .. } => {
                self.sub(self.asset_balance_key(USER), assets);
                self.sub(self.allowance_key(USER), assets);
                self.add(self.share_balance_key(receiver), assets * scale);
                self.add(self.vault_key(ReadCall::TotalAssets), assets);
                self.add(self.vault_key(ReadCall::TotalSupply), assets * scale);
            }
            WriteCall::Withdraw { assets, receiver, owner, .. } => {
                self.sub(self.share_balance_key(owner), assets * scale);
                self.add(self.asset_balance_key(receiver), assets);
                self.sub(self.vault_key(ReadCall::TotalAssets), assets);
                self.sub(self.vault_key(ReadCall::TotalSupply), assets * scale);
            }
            WriteCall::Redeem { shares, receiver, owner, .. } => {
                self.sub(self.share_balance_key(owner), shares);
                self.add(self.asset_balance_key(receiver), shares / scale);
                self.sub(self.vault_key(ReadCall::TotalAssets), shares / scale);
                self.sub(self.vault_key(ReadCall::TotalSupply), shares);
            }
            WriteCall::Harvest { .. } => {
                let total = self.get(self.vault_key(ReadCall::TotalAssets));
                self.set(self.vault_key(ReadCall::LastRecordedAssets), total);
            }
            WriteCall::Mint { to, amount, .. } => {
                self.add(self.asset_balance_key(to), amount);
            }
            WriteCall::SimulateYield { amount, .. } => {
                self.add(self.vault_key(ReadCall::TotalAssets), amount);
            }
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn read(&self, key: &QueryKey) -> Result<U256> {
        let (result, delay) = {
            let mut inner = self.inner.lock();
            *inner.reads.entry(*key).or_default() += 1;
            let result = if inner.failing_reads.contains(key) {
                Err(VaultError::RpcUnreachable("connection refused".into()))
            } else {
                Ok(inner.values.get(key).copied().unwrap_or_default())
            };
            (result, inner.read_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn submit(&self, call: &WriteCall) -> Result<TxHash> {
        let (hash, manual) = {
            let mut inner = self.inner.lock();
            if let Some(reason) = &inner.reject_submissions {
                return Err(VaultError::SubmissionRejected(reason.clone()));
            }
            inner.next_hash += 1;
            let hash = B256::from(U256::from(inner.next_hash));
            inner.submitted.push(call.clone());
            inner.calls_by_hash.insert(hash, call.clone());
            inner.receipts.insert(hash, None);
            (hash, inner.manual_mining)
        };
        if !manual {
            self.mine(hash);
        }
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>> {
        Ok(self.inner.lock().receipts.get(&hash).cloned().flatten())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.inner.lock().chain_id)
    }
}

// ── Wallet ───────────────────────────────────────────────────────────

#[derive(Default)]
struct WalletInner {
    chain_id: u64,
    switch_requests: Vec<u64>,
    reject: bool,
}

pub(crate) struct MockWallet {
    inner: Mutex<WalletInner>,
}

impl MockWallet {
    pub(crate) fn on_chain(chain_id: u64) -> Self {
        MockWallet {
            inner: Mutex::new(WalletInner { chain_id, ..WalletInner::default() }),
        }
    }

    pub(crate) fn set_chain(&self, chain_id: u64) {
        self.inner.lock().chain_id = chain_id;
    }

    pub(crate) fn reject_switches(&self, reject: bool) {
        self.inner.lock().reject = reject;
    }

    pub(crate) fn switch_requests(&self) -> Vec<u64> {
        self.inner.lock().switch_requests.clone()
    }
}

#[async_trait]
impl WalletSession for MockWallet {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.inner.lock().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.switch_requests.push(chain_id);
        if inner.reject {
            return Err(VaultError::SubmissionRejected("user rejected the request".into()));
        }
        inner.chain_id = chain_id;
        Ok(())
    }
}
