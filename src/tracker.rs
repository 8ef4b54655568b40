use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Result, VaultError};
use crate::ledger::{Ledger, ReceiptOutcome, WriteCall};
use crate::model::operation::{LifecycleState, OperationKind, PendingOperation};
use crate::retry::RetryPolicy;
use crate::scheduler::{Scheduler, Subscription};

/// Failure recorded when the caller drops a write before its outcome lands.
pub const CANCELLED: &str = "cancelled before an outcome was recorded";

/// One write slot: submit a call, wait for its receipt, hold the outcome.
///
/// Only one submission per slot may be in flight; a second `submit` is
/// rejected with [`VaultError::Busy`]. Independent operations use separate
/// trackers so they never overwrite each other. Dropping `submit`,
/// `wait_for_confirmation` or `execute` before it resolves fails the slot
/// with [`CANCELLED`], so it never stays busy.
pub struct TransactionTracker {
    kind: OperationKind,
    ledger: Arc<dyn Ledger>,
    receipt_policy: RetryPolicy,
    grace: Duration,
    scheduler: Scheduler,
    state: Arc<watch::Sender<PendingOperation>>,
    reset_timer: Mutex<Option<Subscription>>,
}

impl TransactionTracker {
    pub fn new(
        kind: OperationKind,
        ledger: Arc<dyn Ledger>,
        scheduler: Scheduler,
        receipt_policy: RetryPolicy,
        grace: Duration,
    ) -> Self {
        let (tx, _) = watch::channel(PendingOperation::idle(kind));
        TransactionTracker {
            kind,
            ledger,
            receipt_policy,
            grace,
            scheduler,
            state: Arc::new(tx),
            reset_timer: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn snapshot(&self) -> PendingOperation {
        self.state.borrow().clone()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.borrow().state
    }

    pub fn is_busy(&self) -> bool {
        self.lifecycle().is_in_flight()
    }

    /// Submit and wait for the receipt.
    pub async fn execute(&self, call: WriteCall) -> Result<TxHash> {
        self.submit(call).await?;
        self.wait_for_confirmation().await
    }

    /// `Idle → Submitting → AwaitingConfirmation`. Returns the hash once the
    /// signer accepted the call.
    pub async fn submit(&self, call: WriteCall) -> Result<TxHash> {
        debug_assert_eq!(call.kind(), self.kind);

        let mut acquired = false;
        self.state.send_if_modified(|op| {
            if op.state.is_in_flight() {
                return false;
            }
            *op = PendingOperation {
                kind: self.kind,
                submitted_hash: None,
                state: LifecycleState::Submitting,
                failure: None,
            };
            acquired = true;
            true
        });
        if !acquired {
            return Err(VaultError::Busy(self.kind));
        }
        // A new attempt supersedes the previous outcome's grace window.
        self.reset_timer.lock().take();
        let guard = InFlight::new(self);

        match self.ledger.submit(&call).await {
            Ok(hash) => {
                info!(kind = %self.kind, %hash, "submitted");
                self.state.send_modify(|op| {
                    op.submitted_hash = Some(hash);
                    op.state = LifecycleState::AwaitingConfirmation;
                });
                guard.disarm();
                Ok(hash)
            }
            Err(e) => {
                let reason = match e {
                    VaultError::SubmissionRejected(msg) => msg,
                    other => other.to_string(),
                };
                warn!(kind = %self.kind, %reason, "submission rejected");
                self.finish(LifecycleState::Failed, Some(reason.clone()));
                Err(VaultError::SubmissionRejected(reason))
            }
        }
    }

    /// Poll the receipt of the in-flight submission until it lands or the
    /// receipt policy gives up.
    pub async fn wait_for_confirmation(&self) -> Result<TxHash> {
        let (hash, state) = {
            let op = self.state.borrow();
            (op.submitted_hash, op.state)
        };
        let hash = match (hash, state) {
            (Some(h), LifecycleState::AwaitingConfirmation) => h,
            (Some(h), LifecycleState::Confirmed) => return Ok(h),
            _ => {
                return Err(VaultError::TransactionFailed {
                    reason: format!("no {} awaiting confirmation", self.kind),
                });
            }
        };

        let _guard = InFlight::new(self);
        let mut attempts = 0;
        loop {
            match self.ledger.receipt(hash).await {
                Ok(Some(ReceiptOutcome::Success)) => {
                    info!(kind = %self.kind, %hash, "confirmed");
                    self.finish(LifecycleState::Confirmed, None);
                    return Ok(hash);
                }
                Ok(Some(ReceiptOutcome::Reverted { reason })) => {
                    warn!(kind = %self.kind, %hash, %reason, "reverted");
                    self.finish(LifecycleState::Failed, Some(reason.clone()));
                    return Err(VaultError::TransactionFailed { reason });
                }
                Ok(None) => {}
                Err(e) => warn!(kind = %self.kind, %hash, error = %e, "receipt lookup failed"),
            }

            attempts += 1;
            if self.receipt_policy.exhausted(attempts) {
                let reason = format!(
                    "not mined after {attempts} receipt checks, transaction may have been dropped"
                );
                warn!(kind = %self.kind, %hash, "giving up on receipt");
                self.finish(LifecycleState::Failed, Some(reason.clone()));
                return Err(VaultError::TransactionFailed { reason });
            }
            tokio::time::sleep(self.receipt_policy.delay).await;
        }
    }

    /// Consumer has seen the terminal state; go idle now.
    pub fn acknowledge(&self) {
        self.reset_timer.lock().take();
        self.state.send_if_modified(|op| {
            if !op.state.is_terminal() {
                return false;
            }
            *op = PendingOperation::idle(op.kind);
            true
        });
    }

    /// Enter a terminal state and arm the reset back to idle.
    fn finish(&self, terminal: LifecycleState, failure: Option<String>) {
        self.state.send_modify(|op| {
            op.state = terminal;
            op.failure = failure;
        });
        // Without a runtime the slot holds its outcome until `acknowledge`.
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }

        let state = self.state.clone();
        let timer = self.scheduler.after("terminal-grace", self.grace, async move {
            state.send_if_modified(|op| {
                if !op.state.is_terminal() {
                    return false;
                }
                *op = PendingOperation::idle(op.kind);
                true
            });
        });
        *self.reset_timer.lock() = Some(timer);
    }
}

/// Held across the awaits of a write. If it drops while the slot is still
/// in flight, the caller went away and the slot fails.
struct InFlight<'a> {
    tracker: &'a TransactionTracker,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(tracker: &'a TransactionTracker) -> Self {
        InFlight { tracker, armed: true }
    }

    /// The slot legitimately stays in flight past this point.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.tracker.is_busy() {
            return;
        }
        let hash = self.tracker.snapshot().submitted_hash;
        warn!(kind = %self.tracker.kind, ?hash, "write abandoned before its outcome");
        self.tracker.finish(LifecycleState::Failed, Some(CANCELLED.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{MockLedger, USER, usdc};

    fn tracker(ledger: &Arc<MockLedger>, kind: OperationKind) -> TransactionTracker {
        TransactionTracker::new(
            kind,
            ledger.clone(),
            Scheduler::new(),
            RetryPolicy::new(5, Duration::from_millis(500)),
            Duration::from_secs(2),
        )
    }

    fn deposit_call(ledger: &MockLedger) -> WriteCall {
        WriteCall::Deposit {
            vault: ledger.book().vault,
            assets: usdc(100),
            receiver: USER,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_then_idle_after_grace() {
        let ledger = Arc::new(MockLedger::new());
        let t = tracker(&ledger, OperationKind::Deposit);
        let hash = t.execute(deposit_call(&ledger)).await.unwrap();

        let snap = t.snapshot();
        assert_eq!(snap.state, LifecycleState::Confirmed);
        assert_eq!(snap.submitted_hash, Some(hash));

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(t.lifecycle(), LifecycleState::Confirmed);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(t.snapshot(), PendingOperation::idle(OperationKind::Deposit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_fails_without_retry() {
        let ledger = Arc::new(MockLedger::new());
        ledger.reject_submissions(Some("user denied transaction signature"));
        let t = tracker(&ledger, OperationKind::Deposit);

        let err = t.execute(deposit_call(&ledger)).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::SubmissionRejected("user denied transaction signature".into())
        );
        let snap = t.snapshot();
        assert_eq!(snap.state, LifecycleState::Failed);
        assert_eq!(snap.submitted_hash, None);
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_carries_reason() {
        let ledger = Arc::new(MockLedger::new());
        ledger.revert_next("ERC20: insufficient allowance");
        let t = tracker(&ledger, OperationKind::Deposit);

        let err = t.execute(deposit_call(&ledger)).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::TransactionFailed { reason: "ERC20: insufficient allowance".into() }
        );
        assert_eq!(t.snapshot().failure.as_deref(), Some("ERC20: insufficient allowance"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_transaction_fails_after_policy() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_manual_mining(true);
        let t = tracker(&ledger, OperationKind::Deposit);

        let err = t.execute(deposit_call(&ledger)).await.unwrap_err();
        assert!(matches!(err, VaultError::TransactionFailed { .. }));
        assert_eq!(t.lifecycle(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_in_flight_is_busy() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_manual_mining(true);
        let t = tracker(&ledger, OperationKind::Deposit);

        t.submit(deposit_call(&ledger)).await.unwrap();
        assert_eq!(t.lifecycle(), LifecycleState::AwaitingConfirmation);
        let err = t.submit(deposit_call(&ledger)).await.unwrap_err();
        assert_eq!(err, VaultError::Busy(OperationKind::Deposit));
        assert_eq!(ledger.submitted().len(), 1);

        ledger.mine_all();
        t.wait_for_confirmation().await.unwrap();
        assert_eq!(t.lifecycle(), LifecycleState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_trackers_do_not_block() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_manual_mining(true);
        let deposit = tracker(&ledger, OperationKind::Deposit);
        let harvest = tracker(&ledger, OperationKind::Harvest);

        deposit.submit(deposit_call(&ledger)).await.unwrap();
        harvest
            .submit(WriteCall::Harvest { vault: ledger.book().vault })
            .await
            .unwrap();
        assert_eq!(deposit.lifecycle(), LifecycleState::AwaitingConfirmation);
        assert_eq!(harvest.lifecycle(), LifecycleState::AwaitingConfirmation);
        assert_ne!(deposit.snapshot().submitted_hash, harvest.snapshot().submitted_hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_releases_slot() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_manual_mining(true);
        let t = tracker(&ledger, OperationKind::Deposit);

        let timed_out =
            tokio::time::timeout(Duration::from_secs(1), t.execute(deposit_call(&ledger))).await;
        assert!(timed_out.is_err());
        let snap = t.snapshot();
        assert_eq!(snap.state, LifecycleState::Failed);
        assert_eq!(snap.failure.as_deref(), Some(CANCELLED));
        assert!(snap.submitted_hash.is_some());

        ledger.set_manual_mining(false);
        t.execute(deposit_call(&ledger)).await.unwrap();
        assert_eq!(t.lifecycle(), LifecycleState::Confirmed);
        assert_eq!(ledger.submitted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_then_later_wait_is_not_cancelled() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_manual_mining(true);
        let t = tracker(&ledger, OperationKind::Harvest);

        let hash = t.submit(WriteCall::Harvest { vault: ledger.book().vault }).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(t.lifecycle(), LifecycleState::AwaitingConfirmation);

        ledger.mine_all();
        assert_eq!(t.wait_for_confirmation().await.unwrap(), hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_resets_immediately() {
        let ledger = Arc::new(MockLedger::new());
        let t = tracker(&ledger, OperationKind::Harvest);
        t.execute(WriteCall::Harvest { vault: ledger.book().vault }).await.unwrap();
        t.acknowledge();
        assert_eq!(t.lifecycle(), LifecycleState::Idle);
    }
}
