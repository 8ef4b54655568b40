//! Approve-then-deposit as one user action.
//!
//! [`DepositFlow`] is the state machine; it only decides. The async
//! [`ApprovalDepositOrchestrator`] runs the commands it emits and feeds the
//! outcomes back as events.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AddressBook, Timings};
use crate::error::{Result, VaultError};
use crate::ledger::{QueryKey, WriteCall};
use crate::model::amount::DecimalAmount;
use crate::model::operation::OperationKind;
use crate::scheduler::{ReconciliationScheduler, Scheduler, Subscription};
use crate::tracker::{CANCELLED, TransactionTracker};

// ── State machine ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DepositPhase {
    Ready,
    ApproveSubmitted,
    ApproveConfirmed,
    DepositSubmitted,
    DepositConfirmed,
    Failed { stage: OperationKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    ApproveConfirmed,
    /// The settle delay after approval elapsed.
    SettleElapsed,
    DepositConfirmed,
    Failed { stage: OperationKind, reason: String },
    /// Confirmation has been shown long enough; drop the entered amount.
    InputCleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCommand {
    SubmitApprove(DecimalAmount),
    WaitSettle(Duration),
    SubmitDeposit(DecimalAmount),
    Reconcile,
    ClearInputAfter(Duration),
}

#[derive(Debug, Clone)]
pub struct DepositFlow {
    phase: DepositPhase,
    amount: Option<DecimalAmount>,
    /// Single-shot guard for the automatic deposit; reset only by `begin`.
    deposit_triggered: bool,
    settle: Duration,
    clear_after: Duration,
}

impl DepositFlow {
    pub fn new(settle: Duration, clear_after: Duration) -> Self {
        DepositFlow {
            phase: DepositPhase::Ready,
            amount: None,
            deposit_triggered: false,
            settle,
            clear_after,
        }
    }

    pub fn phase(&self) -> &DepositPhase {
        &self.phase
    }

    pub fn amount(&self) -> Option<DecimalAmount> {
        self.amount
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            DepositPhase::ApproveSubmitted | DepositPhase::ApproveConfirmed | DepositPhase::DepositSubmitted
        )
    }

    /// Start a deposit of `amount`, approving first when `allowance` is short.
    pub fn begin(
        &mut self,
        amount: DecimalAmount,
        allowance: DecimalAmount,
        balance: DecimalAmount,
    ) -> Result<Vec<FlowCommand>> {
        if self.is_busy() {
            return Err(VaultError::Busy(OperationKind::Deposit));
        }
        if amount.is_zero() {
            return Err(VaultError::invalid_amount(&amount.to_string(), "amount must be positive"));
        }
        if amount > balance {
            return Err(VaultError::InsufficientFunds {
                requested: amount.to_string(),
                available: balance.to_string(),
            });
        }

        self.amount = Some(amount);
        self.deposit_triggered = false;

        if allowance < amount {
            self.phase = DepositPhase::ApproveSubmitted;
            Ok(vec![FlowCommand::SubmitApprove(amount)])
        } else {
            self.deposit_triggered = true;
            self.phase = DepositPhase::DepositSubmitted;
            Ok(vec![FlowCommand::SubmitDeposit(amount)])
        }
    }

    /// Apply an outcome. Events that do not fit the current phase (such as
    /// a repeated approval confirmation) are ignored.
    pub fn on(&mut self, event: FlowEvent) -> Vec<FlowCommand> {
        match (event, &self.phase) {
            (FlowEvent::ApproveConfirmed, DepositPhase::ApproveSubmitted) if !self.deposit_triggered => {
                self.deposit_triggered = true;
                self.phase = DepositPhase::ApproveConfirmed;
                vec![FlowCommand::WaitSettle(self.settle)]
            }
            (FlowEvent::SettleElapsed, DepositPhase::ApproveConfirmed) => match self.amount {
                Some(amount) => {
                    self.phase = DepositPhase::DepositSubmitted;
                    vec![FlowCommand::SubmitDeposit(amount)]
                }
                None => Vec::new(),
            },
            (FlowEvent::DepositConfirmed, DepositPhase::DepositSubmitted) => {
                self.phase = DepositPhase::DepositConfirmed;
                vec![FlowCommand::Reconcile, FlowCommand::ClearInputAfter(self.clear_after)]
            }
            (FlowEvent::Failed { stage, reason }, _) if self.is_busy() => {
                self.phase = DepositPhase::Failed { stage, reason };
                Vec::new()
            }
            (FlowEvent::InputCleared, DepositPhase::DepositConfirmed) => {
                self.phase = DepositPhase::Ready;
                self.amount = None;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// Runs [`DepositFlow`] against two independent trackers.
pub struct ApprovalDepositOrchestrator {
    flow: Arc<Mutex<DepositFlow>>,
    approve: Arc<TransactionTracker>,
    deposit: Arc<TransactionTracker>,
    reconciler: Arc<ReconciliationScheduler>,
    scheduler: Scheduler,
    book: AddressBook,
    affected: Vec<QueryKey>,
    clear_timer: Mutex<Option<Subscription>>,
}

impl ApprovalDepositOrchestrator {
    pub fn new(
        approve: Arc<TransactionTracker>,
        deposit: Arc<TransactionTracker>,
        reconciler: Arc<ReconciliationScheduler>,
        scheduler: Scheduler,
        book: AddressBook,
        affected: Vec<QueryKey>,
        timings: &Timings,
    ) -> Self {
        ApprovalDepositOrchestrator {
            flow: Arc::new(Mutex::new(DepositFlow::new(
                timings.approve_settle,
                timings.clear_input_after,
            ))),
            approve,
            deposit,
            reconciler,
            scheduler,
            book,
            affected,
            clear_timer: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flow.lock().is_busy()
    }

    pub fn phase(&self) -> DepositPhase {
        self.flow.lock().phase().clone()
    }

    /// Amount still shown in the input, if any.
    pub fn pending_amount(&self) -> Option<DecimalAmount> {
        self.flow.lock().amount()
    }

    /// Approve if needed, then deposit `amount` for `receiver`. Resolves with
    /// the deposit hash once it is confirmed.
    pub async fn run(
        &self,
        amount: DecimalAmount,
        allowance: DecimalAmount,
        balance: DecimalAmount,
        receiver: Address,
    ) -> Result<TxHash> {
        let first = self.flow.lock().begin(amount, allowance, balance)?;
        let _abandon = AbandonGuard { flow: &self.flow };
        self.clear_timer.lock().take();
        info!(%amount, %allowance, approve_first = allowance < amount, "deposit started");

        let mut queue: VecDeque<FlowCommand> = first.into();
        let mut deposit_hash = None;

        while let Some(command) = queue.pop_front() {
            let next = match command {
                FlowCommand::SubmitApprove(a) => {
                    let call = WriteCall::Approve {
                        token: self.book.stable_token,
                        spender: self.book.vault,
                        amount: a.raw(),
                    };
                    match self.approve.execute(call).await {
                        Ok(_) => self.flow.lock().on(FlowEvent::ApproveConfirmed),
                        Err(e) => return Err(self.fail(OperationKind::Approve, e)),
                    }
                }
                FlowCommand::WaitSettle(delay) => {
                    tokio::time::sleep(delay).await;
                    self.flow.lock().on(FlowEvent::SettleElapsed)
                }
                FlowCommand::SubmitDeposit(a) => {
                    let call = WriteCall::Deposit {
                        vault: self.book.vault,
                        assets: a.raw(),
                        receiver,
                    };
                    match self.deposit.execute(call).await {
                        Ok(hash) => {
                            deposit_hash = Some(hash);
                            self.flow.lock().on(FlowEvent::DepositConfirmed)
                        }
                        Err(e) => return Err(self.fail(OperationKind::Deposit, e)),
                    }
                }
                FlowCommand::Reconcile => {
                    self.reconciler.on_operation_confirmed(self.affected.clone());
                    Vec::new()
                }
                FlowCommand::ClearInputAfter(delay) => {
                    let flow = self.flow.clone();
                    let timer = self.scheduler.after("clear-deposit-input", delay, async move {
                        flow.lock().on(FlowEvent::InputCleared);
                    });
                    *self.clear_timer.lock() = Some(timer);
                    Vec::new()
                }
            };
            queue.extend(next);
        }

        deposit_hash.ok_or_else(|| VaultError::TransactionFailed {
            reason: "deposit was never submitted".into(),
        })
    }

    fn fail(&self, stage: OperationKind, error: VaultError) -> VaultError {
        warn!(%stage, %error, "deposit flow failed");
        self.flow.lock().on(FlowEvent::Failed {
            stage,
            reason: error.to_string(),
        });
        error
    }
}

/// Fails the flow if `run` is dropped while a step is still pending, so
/// the next attempt is not rejected as busy.
struct AbandonGuard<'a> {
    flow: &'a Mutex<DepositFlow>,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        let mut flow = self.flow.lock();
        if !flow.is_busy() {
            return;
        }
        let stage = match flow.phase() {
            DepositPhase::ApproveSubmitted => OperationKind::Approve,
            _ => OperationKind::Deposit,
        };
        warn!(%stage, "deposit flow abandoned");
        flow.on(FlowEvent::Failed {
            stage,
            reason: CANCELLED.to_string(),
        });
    }
}
