// src/session.rs

//! # Pool Session
//!
//! Ties one staking pool's read-model, invalidator and scenario orchestrator to the
//! active account and tracks where the user is in the stake/claim/unstake/exit flow:
//!
//! `Idle -> BalancesLoading -> BalancesReady -> ScenarioStaged -> ScenarioExecuting`
//!
//! Execution ends back in `BalancesReady` on success or in `Failed` otherwise; either
//! way the scenario is cleared.

use async_trait::async_trait;
use ethers::types::{Address, TransactionRequest, H256};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::PoolDescriptor,
    errors::{ExecutionError, ScenarioError, SyncError},
    pool::{ContractBindings, EventInvalidator, PoolReadModel, RefreshOutcome},
    scenario::{enabled_actions, GasLimits, PoolAction, Scenario, ScenarioOrchestrator},
    store::StateSlice,
    types::PoolBalances,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    BalancesLoading,
    BalancesReady,
    ScenarioStaged(PoolAction),
    ScenarioExecuting(PoolAction),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub tx_hash: H256,
}

/// The external component that signs and submits a staged scenario.
#[async_trait]
pub trait ScenarioExecutor: Send + Sync + fmt::Debug {
    async fn execute(&self, scenario: &Scenario, request: TransactionRequest) -> Result<ExecutionReceipt, ExecutionError>;
}

#[derive(Debug)]
pub struct PoolSession {
    read_model: Arc<PoolReadModel>,
    invalidator: EventInvalidator,
    orchestrator: ScenarioOrchestrator,
    account: StateSlice<Option<Address>>,
    phase: StateSlice<SessionPhase>,
    deferred: Mutex<Option<CancellationToken>>,
    disposed: CancellationToken,
}

impl PoolSession {
    pub fn new(
        contract_key: impl Into<String>,
        bindings: ContractBindings,
        descriptor: PoolDescriptor,
        gas_limits: GasLimits,
    ) -> Self {
        let read_model = Arc::new(PoolReadModel::new(bindings));
        Self {
            invalidator: EventInvalidator::new(read_model.clone()),
            read_model,
            orchestrator: ScenarioOrchestrator::new(contract_key, descriptor, gas_limits),
            account: StateSlice::new("session_account", None),
            phase: StateSlice::new("session_phase", SessionPhase::Idle),
            deferred: Mutex::new(None),
            disposed: CancellationToken::new(),
        }
    }

    pub fn read_model(&self) -> &Arc<PoolReadModel> {
        &self.read_model
    }

    pub fn invalidator(&self) -> &EventInvalidator {
        &self.invalidator
    }

    pub fn orchestrator(&self) -> &ScenarioOrchestrator {
        &self.orchestrator
    }

    pub fn account(&self) -> Option<Address> {
        self.account.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.snapshot()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Scopes the session to `account` and loads its balances.
    ///
    /// If the bindings are not installed yet the load is retried once they are.
    #[instrument(skip(self), fields(contract = %self.orchestrator.contract_key()))]
    pub async fn set_account(self: &Arc<Self>, account: Option<Address>) -> RefreshOutcome {
        if self.disposed.is_cancelled() {
            return RefreshOutcome::Disposed;
        }

        if self.account() != account {
            let pending = self.deferred.lock().take();
            if let Some(pending) = pending {
                pending.cancel();
            }
            self.invalidator.watch_account(account);
            self.orchestrator.clear();
            self.read_model.clear();
            self.account.replace(account);
            self.phase.replace(match account {
                Some(_) => SessionPhase::BalancesLoading,
                None => SessionPhase::Idle,
            });
            info!(target: "session", ?account, "Active account changed");
        }

        let Some(account) = account else {
            return RefreshOutcome::NotReady;
        };
        let outcome = self.read_model.refresh(account).await;
        if outcome == RefreshOutcome::NotReady {
            self.defer_refresh(account);
        }
        self.settle_refresh(&outcome);
        outcome
    }

    fn defer_refresh(self: &Arc<Self>, account: Address) {
        let token = CancellationToken::new();
        if let Some(previous) = self.deferred.lock().replace(token.clone()) {
            previous.cancel();
        }
        debug!(target: "session", ?account, "Bindings pending; deferring balance refresh");

        let session = Arc::clone(self);
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => {}
                contracts = session.read_model.bindings().wait_ready() => {
                    if contracts.is_some() && !token.is_cancelled() && session.account() == Some(account) {
                        let outcome = session.read_model.refresh(account).await;
                        session.settle_refresh(&outcome);
                    }
                }
            }
        });
    }

    /// Reloads balances for the active account. No-op without an account.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(account) = self.account() else {
            return RefreshOutcome::NotReady;
        };
        let outcome = self.read_model.refresh(account).await;
        self.settle_refresh(&outcome);
        outcome
    }

    fn settle_refresh(&self, outcome: &RefreshOutcome) {
        self.phase.update_if(|phase| {
            let next = match (&*phase, outcome) {
                (
                    SessionPhase::BalancesLoading | SessionPhase::Failed(_),
                    RefreshOutcome::Updated | RefreshOutcome::Unchanged,
                ) => SessionPhase::BalancesReady,
                (SessionPhase::BalancesLoading, RefreshOutcome::Failed(message)) => SessionPhase::Failed(message.clone()),
                _ => return false,
            };
            *phase = next;
            true
        });
    }

    pub fn enabled_actions(&self) -> Vec<PoolAction> {
        enabled_actions(self.active_balances().as_ref())
    }

    /// Stages `action` against the current snapshot if the balances enable it.
    pub fn stage(&self, action: PoolAction) -> Result<Scenario, SyncError> {
        let phase = self.phase();
        if !matches!(
            phase,
            SessionPhase::BalancesReady | SessionPhase::ScenarioStaged(_) | SessionPhase::Failed(_)
        ) {
            return Err(invalid_phase("stage", &phase).into());
        }

        let scenario = self
            .orchestrator
            .stage_checked(action, self.active_balances().as_ref())?;
        self.phase.replace(SessionPhase::ScenarioStaged(action));
        Ok(scenario)
    }

    /// Balances from a snapshot taken for the active account; any other snapshot is ignored.
    fn active_balances(&self) -> Option<PoolBalances> {
        let account = self.account()?;
        self.read_model
            .snapshot()
            .filter(|snapshot| snapshot.account == account)
            .map(|snapshot| snapshot.balances)
    }

    /// Drops the staged scenario without executing it.
    pub fn cancel(&self) {
        self.orchestrator.clear();
        self.phase.update_if(|phase| {
            if !matches!(phase, SessionPhase::ScenarioStaged(_)) {
                return false;
            }
            *phase = SessionPhase::BalancesReady;
            true
        });
    }

    /// Hands the staged scenario to `executor` and clears it once the executor reports.
    #[instrument(skip(self, executor), fields(contract = %self.orchestrator.contract_key()))]
    pub async fn execute(&self, executor: &dyn ScenarioExecutor) -> Result<ExecutionReceipt, SyncError> {
        let phase = self.phase();
        if !matches!(phase, SessionPhase::ScenarioStaged(_)) {
            return Err(invalid_phase("execute", &phase).into());
        }
        let scenario = self.orchestrator.active().ok_or(ScenarioError::NoActiveScenario)?;
        let request = scenario.transaction_request(self.orchestrator.descriptor().staking_pool)?;

        self.phase.replace(SessionPhase::ScenarioExecuting(scenario.action));
        info!(target: "session", method = scenario.method, amount = %scenario.display_amount, "{}", scenario.label);

        let result = executor.execute(&scenario, request).await;
        self.orchestrator.clear();

        match result {
            Ok(receipt) => {
                info!(target: "session", tx_hash = ?receipt.tx_hash, method = scenario.method, "Scenario executed");
                self.phase.replace(SessionPhase::BalancesReady);
                Ok(receipt)
            }
            Err(e) => {
                warn!(target: "session", method = scenario.method, error = %e, "Scenario execution failed");
                self.phase.replace(SessionPhase::Failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub fn dispose(&self) {
        if let Some(pending) = self.deferred.lock().take() {
            pending.cancel();
        }
        self.disposed.cancel();
        self.invalidator.dispose();
        self.read_model.dispose();
        self.orchestrator.clear();
        self.phase.replace(SessionPhase::Idle);
        debug!(target: "session", contract = %self.orchestrator.contract_key(), "Session disposed");
    }
}

fn invalid_phase(operation: &'static str, phase: &SessionPhase) -> ScenarioError {
    ScenarioError::InvalidPhase {
        operation,
        phase: format!("{:?}", phase),
    }
}
