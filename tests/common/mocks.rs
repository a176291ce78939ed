use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, TransactionRequest, H256, U256};
use tokio_util::sync::CancellationToken;

use activity_sync::{
    errors::{ContractError, ExecutionError, IndexerError},
    indexer::{ExchangeWindow, IndexerClient},
    pool::{EventSink, StakingEventKind, StakingEventLog, StakingPool, StakingToken, Subscription},
    scenario::Scenario,
    session::{ExecutionReceipt, ScenarioExecutor},
    types::{RawEvent, TransactionCategory},
};

// === Mock Indexer ===
#[derive(Debug, Default)]
pub struct MockIndexer {
    records: Mutex<HashMap<(Address, TransactionCategory), Vec<RawEvent>>>,
    failures: Mutex<HashMap<TransactionCategory, String>>,
    delays: Mutex<HashMap<Address, Duration>>,
    pub calls: AtomicUsize,
    pub last_window: Mutex<Option<ExchangeWindow>>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_records(&self, account: Address, category: TransactionCategory, records: Vec<RawEvent>) {
        self.records.lock().unwrap().insert((account, category), records);
    }

    pub fn fail(&self, category: TransactionCategory, message: &str) {
        self.failures.lock().unwrap().insert(category, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Every query for `account` waits `delay` before answering.
    pub fn delay_account(&self, account: Address, delay: Duration) {
        self.delays.lock().unwrap().insert(account, delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, account: Address, category: TransactionCategory) -> Result<Vec<RawEvent>, IndexerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(&account).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failures.lock().unwrap().get(&category) {
            return Err(IndexerError::Transport {
                endpoint: "mock".to_string(),
                message: message.clone(),
            });
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(account, category))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl IndexerClient for MockIndexer {
    async fn issued(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(account, TransactionCategory::Issued).await
    }

    async fn burned(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(account, TransactionCategory::Burned).await
    }

    async fn fees_claimed(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(account, TransactionCategory::FeesClaimed).await
    }

    async fn exchanges_since(&self, from_address: Address, window: ExchangeWindow) -> Result<Vec<RawEvent>, IndexerError> {
        *self.last_window.lock().unwrap() = Some(window);
        self.respond(from_address, TransactionCategory::Exchange).await
    }

    async fn depot_user_actions(&self, user: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(user, TransactionCategory::DepotAction).await
    }

    async fn depot_cleared_deposits(&self, to_address: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(to_address, TransactionCategory::ClearedDeposit).await
    }

    async fn depot_exchanges(&self, from: Address) -> Result<Vec<RawEvent>, IndexerError> {
        self.respond(from, TransactionCategory::DepotExchange).await
    }
}

// === Mock Staking Token ===
#[derive(Debug)]
pub struct MockToken {
    address: Address,
    balances: Mutex<HashMap<Address, U256>>,
    next_delay: Mutex<Option<Duration>>,
    pub balance_calls: AtomicUsize,
}

impl MockToken {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balances: Mutex::new(HashMap::new()),
            next_delay: Mutex::new(None),
            balance_calls: AtomicUsize::new(0),
        }
    }

    /// The next `balance_of` reads its value immediately but answers after `delay`.
    pub fn delay_next_read(&self, delay: Duration) {
        *self.next_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_balance(&self, user: Address, amount: U256) {
        self.balances.lock().unwrap().insert(user, amount);
    }

    pub fn calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StakingToken for MockToken {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        let balance = self.balances.lock().unwrap().get(&account).copied().unwrap_or_default();
        let delay = self.next_delay.lock().unwrap().take();
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(balance)
    }
}

// === Mock Staking Pool ===
#[derive(Debug)]
pub struct MockPool {
    address: Address,
    staked: Mutex<HashMap<Address, U256>>,
    earned: Mutex<HashMap<Address, U256>>,
    failing: AtomicBool,
    subscribe_failing: AtomicBool,
    listeners: Mutex<Vec<(StakingEventKind, EventSink, CancellationToken)>>,
    pub subscribe_calls: AtomicUsize,
}

impl MockPool {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            staked: Mutex::new(HashMap::new()),
            earned: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            subscribe_failing: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_staked(&self, user: Address, amount: U256) {
        self.staked.lock().unwrap().insert(user, amount);
    }

    pub fn set_earned(&self, user: Address, amount: U256) {
        self.earned.lock().unwrap().insert(user, amount);
    }

    /// Makes `earned` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every `subscribe` fail until reset.
    pub fn set_subscribe_failing(&self, failing: bool) {
        self.subscribe_failing.store(failing, Ordering::SeqCst);
    }

    /// Emits an event to every live listener of `kind`. Returns how many received it.
    pub fn fire(&self, kind: StakingEventKind, user: Address, amount: U256) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, token)| *k == kind && !token.is_cancelled())
            .filter(|(_, sink, _)| sink.send(StakingEventLog { kind, user, amount }).is_ok())
            .count()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, token)| !token.is_cancelled())
            .count()
    }

    pub fn released_subscriptions(&self) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, token)| token.is_cancelled())
            .count()
    }

    pub fn active_for(&self, kind: StakingEventKind) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, token)| *k == kind && !token.is_cancelled())
            .count()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StakingPool for MockPool {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        Ok(self.staked.lock().unwrap().get(&account).copied().unwrap_or_default())
    }

    async fn earned(&self, account: Address) -> Result<U256, ContractError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ContractError::Call {
                method: "earned",
                message: "execution reverted".to_string(),
            });
        }
        Ok(self.earned.lock().unwrap().get(&account).copied().unwrap_or_default())
    }

    async fn subscribe(&self, kind: StakingEventKind, sink: EventSink) -> Result<Subscription, ContractError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.subscribe_failing.load(Ordering::SeqCst) {
            return Err(ContractError::Subscription {
                event: kind.name(),
                message: "filter not supported".to_string(),
            });
        }
        let token = CancellationToken::new();
        self.listeners.lock().unwrap().push((kind, sink, token.clone()));
        Ok(Subscription::new(kind, self.address, token))
    }
}

// === Mock Executor ===
#[derive(Debug)]
pub struct MockExecutor {
    outcome: Result<ExecutionReceipt, ExecutionError>,
    pub received: Mutex<Vec<(Scenario, TransactionRequest)>>,
}

impl MockExecutor {
    pub fn succeeding() -> Self {
        Self {
            outcome: Ok(ExecutionReceipt {
                tx_hash: H256::repeat_byte(0x11),
            }),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            outcome: Err(ExecutionError::Rejected(reason.to_string())),
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScenarioExecutor for MockExecutor {
    async fn execute(&self, scenario: &Scenario, request: TransactionRequest) -> Result<ExecutionReceipt, ExecutionError> {
        self.received.lock().unwrap().push((scenario.clone(), request));
        self.outcome.clone()
    }
}
