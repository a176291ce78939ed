// src/pool/invalidator.rs

//! # Event-Driven Invalidator
//!
//! Keeps a pool's balances snapshot fresh by listening to the pool's `Staked`,
//! `Withdrawn` and `RewardPaid` events and refreshing when one concerns the active
//! account.
//!
//! Subscriptions are opened only once the bindings are installed and a snapshot for the
//! account exists; until then the watch is deferred. Switching accounts releases every
//! subscription of the previous account exactly once before new ones are opened.

use ethers::types::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    select,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    pool::{
        bindings::{StakingEventKind, StakingEventLog, Subscription},
        read_model::PoolReadModel,
    },
    store::StateSlice,
    types::PoolSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidatorStatus {
    #[default]
    Inactive,
    /// Waiting for bindings or a first snapshot before subscribing.
    Deferred(Address),
    Subscribed(Address),
    /// No event subscription could be opened; balances refresh only on demand.
    Failed(Address),
}

#[derive(Debug)]
struct AccountWatch {
    account: Address,
    token: CancellationToken,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl AccountWatch {
    fn teardown(self) -> usize {
        self.token.cancel();
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        let released = subscriptions.iter().filter(|s| s.unsubscribe()).count();
        debug!(target: "invalidator", account = ?self.account, released, "Account watch torn down");
        released
    }
}

#[derive(Debug)]
pub struct EventInvalidator {
    read_model: Arc<PoolReadModel>,
    active: Mutex<Option<AccountWatch>>,
    status: Arc<StateSlice<InvalidatorStatus>>,
}

impl EventInvalidator {
    pub fn new(read_model: Arc<PoolReadModel>) -> Self {
        Self {
            read_model,
            active: Mutex::new(None),
            status: Arc::new(StateSlice::new("invalidator_status", InvalidatorStatus::Inactive)),
        }
    }

    pub fn status(&self) -> InvalidatorStatus {
        self.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<InvalidatorStatus> {
        self.status.subscribe()
    }

    /// Number of live event subscriptions held for the active account.
    pub fn subscription_count(&self) -> usize {
        self.active
            .lock()
            .as_ref()
            .map(|w| w.subscriptions.lock().len())
            .unwrap_or(0)
    }

    /// Moves the watch to `account`, or stops watching on `None`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_account(&self, account: Option<Address>) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.teardown();
        }

        let Some(account) = account else {
            self.status.replace(InvalidatorStatus::Inactive);
            return;
        };

        self.status.replace(InvalidatorStatus::Deferred(account));
        let token = CancellationToken::new();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(run_watch(
            account,
            self.read_model.clone(),
            token.clone(),
            subscriptions.clone(),
            self.status.clone(),
        ));
        *active = Some(AccountWatch {
            account,
            token,
            subscriptions,
        });
    }

    pub fn dispose(&self) {
        if let Some(previous) = self.active.lock().take() {
            previous.teardown();
        }
        self.status.replace(InvalidatorStatus::Inactive);
    }
}

impl Drop for EventInvalidator {
    fn drop(&mut self) {
        if let Some(previous) = self.active.get_mut().take() {
            previous.teardown();
        }
    }
}

async fn run_watch(
    account: Address,
    read_model: Arc<PoolReadModel>,
    token: CancellationToken,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    status: Arc<StateSlice<InvalidatorStatus>>,
) {
    let contracts = select! {
        _ = token.cancelled() => return,
        contracts = read_model.bindings().wait_ready() => match contracts {
            Some(contracts) => contracts,
            None => return,
        },
    };

    let mut snapshots = read_model.subscribe();
    let has_snapshot = select! {
        _ = token.cancelled() => return,
        ready = wait_for_snapshot(&mut snapshots, account) => ready,
    };
    if !has_snapshot {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut opened = Vec::with_capacity(StakingEventKind::ALL.len());
    for kind in StakingEventKind::ALL {
        match contracts.pool.subscribe(kind, tx.clone()).await {
            Ok(subscription) => opened.push(subscription),
            Err(e) => warn!(target: "invalidator", event = kind.name(), error = %e, "Failed to subscribe"),
        }
    }
    drop(tx);

    if opened.len() < StakingEventKind::ALL.len() {
        warn!(
            target: "invalidator",
            ?account,
            opened = opened.len(),
            expected = StakingEventKind::ALL.len(),
            "Some pool event subscriptions failed"
        );
    }
    if opened.is_empty() {
        status.update_if(|s| {
            if token.is_cancelled() {
                return false;
            }
            *s = InvalidatorStatus::Failed(account);
            true
        });
        return;
    }

    {
        let mut held = subscriptions.lock();
        if token.is_cancelled() {
            drop(held);
            for subscription in &opened {
                subscription.unsubscribe();
            }
            return;
        }
        held.extend(opened);
    }
    status.update_if(|s| {
        if token.is_cancelled() {
            return false;
        }
        *s = InvalidatorStatus::Subscribed(account);
        true
    });
    info!(target: "invalidator", ?account, pool = ?contracts.pool.address(), "Watching pool events");

    loop {
        select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(log) => {
                    on_event(&read_model, account, &log).await;
                }
                None => {
                    debug!(target: "invalidator", ?account, "All event streams closed");
                    break;
                }
            },
        }
    }
}

async fn wait_for_snapshot(rx: &mut watch::Receiver<Option<PoolSnapshot>>, account: Address) -> bool {
    loop {
        let ready = matches!(&*rx.borrow_and_update(), Some(s) if s.account == account);
        if ready {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

/// Refreshes the read-model when `log` concerns `account`. Returns whether it did.
async fn on_event(read_model: &PoolReadModel, account: Address, log: &StakingEventLog) -> bool {
    if log.user != account {
        return false;
    }
    debug!(target: "invalidator", event = log.kind.name(), amount = %log.amount, "Event for active account");
    read_model.refresh(account).await;
    true
}
