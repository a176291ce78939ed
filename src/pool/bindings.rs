// src/pool/bindings.rs

//! # Pool Contract Bindings
//!
//! The seams between the pool layer and the chain: a staking token, a staking pool and
//! the handle through which both become available. Bindings start out pending and are
//! installed once the connection is up; readers and subscribers wait on
//! [`ContractBindings::wait_ready`] instead of polling.

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{config::PoolDescriptor, errors::ContractError};

//================================================================================================//
//                                      STAKING EVENTS                                            //
//================================================================================================//

/// Pool events that change a user's balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StakingEventKind {
    Staked,
    Withdrawn,
    RewardPaid,
}

impl StakingEventKind {
    pub const ALL: [StakingEventKind; 3] = [
        StakingEventKind::Staked,
        StakingEventKind::Withdrawn,
        StakingEventKind::RewardPaid,
    ];

    /// Solidity event name.
    pub fn name(&self) -> &'static str {
        match self {
            StakingEventKind::Staked => "Staked",
            StakingEventKind::Withdrawn => "Withdrawn",
            StakingEventKind::RewardPaid => "RewardPaid",
        }
    }
}

/// A decoded pool event. `amount` is the staked/withdrawn amount or the reward paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingEventLog {
    pub kind: StakingEventKind,
    pub user: Address,
    pub amount: U256,
}

pub type EventSink = mpsc::UnboundedSender<StakingEventLog>;

/// A live event subscription. Delivery stops on [`Subscription::unsubscribe`] or drop.
#[derive(Debug)]
pub struct Subscription {
    kind: StakingEventKind,
    contract: Address,
    token: CancellationToken,
    released: AtomicBool,
}

impl Subscription {
    pub fn new(kind: StakingEventKind, contract: Address, token: CancellationToken) -> Self {
        Self {
            kind,
            contract,
            token,
            released: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> StakingEventKind {
        self.kind
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    /// Releases the subscription. Returns `false` if it was already released.
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        debug!(target: "invalidator", event = self.kind.name(), contract = ?self.contract, "Unsubscribed");
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

//================================================================================================//
//                                      CONTRACT SEAMS                                            //
//================================================================================================//

/// The token users stake.
#[async_trait]
pub trait StakingToken: Send + Sync + fmt::Debug {
    fn address(&self) -> Address;

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError>;
}

/// The staking rewards pool.
#[async_trait]
pub trait StakingPool: Send + Sync + fmt::Debug {
    fn address(&self) -> Address;

    /// Amount staked by `account`.
    async fn balance_of(&self, account: Address) -> Result<U256, ContractError>;

    /// Rewards accrued by `account` and not yet claimed.
    async fn earned(&self, account: Address) -> Result<U256, ContractError>;

    /// Forwards every `kind` event of this pool, for all users, into `sink`.
    async fn subscribe(&self, kind: StakingEventKind, sink: EventSink) -> Result<Subscription, ContractError>;
}

#[derive(Debug, Clone)]
pub struct PoolContracts {
    pub descriptor: PoolDescriptor,
    pub token: Arc<dyn StakingToken>,
    pub pool: Arc<dyn StakingPool>,
}

/// Shared, late-initialized handle to a pool's contracts.
#[derive(Debug, Clone)]
pub struct ContractBindings {
    inner: Arc<watch::Sender<Option<Arc<PoolContracts>>>>,
}

impl ContractBindings {
    /// Bindings that are not available yet.
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { inner: Arc::new(tx) }
    }

    pub fn ready(contracts: PoolContracts) -> Self {
        let bindings = Self::pending();
        bindings.install(contracts);
        bindings
    }

    pub fn install(&self, contracts: PoolContracts) {
        info!(
            target: "pool_read_model",
            pool = ?contracts.pool.address(),
            token = ?contracts.token.address(),
            "Contract bindings ready"
        );
        self.inner.send_replace(Some(Arc::new(contracts)));
    }

    pub fn current(&self) -> Option<Arc<PoolContracts>> {
        self.inner.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.borrow().is_some()
    }

    /// Resolves once bindings are installed.
    pub async fn wait_ready(&self) -> Option<Arc<PoolContracts>> {
        let mut rx = self.inner.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let token = CancellationToken::new();
        let sub = Subscription::new(StakingEventKind::Staked, Address::zero(), token.clone());

        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let token = CancellationToken::new();
        drop(Subscription::new(StakingEventKind::RewardPaid, Address::zero(), token.clone()));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_pending_bindings_are_not_ready() {
        assert!(!ContractBindings::pending().is_ready());
        assert!(ContractBindings::pending().current().is_none());
    }
}
