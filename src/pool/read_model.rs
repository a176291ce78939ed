// src/pool/read_model.rs

//! # Pool Balances Read-Model
//!
//! Holds the latest balances snapshot for one staking pool and the active account.
//! A refresh reads the held, staked and earned amounts together and publishes them as
//! one snapshot, so the three values always come from the same refresh.
//!
//! Refreshes may overlap (event bursts, account switches). Each refresh takes a
//! monotonically increasing request token and publishes only if no newer refresh has
//! published already. A failed refresh leaves the previous snapshot in place.

use chrono::Utc;
use ethers::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    errors::ContractError,
    pool::bindings::ContractBindings,
    store::StateSlice,
    types::{PoolBalances, PoolSnapshot},
};

/// How a single refresh ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Bindings are not installed yet; nothing was read.
    NotReady,
    Updated,
    /// Published, but balances were identical to the previous snapshot.
    Unchanged,
    Superseded,
    Failed(String),
    Disposed,
}

#[derive(Debug)]
pub struct PoolReadModel {
    bindings: ContractBindings,
    snapshot: StateSlice<Option<PoolSnapshot>>,
    latest_request: AtomicU64,
    latest_commit: AtomicU64,
    disposed: CancellationToken,
}

impl PoolReadModel {
    pub fn new(bindings: ContractBindings) -> Self {
        Self {
            bindings,
            snapshot: StateSlice::new("pool_balances", None),
            latest_request: AtomicU64::new(0),
            latest_commit: AtomicU64::new(0),
            disposed: CancellationToken::new(),
        }
    }

    pub fn bindings(&self) -> &ContractBindings {
        &self.bindings
    }

    pub fn snapshot(&self) -> Option<PoolSnapshot> {
        self.snapshot.snapshot()
    }

    pub fn balances(&self) -> Option<PoolBalances> {
        self.snapshot.snapshot().map(|s| s.balances)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PoolSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Reads the three balances for `account` and publishes them as one snapshot.
    #[instrument(skip(self))]
    pub async fn refresh(&self, account: Address) -> RefreshOutcome {
        if self.disposed.is_cancelled() {
            return RefreshOutcome::Disposed;
        }
        let Some(contracts) = self.bindings.current() else {
            debug!(target: "pool_read_model", "Bindings not ready; skipping refresh");
            return RefreshOutcome::NotReady;
        };
        let generation = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let descriptor = &contracts.descriptor;

        let read = tokio::try_join!(
            contracts.token.balance_of(account),
            contracts.pool.balance_of(account),
            contracts.pool.earned(account),
        )
        .and_then(|(held, staked, reward)| {
            PoolBalances::from_raw(
                held,
                staked,
                reward,
                descriptor.staking_decimals,
                descriptor.reward_decimals,
            )
        });

        match read {
            Ok(balances) => self.publish(generation, account, balances),
            Err(e) => self.reject(generation, e),
        }
    }

    fn publish(&self, generation: u64, account: Address, balances: PoolBalances) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::Superseded;
        self.snapshot.update_if(|current| {
            if !self.may_commit(generation) {
                return false;
            }
            self.latest_commit.store(generation, Ordering::SeqCst);
            let changed = !matches!(
                current,
                Some(prev) if prev.account == account && prev.balances == balances
            );
            *current = Some(PoolSnapshot {
                account,
                balances,
                fetched_at: Utc::now(),
            });
            outcome = if changed {
                RefreshOutcome::Updated
            } else {
                RefreshOutcome::Unchanged
            };
            changed
        });

        match outcome {
            RefreshOutcome::Updated => {
                info!(target: "pool_read_model", generation, "Pool balances updated");
                outcome
            }
            RefreshOutcome::Unchanged => {
                debug!(target: "pool_read_model", generation, "Pool balances unchanged");
                outcome
            }
            _ => self.dropped(generation),
        }
    }

    fn reject(&self, generation: u64, error: ContractError) -> RefreshOutcome {
        if !self.may_commit(generation) {
            return self.dropped(generation);
        }
        warn!(
            target: "pool_read_model",
            generation,
            error = %error,
            "Balance refresh failed; keeping previous snapshot"
        );
        RefreshOutcome::Failed(error.to_string())
    }

    fn may_commit(&self, generation: u64) -> bool {
        !self.disposed.is_cancelled() && generation > self.latest_commit.load(Ordering::SeqCst)
    }

    fn dropped(&self, generation: u64) -> RefreshOutcome {
        if self.disposed.is_cancelled() {
            RefreshOutcome::Disposed
        } else {
            debug!(target: "pool_read_model", generation, "Superseded by a newer refresh; dropping result");
            RefreshOutcome::Superseded
        }
    }

    /// Drops the snapshot and invalidates in-flight refreshes. Used on account change.
    pub fn clear(&self) {
        self.snapshot.update_if(|current| {
            let generation = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
            self.latest_commit.store(generation, Ordering::SeqCst);
            current.take().is_some()
        });
    }

    pub fn dispose(&self) {
        self.disposed.cancel();
    }
}
