// src/sync.rs

//! # Account Synchronization
//!
//! Binds the history aggregator and every pool session to the active account. An
//! account change resets the history, then loads history and pool balances in parallel.

use ethers::types::Address;
use futures::future::join_all;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, instrument};

use crate::{
    config::Config,
    errors::SyncError,
    history::{HistoryAggregator, HistoryFetch},
    indexer::{GraphQlIndexerClient, IndexerClient},
    pool::{contracts::connect_pool, ContractBindings, RefreshOutcome},
    session::PoolSession,
    store::StateSlice,
};

/// What one `set_account` call did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// `None` when no account is active.
    pub history: Option<HistoryFetch>,
    pub pools: Vec<(String, RefreshOutcome)>,
}

#[derive(Debug)]
pub struct AccountSync {
    history: Arc<HistoryAggregator>,
    pools: HashMap<String, Arc<PoolSession>>,
    account: StateSlice<Option<Address>>,
}

impl AccountSync {
    pub fn new(history: Arc<HistoryAggregator>) -> Self {
        Self {
            history,
            pools: HashMap::new(),
            account: StateSlice::new("active_account", None),
        }
    }

    pub fn with_pool(mut self, key: impl Into<String>, session: Arc<PoolSession>) -> Self {
        self.pools.insert(key.into(), session);
        self
    }

    /// Builds the GraphQL indexer and one session per configured pool. Pool bindings
    /// start pending and are installed in the background as their connections come up.
    pub async fn connect(config: &Config) -> Result<Self, SyncError> {
        let indexer: Arc<dyn IndexerClient> = Arc::new(GraphQlIndexerClient::new(
            config.indexer.endpoints.clone(),
            config.indexer.timeout(),
        )?);
        let mut sync = Self::new(Arc::new(HistoryAggregator::new(indexer, config.indexer.exchange_window)));

        for (key, descriptor) in &config.pools {
            let bindings = ContractBindings::pending();
            let session = Arc::new(PoolSession::new(
                key.clone(),
                bindings.clone(),
                descriptor.clone(),
                config.gas_limits,
            ));

            let descriptor = descriptor.clone();
            let ws_url = config.rpc_ws_url.clone();
            let pool_key = key.clone();
            tokio::spawn(async move {
                match connect_pool(descriptor, &ws_url).await {
                    Ok(contracts) => bindings.install(contracts),
                    Err(e) => error!(target: "session", pool = %pool_key, error = %e, "Failed to connect pool contracts"),
                }
            });

            sync = sync.with_pool(key.clone(), session);
        }
        info!(target: "session", pools = sync.pools.len(), "Account sync ready");
        Ok(sync)
    }

    pub fn history(&self) -> &Arc<HistoryAggregator> {
        &self.history
    }

    pub fn pool(&self, key: &str) -> Result<&Arc<PoolSession>, SyncError> {
        self.pools.get(key).ok_or_else(|| SyncError::UnknownPool(key.to_string()))
    }

    pub fn pool_keys(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    pub fn account(&self) -> Option<Address> {
        self.account.snapshot()
    }

    /// Switches the active account and loads everything scoped to it.
    #[instrument(skip(self))]
    pub async fn set_account(&self, account: Option<Address>) -> SyncReport {
        if self.account() != account {
            self.history.reset();
            self.account.replace(account);
        }

        let history = async {
            match account {
                Some(account) => Some(self.history.fetch_history(account).await),
                None => None,
            }
        };
        let pools = join_all(self.pools.iter().map(|(key, session)| async move {
            (key.clone(), session.set_account(account).await)
        }));

        let (history, mut pools) = tokio::join!(history, pools);
        pools.sort_by(|a, b| a.0.cmp(&b.0));
        SyncReport { history, pools }
    }

    /// Refetches history for the active account.
    pub async fn refresh_history(&self) -> Option<HistoryFetch> {
        let account = self.account()?;
        Some(self.history.fetch_history(account).await)
    }

    pub fn dispose(&self) {
        self.history.dispose();
        for session in self.pools.values() {
            session.dispose();
        }
    }
}
