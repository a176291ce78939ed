// src/history/aggregator.rs

//! # Transaction History Aggregator
//!
//! Fetches every activity category for one account concurrently, normalizes the
//! results and publishes a single timeline ordered by descending timestamp.
//!
//! - **All-or-nothing:** the seven queries are joined; one failure fails the whole
//!   fetch and the previously published events stay untouched.
//! - **Request tokens:** every fetch takes a monotonically increasing token. A response
//!   commits only if no newer response has committed already, so a slow, older
//!   response never overwrites newer state. While a newer fetch is still in flight the
//!   status stays `Refreshing`. A reported failure settles its token too, so an older
//!   success arriving afterwards is dropped rather than hiding the error.
//! - **Tie order:** events with equal timestamps keep the source order in
//!   [`MERGE_ORDER`]. The sort is stable and deterministic, but it is a priority
//!   convention rather than a chain-level ordering.

use chrono::Utc;
use ethers::types::Address;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    history::normalizer::normalize,
    indexer::{ExchangeWindow, IndexerClient},
    store::StateSlice,
    types::{FetchStatus, RawEvent, TransactionCategory, TransactionEvent, TransactionHistoryState},
};

/// Source priority used when timestamps tie.
pub const MERGE_ORDER: [TransactionCategory; 7] = [
    TransactionCategory::Issued,
    TransactionCategory::Burned,
    TransactionCategory::FeesClaimed,
    TransactionCategory::Exchange,
    TransactionCategory::ClearedDeposit,
    TransactionCategory::DepotExchange,
    TransactionCategory::DepotAction,
];

fn merge_rank(category: TransactionCategory) -> usize {
    MERGE_ORDER
        .iter()
        .position(|c| *c == category)
        .unwrap_or(MERGE_ORDER.len())
}

/// Normalizes and merges per-category batches into one descending timeline.
///
/// Batches are first put in [`MERGE_ORDER`], then flattened and stable-sorted by
/// timestamp, so equal timestamps keep source priority and in-batch order.
pub fn merge_event_batches(mut batches: Vec<(TransactionCategory, Vec<RawEvent>)>) -> Vec<TransactionEvent> {
    batches.sort_by_key(|(category, _)| merge_rank(*category));

    let mut events: Vec<TransactionEvent> = batches
        .into_iter()
        .flat_map(|(category, records)| records.into_iter().map(move |raw| normalize(raw, category)))
        .collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events
}

/// How a single `fetch_history` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFetch {
    Committed { events: usize },
    /// A newer fetch was issued while this one was in flight; its result was dropped.
    Superseded,
    Failed(String),
    Disposed,
}

#[derive(Debug)]
pub struct HistoryAggregator {
    indexer: Arc<dyn IndexerClient>,
    window: ExchangeWindow,
    state: StateSlice<TransactionHistoryState>,
    latest_request: AtomicU64,
    latest_commit: AtomicU64,
    disposed: CancellationToken,
}

impl HistoryAggregator {
    pub fn new(indexer: Arc<dyn IndexerClient>, window: ExchangeWindow) -> Self {
        Self {
            indexer,
            window,
            state: StateSlice::new("transaction_history", TransactionHistoryState::default()),
            latest_request: AtomicU64::new(0),
            latest_commit: AtomicU64::new(0),
            disposed: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> TransactionHistoryState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionHistoryState> {
        self.state.subscribe()
    }

    /// Fetches, merges and publishes the full history for `account`.
    ///
    /// Failures are reported through the published state (and the returned value),
    /// never as an error.
    #[instrument(skip(self))]
    pub async fn fetch_history(&self, account: Address) -> HistoryFetch {
        if self.disposed.is_cancelled() {
            return HistoryFetch::Disposed;
        }

        let mut generation = 0;
        self.state.update(|s| {
            generation = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
            s.fetch_error = None;
            s.status = if s.is_fetched() {
                FetchStatus::Refreshing
            } else {
                FetchStatus::Fetching
            };
        });
        info!(target: "history", ?account, generation, "Fetching transaction history");

        let indexer = &self.indexer;
        let fetched = tokio::try_join!(
            indexer.issued(account),
            indexer.burned(account),
            indexer.fees_claimed(account),
            indexer.exchanges_since(account, self.window),
            indexer.depot_user_actions(account),
            indexer.depot_cleared_deposits(account),
            indexer.depot_exchanges(account),
        );

        match fetched {
            Ok((issued, burned, fees_claimed, exchanges, depot_actions, cleared_deposits, depot_exchanges)) => {
                let events = merge_event_batches(vec![
                    (TransactionCategory::Issued, issued),
                    (TransactionCategory::Burned, burned),
                    (TransactionCategory::FeesClaimed, fees_claimed),
                    (TransactionCategory::Exchange, exchanges),
                    (TransactionCategory::ClearedDeposit, cleared_deposits),
                    (TransactionCategory::DepotExchange, depot_exchanges),
                    (TransactionCategory::DepotAction, depot_actions),
                ]);
                self.commit_success(generation, events)
            }
            Err(e) => self.commit_failure(generation, e.to_string()),
        }
    }

    fn commit_success(&self, generation: u64, events: Vec<TransactionEvent>) -> HistoryFetch {
        let count = events.len();
        let mut events = Some(events);
        let committed = self.state.update_if(|s| {
            if !self.may_commit(generation) {
                return false;
            }
            self.latest_commit.store(generation, Ordering::SeqCst);
            s.events = Arc::new(events.take().unwrap_or_default());
            s.status = if self.latest_request.load(Ordering::SeqCst) > generation {
                FetchStatus::Refreshing
            } else {
                FetchStatus::Fetched
            };
            s.fetch_error = None;
            s.fetched_at = Some(Utc::now());
            true
        });

        if committed {
            info!(target: "history", generation, events = count, "Transaction history updated");
            HistoryFetch::Committed { events: count }
        } else {
            self.dropped(generation)
        }
    }

    fn commit_failure(&self, generation: u64, message: String) -> HistoryFetch {
        // A failure only surfaces from the latest request; an in-flight newer fetch
        // will settle the state on its own.
        let committed = self.state.update_if(|s| {
            if !self.may_commit(generation) || self.latest_request.load(Ordering::SeqCst) != generation {
                return false;
            }
            // Settled: older responses arriving later are dropped.
            self.latest_commit.store(generation, Ordering::SeqCst);
            s.status = FetchStatus::Error;
            s.fetch_error = Some(message.clone());
            true
        });

        if committed {
            warn!(target: "history", generation, error = %message, "Transaction history fetch failed");
            HistoryFetch::Failed(message)
        } else {
            self.dropped(generation)
        }
    }

    fn may_commit(&self, generation: u64) -> bool {
        !self.disposed.is_cancelled() && generation > self.latest_commit.load(Ordering::SeqCst)
    }

    fn dropped(&self, generation: u64) -> HistoryFetch {
        if self.disposed.is_cancelled() {
            debug!(target: "history", generation, "Aggregator disposed; dropping response");
            HistoryFetch::Disposed
        } else {
            debug!(target: "history", generation, "Superseded by a newer fetch; dropping response");
            HistoryFetch::Superseded
        }
    }

    /// Clears the published history and invalidates in-flight fetches.
    /// Used when the active account changes.
    pub fn reset(&self) {
        self.state.update(|s| {
            let generation = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
            self.latest_commit.store(generation, Ordering::SeqCst);
            *s = TransactionHistoryState::default();
        });
    }

    /// After disposal no response, late or not, touches the state.
    pub fn dispose(&self) {
        self.disposed.cancel();
    }
}
