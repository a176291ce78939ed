//! # Core Type Definitions
//!
//! Shared data structures for the history and pool layers: the typed transaction
//! event model, history fetch state and the pool balances snapshot.

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, sync::Arc};

use crate::{decimals::raw_to_decimal, errors::ContractError};

/// A raw indexer record: an arbitrary JSON object with an optional `type` and a
/// `timestamp` field.
pub type RawEvent = serde_json::Map<String, serde_json::Value>;

//================================================================================================//
//                                     TRANSACTION EVENTS                                         //
//================================================================================================//

/// The seven semantic classes of indexed activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionCategory {
    Issued,
    Burned,
    FeesClaimed,
    Exchange,
    DepotAction,
    ClearedDeposit,
    DepotExchange,
}

impl TransactionCategory {
    pub const ALL: [TransactionCategory; 7] = [
        TransactionCategory::Issued,
        TransactionCategory::Burned,
        TransactionCategory::FeesClaimed,
        TransactionCategory::Exchange,
        TransactionCategory::DepotAction,
        TransactionCategory::ClearedDeposit,
        TransactionCategory::DepotExchange,
    ];

    /// The event-type label stamped on records that arrive without their own `type`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            TransactionCategory::Issued => "issued",
            TransactionCategory::Burned => "burned",
            TransactionCategory::FeesClaimed => "feesClaimed",
            TransactionCategory::Exchange => "traded",
            TransactionCategory::DepotAction => "depotAction",
            TransactionCategory::ClearedDeposit => "cleared",
            TransactionCategory::DepotExchange => "exchanged",
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One normalized history entry.
///
/// `category` is the source the record was fetched from and is always set.
/// `event_type` is the record's own `type` label when it carried one, otherwise the
/// category's wire name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub category: TransactionCategory,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: u64,
    pub payload: RawEvent,
}

//================================================================================================//
//                                       HISTORY STATE                                            //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Fetching,
    Fetched,
    Refreshing,
    Error,
}

/// The history slice published to the rendering layer.
#[derive(Debug, Clone, Default)]
pub struct TransactionHistoryState {
    /// Descending by timestamp. Replaced wholesale, never edited in place.
    pub events: Arc<Vec<TransactionEvent>>,
    pub status: FetchStatus,
    pub fetch_error: Option<String>,
    /// Time of the last successful fetch.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl TransactionHistoryState {
    pub fn is_fetching(&self) -> bool {
        matches!(self.status, FetchStatus::Fetching | FetchStatus::Refreshing)
    }

    pub fn is_refreshing(&self) -> bool {
        self.status == FetchStatus::Refreshing
    }

    pub fn is_fetched(&self) -> bool {
        self.fetched_at.is_some()
    }
}

//================================================================================================//
//                                       POOL BALANCES                                            //
//================================================================================================//

/// A user's position in one staking pool, all fields from the same refresh.
///
/// `*_raw` fields are the on-chain integers used as call parameters; the others are
/// decimal values for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolBalances {
    pub held_amount: Decimal,
    pub held_amount_raw: U256,
    pub staked_amount: Decimal,
    pub staked_amount_raw: U256,
    pub reward_amount: Decimal,
    pub reward_amount_raw: U256,
}

impl PoolBalances {
    pub fn from_raw(
        held: U256,
        staked: U256,
        reward: U256,
        staking_decimals: u32,
        reward_decimals: u32,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            held_amount: raw_to_decimal(held, staking_decimals)?,
            held_amount_raw: held,
            staked_amount: raw_to_decimal(staked, staking_decimals)?,
            staked_amount_raw: staked,
            reward_amount: raw_to_decimal(reward, reward_decimals)?,
            reward_amount_raw: reward,
        })
    }
}

/// The read-model's published value: balances plus the account they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub account: Address,
    pub balances: PoolBalances,
    pub fetched_at: DateTime<Utc>,
}
