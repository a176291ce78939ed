//! Staking-pool balance tracking: contract bindings, the balances read-model and the
//! event-driven invalidator that keeps it fresh.

pub mod bindings;
pub mod contracts;
pub mod invalidator;
pub mod read_model;

pub use bindings::{
    ContractBindings, EventSink, PoolContracts, StakingEventKind, StakingEventLog, StakingPool,
    StakingToken, Subscription,
};
pub use invalidator::{EventInvalidator, InvalidatorStatus};
pub use read_model::{PoolReadModel, RefreshOutcome};
