//! Account activity history and staking-pool balance synchronization.
//!
//! - [`history`] merges indexed account activity into one timeline.
//! - [`pool`] keeps a staking pool's balances snapshot fresh from chain events.
//! - [`scenario`] and [`session`] stage and hand off stake/claim/unstake/exit actions.
//! - [`sync`] binds all of it to the active account.

pub mod config;
pub mod decimals;
pub mod errors;
pub mod history;
pub mod indexer;
pub mod pool;
pub mod scenario;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
