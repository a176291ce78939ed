//! # Centralized Error Handling
//!
//! Typed error enums for every boundary of the crate: the indexing service, the
//! contract bindings, scenario staging and hand-off to the execution component.
//! `SyncError` is the top-level error that the session and account layers return.

use crate::scenario::PoolAction;
use thiserror::Error;

/// The top-level error type for the synchronization layer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Indexer error: {0}")]
    Indexer(#[from] IndexerError),
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Unknown pool: {0}")]
    UnknownPool(String),
    #[error("System shut down")]
    Shutdown,
}

/// Failures talking to the transaction-indexing service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexerError {
    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("Indexer returned HTTP {status} for {query}")]
    Status { query: &'static str, status: u16 },
    #[error("GraphQL error in {query}: {message}")]
    GraphQl { query: &'static str, message: String },
    #[error("Response parsing error in {query}: {message}")]
    ResponseParse { query: &'static str, message: String },
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

/// Failures reading from, or subscribing to, the staking contracts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Call to {method} failed: {message}")]
    Call { method: &'static str, message: String },
    #[error("Subscription to {event} failed: {message}")]
    Subscription { event: &'static str, message: String },
    #[error("Amount conversion failed: {0}")]
    Conversion(String),
}

/// Caller-side contract violations when staging or handing off a scenario.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Action {0:?} is not enabled for the current balances")]
    ActionDisabled(PoolAction),
    #[error("No balances snapshot is available yet")]
    NoSnapshot,
    #[error("No scenario is staged")]
    NoActiveScenario,
    #[error("Scenario for {0:?} is missing its call parameter")]
    MissingParameter(PoolAction),
    #[error("Cannot {operation} while session is {phase}")]
    InvalidPhase { operation: &'static str, phase: String },
}

/// Failures reported back by the external execution component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Transaction rejected by user: {0}")]
    Rejected(String),
    #[error("Transaction failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_keep_context() {
        let err: SyncError = IndexerError::Status { query: "issued", status: 502 }.into();
        assert_eq!(err.to_string(), "Indexer error: Indexer returned HTTP 502 for issued");

        let err: SyncError = ScenarioError::ActionDisabled(PoolAction::Claim).into();
        assert!(err.to_string().contains("Claim"));
    }
}
