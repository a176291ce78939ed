// src/scenario.rs

//! # Scenario Orchestrator
//!
//! Builds the pending action ("scenario") a user is about to confirm against a staking
//! pool from the current balances snapshot, and holds at most one of them at a time.
//! The orchestrator does not validate: callers gate staging with
//! [`PoolAction::is_enabled`] or use [`ScenarioOrchestrator::stage_checked`].

use ethers::{
    abi::AbiEncode,
    types::{Address, Bytes, TransactionRequest, U256},
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    config::PoolDescriptor,
    decimals::format_currency,
    errors::ScenarioError,
    pool::contracts::staking::{ExitCall, GetRewardCall, StakeCall, WithdrawCall},
    store::StateSlice,
    types::PoolBalances,
};

//================================================================================================//
//                                         ACTIONS                                                //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolAction {
    Stake,
    Claim,
    Unstake,
    Exit,
}

impl PoolAction {
    pub const ALL: [PoolAction; 4] = [PoolAction::Stake, PoolAction::Claim, PoolAction::Unstake, PoolAction::Exit];

    /// Pool contract method the action calls.
    pub fn method(&self) -> &'static str {
        match self {
            PoolAction::Stake => "stake",
            PoolAction::Claim => "getReward",
            PoolAction::Unstake => "withdraw",
            PoolAction::Exit => "exit",
        }
    }

    /// Progress label shown while the transaction is pending.
    pub fn label(&self) -> &'static str {
        match self {
            PoolAction::Stake => "Staking",
            PoolAction::Claim => "Claiming",
            PoolAction::Unstake => "Unstaking",
            PoolAction::Exit => "Exiting",
        }
    }

    pub fn is_enabled(&self, balances: &PoolBalances) -> bool {
        match self {
            PoolAction::Stake => !balances.held_amount_raw.is_zero(),
            PoolAction::Claim => !balances.reward_amount_raw.is_zero(),
            PoolAction::Unstake => !balances.staked_amount_raw.is_zero(),
            PoolAction::Exit => !balances.staked_amount_raw.is_zero() || !balances.reward_amount_raw.is_zero(),
        }
    }
}

/// Actions available for `balances`; none without a snapshot.
pub fn enabled_actions(balances: Option<&PoolBalances>) -> Vec<PoolAction> {
    match balances {
        Some(b) => PoolAction::ALL.into_iter().filter(|a| a.is_enabled(b)).collect(),
        None => Vec::new(),
    }
}

/// Gas budget per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
    pub stake: u64,
    pub claim: u64,
    pub unstake: u64,
    pub exit: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            stake: 200_000,
            claim: 200_000,
            unstake: 125_000,
            exit: 250_000,
        }
    }
}

impl GasLimits {
    pub fn for_action(&self, action: PoolAction) -> u64 {
        match action {
            PoolAction::Stake => self.stake,
            PoolAction::Claim => self.claim,
            PoolAction::Unstake => self.unstake,
            PoolAction::Exit => self.exit,
        }
    }
}

//================================================================================================//
//                                         SCENARIO                                               //
//================================================================================================//

/// A staged, not yet executed pool action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub contract_key: String,
    pub action: PoolAction,
    pub method: &'static str,
    pub label: &'static str,
    pub display_amount: String,
    /// Raw amount argument for `stake` and `withdraw`; claim and exit take none.
    pub call_parameter: Option<U256>,
    pub gas_limit: u64,
}

impl Scenario {
    pub fn build(
        contract_key: &str,
        action: PoolAction,
        balances: &PoolBalances,
        descriptor: &PoolDescriptor,
        gas_limits: &GasLimits,
    ) -> Self {
        let staked = || format!("{} {}", format_currency(balances.staked_amount), descriptor.staking_symbol);
        let reward = || format!("{} {}", format_currency(balances.reward_amount), descriptor.reward_symbol);

        let (display_amount, call_parameter) = match action {
            PoolAction::Stake => (
                format!("{} {}", format_currency(balances.held_amount), descriptor.staking_symbol),
                Some(balances.held_amount_raw),
            ),
            PoolAction::Claim => (reward(), None),
            PoolAction::Unstake => (staked(), Some(balances.staked_amount_raw)),
            PoolAction::Exit => (format!("{} & {}", staked(), reward()), None),
        };

        Self {
            contract_key: contract_key.to_string(),
            action,
            method: action.method(),
            label: action.label(),
            display_amount,
            call_parameter,
            gas_limit: gas_limits.for_action(action),
        }
    }

    /// ABI-encoded call data for the pool method.
    pub fn call_data(&self) -> Result<Bytes, ScenarioError> {
        let encoded = match self.action {
            PoolAction::Stake => StakeCall {
                amount: self.parameter()?,
            }
            .encode(),
            PoolAction::Unstake => WithdrawCall {
                amount: self.parameter()?,
            }
            .encode(),
            PoolAction::Claim => GetRewardCall.encode(),
            PoolAction::Exit => ExitCall.encode(),
        };
        Ok(Bytes::from(encoded))
    }

    /// Unsigned transaction for the executor: target pool, call data and gas limit.
    pub fn transaction_request(&self, pool: Address) -> Result<TransactionRequest, ScenarioError> {
        Ok(TransactionRequest::new()
            .to(pool)
            .data(self.call_data()?)
            .gas(self.gas_limit))
    }

    fn parameter(&self) -> Result<U256, ScenarioError> {
        self.call_parameter.ok_or(ScenarioError::MissingParameter(self.action))
    }
}

//================================================================================================//
//                                       ORCHESTRATOR                                             //
//================================================================================================//

#[derive(Debug)]
pub struct ScenarioOrchestrator {
    contract_key: String,
    descriptor: PoolDescriptor,
    gas_limits: GasLimits,
    active: StateSlice<Option<Scenario>>,
    gas_hint: StateSlice<u64>,
}

impl ScenarioOrchestrator {
    pub fn new(contract_key: impl Into<String>, descriptor: PoolDescriptor, gas_limits: GasLimits) -> Self {
        Self {
            contract_key: contract_key.into(),
            descriptor,
            gas_hint: StateSlice::new("gas_hint", gas_limits.stake),
            gas_limits,
            active: StateSlice::new("active_scenario", None),
        }
    }

    pub fn contract_key(&self) -> &str {
        &self.contract_key
    }

    pub fn descriptor(&self) -> &PoolDescriptor {
        &self.descriptor
    }

    /// Builds a scenario from `balances` and makes it the active one, replacing any other.
    pub fn stage(&self, action: PoolAction, balances: &PoolBalances) -> Scenario {
        let scenario = Scenario::build(&self.contract_key, action, balances, &self.descriptor, &self.gas_limits);
        info!(
            target: "scenario",
            contract = %self.contract_key,
            method = scenario.method,
            amount = %scenario.display_amount,
            "Scenario staged"
        );
        self.active.replace(Some(scenario.clone()));
        scenario
    }

    /// Like [`stage`](Self::stage), but rejects actions the balances do not enable.
    pub fn stage_checked(&self, action: PoolAction, balances: Option<&PoolBalances>) -> Result<Scenario, ScenarioError> {
        let balances = balances.ok_or(ScenarioError::NoSnapshot)?;
        if !action.is_enabled(balances) {
            return Err(ScenarioError::ActionDisabled(action));
        }
        Ok(self.stage(action, balances))
    }

    /// Discards the active scenario, if any.
    pub fn clear(&self) -> Option<Scenario> {
        let mut cleared = None;
        self.active.update_if(|active| {
            cleared = active.take();
            cleared.is_some()
        });
        if cleared.is_some() {
            debug!(target: "scenario", contract = %self.contract_key, "Scenario cleared");
        }
        cleared
    }

    pub fn active(&self) -> Option<Scenario> {
        self.active.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Scenario>> {
        self.active.subscribe()
    }

    /// Points the gas hint at `action`'s budget; `None` restores the stake budget.
    pub fn preview_gas(&self, action: Option<PoolAction>) -> u64 {
        let limit = self.gas_limits.for_action(action.unwrap_or(PoolAction::Stake));
        self.gas_hint.update_if(|hint| {
            let changed = *hint != limit;
            *hint = limit;
            changed
        });
        limit
    }

    pub fn gas_hint(&self) -> u64 {
        self.gas_hint.snapshot()
    }

    pub fn subscribe_gas_hint(&self) -> watch::Receiver<u64> {
        self.gas_hint.subscribe()
    }
}
