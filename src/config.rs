// src/config.rs

//! # Modular Configuration System
//!
//! Loads settings from a directory of JSON files: `main.json` (logging, RPC and
//! indexer settings), `pools.json` (staking pools by contract key) and an optional
//! `gas_limits.json`. `INDEXER_TIMEOUT_SECS` overrides the indexer request timeout.

use ethers::types::Address;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

use crate::{
    indexer::{ExchangeWindow, IndexerEndpoints},
    scenario::GasLimits,
};

const DEFAULT_EXPLORER: &str = "https://etherscan.io";
const TIMEOUT_ENV: &str = "INDEXER_TIMEOUT_SECS";

//================================================================================================//
//                                       Top-Level Config                                         //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub rpc_ws_url: String,
    pub indexer: IndexerConfig,
    /// Keyed by contract key, e.g. `"unipoolSETH"`.
    pub pools: HashMap<String, PoolDescriptor>,
    pub gas_limits: GasLimits,
}

#[derive(Debug, Deserialize)]
struct MainConfig {
    log_level: Option<String>,
    rpc_ws_url: String,
    indexer: IndexerConfig,
}

impl Config {
    pub async fn load_from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let main_config: MainConfig = Self::load_file(dir.join("main.json")).await?;
        let pools: HashMap<String, PoolDescriptor> = Self::load_file(dir.join("pools.json")).await?;

        let mut indexer = main_config.indexer;
        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            indexer.timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", TIMEOUT_ENV, raw))?;
        }

        Ok(Self {
            log_level: main_config.log_level.unwrap_or_else(|| "info".to_string()),
            rpc_ws_url: main_config.rpc_ws_url,
            indexer,
            pools,
            gas_limits: Self::load_optional_file(dir.join("gas_limits.json")).await?.unwrap_or_default(),
        })
    }

    async fn load_file<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from JSON: {}", path.as_ref().display()))
    }

    async fn load_optional_file<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<Option<T>> {
        if !path.as_ref().exists() {
            return Ok(None);
        }
        Self::load_file(path).await.map(Some)
    }

    pub fn get_pool(&self, key: &str) -> Result<&PoolDescriptor> {
        self.pools.get(key).ok_or_else(|| eyre::eyre!("Pool config not found: {}", key))
    }
}

//================================================================================================//
//                                        Indexer Config                                          //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub endpoints: IndexerEndpoints,
    #[serde(default)]
    pub exchange_window: ExchangeWindow,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl IndexerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

//================================================================================================//
//                                         Pool Config                                            //
//================================================================================================//

/// One staking pool: its contracts and how its amounts are displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub staking_pool: Address,
    pub staking_token: Address,
    /// Symbol of the staked token, e.g. `UNI-V2`.
    pub staking_symbol: String,
    /// Symbol of the reward token, e.g. `PLR`.
    pub reward_symbol: String,
    #[serde(default = "default_decimals")]
    pub staking_decimals: u32,
    #[serde(default = "default_decimals")]
    pub reward_decimals: u32,
    #[serde(default)]
    pub explorer_base_url: Option<String>,
}

fn default_decimals() -> u32 {
    18
}

impl PoolDescriptor {
    /// Block-explorer page of the staking pool contract.
    pub fn explorer_url(&self) -> String {
        let base = self.explorer_base_url.as_deref().unwrap_or(DEFAULT_EXPLORER);
        format!("{}/address/{:#x}", base.trim_end_matches('/'), self.staking_pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_descriptor_defaults_and_explorer_url() {
        let descriptor: PoolDescriptor = serde_json::from_str(
            r#"{
                "staking_pool": "0x00000000000000000000000000000000000000aa",
                "staking_token": "0x00000000000000000000000000000000000000bb",
                "staking_symbol": "UNI-V2",
                "reward_symbol": "PLR"
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.staking_decimals, 18);
        assert_eq!(descriptor.reward_decimals, 18);
        assert_eq!(
            descriptor.explorer_url(),
            "https://etherscan.io/address/0x00000000000000000000000000000000000000aa"
        );
    }
}
