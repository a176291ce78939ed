use std::sync::{Arc, Once};
use std::time::Duration;

use ethers::types::{Address, U256};
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use activity_sync::{
    config::PoolDescriptor,
    pool::{ContractBindings, PoolContracts},
    scenario::GasLimits,
    session::PoolSession,
    types::RawEvent,
};

pub mod mocks;

use mocks::{MockPool, MockToken};

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub const POOL_KEY: &str = "unipoolSETH";

pub fn account(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// `amount` whole tokens at 18 decimals.
pub fn tokens(amount: u64) -> U256 {
    U256::exp10(18) * U256::from(amount)
}

pub fn descriptor() -> PoolDescriptor {
    PoolDescriptor {
        staking_pool: Address::repeat_byte(0xaa),
        staking_token: Address::repeat_byte(0xbb),
        staking_symbol: "UNI-V2".to_string(),
        reward_symbol: "PLR".to_string(),
        staking_decimals: 18,
        reward_decimals: 18,
        explorer_base_url: None,
    }
}

pub fn record(value: Value) -> RawEvent {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be a JSON object, got {}", other),
    }
}

/// A record with a string timestamp, as the subgraphs return it.
pub fn stamped(id: &str, timestamp: u64) -> RawEvent {
    record(json!({ "id": id, "timestamp": timestamp.to_string() }))
}

pub struct PoolFixture {
    pub token: Arc<MockToken>,
    pub pool: Arc<MockPool>,
    pub bindings: ContractBindings,
    pub session: Arc<PoolSession>,
}

impl PoolFixture {
    /// Mock contracts for one pool and a session over bindings that are not yet installed.
    pub fn pending() -> Self {
        let descriptor = descriptor();
        let token = Arc::new(MockToken::new(descriptor.staking_token));
        let pool = Arc::new(MockPool::new(descriptor.staking_pool));
        let bindings = ContractBindings::pending();
        let session = Arc::new(PoolSession::new(
            POOL_KEY,
            bindings.clone(),
            descriptor,
            GasLimits::default(),
        ));
        Self {
            token,
            pool,
            bindings,
            session,
        }
    }

    pub fn ready() -> Self {
        let fixture = Self::pending();
        fixture.install();
        fixture
    }

    pub fn install(&self) {
        self.bindings.install(PoolContracts {
            descriptor: descriptor(),
            token: self.token.clone(),
            pool: self.pool.clone(),
        });
    }

    pub fn set_position(&self, user: Address, held: U256, staked: U256, reward: U256) {
        self.token.set_balance(user, held);
        self.pool.set_staked(user, staked);
        self.pool.set_earned(user, reward);
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}
