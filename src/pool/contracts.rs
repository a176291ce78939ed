// src/pool/contracts.rs

//! Ethers-backed implementations of the pool contract seams, over a websocket provider.

use async_trait::async_trait;
use ethers::{
    contract::{builders::Event, EthLogDecode},
    providers::{Provider, Ws},
    types::{Address, U256},
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::{select, sync::oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::PoolDescriptor,
    errors::ContractError,
    pool::bindings::{
        EventSink, PoolContracts, StakingEventKind, StakingEventLog, StakingPool, StakingToken, Subscription,
    },
};

pub mod staking {
    ethers::contract::abigen!(
        StakingRewardsContract,
        r#"[
            function balanceOf(address account) external view returns (uint256)
            function earned(address account) external view returns (uint256)
            function stake(uint256 amount) external
            function withdraw(uint256 amount) external
            function getReward() external
            function exit() external
            event Staked(address indexed user, uint256 amount)
            event Withdrawn(address indexed user, uint256 amount)
            event RewardPaid(address indexed user, uint256 reward)
        ]"#
    );
}

pub mod erc20 {
    ethers::contract::abigen!(
        Erc20Token,
        r#"[
            function balanceOf(address account) external view returns (uint256)
        ]"#
    );
}

type WsProvider = Provider<Ws>;

//================================================================================================//
//                                          TOKEN                                                 //
//================================================================================================//

#[derive(Debug, Clone)]
pub struct EthersStakingToken {
    contract: erc20::Erc20Token<WsProvider>,
}

impl EthersStakingToken {
    pub fn new(address: Address, provider: Arc<WsProvider>) -> Self {
        Self {
            contract: erc20::Erc20Token::new(address, provider),
        }
    }
}

#[async_trait]
impl StakingToken for EthersStakingToken {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        self.contract
            .balance_of(account)
            .call()
            .await
            .map_err(|e| ContractError::Call {
                method: "balanceOf",
                message: e.to_string(),
            })
    }
}

//================================================================================================//
//                                          POOL                                                  //
//================================================================================================//

#[derive(Debug, Clone)]
pub struct EthersStakingPool {
    contract: staking::StakingRewardsContract<WsProvider>,
}

impl EthersStakingPool {
    pub fn new(address: Address, provider: Arc<WsProvider>) -> Self {
        Self {
            contract: staking::StakingRewardsContract::new(address, provider),
        }
    }
}

#[async_trait]
impl StakingPool for EthersStakingPool {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        self.contract
            .balance_of(account)
            .call()
            .await
            .map_err(|e| ContractError::Call {
                method: "balanceOf",
                message: e.to_string(),
            })
    }

    async fn earned(&self, account: Address) -> Result<U256, ContractError> {
        self.contract
            .earned(account)
            .call()
            .await
            .map_err(|e| ContractError::Call {
                method: "earned",
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, kind: StakingEventKind, sink: EventSink) -> Result<Subscription, ContractError> {
        let token = CancellationToken::new();
        let ready = match kind {
            StakingEventKind::Staked => spawn_forwarder(
                self.contract.staked_filter(),
                kind,
                sink,
                token.clone(),
                |e: staking::StakedFilter| (e.user, e.amount),
            ),
            StakingEventKind::Withdrawn => spawn_forwarder(
                self.contract.withdrawn_filter(),
                kind,
                sink,
                token.clone(),
                |e: staking::WithdrawnFilter| (e.user, e.amount),
            ),
            StakingEventKind::RewardPaid => spawn_forwarder(
                self.contract.reward_paid_filter(),
                kind,
                sink,
                token.clone(),
                |e: staking::RewardPaidFilter| (e.user, e.reward),
            ),
        };

        match ready.await {
            Ok(Ok(())) => Ok(Subscription::new(kind, self.address(), token)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ContractError::Subscription {
                event: kind.name(),
                message: "subscription task exited before reporting".to_string(),
            }),
        }
    }
}

/// Spawns a task that opens the event stream and forwards decoded logs until `token`
/// is cancelled. The returned channel reports whether the stream opened.
fn spawn_forwarder<D, F>(
    event: Event<Arc<WsProvider>, WsProvider, D>,
    kind: StakingEventKind,
    sink: EventSink,
    token: CancellationToken,
    fields: F,
) -> oneshot::Receiver<Result<(), ContractError>>
where
    D: EthLogDecode + Send + Sync + 'static,
    F: Fn(D) -> (Address, U256) + Send + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel();

    tokio::spawn(async move {
        let stream = match event.subscribe().await {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(ContractError::Subscription {
                    event: kind.name(),
                    message: e.to_string(),
                }));
                return;
            }
        };
        debug!(target: "invalidator", event = kind.name(), "Event stream opened");
        tokio::pin!(stream);

        loop {
            select! {
                biased;
                _ = token.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(decoded)) => {
                        let (user, amount) = fields(decoded);
                        if sink.send(StakingEventLog { kind, user, amount }).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(target: "invalidator", event = kind.name(), error = %e, "Failed to decode event log");
                    }
                    None => {
                        warn!(target: "invalidator", event = kind.name(), "Event stream ended");
                        break;
                    }
                },
            }
        }
        debug!(target: "invalidator", event = kind.name(), "Event forwarder stopped");
    });

    ready_rx
}

/// Connects to `ws_url` and builds the contracts for one pool.
pub async fn connect_pool(descriptor: PoolDescriptor, ws_url: &str) -> Result<PoolContracts, ContractError> {
    let provider = Provider::<Ws>::connect(ws_url)
        .await
        .map_err(|e| ContractError::Provider(e.to_string()))?;
    let provider = Arc::new(provider);

    info!(
        target: "pool_read_model",
        pool = ?descriptor.staking_pool,
        token = ?descriptor.staking_token,
        "Connected pool contracts"
    );

    Ok(PoolContracts {
        token: Arc::new(EthersStakingToken::new(descriptor.staking_token, provider.clone())),
        pool: Arc::new(EthersStakingPool::new(descriptor.staking_pool, provider)),
        descriptor,
    })
}
