use std::time::Duration;

use ethers::types::U256;
use eyre::Result;
use rust_decimal::Decimal;
use tokio::time::sleep;

use activity_sync::pool::{InvalidatorStatus, StakingEventKind};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{account, eventually, init_tracing, tokens, PoolFixture};

/// Fixture with `account(1)` active and its three subscriptions live.
async fn subscribed_fixture() -> PoolFixture {
    let fixture = PoolFixture::ready();
    fixture.set_position(account(1), tokens(10), tokens(5), tokens(1));
    fixture.set_position(account(2), tokens(3), U256::zero(), U256::zero());
    fixture.session.set_account(Some(account(1))).await;
    assert!(
        eventually(|| fixture.session.invalidator().status() == InvalidatorStatus::Subscribed(account(1))).await
    );
    fixture
}

#[tokio::test]
async fn test_only_events_for_active_account_trigger_refresh() -> Result<()> {
    init_tracing();
    let fixture = subscribed_fixture().await;
    assert_eq!(fixture.pool.active_subscriptions(), 3);
    let baseline = fixture.token.calls();

    assert_eq!(fixture.pool.fire(StakingEventKind::Staked, account(2), tokens(1)), 1);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.token.calls(), baseline);

    assert_eq!(fixture.pool.fire(StakingEventKind::Staked, account(1), tokens(1)), 1);
    assert!(eventually(|| fixture.token.calls() == baseline + 1).await);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.token.calls(), baseline + 1);
    Ok(())
}

#[tokio::test]
async fn test_event_refresh_publishes_new_balances() -> Result<()> {
    init_tracing();
    let fixture = subscribed_fixture().await;

    fixture.pool.set_staked(account(1), tokens(8));
    fixture.pool.set_earned(account(1), U256::zero());
    fixture.pool.fire(StakingEventKind::RewardPaid, account(1), tokens(1));

    let read_model = fixture.session.read_model().clone();
    assert!(
        eventually(|| read_model.balances().map(|b| b.staked_amount) == Some(Decimal::from(8))).await
    );
    assert_eq!(read_model.balances().map(|b| b.reward_amount), Some(Decimal::ZERO));
    Ok(())
}

#[tokio::test]
async fn test_account_switch_replaces_all_subscriptions() -> Result<()> {
    init_tracing();
    let fixture = subscribed_fixture().await;
    assert_eq!(fixture.pool.subscribe_count(), 3);

    fixture.session.set_account(Some(account(2))).await;
    assert!(
        eventually(|| fixture.session.invalidator().status() == InvalidatorStatus::Subscribed(account(2))).await
    );

    assert_eq!(fixture.pool.subscribe_count(), 6);
    assert_eq!(fixture.pool.released_subscriptions(), 3);
    assert_eq!(fixture.pool.active_subscriptions(), 3);
    for kind in StakingEventKind::ALL {
        assert_eq!(fixture.pool.active_for(kind), 1);
    }
    assert_eq!(fixture.session.invalidator().subscription_count(), 3);

    // The previous account's listeners are gone.
    let baseline = fixture.token.calls();
    assert_eq!(fixture.pool.fire(StakingEventKind::Withdrawn, account(1), tokens(1)), 1);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.token.calls(), baseline);
    Ok(())
}

#[tokio::test]
async fn test_repeated_teardown_is_a_noop() -> Result<()> {
    init_tracing();
    let fixture = subscribed_fixture().await;
    let invalidator = fixture.session.invalidator();

    invalidator.dispose();
    assert_eq!(fixture.pool.active_subscriptions(), 0);
    assert_eq!(fixture.pool.released_subscriptions(), 3);
    assert_eq!(invalidator.status(), InvalidatorStatus::Inactive);

    invalidator.dispose();
    invalidator.watch_account(None);
    assert_eq!(fixture.pool.released_subscriptions(), 3);
    assert_eq!(invalidator.subscription_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_subscription_deferred_until_bindings_and_snapshot() -> Result<()> {
    init_tracing();
    let fixture = PoolFixture::pending();
    fixture.set_position(account(1), tokens(2), U256::zero(), U256::zero());

    fixture.session.set_account(Some(account(1))).await;
    assert_eq!(fixture.session.invalidator().status(), InvalidatorStatus::Deferred(account(1)));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.pool.subscribe_count(), 0);

    fixture.install();
    assert!(
        eventually(|| fixture.session.invalidator().status() == InvalidatorStatus::Subscribed(account(1))).await
    );
    assert!(fixture.session.read_model().snapshot().is_some());
    assert_eq!(fixture.pool.active_subscriptions(), 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_subscriptions_are_not_reported_as_subscribed() -> Result<()> {
    init_tracing();
    let fixture = PoolFixture::ready();
    fixture.pool.set_subscribe_failing(true);
    fixture.set_position(account(1), tokens(2), U256::zero(), U256::zero());

    fixture.session.set_account(Some(account(1))).await;
    assert!(
        eventually(|| fixture.session.invalidator().status() == InvalidatorStatus::Failed(account(1))).await
    );
    assert_eq!(fixture.pool.subscribe_count(), 3);
    assert_eq!(fixture.pool.active_subscriptions(), 0);
    assert_eq!(fixture.session.invalidator().subscription_count(), 0);

    // A fresh watch retries once subscriptions work again.
    fixture.pool.set_subscribe_failing(false);
    fixture.set_position(account(2), tokens(1), U256::zero(), U256::zero());
    fixture.session.set_account(Some(account(2))).await;
    assert!(
        eventually(|| fixture.session.invalidator().status() == InvalidatorStatus::Subscribed(account(2))).await
    );
    assert_eq!(fixture.pool.active_subscriptions(), 3);
    Ok(())
}
