use crate::TestApp;
use wallet_sync::{
    ChainId,
    WalletStatus,
    balance::{
        BalanceDisplay,
        TokenAmount,
    },
    engine::EngineConfig,
    presenter::{
        PresenterMode,
        present,
    },
    test_helpers::{
        ALICE,
        FakeGateway,
    },
};

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

#[tokio::test(start_paused = true)]
async fn chain_changed__to_unsupported__switch_prompt_and_balance_cleared() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;
    app.tokens.set_balance(ALICE, 25 * ONE_TOKEN);
    app.advance(400).await;
    assert_eq!(
        app.balance.display().amount(),
        Some(TokenAmount::new(25 * ONE_TOKEN, 18))
    );

    // when
    app.gateway.emit_chain_changed(1);
    app.advance(150).await;

    // then
    let latest = app.latest();
    assert_eq!(latest.status(), WalletStatus::ConnectedUnsupportedNetwork);
    assert_eq!(latest.chain_id(), Some(ChainId(1)));
    assert_eq!(app.balance.display(), BalanceDisplay::Hidden);
    let view = present(&latest, &app.networks);
    assert_eq!(view.mode, PresenterMode::SwitchNetworkPrompt);
    assert_eq!(view.switch_target.map(|t| t.chain_id), Some(ChainId(137)));
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn chain_changed__burst_of_ten__one_pass_with_final_chain() {
    // given
    let app = TestApp::start_with(
        FakeGateway::connected(ALICE, 137),
        EngineConfig {
            poll_interval: None,
            ..EngineConfig::default()
        },
    )
    .await;
    let reads_before = app.gateway.chain_queries();

    // when
    for chain_id in [1, 56, 10, 137, 42161, 1, 8453, 250, 100, 31337] {
        app.gateway.emit_chain_changed(chain_id);
        app.advance(5).await;
    }
    app.advance(500).await;

    // then
    assert_eq!(app.gateway.chain_queries(), reads_before + 1);
    assert_eq!(app.gateway.rebinds(), 1);
    let published = app.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].chain_id(), Some(ChainId(31337)));
    assert_eq!(published[1].status(), WalletStatus::ConnectedSupportedNetwork);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn chain_changed__event_lost__poll_catches_up() {
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;

    app.gateway.set_chain(31337);
    app.advance(1_000).await;

    assert_eq!(app.latest().chain_id(), Some(ChainId(31337)));
    assert_eq!(app.balance.display(), BalanceDisplay::NotDeployed);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn accounts_changed__emptied__disconnected_and_balance_cleared() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;
    app.advance(400).await;

    // when
    app.gateway.emit_disconnected();
    app.advance(150).await;

    // then
    assert_eq!(app.latest().status(), WalletStatus::Disconnected);
    assert_eq!(app.balance.display(), BalanceDisplay::Hidden);
    app.stop().await;
}
