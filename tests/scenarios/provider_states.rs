use crate::TestApp;
use wallet_sync::{
    ChainId,
    WalletSnapshot,
    WalletStatus,
    balance::BalanceDisplay,
    gateway::GatewayError,
    presenter::{
        PresenterMode,
        present,
    },
    test_helpers::{
        ALICE,
        FakeGateway,
    },
};

#[tokio::test(start_paused = true)]
async fn startup__no_wallet_installed__no_provider_published_once_without_reads() {
    // given
    let app = TestApp::start(FakeGateway::absent()).await;

    // when
    app.advance(5_000).await;

    // then
    assert_eq!(app.published(), vec![WalletSnapshot::no_provider()]);
    assert_eq!(app.gateway.account_queries(), 0);
    assert_eq!(app.gateway.chain_queries(), 0);
    let view = present(&app.latest(), &app.networks);
    assert_eq!(view.mode, PresenterMode::ConnectPrompt);
    assert!(view.wallet_missing);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn startup__wallet_locked__disconnected() {
    let app = TestApp::start(FakeGateway::locked(137)).await;

    assert_eq!(app.latest().status(), WalletStatus::Disconnected);
    assert_eq!(app.balance.display(), BalanceDisplay::Hidden);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn poll__unchanged_wallet__nothing_republished() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;

    // when
    app.advance(5_500).await;
    app.wallet.force_refresh().unwrap();
    app.advance(10).await;

    // then
    assert_eq!(app.published().len(), 1);
    assert!(app.gateway.account_queries() >= 6);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn poll__transient_read_failure__error_then_recovery() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;

    // when
    app.gateway
        .fail_reads(Some(GatewayError::ProviderError("rpc timeout".into())));
    app.advance(1_000).await;
    let during = app.latest();
    app.gateway.fail_reads(None);
    app.advance(1_000).await;

    // then
    assert_eq!(during.status(), WalletStatus::Error);
    assert_eq!(app.latest().status(), WalletStatus::ConnectedSupportedNetwork);
    assert_eq!(app.latest().chain_id(), Some(ChainId(137)));
    let statuses: Vec<_> = app.published().iter().map(|s| s.status()).collect();
    assert_eq!(
        statuses,
        vec![
            WalletStatus::ConnectedSupportedNetwork,
            WalletStatus::Error,
            WalletStatus::ConnectedSupportedNetwork,
        ]
    );
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn poll__wallet_uninstalled_while_running__no_provider() {
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;

    app.gateway.set_available(false);
    app.advance(1_000).await;

    assert_eq!(app.latest(), WalletSnapshot::no_provider());
    assert_eq!(app.balance.display(), BalanceDisplay::Hidden);
    app.stop().await;
}
