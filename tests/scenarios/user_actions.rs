use crate::TestApp;
use wallet_sync::{
    ChainId,
    WalletStatus,
    balance::TokenAmount,
    engine::ActionError,
    gateway::GatewayError,
    test_helpers::{
        ALICE,
        FakeGateway,
        address,
    },
};

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

#[tokio::test(start_paused = true)]
async fn connect__approved_on_supported_chain__connected_snapshot_and_balance() {
    // given
    let app = TestApp::start(FakeGateway::locked(137)).await;
    app.tokens.set_balance(ALICE, 5 * ONE_TOKEN);

    // when
    let account = app.wallet.connect().await.unwrap();
    app.advance(400).await;

    // then
    let latest = app.latest();
    assert_eq!(latest.status(), WalletStatus::ConnectedSupportedNetwork);
    assert_eq!(latest.account(), Some(&address(ALICE)));
    assert_eq!(latest.chain_id(), Some(ChainId(137)));
    assert_eq!(account, address(ALICE));
    assert_eq!(
        app.balance.display().amount(),
        Some(TokenAmount::new(5 * ONE_TOKEN, 18))
    );
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connect__rejected__error_returned_and_polling_continues() {
    // given
    let app = TestApp::start(FakeGateway::locked(137)).await;
    app.gateway.reject_prompts(true);
    let reads_before = app.gateway.account_queries();

    // when
    let result = app.wallet.connect().await;
    app.advance(2_000).await;

    // then
    assert_eq!(result, Err(ActionError::Gateway(GatewayError::UserRejected)));
    assert_eq!(app.published().len(), 1);
    assert!(app.gateway.account_queries() >= reads_before + 2);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn switch_network__from_unsupported__lands_on_primary() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 1)).await;
    assert_eq!(app.latest().status(), WalletStatus::ConnectedUnsupportedNetwork);

    // when
    let target = app.wallet.switch_to_suggested().await.unwrap();
    app.advance(200).await;

    // then
    assert_eq!(target, ChainId(137));
    assert_eq!(app.gateway.switch_requests(), 1);
    assert_eq!(app.gateway.add_network_requests(), 0);
    assert_eq!(app.latest().status(), WalletStatus::ConnectedSupportedNetwork);
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn switch_network__wallet_cannot_add__manual_instructions_and_state_kept() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 1)).await;
    app.gateway.forget_chain(137);
    app.gateway
        .fail_add_network(Some(GatewayError::ProviderError("unsupported method".into())));

    // when
    let err = app.wallet.switch_network(ChainId(137)).await.unwrap_err();
    app.advance(200).await;

    // then
    let ActionError::AddNetworkFailed { manual, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(manual.contains("https://polygon-rpc.com"));
    assert!(err.to_string().contains("Polygon Mainnet"));
    assert_eq!(app.latest().chain_id(), Some(ChainId(1)));
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn refresh_now__after_purchase__balance_updates_without_debounce() {
    // given
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;
    app.tokens.set_balance(ALICE, ONE_TOKEN);
    app.advance(400).await;
    let queries_before = app.tokens.queries();

    // when
    app.tokens.set_balance(ALICE, 4 * ONE_TOKEN);
    app.balance.refresh_now();
    app.advance(1).await;

    // then
    assert_eq!(app.tokens.queries(), queries_before + 1);
    assert_eq!(
        app.balance.display().amount(),
        Some(TokenAmount::new(4 * ONE_TOKEN, 18))
    );
    app.stop().await;
}

#[tokio::test(start_paused = true)]
async fn late_subscriber__receives_current_state_immediately() {
    let app = TestApp::start(FakeGateway::connected(ALICE, 137)).await;
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = seen.clone();

    app.wallet
        .subscribe(
            "late-view",
            Box::new(move |snapshot: &wallet_sync::WalletSnapshot| {
                log.lock().unwrap().push(snapshot.status());
            }),
        )
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![WalletStatus::ConnectedSupportedNetwork]
    );
    app.stop().await;
}
