//! In-memory wallet and token fakes for driving the engine and balance
//! reader under paused tokio time.

use crate::{
    balance::{
        BalanceQuery,
        TokenAmount,
        TokenBalanceSource,
    },
    gateway::{
        EventHandler,
        EventKind,
        GatewayError,
        GatewayResult,
        ProviderEvent,
        ProviderGateway,
        ProviderHandle,
        Subscriptions,
    },
    snapshot::Address,
};
use networks::{
    ChainId,
    NetworkEntry,
    SupportedNetworks,
};
use parking_lot::Mutex;
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
    time::Duration,
};

pub const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
pub const BOB: &str = "0xb0b0000000000000000000000000000000000002";
pub const TOKEN: &str = "0x70c0000000000000000000000000000000000003";

pub fn address(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

/// Built-in table with a token deployed on Polygon only.
pub fn networks_with_token() -> SupportedNetworks {
    let entries = SupportedNetworks::builtin()
        .entries()
        .iter()
        .cloned()
        .map(|mut entry| {
            if entry.chain_id == networks::POLYGON_MAINNET {
                entry.token_contract = Some(TOKEN.to_string());
            }
            entry
        })
        .collect();
    SupportedNetworks::new(entries).unwrap()
}

#[derive(Debug)]
struct WalletState {
    available: bool,
    accounts: Vec<String>,
    chain_id: ChainId,
    known_chains: HashSet<ChainId>,
    read_failure: Option<GatewayError>,
    latency: Duration,
    reject_prompts: bool,
    add_network_failure: Option<GatewayError>,
    grant_on_connect: Vec<String>,
    generation: u64,
}

/// Scriptable wallet. State changes made through `set_*` are silent, like a
/// provider that drops events; `emit_*` changes state and notifies.
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<WalletState>,
    subscriptions: Subscriptions,
    account_queries: AtomicUsize,
    chain_queries: AtomicUsize,
    rebinds: AtomicUsize,
    switch_requests: AtomicUsize,
    add_network_requests: AtomicUsize,
}

impl FakeGateway {
    fn with_state(available: bool, accounts: &[&str], chain_id: u64) -> Self {
        let known_chains = SupportedNetworks::builtin()
            .entries()
            .iter()
            .map(|entry| entry.chain_id)
            .chain([ChainId(chain_id)])
            .collect();
        Self {
            state: Mutex::new(WalletState {
                available,
                accounts: accounts.iter().map(|a| a.to_string()).collect(),
                chain_id: ChainId(chain_id),
                known_chains,
                read_failure: None,
                latency: Duration::ZERO,
                reject_prompts: false,
                add_network_failure: None,
                grant_on_connect: vec![ALICE.to_string()],
                generation: 0,
            }),
            subscriptions: Subscriptions::default(),
            account_queries: AtomicUsize::new(0),
            chain_queries: AtomicUsize::new(0),
            rebinds: AtomicUsize::new(0),
            switch_requests: AtomicUsize::new(0),
            add_network_requests: AtomicUsize::new(0),
        }
    }

    /// No wallet installed.
    pub fn absent() -> Self {
        Self::with_state(false, &[], 137)
    }

    /// Wallet installed, no account authorized yet.
    pub fn locked(chain_id: u64) -> Self {
        Self::with_state(true, &[], chain_id)
    }

    pub fn connected(account: &str, chain_id: u64) -> Self {
        Self::with_state(true, &[account], chain_id)
    }

    pub fn set_accounts(&self, accounts: &[&str]) {
        self.state.lock().accounts = accounts.iter().map(|a| a.to_string()).collect();
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.state.lock().chain_id = ChainId(chain_id);
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn fail_reads(&self, failure: Option<GatewayError>) {
        self.state.lock().read_failure = failure;
    }

    /// Delay applied to every read.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn reject_prompts(&self, reject: bool) {
        self.state.lock().reject_prompts = reject;
    }

    pub fn grant_on_connect(&self, accounts: &[&str]) {
        self.state.lock().grant_on_connect = accounts.iter().map(|a| a.to_string()).collect();
    }

    pub fn forget_chain(&self, chain_id: u64) {
        self.state.lock().known_chains.remove(&ChainId(chain_id));
    }

    pub fn fail_add_network(&self, failure: Option<GatewayError>) {
        self.state.lock().add_network_failure = failure;
    }

    pub fn emit_chain_changed(&self, chain_id: u64) {
        self.set_chain(chain_id);
        self.subscriptions
            .emit(&ProviderEvent::ChainChanged(ChainId(chain_id).to_hex()));
    }

    pub fn emit_accounts_changed(&self, accounts: &[&str]) {
        self.set_accounts(accounts);
        self.subscriptions.emit(&ProviderEvent::AccountsChanged(
            accounts.iter().map(|a| a.to_string()).collect(),
        ));
    }

    pub fn emit_disconnected(&self) {
        self.set_accounts(&[]);
        self.subscriptions.emit(&ProviderEvent::Disconnected);
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions.count(kind)
    }

    pub fn account_queries(&self) -> usize {
        self.account_queries.load(Ordering::SeqCst)
    }

    pub fn chain_queries(&self) -> usize {
        self.chain_queries.load(Ordering::SeqCst)
    }

    pub fn rebinds(&self) -> usize {
        self.rebinds.load(Ordering::SeqCst)
    }

    pub fn switch_requests(&self) -> usize {
        self.switch_requests.load(Ordering::SeqCst)
    }

    pub fn add_network_requests(&self) -> usize {
        self.add_network_requests.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_readable(&self) -> GatewayResult<()> {
        let state = self.state.lock();
        if !state.available {
            return Err(GatewayError::ProviderUnavailable);
        }
        match &state.read_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

impl ProviderGateway for FakeGateway {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    async fn get_accounts(&self) -> GatewayResult<Vec<Address>> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_readable()?;
        let accounts = self.state.lock().accounts.clone();
        crate::gateway::parse_accounts(&accounts)
    }

    async fn get_chain_id(&self) -> GatewayResult<ChainId> {
        self.chain_queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_readable()?;
        Ok(self.state.lock().chain_id)
    }

    async fn request_accounts(&self) -> GatewayResult<Vec<Address>> {
        let granted = {
            let mut state = self.state.lock();
            if state.reject_prompts {
                return Err(GatewayError::UserRejected);
            }
            state.accounts = state.grant_on_connect.clone();
            state.accounts.clone()
        };
        crate::gateway::parse_accounts(&granted)
    }

    async fn request_network_switch(&self, target: ChainId) -> GatewayResult<()> {
        self.switch_requests.fetch_add(1, Ordering::SeqCst);
        {
            let state = self.state.lock();
            if state.reject_prompts {
                return Err(GatewayError::UserRejected);
            }
            if !state.known_chains.contains(&target) {
                return Err(GatewayError::NetworkUnknownToProvider(target));
            }
        }
        self.emit_chain_changed(target.value());
        Ok(())
    }

    async fn request_add_network(&self, network: &NetworkEntry) -> GatewayResult<()> {
        self.add_network_requests.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if let Some(failure) = &state.add_network_failure {
                return Err(failure.clone());
            }
            state.known_chains.insert(network.chain_id);
        }
        // wallets switch to a freshly added network
        self.emit_chain_changed(network.chain_id.value());
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.subscriptions.subscribe(kind, handler);
    }

    fn unsubscribe_all(&self, kind: EventKind) {
        self.subscriptions.unsubscribe_all(kind);
    }

    fn handle(&self) -> ProviderHandle {
        ProviderHandle {
            endpoint: None,
            generation: self.state.lock().generation,
        }
    }

    fn rebind(&self) -> ProviderHandle {
        self.rebinds.fetch_add(1, Ordering::SeqCst);
        self.state.lock().generation += 1;
        self.handle()
    }
}

/// Token contract fake that records how many queries overlap.
#[derive(Debug, Default)]
pub struct FakeBalanceSource {
    balances: Mutex<HashMap<Address, u128>>,
    failure: Mutex<Option<GatewayError>>,
    latency: Mutex<Duration>,
    queries: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<BalanceQuery>>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, account: &str, raw: u128) {
        self.balances.lock().insert(address(account), raw);
    }

    pub fn fail_with(&self, failure: Option<GatewayError>) {
        *self.failure.lock() = failure;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Queries started, including ones cancelled mid-flight.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<BalanceQuery> {
        self.seen.lock().clone()
    }
}

impl TokenBalanceSource for FakeBalanceSource {
    fn provider_handle(&self) -> ProviderHandle {
        ProviderHandle {
            endpoint: None,
            generation: 0,
        }
    }

    async fn balance_of(&self, query: &BalanceQuery) -> GatewayResult<TokenAmount> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(query.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure);
        }
        let raw = self
            .balances
            .lock()
            .get(&query.account)
            .copied()
            .unwrap_or_default();
        Ok(TokenAmount::new(raw, query.decimals))
    }
}
