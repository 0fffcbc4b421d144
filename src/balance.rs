//! Balance reader: a debounced bus consumer that keeps the displayed token
//! balance in line with the published wallet snapshot.

use crate::{
    bus::SnapshotHandler,
    gateway::{
        GatewayResult,
        ProviderHandle,
    },
    snapshot::{
        Address,
        WalletSnapshot,
        WalletStatus,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use futures::{
    FutureExt,
    future::BoxFuture,
};
use networks::{
    ChainId,
    SupportedNetworks,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    time::{
        self,
        Instant,
    },
};
use tracing::{
    debug,
    info,
    trace,
    warn,
};

pub use amount::TokenAmount;

mod amount;
pub mod erc20;


pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BalanceConfig {
    pub debounce: Duration,
    pub decimals: u8,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BalanceQuery {
    pub contract: Address,
    pub account: Address,
    pub chain_id: ChainId,
    pub decimals: u8,
    pub handle: ProviderHandle,
}

pub trait TokenBalanceSource: Send + Sync + 'static {
    /// Handle the next query will run against.
    fn provider_handle(&self) -> ProviderHandle;

    fn balance_of(
        &self,
        query: &BalanceQuery,
    ) -> impl Future<Output = GatewayResult<TokenAmount>> + Send;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BalanceDisplay {
    /// Not connected to a supported network; nothing to show.
    Hidden,
    Loading,
    Amount {
        amount: TokenAmount,
        chain_id: ChainId,
        read_at: DateTime<Utc>,
    },
    /// Supported network without a deployed token.
    NotDeployed,
    Unavailable {
        reason: String,
    },
}

impl BalanceDisplay {
    pub fn amount(&self) -> Option<TokenAmount> {
        match self {
            BalanceDisplay::Amount { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

enum BalanceCommand {
    Snapshot(WalletSnapshot),
    Refresh { priority: bool },
    Shutdown,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct BalanceTarget {
    contract: Address,
    account: Address,
    chain_id: ChainId,
}

struct QueryOutcome {
    query: BalanceQuery,
    result: GatewayResult<TokenAmount>,
}

type InFlight = Option<BoxFuture<'static, QueryOutcome>>;

/// Cloneable front door to a running [`BalanceReader`].
#[derive(Clone)]
pub struct BalanceHandle {
    commands: mpsc::UnboundedSender<BalanceCommand>,
    display: watch::Receiver<BalanceDisplay>,
}

impl BalanceHandle {
    pub fn on_snapshot(&self, snapshot: &WalletSnapshot) {
        let _ = self.commands.send(BalanceCommand::Snapshot(snapshot.clone()));
    }

    /// Handler to register on the notification bus.
    pub fn bus_handler(&self) -> SnapshotHandler {
        let handle = self.clone();
        Box::new(move |snapshot: &WalletSnapshot| handle.on_snapshot(snapshot))
    }

    /// Scheduled refresh, subject to the debounce window.
    pub fn refresh(&self) {
        let _ = self.commands.send(BalanceCommand::Refresh { priority: false });
    }

    /// Immediate refresh, e.g. after a purchase or transfer completed. Runs
    /// as soon as no other query is in flight.
    pub fn refresh_now(&self) {
        let _ = self.commands.send(BalanceCommand::Refresh { priority: true });
    }

    pub fn display(&self) -> BalanceDisplay {
        self.display.borrow().clone()
    }

    pub fn updates(&self) -> watch::Receiver<BalanceDisplay> {
        self.display.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(BalanceCommand::Shutdown);
    }
}

pub struct BalanceReader<S> {
    source: Arc<S>,
    networks: Arc<SupportedNetworks>,
    config: BalanceConfig,
    commands_tx: mpsc::UnboundedSender<BalanceCommand>,
    commands_rx: mpsc::UnboundedReceiver<BalanceCommand>,
    display: watch::Sender<BalanceDisplay>,
    target: Option<BalanceTarget>,
    queries: u64,
}

impl<S: TokenBalanceSource> BalanceReader<S> {
    pub fn new(
        source: Arc<S>,
        networks: Arc<SupportedNetworks>,
        config: BalanceConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (display, _) = watch::channel(BalanceDisplay::Hidden);
        Self {
            source,
            networks,
            config,
            commands_tx,
            commands_rx,
            display,
            target: None,
            queries: 0,
        }
    }

    pub fn handle(&self) -> BalanceHandle {
        BalanceHandle {
            commands: self.commands_tx.clone(),
            display: self.display.subscribe(),
        }
    }

    pub async fn run(mut self) {
        debug!(debounce = ?self.config.debounce, "balance reader started");
        let mut in_flight: InFlight = None;
        let mut debounce: Option<Instant> = None;
        let mut rerun = false;

        loop {
            let deadline = debounce.unwrap_or_else(Instant::now);
            tokio::select! {
                outcome = wait_for(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.apply(outcome);
                    if std::mem::take(&mut rerun) {
                        in_flight = self.start_query();
                    }
                }
                _ = time::sleep_until(deadline), if debounce.is_some() => {
                    debounce = None;
                    if in_flight.is_some() {
                        rerun = true;
                    } else {
                        in_flight = self.start_query();
                    }
                }
                command = self.commands_rx.recv() => match command {
                    Some(BalanceCommand::Snapshot(snapshot)) => {
                        match self.retarget(&snapshot) {
                            Retarget::Changed => {
                                // result for the previous target is stale
                                in_flight = None;
                                rerun = false;
                                debounce = Some(Instant::now() + self.config.debounce);
                            }
                            Retarget::Unchanged => {
                                debounce = Some(Instant::now() + self.config.debounce);
                            }
                            Retarget::Cleared => {
                                in_flight = None;
                                rerun = false;
                                debounce = None;
                            }
                        }
                    }
                    Some(BalanceCommand::Refresh { priority }) if self.target.is_some() => {
                        if !priority {
                            debounce = Some(Instant::now() + self.config.debounce);
                        } else {
                            debounce = None;
                            if in_flight.is_some() {
                                rerun = true;
                            } else {
                                in_flight = self.start_query();
                            }
                        }
                    }
                    Some(BalanceCommand::Refresh { .. }) => {
                        trace!("balance refresh ignored, nothing to query");
                    }
                    Some(BalanceCommand::Shutdown) | None => break,
                },
            }
        }
        debug!(queries = self.queries, "balance reader stopped");
    }

    fn retarget(&mut self, snapshot: &WalletSnapshot) -> Retarget {
        let next = match self.target_for(snapshot) {
            Ok(target) => target,
            Err(display) => {
                if self.target.take().is_some() || *self.display.borrow() != display {
                    debug!(status = %snapshot.status(), "balance cleared");
                }
                self.display.send_replace(display);
                return Retarget::Cleared;
            }
        };
        if self.target.as_ref() == Some(&next) {
            return Retarget::Unchanged;
        }
        debug!(
            account = %next.account.short(),
            chain_id = %next.chain_id,
            "balance target changed"
        );
        self.target = Some(next);
        self.display.send_replace(BalanceDisplay::Loading);
        Retarget::Changed
    }

    /// What to query for a snapshot, or what to show when nothing is.
    fn target_for(&self, snapshot: &WalletSnapshot) -> Result<BalanceTarget, BalanceDisplay> {
        let Some((account, chain_id)) = snapshot.connection() else {
            return Err(BalanceDisplay::Hidden);
        };
        if snapshot.status() != WalletStatus::ConnectedSupportedNetwork {
            return Err(BalanceDisplay::Hidden);
        }
        let Some(raw_contract) = self
            .networks
            .get(chain_id)
            .and_then(|entry| entry.token_contract.as_deref())
        else {
            return Err(BalanceDisplay::NotDeployed);
        };
        let contract = Address::parse(raw_contract).map_err(|e| BalanceDisplay::Unavailable {
            reason: e.to_string(),
        })?;
        Ok(BalanceTarget {
            contract,
            account: account.clone(),
            chain_id,
        })
    }

    fn start_query(&mut self) -> InFlight {
        let target = self.target.clone()?;
        self.queries += 1;
        let query = BalanceQuery {
            contract: target.contract,
            account: target.account,
            chain_id: target.chain_id,
            decimals: self.config.decimals,
            handle: self.source.provider_handle(),
        };
        trace!(query = self.queries, generation = query.handle.generation, "balance query started");
        let source = self.source.clone();
        Some(
            async move {
                let result = source.balance_of(&query).await;
                QueryOutcome { query, result }
            }
            .boxed(),
        )
    }

    fn apply(&mut self, outcome: QueryOutcome) {
        let QueryOutcome { query, result } = outcome;
        let current = self.target.as_ref().is_some_and(|target| {
            target.account == query.account && target.chain_id == query.chain_id
        });
        if !current {
            trace!("discarding balance for a previous target");
            return;
        }
        let display = match result {
            Ok(amount) => {
                info!(
                    account = %query.account.short(),
                    chain_id = %query.chain_id,
                    balance = %amount,
                    "token balance read"
                );
                BalanceDisplay::Amount {
                    amount,
                    chain_id: query.chain_id,
                    read_at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(error = %e, "token balance unavailable");
                BalanceDisplay::Unavailable {
                    reason: e.to_string(),
                }
            }
        };
        self.display.send_replace(display);
    }
}

enum Retarget {
    Changed,
    Unchanged,
    Cleared,
}

async fn wait_for(in_flight: &mut InFlight) -> QueryOutcome {
    match in_flight {
        Some(query) => query.await,
        None => std::future::pending().await,
    }
}
