use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    future::Future,
    sync::{
        Arc,
        OnceLock,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use wallet_sync::{
    SupportedNetworks,
    balance::{
        BalanceConfig,
        BalanceHandle,
        BalanceReader,
    },
    engine::{
        ActionError,
        Engine,
        EngineConfig,
        EngineHandle,
    },
    gateway::{
        ProviderGateway,
        json_rpc::JsonRpcGateway,
    },
    networks::resolve_table_path,
    presenter,
};

mod ui;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON-RPC endpoint of the wallet provider. Without it no wallet is
    /// available.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Supported network table (JSON). Defaults to Polygon + local chain.
    #[arg(long)]
    networks: Option<String>,

    /// 0 disables polling and relies on provider events only.
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    #[arg(long)]
    no_events: bool,

    #[arg(long, default_value_t = 100)]
    event_settle_ms: u64,

    #[arg(long, default_value_t = 300)]
    balance_debounce_ms: u64,

    #[arg(long, default_value_t = 18)]
    token_decimals: u8,

    #[arg(long, default_value_t = 10_000)]
    request_timeout_ms: u64,

    #[arg(long, default_value = "logs")]
    log_dir: String,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: (self.poll_interval_ms > 0)
                .then(|| Duration::from_millis(self.poll_interval_ms)),
            subscribe_events: !self.no_events,
            event_settle: Duration::from_millis(self.event_settle_ms),
        }
    }

    fn balance_config(&self) -> BalanceConfig {
        BalanceConfig {
            debounce: Duration::from_millis(self.balance_debounce_ms),
            decimals: self.token_decimals,
        }
    }
}

fn init_tracing(log_dir: &str) -> Result<()> {
    let dir = shellexpand::tilde(log_dir).into_owned();
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "wallet-sync.log"));
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wallet_sync=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("installing tracing subscriber failed: {e}"))
}

fn load_networks(path: Option<&str>) -> Result<SupportedNetworks> {
    match path {
        Some(raw) => SupportedNetworks::load(resolve_table_path(raw)).map_err(|e| eyre!("{e:#}")),
        None => Ok(SupportedNetworks::builtin()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    if args.tracing {
        init_tracing(&args.log_dir)?;
    }
    tracing::info!("starting wallet-sync");

    let networks = Arc::new(load_networks(args.networks.as_deref())?);
    let gateway = Arc::new(
        JsonRpcGateway::new(
            args.rpc_url.clone(),
            Duration::from_millis(args.request_timeout_ms),
        )
        .wrap_err("creating provider gateway failed")?,
    );

    let balance_reader = BalanceReader::new(gateway.clone(), networks.clone(), args.balance_config());
    let balance = balance_reader.handle();
    let mut engine = Engine::new(gateway, networks.clone(), args.engine_config());
    engine.subscribe("balance-reader", balance.bus_handler());
    let wallet = engine.handle();

    let engine_task = tokio::spawn(engine.run());
    let balance_task = tokio::spawn(balance_reader.run());

    let res = run_app(&wallet, &balance, &networks).await;

    wallet.shutdown();
    balance.shutdown();
    let _ = engine_task.await;
    let _ = balance_task.await;
    tracing::info!("wallet-sync stopped");
    res
}

async fn run_app<G: ProviderGateway>(
    wallet: &EngineHandle<G>,
    balance: &BalanceHandle,
    networks: &SupportedNetworks,
) -> Result<()> {
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(wallet, balance, networks, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn redraw<G: ProviderGateway>(
    ui_state: &mut ui::UiState,
    wallet: &EngineHandle<G>,
    balance: &BalanceHandle,
    networks: &SupportedNetworks,
    status: Option<&str>,
) -> Result<()> {
    let view = wallet
        .snapshot()
        .map(|snapshot| presenter::present(&snapshot, networks))
        .unwrap_or_else(presenter::pending_view);
    let balance = balance.display();
    ui::draw(
        ui_state,
        &ui::Screen {
            view: &view,
            balance: &balance,
            status,
        },
    )
}

async fn run_loop<G: ProviderGateway>(
    wallet: &EngineHandle<G>,
    balance: &BalanceHandle,
    networks: &SupportedNetworks,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    let mut snapshots = wallet.updates();
    let mut balances = balance.updates();
    // wallet prompts can take as long as the user does; failures come back here
    let (failures_tx, mut failures) = mpsc::unbounded_channel::<String>();
    // a failed action is shown until the next key press
    let mut status: Option<String> = None;
    redraw(ui_state, wallet, balance, networks, None)?;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::warn!("wallet engine stopped unexpectedly");
                    break;
                }
            }
            changed = balances.changed() => {
                if changed.is_err() {
                    tracing::warn!("balance reader stopped unexpectedly");
                    break;
                }
            }
            Some(failure) = failures.recv() => {
                status = Some(failure);
            }
            ev = ui::next_user_event(input_events) => {
                status = None;
                match ev? {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Connect => {
                        let wallet = wallet.clone();
                        spawn_action("Connect failed", &failures_tx, async move {
                            wallet.connect().await
                        });
                    }
                    ui::UserEvent::SwitchNetwork => {
                        let wallet = wallet.clone();
                        spawn_action("Network switch failed", &failures_tx, async move {
                            wallet.switch_to_suggested().await
                        });
                    }
                    ui::UserEvent::Refresh => {
                        if let Err(e) = wallet.force_refresh() {
                            status = Some(e.to_string());
                        }
                    }
                    ui::UserEvent::RefreshBalance => balance.refresh_now(),
                    ui::UserEvent::Redraw => {}
                }
            }
        }
        redraw(ui_state, wallet, balance, networks, status.as_deref())
            .wrap_err("draw failed")?;
    }
    Ok(())
}

fn spawn_action<T, F>(
    label: &'static str,
    failures: &mpsc::UnboundedSender<String>,
    action: F,
)
where
    T: Send + 'static,
    F: Future<Output = Result<T, ActionError>> + Send + 'static,
{
    let failures = failures.clone();
    tokio::spawn(async move {
        if let Err(e) = action.await {
            // ui already gone
            let _ = failures.send(format!("{label}: {e}"));
        }
    });
}
