//! Reconciliation engine.
//!
//! Owns the canonical [`WalletSnapshot`] and is the only writer of it. Every
//! trigger (startup, provider event, poll tick, user action, forced refresh)
//! funnels into one reconciliation pass at a time; a pass re-queries the
//! gateway from scratch and publishes only when the outcome differs from the
//! last published snapshot.

use crate::{
    bus::{
        NotificationBus,
        SnapshotHandler,
        Subscription,
    },
    gateway::{
        EventKind,
        GatewayError,
        ProviderEvent,
        ProviderGateway,
    },
    snapshot::WalletSnapshot,
};
use futures::{
    FutureExt,
    future::{
        BoxFuture,
        OptionFuture,
    },
};
use networks::SupportedNetworks;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        oneshot,
        watch,
    },
    time::{
        self,
        Instant,
        Interval,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    trace,
    warn,
};

pub use gate::{
    Admission,
    PassGate,
    PassPlan,
    Trigger,
};
pub use handle::{
    ActionError,
    EngineHandle,
};

pub mod gate;
mod handle;


pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_EVENT_SETTLE: Duration = Duration::from_millis(100);
/// A burst that never goes quiet still fires after this many settle windows.
const MAX_SETTLE_WINDOWS: u32 = 5;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// `None` disables the safety-net poll and relies on provider events.
    /// A zero interval is treated the same as `None`.
    pub poll_interval: Option<Duration>,
    pub subscribe_events: bool,
    /// Quiet period after the last provider event before a pass starts.
    pub event_settle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            subscribe_events: true,
            event_settle: DEFAULT_EVENT_SETTLE,
        }
    }
}

pub(crate) enum EngineCommand {
    Trigger(Trigger),
    ProviderEvent(EventKind),
    Subscribe {
        consumer: String,
        handler: SnapshotHandler,
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe(Subscription),
    Shutdown,
}

struct PassOutcome {
    plan: PassPlan,
    snapshot: WalletSnapshot,
}

/// Pending provider-event burst, folded into one trigger once quiet.
#[derive(Clone, Copy, Debug)]
struct Settling {
    started: Instant,
    deadline: Instant,
    kind: EventKind,
}

pub struct Engine<G: ProviderGateway> {
    gateway: Arc<G>,
    networks: Arc<SupportedNetworks>,
    config: EngineConfig,
    bus: NotificationBus,
    gate: PassGate,
    last_published: Option<WalletSnapshot>,
    published: watch::Sender<Option<WalletSnapshot>>,
    commands_tx: mpsc::UnboundedSender<EngineCommand>,
    commands_rx: mpsc::UnboundedReceiver<EngineCommand>,
    passes: u64,
}

impl<G: ProviderGateway> Engine<G> {
    pub fn new(
        gateway: Arc<G>,
        networks: Arc<SupportedNetworks>,
        config: EngineConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (published, _) = watch::channel(None);
        if config.subscribe_events {
            for kind in EventKind::ALL {
                let commands = commands_tx.clone();
                gateway.subscribe(
                    kind,
                    Arc::new(move |event: &ProviderEvent| {
                        trace!(event = ?event, "provider event received");
                        // engine already gone; nothing to wake
                        let _ = commands.send(EngineCommand::ProviderEvent(event.kind()));
                    }),
                );
            }
        }
        Self {
            gateway,
            networks,
            config,
            bus: NotificationBus::new(),
            gate: PassGate::default(),
            last_published: None,
            published,
            commands_tx,
            commands_rx,
            passes: 0,
        }
    }

    /// Registers a consumer before the engine starts. Consumers added later
    /// go through [`EngineHandle::subscribe`] and also receive the current
    /// snapshot right away.
    pub fn subscribe(
        &mut self,
        consumer: impl Into<String>,
        handler: SnapshotHandler,
    ) -> Subscription {
        self.bus.subscribe(consumer, handler)
    }

    pub fn handle(&self) -> EngineHandle<G> {
        EngineHandle::new(
            self.gateway.clone(),
            self.networks.clone(),
            self.commands_tx.clone(),
            self.published.subscribe(),
        )
    }

    pub fn last_published(&self) -> Option<&WalletSnapshot> {
        self.last_published.as_ref()
    }

    /// Number of passes started so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Runs one pass inline, outside the event loop. Returns the snapshot if
    /// it was published.
    pub async fn reconcile_now(&mut self, trigger: Trigger) -> Option<WalletSnapshot> {
        let Admission::Start(mut plan) = self.gate.admit(trigger) else {
            return None;
        };
        let mut published = None;
        loop {
            let outcome = self.start_pass(plan).await;
            if self.publish_if_changed(outcome.snapshot.clone()) {
                published = Some(outcome.snapshot);
            }
            match self.gate.complete() {
                Some(next) => plan = next,
                None => return published,
            }
        }
    }

    /// Drives the engine until [`EngineHandle::shutdown`] is called. A pass
    /// still in flight at shutdown is dropped and its result discarded.
    pub async fn run(mut self) {
        info!(
            poll_interval = ?self.config.poll_interval,
            events = self.config.subscribe_events,
            networks = self.networks.entries().len(),
            "wallet engine started"
        );
        let mut ticker = self
            .config
            .poll_interval
            .filter(|period| !period.is_zero())
            .map(poll_ticker);
        let mut settling: Option<Settling> = None;
        let mut in_flight: OptionFuture<BoxFuture<'static, PassOutcome>> = None.into();
        if let Admission::Start(plan) = self.gate.admit(Trigger::Startup) {
            in_flight = Some(self.start_pass(plan)).into();
        }

        loop {
            let settle_deadline = settling.map_or_else(Instant::now, |s| s.deadline);
            tokio::select! {
                Some(outcome) = &mut in_flight, if self.gate.is_reconciling() => {
                    in_flight = self.finish_pass(outcome).map(|next| self.start_pass(next)).into();
                }
                _ = next_tick(&mut ticker) => {
                    self.admit(Trigger::Poll, &mut in_flight);
                }
                _ = time::sleep_until(settle_deadline), if settling.is_some() => {
                    if let Some(settled) = settling.take() {
                        self.admit(Trigger::Event(settled.kind), &mut in_flight);
                    }
                }
                command = self.commands_rx.recv() => match command {
                    Some(EngineCommand::Trigger(trigger)) => {
                        self.admit(trigger, &mut in_flight);
                    }
                    Some(EngineCommand::ProviderEvent(kind)) => {
                        if self.config.event_settle.is_zero() {
                            self.admit(Trigger::Event(kind), &mut in_flight);
                        } else {
                            settling = Some(self.settle(settling, kind));
                        }
                    }
                    Some(EngineCommand::Subscribe { consumer, mut handler, reply }) => {
                        if let Some(current) = &self.last_published {
                            handler(current);
                        }
                        let subscription = self.bus.subscribe(consumer, handler);
                        let _ = reply.send(subscription);
                    }
                    Some(EngineCommand::Unsubscribe(subscription)) => {
                        self.bus.unsubscribe(&subscription);
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
            }
        }
        info!(passes = self.passes, "wallet engine stopped");
    }

    fn admit(
        &mut self,
        trigger: Trigger,
        in_flight: &mut OptionFuture<BoxFuture<'static, PassOutcome>>,
    ) {
        match self.gate.admit(trigger) {
            Admission::Start(plan) => *in_flight = Some(self.start_pass(plan)).into(),
            Admission::Coalesced => trace!(trigger = %trigger, "pass in flight, trigger recorded"),
        }
    }

    fn settle(&self, current: Option<Settling>, kind: EventKind) -> Settling {
        // a chain change anywhere in the burst must still force a rebind
        let kind = match current {
            Some(previous) if previous.kind == EventKind::ChainChanged => previous.kind,
            _ => kind,
        };
        let now = Instant::now();
        let started = current.map_or(now, |previous| previous.started);
        let latest_deadline = started + self.config.event_settle * MAX_SETTLE_WINDOWS;
        Settling {
            started,
            deadline: (now + self.config.event_settle).min(latest_deadline),
            kind,
        }
    }

    fn start_pass(&mut self, plan: PassPlan) -> BoxFuture<'static, PassOutcome> {
        self.passes += 1;
        debug!(
            pass = self.passes,
            reason = %plan.reason,
            rebind = plan.rebind,
            coalesced = plan.coalesced,
            "reconciliation pass started"
        );
        let gateway = self.gateway.clone();
        let networks = self.networks.clone();
        async move {
            let snapshot = reconcile(gateway.as_ref(), &networks, plan.rebind).await;
            PassOutcome { plan, snapshot }
        }
        .boxed()
    }

    fn finish_pass(&mut self, outcome: PassOutcome) -> Option<PassPlan> {
        debug!(
            reason = %outcome.plan.reason,
            status = %outcome.snapshot.status(),
            "reconciliation pass finished"
        );
        self.publish_if_changed(outcome.snapshot);
        self.gate.complete()
    }

    fn publish_if_changed(&mut self, snapshot: WalletSnapshot) -> bool {
        if self.last_published.as_ref() == Some(&snapshot) {
            trace!(status = %snapshot.status(), "no state change");
            return false;
        }
        info!(
            status = %snapshot.status(),
            account = ?snapshot.account().map(|a| a.short()),
            chain_id = ?snapshot.chain_id().map(|c| c.value()),
            "wallet state changed"
        );
        let delivered = self.bus.publish(&snapshot);
        trace!(consumers = delivered, "snapshot delivered");
        self.published.send_replace(Some(snapshot.clone()));
        self.last_published = Some(snapshot);
        true
    }
}

// The engine owns every event subscription on its gateway; a gateway must not
// be shared with other event consumers, since teardown clears each kind.
impl<G: ProviderGateway> Drop for Engine<G> {
    fn drop(&mut self) {
        if self.config.subscribe_events {
            for kind in EventKind::ALL {
                self.gateway.unsubscribe_all(kind);
            }
            debug!("provider event subscriptions released");
        }
    }
}

/// One full re-derivation of the wallet state. Never trusts event payloads
/// or previous snapshots.
pub async fn reconcile<G: ProviderGateway>(
    gateway: &G,
    networks: &SupportedNetworks,
    rebind: bool,
) -> WalletSnapshot {
    if !gateway.is_available() {
        return WalletSnapshot::no_provider();
    }
    if rebind {
        let handle = gateway.rebind();
        debug!(generation = handle.generation, "provider handle re-acquired");
    }
    let accounts = match gateway.get_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => return failed_read(e),
    };
    let Some(account) = accounts.into_iter().next() else {
        return WalletSnapshot::disconnected();
    };
    match gateway.get_chain_id().await {
        Ok(chain_id) => WalletSnapshot::connected(account, chain_id, networks),
        Err(e) => failed_read(e),
    }
}

fn failed_read(error: GatewayError) -> WalletSnapshot {
    match error {
        GatewayError::ProviderUnavailable => WalletSnapshot::no_provider(),
        other => {
            warn!(error = %other, "gateway read failed");
            WalletSnapshot::error(other.to_string())
        }
    }
}

fn poll_ticker(period: Duration) -> Interval {
    // first tick one period after start; startup already runs a pass
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
