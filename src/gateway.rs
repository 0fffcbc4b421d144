//! Boundary to the external wallet provider.
//!
//! The engine only ever talks to a wallet through [`ProviderGateway`]. Push
//! events are delivered best-effort: a provider may coalesce, delay or drop
//! them, so consumers must treat them as hints and re-query.

use crate::snapshot::Address;
use networks::{
    ChainId,
    NetworkEntry,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
};

pub mod json_rpc;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("no wallet provider is available")]
    ProviderUnavailable,
    #[error("wallet provider error: {0}")]
    ProviderError(String),
    #[error("the request was rejected in the wallet")]
    UserRejected,
    #[error("the wallet does not know network {0}")]
    NetworkUnknownToProvider(ChainId),
    #[error("token balance query failed: {0}")]
    BalanceQueryFailed(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    AccountsChanged,
    ChainChanged,
    Connected,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::AccountsChanged,
        EventKind::ChainChanged,
        EventKind::Connected,
        EventKind::Disconnected,
    ];

    /// Event name used by EIP-1193 providers.
    pub fn provider_name(self) -> &'static str {
        match self {
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::ChainChanged => "chainChanged",
            EventKind::Connected => "connect",
            EventKind::Disconnected => "disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

/// Raw provider notification, payloads exactly as the provider sent them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Connected { chain_id: String },
    Disconnected,
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => EventKind::ChainChanged,
            ProviderEvent::Connected { .. } => EventKind::Connected,
            ProviderEvent::Disconnected => EventKind::Disconnected,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

/// Per-kind handler registry shared by gateway implementations.
#[derive(Default)]
pub struct Subscriptions {
    handlers: Mutex<HashMap<EventKind, Vec<EventHandler>>>,
}

impl Subscriptions {
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.lock().entry(kind).or_default().push(handler);
    }

    pub fn unsubscribe_all(&self, kind: EventKind) {
        self.handlers.lock().remove(&kind);
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every handler registered for the event's kind and returns how
    /// many ran. Handlers run outside the registry lock so they may
    /// subscribe or unsubscribe.
    pub fn emit(&self, event: &ProviderEvent) -> usize {
        let handlers = self
            .handlers
            .lock()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind, &handlers.get(&kind).map_or(0, Vec::len));
        }
        map.finish()
    }
}

/// Identity of the provider connection a query runs against. The generation
/// changes every time the handle is re-acquired after a network change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderHandle {
    pub endpoint: Option<String>,
    pub generation: u64,
}

pub trait ProviderGateway: Send + Sync + 'static {
    /// False when no wallet is injected/configured.
    fn is_available(&self) -> bool;

    /// Currently authorized accounts, without prompting. An empty list is
    /// not an error.
    fn get_accounts(&self) -> impl Future<Output = GatewayResult<Vec<Address>>> + Send;

    fn get_chain_id(&self) -> impl Future<Output = GatewayResult<ChainId>> + Send;

    /// User-facing connect prompt.
    fn request_accounts(
        &self,
    ) -> impl Future<Output = GatewayResult<Vec<Address>>> + Send;

    fn request_network_switch(
        &self,
        target: ChainId,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    fn request_add_network(
        &self,
        network: &NetworkEntry,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    fn subscribe(&self, kind: EventKind, handler: EventHandler);

    fn unsubscribe_all(&self, kind: EventKind);

    fn handle(&self) -> ProviderHandle;

    /// Drops any cached network handle and returns a fresh one.
    fn rebind(&self) -> ProviderHandle;
}

pub fn parse_accounts<S: AsRef<str>>(raw: &[S]) -> GatewayResult<Vec<Address>> {
    raw.iter()
        .map(|item| {
            Address::parse(item.as_ref())
                .map_err(|e| GatewayError::ProviderError(e.to_string()))
        })
        .collect()
}

pub fn parse_chain_id(raw: &str) -> GatewayResult<ChainId> {
    ChainId::parse(raw).map_err(|e| GatewayError::ProviderError(format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    #[test]
    fn emit__only_handlers_of_matching_kind_run() {
        // given
        let subscriptions = Subscriptions::default();
        let chain_hits = Arc::new(AtomicUsize::new(0));
        let account_hits = Arc::new(AtomicUsize::new(0));
        let hits = chain_hits.clone();
        subscriptions.subscribe(
            EventKind::ChainChanged,
            Arc::new(move |_: &ProviderEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let hits = account_hits.clone();
        subscriptions.subscribe(
            EventKind::AccountsChanged,
            Arc::new(move |_: &ProviderEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // when
        let delivered = subscriptions.emit(&ProviderEvent::ChainChanged("0x1".into()));

        // then
        assert_eq!(delivered, 1);
        assert_eq!(chain_hits.load(Ordering::SeqCst), 1);
        assert_eq!(account_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_all__removes_every_handler_of_kind() {
        let subscriptions = Subscriptions::default();
        subscriptions.subscribe(EventKind::Disconnected, Arc::new(|_: &ProviderEvent| {}));
        subscriptions.subscribe(EventKind::Disconnected, Arc::new(|_: &ProviderEvent| {}));
        assert_eq!(subscriptions.count(EventKind::Disconnected), 2);

        subscriptions.unsubscribe_all(EventKind::Disconnected);

        assert_eq!(subscriptions.count(EventKind::Disconnected), 0);
        assert_eq!(subscriptions.emit(&ProviderEvent::Disconnected), 0);
    }

    #[test]
    fn parse_accounts__invalid_entry__is_provider_error() {
        let err = parse_accounts(&["0x1234"]).unwrap_err();
        assert!(matches!(err, GatewayError::ProviderError(_)));
    }

    #[test]
    fn parse_chain_id__hex__normalized() {
        assert_eq!(parse_chain_id("0x89").unwrap(), ChainId(137));
        assert!(parse_chain_id("nope").is_err());
    }
}
