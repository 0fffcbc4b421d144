//! Keeps an authoritative view of an external wallet's connection state
//! (provider presence, authorized account, active network) and fans real
//! changes out to the UI and to a debounced token-balance reader.

pub mod balance;
pub mod bus;
pub mod engine;
pub mod gateway;
pub mod presenter;
pub mod snapshot;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use networks::{
    self,
    ChainId,
    NetworkEntry,
    SupportedNetworks,
};
pub use snapshot::{
    Address,
    WalletSnapshot,
    WalletStatus,
};
