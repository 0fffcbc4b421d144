use crate::snapshot::{
    WalletSnapshot,
    WalletStatus,
};
use networks::{
    ChainId,
    SupportedNetworks,
};

/// Exactly one of these is on screen at any time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PresenterMode {
    ConnectPrompt,
    SwitchNetworkPrompt,
    ConnectedView,
}

impl PresenterMode {
    pub fn for_status(status: WalletStatus) -> Self {
        match status {
            WalletStatus::NoProvider | WalletStatus::Disconnected | WalletStatus::Error => {
                PresenterMode::ConnectPrompt
            }
            WalletStatus::ConnectedUnsupportedNetwork => PresenterMode::SwitchNetworkPrompt,
            WalletStatus::ConnectedSupportedNetwork => PresenterMode::ConnectedView,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SwitchTarget {
    pub chain_id: ChainId,
    pub display_name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletView {
    pub mode: PresenterMode,
    pub headline: String,
    /// Shortened account, connected modes only.
    pub account: Option<String>,
    pub network: Option<String>,
    pub switch_target: Option<SwitchTarget>,
    /// Connect prompt shown because no wallet is installed at all.
    pub wallet_missing: bool,
    pub error: Option<String>,
}

pub fn present(snapshot: &WalletSnapshot, networks: &SupportedNetworks) -> WalletView {
    let mode = PresenterMode::for_status(snapshot.status());
    let account = snapshot.account().map(|a| a.short());
    let network = snapshot.chain_id().map(|chain_id| match networks.get(chain_id) {
        Some(entry) => entry.display_name.clone(),
        None => format!("Unknown network ({chain_id})"),
    });
    let switch_target = (mode != PresenterMode::ConnectPrompt).then(|| {
        let entry = networks.switch_target(snapshot.chain_id());
        SwitchTarget {
            chain_id: entry.chain_id,
            display_name: entry.display_name.clone(),
        }
    });
    let headline = match (snapshot.status(), &switch_target) {
        (WalletStatus::NoProvider, _) => "No wallet found. Install a wallet to continue.".to_string(),
        (WalletStatus::Disconnected, _) => "Connect your wallet".to_string(),
        (WalletStatus::Error, _) => "Could not read the wallet. Retrying...".to_string(),
        (WalletStatus::ConnectedUnsupportedNetwork, Some(target)) => {
            format!("Wrong network. Switch to {}", target.display_name)
        }
        (WalletStatus::ConnectedUnsupportedNetwork, None) => "Wrong network".to_string(),
        (WalletStatus::ConnectedSupportedNetwork, _) => "Connected".to_string(),
    };
    WalletView {
        mode,
        headline,
        account,
        network,
        switch_target,
        wallet_missing: snapshot.status() == WalletStatus::NoProvider,
        error: snapshot.error_detail().map(str::to_string),
    }
}

/// View shown before the first pass has published anything.
pub fn pending_view() -> WalletView {
    WalletView {
        mode: PresenterMode::ConnectPrompt,
        headline: "Checking wallet...".to_string(),
        account: None,
        network: None,
        switch_target: None,
        wallet_missing: false,
        error: None,
    }
}
