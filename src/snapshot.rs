use networks::{
    ChainId,
    SupportedNetworks,
};
use std::fmt;

const ADDRESS_HEX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid account address '{0}'")]
pub struct InvalidAddress(pub String);

/// Account address, always stored lowercase.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, InvalidAddress> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| InvalidAddress(raw.to_string()))?;
        if digits.len() != ADDRESS_HEX_LEN || hex::decode(digits).is_err() {
            return Err(InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234…abcd`
    pub fn short(&self) -> String {
        let (head, tail) = (&self.0[..6], &self.0[self.0.len() - 4..]);
        format!("{head}…{tail}")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WalletStatus {
    NoProvider,
    Disconnected,
    ConnectedUnsupportedNetwork,
    ConnectedSupportedNetwork,
    Error,
}

impl WalletStatus {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            WalletStatus::ConnectedSupportedNetwork
                | WalletStatus::ConnectedUnsupportedNetwork
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            WalletStatus::NoProvider => "no-provider",
            WalletStatus::Disconnected => "disconnected",
            WalletStatus::ConnectedUnsupportedNetwork => "connected-unsupported",
            WalletStatus::ConnectedSupportedNetwork => "connected-supported",
            WalletStatus::Error => "error",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What is true about the external wallet at one reconciliation pass.
///
/// Only the constructors below build snapshots, so `account` and `chain_id`
/// are present exactly when the status is connected, the supported/unsupported
/// split always matches the network table, and `error_detail` only accompanies
/// `Error`. Equality is field-wise and is what the engine uses to decide
/// whether a pass produced a transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletSnapshot {
    status: WalletStatus,
    account: Option<Address>,
    chain_id: Option<ChainId>,
    error_detail: Option<String>,
}

impl WalletSnapshot {
    pub fn no_provider() -> Self {
        Self::bare(WalletStatus::NoProvider)
    }

    pub fn disconnected() -> Self {
        Self::bare(WalletStatus::Disconnected)
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::bare(WalletStatus::Error)
        }
    }

    pub fn connected(
        account: Address,
        chain_id: ChainId,
        networks: &SupportedNetworks,
    ) -> Self {
        let status = if networks.contains(chain_id) {
            WalletStatus::ConnectedSupportedNetwork
        } else {
            WalletStatus::ConnectedUnsupportedNetwork
        };
        Self {
            status,
            account: Some(account),
            chain_id: Some(chain_id),
            error_detail: None,
        }
    }

    fn bare(status: WalletStatus) -> Self {
        Self {
            status,
            account: None,
            chain_id: None,
            error_detail: None,
        }
    }

    pub fn status(&self) -> WalletStatus {
        self.status
    }

    pub fn account(&self) -> Option<&Address> {
        self.account.as_ref()
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Account and chain of a connected snapshot.
    pub fn connection(&self) -> Option<(&Address, ChainId)> {
        match (&self.account, self.chain_id) {
            (Some(account), Some(chain_id)) => Some((account, chain_id)),
            _ => None,
        }
    }
}

impl fmt::Display for WalletSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.connection(), &self.error_detail) {
            (Some((account, chain_id)), _) => {
                write!(f, "{} {} on {}", self.status, account.short(), chain_id)
            }
            (None, Some(detail)) => write!(f, "{}: {}", self.status, detail),
            (None, None) => write!(f, "{}", self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    const ALICE: &str = "0xAbC0000000000000000000000000000000000001";

    #[test]
    fn parse__mixed_case_address__is_lowercased() {
        let address = Address::parse(ALICE).unwrap();
        assert_eq!(address.as_str(), "0xabc0000000000000000000000000000000000001");
    }

    #[test]
    fn parse__wrong_length_or_missing_prefix__rejected() {
        assert!(Address::parse("0xabc").is_err());
        assert!(Address::parse("abc0000000000000000000000000000000000001").is_err());
        assert!(Address::parse("0xzz00000000000000000000000000000000000001").is_err());
    }

    #[test]
    fn short__keeps_prefix_and_last_four() {
        let address = Address::parse(ALICE).unwrap();
        assert_eq!(address.short(), "0xabc0…0001");
    }

    #[test]
    fn connected__unsupported_chain__marks_unsupported() {
        // given
        let networks = SupportedNetworks::builtin();
        let account = Address::parse(ALICE).unwrap();

        // when
        let snapshot = WalletSnapshot::connected(account, ChainId(1), &networks);

        // then
        assert_eq!(snapshot.status(), WalletStatus::ConnectedUnsupportedNetwork);
        assert_eq!(snapshot.chain_id(), Some(ChainId(1)));
        assert!(snapshot.is_connected());
    }

    #[test]
    fn error__carries_detail_without_connection() {
        let snapshot = WalletSnapshot::error("transport closed");
        assert_eq!(snapshot.status(), WalletStatus::Error);
        assert_eq!(snapshot.error_detail(), Some("transport closed"));
        assert!(snapshot.connection().is_none());
    }

    #[test]
    fn eq__differing_error_detail__not_equivalent() {
        assert_ne!(WalletSnapshot::error("a"), WalletSnapshot::error("b"));
        assert_eq!(WalletSnapshot::disconnected(), WalletSnapshot::disconnected());
    }

    proptest! {
        #[test]
        fn connected__status_matches_table_membership(chain in prop_oneof![Just(137u64), Just(31337u64), any::<u64>()]) {
            let networks = SupportedNetworks::builtin();
            let account = Address::parse(ALICE).unwrap();
            let snapshot = WalletSnapshot::connected(account, ChainId(chain), &networks);

            prop_assert_eq!(
                snapshot.status() == WalletStatus::ConnectedSupportedNetwork,
                networks.contains(ChainId(chain))
            );
            prop_assert!(snapshot.account().is_some() && snapshot.chain_id().is_some());
            prop_assert!(snapshot.error_detail().is_none());
        }
    }
}
