use anyhow::{
    Context,
    Result,
    anyhow,
    bail,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::{
    collections::HashSet,
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};

pub const POLYGON_MAINNET: ChainId = ChainId(137);
pub const LOCAL_CHAIN: ChainId = ChainId(31337);
const NATIVE_CURRENCY_DECIMALS: u8 = 18;

/// Canonical chain identifier. Providers hand these out as hex strings
/// (`"0x89"`), everything past the gateway boundary uses the integer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Accepts `0x`-prefixed hex or plain decimal.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"));
        let (body, radix) = match digits {
            Some(hex) => (hex, 16),
            None => (trimmed, 10),
        };
        // from_str_radix alone lets a leading sign through
        if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
            bail!("invalid chain id '{raw}'");
        }
        let value = match digits {
            Some(hex) => u64::from_str_radix(hex, 16)
                .with_context(|| format!("invalid hex chain id '{raw}'"))?,
            None => trimmed
                .parse::<u64>()
                .with_context(|| format!("invalid chain id '{raw}'"))?,
        };
        Ok(Self(value))
    }

    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(ChainId(n)),
            Raw::Text(s) => ChainId::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub chain_id: ChainId,
    pub display_name: String,
    pub rpc_endpoint: String,
    pub native_symbol: String,
    #[serde(default)]
    pub block_explorer: Option<String>,
    /// Token whose balance the UI shows on this network, if deployed there.
    #[serde(default)]
    pub token_contract: Option<String>,
}

impl NetworkEntry {
    pub fn add_network_request(&self) -> AddNetworkRequest {
        AddNetworkRequest {
            chain_id: self.chain_id.to_hex(),
            chain_name: self.display_name.clone(),
            native_currency: NativeCurrency {
                name: self.native_symbol.clone(),
                symbol: self.native_symbol.clone(),
                decimals: NATIVE_CURRENCY_DECIMALS,
            },
            rpc_urls: vec![self.rpc_endpoint.clone()],
            block_explorer_urls: self.block_explorer.clone().map(|url| vec![url]),
        }
    }

    /// Text shown when the wallet cannot register the network by itself.
    pub fn manual_setup_instructions(&self) -> String {
        format!(
            "Add the network manually in your wallet:\n\
             Network Name: {}\n\
             RPC URL: {}\n\
             Chain ID: {}\n\
             Currency Symbol: {}",
            self.display_name, self.rpc_endpoint, self.chain_id, self.native_symbol
        )
    }
}

/// Parameter object of a `wallet_addEthereumChain` request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNetworkRequest {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_explorer_urls: Option<Vec<String>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Networks the UI treats as "correct". Fixed for the lifetime of an engine.
/// The first entry is the primary network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupportedNetworks {
    entries: Vec<NetworkEntry>,
}

impl SupportedNetworks {
    pub fn new(entries: Vec<NetworkEntry>) -> Result<Self> {
        if entries.is_empty() {
            bail!("supported network table must contain at least one network");
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.chain_id) {
                bail!("chain id {} listed more than once", entry.chain_id);
            }
        }
        Ok(Self { entries })
    }

    pub fn builtin() -> Self {
        Self {
            entries: vec![
                NetworkEntry {
                    chain_id: POLYGON_MAINNET,
                    display_name: "Polygon Mainnet".to_string(),
                    rpc_endpoint: "https://polygon-rpc.com".to_string(),
                    native_symbol: "MATIC".to_string(),
                    block_explorer: Some("https://polygonscan.com".to_string()),
                    token_contract: None,
                },
                NetworkEntry {
                    chain_id: LOCAL_CHAIN,
                    display_name: "Local Chain".to_string(),
                    rpc_endpoint: "http://127.0.0.1:8545".to_string(),
                    native_symbol: "ETH".to_string(),
                    block_explorer: None,
                    token_contract: None,
                },
            ],
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| {
            format!("Failed to read network table {}", path.display())
        })?;
        Self::from_json_slice(&data)
            .with_context(|| format!("Invalid network table {}", path.display()))
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct Wrapped {
            networks: Vec<NetworkEntry>,
        }

        if let Ok(entries) = serde_json::from_slice::<Vec<NetworkEntry>>(data) {
            return Self::new(entries);
        }
        match serde_json::from_slice::<Wrapped>(data) {
            Ok(wrapped) => Self::new(wrapped.networks),
            Err(e) => Err(anyhow!(
                "expected a JSON array of networks or {{\"networks\": [...]}}: {e}"
            )),
        }
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.get(chain_id).is_some()
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&NetworkEntry> {
        self.entries.iter().find(|entry| entry.chain_id == chain_id)
    }

    pub fn primary(&self) -> &NetworkEntry {
        // `new` and `builtin` guarantee at least one entry
        &self.entries[0]
    }

    pub fn entries(&self) -> &[NetworkEntry] {
        &self.entries
    }

    /// Network a "switch" button should offer: the other supported network
    /// while on a supported one, otherwise the primary network.
    pub fn switch_target(&self, current: Option<ChainId>) -> &NetworkEntry {
        match current {
            Some(chain_id) if self.contains(chain_id) => self
                .entries
                .iter()
                .find(|entry| entry.chain_id != chain_id)
                .unwrap_or_else(|| self.primary()),
            _ => self.primary(),
        }
    }
}

impl Default for SupportedNetworks {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn resolve_table_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    fn entry(chain_id: u64) -> NetworkEntry {
        NetworkEntry {
            chain_id: ChainId(chain_id),
            display_name: format!("Chain {chain_id}"),
            rpc_endpoint: format!("https://rpc.chain-{chain_id}.example"),
            native_symbol: "ETH".to_string(),
            block_explorer: None,
            token_contract: None,
        }
    }

    #[test]
    fn parse__hex_and_decimal__yield_same_chain() {
        assert_eq!(ChainId::parse("0x89").unwrap(), ChainId(137));
        assert_eq!(ChainId::parse("0X7A69").unwrap(), ChainId(31337));
        assert_eq!(ChainId::parse("137").unwrap(), ChainId(137));
    }

    #[test]
    fn parse__garbage__fails() {
        assert!(ChainId::parse("0xzz").is_err());
        assert!(ChainId::parse("polygon").is_err());
        assert!(ChainId::parse("0x+89").is_err());
        assert!(ChainId::parse("+137").is_err());
        assert!(ChainId::parse("0x").is_err());
        assert!(ChainId::parse("").is_err());
    }

    #[test]
    fn new__duplicate_chain_ids__rejected() {
        let err = SupportedNetworks::new(vec![entry(1), entry(1)]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn new__empty_table__rejected() {
        assert!(SupportedNetworks::new(Vec::new()).is_err());
    }

    #[test]
    fn from_json_slice__wrapped_object_with_hex_ids__normalizes_chain_ids() {
        // given
        let json = br#"{
            "networks": [
                {
                    "chain_id": "0x89",
                    "display_name": "Polygon Mainnet",
                    "rpc_endpoint": "https://polygon-rpc.com",
                    "native_symbol": "MATIC",
                    "block_explorer": "https://polygonscan.com",
                    "token_contract": "0x00000000000000000000000000000000000000aa"
                },
                {
                    "chain_id": 31337,
                    "display_name": "Local Chain",
                    "rpc_endpoint": "http://127.0.0.1:8545",
                    "native_symbol": "ETH"
                }
            ]
        }"#;

        // when
        let table = SupportedNetworks::from_json_slice(json).unwrap();

        // then
        assert!(table.contains(ChainId(137)));
        assert!(table.contains(ChainId(31337)));
        assert_eq!(table.primary().chain_id, ChainId(137));
        assert_eq!(table.get(ChainId(31337)).unwrap().token_contract, None);
    }

    #[test]
    fn from_json_slice__bare_array__accepted() {
        let json = br#"[{"chain_id": "1", "display_name": "Ethereum", "rpc_endpoint": "https://eth.example", "native_symbol": "ETH"}]"#;
        let table = SupportedNetworks::from_json_slice(json).unwrap();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.primary().chain_id, ChainId(1));
    }

    #[test]
    fn load__file_on_disk__reads_table() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networks.json");
        fs::write(
            &path,
            br#"[{"chain_id": 10, "display_name": "Optimism", "rpc_endpoint": "https://op.example", "native_symbol": "ETH"}]"#,
        )
        .unwrap();

        // when
        let table = SupportedNetworks::load(&path).unwrap();

        // then
        assert_eq!(table.primary().display_name, "Optimism");
    }

    #[test]
    fn switch_target__toggles_between_supported_and_falls_back_to_primary() {
        let table = SupportedNetworks::builtin();
        assert_eq!(table.switch_target(Some(POLYGON_MAINNET)).chain_id, LOCAL_CHAIN);
        assert_eq!(table.switch_target(Some(LOCAL_CHAIN)).chain_id, POLYGON_MAINNET);
        assert_eq!(table.switch_target(Some(ChainId(1))).chain_id, POLYGON_MAINNET);
        assert_eq!(table.switch_target(None).chain_id, POLYGON_MAINNET);
    }

    #[test]
    fn add_network_request__serializes_wallet_parameters() {
        // given
        let polygon = SupportedNetworks::builtin().primary().clone();

        // when
        let value = serde_json::to_value(polygon.add_network_request()).unwrap();

        // then
        assert_eq!(
            value,
            serde_json::json!({
                "chainId": "0x89",
                "chainName": "Polygon Mainnet",
                "nativeCurrency": { "name": "MATIC", "symbol": "MATIC", "decimals": 18 },
                "rpcUrls": ["https://polygon-rpc.com"],
                "blockExplorerUrls": ["https://polygonscan.com"],
            })
        );
    }

    #[test]
    fn add_network_request__without_explorer__omits_explorer_urls() {
        let local = SupportedNetworks::builtin()
            .get(LOCAL_CHAIN)
            .unwrap()
            .add_network_request();
        let value = serde_json::to_value(local).unwrap();
        assert!(value.get("blockExplorerUrls").is_none());
    }

    proptest! {
        #[test]
        fn to_hex__parses_back_to_same_chain(id in any::<u64>()) {
            prop_assert_eq!(ChainId::parse(&ChainId(id).to_hex()).unwrap(), ChainId(id));
        }
    }
}
