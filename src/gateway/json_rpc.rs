use super::{
    EventHandler,
    EventKind,
    GatewayError,
    GatewayResult,
    ProviderEvent,
    ProviderGateway,
    ProviderHandle,
    Subscriptions,
    parse_accounts,
    parse_chain_id,
};
use crate::snapshot::Address;
use networks::{
    ChainId,
    NetworkEntry,
};
use parking_lot::Mutex;
use serde_json::{
    Value,
    json,
};
use std::{
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};

const USER_REJECTED_CODE: i64 = 4001;
const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// EIP-1193 wallet reached through a JSON-RPC proxy over HTTP.
///
/// HTTP has no push channel, so the gateway raises `AccountsChanged` and
/// `ChainChanged` itself whenever a response differs from the previous one
/// it saw.
#[derive(Debug)]
pub struct JsonRpcGateway {
    endpoint: Option<String>,
    http: reqwest::Client,
    next_id: AtomicU64,
    generation: AtomicU64,
    observed: Mutex<Observed>,
    subscriptions: Subscriptions,
}

#[derive(Debug, Default)]
struct Observed {
    accounts: Option<Vec<Address>>,
    chain_id: Option<ChainId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RpcFailure {
    code: Option<i64>,
    message: String,
}

impl JsonRpcGateway {
    /// `endpoint == None` builds a gateway that reports no provider.
    pub fn new(endpoint: Option<String>, request_timeout: Duration) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                GatewayError::ProviderError(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            endpoint: endpoint.map(|url| url.trim_end_matches('/').to_string()),
            http,
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            observed: Mutex::new(Observed::default()),
            subscriptions: Subscriptions::default(),
        })
    }

    /// Read-only contract call at the latest block; returns the hex result.
    pub async fn eth_call(&self, to: &Address, data: &str) -> GatewayResult<String> {
        let result = self
            .call(
                "eth_call",
                json!([{ "to": to.as_str(), "data": data }, "latest"]),
            )
            .await
            .map_err(|failure| {
                GatewayError::BalanceQueryFailed(match failure {
                    CallError::Gateway(e) => e.to_string(),
                    CallError::Rpc(rpc) => rpc.message,
                })
            })?;
        result.as_str().map(str::to_owned).ok_or_else(|| {
            GatewayError::BalanceQueryFailed("eth_call: hex string expected".to_string())
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(CallError::Gateway(GatewayError::ProviderUnavailable))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = request_body(id, method, params);
        let response = self
            .http
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| transport(format!("{method} response was not JSON: {e}")))?;
        if let Some(error) = body.get("error") {
            return Err(CallError::Rpc(rpc_failure(error)));
        }
        if !status.is_success() {
            return Err(transport(format!("{method} returned HTTP {status}: {body}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| transport(format!("{method} response missing result")))
    }

    async fn call_accounts(&self, method: &str) -> GatewayResult<Vec<Address>> {
        let result = self.call(method, json!([])).await.map_err(CallError::into_gateway)?;
        let raw: Vec<String> = serde_json::from_value(result).map_err(|e| {
            GatewayError::ProviderError(format!("{method}: array of addresses expected: {e}"))
        })?;
        let accounts = parse_accounts(&raw)?;
        self.observe_accounts(&accounts);
        Ok(accounts)
    }

    fn observe_accounts(&self, accounts: &[Address]) {
        let changed = {
            let mut observed = self.observed.lock();
            let changed = observed
                .accounts
                .as_deref()
                .is_some_and(|previous| previous != accounts);
            observed.accounts = Some(accounts.to_vec());
            changed
        };
        if changed {
            let raw = accounts.iter().map(|a| a.as_str().to_string()).collect();
            self.subscriptions.emit(&ProviderEvent::AccountsChanged(raw));
        }
    }

    fn observe_chain(&self, chain_id: ChainId) {
        let changed = {
            let mut observed = self.observed.lock();
            let changed = observed
                .chain_id
                .is_some_and(|previous| previous != chain_id);
            observed.chain_id = Some(chain_id);
            changed
        };
        if changed {
            self.subscriptions
                .emit(&ProviderEvent::ChainChanged(chain_id.to_hex()));
        }
    }
}

impl ProviderGateway for JsonRpcGateway {
    fn is_available(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn get_accounts(&self) -> GatewayResult<Vec<Address>> {
        self.call_accounts("eth_accounts").await
    }

    async fn get_chain_id(&self) -> GatewayResult<ChainId> {
        let result = self
            .call("eth_chainId", json!([]))
            .await
            .map_err(CallError::into_gateway)?;
        let chain_id = json_chain_id(&result)?;
        self.observe_chain(chain_id);
        Ok(chain_id)
    }

    async fn request_accounts(&self) -> GatewayResult<Vec<Address>> {
        self.call_accounts("eth_requestAccounts").await
    }

    async fn request_network_switch(&self, target: ChainId) -> GatewayResult<()> {
        self.call(
            "wallet_switchEthereumChain",
            json!([{ "chainId": target.to_hex() }]),
        )
        .await
        .map(|_| ())
        .map_err(|e| match e {
            CallError::Rpc(rpc) if rpc.is_unrecognized_chain() => {
                GatewayError::NetworkUnknownToProvider(target)
            }
            other => other.into_gateway(),
        })
    }

    async fn request_add_network(&self, network: &NetworkEntry) -> GatewayResult<()> {
        self.call(
            "wallet_addEthereumChain",
            json!([network.add_network_request()]),
        )
        .await
        .map(|_| ())
        .map_err(CallError::into_gateway)
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.subscriptions.subscribe(kind, handler);
    }

    fn unsubscribe_all(&self, kind: EventKind) {
        self.subscriptions.unsubscribe_all(kind);
    }

    fn handle(&self) -> ProviderHandle {
        ProviderHandle {
            endpoint: self.endpoint.clone(),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    fn rebind(&self) -> ProviderHandle {
        self.observed.lock().chain_id = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.handle()
    }
}

#[derive(Debug)]
enum CallError {
    Gateway(GatewayError),
    Rpc(RpcFailure),
}

impl CallError {
    fn into_gateway(self) -> GatewayError {
        match self {
            CallError::Gateway(e) => e,
            CallError::Rpc(rpc) if rpc.code == Some(USER_REJECTED_CODE) => {
                GatewayError::UserRejected
            }
            CallError::Rpc(rpc) => GatewayError::ProviderError(match rpc.code {
                Some(code) => format!("{} (code {code})", rpc.message),
                None => rpc.message,
            }),
        }
    }
}

impl RpcFailure {
    fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN_CODE)
            || self.message.to_ascii_lowercase().contains("unrecognized chain")
    }
}

fn transport(message: String) -> CallError {
    CallError::Gateway(GatewayError::ProviderError(message))
}

fn request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

fn rpc_failure(error: &Value) -> RpcFailure {
    RpcFailure {
        code: error.get("code").and_then(Value::as_i64),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
    }
}

fn json_chain_id(value: &Value) -> GatewayResult<ChainId> {
    if let Some(n) = value.as_u64() {
        return Ok(ChainId(n));
    }
    let raw = value.as_str().ok_or_else(|| {
        GatewayError::ProviderError("eth_chainId: string or number expected".to_string())
    })?;
    parse_chain_id(raw)
}
