use super::{
    BalanceQuery,
    TokenAmount,
    TokenBalanceSource,
};
use crate::{
    gateway::{
        GatewayError,
        GatewayResult,
        ProviderGateway,
        ProviderHandle,
        json_rpc::JsonRpcGateway,
    },
    snapshot::Address,
};
use tracing::debug;

/// `balanceOf(address)`
const BALANCE_OF_SELECTOR: &str = "70a08231";

pub fn balance_of_calldata(account: &Address) -> String {
    let digits = account.as_str().trim_start_matches("0x");
    format!("0x{BALANCE_OF_SELECTOR}{digits:0>64}")
}

/// Decodes a `uint256` return word. Values above `u128::MAX` are rejected.
pub fn decode_uint256(word: &str) -> GatewayResult<u128> {
    let digits = word.trim_start_matches("0x");
    if digits.is_empty() {
        return Err(GatewayError::BalanceQueryFailed(
            "empty return data, no contract at that address?".to_string(),
        ));
    }
    let bytes = hex::decode(digits)
        .map_err(|e| GatewayError::BalanceQueryFailed(format!("bad return data: {e}")))?;
    let Ok(word) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        return Err(GatewayError::BalanceQueryFailed(format!(
            "expected a 32-byte word, got {} bytes",
            bytes.len()
        )));
    };
    let (high, low) = word.split_at(16);
    if high.iter().any(|b| *b != 0) {
        return Err(GatewayError::BalanceQueryFailed(
            "balance does not fit in 128 bits".to_string(),
        ));
    }
    let mut low_bytes = [0u8; 16];
    low_bytes.copy_from_slice(low);
    Ok(u128::from_be_bytes(low_bytes))
}

impl TokenBalanceSource for JsonRpcGateway {
    fn provider_handle(&self) -> ProviderHandle {
        self.handle()
    }

    async fn balance_of(&self, query: &BalanceQuery) -> GatewayResult<TokenAmount> {
        debug!(
            contract = %query.contract,
            account = %query.account.short(),
            generation = query.handle.generation,
            "querying token balance"
        );
        let word = self
            .eth_call(&query.contract, &balance_of_calldata(&query.account))
            .await?;
        Ok(TokenAmount::new(decode_uint256(&word)?, query.decimals))
    }
}
