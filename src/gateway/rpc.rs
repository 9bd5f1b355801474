//! JSON-RPC gateway over alloy's HTTP provider
//!
//! SECURITY NOTE:
//! - Only public data (addresses, call data, signed transactions) is sent
//! - No key material reaches this module

use super::{CallMessage, ChainGateway, GatewayConnector};
use crate::wallet::SignedTransaction;
use crate::{Error, Result};
use alloy::eips::BlockId;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Gateway backed by an HTTP JSON-RPC endpoint
pub struct RpcGateway {
    endpoint: String,
    provider: DynProvider,
}

impl RpcGateway {
    /// Build a gateway for `endpoint`; no request is made until first use
    pub fn connect(endpoint: &str) -> Result<Self> {
        let url: url::Url = endpoint
            .parse()
            .map_err(|e| Error::ChainUnavailable(format!("Invalid RPC URL {:?}: {}", endpoint, e)))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            endpoint: endpoint.to_string(),
            provider,
        })
    }
}

/// Turn a failed `eth_estimateGas` into `EstimationFailed`, decoding the
/// contract's revert reason when the node returned revert data
fn estimation_error(err: TransportError) -> Error {
    let reason = match err.as_error_resp() {
        Some(payload) => match payload.as_revert_data() {
            Some(data) => decode_revert_reason(&data)
                .unwrap_or_else(|| format!("execution reverted with data {}", data)),
            None => payload.message.to_string(),
        },
        None => err.to_string(),
    };
    Error::EstimationFailed(reason)
}

#[async_trait]
impl ChainGateway for RpcGateway {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn nonce_at(&self, address: Address, block: BlockId) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .block_id(block)
            .await
            .map_err(|e| Error::ChainUnavailable(format!("Failed to get nonce: {}", e)))
    }

    async fn estimate_gas(&self, call: &CallMessage) -> Result<u64> {
        let tx = TransactionRequest::default()
            .from(call.from)
            .to(call.to)
            .input(call.data.clone().into())
            .value(call.value);

        self.provider
            .estimate_gas(tx)
            .await
            .map_err(estimation_error)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<()> {
        tracing::debug!(tx_hash = %tx.hash(), endpoint = %self.endpoint, "Broadcasting transaction");
        self.provider
            .send_raw_transaction(tx.raw())
            .await
            .map(|_| ())
            .map_err(|e| Error::ChainUnavailable(format!("Failed to send transaction: {}", e)))
    }
}

/// Connector producing [`RpcGateway`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcConnector;

impl GatewayConnector for RpcConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainGateway>> {
        Ok(Arc::new(RpcGateway::connect(endpoint)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::hex;
    use alloy::sol_types::{Revert, SolError};

    #[test]
    fn test_connect_rejects_bad_url() {
        assert!(matches!(
            RpcGateway::connect("not a url"),
            Err(Error::ChainUnavailable(_))
        ));
        assert!(matches!(
            RpcGateway::connect(""),
            Err(Error::ChainUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let gateway = RpcConnector.connect("http://127.0.0.1:1").unwrap();
        assert_eq!(gateway.endpoint(), "http://127.0.0.1:1");
    }

    fn error_response(json: serde_json::Value) -> TransportError {
        TransportError::ErrorResp(serde_json::from_str(&json.to_string()).unwrap())
    }

    #[test]
    fn test_estimation_error_decodes_revert_string() {
        let data = Revert {
            reason: "ERC20: transfer amount exceeds balance".to_string(),
        }
        .abi_encode();
        let err = estimation_error(error_response(serde_json::json!({
            "code": 3,
            "message": "execution reverted",
            "data": hex::encode_prefixed(data),
        })));

        match err {
            Error::EstimationFailed(reason) => {
                assert!(reason.contains("ERC20: transfer amount exceeds balance"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_estimation_error_keeps_undecodable_revert_data() {
        let err = estimation_error(error_response(serde_json::json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0xdeadbeef",
        })));
        match err {
            Error::EstimationFailed(reason) => assert!(reason.contains("0xdeadbeef")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_estimation_error_without_revert_uses_message() {
        let err = estimation_error(error_response(serde_json::json!({
            "code": -32000,
            "message": "insufficient funds for gas",
        })));
        assert!(matches!(
            err,
            Error::EstimationFailed(ref reason) if reason == "insufficient funds for gas"
        ));
    }
}
