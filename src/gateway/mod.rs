//! Chain gateway
//!
//! The node-facing seam: nonce lookup, gas estimation, and broadcast. One
//! gateway is built per unlocked session from the remembered endpoint.

mod rpc;

use crate::wallet::SignedTransaction;
use crate::Result;
use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::sync::Arc;

pub use rpc::{RpcConnector, RpcGateway};

/// A call to simulate for gas estimation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMessage {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Node RPC operations used by the transaction pipeline
///
/// Implementations report `ChainUnavailable` for nonce and broadcast failures
/// and `EstimationFailed` for estimation failures.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Endpoint this gateway talks to
    fn endpoint(&self) -> &str;

    /// Transaction count of `address` as of `block`
    async fn nonce_at(&self, address: Address, block: BlockId) -> Result<u64>;

    async fn estimate_gas(&self, call: &CallMessage) -> Result<u64>;

    /// Submit a signed transaction; success means the node accepted it
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<()>;
}

/// Builds a gateway for an endpoint URL
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainGateway>>;
}
