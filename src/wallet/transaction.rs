//! Pending and signed transactions
//!
//! Transactions are legacy (type 0) with EIP-155 replay protection. Value and
//! gas price are `U256`; gas price is narrowed to the wire width only at
//! signing time.

use super::SecureKey;
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256, U256};

/// Gas consumed by a plain value transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// A transaction that has not been signed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub data: Option<Bytes>,
}

impl PendingTransaction {
    /// Legacy transaction with the fields in signing order
    pub fn to_legacy(&self, chain_id: u64) -> Result<TxLegacy> {
        let gas_price = u128::try_from(self.gas_price).map_err(|_| {
            Error::SigningFailed(format!("gas price {} exceeds 128 bits", self.gas_price))
        })?;
        Ok(TxLegacy {
            chain_id: Some(chain_id),
            nonce: self.nonce,
            gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.data.clone().unwrap_or_default(),
        })
    }

    pub fn sign(self, key: &SecureKey, chain_id: u64) -> Result<SignedTransaction> {
        let mut legacy = self.to_legacy(chain_id)?;
        let signature = key.sign_transaction(&mut legacy)?;
        let signed = legacy.into_signed(signature);
        let hash = *signed.hash();
        let raw = Bytes::from(TxEnvelope::Legacy(signed).encoded_2718());

        Ok(SignedTransaction {
            tx: self,
            chain_id,
            signature,
            hash,
            raw,
        })
    }
}

/// A signed, encoded transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: PendingTransaction,
    chain_id: u64,
    signature: Signature,
    hash: B256,
    raw: Bytes,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &PendingTransaction {
        &self.tx
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// EIP-2718 encoded bytes as sent to `eth_sendRawTransaction`
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}
