//! Transfer construction and submission
//!
//! Two paths with different trust assumptions:
//! - native transfers sign with the key held since unlock
//! - token transfers re-decrypt the key file with the caller's passphrase
//!   before authorizing a contract call
//!
//! Neither path retries. A broadcast failure is returned as-is and the caller
//! resubmits with a fresh nonce. Nonces are fetched per call and not
//! deduplicated; concurrent transfers from one account can race.

use super::erc20;
use super::session::{ActiveIdentity, WalletSession};
use super::transaction::{PendingTransaction, SignedTransaction, NATIVE_TRANSFER_GAS};
use crate::gateway::CallMessage;
use crate::keystore::run_blocking;
use crate::{Error, Result};
use alloy::eips::BlockId;
use alloy::primitives::{Address, B256, U256};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

fn chain_unavailable(err: Error) -> Error {
    match err {
        Error::ChainUnavailable(_) => err,
        other => Error::ChainUnavailable(other.to_string()),
    }
}

fn estimation_failed(err: Error) -> Error {
    match err {
        Error::EstimationFailed(_) => err,
        other => Error::EstimationFailed(other.to_string()),
    }
}

pub struct TransactionBuilder<'a> {
    identity: &'a ActiveIdentity,
    chain_id: u64,
    gas_multiplier: u64,
}

impl<'a> TransactionBuilder<'a> {
    /// Builder for the session's active identity; fails when locked
    pub fn for_session(session: &'a WalletSession) -> Result<Self> {
        let identity = session.active()?;
        let config = session.config();
        Ok(Self {
            identity,
            chain_id: config.chain_id,
            gas_multiplier: config.token_gas_multiplier,
        })
    }

    fn ensure_sender(&self, from: Address) -> Result<()> {
        let active = self.identity.account().address;
        if from != active {
            return Err(Error::InvalidArgument(format!(
                "sender {} is not the unlocked account {}",
                from, active
            )));
        }
        Ok(())
    }

    async fn next_nonce(&self, from: Address) -> Result<u64> {
        self.identity
            .gateway()
            .nonce_at(from, BlockId::latest())
            .await
            .map_err(chain_unavailable)
    }

    async fn submit(&self, signed: SignedTransaction) -> Result<B256> {
        self.identity
            .gateway()
            .broadcast(&signed)
            .await
            .map_err(chain_unavailable)?;
        Ok(signed.hash())
    }

    /// Send `amount` wei from the unlocked account to `to`
    pub async fn transfer_native(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<B256> {
        self.ensure_sender(from)?;
        let nonce = self.next_nonce(from).await?;

        let pending = PendingTransaction {
            nonce,
            to,
            value: amount,
            gas_limit: NATIVE_TRANSFER_GAS,
            gas_price,
            data: None,
        };
        let signed = self
            .identity
            .store()
            .sign_transaction(self.identity.account(), pending, self.chain_id)?;

        tracing::info!(
            from = %from,
            to = %to,
            nonce,
            tx_hash = %signed.hash(),
            "Submitting native transfer"
        );
        self.submit(signed).await
    }

    /// Send `amount` of the ERC-20 at `token` to `to`
    pub async fn transfer_token(
        &self,
        passphrase: &SecretString,
        from: Address,
        to: Address,
        token: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<B256> {
        self.ensure_sender(from)?;
        let nonce = self.next_nonce(from).await?;

        let payload = erc20::transfer_payload(to, amount);
        let call = CallMessage {
            from,
            to: token,
            value: U256::ZERO,
            data: payload.clone(),
        };
        let estimate = self
            .identity
            .gateway()
            .estimate_gas(&call)
            .await
            .map_err(estimation_failed)?;
        let gas_limit = estimate.checked_mul(self.gas_multiplier).ok_or_else(|| {
            Error::EstimationFailed(format!(
                "gas estimate {} overflows with multiplier {}",
                estimate, self.gas_multiplier
            ))
        })?;

        let pending = PendingTransaction {
            nonce,
            to: token,
            value: U256::ZERO,
            gas_limit,
            gas_price,
            data: Some(payload),
        };

        let store = self.identity.store().clone();
        let account = self.identity.account().clone();
        let chain_id = self.chain_id;
        let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());
        let signed = run_blocking(
            move || store.sign_transaction_with_passphrase(&account, &passphrase, pending, chain_id),
            Error::SigningFailed,
        )
        .await?;

        tracing::info!(
            from = %from,
            token = %token,
            nonce,
            estimate,
            gas_limit,
            tx_hash = %signed.hash(),
            "Submitting token transfer"
        );
        self.submit(signed).await
    }
}
