//! Caller-facing wallet service
//!
//! `WalletService` owns the single `WalletSession` behind a `tokio` read-write
//! lock:
//! - unlock, import, lock, reset, and endpoint changes take the write lock, so
//!   only one of them runs at a time and none overlaps a transfer
//! - state queries, export, and transfers share the read lock and may run
//!   concurrently with each other
//!
//! Every operation either completes or fails with an [`Error`] whose
//! [`Error::code`] identifies the failure site. Lock and reset never fail.

use crate::audit::{AuditEntry, AuditLog};
use crate::config::Config;
use crate::gateway::{GatewayConnector, RpcConnector};
use crate::wallet::{self, TransactionBuilder, WalletSession};
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::{Address, U256};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockState {
    pub is_unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountAddress {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
}

#[derive(Debug)]
pub struct GeneratedMnemonic {
    pub mnemonic: SecretString,
}

#[derive(Debug)]
pub struct ExportedKey {
    pub private_key: SecretString,
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", field, e)))
}

fn parse_amount(field: &str, value: &str) -> Result<U256> {
    U256::from_str(value.trim()).map_err(|e| Error::InvalidArgument(format!("{}: {}", field, e)))
}

fn decode_key_hex(key_hex: &SecretString) -> Result<Zeroizing<Vec<u8>>> {
    let trimmed = key_hex.expose_secret().trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(trimmed)
        .map(Zeroizing::new)
        .map_err(|_| Error::InvalidKeyBytes)
}

pub struct WalletService {
    config: Arc<Config>,
    session: RwLock<WalletSession>,
    audit: Option<AuditLog>,
}

impl WalletService {
    /// Service talking to real nodes over JSON-RPC
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, Arc::new(RpcConnector))
    }

    pub fn with_connector(config: Config, connector: Arc<dyn GatewayConnector>) -> Result<Self> {
        config.validate()?;
        let config = config.with_absolute_data_dir()?;
        let audit = config.audit_log_file().map(AuditLog::new);
        let config = Arc::new(config);
        let session = WalletSession::new(config.clone(), connector);
        Ok(Self {
            config,
            session: RwLock::new(session),
            audit,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn finish<T>(
        &self,
        operation: &'static str,
        started: Instant,
        result: Result<T>,
        annotate: impl FnOnce(&T, AuditEntry) -> AuditEntry,
    ) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!(operation, code = e.code(), error = %e, "Wallet operation failed");
        }
        if let Some(log) = &self.audit {
            let entry = AuditEntry::new(operation, started);
            let entry = match &result {
                Ok(value) => annotate(value, entry),
                Err(e) => entry.failed(e.code()),
            };
            log.record(entry).await;
        }
        result
    }

    /// Remember the node endpoint; a returning, unlocked user also switches
    /// the live session to it
    pub async fn set_endpoint(&self, is_returning_user: bool, url: &str) -> Result<()> {
        let started = Instant::now();
        let result = self
            .session
            .write()
            .await
            .set_endpoint(is_returning_user, url);
        self.finish("set_endpoint", started, result, |_, entry| entry)
            .await
    }

    /// Lock the session and erase the keystore and remembered settings
    pub async fn reset(&self) {
        let started = Instant::now();
        self.session.write().await.reset();
        let _ = self.finish("reset", started, Ok(()), |_, entry| entry).await;
    }

    /// Lock the session, keeping the keystore for a later unlock
    pub async fn lock(&self) {
        let started = Instant::now();
        self.session.write().await.lock();
        let _ = self.finish("lock", started, Ok(()), |_, entry| entry).await;
    }

    pub async fn query_unlock_state(&self) -> UnlockState {
        UnlockState {
            is_unlocked: self.session.read().await.is_unlocked(),
        }
    }

    /// Unlock the remembered keystore file
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<AccountAddress> {
        let started = Instant::now();
        let result = self
            .session
            .write()
            .await
            .unlock_remembered(passphrase)
            .await
            .map(|account| AccountAddress {
                address: account.address_hex(),
            });
        self.finish("unlock", started, result, |v, entry| {
            entry.address(v.address.clone())
        })
        .await
    }

    pub async fn generate_mnemonic(&self) -> Result<GeneratedMnemonic> {
        let started = Instant::now();
        let result = wallet::generate_mnemonic().map(|mnemonic| GeneratedMnemonic { mnemonic });
        self.finish("generate_mnemonic", started, result, |_, entry| entry)
            .await
    }

    pub async fn import_private_key(
        &self,
        private_key_hex: &SecretString,
        passphrase: &SecretString,
    ) -> Result<AccountAddress> {
        let started = Instant::now();
        let result = match decode_key_hex(private_key_hex) {
            Ok(raw) => self
                .session
                .write()
                .await
                .import_private_key(&raw, passphrase)
                .await
                .map(|account| AccountAddress {
                    address: account.address_hex(),
                }),
            Err(e) => Err(e),
        };
        self.finish("import_private_key", started, result, |v, entry| {
            entry.address(v.address.clone())
        })
        .await
    }

    pub async fn import_mnemonic(
        &self,
        mnemonic: &SecretString,
        passphrase: &SecretString,
    ) -> Result<AccountAddress> {
        let started = Instant::now();
        let result = self
            .session
            .write()
            .await
            .import_mnemonic(mnemonic, passphrase)
            .await
            .map(|account| AccountAddress {
                address: account.address_hex(),
            });
        self.finish("import_mnemonic", started, result, |v, entry| {
            entry.address(v.address.clone())
        })
        .await
    }

    /// Raw private key of the unlocked account, hex-encoded without `0x`
    pub async fn export_private_key(&self, passphrase: &SecretString) -> Result<ExportedKey> {
        let started = Instant::now();
        let result = self
            .session
            .read()
            .await
            .export_private_key_hex(passphrase)
            .await
            .map(|private_key| ExportedKey { private_key });
        self.finish("export_private_key", started, result, |_, entry| entry)
            .await
    }

    /// Transfer native currency. The passphrase is accepted for interface
    /// symmetry; this path signs with the key held since unlock.
    pub async fn transfer_native(
        &self,
        _passphrase: &SecretString,
        from: &str,
        to: &str,
        value: &str,
        gas_price: &str,
    ) -> Result<TxReceipt> {
        let started = Instant::now();
        let session = self.session.read().await;
        let result = async {
            let builder = TransactionBuilder::for_session(&session)?;
            let from = parse_address("from", from)?;
            let to = parse_address("to", to)?;
            let value = parse_amount("value", value)?;
            let gas_price = parse_amount("gas_price", gas_price)?;
            builder.transfer_native(from, to, value, gas_price).await
        }
        .await
        .map(|hash| TxReceipt {
            tx_hash: hash.to_string(),
        });
        drop(session);
        self.finish("transfer_native", started, result, |v, entry| {
            entry.address(from.to_string()).tx_hash(v.tx_hash.clone())
        })
        .await
    }

    /// Transfer ERC-20 tokens; the passphrase is re-validated against the
    /// key file before signing
    pub async fn transfer_token(
        &self,
        passphrase: &SecretString,
        from: &str,
        to: &str,
        token_address: &str,
        value: &str,
        gas_price: &str,
    ) -> Result<TxReceipt> {
        let started = Instant::now();
        let session = self.session.read().await;
        let result = async {
            let builder = TransactionBuilder::for_session(&session)?;
            let from = parse_address("from", from)?;
            let to = parse_address("to", to)?;
            let token = parse_address("token_address", token_address)?;
            let value = parse_amount("value", value)?;
            let gas_price = parse_amount("gas_price", gas_price)?;
            builder
                .transfer_token(passphrase, from, to, token, value, gas_price)
                .await
        }
        .await
        .map(|hash| TxReceipt {
            tx_hash: hash.to_string(),
        });
        drop(session);
        self.finish("transfer_token", started, result, |v, entry| {
            entry.address(from.to_string()).tx_hash(v.tx_hash.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_accepts_decimal_and_hex() {
        assert_eq!(parse_amount("value", "1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_amount("value", "0x10").unwrap(), U256::from(16u64));
        assert!(matches!(
            parse_amount("value", "ten"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_address_reports_field() {
        let err = parse_address("to", "0x1234").unwrap_err();
        assert!(err.to_string().contains("to"));
    }

    #[test]
    fn test_decode_key_hex() {
        let key = SecretString::from("0x0102");
        assert_eq!(decode_key_hex(&key).unwrap().as_slice(), &[1u8, 2]);
        assert!(matches!(
            decode_key_hex(&SecretString::from("xyz")),
            Err(Error::InvalidKeyBytes)
        ));
    }

    #[test]
    fn test_service_roots_relative_data_dir() {
        let service = WalletService::new(Config::with_data_dir("relative-wallet")).unwrap();
        assert!(service.config().data_dir.is_absolute());
        assert!(service.config().data_dir.ends_with("relative-wallet"));
    }

    #[test]
    fn test_responses_use_camel_case() {
        let state = serde_json::to_value(UnlockState { is_unlocked: true }).unwrap();
        assert_eq!(state["isUnlocked"], true);

        let receipt = serde_json::to_value(TxReceipt {
            tx_hash: "0xab".to_string(),
        })
        .unwrap();
        assert_eq!(receipt["txHash"], "0xab");
    }
}
