//! Keystore Session
//!
//! Single-account Ethereum wallet session manager:
//! - Import a raw private key or a BIP-39 mnemonic into an encrypted keystore
//! - Unlock the remembered keystore with a passphrase
//! - Sign and broadcast native-currency and ERC-20 transfers
//! - Remember the node endpoint across restarts
//!
//! # Security Model
//!
//! - Keys are encrypted at rest in Web3 Secret Storage v3 files
//! - Decrypted keys live only in memory, behind redacted `Debug` impls
//! - Passphrases and keys are never logged or written to the audit trail
//! - Locking drops the in-memory key and removes scratch key directories

pub mod audit;
pub mod config;
pub mod gateway;
pub mod keystore;
pub mod persistence;
pub mod service;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ErrorPayload, Result};
pub use gateway::{ChainGateway, GatewayConnector};
pub use service::{
    AccountAddress, ExportedKey, GeneratedMnemonic, TxReceipt, UnlockState, WalletService,
};
