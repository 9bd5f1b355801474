//! Wallet session and transaction pipeline
//!
//! Private keys stay inside this module and the key store; nothing here
//! serializes or logs them.

mod builder;
mod erc20;
mod session;
mod signer;
mod transaction;

pub use builder::TransactionBuilder;
pub use erc20::transfer_payload;
pub use session::{ActiveIdentity, WalletSession, KEYSTORE_DIR, SCRATCH_PREFIX};
pub use signer::{generate_mnemonic, SecureKey, MNEMONIC_WORDS};
pub use transaction::{PendingTransaction, SignedTransaction, NATIVE_TRANSFER_GAS};
