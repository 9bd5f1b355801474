//! In-memory signing key
//!
//! SECURITY: this is the only type that holds a decrypted private key.
//! - Keys live in alloy's PrivateKeySigner
//! - Keys are never serialized and never logged
//! - Raw bytes only leave through `secret_bytes`, wrapped in `Zeroizing`

use crate::{Error, Result};
use alloy::consensus::TxLegacy;
use alloy::hex;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Signature};
use alloy::signers::local::coins_bip39::{English, Mnemonic};
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// Number of words in generated mnemonics
pub const MNEMONIC_WORDS: usize = 12;

/// A decrypted secp256k1 key
#[derive(Clone)]
pub struct SecureKey {
    signer: PrivateKeySigner,
}

impl SecureKey {
    /// Create a key from raw 32-byte secret material
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::InvalidKeyBytes);
        }
        let signer = PrivateKeySigner::from_slice(bytes).map_err(|_| Error::InvalidKeyBytes)?;
        Ok(Self { signer })
    }

    /// Create a key from a hex-encoded private key (with or without `0x`)
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let bytes = Zeroizing::new(hex::decode(key_hex).map_err(|_| Error::InvalidKeyBytes)?);
        Self::from_bytes(&bytes)
    }

    /// Derive the first account key (`m/44'/60'/0'/0/0`) from a BIP-39 phrase
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(Error::InvalidMnemonic);
        }
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .build()
            .map_err(|e| {
                tracing::debug!(error = %e, "Mnemonic derivation failed");
                Error::InvalidMnemonic
            })?;
        Ok(Self { signer })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Raw secret bytes; callers must not log or persist them unencrypted
    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signer.to_bytes().0)
    }

    /// Sign a legacy transaction in place, returning the signature
    pub fn sign_transaction(&self, tx: &mut TxLegacy) -> Result<Signature> {
        self.signer
            .sign_transaction_sync(tx)
            .map_err(|e| Error::SigningFailed(e.to_string()))
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("address", &self.address())
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random English mnemonic
pub fn generate_mnemonic() -> Result<SecretString> {
    let mut rng = rand::thread_rng();
    let mnemonic = Mnemonic::<English>::new_with_count(&mut rng, MNEMONIC_WORDS)
        .map_err(|e| Error::InvalidArgument(format!("mnemonic generation: {}", e)))?;
    Ok(SecretString::from(mnemonic.to_phrase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    // Well-known development key (DO NOT use in production!)
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn test_key_from_hex() {
        let key = SecureKey::from_hex(TEST_KEY).unwrap();
        assert_eq!(key.address().to_string().to_lowercase(), TEST_ADDRESS);

        let prefixed = SecureKey::from_hex(&format!("0x{}", TEST_KEY)).unwrap();
        assert_eq!(prefixed.address(), key.address());
    }

    #[test]
    fn test_secret_bytes_match_input() {
        let key = SecureKey::from_hex(TEST_KEY).unwrap();
        assert_eq!(hex::encode(*key.secret_bytes()), TEST_KEY);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(
            SecureKey::from_hex("zz"),
            Err(Error::InvalidKeyBytes)
        ));
        assert!(matches!(
            SecureKey::from_bytes(&[1u8; 16]),
            Err(Error::InvalidKeyBytes)
        ));
        // Zero is not a valid secp256k1 scalar
        assert!(matches!(
            SecureKey::from_bytes(&[0u8; 32]),
            Err(Error::InvalidKeyBytes)
        ));
    }

    #[test]
    fn test_mnemonic_derives_first_account() {
        let key = SecureKey::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(key.address().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_empty_mnemonic_rejected() {
        assert!(matches!(
            SecureKey::from_mnemonic("   "),
            Err(Error::InvalidMnemonic)
        ));
        assert!(matches!(
            SecureKey::from_mnemonic("not a real phrase"),
            Err(Error::InvalidMnemonic)
        ));
    }

    #[test]
    fn test_generated_mnemonic_is_importable() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.expose_secret().split_whitespace().count(), 12);
        assert!(SecureKey::from_mnemonic(phrase.expose_secret()).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SecureKey::from_hex(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", key);

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
