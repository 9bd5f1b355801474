//! Encrypted key material store
//!
//! A `KeyStore` owns one directory of Web3 Secret Storage files and, after an
//! import, the decrypted key of the account it imported. Every method here is
//! blocking (scrypt and filesystem work); async callers go through
//! [`run_blocking`].

pub mod v3;

use crate::wallet::{PendingTransaction, SecureKey, SignedTransaction};
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Scrypt cost parameters for newly written key files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfCost {
    /// CPU/memory cost; must be a power of two greater than one
    pub n: u64,
    /// Parallelisation
    pub p: u32,
}

impl KdfCost {
    pub fn validate(&self) -> Result<()> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(Error::Config(format!(
                "scrypt N must be a power of two > 1, got {}",
                self.n
            )));
        }
        if self.p == 0 {
            return Err(Error::Config("scrypt P must be at least 1".to_string()));
        }
        if !v3::cost_within_limits(self.n, v3::SCRYPT_R, self.p) {
            return Err(Error::Config(format!(
                "scrypt cost n={} p={} exceeds the key file limits",
                self.n, self.p
            )));
        }
        Ok(())
    }

    pub(crate) fn log_n(&self) -> Result<u8> {
        self.validate()?;
        Ok(self.n.trailing_zeros() as u8)
    }
}

impl Default for KdfCost {
    fn default() -> Self {
        Self { n: 1024, p: 1 }
    }
}

/// A chain identity and the file holding its encrypted key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub keystore_path: PathBuf,
}

impl Account {
    /// EIP-55 checksummed address
    pub fn address_hex(&self) -> String {
        self.address.to_checksum(None)
    }
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    cost: KdfCost,
    unlocked: Option<SecureKey>,
}

impl KeyStore {
    /// Open (creating if needed) a key directory
    pub fn open(dir: impl Into<PathBuf>, cost: KdfCost) -> Result<Self> {
        cost.validate()?;
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::PersistenceFailure(format!("create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            cost,
            unlocked: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decrypt `encrypted` with `source_passphrase` and store it re-encrypted
    /// under `dest_passphrase`
    pub fn import_key(
        &mut self,
        encrypted: &[u8],
        source_passphrase: &str,
        dest_passphrase: &str,
    ) -> Result<Account> {
        let file = v3::KeyFile::parse(encrypted)?;
        let secret = v3::decrypt(&file, source_passphrase)?;
        let key = SecureKey::from_bytes(secret.as_slice()).map_err(|_| Error::DecryptionFailed)?;
        self.store(key, dest_passphrase)
    }

    /// Encrypt a raw private key into this store
    pub fn import_raw_key(&mut self, raw: &[u8], passphrase: &str) -> Result<Account> {
        let key = SecureKey::from_bytes(raw)?;
        self.store(key, passphrase)
    }

    /// Encrypt an already-parsed key into this store
    pub fn import_secure_key(&mut self, key: SecureKey, passphrase: &str) -> Result<Account> {
        self.store(key, passphrase)
    }

    fn store(&mut self, key: SecureKey, passphrase: &str) -> Result<Account> {
        let address = key.address();
        let file = v3::encrypt(&key.secret_bytes(), address, passphrase, self.cost)?;
        let path = self.dir.join(key_file_name(address));

        std::fs::write(&path, file.to_bytes()?).map_err(|e| {
            Error::PersistenceFailure(format!("write {}: {}", path.display(), e))
        })?;
        tracing::debug!(address = %address, path = %path.display(), "Stored encrypted key");

        self.unlocked = Some(key);
        Ok(Account {
            address,
            keystore_path: path,
        })
    }

    /// Point this store at `dir`, keeping the unlocked key. Used after the
    /// directory has been moved on disk.
    pub(crate) fn relocated(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }

    fn decrypt_account(&self, account: &Account, passphrase: &str) -> Result<SecureKey> {
        let bytes = std::fs::read(&account.keystore_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoKeyFile,
            _ => Error::PersistenceFailure(format!(
                "read {}: {}",
                account.keystore_path.display(),
                e
            )),
        })?;
        let file = v3::KeyFile::parse(&bytes)?;
        let secret = v3::decrypt(&file, passphrase)?;
        let key = SecureKey::from_bytes(secret.as_slice()).map_err(|_| Error::DecryptionFailed)?;
        if key.address() != account.address {
            return Err(Error::DecryptionFailed);
        }
        Ok(key)
    }

    /// Decrypt the account's key and return it hex-encoded (no `0x` prefix)
    pub fn export_key_hex(&self, account: &Account, passphrase: &str) -> Result<Zeroizing<String>> {
        let key = self.decrypt_account(account, passphrase)?;
        Ok(Zeroizing::new(hex::encode(*key.secret_bytes())))
    }

    /// Sign with the key held since import; no passphrase check
    pub fn sign_transaction(
        &self,
        account: &Account,
        tx: PendingTransaction,
        chain_id: u64,
    ) -> Result<SignedTransaction> {
        let key = self
            .unlocked
            .as_ref()
            .filter(|k| k.address() == account.address)
            .ok_or_else(|| Error::SigningFailed("account is not unlocked".to_string()))?;
        tx.sign(key, chain_id)
    }

    /// Re-decrypt the account's key file with `passphrase` and sign with it
    pub fn sign_transaction_with_passphrase(
        &self,
        account: &Account,
        passphrase: &str,
        tx: PendingTransaction,
        chain_id: u64,
    ) -> Result<SignedTransaction> {
        let key = self
            .decrypt_account(account, passphrase)
            .map_err(|e| match e {
                Error::DecryptionFailed => {
                    Error::SigningFailed("passphrase does not unlock account".to_string())
                }
                Error::NoKeyFile => Error::SigningFailed("keystore file is missing".to_string()),
                other => other,
            })?;
        tx.sign(&key, chain_id)
    }
}

/// geth-style key file name: `UTC--<timestamp>--<address>`
fn key_file_name(address: Address) -> String {
    format!(
        "UTC--{}--{}",
        chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.9fZ"),
        hex::encode(address.as_slice())
    )
}

/// Run blocking keystore work off the async executor
pub(crate) async fn run_blocking<T, F>(work: F, on_abort: fn(String) -> Error) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| on_abort(format!("background task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use tempfile::TempDir;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn raw_key() -> Vec<u8> {
        hex::decode(TEST_KEY).unwrap()
    }

    fn pending(to: Address) -> PendingTransaction {
        PendingTransaction {
            nonce: 0,
            to,
            value: U256::from(1u64),
            gas_limit: 21_000,
            gas_price: U256::from(1_000_000_000u64),
            data: None,
        }
    }

    #[test]
    fn test_open_rejects_bad_cost() {
        let dir = TempDir::new().unwrap();
        let err = KeyStore::open(dir.path(), KdfCost { n: 1000, p: 1 }).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = KeyStore::open(dir.path(), KdfCost { n: 1 << 30, p: 1 }).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_import_raw_then_export() {
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path(), KdfCost::default()).unwrap();

        let account = store.import_raw_key(&raw_key(), "pw").unwrap();
        assert!(account.keystore_path.starts_with(dir.path()));
        assert!(account
            .keystore_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("UTC--"));

        let exported = store.export_key_hex(&account, "pw").unwrap();
        assert_eq!(exported.as_str(), TEST_KEY);
    }

    #[test]
    fn test_export_with_wrong_passphrase() {
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path(), KdfCost::default()).unwrap();
        let account = store.import_raw_key(&raw_key(), "pw").unwrap();

        assert!(matches!(
            store.export_key_hex(&account, "nope"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_import_key_reencrypts_into_second_store() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        let mut first = KeyStore::open(first_dir.path(), KdfCost::default()).unwrap();
        let original = first.import_raw_key(&raw_key(), "pw").unwrap();
        let bytes = std::fs::read(&original.keystore_path).unwrap();

        let mut second = KeyStore::open(second_dir.path(), KdfCost::default()).unwrap();
        let imported = second.import_key(&bytes, "pw", "pw").unwrap();

        assert_eq!(imported.address, original.address);
        assert!(imported.keystore_path.starts_with(second_dir.path()));
        assert!(second.export_key_hex(&imported, "pw").is_ok());
    }

    #[test]
    fn test_import_key_wrong_source_passphrase() {
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path(), KdfCost::default()).unwrap();
        let account = store.import_raw_key(&raw_key(), "pw").unwrap();
        let bytes = std::fs::read(&account.keystore_path).unwrap();

        let other_dir = TempDir::new().unwrap();
        let mut other = KeyStore::open(other_dir.path(), KdfCost::default()).unwrap();
        assert!(matches!(
            other.import_key(&bytes, "wrong", "wrong"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_sign_direct_requires_unlocked_key() {
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path(), KdfCost::default()).unwrap();
        let account = store.import_raw_key(&raw_key(), "pw").unwrap();

        let signed = store.sign_transaction(&account, pending(Address::ZERO), 4);
        assert!(signed.is_ok());

        let fresh = KeyStore::open(dir.path(), KdfCost::default()).unwrap();
        assert!(matches!(
            fresh.sign_transaction(&account, pending(Address::ZERO), 4),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn test_sign_with_passphrase_revalidates() {
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path(), KdfCost::default()).unwrap();
        let account = store.import_raw_key(&raw_key(), "pw").unwrap();

        assert!(store
            .sign_transaction_with_passphrase(&account, "pw", pending(Address::ZERO), 4)
            .is_ok());

        let err = store
            .sign_transaction_with_passphrase(&account, "bad", pending(Address::ZERO), 4)
            .unwrap_err();
        assert!(matches!(err, Error::SigningFailed(_)));
        assert!(!err.to_string().contains(TEST_KEY));
    }
}
