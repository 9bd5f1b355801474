//! Wallet session state machine
//!
//! A session is either locked or holds exactly one active identity: the
//! account, the key store it was unlocked into, and a gateway to the node.
//! `ActiveIdentity` bundles all three, so a partially unlocked session cannot
//! be represented.
//!
//! Every transition builds the new identity completely before swapping it in;
//! a failed unlock or import leaves the previous session as it was.

use crate::config::Config;
use crate::gateway::{ChainGateway, GatewayConnector};
use crate::keystore::{run_blocking, Account, KeyStore};
use crate::persistence::{SessionSettings, SessionStore};
use crate::wallet::SecureKey;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zeroize::Zeroizing;

/// Directory holding the imported account's key file
pub const KEYSTORE_DIR: &str = "keystore";
/// Prefix of the scratch directories an unlock decrypts into
pub const SCRATCH_PREFIX: &str = "keystore-temp";
/// Directory a new import is written to before it replaces `KEYSTORE_DIR`
const STAGING_DIR: &str = "keystore.staging";
/// Where the live keystore is parked while a new one is moved into place
const BACKUP_DIR: &str = "keystore.old";

/// The unlocked account with everything needed to sign and submit for it
pub struct ActiveIdentity {
    account: Account,
    store: KeyStore,
    gateway: Arc<dyn ChainGateway>,
    // Removed from disk when the identity is dropped
    _scratch: Option<TempDir>,
}

impl ActiveIdentity {
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn ChainGateway> {
        &self.gateway
    }
}

impl std::fmt::Debug for ActiveIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveIdentity")
            .field("account", &self.account)
            .field("endpoint", &self.gateway.endpoint())
            .finish()
    }
}

pub struct WalletSession {
    config: Arc<Config>,
    settings: SessionStore,
    connector: Arc<dyn GatewayConnector>,
    active: Option<ActiveIdentity>,
}

impl WalletSession {
    /// A locked session rooted at `config.data_dir`
    pub fn new(config: Arc<Config>, connector: Arc<dyn GatewayConnector>) -> Self {
        let settings = SessionStore::new(&config.data_dir);
        Self {
            config,
            settings,
            connector,
            active: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &SessionStore {
        &self.settings
    }

    pub fn is_unlocked(&self) -> bool {
        self.active.is_some()
    }

    /// The active identity, or `SessionNotUnlocked`
    pub fn active(&self) -> Result<&ActiveIdentity> {
        self.active.as_ref().ok_or(Error::SessionNotUnlocked)
    }

    fn keystore_dir(&self) -> PathBuf {
        self.config.data_dir.join(KEYSTORE_DIR)
    }

    fn connect_gateway(&self, settings: &SessionSettings) -> Result<Arc<dyn ChainGateway>> {
        let endpoint = if settings.node_endpoint.is_empty() {
            self.config.fallback_endpoint()
        } else {
            settings.node_endpoint.clone()
        };
        self.connector.connect(&endpoint)
    }

    /// Remember `url`; when a returning user is unlocked, switch the session's
    /// gateway to it as well
    pub fn set_endpoint(&mut self, is_returning_user: bool, url: &str) -> Result<()> {
        let replacement = match (&self.active, is_returning_user && !url.is_empty()) {
            (Some(_), true) => Some(self.connector.connect(url)?),
            _ => None,
        };

        self.settings.set_endpoint(url)?;

        if let (Some(active), Some(gateway)) = (self.active.as_mut(), replacement) {
            tracing::info!(endpoint = %url, "Switched node endpoint for unlocked session");
            active.gateway = gateway;
        }
        Ok(())
    }

    /// Unlock the account remembered by the last import
    pub async fn unlock_remembered(&mut self, passphrase: &SecretString) -> Result<Account> {
        let key_file = self.settings.load()?.keystore_path.ok_or(Error::NoKeyFile)?;
        self.unlock(&key_file, passphrase).await
    }

    /// Decrypt `key_file` into a fresh scratch store and make it the active
    /// identity
    pub async fn unlock(&mut self, key_file: &Path, passphrase: &SecretString) -> Result<Account> {
        if !key_file.is_file() {
            return Err(Error::NoKeyFile);
        }
        let settings = self.settings.load()?;
        let gateway = self.connect_gateway(&settings)?;

        let key_file = key_file.to_path_buf();
        let data_dir = self.config.data_dir.clone();
        let cost = self.config.kdf;
        let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());

        let (store, account, scratch) = run_blocking(
            move || {
                let bytes = std::fs::read(&key_file).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => Error::NoKeyFile,
                    _ => Error::PersistenceFailure(format!("read {}: {}", key_file.display(), e)),
                })?;

                std::fs::create_dir_all(&data_dir)
                    .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
                let scratch = tempfile::Builder::new()
                    .prefix(SCRATCH_PREFIX)
                    .tempdir_in(&data_dir)
                    .map_err(|e| Error::PersistenceFailure(format!("scratch dir: {}", e)))?;

                let mut store = KeyStore::open(scratch.path(), cost)?;
                let account = store.import_key(&bytes, &passphrase, &passphrase)?;
                Ok((store, account, scratch))
            },
            Error::PersistenceFailure,
        )
        .await?;

        tracing::info!(address = %account.address, "Wallet unlocked");
        self.active = Some(ActiveIdentity {
            account: account.clone(),
            store,
            gateway,
            _scratch: Some(scratch),
        });
        Ok(account)
    }

    /// Replace any existing key material with a raw private key
    pub async fn import_private_key(
        &mut self,
        raw_key: &[u8],
        passphrase: &SecretString,
    ) -> Result<Account> {
        let key = SecureKey::from_bytes(raw_key)?;
        self.import_key(key, passphrase).await
    }

    /// Replace any existing key material with the first key of a mnemonic
    pub async fn import_mnemonic(
        &mut self,
        mnemonic: &SecretString,
        passphrase: &SecretString,
    ) -> Result<Account> {
        let key = SecureKey::from_mnemonic(mnemonic.expose_secret())?;
        self.import_key(key, passphrase).await
    }

    async fn import_key(&mut self, key: SecureKey, passphrase: &SecretString) -> Result<Account> {
        let previous = self.settings.load()?;
        let gateway = self.connect_gateway(&previous)?;

        let keystore_dir = self.keystore_dir();
        let staging_dir = self.config.data_dir.join(STAGING_DIR);
        let cost = self.config.kdf;
        let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());

        let staged = staging_dir.clone();
        let (store, staged_account) = run_blocking(
            move || {
                remove_dir_if_present(&staged)?;
                let mut store = KeyStore::open(&staged, cost)?;
                let account = store.import_secure_key(key, &passphrase)?;
                Ok((store, account))
            },
            Error::PersistenceFailure,
        )
        .await
        .inspect_err(|_| discard_dir(&staging_dir))?;

        let file_name = staged_account
            .keystore_path
            .file_name()
            .ok_or_else(|| Error::PersistenceFailure("key file has no name".to_string()))?;
        let account = Account {
            address: staged_account.address,
            keystore_path: keystore_dir.join(file_name),
        };

        let updated = SessionSettings {
            keystore_path: Some(account.keystore_path.clone()),
            ..previous.clone()
        };
        if let Err(e) = self.settings.save(&updated) {
            discard_dir(&staging_dir);
            return Err(e);
        }

        let backup_dir = self.config.data_dir.join(BACKUP_DIR);
        if let Err(e) = swap_dirs(&staging_dir, &keystore_dir, &backup_dir) {
            tracing::warn!(error = %e, "Keystore swap failed, restoring previous settings");
            if let Err(restore) = self.settings.save(&previous) {
                tracing::warn!(error = %restore, "Could not restore previous settings");
            }
            discard_dir(&staging_dir);
            return Err(e);
        }

        tracing::info!(address = %account.address, "Imported key into keystore");
        self.active = Some(ActiveIdentity {
            account: account.clone(),
            store: store.relocated(keystore_dir),
            gateway,
            _scratch: None,
        });
        Ok(account)
    }

    /// Hex-encoded private key of the active account, if `passphrase`
    /// decrypts its key file
    pub async fn export_private_key_hex(&self, passphrase: &SecretString) -> Result<SecretString> {
        let active = self.active()?;
        let store = active.store.clone();
        let account = active.account.clone();
        let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());

        let key_hex = run_blocking(
            move || store.export_key_hex(&account, &passphrase),
            Error::PersistenceFailure,
        )
        .await?;
        Ok(SecretString::from(key_hex.as_str()))
    }

    /// Drop the active identity, remove scratch key directories, and forget
    /// the node endpoint. Never fails; cleanup problems are logged.
    pub fn lock(&mut self) {
        self.active = None;

        if let Ok(entries) = std::fs::read_dir(&self.config.data_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(SCRATCH_PREFIX) || name == STAGING_DIR {
                    discard_dir(&entry.path());
                }
            }
        }

        if let Err(e) = self.settings.clear_endpoint() {
            tracing::warn!(error = %e, "Could not clear remembered endpoint");
        }
        tracing::info!("Wallet session locked");
    }

    /// Lock, then erase the keystore and every remembered setting
    pub fn reset(&mut self) {
        self.lock();
        discard_dir(&self.keystore_dir());
        discard_dir(&self.config.data_dir.join(BACKUP_DIR));
        if let Err(e) = self.settings.clear() {
            tracing::warn!(error = %e, "Could not clear session settings");
        }
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::PersistenceFailure(format!(
            "remove {}: {}",
            dir.display(),
            e
        ))),
    }
}

/// Best-effort removal
fn discard_dir(dir: &Path) {
    if let Err(e) = remove_dir_if_present(dir) {
        tracing::warn!(error = %e, "Could not remove directory");
    }
}

fn rename_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| {
        Error::PersistenceFailure(format!("move {} to {}: {}", from.display(), to.display(), e))
    })
}

/// Move `staging` into `target`. An existing `target` is parked at `backup`
/// until the move succeeds and put back if it fails.
fn swap_dirs(staging: &Path, target: &Path, backup: &Path) -> Result<()> {
    remove_dir_if_present(backup)?;
    let parked = target.exists();
    if parked {
        rename_dir(target, backup)?;
    }

    if let Err(e) = rename_dir(staging, target) {
        if parked {
            if let Err(restore) = rename_dir(backup, target) {
                tracing::warn!(error = %restore, "Could not restore previous keystore");
            }
        }
        return Err(e);
    }

    if parked {
        discard_dir(backup);
    }
    Ok(())
}
