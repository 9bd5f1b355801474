//! Web3 Secret Storage (version 3) codec
//!
//! Files written here are readable by geth and other Ethereum clients:
//! scrypt key derivation, AES-128-CTR encryption, keccak256 MAC over
//! `derived_key[16..32] || ciphertext`.

use super::KdfCost;
use crate::{Error, Result};
use aes::Aes128;
use alloy::hex;
use alloy::primitives::{keccak256, Address};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const CIPHER: &str = "aes-128-ctr";
const KDF: &str = "scrypt";
const DKLEN: usize = 32;
pub(crate) const SCRYPT_R: u32 = 8;

/// Largest scrypt working set (`128 * r * n` bytes) accepted from a key file;
/// geth's standard cost (n = 2^18, r = 8) sits exactly at this ceiling
pub const MAX_SCRYPT_MEMORY: u64 = 256 * 1024 * 1024;
/// Largest scrypt parallelisation accepted from a key file
pub const MAX_SCRYPT_P: u32 = 16;

/// Whether scrypt `n`, `r`, `p` are well-formed and within the work ceiling
pub(crate) fn cost_within_limits(n: u64, r: u32, p: u32) -> bool {
    if n < 2 || !n.is_power_of_two() || r == 0 || p == 0 || p > MAX_SCRYPT_P {
        return false;
    }
    n.checked_mul(128 * u64::from(r))
        .is_some_and(|bytes| bytes <= MAX_SCRYPT_MEMORY)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub address: String,
    pub crypto: CryptoJson,
    pub id: String,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoJson {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: ScryptParams,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScryptParams {
    pub dklen: usize,
    pub n: u64,
    pub p: u32,
    pub r: u32,
    pub salt: String,
}

impl KeyFile {
    /// Parse a key file, mapping malformed input to `DecryptionFailed`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let file: KeyFile = serde_json::from_slice(bytes).map_err(|e| {
            tracing::debug!(error = %e, "Keystore file is not valid JSON");
            Error::DecryptionFailed
        })?;
        if file.version != 3 {
            tracing::debug!(version = file.version, "Unsupported keystore version");
            return Err(Error::DecryptionFailed);
        }
        Ok(file)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::PersistenceFailure(e.to_string()))
    }
}

fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
) -> Result<Zeroizing<[u8; DKLEN]>> {
    let params = scrypt::Params::new(log_n, r, p, DKLEN)
        .map_err(|e| Error::Config(format!("scrypt params: {}", e)))?;
    let mut derived = Zeroizing::new([0u8; DKLEN]);
    scrypt::scrypt(passphrase, salt, &params, &mut derived[..])
        .map_err(|e| Error::Config(format!("scrypt output: {}", e)))?;
    Ok(derived)
}

fn mac(derived: &[u8; DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(16 + ciphertext.len());
    preimage.extend_from_slice(&derived[16..32]);
    preimage.extend_from_slice(ciphertext);
    keccak256(&preimage).0
}

fn apply_ctr(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv).map_err(|_| Error::DecryptionFailed)?;
    cipher.apply_keystream(buf);
    Ok(())
}

/// Encrypt a raw secret key for `address`
pub fn encrypt(
    secret: &[u8; 32],
    address: Address,
    passphrase: &str,
    cost: KdfCost,
) -> Result<KeyFile> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; 32];
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let derived = derive_key(passphrase.as_bytes(), &salt, cost.log_n()?, SCRYPT_R, cost.p)?;

    let mut ciphertext = secret.to_vec();
    apply_ctr(&derived[..16], &iv, &mut ciphertext)?;
    let mac = mac(&derived, &ciphertext);

    Ok(KeyFile {
        address: hex::encode(address.as_slice()),
        crypto: CryptoJson {
            cipher: CIPHER.to_string(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            kdf: KDF.to_string(),
            kdfparams: ScryptParams {
                dklen: DKLEN,
                n: cost.n,
                p: cost.p,
                r: SCRYPT_R,
                salt: hex::encode(salt),
            },
            mac: hex::encode(mac),
        },
        id: uuid::Uuid::new_v4().to_string(),
        version: 3,
    })
}

/// Decrypt a key file, returning the raw 32-byte secret
pub fn decrypt(file: &KeyFile, passphrase: &str) -> Result<Zeroizing<[u8; 32]>> {
    let crypto = &file.crypto;
    if crypto.cipher != CIPHER || crypto.kdf != KDF {
        tracing::debug!(cipher = %crypto.cipher, kdf = %crypto.kdf, "Unsupported keystore scheme");
        return Err(Error::DecryptionFailed);
    }
    let params = &crypto.kdfparams;
    if params.dklen != DKLEN || !cost_within_limits(params.n, params.r, params.p) {
        tracing::debug!(
            n = params.n,
            r = params.r,
            p = params.p,
            "Keystore scrypt cost out of range"
        );
        return Err(Error::DecryptionFailed);
    }
    let log_n = params.n.trailing_zeros() as u8;

    let salt = hex::decode(&params.salt).map_err(|_| Error::DecryptionFailed)?;
    let iv = hex::decode(&crypto.cipherparams.iv).map_err(|_| Error::DecryptionFailed)?;
    let ciphertext = hex::decode(&crypto.ciphertext).map_err(|_| Error::DecryptionFailed)?;
    let expected_mac = hex::decode(&crypto.mac).map_err(|_| Error::DecryptionFailed)?;

    let derived = derive_key(passphrase.as_bytes(), &salt, log_n, params.r, params.p)
        .map_err(|_| Error::DecryptionFailed)?;
    if mac(&derived, &ciphertext).as_slice() != expected_mac.as_slice() {
        return Err(Error::DecryptionFailed);
    }

    if ciphertext.len() != 32 {
        return Err(Error::DecryptionFailed);
    }
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&ciphertext);
    apply_ctr(&derived[..16], &iv, &mut secret[..])?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfCost {
        KdfCost { n: 1024, p: 1 }
    }

    #[test]
    fn test_decrypt_recovers_secret() {
        let secret = [7u8; 32];
        let file = encrypt(&secret, Address::ZERO, "hunter2", cheap()).unwrap();

        let recovered = decrypt(&file, "hunter2").unwrap();
        assert_eq!(*recovered, secret);
    }

    #[test]
    fn test_wrong_passphrase_fails_mac() {
        let file = encrypt(&[7u8; 32], Address::ZERO, "hunter2", cheap()).unwrap();
        assert!(matches!(
            decrypt(&file, "hunter3"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_file_records_geth_fields() {
        let file = encrypt(&[1u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&file.to_bytes().unwrap()).unwrap();

        assert_eq!(json["version"], 3);
        assert_eq!(json["crypto"]["cipher"], "aes-128-ctr");
        assert_eq!(json["crypto"]["kdf"], "scrypt");
        assert_eq!(json["crypto"]["kdfparams"]["n"], 1024);
        assert_eq!(json["crypto"]["kdfparams"]["r"], 8);
        assert_eq!(json["address"], "0000000000000000000000000000000000000000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            KeyFile::parse(b"not a keystore"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_inflated_cost_n_rejected_before_derivation() {
        let file = encrypt(&[3u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        let mut json: serde_json::Value = serde_json::from_slice(&file.to_bytes().unwrap()).unwrap();
        json["crypto"]["kdfparams"]["n"] = serde_json::json!(1u64 << 40);
        let parsed = KeyFile::parse(&serde_json::to_vec(&json).unwrap()).unwrap();

        assert!(matches!(decrypt(&parsed, "pw"), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_inflated_cost_p_and_r_rejected() {
        let mut file = encrypt(&[3u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        file.crypto.kdfparams.p = 1 << 20;
        assert!(matches!(decrypt(&file, "pw"), Err(Error::DecryptionFailed)));

        let mut file = encrypt(&[3u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        file.crypto.kdfparams.r = u32::MAX;
        assert!(matches!(decrypt(&file, "pw"), Err(Error::DecryptionFailed)));

        let mut file = encrypt(&[3u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        file.crypto.kdfparams.p = 0;
        assert!(matches!(decrypt(&file, "pw"), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_cost_limits() {
        assert!(cost_within_limits(1024, 8, 1));
        assert!(cost_within_limits(1 << 18, 8, 1));
        assert!(!cost_within_limits(1 << 19, 8, 1));
        assert!(!cost_within_limits(1000, 8, 1));
        assert!(!cost_within_limits(1 << 40, 8, 1));
        assert!(!cost_within_limits(1024, 8, MAX_SCRYPT_P + 1));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let mut file = encrypt(&[9u8; 32], Address::ZERO, "pw", cheap()).unwrap();
        file.crypto.ciphertext = hex::encode([0u8; 32]);
        assert!(matches!(decrypt(&file, "pw"), Err(Error::DecryptionFailed)));
    }
}
