//! Error types for the wallet session manager

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wallet session is not unlocked")]
    SessionNotUnlocked,

    #[error("No keystore file found; import a key first")]
    NoKeyFile,

    #[error("Could not decrypt keystore: wrong passphrase or corrupt file")]
    DecryptionFailed,

    #[error("Invalid private key bytes")]
    InvalidKeyBytes,

    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::SessionNotUnlocked => "SESSION_NOT_UNLOCKED",
            Error::NoKeyFile => "NO_KEY_FILE",
            Error::DecryptionFailed => "DECRYPTION_FAILED",
            Error::InvalidKeyBytes => "INVALID_KEY_BYTES",
            Error::InvalidMnemonic => "INVALID_MNEMONIC",
            Error::ChainUnavailable(_) => "CHAIN_UNAVAILABLE",
            Error::EstimationFailed(_) => "ESTIMATION_FAILED",
            Error::SigningFailed(_) => "SIGNING_FAILED",
            Error::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::Config(_) => "CONFIG",
        }
    }

    /// Convert into the tagged payload handed back to callers
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Tagged error returned by the caller-facing surface
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_code_and_message() {
        let payload = Error::ChainUnavailable("connection refused".to_string()).to_payload();
        assert_eq!(payload.code, "CHAIN_UNAVAILABLE");
        assert!(payload.message.contains("connection refused"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::SessionNotUnlocked,
            Error::NoKeyFile,
            Error::DecryptionFailed,
            Error::InvalidKeyBytes,
            Error::InvalidMnemonic,
            Error::ChainUnavailable(String::new()),
            Error::EstimationFailed(String::new()),
            Error::SigningFailed(String::new()),
            Error::PersistenceFailure(String::new()),
            Error::InvalidArgument(String::new()),
            Error::Config(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(Error::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
