//! Domain errors surfaced by the key, relay, article and publish flows.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid nsec or private key format")]
    InvalidKeyFormat,

    #[error("not logged in: a signing key is required")]
    MissingIdentity,

    #[error("no article to post")]
    NoArticle,

    #[error("article data has expired, extract it again")]
    StaleArticle,

    #[error("{0}")]
    ExtractionFailed(String),

    #[error("no relays configured")]
    NoRelays,

    #[error("relay URL must start with wss:// or ws://")]
    InvalidScheme,

    #[error("relay already added: {0}")]
    Duplicate(String),

    #[error("no relay at index {0}")]
    NoSuchRelay(usize),

    #[error("event id does not match its content")]
    IdMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hex::FromHexError> for Error {
    fn from(_e: hex::FromHexError) -> Self {
        Error::InvalidKeyFormat
    }
}

impl From<bech32::DecodeError> for Error {
    fn from(_e: bech32::DecodeError) -> Self {
        Error::InvalidKeyFormat
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
