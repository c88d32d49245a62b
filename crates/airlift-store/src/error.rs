#![forbid(unsafe_code)]

use thiserror::Error;

/// Catalog store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown update: {0}")]
    UnknownUpdate(crate::UpdateId),

    #[error("unknown asset: {0}")]
    UnknownAsset(crate::AssetHash),

    #[error("invalid asset hash: {0}")]
    InvalidHash(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
