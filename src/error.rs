//! Errors surfaced by the catalog repository.

use crate::browse_id::DecodeError;
use crate::store::StoreError;
use thiserror::Error;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Error taxonomy of the catalog.
///
/// `Clone` so that one refresh outcome can be handed to every caller waiting
/// on it; I/O causes are therefore flattened to their message chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("malformed browse identifier: {0}")]
    Decode(#[from] DecodeError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("catalog source unavailable: {0}")]
    Io(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

impl CatalogError {
    /// Wraps an adapter error, keeping its whole context chain.
    pub fn io(err: &anyhow::Error) -> Self {
        CatalogError::Io(format!("{err:#}"))
    }

    /// Short machine readable kind, used by the browse protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Decode(_) => "decode",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::Io(_) => "io",
            CatalogError::Validation(_) => "validation",
            CatalogError::UnsupportedOperation(_) => "unsupported",
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName(name) => {
                CatalogError::Validation(format!("a playlist named `{name}` already exists"))
            }
            StoreError::UnknownPlaylist(id) => CatalogError::NotFound(format!("playlist {id}")),
            StoreError::Backend(err) => CatalogError::io(&err),
        }
    }
}
