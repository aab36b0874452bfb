use thiserror::Error;

use crate::types::CityId;

/// Failures of the document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt document {collection}/{key}: {reason}")]
    Corrupt {
        collection: String,
        key: String,
        reason: String,
    },
}

/// Errors surfaced to direct callers of the journey engine.
#[derive(Error, Debug)]
pub enum JourneyError {
    #[error("City not found: {id}")]
    NotFound { id: CityId },

    #[error("Sequence order {order} already taken by city {existing}")]
    SequenceConflict { order: u32, existing: CityId },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type JourneyResult<T> = std::result::Result<T, JourneyError>;
