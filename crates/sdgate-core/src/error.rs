//! Errors raised by the placement ring and storage backends.

use sdgate_proto::SdError;

/// Failure of a ring or backend operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Every candidate location failed, or a location could not be accessed.
    #[error("I/O error: {0}")]
    Io(String),
    /// Every candidate location reported the object as absent.
    #[error("object not found")]
    NotFound,
    /// Fewer healthy locations than requested replicas.
    #[error("placement exhausted: {wanted} locations wanted, {healthy} healthy")]
    PlacementExhausted { wanted: usize, healthy: usize },
    /// Invalid topology or backend configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Io(format!("blocking task failed: {}", e))
    }
}

impl From<StoreError> for SdError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(_) | StoreError::PlacementExhausted { .. } => SdError::Eio,
            StoreError::NotFound => SdError::NoObj,
            StoreError::Config(_) => SdError::InvalidParms,
        }
    }
}
