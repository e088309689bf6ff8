//! Storage backend abstraction layer.
//!
//! The `Backend` trait is the boundary between the protocol handlers and
//! object storage. Objects are addressed by name (the 16-digit hex form of
//! the object id) and by the number of replicas the caller wants.
//!
//! Available backends:
//! - **filesystem**: [`sharded::ShardedBackend`], objects replicated over a
//!   set of directories picked by the placement ring.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::StoreResult;

pub mod common;
pub mod sharded;

/// Cache of open object files keyed by full path.
pub type HandleCache = dyn Cache<PathBuf, Arc<File>>;

/// One configured storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub path: PathBuf,
    /// Placement weight; 0 derives it from the filesystem capacity.
    pub weight: u64,
}

/// Trait that all storage backends must implement.
///
/// Methods doing filesystem I/O run it through `tokio::task::spawn_blocking`
/// so disk latency never blocks the runtime.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Return the human-readable name of this backend (e.g. "filesystem").
    fn name(&self) -> &str;

    /// Reserve `size` bytes for `name` on `copies` locations.
    async fn allocate(&self, name: &str, size: u64, copies: usize) -> StoreResult<()>;

    /// Read up to `len` bytes at `offset`. The result is short at end of object.
    async fn read_at(
        &self,
        name: &str,
        offset: u64,
        len: usize,
        copies: usize,
    ) -> StoreResult<Vec<u8>>;

    /// Write `data` at `offset` on `copies` locations; returns bytes written.
    async fn write_at(
        &self,
        name: &str,
        data: &[u8],
        offset: u64,
        copies: usize,
    ) -> StoreResult<usize>;

    /// Whether `name` is present on any of its locations.
    async fn exists(&self, name: &str, copies: usize) -> StoreResult<bool>;

    /// Best-effort removal from every location holding `name`.
    async fn remove(&self, name: &str, copies: usize) -> StoreResult<()>;

    /// Names of all objects on healthy locations, deduplicated.
    async fn list(&self) -> StoreResult<Vec<String>>;
}
