//! Sharded filesystem backend.
//!
//! Each location is a directory; object files live directly inside it under
//! their 16-digit hex name. The placement ring picks the locations for every
//! object. Writes and allocations fan out to all picked locations and must
//! reach a quorum; reads and existence probes try the locations one at a
//! time in random order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::common;
use super::{Backend, HandleCache, StoreSpec};
use crate::error::{StoreError, StoreResult};
use crate::ring::PlacementRing;

/// Backend replicating objects over ring-selected directories.
pub struct ShardedBackend {
    ring: PlacementRing,
    handles: Arc<HandleCache>,
    allowed_failures: usize,
}

fn join_error(e: tokio::task::JoinError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Placement failures reach callers as plain I/O errors.
fn exhausted_as_io(e: StoreError) -> StoreError {
    match e {
        StoreError::PlacementExhausted { wanted, healthy } => StoreError::Io(format!(
            "no placement: {} locations wanted, {} healthy",
            wanted, healthy
        )),
        other => other,
    }
}

fn object_path(location: &str, name: &str) -> StoreResult<PathBuf> {
    if name.is_empty() || name.starts_with('.') || name.contains('/') {
        return Err(StoreError::Config(format!("invalid object name {:?}", name)));
    }
    Ok(Path::new(location).join(name))
}

impl ShardedBackend {
    /// Create an unconfigured backend.
    ///
    /// `min_replicas` is the smallest topology `configure` accepts and
    /// `allowed_failures` the number of replicas a write may lose.
    pub fn new(min_replicas: usize, allowed_failures: usize, handles: Arc<HandleCache>) -> Self {
        handles.on_evict(Box::new(|path, _| {
            debug!("closing cached handle {}", path.display());
        }));
        Self {
            ring: PlacementRing::new(min_replicas),
            handles,
            allowed_failures,
        }
    }

    /// Load the location set.
    ///
    /// Missing directories are created and zero weights are derived from
    /// the filesystem capacity. Cached handles are dropped.
    pub async fn configure(&self, stores: Vec<StoreSpec>) -> StoreResult<()> {
        let mut weights = BTreeMap::new();
        for spec in stores {
            let path = spec.path.clone();
            let weight = tokio::task::spawn_blocking(move || -> io::Result<u64> {
                std::fs::create_dir_all(&path)?;
                if spec.weight > 0 {
                    Ok(spec.weight)
                } else {
                    common::capacity_weight(&path)
                }
            })
            .await?
            .map_err(|e| {
                StoreError::Config(format!("store {}: {}", spec.path.display(), e))
            })?;

            info!("store {} weight {}", spec.path.display(), weight);
            weights.insert(spec.path.to_string_lossy().into_owned(), weight);
        }

        self.ring.configure(weights)?;
        self.handles.purge();
        Ok(())
    }

    pub fn ring(&self) -> &PlacementRing {
        &self.ring
    }

    /// Successful replicas needed before a write is acknowledged.
    pub fn quorum(&self, copies: usize) -> usize {
        copies.saturating_sub(self.allowed_failures).max(1)
    }

    fn candidates(&self, name: &str, copies: usize) -> StoreResult<Vec<String>> {
        self.ring.select(name, copies.max(1)).map_err(exhausted_as_io)
    }

    async fn open_handle(&self, path: &Path, create: bool) -> io::Result<Arc<File>> {
        let key = path.to_path_buf();
        if let Some(file) = self.handles.get(&key) {
            return Ok(file);
        }
        let p = key.clone();
        let file = tokio::task::spawn_blocking(move || common::open_object(&p, create))
            .await
            .map_err(join_error)??;
        let file = Arc::new(file);
        self.handles.set(key, file.clone());
        Ok(file)
    }

    async fn allocate_one(&self, path: &Path, size: u64) -> io::Result<()> {
        let file = self.open_handle(path, true).await?;
        tokio::task::spawn_blocking(move || common::reserve(&file, size))
            .await
            .map_err(join_error)?
    }

    async fn write_one(&self, path: &Path, data: Arc<[u8]>, offset: u64) -> io::Result<usize> {
        let file = self.open_handle(path, true).await?;
        tokio::task::spawn_blocking(move || common::write_full_at(&file, &data, offset))
            .await
            .map_err(join_error)?
    }

    async fn read_one(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let file = self.open_handle(path, false).await?;
        tokio::task::spawn_blocking(move || common::read_full_at(&file, offset, len))
            .await
            .map_err(join_error)?
    }

    /// Forget the handle of a failed replica and drop its location from
    /// placement when the error lies with the location.
    fn replica_failed(&self, location: &str, path: &Path, err: &io::Error) {
        self.handles.delete(&path.to_path_buf());
        if common::is_location_fault(err) {
            self.ring.mark_unhealthy(location);
        }
    }

    fn check_quorum(&self, op: &str, name: &str, ok: usize, copies: usize) -> StoreResult<()> {
        let quorum = self.quorum(copies);
        if ok >= quorum {
            if ok < copies {
                warn!(
                    "{} {}: only {}/{} replicas succeeded",
                    op, name, ok, copies
                );
            }
            Ok(())
        } else {
            Err(StoreError::Io(format!(
                "{} {}: {}/{} replicas succeeded, {} required",
                op, name, ok, copies, quorum
            )))
        }
    }
}

#[async_trait]
impl Backend for ShardedBackend {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn allocate(&self, name: &str, size: u64, copies: usize) -> StoreResult<()> {
        let locations = self.candidates(name, copies)?;
        let mut ok = 0usize;
        for location in &locations {
            let path = object_path(location, name)?;
            match self.allocate_one(&path, size).await {
                Ok(()) => ok += 1,
                Err(e) => {
                    warn!("replica allocate on {} failed: {}", location, e);
                    self.replica_failed(location, &path, &e);
                }
            }
        }
        debug!("allocated {} ({} bytes) on {}/{} locations", name, size, ok, locations.len());
        self.check_quorum("allocate", name, ok, locations.len())
    }

    async fn read_at(
        &self,
        name: &str,
        offset: u64,
        len: usize,
        copies: usize,
    ) -> StoreResult<Vec<u8>> {
        let mut locations = self.candidates(name, copies)?;
        locations.shuffle(&mut rand::thread_rng());

        let mut missing = 0usize;
        for location in &locations {
            let path = object_path(location, name)?;
            match self.read_one(&path, offset, len).await {
                Ok(buf) => return Ok(buf),
                Err(e) if e.kind() == io::ErrorKind::NotFound => missing += 1,
                Err(e) => {
                    warn!("replica read from {} failed: {}", location, e);
                    self.handles.delete(&path);
                }
            }
        }

        if missing == locations.len() {
            Err(StoreError::NotFound)
        } else {
            Err(StoreError::Io(format!(
                "read {}: all {} replicas failed",
                name,
                locations.len()
            )))
        }
    }

    async fn write_at(
        &self,
        name: &str,
        data: &[u8],
        offset: u64,
        copies: usize,
    ) -> StoreResult<usize> {
        let locations = self.candidates(name, copies)?;
        let data: Arc<[u8]> = Arc::from(data);

        let mut ok = 0usize;
        let mut written = 0usize;
        for location in &locations {
            let path = object_path(location, name)?;
            match self.write_one(&path, data.clone(), offset).await {
                Ok(n) => {
                    ok += 1;
                    written = n;
                }
                Err(e) => {
                    warn!("replica write to {} failed: {}", location, e);
                    self.replica_failed(location, &path, &e);
                }
            }
        }

        self.check_quorum("write", name, ok, locations.len())?;
        Ok(written)
    }

    async fn exists(&self, name: &str, copies: usize) -> StoreResult<bool> {
        let mut locations = self.candidates(name, copies)?;
        locations.shuffle(&mut rand::thread_rng());

        let mut last_error = None;
        for location in &locations {
            let path = object_path(location, name)?;
            let found = tokio::task::spawn_blocking(move || common::probe(&path))
                .await
                .map_err(join_error)
                .and_then(|r| r);
            match found {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    warn!("probe of {} on {} failed: {}", name, location, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => Ok(false),
            Some(e) => Err(StoreError::Io(format!("exists {}: {}", name, e))),
        }
    }

    async fn remove(&self, name: &str, copies: usize) -> StoreResult<()> {
        let locations = self.candidates(name, copies)?;

        let mut failed = 0usize;
        for location in &locations {
            let path = object_path(location, name)?;
            self.handles.delete(&path);
            let removed = tokio::task::spawn_blocking(move || common::remove_object(&path))
                .await
                .map_err(join_error)
                .and_then(|r| r);
            match removed {
                Ok(true) => debug!("removed {} from {}", name, location),
                Ok(false) => {}
                Err(e) => {
                    warn!("replica remove on {} failed: {}", location, e);
                    failed += 1;
                }
            }
        }

        if failed == locations.len() {
            return Err(StoreError::Io(format!("remove {}: every replica failed", name)));
        }
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut names = BTreeSet::new();
        for location in self.ring.healthy_locations() {
            let dir = PathBuf::from(&location);
            let found = tokio::task::spawn_blocking(move || common::scan_dir(&dir)).await?;
            match found {
                Ok(found) => names.extend(found),
                Err(e) => warn!("failed to list {}: {}", location, e),
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, LruCache, NoopCache};
    use crate::ring::RingState;
    use tempfile::TempDir;

    const NAME: &str = "0000002a00000001";

    fn stores(dirs: &[&TempDir]) -> Vec<StoreSpec> {
        dirs.iter()
            .map(|d| StoreSpec {
                path: d.path().to_path_buf(),
                weight: 10,
            })
            .collect()
    }

    async fn backend(dirs: &[&TempDir], allowed_failures: usize) -> ShardedBackend {
        let backend = ShardedBackend::new(1, allowed_failures, Arc::new(NoopCache));
        backend.configure(stores(dirs)).await.unwrap();
        backend
    }

    /// Replace a location directory with a plain file so every access fails.
    fn break_location(dir: &TempDir) {
        std::fs::remove_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path(), b"").unwrap();
    }

    fn holders(dirs: &[&TempDir], name: &str) -> usize {
        dirs.iter().filter(|d| d.path().join(name).is_file()).count()
    }

    #[tokio::test]
    async fn test_write_replicates_and_reads_back() {
        let (a, b, c) = (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b, &c], 0).await;

        assert_eq!(be.write_at(NAME, b"payload", 0, 2).await.unwrap(), 7);
        assert_eq!(holders(&[&a, &b, &c], NAME), 2);

        assert_eq!(be.read_at(NAME, 0, 7, 2).await.unwrap(), b"payload");
        assert_eq!(be.read_at(NAME, 3, 100, 2).await.unwrap(), b"load");
        assert!(be.exists(NAME, 2).await.unwrap());
        assert_eq!(be.list().await.unwrap(), vec![NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_read_fails_over_missing_replica() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;
        be.write_at(NAME, b"abc", 0, 2).await.unwrap();

        std::fs::remove_file(a.path().join(NAME)).unwrap();
        for _ in 0..10 {
            assert_eq!(be.read_at(NAME, 0, 3, 2).await.unwrap(), b"abc");
            assert!(be.exists(NAME, 2).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_absent_object() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;

        assert_eq!(be.read_at(NAME, 0, 16, 2).await, Err(StoreError::NotFound));
        assert!(!be.exists(NAME, 2).await.unwrap());
        be.remove(NAME, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_allocate_reserves_zeroed_space() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;

        be.allocate(NAME, 4096, 2).await.unwrap();
        for dir in [&a, &b] {
            let meta = std::fs::metadata(dir.path().join(NAME)).unwrap();
            assert_eq!(meta.len(), 4096);
        }
        assert_eq!(be.read_at(NAME, 4000, 200, 2).await.unwrap(), vec![0u8; 96]);
    }

    #[tokio::test]
    async fn test_remove_all_replicas() {
        let (a, b, c) = (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b, &c], 0).await;
        be.write_at(NAME, b"x", 0, 3).await.unwrap();
        assert_eq!(holders(&[&a, &b, &c], NAME), 3);

        be.remove(NAME, 3).await.unwrap();
        assert_eq!(holders(&[&a, &b, &c], NAME), 0);
        assert!(!be.exists(NAME, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_quorum_enforced() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;
        break_location(&a);

        let err = be.write_at(NAME, b"data", 0, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(be.ring().state(), RingState::Degraded);
        assert_eq!(be.ring().healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_allowed_failures_relax_quorum() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 1).await;
        assert_eq!(be.quorum(2), 1);
        break_location(&a);

        assert_eq!(be.write_at(NAME, b"data", 0, 2).await.unwrap(), 4);
        assert!(b.path().join(NAME).is_file());
    }

    #[tokio::test]
    async fn test_all_locations_failed() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 1).await;
        break_location(&a);
        break_location(&b);

        assert!(matches!(
            be.write_at(NAME, b"data", 0, 2).await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(be.ring().state(), RingState::Failed);
        // a failed ring answers every request with an I/O error
        assert!(matches!(
            be.read_at(NAME, 0, 4, 1).await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_offset_keeps_locations_healthy() {
        let (a, b, c) = (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = ShardedBackend::new(2, 0, Arc::new(NoopCache));
        be.configure(stores(&[&a, &b, &c])).await.unwrap();

        let err = be.write_at(NAME, b"x", 1 << 63, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(be.ring().state(), RingState::Normal);
        assert_eq!(be.ring().healthy_count(), 3);

        assert_eq!(be.write_at("0000002a00000003", b"good", 0, 2).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unhealthy_ring_refuses_writes() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;
        for location in be.ring().locations() {
            assert!(be.ring().mark_unhealthy(&location));
        }

        assert!(matches!(
            be.write_at(NAME, b"data", 0, 1).await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(be.ring().state(), RingState::Failed);
        assert_eq!(holders(&[&a, &b], NAME), 0);
    }

    #[tokio::test]
    async fn test_replicas_hold_identical_bytes() {
        let (a, b, c) = (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap());
        let dirs = [&a, &b, &c];
        let be = backend(&dirs, 0).await;
        be.write_at(NAME, &[0xAA; 4096], 0, 2).await.unwrap();

        let holding: Vec<_> = dirs
            .iter()
            .filter(|d| d.path().join(NAME).is_file())
            .collect();
        assert_eq!(holding.len(), 2);
        for dir in &holding {
            assert_eq!(std::fs::read(dir.path().join(NAME)).unwrap(), vec![0xAA; 4096]);
        }
        for _ in 0..10 {
            assert_eq!(be.read_at(NAME, 0, 4096, 2).await.unwrap(), vec![0xAA; 4096]);
        }
    }

    #[tokio::test]
    async fn test_probe_error_is_not_absence() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let be = backend(&[&a, &b], 0).await;
        break_location(&a);

        assert!(matches!(be.exists(NAME, 2).await, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_configure_derives_weights_and_creates_dirs() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("new-store");
        let be = ShardedBackend::new(1, 0, Arc::new(NoopCache));
        be.configure(vec![StoreSpec {
            path: missing.clone(),
            weight: 0,
        }])
        .await
        .unwrap();

        assert!(missing.is_dir());
        assert_eq!(be.ring().locations().len(), 1);
    }

    #[tokio::test]
    async fn test_configure_rejects_small_topology() {
        let a = TempDir::new().unwrap();
        let be = ShardedBackend::new(2, 0, Arc::new(NoopCache));
        let err = be.configure(stores(&[&a])).await.unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_handle_cache_is_optional() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let cache: Arc<LruCache<PathBuf, Arc<File>>> = Arc::new(LruCache::new(16));
        let be = ShardedBackend::new(1, 0, cache.clone());
        be.configure(stores(&[&a, &b])).await.unwrap();

        be.write_at(NAME, b"cached", 0, 2).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(be.read_at(NAME, 0, 6, 2).await.unwrap(), b"cached");

        be.remove(NAME, 2).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(be.read_at(NAME, 0, 6, 2).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_rejects_path_names() {
        let a = TempDir::new().unwrap();
        let be = backend(&[&a], 0).await;
        assert!(matches!(
            be.write_at("../escape", b"x", 0, 1).await,
            Err(StoreError::Config(_))
        ));
    }
}
