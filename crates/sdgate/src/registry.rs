//! Construction of the configured capability variants.
//!
//! `main` builds one `Registry` from the validated configuration and hands
//! it to the gateway; every backend, cache and cluster driver the process
//! uses comes from here.

use std::sync::Arc;

use sdgate_core::cache::{LruCache, NoopCache};
use sdgate_core::store::sharded::ShardedBackend;
use sdgate_core::store::{Backend, HandleCache};
use sdgate_core::StoreResult;
use tracing::info;

use crate::cluster::local::LocalDriver;
use crate::cluster::none::NoneDriver;
use crate::cluster::ClusterDriver;
use crate::config::{BackendKind, CacheKind, ClusterKind, GatewayConfig};

pub struct Registry {
    config: GatewayConfig,
}

impl Registry {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn handle_cache(&self) -> Arc<HandleCache> {
        match self.config.cache {
            CacheKind::None => Arc::new(NoopCache),
            CacheKind::Lru => Arc::new(LruCache::new(self.config.cache_size)),
        }
    }

    /// Build and configure the storage backend.
    ///
    /// The topology must hold at least as many locations as the cluster's
    /// default replica count.
    pub async fn backend(&self) -> StoreResult<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self.config.backend {
            BackendKind::Filesystem => {
                let sharded = ShardedBackend::new(
                    self.config.cluster.nr_copies as usize,
                    self.config.allowed_write_failures,
                    self.handle_cache(),
                );
                sharded.configure(self.config.stores.clone()).await?;
                Arc::new(sharded)
            }
        };
        info!(
            "backend {} ready, {} store(s)",
            backend.name(),
            self.config.stores.len()
        );
        Ok(backend)
    }

    pub fn cluster_driver(&self) -> Arc<dyn ClusterDriver> {
        match self.config.cluster_driver {
            ClusterKind::None => Arc::new(NoneDriver),
            ClusterKind::Local => Arc::new(LocalDriver::new(&self.config.work_dir)),
        }
    }
}
