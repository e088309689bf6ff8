//! Gateway-wide state and the start/stop facade.
//!
//! `SystemInfo` is shared by every connection task through `SharedSys`.
//! Only the volume bitmap changes after startup; it sits behind its own lock.

use std::net::SocketAddr;
use std::sync::Arc;

use bitvec::prelude::*;
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sdgate_core::store::Backend;
use sdgate_core::StoreError;
use sdgate_proto::constants::SD_NR_VDIS;
use sdgate_proto::error::SdError;
use sdgate_proto::ObjectId;

use crate::cluster::ClusterDriver;
use crate::config::GatewayConfig;
use crate::registry::Registry;
use crate::request;

/// Shared gateway state.
pub type SharedSys = Arc<SystemInfo>;

/// Failures that keep the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("cluster driver {driver}: {err}")]
    Cluster { driver: String, err: SdError },
}

pub struct SystemInfo {
    pub config: GatewayConfig,

    pub backend: Arc<dyn Backend>,

    /// One bit per volume id known to this gateway.
    vdi_inuse: RwLock<BitVec<u8, Lsb0>>,

    /// Wakes the accept loop on shutdown.
    pub shutdown_notify: Arc<Notify>,

    /// Flips to true once the accept loop stopped; idle connections close.
    pub closing: watch::Sender<bool>,
}

impl SystemInfo {
    pub fn new(config: GatewayConfig, backend: Arc<dyn Backend>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            config,
            backend,
            vdi_inuse: RwLock::new(bitvec![u8, Lsb0; 0; SD_NR_VDIS as usize]),
            shutdown_notify: Arc::new(Notify::new()),
            closing,
        }
    }

    pub fn set_vdi_inuse(&self, vid: u32) {
        if vid < SD_NR_VDIS {
            self.vdi_inuse.write().set(vid as usize, true);
        }
    }

    pub fn is_vdi_inuse(&self, vid: u32) -> bool {
        vid < SD_NR_VDIS && self.vdi_inuse.read()[vid as usize]
    }

    /// Leading `len` bytes of the bitmap, bit `vid % 8` of byte `vid / 8`.
    pub fn vdi_bitmap(&self, len: usize) -> Vec<u8> {
        let bitmap = self.vdi_inuse.read();
        let raw = bitmap.as_raw_slice();
        raw[..len.min(raw.len())].to_vec()
    }

    /// Mark every volume whose inode is present on a location.
    ///
    /// Returns the number of volumes found.
    pub async fn load_vdi_bitmap(&self) -> Result<usize, StoreError> {
        let names = self.backend.list().await?;
        let mut bitmap = self.vdi_inuse.write();
        let mut found = 0;
        for oid in names.iter().filter_map(|n| ObjectId::from_file_name(n)) {
            if oid.is_vdi_obj() && !bitmap[oid.to_vid() as usize] {
                bitmap.set(oid.to_vid() as usize, true);
                found += 1;
            }
        }
        Ok(found)
    }
}

/// A running gateway.
pub struct Gateway {
    sys: SharedSys,
    driver: Arc<dyn ClusterDriver>,
    local_addr: SocketAddr,
    accept: JoinHandle<()>,
}

impl Gateway {
    /// Bring the gateway up.
    ///
    /// Builds and configures the backend, rebuilds the volume bitmap, joins
    /// the cluster and starts accepting clients.
    pub async fn start(registry: &Registry) -> Result<Self, GatewayError> {
        let config = registry.config().clone();
        let backend = registry.backend().await?;
        let sys: SharedSys = Arc::new(SystemInfo::new(config, backend));

        let volumes = sys.load_vdi_bitmap().await?;
        info!("found {} volume(s) on disk", volumes);

        let driver = registry.cluster_driver();
        driver.start().await.map_err(|err| GatewayError::Cluster {
            driver: driver.name().to_string(),
            err,
        })?;

        let listener = match sdgate_core::net::create_listen_socket(
            &sys.config.bind_addr,
            sys.config.port,
        )
        .await
        {
            Ok(listener) => listener,
            Err(e) => {
                if let Err(err) = driver.stop().await {
                    warn!("cluster driver {} stop failed: {}", driver.name(), err);
                }
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr().map_err(StoreError::from)?;
        info!(
            "listening on {} (cluster driver {}, epoch {})",
            local_addr,
            driver.name(),
            sys.config.cluster.epoch
        );

        let accept = tokio::spawn(request::accept_loop(sys.clone(), listener));
        Ok(Self {
            sys,
            driver,
            local_addr,
            accept,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sys(&self) -> &SharedSys {
        &self.sys
    }

    /// Stop accepting, drain open connections, then leave the cluster.
    pub async fn stop(self) {
        info!("gateway shutting down");
        self.sys.shutdown_notify.notify_one();
        if let Err(e) = self.accept.await {
            warn!("accept loop ended abnormally: {}", e);
        }
        if let Err(e) = self.driver.stop().await {
            warn!("cluster driver {} stop failed: {}", self.driver.name(), e);
        }
    }
}
