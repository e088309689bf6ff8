//! Local (single-node) cluster driver.
//!
//! Joining the "cluster" means creating a lock file in the work directory;
//! a second gateway pointed at the same directory fails to start. Leaving
//! removes the file again.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sdgate_proto::defaults::DEFAULT_LOCK_FILE;
use sdgate_proto::error::{SdError, SdResult};

use super::ClusterDriver;

pub struct LocalDriver {
    lock_path: PathBuf,
    /// Whether this driver currently holds the lock file.
    joined: Mutex<bool>,
}

impl LocalDriver {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            lock_path: work_dir.join(DEFAULT_LOCK_FILE),
            joined: Mutex::new(false),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

#[async_trait]
impl ClusterDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(&self) -> SdResult<()> {
        let mut joined = self.joined.lock().await;
        if *joined {
            return Ok(());
        }

        if let Some(dir) = self.lock_path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                warn!("cluster: cannot create {}: {}", dir.display(), e);
                SdError::SystemError
            })?;
        }

        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await;
        match created {
            Ok(_) => {
                *joined = true;
                info!("cluster: joined as single node ({})", self.lock_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(
                    "cluster: {} exists, another gateway owns this work directory",
                    self.lock_path.display()
                );
                Err(SdError::JoinFailed)
            }
            Err(e) => {
                warn!("cluster: cannot create {}: {}", self.lock_path.display(), e);
                Err(SdError::SystemError)
            }
        }
    }

    async fn stop(&self) -> SdResult<()> {
        let mut joined = self.joined.lock().await;
        if !*joined {
            return Err(SdError::InvalidParms);
        }
        *joined = false;
        match tokio::fs::remove_file(&self.lock_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cluster: lock file already gone");
            }
            Err(e) => {
                warn!("cluster: cannot remove {}: {}", self.lock_path.display(), e);
                return Err(SdError::SystemError);
            }
        }
        info!("cluster: left");
        Ok(())
    }
}
