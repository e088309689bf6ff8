//! Cluster lifecycle drivers.
//!
//! The gateway treats cluster coordination as a black box that is started
//! before the listener is bound and stopped after connections drain.
//!
//! Two implementations are provided:
//! - `none`: no coordination at all.
//! - `local`: single-node driver that claims a lock file in the work
//!   directory so two gateways cannot share it.

use async_trait::async_trait;
use sdgate_proto::error::SdResult;

/// Trait that all cluster driver variants implement.
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    /// Human-readable name of this driver (e.g. "none", "local").
    fn name(&self) -> &str;

    /// Join the cluster. Called once before the gateway accepts clients.
    async fn start(&self) -> SdResult<()>;

    /// Leave the cluster. Called once after the gateway stopped serving.
    async fn stop(&self) -> SdResult<()>;
}

pub mod local;
pub mod none;
