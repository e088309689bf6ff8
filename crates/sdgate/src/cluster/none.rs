//! Driver for gateways running without any cluster coordination.

use async_trait::async_trait;
use sdgate_proto::error::SdResult;
use tracing::debug;

use super::ClusterDriver;

#[derive(Debug, Default)]
pub struct NoneDriver;

#[async_trait]
impl ClusterDriver for NoneDriver {
    fn name(&self) -> &str {
        "none"
    }

    async fn start(&self) -> SdResult<()> {
        debug!("cluster: no driver, nothing to join");
        Ok(())
    }

    async fn stop(&self) -> SdResult<()> {
        Ok(())
    }
}
