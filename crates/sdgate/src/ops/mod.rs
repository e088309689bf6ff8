//! Opcode dispatch.
//!
//! Every decoded request ends up here and always produces a response;
//! only framing failures close a connection. Handlers return the response
//! fields plus an optional payload, or the status to report.

pub mod cluster;
pub mod object;
pub mod vdi;

use sdgate_proto::constants::SD_MAX_COPIES;
use sdgate_proto::error::{SdError, SdResult};
use sdgate_proto::opcode::Opcode;
use sdgate_proto::request::{ResponseBody, SdRequest, SdResponse};
use tracing::debug;

use crate::daemon::SystemInfo;

/// Response fields and payload produced by a handler.
pub type OpOutput = (ResponseBody, Vec<u8>);

/// Run one request and build its response.
pub async fn dispatch(sys: &SystemInfo, req: &SdRequest, payload: &[u8]) -> SdResponse {
    let epoch = sys.config.cluster.epoch;
    match process(sys, req, payload).await {
        Ok((body, data)) => SdResponse::success(&req.header, epoch, body).with_data(data),
        Err(err) => {
            debug!("{:?} id {} failed: {}", req.opcode, req.header.id, err);
            SdResponse::error(&req.header, epoch, err)
        }
    }
}

async fn process(sys: &SystemInfo, req: &SdRequest, payload: &[u8]) -> SdResult<OpOutput> {
    if !req.opcode.is_served() {
        return Err(SdError::NoSupport);
    }
    if !sys.config.cluster.is_formatted()
        && !matches!(req.opcode, Opcode::ReleaseVdi | Opcode::FlushVdi)
    {
        return Err(SdError::WaitForFormat);
    }

    match req.opcode {
        Opcode::CreateAndWriteObj => object::create_and_write(sys, req, payload).await,
        Opcode::ReadObj => object::read(sys, req).await,
        Opcode::WriteObj => object::write(sys, req, payload).await,
        Opcode::RemoveObj => object::remove(sys, req).await,
        Opcode::DiscardObj => object::discard(sys, req).await,
        Opcode::NewVdi => vdi::new_vdi(sys, req, payload).await,
        Opcode::LockVdi | Opcode::GetVdiInfo => vdi::lookup(sys, req, payload).await,
        Opcode::ReleaseVdi | Opcode::FlushVdi => vdi::release(req, payload),
        Opcode::ReadVdis => vdi::read_vdis(sys, req),
        Opcode::GetClusterDefault => cluster::get_cluster_default(sys),
        _ => Err(SdError::NoSupport),
    }
}

/// Replica count for a request: its own `copies`, or the cluster default.
///
/// Only replication is implemented, so a copy policy is refused.
pub(crate) fn effective_copies(sys: &SystemInfo, copies: u8, copy_policy: u8) -> SdResult<usize> {
    if copy_policy != 0 {
        return Err(SdError::InvalidParms);
    }
    let copies = if copies == 0 {
        sys.config.cluster.nr_copies
    } else {
        copies
    };
    if copies > SD_MAX_COPIES {
        return Err(SdError::InvalidParms);
    }
    Ok(copies as usize)
}

#[cfg(test)]
pub(crate) mod testutil {
    use sdgate_core::store::StoreSpec;
    use sdgate_proto::constants::{SD_FLAG_CMD_WRITE, SD_PROTO_VER};
    use sdgate_proto::request::{RequestBody, SdHeader, SdRequest};
    use sdgate_proto::Opcode;
    use tempfile::TempDir;

    use crate::config::GatewayConfig;
    use crate::daemon::SystemInfo;
    use crate::registry::Registry;

    /// Gateway state over three fresh locations.
    pub async fn sys(tweak: impl FnOnce(&mut GatewayConfig)) -> (SystemInfo, Vec<TempDir>) {
        let dirs: Vec<TempDir> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
        let mut config = GatewayConfig::new(
            dirs.iter()
                .map(|d| StoreSpec {
                    path: d.path().to_path_buf(),
                    weight: 10,
                })
                .collect(),
        );
        tweak(&mut config);
        let registry = Registry::new(config.clone());
        let backend = registry.backend().await.unwrap();
        (SystemInfo::new(config, backend), dirs)
    }

    pub fn request(opcode: Opcode, body: RequestBody, data_length: u32) -> SdRequest {
        SdRequest {
            header: SdHeader {
                proto_ver: SD_PROTO_VER,
                opcode: opcode.code(),
                flags: SD_FLAG_CMD_WRITE,
                epoch: 0,
                id: 42,
                data_length,
            },
            opcode,
            body,
        }
    }
}
