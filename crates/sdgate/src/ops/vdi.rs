//! Volume (VDI) operations.
//!
//! A volume is identified by the FNV hash of its name and exists when its
//! inode object is present on the locations picked for it. The payload of
//! every VDI request carries the NUL padded name.

use std::time::{SystemTime, UNIX_EPOCH};

use sdgate_core::store::Backend;
use sdgate_proto::constants::{
    SD_INODE_SIZE, SD_MAX_BLOCK_SIZE_SHIFT, SD_MAX_VDI_LEN, SD_MIN_BLOCK_SIZE_SHIFT,
};
use sdgate_proto::error::{SdError, SdResult};
use sdgate_proto::hash::{sd_hash_vdi, trim_name};
use sdgate_proto::inode::SdInode;
use sdgate_proto::request::{RequestBody, ResponseBody, SdRequest, VdiRequest};
use sdgate_proto::ObjectId;
use tracing::info;

use super::{effective_copies, OpOutput};
use crate::daemon::SystemInfo;

fn vdi_fields(req: &SdRequest) -> SdResult<VdiRequest> {
    match req.body {
        RequestBody::Vdi(vdi) => Ok(vdi),
        _ => Err(SdError::InvalidParms),
    }
}

/// Volume name from the leading name field of the payload.
fn vdi_name(payload: &[u8]) -> &[u8] {
    trim_name(&payload[..payload.len().min(SD_MAX_VDI_LEN)])
}

fn vdi_body(vid: u32, copies: usize, block_size_shift: u8) -> ResponseBody {
    ResponseBody::Vdi {
        rsvd: 0,
        vdi_id: vid,
        attr_id: 0,
        copies: copies as u8,
        block_size_shift,
    }
}

/// Seconds in the high half, nanoseconds in the low half.
fn create_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() << 32) | d.subsec_nanos() as u64)
        .unwrap_or(0)
}

pub async fn new_vdi(sys: &SystemInfo, req: &SdRequest, payload: &[u8]) -> SdResult<OpOutput> {
    let vdi = vdi_fields(req)?;
    let name = vdi_name(payload);
    if name.is_empty() {
        return Err(SdError::InvalidParms);
    }
    let copies = effective_copies(sys, vdi.copies, vdi.copy_policy)?;
    let block_size_shift = match vdi.block_size_shift {
        0 => sys.config.cluster.block_size_shift,
        shift @ SD_MIN_BLOCK_SIZE_SHIFT..=SD_MAX_BLOCK_SIZE_SHIFT => shift,
        _ => return Err(SdError::InvalidParms),
    };

    let vid = sd_hash_vdi(name);
    let oid = ObjectId::from_vid(vid);
    let file_name = oid.file_name();
    if sys.backend.exists(&file_name, copies).await? {
        return Err(SdError::VdiExist);
    }

    let inode = SdInode {
        name: name.to_vec(),
        create_time: create_time(),
        vdi_size: vdi.vdi_size,
        copy_policy: 0,
        store_policy: vdi.store_policy,
        nr_copies: copies as u8,
        block_size_shift,
        vdi_id: vid,
        parent_vdi_id: vdi.base_vdi_id,
        ..Default::default()
    };
    sys.backend
        .allocate(&file_name, SD_INODE_SIZE as u64, copies)
        .await?;
    sys.backend
        .write_at(&file_name, &inode.encode_header(), 0, copies)
        .await?;
    sys.set_vdi_inuse(vid);

    info!(
        "created volume {} ({:#x}), {} bytes, {} copies",
        String::from_utf8_lossy(name),
        vid,
        vdi.vdi_size,
        copies
    );
    Ok((vdi_body(vid, copies, block_size_shift), Vec::new()))
}

/// Resolve a volume name for LOCK_VDI and GET_VDI_INFO.
pub async fn lookup(sys: &SystemInfo, req: &SdRequest, payload: &[u8]) -> SdResult<OpOutput> {
    let vdi = vdi_fields(req)?;
    let name = vdi_name(payload);
    if name.is_empty() {
        return Err(SdError::InvalidParms);
    }
    let copies = effective_copies(sys, vdi.copies, vdi.copy_policy)?;

    let vid = sd_hash_vdi(name);
    if !sys
        .backend
        .exists(&ObjectId::from_vid(vid).file_name(), copies)
        .await?
    {
        return Err(SdError::NoVdi);
    }
    sys.set_vdi_inuse(vid);
    Ok((
        vdi_body(vid, copies, sys.config.cluster.block_size_shift),
        Vec::new(),
    ))
}

/// RELEASE_VDI and FLUSH_VDI hold no state and always succeed.
pub fn release(req: &SdRequest, payload: &[u8]) -> SdResult<OpOutput> {
    let name = vdi_name(payload);
    let vid = if name.is_empty() { 0 } else { sd_hash_vdi(name) };
    let copies = match req.body {
        RequestBody::Vdi(vdi) => vdi.copies,
        _ => 0,
    };
    Ok((
        ResponseBody::Vdi {
            rsvd: 0,
            vdi_id: vid,
            attr_id: 0,
            copies,
            block_size_shift: 0,
        },
        Vec::new(),
    ))
}

/// The volume bitmap, truncated to the requested length.
pub fn read_vdis(sys: &SystemInfo, req: &SdRequest) -> SdResult<OpOutput> {
    Ok((
        ResponseBody::Raw,
        sys.vdi_bitmap(req.header.data_length as usize),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::{request, sys};
    use sdgate_proto::constants::SD_NR_VDIS;
    use sdgate_proto::Opcode;

    fn vdi_req(op: Opcode, vdi: VdiRequest) -> SdRequest {
        request(op, RequestBody::Vdi(vdi), SD_MAX_VDI_LEN as u32)
    }

    fn name(name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; SD_MAX_VDI_LEN];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        buf
    }

    #[tokio::test]
    async fn test_new_vdi_writes_inode() {
        let (sys, _dirs) = sys(|_| {}).await;
        let req = vdi_req(
            Opcode::NewVdi,
            VdiRequest {
                vdi_size: 10 << 30,
                base_vdi_id: 7,
                ..Default::default()
            },
        );
        let (body, _) = new_vdi(&sys, &req, &name("vol-a")).await.unwrap();
        let vid = sd_hash_vdi(b"vol-a");
        assert_eq!(body, vdi_body(vid, 2, 22));
        assert!(sys.is_vdi_inuse(vid));

        let file = ObjectId::from_vid(vid).file_name();
        let raw = sys.backend.read_at(&file, 0, SD_INODE_SIZE, 2).await.unwrap();
        assert_eq!(raw.len(), SD_INODE_SIZE);
        let inode = SdInode::decode(&raw).unwrap();
        assert_eq!(inode.name, b"vol-a");
        assert_eq!(inode.vdi_id, vid);
        assert_eq!(inode.vdi_size, 10 << 30);
        assert_eq!(inode.parent_vdi_id, 7);
        assert_eq!(inode.nr_copies, 2);
        assert_eq!(inode.block_size_shift, 22);
        assert_ne!(inode.create_time, 0);

        assert_eq!(
            new_vdi(&sys, &req, &name("vol-a")).await,
            Err(SdError::VdiExist)
        );
    }

    #[tokio::test]
    async fn test_repeat_create_leaves_inode_untouched() {
        let (sys, _dirs) = sys(|_| {}).await;
        let first = vdi_req(
            Opcode::NewVdi,
            VdiRequest {
                vdi_size: 1 << 30,
                ..Default::default()
            },
        );
        new_vdi(&sys, &first, &name("vol-r")).await.unwrap();
        let file = ObjectId::from_vid(sd_hash_vdi(b"vol-r")).file_name();
        let before = sys.backend.read_at(&file, 0, SD_INODE_SIZE, 2).await.unwrap();

        let again = vdi_req(
            Opcode::NewVdi,
            VdiRequest {
                vdi_size: 8 << 30,
                ..Default::default()
            },
        );
        assert_eq!(
            new_vdi(&sys, &again, &name("vol-r")).await,
            Err(SdError::VdiExist)
        );
        let after = sys.backend.read_at(&file, 0, SD_INODE_SIZE, 2).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(SdInode::decode(&after).unwrap().vdi_size, 1 << 30);
    }

    #[tokio::test]
    async fn test_new_vdi_request_overrides() {
        let (sys, _dirs) = sys(|_| {}).await;
        let req = vdi_req(
            Opcode::NewVdi,
            VdiRequest {
                copies: 3,
                block_size_shift: 23,
                ..Default::default()
            },
        );
        let (body, _) = new_vdi(&sys, &req, &name("vol-b")).await.unwrap();
        assert_eq!(body, vdi_body(sd_hash_vdi(b"vol-b"), 3, 23));
    }

    #[tokio::test]
    async fn test_new_vdi_rejects_bad_input() {
        let (sys, _dirs) = sys(|_| {}).await;
        let req = vdi_req(Opcode::NewVdi, VdiRequest::default());
        assert_eq!(
            new_vdi(&sys, &req, &[0u8; 16]).await,
            Err(SdError::InvalidParms)
        );

        let req = vdi_req(
            Opcode::NewVdi,
            VdiRequest {
                copy_policy: 0x24,
                ..Default::default()
            },
        );
        assert_eq!(
            new_vdi(&sys, &req, &name("vol-ec")).await,
            Err(SdError::InvalidParms)
        );
    }

    #[tokio::test]
    async fn test_lookup() {
        let (sys, _dirs) = sys(|_| {}).await;
        let create = vdi_req(Opcode::NewVdi, VdiRequest::default());
        new_vdi(&sys, &create, &name("vol-a")).await.unwrap();

        for op in [Opcode::LockVdi, Opcode::GetVdiInfo] {
            let req = vdi_req(op, VdiRequest::default());
            let (body, _) = lookup(&sys, &req, &name("vol-a")).await.unwrap();
            assert!(
                matches!(body, ResponseBody::Vdi { vdi_id, .. } if vdi_id == sd_hash_vdi(b"vol-a"))
            );
            assert_eq!(
                lookup(&sys, &req, &name("vol-missing")).await,
                Err(SdError::NoVdi)
            );
        }
    }

    #[test]
    fn test_name_uses_leading_field_only() {
        let mut payload = name("vol-a");
        payload.extend_from_slice(b"trailing tag data");
        assert_eq!(vdi_name(&payload), b"vol-a");
        assert_eq!(vdi_name(b"\0\0short\0"), b"short");
    }

    #[test]
    fn test_release_echoes_vid() {
        let req = vdi_req(Opcode::ReleaseVdi, VdiRequest::default());
        let (body, _) = release(&req, &name("vol-a")).unwrap();
        assert!(matches!(body, ResponseBody::Vdi { vdi_id, .. } if vdi_id == sd_hash_vdi(b"vol-a")));
        let (body, _) = release(&req, &[]).unwrap();
        assert!(matches!(body, ResponseBody::Vdi { vdi_id: 0, .. }));
    }

    #[tokio::test]
    async fn test_read_vdis_truncates() {
        let (sys, _dirs) = sys(|_| {}).await;
        sys.set_vdi_inuse(17);
        let req = request(Opcode::ReadVdis, RequestBody::Raw, 4);
        let (_, data) = read_vdis(&sys, &req).unwrap();
        assert_eq!(data, vec![0x00, 0x00, 0x02, 0x00]);

        let req = request(Opcode::ReadVdis, RequestBody::Raw, u32::MAX);
        let (_, data) = read_vdis(&sys, &req).unwrap();
        assert_eq!(data.len(), SD_NR_VDIS as usize / 8);
    }
}
