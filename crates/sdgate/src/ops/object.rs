//! Object I/O operations.

use sdgate_core::store::Backend;
use sdgate_proto::constants::SD_MAX_BLOCK_SIZE_SHIFT;
use sdgate_proto::error::{SdError, SdResult};
use sdgate_proto::request::{ObjRequest, RequestBody, ResponseBody, SdRequest};

use super::{effective_copies, OpOutput};
use crate::daemon::SystemInfo;

fn obj_fields(req: &SdRequest) -> SdResult<ObjRequest> {
    match req.body {
        RequestBody::Obj(obj) => Ok(obj),
        _ => Err(SdError::InvalidParms),
    }
}

fn obj_body(obj: &ObjRequest, copies: usize) -> ResponseBody {
    ResponseBody::Obj {
        copies: copies as u8,
        copy_policy: obj.copy_policy,
        store_policy: obj.store_policy,
        offset: obj.offset,
    }
}

/// Bytes a read-style request asks for, bounded like a write payload.
fn request_len(sys: &SystemInfo, req: &SdRequest) -> SdResult<usize> {
    if req.header.data_length > sys.config.max_payload {
        return Err(SdError::InvalidParms);
    }
    Ok(req.header.data_length as usize)
}

/// Refuse a byte range that cannot lie inside the object.
///
/// Volumes may carry their own block size shift, so data objects are
/// bounded by the largest one accepted.
fn check_range(obj: &ObjRequest, len: usize) -> SdResult<()> {
    let limit = obj.oid.obj_size(SD_MAX_BLOCK_SIZE_SHIFT);
    match obj.offset.checked_add(len as u64) {
        Some(end) if end <= limit && end <= i64::MAX as u64 => Ok(()),
        _ => Err(SdError::InvalidParms),
    }
}

/// Reserve the full object on every replica, then write the payload.
pub async fn create_and_write(
    sys: &SystemInfo,
    req: &SdRequest,
    payload: &[u8],
) -> SdResult<OpOutput> {
    let obj = obj_fields(req)?;
    let copies = effective_copies(sys, obj.copies, obj.copy_policy)?;
    check_range(&obj, payload.len())?;
    let name = obj.oid.file_name();
    let size = obj.oid.obj_size(sys.config.cluster.block_size_shift);

    sys.backend.allocate(&name, size, copies).await?;
    sys.backend.write_at(&name, payload, obj.offset, copies).await?;
    Ok((obj_body(&obj, copies), Vec::new()))
}

pub async fn read(sys: &SystemInfo, req: &SdRequest) -> SdResult<OpOutput> {
    let obj = obj_fields(req)?;
    let copies = effective_copies(sys, obj.copies, obj.copy_policy)?;
    let len = request_len(sys, req)?;
    check_range(&obj, len)?;

    let data = sys
        .backend
        .read_at(&obj.oid.file_name(), obj.offset, len, copies)
        .await?;
    Ok((obj_body(&obj, copies), data))
}

pub async fn write(sys: &SystemInfo, req: &SdRequest, payload: &[u8]) -> SdResult<OpOutput> {
    let obj = obj_fields(req)?;
    let copies = effective_copies(sys, obj.copies, obj.copy_policy)?;
    check_range(&obj, payload.len())?;

    sys.backend
        .write_at(&obj.oid.file_name(), payload, obj.offset, copies)
        .await?;
    Ok((obj_body(&obj, copies), Vec::new()))
}

pub async fn remove(sys: &SystemInfo, req: &SdRequest) -> SdResult<OpOutput> {
    let obj = obj_fields(req)?;
    let copies = effective_copies(sys, obj.copies, obj.copy_policy)?;

    sys.backend.remove(&obj.oid.file_name(), copies).await?;
    Ok((obj_body(&obj, copies), Vec::new()))
}

/// Zero `data_length` bytes at `offset` of an existing object.
pub async fn discard(sys: &SystemInfo, req: &SdRequest) -> SdResult<OpOutput> {
    let obj = obj_fields(req)?;
    let copies = effective_copies(sys, obj.copies, obj.copy_policy)?;
    let len = request_len(sys, req)?;
    check_range(&obj, len)?;
    let name = obj.oid.file_name();

    if !sys.backend.exists(&name, copies).await? {
        return Err(SdError::NoObj);
    }
    if len > 0 {
        sys.backend
            .write_at(&name, &vec![0u8; len], obj.offset, copies)
            .await?;
    }
    Ok((obj_body(&obj, copies), Vec::new()))
}
