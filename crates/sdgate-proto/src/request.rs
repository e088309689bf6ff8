//! Request and response framing for the sheepdog client protocol.
//!
//! Requests and responses are 48-byte little-endian regions: a 16-byte
//! common header followed by 32 bytes whose meaning depends on the opcode.
//! Write-style requests and read-style responses are followed by
//! `data_length` payload bytes.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::*;
use crate::error::{ProtocolError, SdError, SD_RES_SUCCESS};
use crate::oid::ObjectId;
use crate::opcode::{FieldLayout, Opcode};

/// Common header shared by requests and responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SdHeader {
    pub proto_ver: u8,
    pub opcode: u8,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    pub data_length: u32,
}

impl SdHeader {
    fn get(buf: &mut &[u8]) -> Self {
        Self {
            proto_ver: buf.get_u8(),
            opcode: buf.get_u8(),
            flags: buf.get_u16_le(),
            epoch: buf.get_u32_le(),
            id: buf.get_u32_le(),
            data_length: buf.get_u32_le(),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.proto_ver);
        buf.put_u8(self.opcode);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.epoch);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.data_length);
    }

    /// Whether `data_length` payload bytes follow the request region.
    #[inline]
    pub fn is_write(&self) -> bool {
        self.flags & SD_FLAG_CMD_WRITE != 0
    }
}

/// Object operation fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjRequest {
    pub oid: ObjectId,
    pub cow_oid: ObjectId,
    pub copies: u8,
    pub copy_policy: u8,
    pub store_policy: u8,
    pub offset: u64,
}

/// VDI operation fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VdiRequest {
    pub vdi_size: u64,
    pub base_vdi_id: u32,
    pub copies: u8,
    pub copy_policy: u8,
    pub store_policy: u8,
    pub block_size_shift: u8,
    pub snapid: u32,
    /// Lock type for LOCK_VDI
    pub vdi_type: u32,
}

/// Cluster operation fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterRequest {
    pub oid: u64,
    pub ctime: u64,
    pub copies: u8,
    pub copy_policy: u8,
    pub flags: u16,
    pub tag: u32,
    pub nr_nodes: u32,
    pub block_size_shift: u8,
}

/// Opcode-specific request fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    Obj(ObjRequest),
    Vdi(VdiRequest),
    Cluster(ClusterRequest),
    Raw,
}

/// A decoded request region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdRequest {
    pub header: SdHeader,
    pub opcode: Opcode,
    pub body: RequestBody,
}

impl SdRequest {
    /// Decode the fixed request region.
    ///
    /// Fails only on a short region or an opcode outside the catalogue.
    pub fn decode(region: &[u8]) -> Result<Self, ProtocolError> {
        if region.len() < SD_REQ_SIZE {
            return Err(ProtocolError::ShortFrame(region.len()));
        }
        let mut buf = &region[..SD_REQ_SIZE];
        let header = SdHeader::get(&mut buf);
        let opcode =
            Opcode::from_u8(header.opcode).ok_or(ProtocolError::UnknownOpcode(header.opcode))?;

        let body = match opcode.layout() {
            FieldLayout::Obj => {
                let oid = ObjectId(buf.get_u64_le());
                let cow_oid = ObjectId(buf.get_u64_le());
                let copies = buf.get_u8();
                let copy_policy = buf.get_u8();
                let store_policy = buf.get_u8();
                buf.advance(5);
                RequestBody::Obj(ObjRequest {
                    oid,
                    cow_oid,
                    copies,
                    copy_policy,
                    store_policy,
                    offset: buf.get_u64_le(),
                })
            }
            FieldLayout::Vdi => RequestBody::Vdi(VdiRequest {
                vdi_size: buf.get_u64_le(),
                base_vdi_id: buf.get_u32_le(),
                copies: buf.get_u8(),
                copy_policy: buf.get_u8(),
                store_policy: buf.get_u8(),
                block_size_shift: buf.get_u8(),
                snapid: buf.get_u32_le(),
                vdi_type: buf.get_u32_le(),
            }),
            FieldLayout::Cluster => RequestBody::Cluster(ClusterRequest {
                oid: buf.get_u64_le(),
                ctime: buf.get_u64_le(),
                copies: buf.get_u8(),
                copy_policy: buf.get_u8(),
                flags: buf.get_u16_le(),
                tag: buf.get_u32_le(),
                nr_nodes: buf.get_u32_le(),
                block_size_shift: buf.get_u8(),
            }),
            FieldLayout::Raw => RequestBody::Raw,
        };

        Ok(Self {
            header,
            opcode,
            body,
        })
    }

    /// Encode the fixed request region (used by clients and tests).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SD_REQ_SIZE);
        let mut header = self.header;
        header.opcode = self.opcode.code();
        header.put(&mut buf);
        match self.body {
            RequestBody::Obj(obj) => {
                buf.put_u64_le(obj.oid.raw());
                buf.put_u64_le(obj.cow_oid.raw());
                buf.put_u8(obj.copies);
                buf.put_u8(obj.copy_policy);
                buf.put_u8(obj.store_policy);
                buf.put_bytes(0, 5);
                buf.put_u64_le(obj.offset);
            }
            RequestBody::Vdi(vdi) => {
                buf.put_u64_le(vdi.vdi_size);
                buf.put_u32_le(vdi.base_vdi_id);
                buf.put_u8(vdi.copies);
                buf.put_u8(vdi.copy_policy);
                buf.put_u8(vdi.store_policy);
                buf.put_u8(vdi.block_size_shift);
                buf.put_u32_le(vdi.snapid);
                buf.put_u32_le(vdi.vdi_type);
            }
            RequestBody::Cluster(c) => {
                buf.put_u64_le(c.oid);
                buf.put_u64_le(c.ctime);
                buf.put_u8(c.copies);
                buf.put_u8(c.copy_policy);
                buf.put_u16_le(c.flags);
                buf.put_u32_le(c.tag);
                buf.put_u32_le(c.nr_nodes);
                buf.put_u8(c.block_size_shift);
            }
            RequestBody::Raw => {}
        }
        buf.put_bytes(0, SD_REQ_SIZE - buf.len());
        buf.to_vec()
    }
}

/// Opcode-specific response fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBody {
    Obj {
        copies: u8,
        copy_policy: u8,
        store_policy: u8,
        offset: u64,
    },
    Vdi {
        rsvd: u32,
        vdi_id: u32,
        attr_id: u32,
        copies: u8,
        block_size_shift: u8,
    },
    Cluster {
        nr_copies: u8,
        copy_policy: u8,
        block_size_shift: u8,
    },
    Raw,
}

/// A response region plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdResponse {
    pub header: SdHeader,
    pub result: u32,
    pub body: ResponseBody,
    pub data: Vec<u8>,
}

impl SdResponse {
    /// Successful response to `req`, stamped with the cluster `epoch`.
    pub fn success(req: &SdHeader, epoch: u32, body: ResponseBody) -> Self {
        Self {
            header: SdHeader {
                proto_ver: req.proto_ver,
                opcode: req.opcode,
                flags: 0,
                epoch,
                id: req.id,
                data_length: 0,
            },
            result: SD_RES_SUCCESS,
            body,
            data: Vec::new(),
        }
    }

    /// Error response to `req`; carries no fields and no payload.
    pub fn error(req: &SdHeader, epoch: u32, err: SdError) -> Self {
        let mut rsp = Self::success(req, epoch, ResponseBody::Raw);
        rsp.result = err.to_code();
        rsp
    }

    /// Attach a payload; `data_length` follows its size.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == SD_RES_SUCCESS
    }

    /// Encode the response region followed by the payload in one buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SD_RSP_SIZE + self.data.len());
        let mut header = self.header;
        header.data_length = self.data.len() as u32;
        header.put(&mut buf);
        buf.put_u32_le(self.result);
        match self.body {
            ResponseBody::Obj {
                copies,
                copy_policy,
                store_policy,
                offset,
            } => {
                buf.put_u8(copies);
                buf.put_u8(copy_policy);
                buf.put_u8(store_policy);
                buf.put_u8(0);
                buf.put_u64_le(offset);
            }
            ResponseBody::Vdi {
                rsvd,
                vdi_id,
                attr_id,
                copies,
                block_size_shift,
            } => {
                buf.put_u32_le(rsvd);
                buf.put_u32_le(vdi_id);
                buf.put_u32_le(attr_id);
                buf.put_u8(copies);
                buf.put_u8(block_size_shift);
            }
            ResponseBody::Cluster {
                nr_copies,
                copy_policy,
                block_size_shift,
            } => {
                buf.put_u8(nr_copies);
                buf.put_u8(copy_policy);
                buf.put_u8(block_size_shift);
            }
            ResponseBody::Raw => {}
        }
        buf.put_bytes(0, SD_RSP_SIZE - buf.len());
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Decode a response region; the payload is left to the caller.
    pub fn decode(region: &[u8], layout: FieldLayout) -> Result<Self, ProtocolError> {
        if region.len() < SD_RSP_SIZE {
            return Err(ProtocolError::ShortFrame(region.len()));
        }
        let mut buf = &region[..SD_RSP_SIZE];
        let header = SdHeader::get(&mut buf);
        let result = buf.get_u32_le();
        let body = match layout {
            FieldLayout::Obj => {
                let copies = buf.get_u8();
                let copy_policy = buf.get_u8();
                let store_policy = buf.get_u8();
                buf.advance(1);
                ResponseBody::Obj {
                    copies,
                    copy_policy,
                    store_policy,
                    offset: buf.get_u64_le(),
                }
            }
            FieldLayout::Vdi => ResponseBody::Vdi {
                rsvd: buf.get_u32_le(),
                vdi_id: buf.get_u32_le(),
                attr_id: buf.get_u32_le(),
                copies: buf.get_u8(),
                block_size_shift: buf.get_u8(),
            },
            FieldLayout::Cluster => ResponseBody::Cluster {
                nr_copies: buf.get_u8(),
                copy_policy: buf.get_u8(),
                block_size_shift: buf.get_u8(),
            },
            FieldLayout::Raw => ResponseBody::Raw,
        };
        Ok(Self {
            header,
            result,
            body,
            data: Vec::new(),
        })
    }
}
