//! Object ID type and address codec.
//!
//! Object ID layout (64 bits):
//! - Bits  0-31: category payload (data index, attribute id, btree id)
//! - Bits 32-55: VDI id (24 bits)
//! - Bits 56-58: reserved
//! - Bits 59-63: category tag, at most one bit set

use std::fmt;

use crate::constants::*;

const VDI_SPACE_SHIFT: u64 = 32;
const SD_VDI_MASK: u64 = 0x00FF_FFFF_0000_0000;
const PAYLOAD_MASK: u64 = 0x0000_0000_FFFF_FFFF;
const VDI_BIT: u64 = 1u64 << 63;
const VMSTATE_BIT: u64 = 1u64 << 62;
const VDI_ATTR_BIT: u64 = 1u64 << 61;
const VDI_BTREE_BIT: u64 = 1u64 << 60;
const LEDGER_BIT: u64 = 1u64 << 59;
const TAG_MASK: u64 = VDI_BIT | VMSTATE_BIT | VDI_ATTR_BIT | VDI_BTREE_BIT | LEDGER_BIT;

/// The single category an object ID belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Plain data block of a volume.
    Data,
    /// Volume root (inode).
    Vdi,
    /// VM state block.
    VmState,
    /// VDI attribute record.
    VdiAttr,
    /// Indirect index node.
    VdiBtree,
    /// Reference ledger of a data object.
    Ledger,
}

/// A 64-bit object identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Category of this object.
    ///
    /// Tags are checked from the highest bit down, so an ID carrying several
    /// tag bits still has exactly one interpretation.
    #[inline]
    pub const fn kind(self) -> ObjectKind {
        if self.0 & VDI_BIT != 0 {
            ObjectKind::Vdi
        } else if self.0 & VMSTATE_BIT != 0 {
            ObjectKind::VmState
        } else if self.0 & VDI_ATTR_BIT != 0 {
            ObjectKind::VdiAttr
        } else if self.0 & VDI_BTREE_BIT != 0 {
            ObjectKind::VdiBtree
        } else if self.0 & LEDGER_BIT != 0 {
            ObjectKind::Ledger
        } else {
            ObjectKind::Data
        }
    }

    #[inline]
    pub const fn is_vdi_obj(self) -> bool {
        matches!(self.kind(), ObjectKind::Vdi)
    }

    #[inline]
    pub const fn is_vmstate_obj(self) -> bool {
        matches!(self.kind(), ObjectKind::VmState)
    }

    #[inline]
    pub const fn is_vdi_attr_obj(self) -> bool {
        matches!(self.kind(), ObjectKind::VdiAttr)
    }

    #[inline]
    pub const fn is_vdi_btree_obj(self) -> bool {
        matches!(self.kind(), ObjectKind::VdiBtree)
    }

    #[inline]
    pub const fn is_ledger_obj(self) -> bool {
        matches!(self.kind(), ObjectKind::Ledger)
    }

    /// A data object carries no tag bit at all.
    #[inline]
    pub const fn is_data_obj(self) -> bool {
        self.0 & TAG_MASK == 0
    }

    /// Extract the VDI id from this object ID.
    #[inline]
    pub const fn to_vid(self) -> u32 {
        ((self.0 & SD_VDI_MASK) >> VDI_SPACE_SHIFT) as u32
    }

    /// Category payload: data index, attribute id or btree id.
    #[inline]
    pub const fn payload(self) -> u32 {
        (self.0 & PAYLOAD_MASK) as u32
    }

    /// Get the data object index from a data OID.
    #[inline]
    pub const fn data_index(self) -> u64 {
        self.0 & (MAX_DATA_OBJS - 1)
    }

    /// Bytes to reserve when this object is first created.
    pub const fn obj_size(self, block_size_shift: u8) -> u64 {
        match self.kind() {
            ObjectKind::Vdi => SD_INODE_SIZE as u64,
            ObjectKind::VdiAttr => SD_ATTR_OBJ_SIZE as u64,
            ObjectKind::VdiBtree => SD_INODE_DATA_INDEX_SIZE as u64,
            ObjectKind::Ledger => SD_LEDGER_OBJ_SIZE,
            ObjectKind::Data | ObjectKind::VmState => 1u64 << block_size_shift,
        }
    }

    /// Create a VDI (inode) OID from a VDI id.
    #[inline]
    pub const fn from_vid(vid: u32) -> Self {
        Self(VDI_BIT | vid_bits(vid))
    }

    /// Create a data OID from a VDI id and data index.
    #[inline]
    pub const fn from_vid_data(vid: u32, idx: u32) -> Self {
        Self(vid_bits(vid) | idx as u64)
    }

    /// Create a VM state OID from a VDI id and index.
    #[inline]
    pub const fn from_vid_vmstate(vid: u32, idx: u32) -> Self {
        Self(VMSTATE_BIT | vid_bits(vid) | idx as u64)
    }

    /// Create a VDI attribute OID from a VDI id and attribute id.
    #[inline]
    pub const fn from_vid_attr(vid: u32, attr_id: u32) -> Self {
        Self(VDI_ATTR_BIT | vid_bits(vid) | attr_id as u64)
    }

    /// Create a BTree OID from a VDI id and btree id.
    #[inline]
    pub const fn from_vid_btree(vid: u32, btree_id: u32) -> Self {
        Self(VDI_BTREE_BIT | vid_bits(vid) | btree_id as u64)
    }

    /// Name of the file holding this object on a storage location.
    pub fn file_name(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a storage file name back into an object ID.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.len() != 16 {
            return None;
        }
        u64::from_str_radix(name, 16).ok().map(Self)
    }
}

#[inline]
const fn vid_bits(vid: u32) -> u64 {
    ((vid as u64) << VDI_SPACE_SHIFT) & SD_VDI_MASK
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OID({:#018x})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<ObjectId> for u64 {
    fn from(oid: ObjectId) -> Self {
        oid.0
    }
}
