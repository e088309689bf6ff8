//! VDI inode and its fixed binary layout.
//!
//! The inode is stored as the payload of the volume's VDI object. Field
//! offsets match the cluster's `sd_inode` so existing clients can read the
//! header that the gateway writes.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::*;
use crate::error::{SdError, SdResult};

/// Generation reference for copy-on-write tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReference {
    pub generation: i32,
    pub count: i32,
}

/// VDI inode — the persisted metadata record of one volume.
///
/// `data_vdi_id` and `gref` hold only a prefix of the index tables; entries
/// past their length are zero on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdInode {
    /// VDI name (up to 256 bytes)
    pub name: Vec<u8>,
    /// Snapshot tag
    pub tag: Vec<u8>,
    /// Creation timestamp, epoch seconds in the high 32 bits
    pub create_time: u64,
    /// Snapshot creation time
    pub snap_ctime: u64,
    /// VM clock in nanoseconds
    pub vm_clock_nsec: u64,
    /// Virtual disk size in bytes
    pub vdi_size: u64,
    /// VM state size
    pub vm_state_size: u64,
    /// Copy policy (0 = replicate)
    pub copy_policy: u8,
    pub store_policy: u8,
    /// Number of replicas
    pub nr_copies: u8,
    /// Block size shift (log2 of block size)
    pub block_size_shift: u8,
    pub snap_id: u32,
    pub vdi_id: u32,
    /// Parent VDI ID (for snapshots/clones)
    pub parent_vdi_id: u32,
    pub btree_counter: u32,
    /// Data VDI ID index (maps data object index → VDI id).
    pub data_vdi_id: Vec<u32>,
    /// Generation references for copy-on-write tracking.
    pub gref: Vec<GenerationReference>,
}

fn put_fixed(buf: &mut BytesMut, field: &[u8], width: usize) {
    let n = field.len().min(width);
    buf.put_slice(&field[..n]);
    buf.put_bytes(0, width - n);
}

fn get_fixed(buf: &mut &[u8], width: usize) -> Vec<u8> {
    let field = crate::hash::trim_name(&buf[..width]).to_vec();
    buf.advance(width);
    field
}

impl SdInode {
    /// Encode only the fixed header (everything before the index tables).
    pub fn encode_header(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SD_INODE_HEADER_SIZE);
        put_fixed(&mut buf, &self.name, SD_MAX_VDI_LEN);
        put_fixed(&mut buf, &self.tag, SD_MAX_VDI_TAG_LEN);
        buf.put_u64_le(self.create_time);
        buf.put_u64_le(self.snap_ctime);
        buf.put_u64_le(self.vm_clock_nsec);
        buf.put_u64_le(self.vdi_size);
        buf.put_u64_le(self.vm_state_size);
        buf.put_u8(self.copy_policy);
        buf.put_u8(self.store_policy);
        buf.put_u8(self.nr_copies);
        buf.put_u8(self.block_size_shift);
        buf.put_u32_le(self.snap_id);
        buf.put_u32_le(self.vdi_id);
        buf.put_u32_le(self.parent_vdi_id);
        buf.put_u32_le(self.btree_counter);
        // unused child slots
        buf.put_bytes(0, 4 * (OLD_MAX_CHILDREN - 1));
        debug_assert_eq!(buf.len(), SD_INODE_HEADER_SIZE);
        buf.to_vec()
    }

    /// Decode an inode from at least its header.
    ///
    /// Index entries present in `data` after the header are decoded up to the
    /// last non-zero entry.
    pub fn decode(data: &[u8]) -> SdResult<Self> {
        if data.len() < SD_INODE_HEADER_SIZE {
            return Err(SdError::InvalidParms);
        }
        let mut buf = data;
        let mut inode = SdInode {
            name: get_fixed(&mut buf, SD_MAX_VDI_LEN),
            tag: get_fixed(&mut buf, SD_MAX_VDI_TAG_LEN),
            create_time: buf.get_u64_le(),
            snap_ctime: buf.get_u64_le(),
            vm_clock_nsec: buf.get_u64_le(),
            vdi_size: buf.get_u64_le(),
            vm_state_size: buf.get_u64_le(),
            copy_policy: buf.get_u8(),
            store_policy: buf.get_u8(),
            nr_copies: buf.get_u8(),
            block_size_shift: buf.get_u8(),
            snap_id: buf.get_u32_le(),
            vdi_id: buf.get_u32_le(),
            parent_vdi_id: buf.get_u32_le(),
            btree_counter: buf.get_u32_le(),
            data_vdi_id: Vec::new(),
            gref: Vec::new(),
        };
        buf.advance(4 * (OLD_MAX_CHILDREN - 1));

        let vids = (buf.remaining() / 4).min(SD_INODE_DATA_INDEX);
        let mut table: Vec<u32> = (0..vids).map(|_| buf.get_u32_le()).collect();
        let used = table.iter().rposition(|v| *v != 0).map_or(0, |p| p + 1);
        table.truncate(used);
        inode.data_vdi_id = table;

        if vids == SD_INODE_DATA_INDEX {
            let grefs = (buf.remaining() / 8).min(SD_INODE_DATA_INDEX);
            let mut refs: Vec<GenerationReference> = (0..grefs)
                .map(|_| GenerationReference {
                    generation: buf.get_i32_le(),
                    count: buf.get_i32_le(),
                })
                .collect();
            let used = refs
                .iter()
                .rposition(|r| *r != GenerationReference::default())
                .map_or(0, |p| p + 1);
            refs.truncate(used);
            inode.gref = refs;
        }
        Ok(inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SdInode {
        SdInode {
            name: b"vol-a".to_vec(),
            create_time: 0x6000_0000_0000_0000,
            vdi_size: 10 << 30,
            nr_copies: 2,
            block_size_shift: 22,
            vdi_id: 0x00ab_cdef,
            parent_vdi_id: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_header_layout() {
        let hdr = sample().encode_header();
        assert_eq!(hdr.len(), SD_INODE_HEADER_SIZE);
        assert_eq!(&hdr[..5], b"vol-a");
        assert!(hdr[5..512].iter().all(|b| *b == 0));
        // vdi_size follows name, tag and three u64 timestamps
        assert_eq!(&hdr[536..544], &(10u64 << 30).to_le_bytes());
        // copy_policy, store_policy, nr_copies, block_size_shift
        assert_eq!(&hdr[552..556], &[0, 0, 2, 22]);
        assert_eq!(&hdr[560..564], &0x00ab_cdefu32.to_le_bytes());
        assert_eq!(&hdr[564..568], &7u32.to_le_bytes());
    }

    #[test]
    fn test_decode_header_only() {
        let inode = sample();
        let decoded = SdInode::decode(&inode.encode_header()).unwrap();
        assert_eq!(decoded, inode);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(SdInode::decode(&[0u8; 100]), Err(SdError::InvalidParms));
    }

    #[test]
    fn test_decode_index_prefix() {
        let mut raw = sample().encode_header();
        for vid in [0u32, 0x00ab_cdef, 0x00ab_cdef, 0, 0] {
            raw.extend_from_slice(&vid.to_le_bytes());
        }
        let inode = SdInode::decode(&raw).unwrap();
        assert_eq!(inode.data_vdi_id, vec![0, 0x00ab_cdef, 0x00ab_cdef]);
        assert!(inode.gref.is_empty());
    }
}
