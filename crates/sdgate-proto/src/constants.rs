//! Sheepdog client protocol constants.

/// Client protocol version spoken by the gateway
pub const SD_PROTO_VER: u8 = 0x02;

/// Default listen port for client connections
pub const SD_LISTEN_PORT: u16 = 7000;

// ─── Framing ────────────────────────────────────────────────────────────────

/// Common header size shared by requests and responses
pub const SD_HDR_SIZE: usize = 16;
/// Fixed request region (header + opcode-specific fields)
pub const SD_REQ_SIZE: usize = 48;
/// Fixed response region (header + result + opcode-specific fields)
pub const SD_RSP_SIZE: usize = 48;

/// Request carries a payload of `data_length` bytes
pub const SD_FLAG_CMD_WRITE: u16 = 0x01;
/// Copy-on-write from `cow_oid`
pub const SD_FLAG_CMD_COW: u16 = 0x02;
/// Writeback mode for cache
pub const SD_FLAG_CMD_CACHE: u16 = 0x04;
/// Don't use cache
pub const SD_FLAG_CMD_DIRECT: u16 = 0x08;
pub const SD_FLAG_CMD_PIGGYBACK: u16 = 0x10;
pub const SD_FLAG_CMD_FWD: u16 = 0x40;

// ─── Cluster ────────────────────────────────────────────────────────────────

/// Default number of copies
pub const SD_DEFAULT_COPIES: u8 = 2;
/// Default block size shift (4 MB objects)
pub const SD_DEFAULT_BLOCK_SIZE_SHIFT: u8 = 22;
/// Smallest accepted block size shift (1 MB objects)
pub const SD_MIN_BLOCK_SIZE_SHIFT: u8 = 20;
/// Largest accepted block size shift (2 GB objects)
pub const SD_MAX_BLOCK_SIZE_SHIFT: u8 = 31;
/// Cluster format version reported once formatted
pub const SD_FORMAT_VERSION: u8 = 9;
/// Maximum erasure strips
pub const SD_EC_MAX_STRIP: u8 = 16;
/// Maximum copies
pub const SD_MAX_COPIES: u8 = SD_EC_MAX_STRIP * 2 - 1;

// ─── VDI ────────────────────────────────────────────────────────────────────

/// Maximum VDI name length
pub const SD_MAX_VDI_LEN: usize = 256;
/// Maximum VDI tag length
pub const SD_MAX_VDI_TAG_LEN: usize = 256;
/// Maximum VDI attribute key length
pub const SD_MAX_VDI_ATTR_KEY_LEN: usize = 256;
/// Maximum VDI attribute value length
pub const SD_MAX_VDI_ATTR_VALUE_LEN: usize = 65536;

/// Total number of VDIs (2^24 = 16M)
pub const SD_NR_VDIS: u32 = 1 << 24;

/// Maximum data objects per VDI (2^32)
pub const MAX_DATA_OBJS: u64 = 1 << 32;

// ─── Inode layout ───────────────────────────────────────────────────────────

/// Legacy child slot count; the slots are kept as padding in the header
pub const OLD_MAX_CHILDREN: usize = 1024;
/// Inline data index entries in the inode (1M entries)
pub const SD_INODE_DATA_INDEX: usize = 1 << 20;
/// Size of the `data_vdi_id` table
pub const SD_INODE_DATA_INDEX_SIZE: usize = 4 * SD_INODE_DATA_INDEX;
/// Size of the generation reference table
pub const SD_INODE_GREF_SIZE: usize = 8 * SD_INODE_DATA_INDEX;
/// Inode header: everything before `data_vdi_id`
pub const SD_INODE_HEADER_SIZE: usize = 4664;
/// Full inode object size
pub const SD_INODE_SIZE: usize =
    SD_INODE_HEADER_SIZE + SD_INODE_DATA_INDEX_SIZE + SD_INODE_GREF_SIZE;

/// Size of a VDI attribute record
pub const SD_ATTR_OBJ_SIZE: usize = SD_MAX_VDI_LEN
    + SD_MAX_VDI_TAG_LEN
    + 8
    + 4
    + 4
    + SD_MAX_VDI_ATTR_KEY_LEN
    + SD_MAX_VDI_ATTR_VALUE_LEN;

/// Ledger object size
pub const SD_LEDGER_OBJ_SIZE: u64 = 1 << 22;
