//! Operation codes carried in the request header.

/// Every opcode the gateway recognizes.
///
/// Only the client object and VDI operations are served; the rest are
/// recognized so that they can be answered with `NoSupport` instead of
/// dropping the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ---- Data object operations ----
    CreateAndWriteObj = 0x01,
    ReadObj = 0x02,
    WriteObj = 0x03,
    RemoveObj = 0x04,
    DiscardObj = 0x05,

    // ---- VDI operations ----
    NewVdi = 0x11,
    LockVdi = 0x12,
    ReleaseVdi = 0x13,
    GetVdiInfo = 0x14,
    ReadVdis = 0x15,
    FlushVdi = 0x16,
    DelVdi = 0x17,
    GetClusterDefault = 0x18,

    // ---- Cluster management and peer operations ----
    GetNodeList = 0x82,
    MakeFs = 0x84,
    Shutdown = 0x85,
    StatSheep = 0x86,
    StatCluster = 0x87,
    GetVdiAttr = 0x89,
    ForceRecover = 0x8A,
    GetStoreList = 0x90,
    Snapshot = 0x91,
    Restore = 0x92,
    GetSnapFile = 0x93,
    Cleanup = 0x94,
    TraceStatus = 0x95,
    TraceReadBuf = 0x96,
    StatRecovery = 0x97,
    FlushDelCache = 0x98,
    NotifyVdiDel = 0x99,
    KillNode = 0x9A,
    TraceEnable = 0x9B,
    TraceDisable = 0x9C,
    GetObjList = 0xA1,
    GetEpoch = 0xA2,
    CreateAndWritePeer = 0xA3,
    ReadPeer = 0xA4,
    WritePeer = 0xA5,
    RemovePeer = 0xA6,
    EnableRecover = 0xA8,
    DisableRecover = 0xA9,
    GetVdiCopies = 0xAB,
    CompleteRecovery = 0xAC,
    FlushNodes = 0xAD,
    FlushPeer = 0xAE,
    NotifyVdiAdd = 0xAF,
    MdInfo = 0xB1,
    MdPlug = 0xB2,
    MdUnplug = 0xB3,
    GetHash = 0xB4,
    Reweight = 0xB5,
    Stat = 0xB8,
    GetLogLevel = 0xB9,
    SetLogLevel = 0xBA,
    NfsCreate = 0xBB,
    NfsDelete = 0xBC,
    Exist = 0xBD,
    ClusterInfo = 0xBE,
    AlterClusterCopy = 0xBF,
    AlterVdiCopy = 0xC0,
    DecrefObj = 0xC1,
    DecrefPeer = 0xC2,
    RepairReplica = 0xC5,
    OidsExist = 0xC6,
    VdiStateCheckpointCtl = 0xC7,
    InodeCoherence = 0xC8,
    ReadDelVdis = 0xC9,
    GetRecovery = 0xCA,
    SetRecovery = 0xCB,
    SetVnodes = 0xCC,
    GetVnodes = 0xCD,
}

/// Which opcode-specific field block follows the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    Obj,
    Vdi,
    Cluster,
    Raw,
}

impl Opcode {
    pub fn from_u8(code: u8) -> Option<Self> {
        use Opcode::*;
        let op = match code {
            0x01 => CreateAndWriteObj,
            0x02 => ReadObj,
            0x03 => WriteObj,
            0x04 => RemoveObj,
            0x05 => DiscardObj,
            0x11 => NewVdi,
            0x12 => LockVdi,
            0x13 => ReleaseVdi,
            0x14 => GetVdiInfo,
            0x15 => ReadVdis,
            0x16 => FlushVdi,
            0x17 => DelVdi,
            0x18 => GetClusterDefault,
            0x82 => GetNodeList,
            0x84 => MakeFs,
            0x85 => Shutdown,
            0x86 => StatSheep,
            0x87 => StatCluster,
            0x89 => GetVdiAttr,
            0x8A => ForceRecover,
            0x90 => GetStoreList,
            0x91 => Snapshot,
            0x92 => Restore,
            0x93 => GetSnapFile,
            0x94 => Cleanup,
            0x95 => TraceStatus,
            0x96 => TraceReadBuf,
            0x97 => StatRecovery,
            0x98 => FlushDelCache,
            0x99 => NotifyVdiDel,
            0x9A => KillNode,
            0x9B => TraceEnable,
            0x9C => TraceDisable,
            0xA1 => GetObjList,
            0xA2 => GetEpoch,
            0xA3 => CreateAndWritePeer,
            0xA4 => ReadPeer,
            0xA5 => WritePeer,
            0xA6 => RemovePeer,
            0xA8 => EnableRecover,
            0xA9 => DisableRecover,
            0xAB => GetVdiCopies,
            0xAC => CompleteRecovery,
            0xAD => FlushNodes,
            0xAE => FlushPeer,
            0xAF => NotifyVdiAdd,
            0xB1 => MdInfo,
            0xB2 => MdPlug,
            0xB3 => MdUnplug,
            0xB4 => GetHash,
            0xB5 => Reweight,
            0xB8 => Stat,
            0xB9 => GetLogLevel,
            0xBA => SetLogLevel,
            0xBB => NfsCreate,
            0xBC => NfsDelete,
            0xBD => Exist,
            0xBE => ClusterInfo,
            0xBF => AlterClusterCopy,
            0xC0 => AlterVdiCopy,
            0xC1 => DecrefObj,
            0xC2 => DecrefPeer,
            0xC5 => RepairReplica,
            0xC6 => OidsExist,
            0xC7 => VdiStateCheckpointCtl,
            0xC8 => InodeCoherence,
            0xC9 => ReadDelVdis,
            0xCA => GetRecovery,
            0xCB => SetRecovery,
            0xCC => SetVnodes,
            0xCD => GetVnodes,
            _ => return None,
        };
        Some(op)
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Field block layout used by this opcode's request and response.
    pub fn layout(self) -> FieldLayout {
        use Opcode::*;
        match self {
            CreateAndWriteObj | ReadObj | WriteObj | RemoveObj | DiscardObj
            | CreateAndWritePeer | ReadPeer | WritePeer | RemovePeer | Exist => FieldLayout::Obj,
            NewVdi | LockVdi | ReleaseVdi | GetVdiInfo | FlushVdi | DelVdi | GetVdiAttr
            | Snapshot => FieldLayout::Vdi,
            GetClusterDefault | MakeFs => FieldLayout::Cluster,
            _ => FieldLayout::Raw,
        }
    }

    /// Whether the gateway implements this operation.
    pub fn is_served(self) -> bool {
        self.code() < 0x80 && self != Opcode::DelVdi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_codes() {
        for code in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(code) {
                assert_eq!(op.code(), code);
            }
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0x06), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
        assert_eq!(Opcode::from_u8(0x18), Some(Opcode::GetClusterDefault));
    }

    #[test]
    fn test_served_ops() {
        assert!(Opcode::CreateAndWriteObj.is_served());
        assert!(Opcode::ReadVdis.is_served());
        assert!(!Opcode::DelVdi.is_served());
        assert!(!Opcode::GetNodeList.is_served());
    }

    #[test]
    fn test_layout() {
        assert_eq!(Opcode::ReadObj.layout(), FieldLayout::Obj);
        assert_eq!(Opcode::NewVdi.layout(), FieldLayout::Vdi);
        assert_eq!(Opcode::GetClusterDefault.layout(), FieldLayout::Cluster);
        assert_eq!(Opcode::ReadVdis.layout(), FieldLayout::Raw);
    }
}
