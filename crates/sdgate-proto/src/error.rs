//! Sheepdog result codes.
//!
//! Every non-success status a response can carry is one variant; the
//! discriminant is the value written into the `result` field on the wire.

use serde::{Deserialize, Serialize};

/// Result code of the success status.
pub const SD_RES_SUCCESS: u32 = 0x00;

/// Unified error type for gateway operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[repr(u32)]
pub enum SdError {
    #[error("unknown error")]
    Unknown = 0x01,
    #[error("no object found")]
    NoObj = 0x02,
    #[error("I/O error")]
    Eio = 0x03,
    #[error("VDI exists already")]
    VdiExist = 0x04,
    #[error("invalid parameters")]
    InvalidParms = 0x05,
    #[error("system error")]
    SystemError = 0x06,
    #[error("VDI is locked")]
    VdiLocked = 0x07,
    #[error("no VDI found")]
    NoVdi = 0x08,
    #[error("no base VDI found")]
    NoBaseVdi = 0x09,
    #[error("cannot read requested VDI")]
    VdiRead = 0x0A,
    #[error("cannot write requested VDI")]
    VdiWrite = 0x0B,
    #[error("cannot read base VDI")]
    BaseVdiRead = 0x0C,
    #[error("cannot write base VDI")]
    BaseVdiWrite = 0x0D,
    #[error("requested tag not found")]
    NoTag = 0x0E,
    #[error("gateway is starting up")]
    Startup = 0x0F,
    #[error("VDI is not locked")]
    VdiNotLocked = 0x10,
    #[error("gateway is shutting down")]
    Shutdown = 0x11,
    #[error("cannot allocate memory")]
    NoMem = 0x12,
    #[error("maximum VDIs reached")]
    FullVdi = 0x13,
    #[error("protocol version mismatch")]
    VerMismatch = 0x14,
    #[error("no space available")]
    NoSpace = 0x15,
    #[error("waiting for format")]
    WaitForFormat = 0x16,
    #[error("waiting for nodes to join")]
    WaitForJoin = 0x17,
    #[error("join failed")]
    JoinFailed = 0x18,
    #[error("gateway is halted")]
    Halt = 0x19,
    #[error("object is read-only")]
    ReadOnly = 0x1A,
    #[error("object upload incomplete")]
    Incomplete = 0x1B,
    #[error("collecting cluster info")]
    CollectingCinfo = 0x1C,
    #[error("inode invalidated")]
    InodeInvalidated = 0x1D,
    #[error("operation not supported")]
    NoSupport = 0x8B,
}

impl SdError {
    /// Convert from a raw protocol result code.
    ///
    /// Returns `None` for success. Codes outside the table collapse to
    /// `Unknown`.
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            SD_RES_SUCCESS => return None,
            0x01 => Self::Unknown,
            0x02 => Self::NoObj,
            0x03 => Self::Eio,
            0x04 => Self::VdiExist,
            0x05 => Self::InvalidParms,
            0x06 => Self::SystemError,
            0x07 => Self::VdiLocked,
            0x08 => Self::NoVdi,
            0x09 => Self::NoBaseVdi,
            0x0A => Self::VdiRead,
            0x0B => Self::VdiWrite,
            0x0C => Self::BaseVdiRead,
            0x0D => Self::BaseVdiWrite,
            0x0E => Self::NoTag,
            0x0F => Self::Startup,
            0x10 => Self::VdiNotLocked,
            0x11 => Self::Shutdown,
            0x12 => Self::NoMem,
            0x13 => Self::FullVdi,
            0x14 => Self::VerMismatch,
            0x15 => Self::NoSpace,
            0x16 => Self::WaitForFormat,
            0x17 => Self::WaitForJoin,
            0x18 => Self::JoinFailed,
            0x19 => Self::Halt,
            0x1A => Self::ReadOnly,
            0x1B => Self::Incomplete,
            0x1C => Self::CollectingCinfo,
            0x1D => Self::InodeInvalidated,
            0x8B => Self::NoSupport,
            _ => Self::Unknown,
        };
        Some(err)
    }

    /// Convert to the raw protocol result code.
    #[inline]
    pub const fn to_code(self) -> u32 {
        self as u32
    }
}

/// Framing failures. These are never answered; the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("short frame: {0} bytes")]
    ShortFrame(usize),
    #[error("payload of {0} bytes exceeds limit")]
    PayloadTooLarge(u32),
}

/// Result type alias for gateway operations.
pub type SdResult<T> = Result<T, SdError>;

impl From<std::io::Error> for SdError {
    fn from(_: std::io::Error) -> Self {
        SdError::Eio
    }
}

/// Result code for an operation outcome.
pub fn result_code<T>(res: &SdResult<T>) -> u32 {
    match res {
        Ok(_) => SD_RES_SUCCESS,
        Err(e) => e.to_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_codes_are_fixed() {
        assert_eq!(SdError::Unknown.to_code(), 0x01);
        assert_eq!(SdError::NoObj.to_code(), 0x02);
        assert_eq!(SdError::Eio.to_code(), 0x03);
        assert_eq!(SdError::VdiExist.to_code(), 0x04);
        assert_eq!(SdError::InvalidParms.to_code(), 0x05);
        assert_eq!(SdError::NoVdi.to_code(), 0x08);
        assert_eq!(SdError::WaitForFormat.to_code(), 0x16);
        assert_eq!(SdError::NoSupport.to_code(), 0x8B);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(SdError::from_code(0), None);
        for code in (0x01..=0x1D).chain([0x8B]) {
            let err = SdError::from_code(code).unwrap();
            assert_eq!(err.to_code(), code);
        }
        assert_eq!(SdError::from_code(0xFFFF), Some(SdError::Unknown));
    }

    #[test]
    fn test_result_code() {
        assert_eq!(result_code::<()>(&Ok(())), SD_RES_SUCCESS);
        assert_eq!(result_code::<()>(&Err(SdError::NoVdi)), 0x08);
    }
}
