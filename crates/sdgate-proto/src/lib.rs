//! # sdgate-proto
//!
//! Wire protocol types, constants, and data structures for the sdgate
//! storage gateway.
//!
//! This crate defines the sheepdog client wire format, object ID
//! manipulation, result codes, and the on-disk inode layout shared by the
//! gateway components.

pub mod constants;
pub mod defaults;
pub mod error;
pub mod hash;
pub mod inode;
pub mod oid;
pub mod opcode;
pub mod request;

// Re-export commonly used types at the crate root
pub use error::{ProtocolError, SdError, SdResult};
pub use oid::{ObjectId, ObjectKind};
pub use opcode::Opcode;
pub use request::{RequestBody, SdHeader, SdRequest, SdResponse};
