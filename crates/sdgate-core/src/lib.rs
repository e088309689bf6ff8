//! # sdgate-core
//!
//! Placement and storage layer of the sdgate gateway: the weighted
//! placement ring, the backend abstraction with its sharded filesystem
//! implementation, the optional handle cache and the listen socket helper.

pub mod cache;
pub mod error;
pub mod net;
pub mod ring;
pub mod store;

pub use error::{StoreError, StoreResult};
