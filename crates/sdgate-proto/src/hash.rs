//! FNV-1a hash functions.
//!
//! `sd_hash_vdi` must match the cluster's own name hashing so that a volume
//! name resolves to the same VDI id on every client.

use crate::constants::SD_NR_VDIS;

/// FNV-1a 64-bit initial basis.
pub const FNV1A_64_INIT: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime.
const FNV_64_PRIME: u64 = 0x0100_0000_01b3;

/// Compute FNV-1a hash over a byte buffer.
#[inline]
pub fn fnv_64a_buf(buf: &[u8], mut hval: u64) -> u64 {
    for &byte in buf {
        hval ^= byte as u64;
        hval = hval.wrapping_mul(FNV_64_PRIME);
    }
    hval
}

/// Compute FNV-1a hash over the little-endian bytes of a u64.
#[inline]
pub fn fnv_64a_64(val: u64, mut hval: u64) -> u64 {
    for i in 0..8 {
        hval ^= (val >> (i * 8)) & 0xff;
        hval = hval.wrapping_mul(FNV_64_PRIME);
    }
    hval
}

/// Hash a byte buffer to a u64 (double-hash for better distribution).
#[inline]
pub fn sd_hash(buf: &[u8]) -> u64 {
    let hval = fnv_64a_buf(buf, FNV1A_64_INIT);
    fnv_64a_64(hval, hval)
}

/// Mix two hashes into one.
#[inline]
pub fn sd_hash_combine(a: u64, b: u64) -> u64 {
    let hval = fnv_64a_64(b, fnv_64a_64(a, FNV1A_64_INIT));
    fnv_64a_64(hval, hval)
}

/// Hash a volume name to a 24-bit VDI id.
///
/// The name is hashed as given; callers strip wire padding first with
/// [`trim_name`].
#[inline]
pub fn sd_hash_vdi(name: &[u8]) -> u32 {
    let hval = fnv_64a_buf(name, FNV1A_64_INIT);
    (hval & (SD_NR_VDIS as u64 - 1)) as u32
}

/// Strip the NUL padding surrounding a name field.
pub fn trim_name(buf: &[u8]) -> &[u8] {
    let start = buf.iter().position(|&b| b != 0).unwrap_or(buf.len());
    let end = buf.iter().rposition(|&b| b != 0).map_or(start, |p| p + 1);
    &buf[start..end]
}
