//! Shared helper functions for store operations.
//!
//! Everything here is synchronous and is meant to run inside
//! `tokio::task::spawn_blocking`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use sdgate_proto::defaults::DEFAULT_WEIGHT_UNIT;
use sdgate_proto::ObjectId;
use tracing::{debug, warn};

/// Open an object file for positional reads and writes.
///
/// With `create`, a missing file is created empty.
pub fn open_object(path: &Path, create: bool) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(create)
        .open(path)
}

/// Read up to `len` bytes at `offset`, stopping early at end of file.
pub fn read_full_at(file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut done = 0;
    while done < len {
        match file.read_at(&mut buf[done..], offset + done as u64) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(done);
    Ok(buf)
}

/// Write all of `data` at `offset`.
pub fn write_full_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    file.write_all_at(data, offset)?;
    Ok(data.len())
}

/// Reserve `size` bytes of backing storage for `file`.
#[cfg(target_os = "linux")]
pub fn reserve(file: &File, size: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    if size == 0 {
        return Ok(());
    }
    nix::fcntl::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t)
        .map_err(io::Error::from)
}

/// Reserve `size` bytes of backing storage for `file`.
#[cfg(not(target_os = "linux"))]
pub fn reserve(file: &File, size: u64) -> io::Result<()> {
    if file.metadata()?.len() < size {
        file.set_len(size)?;
    }
    Ok(())
}

/// Probe for an object file. Absence is `Ok(false)`; any other failure is
/// an error.
/// Whether `e` points at the location itself rather than at the request.
///
/// Out-of-range offsets (`EINVAL`, `EFBIG`) and a full disk (`ENOSPC`) fail
/// one replica but leave the location usable.
pub fn is_location_fault(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(
            libc::EIO
                | libc::EROFS
                | libc::ENOENT
                | libc::ENOTDIR
                | libc::ENODEV
                | libc::ENXIO
                | libc::EACCES
                | libc::EPERM
        )
    )
}

pub fn probe(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove an object file; returns false when it was already missing.
pub fn remove_object(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Collect object names stored directly in `dir`.
///
/// Hidden files and names that are not 16-digit object ids are skipped.
pub fn scan_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if ObjectId::from_file_name(&name).is_some() {
            names.push(name.into_owned());
        } else {
            debug!("skipping non-object file: {}", name);
        }
    }
    Ok(names)
}

/// Information about disk space usage.
#[derive(Debug, Clone, Copy)]
pub struct DiskSpace {
    pub total: u64,
    pub free: u64,
    /// Space available to unprivileged users
    pub available: u64,
}

/// Get disk space information for the filesystem containing `path`.
pub fn get_disk_space(path: &Path) -> io::Result<DiskSpace> {
    use nix::sys::statvfs::statvfs;

    let stat = statvfs(path).map_err(|e| {
        warn!("statvfs failed for {}: {}", path.display(), e);
        io::Error::from(e)
    })?;

    let block_size = stat.fragment_size() as u64;
    Ok(DiskSpace {
        total: stat.blocks() as u64 * block_size,
        free: stat.blocks_free() as u64 * block_size,
        available: stat.blocks_available() as u64 * block_size,
    })
}

/// Placement weight of a location: its capacity in 16 MiB units, at least 1.
pub fn capacity_weight(path: &Path) -> io::Result<u64> {
    let space = get_disk_space(path)?;
    Ok((space.total / DEFAULT_WEIGHT_UNIT).max(1))
}
