//! POSIX attribute snapshots derived from remote object headers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::remote::{header, Headers};

/// Block size reported for regular files.
pub const BLOCK_SIZE: u64 = 4096;

const DEFAULT_FILE_PERM: u32 = 0o444;
const DEFAULT_DIR_PERM: u32 = 0o555;

/// POSIX attribute snapshot of one remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub blocks: u64,
}

impl FileStat {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFDIR
    }
}

fn header_u64(headers: &Headers, name: &str) -> Option<u64> {
    headers.get(name).and_then(|v| v.trim().parse().ok())
}

/// Derive the file mode from headers.
///
/// A custom mode header wins when it carries type bits. Otherwise the object
/// is a directory if it carries the directory marker content-type or the key
/// ends in a slash, else a regular file.
fn derive_mode(path: &str, headers: &Headers) -> u32 {
    let mut mode = header_u64(headers, header::META_MODE).unwrap_or(0) as u32;
    if mode & libc::S_IFMT != 0 {
        return mode;
    }

    let is_dir = headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|ct| ct == header::DIRECTORY_CONTENT_TYPE)
        || path.ends_with('/');

    if mode == 0 {
        mode = if is_dir {
            DEFAULT_DIR_PERM
        } else {
            DEFAULT_FILE_PERM
        };
    }
    mode | if is_dir { libc::S_IFDIR } else { libc::S_IFREG }
}

/// Modification time: the custom mtime header (epoch seconds) wins, falling
/// back to `Last-Modified`, also carried as epoch seconds by the store.
fn derive_mtime(headers: &Headers) -> SystemTime {
    let secs = header_u64(headers, header::META_MTIME)
        .or_else(|| header_u64(headers, header::LAST_MODIFIED))
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Build a [`FileStat`] from the headers of a HEAD response.
#[must_use]
pub fn stat_from_headers(path: &str, headers: &Headers) -> FileStat {
    let mode = derive_mode(path, headers);
    let size = header_u64(headers, header::CONTENT_LENGTH).unwrap_or(0);
    let blocks = if mode & libc::S_IFMT == libc::S_IFREG {
        size.div_ceil(BLOCK_SIZE)
    } else {
        0
    };

    FileStat {
        mode,
        size,
        mtime: derive_mtime(headers),
        uid: header_u64(headers, header::META_UID).unwrap_or(0) as u32,
        gid: header_u64(headers, header::META_GID).unwrap_or(0) as u32,
        // See the FUSE FAQ: nlink of 1 is fine for synthetic trees.
        nlink: 1,
        blocks,
    }
}
