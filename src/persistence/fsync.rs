//! fsync helpers for crash-safe record writes.
//!
//! A rename only survives power loss once the parent directory has been
//! synced as well, so atomic writes sync both the temp file and the directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Flushes a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Flushes a directory's entries to disk.
///
/// Pass directories only; the call also succeeds on regular files.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    OpenOptions::new().read(true).open(dir_path)?.sync_all()
}
