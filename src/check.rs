//! Verification of copied files and directories.
//!
//! [`check_directories_match`] is a shallow check: it only compares the number
//! of direct entries and the aggregate size. Two trees holding the same number
//! of files with the same total size but different contents pass it; use
//! [`check_files_match`] on individual pairs to compare contents.

use crate::file_util::hash_file;
use crate::tree::{DirectoryTree, FileEntry};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The ways two files or directories can fail to match.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Mismatch {
    #[error("'{}' is not a regular file", .0.display())]
    NotAFile(PathBuf),
    #[error("'{}' or '{}' is not a directory", .0.display(), .1.display())]
    NotADirectory(PathBuf, PathBuf),
    #[error("hash mismatch between '{}' ({src_hash}) and '{}' ({dest_hash})", .src.display(), .dest.display())]
    Hash {
        src: PathBuf,
        src_hash: String,
        dest: PathBuf,
        dest_hash: String,
    },
    #[error("'{}' (uid {src_uid}) has a different uid than '{}' (uid {dest_uid})", .src.display(), .dest.display())]
    Uid {
        src: PathBuf,
        src_uid: u32,
        dest: PathBuf,
        dest_uid: u32,
    },
    #[error("'{}' (gid {src_gid}) has a different gid than '{}' (gid {dest_gid})", .src.display(), .dest.display())]
    Gid {
        src: PathBuf,
        src_gid: u32,
        dest: PathBuf,
        dest_gid: u32,
    },
    #[error("permissions mismatch between '{}' ({src_mode:o}) and '{}' ({dest_mode:o})", .src.display(), .dest.display())]
    Mode {
        src: PathBuf,
        src_mode: u32,
        dest: PathBuf,
        dest_mode: u32,
    },
    #[error("the number of files differs between '{}' ({src_count}) and '{}' ({dest_count})", .src.display(), .dest.display())]
    FileCount {
        src: PathBuf,
        src_count: usize,
        dest: PathBuf,
        dest_count: usize,
    },
    #[error("not the same amount of data in '{}' ({src_size} bytes) and '{}' ({dest_size} bytes)", .src.display(), .dest.display())]
    Size {
        src: PathBuf,
        src_size: u64,
        dest: PathBuf,
        dest_size: u64,
    },
}

/// Fails unless `path` is a regular file.
pub fn check_is_file(path: &Path) -> Result<()> {
    let entry = FileEntry::resolve(path)?;
    if !entry.is_file() {
        return Err(Mismatch::NotAFile(path.to_path_buf()).into());
    }
    Ok(())
}

/// Fails unless both files have the same SHA-256 digest.
pub fn check_hash(src: &Path, dest: &Path) -> Result<()> {
    let src_hash = hash_file(src)
        .with_context(|| format!("Couldn't get the hash of '{}'", src.display()))?;
    let dest_hash = hash_file(dest)
        .with_context(|| format!("Couldn't get the hash of '{}'", dest.display()))?;
    if src_hash != dest_hash {
        return Err(Mismatch::Hash {
            src: src.to_path_buf(),
            src_hash,
            dest: dest.to_path_buf(),
            dest_hash,
        }
        .into());
    }
    Ok(())
}

/// Fails unless both paths have the same uid and gid.
pub fn check_owner(src: &Path, dest: &Path) -> Result<()> {
    let a = FileEntry::resolve(src)?;
    let b = FileEntry::resolve(dest)?;
    if a.uid != b.uid {
        return Err(Mismatch::Uid {
            src: a.path,
            src_uid: a.uid,
            dest: b.path,
            dest_uid: b.uid,
        }
        .into());
    }
    if a.gid != b.gid {
        return Err(Mismatch::Gid {
            src: a.path,
            src_gid: a.gid,
            dest: b.path,
            dest_gid: b.gid,
        }
        .into());
    }
    Ok(())
}

/// Fails unless both paths have the same mode, file type bits included.
pub fn check_permissions(src: &Path, dest: &Path) -> Result<()> {
    let a = FileEntry::resolve(src)?;
    let b = FileEntry::resolve(dest)?;
    if a.mode != b.mode {
        return Err(Mismatch::Mode {
            src: a.path,
            src_mode: a.mode,
            dest: b.path,
            dest_mode: b.mode,
        }
        .into());
    }
    Ok(())
}

/// Checks that two regular files have the same content, ownership and mode.
///
/// The checks run in that order and the first failure is returned.
pub fn check_files_match(src: &Path, dest: &Path) -> Result<()> {
    check_is_file(src)?;
    check_is_file(dest)?;
    check_hash(src, dest)?;
    check_owner(src, dest)?;
    check_permissions(src, dest)?;
    Ok(())
}

/// Shallow comparison of two directories: number of direct entries, then total size.
pub fn check_directories_match(src: &Path, dest: &Path) -> Result<()> {
    let src_tree = DirectoryTree::walk(src)?;
    let dest_tree = DirectoryTree::walk(dest)?;
    if !src_tree.entry.is_dir() || !dest_tree.entry.is_dir() {
        return Err(Mismatch::NotADirectory(src.to_path_buf(), dest.to_path_buf()).into());
    }

    let (src_count, dest_count) = (src_tree.file_count(), dest_tree.file_count());
    if src_count != dest_count {
        return Err(Mismatch::FileCount {
            src: src.to_path_buf(),
            src_count,
            dest: dest.to_path_buf(),
            dest_count,
        }
        .into());
    }

    let (src_size, dest_size) = (src_tree.total_size(), dest_tree.total_size());
    if src_size != dest_size {
        return Err(Mismatch::Size {
            src: src.to_path_buf(),
            src_size,
            dest: dest.to_path_buf(),
            dest_size,
        }
        .into());
    }
    Ok(())
}

/// Runs the directory check for two directories or the file check for two files.
pub fn verify(src: &Path, dest: &Path) -> Result<()> {
    let a = FileEntry::resolve(src)?;
    let b = FileEntry::resolve(dest)?;
    match (a.is_dir(), b.is_dir()) {
        (true, true) => check_directories_match(src, dest),
        (false, false) => check_files_match(src, dest),
        _ => bail!(
            "Can't compare '{}' with '{}': one is a directory and the other is not",
            src.display(),
            dest.display()
        ),
    }
}
