//! Small file helpers shared by the copy, check and archive modules.

use crate::constants::READ_LINE_LIMIT;
use crate::tree::DirectoryTree;
use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufReader, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, chown};
use std::path::Path;

/// Returns the lowercase hex SHA-256 digest of the file at `path`.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Couldn't open '{}' for hashing", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Couldn't calculate the hash of '{}'", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Counts the newline bytes in the file at `path`.
pub fn count_lines(path: &Path) -> Result<usize> {
    let mut file =
        File::open(path).with_context(|| format!("Couldn't open '{}'", path.display()))?;
    let mut buf = vec![0u8; 32 * 1024];
    let mut count = 0;
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Couldn't read '{}'", path.display()))?;
        if n == 0 {
            return Ok(count);
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
    }
}

/// Reads a text file, refusing anything longer than [`READ_LINE_LIMIT`] lines.
pub fn read_file(path: &Path) -> Result<String> {
    let lines = count_lines(path)?;
    if lines > READ_LINE_LIMIT {
        bail!(
            "File '{}' has {lines} lines, more than the {READ_LINE_LIMIT} allowed",
            path.display()
        );
    }
    fs::read_to_string(path).with_context(|| format!("Couldn't read '{}'", path.display()))
}

/// Writes `content` to `path`, creating it with mode 0644 or truncating it.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .with_context(|| format!("Couldn't open '{}' for writing", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Couldn't write to '{}'", path.display()))?;
    Ok(())
}

/// Removes a regular file, or a directory and everything below it.
pub fn remove(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("The path '{}' is invalid", path.display()))?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Couldn't delete directory '{}'", path.display()))
    } else if metadata.is_file() {
        fs::remove_file(path).with_context(|| format!("Couldn't delete file '{}'", path.display()))
    } else {
        bail!(
            "'{}' can't be deleted because it is not a regular file or a directory",
            path.display()
        )
    }
}

/// Creates an empty file and applies `mode` and ownership to it.
pub fn create_file(path: &Path, mode: u32, uid: u32, gid: u32) -> Result<()> {
    File::create(path).with_context(|| format!("Couldn't create file '{}'", path.display()))?;
    set_mode_and_owner(path, mode, uid, gid)
}

/// Creates a file holding `message` with the given mode and ownership.
pub fn create_file_with_message(
    path: &Path,
    message: &str,
    mode: u32,
    uid: u32,
    gid: u32,
) -> Result<()> {
    // Content goes in before the mode is applied, the mode may forbid writing.
    fs::write(path, message)
        .with_context(|| format!("Couldn't write to '{}'", path.display()))?;
    set_mode_and_owner(path, mode, uid, gid)
}

/// Creates a single directory (the parent must exist) with the given mode and ownership.
pub fn create_directory(path: &Path, mode: u32, uid: u32, gid: u32) -> Result<()> {
    fs::create_dir(path).with_context(|| {
        format!(
            "Couldn't create directory '{}' with mode {mode:o}",
            path.display()
        )
    })?;
    set_mode_and_owner(path, mode, uid, gid)
}

/// Number of direct entries in `dir`.
pub fn number_of_files(dir: &Path) -> Result<usize> {
    let tree = DirectoryTree::walk(dir)
        .with_context(|| format!("Couldn't count the files in '{}'", dir.display()))?;
    Ok(tree.file_count())
}

/// Total size in bytes of every non-directory entry below `dir`.
pub fn directory_size(dir: &Path) -> Result<u64> {
    let tree = DirectoryTree::walk(dir)
        .with_context(|| format!("Couldn't get the size of '{}'", dir.display()))?;
    Ok(tree.total_size())
}

pub(crate) fn set_mode_and_owner(path: &Path, mode: u32, uid: u32, gid: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode)).with_context(|| {
        format!(
            "Couldn't change the permissions of '{}' to {mode:o}",
            path.display()
        )
    })?;
    chown(path, Some(uid), Some(gid)).with_context(|| {
        format!(
            "Couldn't change the owner of '{}' to {uid}:{gid}",
            path.display()
        )
    })?;
    Ok(())
}
