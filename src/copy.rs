//! Copying files and directory trees while keeping permissions and ownership.
//!
//! Symbolic links are skipped. A failed copy stops where it failed and leaves
//! whatever was already written in place.

use crate::tree::FileEntry;
use anyhow::{Context, Result, bail};
use path_clean::PathClean;
use std::fs::{self, File, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Copies a regular file and returns the number of bytes written.
///
/// If `dest` is an existing directory the file is copied into it under its
/// own name. Permission bits and uid/gid of `src` are applied to the copy.
///
/// # Errors
/// Returns an error if `src` is not a regular file or if any of the open,
/// create, write, chmod or chown steps fail.
pub fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    let source = FileEntry::resolve(src)?;
    if source.is_dir() {
        bail!("'{}' is a directory, not a file", src.display());
    }
    if !source.is_file() {
        bail!("'{}' is not a regular file", src.display());
    }

    let dest = if dest.is_dir() {
        let file_name = src
            .file_name()
            .with_context(|| format!("Invalid file name '{}'", src.display()))?;
        dest.join(file_name)
    } else {
        dest.to_path_buf()
    };
    if is_same_file(src, &dest)? {
        bail!(
            "'{}' and '{}' are the same file, refusing to copy it onto itself",
            src.display(),
            dest.display()
        );
    }

    let mut reader =
        File::open(src).with_context(|| format!("Couldn't open '{}'", src.display()))?;
    let mut writer =
        File::create(&dest).with_context(|| format!("Couldn't create '{}'", dest.display()))?;
    let bytes = io::copy(&mut reader, &mut writer).with_context(|| {
        format!(
            "Couldn't copy '{}' to '{}'",
            src.display(),
            dest.display()
        )
    })?;
    drop(writer);

    fs::set_permissions(&dest, Permissions::from_mode(source.permissions())).with_context(
        || {
            format!(
                "Couldn't preserve the permissions in the destination '{}'",
                dest.display()
            )
        },
    )?;
    chown(&dest, Some(source.uid), Some(source.gid)).with_context(|| {
        format!(
            "Couldn't preserve the ownership in the destination '{}'",
            dest.display()
        )
    })?;

    debug!("Copied {bytes} bytes from {} to {}", src.display(), dest.display());
    Ok(bytes)
}

/// True when `dest` exists and is the same inode as `src`.
fn is_same_file(src: &Path, dest: &Path) -> Result<bool> {
    let dest_metadata = match fs::metadata(dest) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("The path '{}' is invalid", dest.display()));
        }
    };
    let src_metadata = fs::metadata(src)
        .with_context(|| format!("Couldn't read the metadata of '{}'", src.display()))?;
    Ok(src_metadata.dev() == dest_metadata.dev() && src_metadata.ino() == dest_metadata.ino())
}

/// Recreates the directory `src` at `dest`, which must not exist yet.
///
/// Regular files are copied with [`copy_file`]; directories get the source's
/// permission bits and ownership. Symbolic links and special files are skipped.
///
/// # Errors
/// Returns an error if `src` is not a directory, if `dest` already exists, or
/// on the first entry that cannot be copied.
pub fn copy_directory(src: &Path, dest: &Path) -> Result<()> {
    let src = src.to_path_buf().clean();
    let dest = dest.to_path_buf().clean();

    let source = FileEntry::resolve(&src)?;
    if !source.is_dir() {
        bail!("'{}' is not a directory", src.display());
    }
    match fs::symlink_metadata(&dest) {
        Ok(_) => {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "Destination directory '{}' already exists, please delete it or use a different path",
                    dest.display()
                ),
            )
            .into());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("The path '{}' is invalid", dest.display()));
        }
    }

    info!("Copying directory {} to {}", src.display(), dest.display());

    // Permission bits of directories are applied once their contents are in,
    // so read-only source directories can still be filled.
    let mut directories: Vec<(PathBuf, u32)> = Vec::new();
    for entry in WalkDir::new(&src).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Couldn't walk '{}'", src.display()))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(&src)
            .with_context(|| format!("'{}' is outside of '{}'", path.display(), src.display()))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let metadata = entry
                .metadata()
                .with_context(|| format!("Couldn't read the metadata of '{}'", path.display()))?;
            let dir = FileEntry::from_metadata(path, &metadata);
            fs::create_dir_all(&target).with_context(|| {
                format!("Couldn't create a directory under '{}'", target.display())
            })?;
            chown(&target, Some(dir.uid), Some(dir.gid)).with_context(|| {
                format!(
                    "Couldn't preserve the ownership in the destination '{}'",
                    target.display()
                )
            })?;
            directories.push((target, dir.permissions()));
        } else if file_type.is_file() {
            copy_file(path, &target)?;
        } else {
            debug!("Skipping {}, only regular files and directories are copied", path.display());
        }
    }

    for (dir, mode) in directories.iter().rev() {
        fs::set_permissions(dir, Permissions::from_mode(*mode)).with_context(|| {
            format!(
                "Couldn't preserve the permissions in the destination '{}'",
                dir.display()
            )
        })?;
    }
    Ok(())
}

/// Copies a file or a directory, depending on what `src` is.
pub fn copy(src: &Path, dest: &Path) -> Result<()> {
    let source = FileEntry::resolve(src)?;
    if source.is_dir() {
        copy_directory(src, dest)
    } else if source.is_file() {
        copy_file(src, dest).map(|_| ())
    } else {
        bail!(
            "Couldn't copy '{}' because its file type is not supported",
            src.display()
        )
    }
}
