//! Point-in-time snapshots of files and directory trees.
//!
//! A [`DirectoryTree`] is built by walking the filesystem when it is requested
//! and is dropped once the caller is done with it; nothing is cached.

use anyhow::{Context, Result};
use std::fs::{self, FileType, Metadata};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The kind of filesystem object a [`FileEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl From<FileType> for FileKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        }
    }
}

/// A path plus the POSIX metadata labkit cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Raw `st_mode`, file type bits included.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl FileEntry {
    /// Snapshots `path` without following a trailing symbolic link.
    pub fn inspect(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path)
            .with_context(|| format!("Couldn't read the metadata of '{}'", path.display()))?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Snapshots `path`, following symbolic links.
    pub fn resolve(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Couldn't read the metadata of '{}'", path.display()))?;
        Ok(Self::from_metadata(path, &metadata))
    }

    pub(crate) fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: metadata.file_type().into(),
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.len(),
        }
    }

    /// Permission bits only (`rwx` for user/group/other plus setuid, setgid and sticky).
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// A rooted tree of [`FileEntry`] nodes.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    pub entry: FileEntry,
    pub children: Vec<DirectoryTree>,
}

impl DirectoryTree {
    /// Walks `root` (symbolic links are not followed) and returns the tree.
    ///
    /// Children are ordered by file name.
    pub fn walk(root: &Path) -> Result<Self> {
        let mut stack: Vec<DirectoryTree> = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("Couldn't walk the directory '{}'", root.display()))?;
            let metadata = entry.metadata().with_context(|| {
                format!("Couldn't read the metadata of '{}'", entry.path().display())
            })?;
            let node = DirectoryTree {
                entry: FileEntry::from_metadata(entry.path(), &metadata),
                children: Vec::new(),
            };

            // walkdir yields entries depth first, so everything deeper than the
            // new entry is complete and can be attached to its parent.
            while stack.len() > entry.depth() {
                attach_top(&mut stack);
            }
            stack.push(node);
        }

        while stack.len() > 1 {
            attach_top(&mut stack);
        }
        stack
            .pop()
            .with_context(|| format!("Nothing found under '{}'", root.display()))
    }

    /// Number of direct entries of the root.
    pub fn file_count(&self) -> usize {
        self.children.len()
    }

    /// Sum of the sizes of every non-directory entry in the tree.
    pub fn total_size(&self) -> u64 {
        let own = if self.entry.is_dir() {
            0
        } else {
            self.entry.size
        };
        own + self.children.iter().map(DirectoryTree::total_size).sum::<u64>()
    }

    /// Every entry in the tree, root first, in walk order.
    pub fn entries(&self) -> Vec<&FileEntry> {
        let mut out = vec![&self.entry];
        for child in &self.children {
            out.extend(child.entries());
        }
        out
    }
}

fn attach_top(stack: &mut Vec<DirectoryTree>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}
