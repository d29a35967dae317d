//! Gzip-compressed tar archives.

use anyhow::{Context, Result, bail};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Location of an archive written by [`create_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath(PathBuf);

impl ArchivePath {
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ArchivePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Writes a `.tar.gz` at `output` holding every path in `inputs`.
///
/// A file is stored under its own name. A directory is walked and each entry,
/// the directory itself included, is stored under the directory's name
/// followed by its path relative to the directory. Headers carry the mode,
/// ownership and timestamps reported by the OS.
///
/// # Errors
/// Fails on the first input or entry that cannot be read; the partially
/// written archive is left as is.
pub fn create_archive<P: AsRef<Path>>(output: &Path, inputs: &[P]) -> Result<ArchivePath> {
    let file = File::create(output)
        .with_context(|| format!("Couldn't create archive '{}'", output.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for input in inputs {
        let input = input.as_ref();
        add_to_archive(&mut builder, input).with_context(|| {
            format!(
                "Couldn't add '{}' to archive '{}'",
                input.display(),
                output.display()
            )
        })?;
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .and_then(|mut file| file.flush())
        .with_context(|| format!("Couldn't finish archive '{}'", output.display()))?;

    info!("Created archive {} from {} input(s)", output.display(), inputs.len());
    Ok(ArchivePath(output.to_path_buf()))
}

fn add_to_archive<W: Write>(builder: &mut Builder<W>, input: &Path) -> Result<()> {
    let base = entry_base_name(input)?;
    let metadata = fs::metadata(input)
        .with_context(|| format!("The path '{}' is invalid", input.display()))?;

    if !metadata.is_dir() {
        return append_entry(builder, input, &base);
    }

    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(input)?;
        let name = base.join(rel);
        append_entry(builder, entry.path(), &name)?;
    }
    Ok(())
}

/// Name an input is stored under. Paths such as `.` or `dir/..` have no last
/// component of their own, so the name of the directory they point to is used.
fn entry_base_name(input: &Path) -> Result<PathBuf> {
    if let Some(name) = input.file_name() {
        return Ok(PathBuf::from(name));
    }
    let resolved = input
        .canonicalize()
        .with_context(|| format!("The path '{}' is invalid", input.display()))?;
    resolved
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("Couldn't determine the name of '{}'", input.display()))
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &Path, name: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("Couldn't read the metadata of '{}'", path.display()))?;
    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);

    let file_type = metadata.file_type();
    if file_type.is_file() {
        let file = File::open(path).with_context(|| format!("Couldn't open '{}'", path.display()))?;
        append_contents(builder, &mut header, name, path, file)?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        builder.append_link(&mut header, name, target)?;
    } else {
        builder.append_data(&mut header, name, io::empty())?;
    }
    debug!("Archived {} as {}", path.display(), name.display());
    Ok(())
}

/// Appends exactly the number of bytes the header declares.
///
/// A file that changed size since its metadata was read would leave the
/// archive unreadable past this entry, so it is an error either way.
fn append_contents<W: Write, R: Read>(
    builder: &mut Builder<W>,
    header: &mut Header,
    name: &Path,
    path: &Path,
    reader: R,
) -> Result<()> {
    let size = header.size()?;
    let mut limited = reader.take(size);
    builder.append_data(header, name, &mut limited)?;
    if limited.limit() != 0 {
        bail!(
            "'{}' shrank while it was archived: {} of {size} bytes read",
            path.display(),
            size - limited.limit()
        );
    }
    let mut extra = [0u8; 1];
    let more = limited
        .into_inner()
        .read(&mut extra)
        .with_context(|| format!("Couldn't read '{}'", path.display()))?;
    if more != 0 {
        bail!(
            "'{}' grew while it was archived, it is larger than the {size} bytes recorded",
            path.display()
        );
    }
    Ok(())
}

/// Names of the entries in a `.tar.gz`, in archive order.
pub fn list_archive(path: &Path) -> Result<Vec<String>> {
    let file =
        File::open(path).with_context(|| format!("Couldn't open archive '{}'", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in archive
        .entries()
        .with_context(|| format!("Couldn't read archive '{}'", path.display()))?
    {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().trim_end_matches('/').to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_create_archive_names() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "notes").unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("a.txt"), "a").unwrap();
        fs::write(data.join("sub").join("b.txt"), "b").unwrap();

        let output = dir.path().join("out.tar.gz");
        let archive = create_archive(&output, &[&file, &data]).unwrap();
        assert_eq!(archive.path(), output);

        let names = list_archive(&output).unwrap();
        assert_eq!(
            names,
            ["notes.txt", "data", "data/a.txt", "data/sub", "data/sub/b.txt"]
        );
    }

    #[test]
    fn test_create_archive_keeps_mode() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("script.sh");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o750)).unwrap();
        let output = dir.path().join("out.tar.gz");
        create_archive(&output, &[&file]).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&output).unwrap()));
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.header().mode().unwrap() & 0o777, 0o750);
        assert_eq!(entry.header().size().unwrap(), 10);
    }

    #[test]
    fn test_create_archive_missing_input() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.tar.gz");
        let err = create_archive(&output, &[dir.path().join("missing")]).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("Couldn't add"));
        assert!(msg.contains("is invalid"));
    }

    #[test]
    fn test_list_archive_missing() {
        let dir = tempdir().unwrap();
        assert!(list_archive(&dir.path().join("none.tar.gz")).is_err());
    }

    fn header_for(size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header
    }

    #[test]
    fn test_append_contents_exact_size() {
        let mut builder = Builder::new(Vec::new());
        let mut header = header_for(5);
        append_contents(
            &mut builder,
            &mut header,
            Path::new("service.log"),
            Path::new("logs/service.log"),
            io::Cursor::new(b"hello".to_vec()),
        )
        .unwrap();

        let bytes = builder.into_inner().unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_append_contents_rejects_file_that_grew() {
        let mut builder = Builder::new(Vec::new());
        let mut header = header_for(5);
        let err = append_contents(
            &mut builder,
            &mut header,
            Path::new("service.log"),
            Path::new("logs/service.log"),
            io::Cursor::new(b"hello, a line appended later".to_vec()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("grew while it was archived"));
    }

    #[test]
    fn test_append_contents_rejects_file_that_shrank() {
        let mut builder = Builder::new(Vec::new());
        let mut header = header_for(5);
        let err = append_contents(
            &mut builder,
            &mut header,
            Path::new("service.log"),
            Path::new("logs/service.log"),
            io::Cursor::new(b"he".to_vec()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("shrank while it was archived"));
        assert!(err.to_string().contains("2 of 5 bytes"));
    }

    #[test]
    fn test_create_archive_parent_reference_input() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("a.txt"), "a").unwrap();
        let output = dir.path().join("out.tar.gz");

        create_archive(&output, &[data.join("sub").join("..")]).unwrap();
        assert_eq!(
            list_archive(&output).unwrap(),
            ["data", "data/a.txt", "data/sub"]
        );
    }
}
