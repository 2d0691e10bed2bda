//! Artifact persistence.
//!
//! Artifacts are written to a temporary file beside the destination and then
//! renamed over it. A reader of the destination sees either the previous
//! artifact or the complete new one, and a failed write leaves nothing behind.
//!
//! A stage that produces several artifacts stages each one as a
//! [`StagedFile`] and commits them only once all of them are ready.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Creates the destination's parent directories and returns the directory
/// the temporary file should live in.
fn prepare_parent(path: &Path) -> io::Result<&Path> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    Ok(parent)
}

/// Fully written contents waiting to replace `dest`. Dropping it without
/// committing removes the temporary file and leaves `dest` untouched.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    dest: PathBuf,
}

impl StagedFile {
    pub fn from_bytes(dest: &Path, contents: &[u8]) -> io::Result<Self> {
        let mut tmp = NamedTempFile::new_in(prepare_parent(dest)?)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        Ok(StagedFile {
            tmp,
            dest: dest.to_path_buf(),
        })
    }

    /// Stages a copy of `src`. Also returns the number of bytes copied.
    pub fn copy_from(src: &Path, dest: &Path) -> io::Result<(Self, u64)> {
        let mut input = fs::File::open(src)?;
        let mut tmp = NamedTempFile::new_in(prepare_parent(dest)?)?;
        let copied = io::copy(&mut input, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        Ok((
            StagedFile {
                tmp,
                dest: dest.to_path_buf(),
            },
            copied,
        ))
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Renames the staged file over its destination.
    pub fn commit(self) -> io::Result<()> {
        self.tmp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Writes `contents` to `path`, replacing any existing file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    StagedFile::from_bytes(path, contents)?.commit()
}
