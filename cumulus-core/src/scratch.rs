//! Scratch space for partitions and pieces
//!
//! Every file created here is owned by a [`TempPath`] guard and removed when
//! the guard drops, so success, error and cancellation paths all clean up.

use crate::error::Result;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};

/// Directory holding transient upload/download files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root` as scratch space, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create an empty scratch file whose name starts with `prefix`
    pub fn create(&self, prefix: &str) -> Result<(File, TempPath)> {
        let file = Builder::new()
            .prefix(&format!("{}.", sanitize(prefix)))
            .tempfile_in(&self.root)?;
        Ok(file.into_parts())
    }

    /// Write `data` to a new scratch file
    pub fn write(&self, prefix: &str, data: &[u8]) -> Result<TempPath> {
        let (mut file, path) = self.create(prefix)?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(path)
    }

    /// Number of entries currently in the scratch directory
    pub fn entry_count(&self) -> Result<usize> {
        Ok(std::fs::read_dir(&self.root)?.count())
    }
}

fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
