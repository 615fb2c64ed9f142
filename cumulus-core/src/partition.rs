//! File partitioning
//!
//! Files above the partition threshold are cut into `ceil(size / threshold)`
//! near-equal ranges before erasure coding. The last range absorbs the
//! remainder of the integer division. The same `(size, threshold)` always
//! yields the same boundaries.

use crate::error::{CumulusError, Result};
use crate::scratch::ScratchDir;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// One contiguous byte range of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

/// Deterministic partition layout for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub file_size: u64,
    pub threshold: u64,
    pub ranges: Vec<PartitionRange>,
}

impl PartitionPlan {
    pub fn compute(file_size: u64, threshold: u64) -> Result<Self> {
        if threshold == 0 {
            return Err(CumulusError::Configuration(
                "partition threshold must be > 0".to_string(),
            ));
        }

        let ranges = if file_size <= threshold {
            vec![PartitionRange {
                index: 0,
                offset: 0,
                len: file_size,
            }]
        } else {
            let count = file_size.div_ceil(threshold);
            let chunk = file_size / count;
            (0..count)
                .map(|i| {
                    let offset = i * chunk;
                    let len = if i + 1 == count {
                        file_size - offset
                    } else {
                        chunk
                    };
                    PartitionRange {
                        index: i as u32,
                        offset,
                        len,
                    }
                })
                .collect()
        };

        Ok(Self {
            file_size,
            threshold,
            ranges,
        })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_split(&self) -> bool {
        self.ranges.len() > 1
    }
}

/// A partition ready for encoding
#[derive(Debug)]
pub enum PartitionFile {
    /// The file was small enough to be its own partition
    Whole { path: PathBuf, range: PartitionRange },
    /// A copied slice living in scratch space; deleted on drop
    Scratch { path: TempPath, range: PartitionRange },
}

impl PartitionFile {
    pub fn path(&self) -> &Path {
        match self {
            PartitionFile::Whole { path, .. } => path,
            PartitionFile::Scratch { path, .. } => path,
        }
    }

    pub fn range(&self) -> PartitionRange {
        match self {
            PartitionFile::Whole { range, .. } | PartitionFile::Scratch { range, .. } => *range,
        }
    }

    pub fn index(&self) -> u32 {
        self.range().index
    }

    pub fn len(&self) -> u64 {
        self.range().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole partition into memory
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path())?)
    }
}

/// Split `path` into partitions according to [`PartitionPlan`]
pub fn split_file(
    path: impl AsRef<Path>,
    threshold: u64,
    scratch: &ScratchDir,
) -> Result<Vec<PartitionFile>> {
    let path = path.as_ref();
    let file_size = std::fs::metadata(path)?.len();
    let plan = PartitionPlan::compute(file_size, threshold)?;

    if !plan.is_split() {
        return Ok(vec![PartitionFile::Whole {
            path: path.to_path_buf(),
            range: plan.ranges[0],
        }]);
    }

    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut source = File::open(path)?;
    let mut parts = Vec::with_capacity(plan.len());
    for range in &plan.ranges {
        source.seek(SeekFrom::Start(range.offset))?;
        let (mut out, temp) = scratch.create(&format!("{}.part{}", stem, range.index))?;
        let copied = io::copy(&mut (&mut source).take(range.len), &mut out)?;
        if copied != range.len {
            return Err(CumulusError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "partition {} short read: {} of {} bytes",
                    range.index, copied, range.len
                ),
            )));
        }
        out.flush()?;
        debug!(partition = range.index, offset = range.offset, len = range.len, "Wrote partition");
        parts.push(PartitionFile::Scratch {
            path: temp,
            range: *range,
        });
    }

    Ok(parts)
}

/// Append partition files to `out` in the given order
pub fn concat_partitions<'a, W: Write>(
    parts: impl IntoIterator<Item = &'a Path>,
    out: &mut W,
) -> Result<u64> {
    let mut total = 0;
    for part in parts {
        let mut file = File::open(part)?;
        total += io::copy(&mut file, out)?;
    }
    out.flush()?;
    Ok(total)
}
