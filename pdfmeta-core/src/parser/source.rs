//! Random-access byte source
//!
//! Small files are read into memory, large files are memory-mapped. Both
//! backends expose the same bounds-checked view.

use super::{ParseError, ParseResult};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Files at or above this size are memory-mapped by default (8 MiB).
pub const DEFAULT_MMAP_THRESHOLD: u64 = 8 * 1024 * 1024;

enum Backend {
    Buffered(Vec<u8>),
    Mapped(Mmap),
}

/// Immutable view over the bytes of a PDF file.
pub struct ByteSource {
    backend: Backend,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backend {
            Backend::Buffered(_) => "buffered",
            Backend::Mapped(_) => "mapped",
        };
        f.debug_struct("ByteSource")
            .field("backend", &kind)
            .field("len", &self.len())
            .finish()
    }
}

impl ByteSource {
    /// Wrap bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            backend: Backend::Buffered(bytes.into()),
        }
    }

    /// Open a file, mapping it when it is at least `mmap_threshold` bytes long.
    pub fn open<P: AsRef<Path>>(path: P, mmap_threshold: u64) -> ParseResult<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        if size >= mmap_threshold && size > 0 {
            // SAFETY: the mapping is read-only and never outlives the source. Truncation
            // of the file by another process while mapped is outside our control.
            let mmap = unsafe { Mmap::map(&file)? };
            debug!(path = %path.as_ref().display(), size, "memory-mapped PDF");
            Ok(Self {
                backend: Backend::Mapped(mmap),
            })
        } else {
            let bytes = std::fs::read(path.as_ref())?;
            debug!(path = %path.as_ref().display(), size, "buffered PDF in memory");
            Ok(Self::from_bytes(bytes))
        }
    }

    /// File length, fixed at open time.
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backend, Backend::Mapped(_))
    }

    /// Whole file contents.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backend {
            Backend::Buffered(bytes) => bytes,
            Backend::Mapped(mmap) => mmap,
        }
    }

    /// Read `length` bytes at `offset`.
    pub fn read(&self, offset: u64, length: usize) -> ParseResult<&[u8]> {
        let size = self.len();
        let end = offset
            .checked_add(length as u64)
            .filter(|&end| end <= size)
            .ok_or(ParseError::OutOfBounds {
                offset,
                length,
                size,
            })?;
        Ok(&self.as_slice()[offset as usize..end as usize])
    }

    /// The last `n` bytes, or the whole file when it is shorter.
    pub fn tail(&self, n: usize) -> &[u8] {
        let data = self.as_slice();
        &data[data.len().saturating_sub(n)..]
    }
}
