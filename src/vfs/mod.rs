//! File storage collaborators.
//!
//! The table engine never touches paths directly. A writer receives a
//! [`WritableFile`] and a reader a shared [`ReadableFile`]; both come from a
//! [`FileSystem`]. Two implementations are provided:
//!
//! - [`MemFs`] — in-memory files, used by tests and benchmarks.
//! - [`OsFs`] — files under a directory on the host filesystem. Reads are
//!   served from a read-only memory map.
//!
//! # Consistency
//!
//! A file opened for reading observes every byte written before the
//! writer's last [`WritableFile::sync`]. Table writers sync as the last step
//! of `close()`, so a reader opened afterwards sees the complete table.

mod mem;
mod os;


pub use mem::MemFs;
pub use os::OsFs;

use std::{io, sync::Arc};

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// Sequential writer for a new file.
pub trait WritableFile: io::Write + Send {
    /// Flush buffered bytes and make them durable.
    fn sync(&mut self) -> io::Result<()>;
}

/// Positioned reads over an immutable file.
pub trait ReadableFile: Send + Sync {
    /// Fill `buf` with the bytes at `offset`. Fails with
    /// [`io::ErrorKind::UnexpectedEof`] if the range extends past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// File length in bytes.
    fn size(&self) -> u64;
}

/// A namespace of files.
pub trait FileSystem: Send + Sync {
    /// Create (or truncate) `name` for writing.
    fn create(&self, name: &str) -> io::Result<Box<dyn WritableFile>>;

    /// Open `name` for positioned reads.
    fn open(&self, name: &str) -> io::Result<Arc<dyn ReadableFile>>;

    /// Delete `name`.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Whether `name` exists.
    fn exists(&self, name: &str) -> bool;
}

/// Copy `src[offset..offset + buf.len()]` into `buf`, bounds-checked.
pub(crate) fn copy_range(src: &[u8], offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let start = usize::try_from(offset).map_err(|_| out_of_range(offset, buf.len(), src.len()))?;
    let end = start
        .checked_add(buf.len())
        .filter(|&end| end <= src.len())
        .ok_or_else(|| out_of_range(offset, buf.len(), src.len()))?;
    buf.copy_from_slice(&src[start..end]);
    Ok(())
}

fn out_of_range(offset: u64, len: usize, size: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} exceeds file size {size}"),
    )
}
