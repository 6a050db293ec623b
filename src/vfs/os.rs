//! Host filesystem rooted at a directory.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use memmap2::Mmap;
use tracing::trace;

use super::{FileSystem, ReadableFile, WritableFile, copy_range};

/// Files stored under a root directory.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    /// Use `root` as the directory that holds every file. The directory is
    /// created if missing.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Absolute path of `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl FileSystem for OsFs {
    fn create(&self, name: &str) -> io::Result<Box<dyn WritableFile>> {
        let file = File::create(self.path(name))?;
        trace!(name, "osfs create");
        Ok(Box::new(OsWritableFile {
            writer: BufWriter::new(file),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Arc<dyn ReadableFile>> {
        let file = File::open(self.path(name))?;
        let len = file.metadata()?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: tables are immutable once closed; the map is read-only
            // and every read is bounds-checked against its length.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Arc::new(OsReadableFile { mmap }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }
}

struct OsWritableFile {
    writer: BufWriter<File>,
}

impl Write for OsWritableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl WritableFile for OsWritableFile {
    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

struct OsReadableFile {
    mmap: Option<Mmap>,
}

impl ReadableFile for OsReadableFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        match &self.mmap {
            Some(mmap) => copy_range(mmap, offset, buf),
            None => copy_range(&[], offset, buf),
        }
    }

    fn size(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }
}
