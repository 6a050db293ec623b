//! In-memory filesystem.

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Arc, RwLock},
};

use tracing::trace;

use super::{FileSystem, ReadableFile, WritableFile, copy_range};

type Contents = Arc<RwLock<Vec<u8>>>;

/// A filesystem whose files live in process memory.
///
/// Cloning a `MemFs` yields a handle onto the same set of files.
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<RwLock<HashMap<String, Contents>>>,
}

impl MemFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one byte of an existing file. Used to simulate media
    /// corruption.
    pub fn corrupt_byte(
        &self,
        name: &str,
        offset: usize,
        f: impl FnOnce(u8) -> u8,
    ) -> io::Result<()> {
        let contents = self.lookup(name)?;
        let mut data = contents.write().map_err(|_| poisoned())?;
        let len = data.len();
        let byte = data.get_mut(offset).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {offset} beyond file size {len}"),
            )
        })?;
        *byte = f(*byte);
        Ok(())
    }

    /// Shorten an existing file to `len` bytes.
    pub fn truncate(&self, name: &str, len: usize) -> io::Result<()> {
        let contents = self.lookup(name)?;
        contents.write().map_err(|_| poisoned())?.truncate(len);
        Ok(())
    }

    fn lookup(&self, name: &str) -> io::Result<Contents> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("file not found: {name}"))
        })
    }
}

impl FileSystem for MemFs {
    fn create(&self, name: &str) -> io::Result<Box<dyn WritableFile>> {
        let contents: Contents = Arc::default();
        self.files
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), Arc::clone(&contents));
        trace!(name, "memfs create");
        Ok(Box::new(MemWritableFile { contents }))
    }

    fn open(&self, name: &str) -> io::Result<Arc<dyn ReadableFile>> {
        let contents = self.lookup(name)?;
        let data: Arc<[u8]> = contents.read().map_err(|_| poisoned())?.as_slice().into();
        Ok(Arc::new(MemReadableFile { data }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match self.files.write().map_err(|_| poisoned())?.remove(name) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {name}"),
            )),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }
}

struct MemWritableFile {
    contents: Contents,
}

impl Write for MemWritableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.contents
            .write()
            .map_err(|_| poisoned())?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WritableFile for MemWritableFile {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Snapshot of a file's bytes taken at open time.
struct MemReadableFile {
    data: Arc<[u8]>,
}

impl ReadableFile for MemReadableFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        copy_range(&self.data, offset, buf)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memfs lock poisoned")
}
