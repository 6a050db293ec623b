//! Fixtures shared by the table tests.

use std::io::{self, Write};

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::key::InternalKey;
use crate::sstable::{Reader, ReaderOptions, TableIter, Writer, WriterMetadata, WriterOptions};
use crate::vfs::{FileSystem, MemFs, WritableFile};

pub(crate) fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Parse `"user.KIND.seq"`.
pub(crate) fn ikey(text: &str) -> InternalKey {
    InternalKey::parse(text).unwrap()
}

/// Write `entries` (`"a.SET.1" → "value"`, or `"a.RANGEDEL.5" → "end"`)
/// to a new file and close it.
pub(crate) fn build(
    fs: &MemFs,
    name: &str,
    opts: WriterOptions,
    entries: &[(&str, &str)],
) -> WriterMetadata {
    let mut writer = Writer::new(fs.create(name).unwrap(), opts).unwrap();
    for (key, value) in entries {
        writer.add(&ikey(key), value.as_bytes()).unwrap();
    }
    writer.close().unwrap();
    writer.metadata().unwrap().clone()
}

/// Write `n` entries `key00000.SET.1 → value00000`, `key00002 …` with
/// every key an even number.
pub(crate) fn build_numbered(fs: &MemFs, name: &str, opts: WriterOptions, n: usize) {
    let mut writer = Writer::new(fs.create(name).unwrap(), opts).unwrap();
    for i in 0..n {
        let key = format!("key{:05}.SET.1", i * 2);
        writer
            .add(&ikey(&key), format!("value{:05}", i * 2).as_bytes())
            .unwrap();
    }
    writer.close().unwrap();
}

pub(crate) fn open(fs: &MemFs, name: &str, opts: ReaderOptions) -> Reader {
    Reader::open(fs.open(name).unwrap(), opts).unwrap()
}

/// `"user#seq,KIND=value"` for the current entry.
pub(crate) fn entry(iter: &TableIter) -> String {
    format!(
        "{}={}",
        iter.key().unwrap(),
        String::from_utf8_lossy(iter.value())
    )
}

/// Every entry, first to last.
pub(crate) fn scan(iter: &mut TableIter) -> Vec<String> {
    iter.entries()
        .map(|r| {
            let (key, value) = r.unwrap();
            format!("{key}={}", String::from_utf8_lossy(&value))
        })
        .collect()
}

/// Every entry, last to first.
pub(crate) fn scan_rev(iter: &mut TableIter) -> Vec<String> {
    let mut out = Vec::new();
    let mut more = iter.last().unwrap();
    while more {
        out.push(entry(iter));
        more = iter.prev().unwrap();
    }
    out
}

/// A file that accepts `budget` bytes and then fails every write.
pub(crate) struct FailingFile {
    pub(crate) budget: usize,
}

impl Write for FailingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.budget {
            return Err(io::Error::other("disk full"));
        }
        self.budget -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WritableFile for FailingFile {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
