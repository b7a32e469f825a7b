//! Sequential writer for a single segment's part file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writer for one segment's part file. Each segment owns its part file
/// exclusively, so writes are always sequential appends; no offset
/// coordination between segments is needed.
pub struct PartWriter {
    file: File,
    path: PathBuf,
}

impl PartWriter {
    /// Opens the part file for a segment. Truncates to empty when `downloaded`
    /// is 0 (fresh start or restart after a server ignored the range request);
    /// otherwise opens in append mode to continue a resumed download.
    pub fn open(path: &Path, downloaded: u64) -> Result<Self> {
        let file = if downloaded == 0 {
            File::options()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("failed to create part file: {}", path.display()))?
        } else {
            File::options()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("failed to open part file for append: {}", path.display()))?
        };
        Ok(PartWriter {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Appends a chunk of downloaded bytes.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("write failed for part file: {}", self.path.display()))?;
        Ok(())
    }

    /// Flushes file data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("part file sync failed")?;
        Ok(())
    }

    /// Truncates the part file to `len` bytes. Used to discard a partial
    /// tail chunk left by an interrupted write before resuming.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .context("failed to truncate part file")?;
        Ok(())
    }

    /// Path to this part file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn fresh_write_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.part0");
        std::fs::write(&path, b"stale").unwrap();

        let mut w = PartWriter::open(&path, 0).unwrap();
        w.write_chunk(b"hello").unwrap();
        w.sync().unwrap();

        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn resume_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.part0");
        std::fs::write(&path, b"hello").unwrap();

        let mut w = PartWriter::open(&path, 5).unwrap();
        w.write_chunk(b" world").unwrap();
        w.sync().unwrap();

        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[test]
    fn truncate_discards_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.part0");
        std::fs::write(&path, b"hello world").unwrap();

        let mut w = PartWriter::open(&path, 11).unwrap();
        w.truncate_to(5).unwrap();
        w.write_chunk(b"!").unwrap();
        w.sync().unwrap();

        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello!");
    }
}
