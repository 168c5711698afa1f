use std::{
    fs,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    result,
};

use thiserror::Error;

pub(crate) type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("offset {offset} is beyond the end of the file ({len} bytes)")]
    OutOfBounds { offset: u64, len: u64 },
    #[error(transparent)]
    IO(#[from] io::Error),
}

/// A handle to a file stored on disk.
///
/// Handles are short-lived: every index operation opens the files it needs,
/// does its work and drops them again.
pub(crate) struct File {
    inner: fs::File,
    len: u64,
}

impl File {
    /// Opens the file for reading and writing, creating it (and all of its parent
    /// directories) if it does not exist.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create all necessary intermediate directories.
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let inner = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = inner.metadata()?.len();
        Ok(Self { inner, len })
    }

    /// Creates the file, discarding any previous content.
    pub(crate) fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = Self::open(path)?;
        file.truncate(0)?;
        Ok(file)
    }

    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// Bytes past the end of the file read as zero.
    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        buf.fill(0);
        if offset >= self.len {
            return Ok(0);
        }

        let available = ((self.len - offset) as usize).min(buf.len());
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut buf[..available])?;
        Ok(available)
    }

    /// Writes the whole slice at `offset`, extending the file if needed.
    pub(crate) fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if offset > self.len {
            return Err(Error::OutOfBounds {
                offset,
                len: self.len,
            });
        }

        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        self.len = self.len.max(offset + bytes.len() as u64);
        Ok(())
    }

    /// Appends the slice at the end of the file and returns the offset it was written at.
    #[inline]
    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let offset = self.len;
        self.write_at(offset, bytes)?;
        Ok(offset)
    }

    #[inline]
    pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
        self.inner.set_len(len)?;
        self.len = len;
        Ok(())
    }

    #[inline]
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.inner.sync_all().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::{File, Result};

    #[test]
    fn test_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/dir/file.bin");

        let mut file = File::open(&path)?;
        assert_eq!(file.len(), 0);

        assert_eq!(file.append(b"hello")?, 0);
        assert_eq!(file.append(b"world")?, 5);
        assert_eq!(file.len(), 10);

        file.write_at(5, b"WORLD")?;
        assert!(file.write_at(11, b"x").is_err());

        let mut buf = [0xAAu8; 8];
        assert_eq!(file.read_at(6, &mut buf)?, 4);
        assert_eq!(&buf, b"ORLD\0\0\0\0");

        file.truncate(5)?;
        let mut file = File::open(&path)?;
        assert_eq!(file.len(), 5);

        let mut buf = [0u8; 5];
        file.read_at(0, &mut buf)?;
        assert_eq!(&buf, b"hello");

        Ok(())
    }
}
