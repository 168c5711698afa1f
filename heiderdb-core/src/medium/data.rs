use std::path::PathBuf;

use crate::medium::file::{File, Result};

/// The shared data file of a table.
///
/// Records are fixed-size and addressed by their byte position.
#[derive(Debug, Clone)]
pub(crate) struct DataFile {
    path: PathBuf,
    record_size: usize,
    force_sync: bool,
}

impl DataFile {
    #[inline]
    pub(crate) fn new(path: impl Into<PathBuf>, record_size: usize, force_sync: bool) -> Self {
        Self {
            path: path.into(),
            record_size,
            force_sync,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> Result<u64> {
        File::open(&self.path).map(|f| f.len())
    }

    /// Appends a serialized record and returns its position.
    pub(crate) fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut file = File::open(&self.path)?;
        let pos = file.append(bytes)?;
        self.finish(file)?;
        Ok(pos)
    }

    /// Reads the record stored at `pos`.
    pub(crate) fn read(&self, pos: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.record_size];
        File::open(&self.path)?.read_at(pos, &mut buf)?;
        Ok(buf)
    }

    /// Overwrites bytes starting at `pos`.
    pub(crate) fn write(&self, pos: u64, bytes: &[u8]) -> Result<()> {
        let mut file = File::open(&self.path)?;
        file.write_at(pos, bytes)?;
        self.finish(file)
    }

    pub(crate) fn truncate(&self, len: u64) -> Result<()> {
        let mut file = File::open(&self.path)?;
        file.truncate(len)?;
        self.finish(file)
    }

    /// Reads every record slot in the file, in physical order.
    pub(crate) fn scan(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut file = File::open(&self.path)?;
        let record_size = self.record_size as u64;
        let count = file.len() / record_size;

        let mut records = Vec::with_capacity(count as usize);
        for index in 0..count {
            let pos = index * record_size;
            let mut buf = vec![0; self.record_size];
            file.read_at(pos, &mut buf)?;
            records.push((pos, buf));
        }
        Ok(records)
    }

    /// Replaces the whole file with the given records, written contiguously.
    pub(crate) fn rewrite<'a, I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut file = File::create(&self.path)?;
        for bytes in records {
            file.append(bytes)?;
        }
        self.finish(file)
    }

    #[inline]
    fn finish(&self, mut file: File) -> Result<()> {
        if self.force_sync {
            file.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DataFile;
    use crate::medium::file::Result;

    #[test]
    fn test_data_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let data = DataFile::new(dir.path().join("t.dat"), 4, false);
        data.truncate(0)?;
        assert_eq!(data.len()?, 0);

        assert_eq!(data.append(b"aaaa")?, 0);
        assert_eq!(data.append(b"bbbb")?, 4);
        assert_eq!(data.append(b"cccc")?, 8);
        assert_eq!(data.read(4)?, b"bbbb");

        data.write(0, b"zzzz")?;
        let scanned = data.scan()?;
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[0], (0, b"zzzz".to_vec()));

        data.truncate(8)?;
        assert_eq!(data.len()?, 8);

        data.rewrite([b"cccc".as_slice(), b"aaaa".as_slice()])?;
        assert_eq!(data.read(0)?, b"cccc");
        assert_eq!(data.read(4)?, b"aaaa");
        // Reading past the end yields zeros.
        assert_eq!(data.read(8)?, vec![0; 4]);

        Ok(())
    }
}
