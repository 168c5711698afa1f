use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    error::Result,
    medium::{
        bytes::{self, Reader, Writer},
        File,
    },
    meta::ValidationError,
};

/// A unique identifier for a page in a page file.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct PageId(u32);

impl PageId {
    /// Marks the absence of a page in on-disk links.
    pub(crate) const NONE_RAW: u32 = u32::MAX;

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) const fn raw(&self) -> u32 {
        self.0
    }

    /// Increments the page id by one.
    #[inline]
    pub(crate) fn incr(&mut self) -> PageId {
        let res = *self;
        self.0 += 1;
        res
    }

    #[inline]
    pub(crate) fn from_link(raw: u32) -> Option<Self> {
        (raw != Self::NONE_RAW).then_some(Self(raw))
    }

    #[inline]
    pub(crate) fn to_link(id: Option<Self>) -> u32 {
        id.map_or(Self::NONE_RAW, |id| id.0)
    }
}

impl From<u32> for PageId {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// The kind of structure stored in a page, recorded in every page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PageKind {
    Leaf = 1,
    Branch = 2,
    Bucket = 3,
    Data = 4,
    Overflow = 5,
}

impl PageKind {
    #[inline]
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Leaf),
            2 => Some(Self::Branch),
            3 => Some(Self::Bucket),
            4 => Some(Self::Data),
            5 => Some(Self::Overflow),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub(crate) enum PageError {
    #[error("page {id} of {path:?} fails its checksum")]
    ChecksumMismatched { id: u32, path: PathBuf },
    #[error("page {id} of {path:?} has kind {found}, expected one of {expected:?}")]
    KindMismatched {
        id: u32,
        path: PathBuf,
        found: u8,
        expected: Vec<PageKind>,
    },
    #[error("page {id} of {path:?} is beyond the end of the file")]
    Missing { id: u32, path: PathBuf },
    #[error("slot {slot} of {path:?} is linked but holds no entry")]
    BrokenLink { slot: u64, path: PathBuf },
    #[error("page layout is invalid: {0}")]
    Layout(#[from] bytes::Error),
}

/// Represents the fundamental unit of index storage.
///
/// # Structure
///
/// ```plain
/// ┌──────────┬──────┬──────────┬───────┬──────┬─────┬────────────────┐
/// │ Checksum │ Kind │ Reserved │ Count │ Link │ Aux │      Body      │
/// └──────────┴──────┴──────────┴───────┴──────┴─────┴────────────────┘
///      4        1        3         4       4     4
/// ```
///
/// The checksum is the CRC32 of every byte that follows it.
#[derive(Debug)]
pub(crate) struct Page {
    kind: PageKind,
    pub(crate) count: u32,
    pub(crate) link: u32,
    pub(crate) aux: u32,
    body: Vec<u8>,
}

impl Page {
    /// The size of the page header in bytes.
    pub(crate) const HEADER_SIZE: usize = 20;

    #[inline]
    pub(crate) fn new(kind: PageKind, page_size: u32) -> Self {
        Self {
            kind,
            count: 0,
            link: PageId::NONE_RAW,
            aux: 0,
            body: vec![0; page_size as usize - Self::HEADER_SIZE],
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> PageKind {
        self.kind
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub(crate) fn reader(&self) -> Reader {
        Reader::new(&self.body)
    }

    /// Clears the body and returns a writer positioned at its start.
    #[inline]
    pub(crate) fn writer(&mut self) -> Writer {
        self.body.fill(0);
        Writer::new(&mut self.body)
    }

    fn to_bytes(&self) -> bytes::Result<Vec<u8>> {
        let mut bytes = vec![0; Self::HEADER_SIZE + self.body.len()];
        {
            let mut writer = Writer::new(&mut bytes[4..]);
            writer.put_u8(self.kind as u8)?;
            writer.put(&[0; 3])?;
            writer.put_u32(self.count)?;
            writer.put_u32(self.link)?;
            writer.put_u32(self.aux)?;
            writer.put(&self.body)?;
        }
        let checksum = crc32fast::hash(&bytes[4..]);
        bytes[..4].copy_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }
}

/// A file of fixed-size pages, each addressed by `id * page_size`.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    path: PathBuf,
    page_size: u32,
    force_sync: bool,
}

impl Storage {
    #[inline]
    pub(crate) fn new(path: impl Into<PathBuf>, page_size: u32, force_sync: bool) -> Self {
        Self {
            path: path.into(),
            page_size,
            force_sync,
        }
    }

    #[inline]
    pub(crate) fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The number of pages currently held by the file.
    #[inline]
    pub(crate) fn page_count(&self) -> Result<u32> {
        let len = File::open(&self.path)?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Checks that the file holds at least the `count` pages its metadata claims.
    pub(crate) fn expect_pages(&self, count: u32) -> Result<()> {
        if self.page_count()? < count {
            return Err(ValidationError::Inconsistent {
                path: self.path.clone(),
                reason: "the page file is shorter than its metadata claims",
            }
            .into());
        }
        Ok(())
    }

    /// Reads and validates the page with the given id.
    pub(crate) fn read(&self, id: PageId, expected: &[PageKind]) -> Result<Page> {
        let mut file = File::open(&self.path)?;
        let offset = self.offset(id);
        if offset + self.page_size as u64 > file.len() {
            return Err(PageError::Missing {
                id: id.raw(),
                path: self.path.clone(),
            }
            .into());
        }

        let mut bytes = vec![0; self.page_size as usize];
        file.read_at(offset, &mut bytes)?;
        self.decode(id, &bytes, expected).map_err(Into::into)
    }

    /// Writes the page at the given id, growing the file if needed.
    pub(crate) fn write(&self, id: PageId, page: &Page) -> Result<()> {
        let mut file = File::open(&self.path)?;
        let offset = self.offset(id);

        // Fill any gap with zeroed pages, which will never pass validation.
        if offset > file.len() {
            let gap = vec![0; (offset - file.len()) as usize];
            file.append(&gap)?;
        }

        file.write_at(offset, &page.to_bytes().map_err(PageError::from)?)?;
        if self.force_sync {
            file.sync()?;
        }
        Ok(())
    }

    /// Discards every page from `count` onwards.
    #[inline]
    pub(crate) fn truncate(&self, count: u32) -> Result<()> {
        let mut file = File::open(&self.path)?;
        file.truncate(count as u64 * self.page_size as u64)?;
        Ok(())
    }

    #[inline]
    fn offset(&self, id: PageId) -> u64 {
        id.raw() as u64 * self.page_size as u64
    }

    fn decode(&self, id: PageId, bytes: &[u8], expected: &[PageKind]) -> Result<Page, PageError> {
        let mut reader = Reader::new(bytes);
        let checksum = reader.u32()?;
        if checksum != crc32fast::hash(&bytes[4..]) {
            return Err(PageError::ChecksumMismatched {
                id: id.raw(),
                path: self.path.clone(),
            });
        }

        let raw_kind = reader.u8()?;
        let kind = PageKind::from_raw(raw_kind)
            .filter(|k| expected.contains(k))
            .ok_or_else(|| PageError::KindMismatched {
                id: id.raw(),
                path: self.path.clone(),
                found: raw_kind,
                expected: expected.to_vec(),
            })?;

        reader.skip(3)?;
        let count = reader.u32()?;
        let link = reader.u32()?;
        let aux = reader.u32()?;
        let body = reader.take(bytes.len() - Page::HEADER_SIZE)?.to_vec();

        Ok(Page {
            kind,
            count,
            link,
            aux,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageId, PageKind, Storage};
    use crate::{error::Result, medium::File, ErrorCode};

    #[test]
    fn test_page_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path().join("pages.dat"), 64, false);

        let mut page = Page::new(PageKind::Leaf, 64);
        page.count = 3;
        page.link = 9;
        page.aux = 2;
        page.writer().put(b"payload")?;

        storage.write(PageId::from_raw(2), &page)?;
        assert_eq!(storage.page_count()?, 3);
        storage.expect_pages(3)?;
        assert_eq!(
            storage.expect_pages(4).unwrap_err().code(),
            ErrorCode::FileUnexpected
        );

        let read = storage.read(PageId::from_raw(2), &[PageKind::Leaf, PageKind::Branch])?;
        assert_eq!(read.kind(), PageKind::Leaf);
        assert_eq!((read.count, read.link, read.aux), (3, 9, 2));
        assert_eq!(&read.body()[..7], b"payload");

        // The gap pages are zeroed and rejected.
        let err = storage.read(PageId::from_raw(0), &[PageKind::Leaf]).unwrap_err();
        assert!(matches!(err.code(), ErrorCode::CorruptPage));

        let err = storage.read(PageId::from_raw(2), &[PageKind::Bucket]).unwrap_err();
        assert!(matches!(err.code(), ErrorCode::CorruptPage));

        Ok(())
    }

    #[test]
    fn test_checksum_detects_damage() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pages.dat");
        let storage = Storage::new(&path, 32, false);

        let mut page = Page::new(PageKind::Bucket, 32);
        page.count = 1;
        storage.write(PageId::from_raw(0), &page)?;

        File::open(&path)?.write_at(10, &[0xFF])?;
        let err = storage.read(PageId::from_raw(0), &[PageKind::Bucket]).unwrap_err();
        assert!(matches!(err.code(), ErrorCode::CorruptPage));

        Ok(())
    }
}
