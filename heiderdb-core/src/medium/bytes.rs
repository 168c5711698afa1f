use std::{ops::Range, result};

use thiserror::Error;

pub(crate) type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("bytes are not enough: need {need} at offset {offset}, have {len}")]
    Size {
        offset: usize,
        need: usize,
        len: usize,
    },
}

#[inline]
fn check_range(offset: usize, need: usize, len: usize) -> Result<Range<usize>> {
    match offset.checked_add(need) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(Error::Size { offset, need, len }),
    }
}

/// A forward-only reader over a byte slice.
///
/// All multi-byte integers are little-endian.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    #[inline]
    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let range = check_range(self.offset, len, self.bytes.len())?;
        self.offset = range.end;
        Ok(&self.bytes[range])
    }

    #[inline]
    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    #[inline]
    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.take(1).map(|b| b[0])
    }

    #[inline]
    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    #[inline]
    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    #[inline]
    pub(crate) fn i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_le_bytes)
    }

    #[inline]
    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }
}

/// A forward-only writer into a mutable byte slice.
pub(crate) struct Writer<'a> {
    bytes: &'a mut [u8],
    offset: usize,
}

impl<'a> Writer<'a> {
    #[inline]
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    #[inline]
    pub(crate) fn put(&mut self, slice: &[u8]) -> Result<()> {
        let range = check_range(self.offset, slice.len(), self.bytes.len())?;
        self.offset = range.end;
        self.bytes[range].copy_from_slice(slice);
        Ok(())
    }

    #[inline]
    pub(crate) fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    #[inline]
    pub(crate) fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    #[inline]
    pub(crate) fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    #[inline]
    pub(crate) fn put_i64(&mut self, value: i64) -> Result<()> {
        self.put(&value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Reader, Result, Writer};

    #[test]
    fn test_read_write() -> Result<()> {
        let mut bytes = [0u8; 23];

        let mut writer = Writer::new(&mut bytes);
        writer.put_u8(7)?;
        writer.put(&[0xEF, 0xBE])?;
        writer.put_u32(42)?;
        writer.put_u64(u64::MAX - 1)?;
        writer.put_i64(-5)?;
        assert!(writer.put_u8(0).is_err());
        assert_eq!(bytes[1..3], [0xEF, 0xBE]);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.u8()?, 7);
        reader.skip(2)?;
        assert_eq!(reader.u32()?, 42);
        assert_eq!(reader.u64()?, u64::MAX - 1);
        assert_eq!(reader.i64()?, -5);
        assert!(reader.take(1).is_err());

        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        let mut bytes = [0u8; 3];
        assert!(matches!(
            Writer::new(&mut bytes).put_u32(1),
            Err(Error::Size { need: 4, len: 3, .. })
        ));
        assert!(Reader::new(&bytes).u64().is_err());
    }
}
