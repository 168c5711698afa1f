use std::path::Path;

use crate::{
    error::Result,
    medium::{
        bytes::{Reader, Writer},
        File,
    },
    record::{self, Value},
    schema::ColumnType,
};

/// A live `(key, position)` entry with the head (or next node) of its overflow chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub(crate) key: Value,
    pub(crate) pos: u64,
    pub(crate) next: Option<u64>,
}

impl Entry {
    #[inline]
    pub(crate) fn new(key: Value, pos: u64) -> Self {
        Self {
            key,
            pos,
            next: None,
        }
    }
}

/// A file of fixed-size entry slots, used both for the main area and for overflow nodes.
///
/// # Structure
///
/// ```plain
/// ┌──────┬─────┬──────────┬──────┐
/// │ Live │ Key │ Position │ Next │
/// └──────┴─────┴──────────┴──────┘
///    1            u64       i64
/// ```
///
/// `Next` is the slot of the next overflow node, or -1. A slot of all zero bytes is a
/// tombstone, the live byte keeps every live slot from being all zero.
pub(crate) struct Area {
    file: File,
    key_type: ColumnType,
}

impl Area {
    #[inline]
    pub(crate) fn open(path: impl AsRef<Path>, key_type: ColumnType) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            key_type,
        })
    }

    #[inline]
    pub(crate) fn entry_size(key_type: ColumnType) -> usize {
        1 + key_type.width() + 8 + 8
    }

    #[inline]
    fn size(&self) -> u64 {
        Self::entry_size(self.key_type) as u64
    }

    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.file.len() / self.size()
    }

    /// Reads the slot at `index`, `None` if it is a tombstone.
    pub(crate) fn get(&mut self, index: u64) -> Result<Option<Entry>> {
        let mut bytes = vec![0; self.size() as usize];
        self.file.read_at(index * self.size(), &mut bytes)?;

        let mut reader = Reader::new(&bytes);
        if reader.u8()? == 0 {
            return Ok(None);
        }
        let key = record::decode_key(self.key_type, reader.take(self.key_type.width())?);
        let pos = reader.u64()?;
        let next = u64::try_from(reader.i64()?).ok();
        Ok(Some(Entry { key, pos, next }))
    }

    pub(crate) fn set(&mut self, index: u64, entry: &Entry) -> Result<()> {
        let bytes = self.encode(entry)?;
        self.file.write_at(index * self.size(), &bytes)?;
        Ok(())
    }

    /// Appends an entry and returns its slot.
    pub(crate) fn push(&mut self, entry: &Entry) -> Result<u64> {
        let bytes = self.encode(entry)?;
        let offset = self.file.append(&bytes)?;
        Ok(offset / self.size())
    }

    pub(crate) fn bury(&mut self, index: u64) -> Result<()> {
        let zeros = vec![0; self.size() as usize];
        self.file.write_at(index * self.size(), &zeros)?;
        Ok(())
    }

    #[inline]
    pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.truncate(len * self.size())?;
        Ok(())
    }

    #[inline]
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.file.sync()?;
        Ok(())
    }

    fn encode(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.size() as usize];
        let mut key_bytes = vec![0; self.key_type.width()];
        record::encode_key(self.key_type, &entry.key, &mut key_bytes)?;

        let mut writer = Writer::new(&mut bytes);
        writer.put_u8(1)?;
        writer.put(&key_bytes)?;
        writer.put_u64(entry.pos)?;
        writer.put_i64(entry.next.map_or(-1, |n| n as i64))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{Area, Entry};
    use crate::{error::Result, record::Value, schema::ColumnType};

    #[test]
    fn test_area() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut area = Area::open(dir.path().join("area.dat"), ColumnType::Int)?;
        assert_eq!(Area::entry_size(ColumnType::Int), 21);

        // A zero key and position still make a live entry.
        let zero = Entry::new(Value::Int(0), 0);
        assert_eq!(area.push(&zero)?, 0);

        let mut entry = Entry::new(Value::Int(7), 84);
        entry.next = Some(3);
        assert_eq!(area.push(&entry)?, 1);
        assert_eq!(area.len(), 2);

        assert_eq!(area.get(0)?, Some(zero));
        assert_eq!(area.get(1)?, Some(entry));

        area.bury(0)?;
        assert_eq!(area.get(0)?, None);

        area.truncate(1)?;
        assert_eq!(area.len(), 1);

        Ok(())
    }
}
