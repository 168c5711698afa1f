use crate::{
    error::Result,
    record::{self, Value},
    schema::ColumnType,
    storage::{Page, PageId, PageKind, Storage},
};

/// Maps a key onto the integer the directory bits are taken from.
pub(crate) fn hash(key: &Value) -> i64 {
    match key {
        Value::Int(v) => *v as i64,
        Value::Date(v) => *v,
        Value::Float(v) => (*v * 1000.0) as i64,
        Value::Boolean(v) => *v as i64,
        Value::Varchar(v) => v.chars().map(|c| c as i64).sum(),
    }
}

/// A fixed-capacity array of `(key, position)` entries.
///
/// The page header carries the number of entries in `count`, the next overflow
/// bucket in `link` and the local depth in `aux`.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    pub(crate) id: PageId,
    pub(crate) local_depth: u32,
    pub(crate) entries: Vec<(Value, u64)>,
    pub(crate) overflow: Option<PageId>,
}

impl Bucket {
    #[inline]
    pub(crate) fn new(id: PageId, local_depth: u32) -> Self {
        Self {
            id,
            local_depth,
            entries: Vec::new(),
            overflow: None,
        }
    }

    #[inline]
    pub(crate) fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub(crate) fn read(storage: &Storage, id: PageId, key_type: ColumnType) -> Result<Self> {
        let page = storage.read(id, &[PageKind::Bucket])?;
        let mut reader = page.reader();
        let entries = (0..page.count)
            .map(|_| {
                let key = record::decode_key(key_type, reader.take(key_type.width())?);
                Ok((key, reader.u64()?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            local_depth: page.aux,
            entries,
            overflow: PageId::from_link(page.link),
        })
    }

    pub(crate) fn write(&self, storage: &Storage, key_type: ColumnType) -> Result<()> {
        let mut page = Page::new(PageKind::Bucket, storage.page_size());
        page.count = self.entries.len() as u32;
        page.link = PageId::to_link(self.overflow);
        page.aux = self.local_depth;

        let mut writer = page.writer();
        let mut key_bytes = vec![0; key_type.width()];
        for (key, pos) in &self.entries {
            record::encode_key(key_type, key, &mut key_bytes)?;
            writer.put(&key_bytes)?;
            writer.put_u64(*pos)?;
        }

        storage.write(self.id, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::{hash, Bucket};
    use crate::{error::Result, record::Value, schema::ColumnType, storage::Storage};

    #[test]
    fn test_hash() {
        assert_eq!(hash(&Value::Int(-7)), -7);
        assert_eq!(hash(&Value::Float(1.2345)), 1234);
        assert_eq!(hash(&Value::Boolean(true)), 1);
        assert_eq!(hash(&Value::from("ab")), 97 + 98);
        // Anagrams collide.
        assert_eq!(hash(&Value::from("ba")), hash(&Value::from("ab")));
    }

    #[test]
    fn test_bucket() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path().join("buckets.dat"), 64, false);
        let key_type = ColumnType::Varchar(4);

        let mut bucket = Bucket::new(3.into(), 2);
        bucket.entries = vec![(Value::from("ab"), 0), (Value::from("wxyz"), 16)];
        bucket.overflow = Some(5.into());
        bucket.write(&storage, key_type)?;

        let read = Bucket::read(&storage, 3.into(), key_type)?;
        assert_eq!(read.local_depth, 2);
        assert_eq!(read.entries, bucket.entries);
        assert_eq!(read.overflow, Some(5.into()));
        assert_eq!(read.position(&Value::from("wxyz")), Some(1));

        Ok(())
    }
}
