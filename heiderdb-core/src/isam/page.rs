use crate::{
    error::Result,
    record::{self, Value},
    schema::ColumnType,
    storage::{Page, PageId, PageKind, Storage},
};

/// A data page or one of its overflow pages.
///
/// Data pages keep their entries sorted, the header `aux` links the next data page
/// in physical order. Overflow pages are unordered. Both link their next overflow
/// page through `link`.
#[derive(Debug, Clone)]
pub(crate) struct IsamPage {
    pub(crate) id: PageId,
    pub(crate) kind: PageKind,
    pub(crate) entries: Vec<(Value, u64)>,
    pub(crate) next_data: Option<PageId>,
    pub(crate) overflow: Option<PageId>,
}

impl IsamPage {
    #[inline]
    pub(crate) fn new(id: PageId, kind: PageKind) -> Self {
        Self {
            id,
            kind,
            entries: Vec::new(),
            next_data: None,
            overflow: None,
        }
    }

    #[inline]
    pub(crate) fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Places an entry, keeping a data page sorted.
    pub(crate) fn insert(&mut self, key: Value, pos: u64) {
        match self.kind {
            PageKind::Data => {
                let at = self.entries.partition_point(|(k, _)| *k < key);
                self.entries.insert(at, (key, pos));
            }
            _ => self.entries.push((key, pos)),
        }
    }

    pub(crate) fn read(storage: &Storage, id: PageId, key_type: ColumnType) -> Result<Self> {
        let page = storage.read(id, &[PageKind::Data, PageKind::Overflow])?;
        let mut reader = page.reader();
        let entries = (0..page.count)
            .map(|_| {
                let key = record::decode_key(key_type, reader.take(key_type.width())?);
                Ok((key, reader.u64()?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            kind: page.kind(),
            entries,
            next_data: PageId::from_link(page.aux),
            overflow: PageId::from_link(page.link),
        })
    }

    pub(crate) fn write(&self, storage: &Storage, key_type: ColumnType) -> Result<()> {
        let mut page = Page::new(self.kind, storage.page_size());
        page.count = self.entries.len() as u32;
        page.link = PageId::to_link(self.overflow);
        page.aux = PageId::to_link(self.next_data);

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
