//! A static two-level sparse ISAM index.
//!
//! Records are kept physically sorted in the data file between rebuilds, and
//! partitioned into data pages. Level 1 points at every data page by its first key,
//! the root points at every level-1 block. Keys inserted after a rebuild go into
//! their data page while it has room, then into its unordered overflow pages.
//! Removed records get their key field overwritten with the tombstone of the key type.

use std::fmt::{self, Formatter};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    index::{in_range, Context, Index, IndexKind, IndexStats, KeyError},
    meta,
    record::{self, Record, Value},
    storage::{Page, PageId, PageKind, Storage},
    table::InputInvalid,
};

use directory::Directory;
use page::IsamPage;

mod directory;
mod page;

const PAGES_SUFFIX: &str = "isam_index.dat";
const META_SUFFIX: &str = "isam_index.json";

/// The width of a record position in a page entry.
const POSITION_WIDTH: usize = 8;
/// The width of a page id in a directory entry.
const POINTER_WIDTH: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsamMeta {
    #[serde(flatten)]
    directory: Directory,
    capacity: usize,
    fanout: usize,
    data_pages: u32,
    num_pages: PageId,
    live: usize,
    tombstones: usize,
    version: u32,
}

pub(crate) struct IsamSparse {
    ctx: Context,
    storage: Storage,
    meta: IsamMeta,
}

impl IsamSparse {
    /// The number of entries a data or overflow page holds.
    #[inline]
    pub(crate) fn capacity(page_size: u32, record_size: usize, key_width: usize) -> usize {
        let body = (page_size as usize).saturating_sub(Page::HEADER_SIZE);
        let by_records = page_size as usize / record_size.max(1);
        by_records.min(body / (key_width + POSITION_WIDTH)).max(1)
    }

    /// The number of pointers in a level-1 block.
    #[inline]
    pub(crate) fn fanout(page_size: u32, key_width: usize) -> usize {
        let body = (page_size as usize).saturating_sub(Page::HEADER_SIZE);
        (body / (key_width + POINTER_WIDTH)).max(2)
    }

    pub(crate) fn create(ctx: Context) -> Result<Self> {
        let body = (ctx.page_size as usize).saturating_sub(Page::HEADER_SIZE);
        if body < ctx.key_width() + POSITION_WIDTH {
            return Err(InputInvalid::PageSize {
                page_size: ctx.page_size,
                reason: "cannot hold a single ISAM entry",
            }
            .into());
        }

        let storage = Storage::new(
            ctx.index_path(PAGES_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );
        storage.truncate(0)?;

        let isam = Self {
            meta: IsamMeta {
                directory: Directory::default(),
                capacity: Self::capacity(ctx.page_size, ctx.record_size(), ctx.key_width()),
                fanout: Self::fanout(ctx.page_size, ctx.key_width()),
                data_pages: 0,
                num_pages: PageId::from_raw(0),
                live: 0,
                tombstones: 0,
                version: meta::VERSION,
            },
            ctx,
            storage,
        };
        isam.save_meta()?;
        Ok(isam)
    }

    pub(crate) fn load(ctx: Context) -> Result<Self> {
        let meta: IsamMeta = meta::load(ctx.index_path(META_SUFFIX))?;
        let storage = Storage::new(
            ctx.index_path(PAGES_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );
        storage.expect_pages(meta.num_pages.raw())?;
        Ok(Self { ctx, storage, meta })
    }

    #[inline]
    fn page(&self, id: PageId) -> Result<IsamPage> {
        IsamPage::read(&self.storage, id, self.ctx.key_type())
    }

    #[inline]
    fn write_page(&self, page: &IsamPage) -> Result<()> {
        page.write(&self.storage, self.ctx.key_type())
    }

    /// Whether the key field of a serialized record holds the tombstone.
    #[inline]
    fn is_buried(&self, bytes: &[u8]) -> bool {
        bytes[self.ctx.schema.key_range()] == self.ctx.key_type().tombstone()[..]
    }

    /// Finds the page, data or overflow, holding `key` and the entry's index in it.
    fn find(&self, key: &Value) -> Result<Option<(IsamPage, usize)>> {
        let mut next = self.meta.directory.locate(key);
        while let Some(id) = next {
            let page = self.page(id)?;
            if let Some(idx) = page.position(key) {
                return Ok(Some((page, idx)));
            }
            next = page.overflow;
        }
        Ok(None)
    }

    /// The entries of a data page and of all its overflow pages, sorted.
    fn gather(&self, data: &IsamPage) -> Result<Vec<(Value, u64)>> {
        let mut entries = data.entries.clone();
        let mut next = data.overflow;
        while let Some(id) = next {
            let page = self.page(id)?;
            entries.extend(page.entries);
            next = page.overflow;
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Places a new entry into its data page, or an overflow page hanging from it.
    fn place(&mut self, key: &Value, pos: u64) -> Result<()> {
        let Some(id) = self.meta.directory.locate(key) else {
            return self.rebuild();
        };

        let mut page = self.page(id)?;
        loop {
            if page.entries.len() < self.meta.capacity {
                page.insert(key.clone(), pos);
                return self.write_page(&page);
            }
            match page.overflow {
                Some(next) => page = self.page(next)?,
                None => break,
            }
        }

        // Every page of the chain is full.
        let mut overflow = IsamPage::new(self.meta.num_pages.incr(), PageKind::Overflow);
        overflow.insert(key.clone(), pos);
        self.write_page(&overflow)?;

        page.overflow = Some(overflow.id);
        self.write_page(&page)?;
        debug!(
            "chained ISAM overflow page {} after page {}",
            overflow.id.raw(),
            page.id.raw()
        );
        Ok(())
    }

    #[inline]
    fn needs_rebuild(&self) -> bool {
        self.meta.tombstones as f64 > self.ctx.options.isam_tombstone_ratio * self.meta.live as f64
    }

    #[inline]
    fn save_meta(&self) -> Result<()> {
        meta::save(
            self.ctx.index_path(META_SUFFIX),
            &self.meta,
            self.ctx.options.force_sync,
        )
    }
}

impl Index for IsamSparse {
    #[inline]
    fn kind(&self) -> IndexKind {
        IndexKind::IsamSparse
    }

    fn search(&self, key: &Value) -> Result<Option<Record>> {
        match self.find(key)? {
            Some((page, idx)) => self.ctx.read_record(page.entries[idx].1).map(Some),
            None => Ok(None),
        }
    }

    fn range_search(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<Record>> {
        let mut positions = Vec::new();

        let mut next = self.meta.directory.locate(begin);
        while let Some(id) = next {
            let page = self.page(id)?;
            let entries = self.gather(&page)?;

            let past = |key: &Value| end.map_or(false, |end| key > end);
            if entries.first().map_or(false, |(key, _)| past(key)) {
                break;
            }
            positions.extend(
                entries
                    .into_iter()
                    .filter(|(key, _)| in_range(key, begin, end))
                    .map(|(_, pos)| pos),
            );
            next = page.next_data;
        }
        self.ctx.read_records(positions)
    }

    fn add(&mut self, record: &[u8], key: &Value) -> Result<()> {
        if self.is_buried(record) {
            return Err(KeyError::Reserved(key.clone()).into());
        }
        if self.find(key)?.is_some() {
            return Err(KeyError::Duplicate(key.clone()).into());
        }

        let pos = self.ctx.data.append(record)?;
        self.meta.live += 1;
        self.place(key, pos)?;
        self.save_meta()
    }

    fn remove(&mut self, key: &Value) -> Result<bool> {
        let Some((mut page, idx)) = self.find(key)? else {
            return Ok(false);
        };
        let (_, pos) = page.entries.remove(idx);
        self.write_page(&page)?;

        let offset = pos + self.ctx.schema.key_offset() as u64;
        self.ctx.data.write(offset, &self.ctx.key_type().tombstone())?;

        self.meta.live -= 1;
        self.meta.tombstones += 1;
        if self.needs_rebuild() {
            return self.rebuild().map(|_| true);
        }
        self.save_meta()?;
        Ok(true)
    }

    fn rebuild(&mut self) -> Result<()> {
        let record_size = self.ctx.record_size() as u64;
        let key_type = self.ctx.key_type();

        let mut records: Vec<_> = self
            .ctx
            .data
            .scan()?
            .into_iter()
            .filter(|(_, bytes)| !self.is_buried(bytes))
            .map(|(_, bytes)| (self.ctx.record_key(&bytes), bytes))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        self.ctx
            .data
            .rewrite(records.iter().map(|(_, bytes)| bytes.as_slice()))?;

        self.storage.truncate(0)?;
        let capacity = self.meta.capacity;
        let data_pages = records.len().div_ceil(capacity) as u32;

        let mut first_keys = Vec::with_capacity(data_pages as usize);
        for (i, chunk) in records.chunks(capacity).enumerate() {
            let id = PageId::from_raw(i as u32);
            let mut page = IsamPage::new(id, PageKind::Data);
            page.entries = chunk
                .iter()
                .enumerate()
                .map(|(j, (key, _))| (key.clone(), (i * capacity + j) as u64 * record_size))
                .collect();
            page.next_data = (id.raw() + 1 < data_pages).then(|| PageId::from_raw(id.raw() + 1));
            page.write(&self.storage, key_type)?;
            first_keys.push(chunk[0].0.clone());
        }

        debug!(
            "rebuilt ISAM index with {} records in {data_pages} pages ({} tombstones dropped)",
            records.len(),
            self.meta.tombstones
        );
        self.meta.directory = Directory::build(first_keys, self.meta.fanout);
        self.meta.data_pages = data_pages;
        self.meta.num_pages = PageId::from_raw(data_pages);
        self.meta.live = records.len();
        self.meta.tombstones = 0;
        self.save_meta()
    }

    fn get_all(&self) -> Result<Vec<Record>> {
        Ok(self
            .ctx
            .data
            .scan()?
            .into_iter()
            .filter(|(_, bytes)| !self.is_buried(bytes))
            .map(|(_, bytes)| record::decode(&self.ctx.schema, &bytes))
            .collect())
    }

    #[inline]
    fn count(&self) -> usize {
        self.meta.live
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            capacity: self.meta.capacity,
            height: 2,
            directory_size: self.meta.directory.len(),
            overflow_count: (self.meta.num_pages.raw() - self.meta.data_pages) as usize,
            tombstones: self.meta.tombstones,
            page_count: self.meta.num_pages.raw(),
            ..IndexStats::new(self.kind(), self.meta.live)
        })
    }

    fn dump(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let directory = &self.meta.directory;
        write!(f, "root")?;
        for pointer in &directory.root {
            write!(f, " │ {} → {}", pointer.key, pointer.target)?;
        }
        writeln!(f)?;

        for (block, pointers) in directory.levels.iter().enumerate() {
            write!(f, "{block:>4}")?;
            for pointer in pointers {
                write!(f, " │ {} → p{}", pointer.key, pointer.target)?;
            }
            writeln!(f)?;
        }

        for id in 0..self.meta.data_pages {
            let mut next = Some(PageId::from_raw(id));
            write!(f, "p{id:<3}")?;
            while let Some(id) = next {
                let page = self.page(id).map_err(|_| fmt::Error)?;
                let keys: Vec<_> = page.entries.iter().map(|(k, _)| k.to_string()).collect();
                write!(f, " [{}]", keys.join(", "))?;
                next = page.overflow;
                if next.is_some() {
                    write!(f, " ⤷")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
