//! Extendible hashing over the primary key.
//!
//! The directory lives in memory as a vector indexed by the low `global_depth`
//! bits of the key hash and is persisted as a map from bit strings to bucket ids.
//! Buckets are pages of the bucket file; bucket ids are page ids.

use std::{
    collections::BTreeMap,
    fmt::{self, Formatter},
    path::Path,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    freelist::Freelist,
    index::{in_range, Context, Index, IndexKind, IndexStats, KeyError},
    meta::{self, ValidationError},
    record::{Record, Value},
    storage::{Page, PageId, Storage},
    table::InputInvalid,
};

use bucket::{hash, Bucket};

mod bucket;
mod directory;

const BUCKETS_SUFFIX: &str = "hash_buckets.dat";
const DIRECTORY_SUFFIX: &str = "hash_dir.json";

/// The global depth of a fresh directory.
const INITIAL_DEPTH: u32 = 2;

/// The persisted state of the hash, kept in the directory side-file.
#[derive(Debug, Serialize, Deserialize)]
struct HashMeta {
    global_depth: u32,
    directory: BTreeMap<String, PageId>,
    block_factor: usize,
    num_buckets: PageId,
    freelist: Freelist,
    count: usize,
    overflow_count: usize,
    version: u32,
}

pub(crate) struct ExtendibleHash {
    ctx: Context,
    storage: Storage,
    global_depth: u32,
    directory: Vec<PageId>,
    block_factor: usize,
    num_buckets: PageId,
    freelist: Freelist,
    count: usize,
    overflow_count: usize,
}

impl ExtendibleHash {
    /// The number of entries a bucket can hold.
    #[inline]
    pub(crate) fn block_factor(page_size: u32, key_width: usize) -> usize {
        let body = (page_size as usize).saturating_sub(Page::HEADER_SIZE);
        (body / (key_width + 8)).max(1)
    }

    pub(crate) fn create(ctx: Context) -> Result<Self> {
        let body = (ctx.page_size as usize).saturating_sub(Page::HEADER_SIZE);
        if body < ctx.key_width() + 8 {
            return Err(InputInvalid::PageSize {
                page_size: ctx.page_size,
                reason: "cannot hold a single hash bucket entry",
            }
            .into());
        }

        let storage = Storage::new(
            ctx.index_path(BUCKETS_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );
        let block_factor = Self::block_factor(ctx.page_size, ctx.key_width());

        let mut hash = Self {
            ctx,
            storage,
            global_depth: INITIAL_DEPTH,
            directory: Vec::new(),
            block_factor,
            num_buckets: PageId::from_raw(0),
            freelist: Freelist::new(),
            count: 0,
            overflow_count: 0,
        };
        hash.reset()?;
        debug!("created extendible hash with block factor {block_factor}");
        Ok(hash)
    }

    pub(crate) fn load(ctx: Context) -> Result<Self> {
        let path = ctx.index_path(DIRECTORY_SUFFIX);
        let meta: HashMeta = meta::load(&path)?;
        let directory = Self::parse_directory(&path, meta.global_depth, &meta.directory)?;

        let storage = Storage::new(
            ctx.index_path(BUCKETS_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );
        storage.expect_pages(meta.num_buckets.raw())?;
        Ok(Self {
            ctx,
            storage,
            global_depth: meta.global_depth,
            directory,
            block_factor: meta.block_factor,
            num_buckets: meta.num_buckets,
            freelist: meta.freelist,
            count: meta.count,
            overflow_count: meta.overflow_count,
        })
    }

    /// Starts over with two empty buckets of local depth 1.
    fn reset(&mut self) -> Result<()> {
        self.storage.truncate(0)?;
        self.global_depth = INITIAL_DEPTH;
        self.num_buckets = PageId::from_raw(0);
        self.freelist = Freelist::new();
        self.count = 0;
        self.overflow_count = 0;

        let buckets = [self.alloc(), self.alloc()];
        for id in buckets {
            self.write_bucket(&Bucket::new(id, 1))?;
        }
        self.directory = (0..1 << INITIAL_DEPTH).map(|i| buckets[i % 2]).collect();
        self.save_meta()
    }

    /// Renders a directory slot as a bit string of `global_depth` digits.
    #[inline]
    fn bits(&self, slot: usize) -> String {
        format!("{:0width$b}", slot, width = self.global_depth as usize)
    }

    #[inline]
    fn slot(&self, key: &Value) -> usize {
        hash(key).rem_euclid(1 << self.global_depth) as usize
    }

    #[inline]
    fn alloc(&mut self) -> PageId {
        self.freelist
            .take()
            .unwrap_or_else(|| self.num_buckets.incr())
    }

    #[inline]
    fn bucket(&self, id: PageId) -> Result<Bucket> {
        Bucket::read(&self.storage, id, self.ctx.key_type())
    }

    #[inline]
    fn write_bucket(&self, bucket: &Bucket) -> Result<()> {
        bucket.write(&self.storage, self.ctx.key_type())
    }

    /// The primary bucket for `key` followed by its overflow chain.
    fn chain(&self, key: &Value) -> Result<Vec<Bucket>> {
        let mut chain = vec![self.bucket(self.directory[self.slot(key)])?];
        while let Some(next) = chain.last().and_then(|b| b.overflow) {
            chain.push(self.bucket(next)?);
        }
        Ok(chain)
    }

    /// Finds the bucket of `key` and the index of its entry.
    fn find(&self, key: &Value) -> Result<Option<(Bucket, usize)>> {
        let mut id = Some(self.directory[self.slot(key)]);
        while let Some(bucket_id) = id {
            let bucket = self.bucket(bucket_id)?;
            if let Some(index) = bucket.position(key) {
                return Ok(Some((bucket, index)));
            }
            id = bucket.overflow;
        }
        Ok(None)
    }

    /// Every `(key, position)` pair, bucket by bucket.
    fn entries(&self) -> Result<Vec<(Value, u64)>> {
        let mut seen = Vec::new();
        let mut entries = Vec::with_capacity(self.count);

        for id in &self.directory {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);

            let mut next = Some(*id);
            while let Some(bucket_id) = next {
                let bucket = self.bucket(bucket_id)?;
                next = bucket.overflow;
                entries.extend(bucket.entries);
            }
        }
        Ok(entries)
    }

    fn parse_directory(
        path: &Path,
        global_depth: u32,
        map: &BTreeMap<String, PageId>,
    ) -> Result<Vec<PageId>> {
        let inconsistent = |reason| ValidationError::Inconsistent {
            path: path.to_owned(),
            reason,
        };

        let len = 1usize
            .checked_shl(global_depth)
            .ok_or_else(|| inconsistent("global depth is out of range"))?;
        if map.len() != len {
            return Err(inconsistent("directory size does not match global depth").into());
        }

        let mut directory = vec![PageId::from_raw(0); len];
        for (bits, id) in map {
            let slot = usize::from_str_radix(bits, 2)
                .ok()
                .filter(|slot| *slot < len && bits.len() == global_depth as usize)
                .ok_or_else(|| inconsistent("directory key is not a valid bit string"))?;
            directory[slot] = *id;
        }
        Ok(directory)
    }

    fn save_meta(&self) -> Result<()> {
        let directory = self
            .directory
            .iter()
            .enumerate()
            .map(|(slot, id)| (self.bits(slot), *id))
            .collect();

        let meta = HashMeta {
            global_depth: self.global_depth,
            directory,
            block_factor: self.block_factor,
            num_buckets: self.num_buckets,
            freelist: self.freelist.clone(),
            count: self.count,
            overflow_count: self.overflow_count,
            version: meta::VERSION,
        };
        meta::save(
            self.ctx.index_path(DIRECTORY_SUFFIX),
            &meta,
            self.ctx.options.force_sync,
        )
    }
}

impl Index for ExtendibleHash {
    #[inline]
    fn kind(&self) -> IndexKind {
        IndexKind::ExtendibleHash
    }

    fn search(&self, key: &Value) -> Result<Option<Record>> {
        match self.find(key)? {
            Some((bucket, index)) => self.ctx.read_record(bucket.entries[index].1).map(Some),
            None => Ok(None),
        }
    }

    /// Hashing keeps no order, so this scans every bucket.
    fn range_search(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<Record>> {
        let mut entries: Vec<_> = self
            .entries()?
            .into_iter()
            .filter(|(key, _)| in_range(key, begin, end))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.ctx.read_records(entries.into_iter().map(|(_, pos)| pos))
    }

    fn add(&mut self, record: &[u8], key: &Value) -> Result<()> {
        if self.find(key)?.is_some() {
            return Err(KeyError::Duplicate(key.clone()).into());
        }

        let pos = self.ctx.data.append(record)?;
        self.put(key, pos)?;
        self.count += 1;
        self.save_meta()
    }

    fn remove(&mut self, key: &Value) -> Result<bool> {
        if !self.delete(key)? {
            return Ok(false);
        }
        self.count -= 1;
        self.save_meta()?;
        Ok(true)
    }

    fn rebuild(&mut self) -> Result<()> {
        let entries = self.entries()?;
        self.reset()?;
        for (key, pos) in &entries {
            self.put(key, *pos)?;
        }
        self.count = entries.len();
        debug!("rebuilt extendible hash with {} entries", entries.len());
        self.save_meta()
    }

    fn get_all(&self) -> Result<Vec<Record>> {
        let positions = self.entries()?.into_iter().map(|(_, pos)| pos);
        self.ctx.read_records(positions)
    }

    #[inline]
    fn count(&self) -> usize {
        self.count
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            capacity: self.block_factor,
            global_depth: self.global_depth,
            directory_size: self.directory.len(),
            overflow_count: self.overflow_count,
            page_count: self.num_buckets.raw(),
            free_pages: self.freelist.len(),
            ..IndexStats::new(self.kind(), self.count)
        })
    }

    fn dump(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (slot, id) in self.directory.iter().enumerate() {
            writeln!(f, "{} ━ bucket {}", self.bits(slot), id.raw())?;
        }

        let mut seen = Vec::new();
        for id in &self.directory {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);

            let mut next = Some(*id);
            let mut weld = "┣";
            while let Some(bucket_id) = next {
                let bucket = self.bucket(bucket_id).map_err(|_| fmt::Error)?;
                let keys: Vec<_> = bucket.entries.iter().map(|(k, _)| k.to_string()).collect();
                writeln!(
                    f,
                    "{weld}━ bucket {} (depth {}): [{}]",
                    bucket.id.raw(),
                    bucket.local_depth,
                    keys.join(", ")
                )?;
                next = bucket.overflow;
                weld = "┃  ┗";
            }
        }
        Ok(())
    }
}
