//! A paged B+ tree over the primary key.
//!
//! Its structure consists of [`node`]s, each stored in one page of the index file.
//! Different kinds of algorithms are implemented in different `mod`s.
//! See [`crud`], [`cursor`], [`debug`] for more details.

use std::fmt::{self, Formatter};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    freelist::Freelist,
    index::{Context, Index, IndexKind, IndexStats, KeyError},
    meta,
    record::{Record, Value},
    storage::{Page, PageId, Storage},
    table::InputInvalid,
};

use node::Node;

mod crud;
mod cursor;
mod debug;
mod node;

const NODES_SUFFIX: &str = "index.dat";
const META_SUFFIX: &str = "index_metadata.json";

/// The width of a child pointer (record position or page id) in a node.
const POINTER_WIDTH: usize = 8;

/// The persisted state of a tree, kept in its metadata side-file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeMeta {
    root: PageId,
    order: usize,
    height: usize,
    num_pages: PageId,
    freelist: Freelist,
    count: usize,
    version: u32,
}

pub(crate) struct BPTree {
    ctx: Context,
    storage: Storage,
    meta: TreeMeta,
}

impl BPTree {
    /// Derives the order of the tree from the page size and key width.
    #[inline]
    pub(crate) fn order(page_size: u32, key_width: usize) -> usize {
        let body = (page_size as usize).saturating_sub(Page::HEADER_SIZE);
        (body / (key_width + POINTER_WIDTH)).max(3)
    }

    pub(crate) fn create(ctx: Context) -> Result<Self> {
        let order = Self::order(ctx.page_size, ctx.key_width());
        let body = (ctx.page_size as usize).saturating_sub(Page::HEADER_SIZE);
        if order * (ctx.key_width() + POINTER_WIDTH) > body {
            return Err(InputInvalid::PageSize {
                page_size: ctx.page_size,
                reason: "cannot hold a B+ tree node of order 3",
            }
            .into());
        }

        let storage = Storage::new(
            ctx.index_path(NODES_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );

        let mut tree = Self {
            ctx,
            storage,
            meta: TreeMeta {
                root: PageId::from_raw(0),
                order,
                height: 1,
                num_pages: PageId::from_raw(0),
                freelist: Freelist::new(),
                count: 0,
                version: meta::VERSION,
            },
        };
        tree.reset()?;
        debug!("created B+ tree of order {order}");
        Ok(tree)
    }

    pub(crate) fn load(ctx: Context) -> Result<Self> {
        let meta: TreeMeta = meta::load(ctx.index_path(META_SUFFIX))?;
        let storage = Storage::new(
            ctx.index_path(NODES_SUFFIX),
            ctx.page_size,
            ctx.options.force_sync,
        );
        storage.expect_pages(meta.num_pages.raw())?;
        Ok(Self { ctx, storage, meta })
    }

    /// Drops every node and starts over from an empty root leaf.
    fn reset(&mut self) -> Result<()> {
        self.storage.truncate(0)?;
        self.meta.num_pages = PageId::from_raw(0);
        self.meta.freelist = Freelist::new();
        self.meta.height = 1;
        self.meta.count = 0;

        let root = Node::new_leaf(self.alloc());
        self.meta.root = root.page_id;
        self.write_node(&root)?;
        self.save_meta()
    }

    #[inline]
    fn min_keys(&self) -> usize {
        (self.meta.order - 1) / 2
    }

    /// Obtains a page id, reusing freed pages first.
    #[inline]
    fn alloc(&mut self) -> PageId {
        self.meta
            .freelist
            .take()
            .unwrap_or_else(|| self.meta.num_pages.incr())
    }

    #[inline]
    fn release(&mut self, page_id: PageId) {
        self.meta.freelist.free(page_id);
    }

    #[inline]
    fn node(&self, page_id: PageId) -> Result<Node> {
        Node::read(&self.storage, page_id, self.ctx.key_type())
    }

    #[inline]
    fn write_node(&self, node: &Node) -> Result<()> {
        node.write(&self.storage, self.ctx.key_type())
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

impl Index for BPTree {
    #[inline]
    fn kind(&self) -> IndexKind {
        IndexKind::BPlusTree
    }

    fn search(&self, key: &Value) -> Result<Option<Record>> {
        self.get(key)?
            .map(|pos| self.ctx.read_record(pos))
            .transpose()
    }

    fn range_search(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<Record>> {
        let positions = self.range(begin, end)?.into_iter().map(|(_, pos)| pos);
        self.ctx.read_records(positions)
    }

    fn add(&mut self, record: &[u8], key: &Value) -> Result<()> {
        if self.get(key)?.is_some() {
            return Err(KeyError::Duplicate(key.clone()).into());
        }

        let pos = self.ctx.data.append(record)?;
        self.put(key, pos)?;
        self.meta.count += 1;
        self.save_meta()
    }

    fn remove(&mut self, key: &Value) -> Result<bool> {
        let Some(pos) = self.delete(key)? else {
            return Ok(false);
        };
        self.meta.count -= 1;
        self.relocate_last(pos)?;
        self.save_meta()?;
        Ok(true)
    }

    fn rebuild(&mut self) -> Result<()> {
        let entries = self.entries()?;
        self.reset()?;
        for (key, pos) in &entries {
            self.put(key, *pos)?;
        }
        self.meta.count = entries.len();
        debug!("rebuilt B+ tree with {} entries", entries.len());
        self.save_meta()
    }

    fn get_all(&self) -> Result<Vec<Record>> {
        let positions = self.entries()?.into_iter().map(|(_, pos)| pos);
        self.ctx.read_records(positions)
    }

    #[inline]
    fn count(&self) -> usize {
        self.meta.count
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            capacity: self.meta.order,
            height: self.meta.height,
            page_count: self.meta.num_pages.raw(),
            free_pages: self.meta.freelist.len(),
            ..IndexStats::new(self.kind(), self.meta.count)
        })
    }

    #[inline]
    fn dump(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.dump_tree(f)
    }
}
