//! A sequential file: a sorted main area with sorted overflow chains.
//!
//! Each live main slot anchors a chain holding the keys strictly between its own key
//! and the next live main key. The whole structure is flattened back into the main
//! area whenever overflow nodes or tombstones grow past their configured ratios.

use std::fmt::{self, Formatter};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    index::{Context, Index, IndexKind, IndexStats, KeyError},
    meta,
    record::{Record, Value},
};

use area::{Area, Entry};

mod area;
mod ops;

const MAIN_SUFFIX: &str = "seq_index.dat";
const OVERFLOW_SUFFIX: &str = "seq_overflow.dat";
const META_SUFFIX: &str = "seq_metadata.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeqMeta {
    main_len: u64,
    active: usize,
    overflow_count: usize,
    tombstones: usize,
    version: u32,
}

/// The main area and overflow file, opened for the length of one operation.
pub(crate) struct Areas {
    main: Area,
    overflow: Area,
}

pub(crate) struct SequentialFile {
    ctx: Context,
    meta: SeqMeta,
}

impl SequentialFile {
    pub(crate) fn create(ctx: Context) -> Result<Self> {
        let seq = Self {
            ctx,
            meta: SeqMeta {
                version: meta::VERSION,
                ..Default::default()
            },
        };

        let mut areas = seq.open()?;
        areas.main.truncate(0)?;
        areas.overflow.truncate(0)?;
        seq.save_meta()?;
        Ok(seq)
    }

    pub(crate) fn load(ctx: Context) -> Result<Self> {
        let meta = meta::load(ctx.index_path(META_SUFFIX))?;
        Ok(Self { ctx, meta })
    }

    fn open(&self) -> Result<Areas> {
        let key_type = self.ctx.key_type();
        Ok(Areas {
            main: Area::open(self.ctx.index_path(MAIN_SUFFIX), key_type)?,
            overflow: Area::open(self.ctx.index_path(OVERFLOW_SUFFIX), key_type)?,
        })
    }

    fn needs_rebuild(&self) -> bool {
        let active = self.meta.active as f64;
        self.meta.overflow_count as f64 > self.ctx.options.seq_overflow_ratio * active
            || self.meta.tombstones as f64 > self.ctx.options.seq_tombstone_ratio * active
    }

    /// Persists the metadata, rebuilding first if a threshold was crossed.
    fn finish(&mut self, mut areas: Areas) -> Result<()> {
        if self.needs_rebuild() {
            self.flatten(&mut areas)?;
        }
        self.meta.main_len = areas.main.len();
        if self.ctx.options.force_sync {
            areas.main.sync()?;
            areas.overflow.sync()?;
        }
        self.save_meta()
    }

    /// Rewrites every live entry into the main area and clears the overflow file.
    fn flatten(&mut self, areas: &mut Areas) -> Result<()> {
        let entries = self.entries(areas)?;

        areas.main.truncate(0)?;
        areas.overflow.truncate(0)?;
        for (key, pos) in &entries {
            areas.main.push(&Entry::new(key.clone(), *pos))?;
        }

        debug!(
            "rebuilt sequential file with {} entries ({} overflow, {} tombstones dropped)",
            entries.len(),
            self.meta.overflow_count,
            self.meta.tombstones
        );
        self.meta.active = entries.len();
        self.meta.overflow_count = 0;
        self.meta.tombstones = 0;
        Ok(())
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

impl Index for SequentialFile {
    #[inline]
    fn kind(&self) -> IndexKind {
        IndexKind::SequentialFile
    }

    fn search(&self, key: &Value) -> Result<Option<Record>> {
        let mut areas = self.open()?;
        match self.locate(&mut areas, key)? {
            Some(location) => self.ctx.read_record(location.entry().pos).map(Some),
            None => Ok(None),
        }
    }

    fn range_search(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<Record>> {
        let mut areas = self.open()?;
        let positions = self.range(&mut areas, begin, end)?;
        self.ctx.read_records(positions)
    }

    fn add(&mut self, record: &[u8], key: &Value) -> Result<()> {
        let mut areas = self.open()?;
        if self.locate(&mut areas, key)?.is_some() {
            return Err(KeyError::Duplicate(key.clone()).into());
        }

        let pos = self.ctx.data.append(record)?;
        self.insert(&mut areas, key, pos)?;
        self.meta.active += 1;
        self.finish(areas)
    }

    fn remove(&mut self, key: &Value) -> Result<bool> {
        let mut areas = self.open()?;
        if !self.delete(&mut areas, key)? {
            return Ok(false);
        }
        self.meta.active -= 1;
        self.finish(areas)?;
        Ok(true)
    }

    fn rebuild(&mut self) -> Result<()> {
        let mut areas = self.open()?;
        self.flatten(&mut areas)?;
        self.finish(areas)
    }

    fn get_all(&self) -> Result<Vec<Record>> {
        let mut areas = self.open()?;
        let positions = self.entries(&mut areas)?.into_iter().map(|(_, pos)| pos);
        self.ctx.read_records(positions)
    }

    #[inline]
    fn count(&self) -> usize {
        self.meta.active
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            capacity: self.meta.main_len as usize,
            overflow_count: self.meta.overflow_count,
            tombstones: self.meta.tombstones,
            ..IndexStats::new(self.kind(), self.meta.active)
        })
    }

    fn dump(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut areas = self.open().map_err(|_| fmt::Error)?;
        for slot in 0..areas.main.len() {
            let entry = areas.main.get(slot).map_err(|_| fmt::Error)?;
            let Some(entry) = entry else {
                writeln!(f, "{slot:>4} ┃ ✝")?;
                continue;
            };
            write!(f, "{slot:>4} ┃ {}", entry.key)?;

            let mut next = entry.next;
            while let Some(idx) = next {
                let node = areas.overflow.get(idx).map_err(|_| fmt::Error)?;
                let Some(node) = node else { break };
                write!(f, " → {}", node.key)?;
                next = node.next;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
