use crate::{
    error::Result,
    index::in_range,
    record::Value,
    sequential::{Area, Areas, Entry, SequentialFile},
    storage::PageError,
};

/// Where a key lives in the sequential file.
pub(crate) enum Location {
    Main {
        slot: u64,
        entry: Entry,
    },
    Overflow {
        anchor: (u64, Entry),
        prev: Option<(u64, Entry)>,
        node: (u64, Entry),
    },
}

impl Location {
    #[inline]
    pub(crate) fn entry(&self) -> &Entry {
        match self {
            Self::Main { entry, .. } => entry,
            Self::Overflow { node, .. } => &node.1,
        }
    }
}

/// The nodes of a chain that sort before a key, and the first node that does not.
struct ChainCut {
    prev: Option<(u64, Entry)>,
    rest: Option<u64>,
}

impl SequentialFile {
    /// Binary search over the live slots of the main area, stepping over tombstones.
    fn search_main(&self, main: &mut Area, key: &Value) -> Result<Result<(u64, Entry), u64>> {
        let (mut lo, mut hi) = (0, main.len());

        while lo < hi {
            let mid = (lo + hi) / 2;

            let mut probe = mid;
            let mut live = None;
            while probe < hi {
                if let Some(entry) = main.get(probe)? {
                    live = Some(entry);
                    break;
                }
                probe += 1;
            }

            // Everything in `mid..hi` is a tombstone.
            let Some(entry) = live else {
                hi = mid;
                continue;
            };

            if entry.key < *key {
                lo = probe + 1;
            } else if entry.key > *key {
                hi = mid;
            } else {
                return Ok(Ok((probe, entry)));
            }
        }
        Ok(Err(lo))
    }

    /// The last live main slot before `before`.
    fn prev_live(&self, main: &mut Area, before: u64) -> Result<Option<(u64, Entry)>> {
        for slot in (0..before).rev() {
            if let Some(entry) = main.get(slot)? {
                return Ok(Some((slot, entry)));
            }
        }
        Ok(None)
    }

    fn node(&self, overflow: &mut Area, idx: u64) -> Result<Entry> {
        overflow.get(idx)?.ok_or_else(|| {
            PageError::BrokenLink {
                slot: idx,
                path: self.ctx.index_path(super::OVERFLOW_SUFFIX),
            }
            .into()
        })
    }

    /// Walks the chain of `anchor` up to the first node whose key is not below `key`.
    fn cut_chain(&self, overflow: &mut Area, anchor: &Entry, key: &Value) -> Result<ChainCut> {
        let mut prev = None;
        let mut rest = anchor.next;

        while let Some(idx) = rest {
            let node = self.node(overflow, idx)?;
            if node.key >= *key {
                break;
            }
            rest = node.next;
            prev = Some((idx, node));
        }
        Ok(ChainCut { prev, rest })
    }

    /// Points the link in front of a chain position (the anchor or a previous node) at `next`.
    fn relink(
        &self,
        areas: &mut Areas,
        anchor: (u64, Entry),
        prev: Option<(u64, Entry)>,
        next: Option<u64>,
    ) -> Result<()> {
        match prev {
            Some((idx, mut node)) => {
                node.next = next;
                areas.overflow.set(idx, &node)
            }
            None => {
                let (slot, mut entry) = anchor;
                entry.next = next;
                areas.main.set(slot, &entry)
            }
        }
    }

    pub(crate) fn locate(&self, areas: &mut Areas, key: &Value) -> Result<Option<Location>> {
        let insertion = match self.search_main(&mut areas.main, key)? {
            Ok((slot, entry)) => return Ok(Some(Location::Main { slot, entry })),
            Err(insertion) => insertion,
        };

        let Some(anchor) = self.prev_live(&mut areas.main, insertion)? else {
            return Ok(None);
        };
        let cut = self.cut_chain(&mut areas.overflow, &anchor.1, key)?;

        let Some(idx) = cut.rest else {
            return Ok(None);
        };
        let node = self.node(&mut areas.overflow, idx)?;
        if node.key != *key {
            return Ok(None);
        }

        Ok(Some(Location::Overflow {
            anchor,
            prev: cut.prev,
            node: (idx, node),
        }))
    }

    /// Inserts a key that is not present yet.
    pub(crate) fn insert(&mut self, areas: &mut Areas, key: &Value, pos: u64) -> Result<()> {
        let len = areas.main.len();
        let insertion = match self.search_main(&mut areas.main, key)? {
            Ok((slot, mut entry)) => {
                entry.pos = pos;
                return areas.main.set(slot, &entry);
            }
            Err(insertion) => insertion,
        };

        let mut tombstone = None;
        if insertion > 0 && areas.main.get(insertion - 1)?.is_none() {
            tombstone = Some(insertion - 1);
        } else if insertion < len && areas.main.get(insertion)?.is_none() {
            tombstone = Some(insertion);
        }
        let pred = self.prev_live(&mut areas.main, insertion)?;

        let mut entry = Entry::new(key.clone(), pos);

        if let Some(slot) = tombstone {
            // Keys above the new one leave the predecessor's chain for the new entry's.
            if let Some(anchor) = pred {
                entry.next = self.split_chain(areas, anchor, key)?;
            }
            areas.main.set(slot, &entry)?;
            self.meta.tombstones -= 1;
            return Ok(());
        }

        match pred {
            // The key sorts before every live key: it takes the first slot and the
            // displaced entry heads the chain.
            None if insertion < len => {
                let displaced = self.node(&mut areas.main, insertion)?;
                entry.next = Some(areas.overflow.push(&displaced)?);
                areas.main.set(insertion, &entry)?;
                self.meta.overflow_count += 1;
            }
            None => {
                areas.main.push(&entry)?;
            }
            Some(anchor) if insertion == len => {
                entry.next = self.split_chain(areas, anchor, key)?;
                areas.main.push(&entry)?;
            }
            Some(anchor) => {
                let cut = self.cut_chain(&mut areas.overflow, &anchor.1, key)?;
                entry.next = cut.rest;
                let idx = areas.overflow.push(&entry)?;
                self.relink(areas, anchor, cut.prev, Some(idx))?;
                self.meta.overflow_count += 1;
            }
        }
        Ok(())
    }

    /// Detaches the part of the anchor's chain above `key` and returns its head.
    fn split_chain(
        &self,
        areas: &mut Areas,
        anchor: (u64, Entry),
        key: &Value,
    ) -> Result<Option<u64>> {
        let cut = self.cut_chain(&mut areas.overflow, &anchor.1, key)?;
        if cut.rest.is_some() {
            self.relink(areas, anchor, cut.prev, None)?;
        }
        Ok(cut.rest)
    }

    pub(crate) fn delete(&mut self, areas: &mut Areas, key: &Value) -> Result<bool> {
        match self.locate(areas, key)? {
            None => return Ok(false),

            // The chain head moves up into the main slot.
            Some(Location::Main {
                slot,
                entry: Entry { next: Some(head), .. },
            }) => {
                let head = self.node(&mut areas.overflow, head)?;
                areas.main.set(slot, &head)?;
                self.meta.overflow_count -= 1;
            }

            Some(Location::Main { slot, .. }) => {
                if slot + 1 == areas.main.len() {
                    areas.main.truncate(slot)?;
                    // Tombstones left at the tail go too.
                    while let Some(last) = areas.main.len().checked_sub(1) {
                        if areas.main.get(last)?.is_some() {
                            break;
                        }
                        areas.main.truncate(last)?;
                        self.meta.tombstones -= 1;
                    }
                } else {
                    areas.main.bury(slot)?;
                    self.meta.tombstones += 1;
                }
            }

            Some(Location::Overflow { anchor, prev, node }) => {
                self.relink(areas, anchor, prev, node.1.next)?;
                self.meta.overflow_count -= 1;
            }
        }
        Ok(true)
    }

    /// The positions of keys in `begin..=end`, in ascending key order.
    pub(crate) fn range(
        &self,
        areas: &mut Areas,
        begin: &Value,
        end: Option<&Value>,
    ) -> Result<Vec<u64>> {
        let start = match self.search_main(&mut areas.main, begin)? {
            Ok((slot, _)) => slot,
            Err(insertion) => self
                .prev_live(&mut areas.main, insertion)?
                .map_or(insertion, |(slot, _)| slot),
        };

        let beyond = |key: &Value| end.map_or(false, |end| key > end);
        let mut positions = Vec::new();

        for slot in start..areas.main.len() {
            let Some(entry) = areas.main.get(slot)? else {
                continue;
            };
            if beyond(&entry.key) {
                break;
            }
            if in_range(&entry.key, begin, end) {
                positions.push(entry.pos);
            }

            let mut next = entry.next;
            while let Some(idx) = next {
                let node = self.node(&mut areas.overflow, idx)?;
                if beyond(&node.key) {
                    return Ok(positions);
                }
                if in_range(&node.key, begin, end) {
                    positions.push(node.pos);
                }
                next = node.next;
            }
        }
        Ok(positions)
    }

    /// Every live `(key, position)` pair in ascending key order.
    pub(crate) fn entries(&self, areas: &mut Areas) -> Result<Vec<(Value, u64)>> {
        let mut entries = Vec::with_capacity(self.meta.active);

        for slot in 0..areas.main.len() {
            let Some(entry) = areas.main.get(slot)? else {
                continue;
            };
            let mut next = entry.next;
            entries.push((entry.key, entry.pos));

            while let Some(idx) = next {
                let node = self.node(&mut areas.overflow, idx)?;
                next = node.next;
                entries.push((node.key, node.pos));
            }
        }
        Ok(entries)
    }
}
