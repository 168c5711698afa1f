use log::debug;

use crate::{
    error::Result,
    hash::{bucket::Bucket, hash, ExtendibleHash},
    record::Value,
    storage::PageId,
};

impl ExtendibleHash {
    /// Inserts `key`, or overwrites its position if it is already present.
    pub(crate) fn put(&mut self, key: &Value, pos: u64) -> Result<()> {
        loop {
            let mut chain = self.chain(key)?;

            if let Some(bucket) = chain.iter_mut().find(|b| b.position(key).is_some()) {
                if let Some(index) = bucket.position(key) {
                    bucket.entries[index].1 = pos;
                }
                return self.write_bucket(bucket);
            }

            let primary = &mut chain[0];
            if primary.entries.len() < self.block_factor {
                primary.entries.push((key.clone(), pos));
                return self.write_bucket(primary);
            }

            if primary.overflow.is_none() {
                if primary.local_depth < self.global_depth {
                    let primary = chain.swap_remove(0);
                    self.split(primary)?;
                    continue;
                }
                if self.global_depth < self.ctx.options.hash_max_depth {
                    self.double();
                    continue;
                }
            }

            return self.push_overflow(chain, key, pos);
        }
    }

    /// Appends to the last bucket of a full chain, chaining a new bucket if it is full too.
    fn push_overflow(&mut self, mut chain: Vec<Bucket>, key: &Value, pos: u64) -> Result<()> {
        let Some(last) = chain.last_mut() else {
            return Ok(());
        };

        if last.entries.len() < self.block_factor {
            last.entries.push((key.clone(), pos));
            return self.write_bucket(last);
        }

        let mut overflow = Bucket::new(self.alloc(), last.local_depth);
        overflow.entries.push((key.clone(), pos));
        last.overflow = Some(overflow.id);

        self.write_bucket(&overflow)?;
        self.write_bucket(last)?;
        self.overflow_count += 1;
        debug!(
            "chained overflow bucket {} after bucket {}",
            overflow.id.raw(),
            last.id.raw()
        );
        Ok(())
    }

    /// Doubles the directory: slot `b` and slot `1b` point at the same bucket.
    fn double(&mut self) {
        self.directory.extend_from_within(..);
        self.global_depth += 1;
        debug!(
            "doubled hash directory to {} slots (global depth {})",
            self.directory.len(),
            self.global_depth
        );
    }

    /// Splits a full bucket on the bit that its local depth does not cover yet.
    fn split(&mut self, mut bucket: Bucket) -> Result<()> {
        let bit = bucket.local_depth;
        bucket.local_depth += 1;
        let mut sibling = Bucket::new(self.alloc(), bucket.local_depth);

        let (stay, moved): (Vec<_>, Vec<_>) = bucket
            .entries
            .drain(..)
            .partition(|(key, _)| (hash(key) >> bit) & 1 == 0);
        bucket.entries = stay;
        sibling.entries = moved;

        for (slot, id) in self.directory.iter_mut().enumerate() {
            if *id == bucket.id && (slot >> bit) & 1 == 1 {
                *id = sibling.id;
            }
        }

        self.write_bucket(&bucket)?;
        self.write_bucket(&sibling)?;
        debug!(
            "split hash bucket {} into {} at local depth {}",
            bucket.id.raw(),
            sibling.id.raw(),
            bucket.local_depth
        );
        Ok(())
    }

    /// Removes `key` from its bucket chain.
    pub(crate) fn delete(&mut self, key: &Value) -> Result<bool> {
        let mut chain = self.chain(key)?;
        let Some(at) = chain.iter().position(|b| b.position(key).is_some()) else {
            return Ok(false);
        };

        let bucket = &mut chain[at];
        if let Some(index) = bucket.position(key) {
            bucket.entries.remove(index);
        }

        if !chain[at].entries.is_empty() {
            self.write_bucket(&chain[at])?;
            return Ok(true);
        }

        match (at, chain[at].overflow) {
            // An emptied overflow bucket is spliced out of the chain.
            (at, next) if at > 0 => {
                let emptied = chain.remove(at);
                chain[at - 1].overflow = next;
                self.write_bucket(&chain[at - 1])?;
                self.release_overflow(emptied.id);
            }
            // An emptied primary bucket takes over its first overflow bucket.
            (_, Some(_)) => {
                let pulled = chain.remove(1);
                let primary = &mut chain[0];
                primary.entries = pulled.entries;
                primary.overflow = pulled.overflow;
                self.write_bucket(primary)?;
                self.release_overflow(pulled.id);
            }
            _ => {
                let primary = chain.swap_remove(0);
                self.write_bucket(&primary)?;
                if primary.local_depth > 1 {
                    self.merge(primary, key)?;
                }
            }
        }
        Ok(true)
    }

    #[inline]
    fn release_overflow(&mut self, id: PageId) {
        self.freelist.free(id);
        self.overflow_count -= 1;
    }

    /// Merges an empty bucket into its pair, the bucket that differs only in the
    /// highest bit of the local depth, then shrinks the directory while possible.
    fn merge(&mut self, empty: Bucket, key: &Value) -> Result<()> {
        let depth = empty.local_depth;
        let low_bits = self.slot(key) & ((1 << depth) - 1);
        let pair_slot = low_bits ^ (1 << (depth - 1));

        let mut pair = self.bucket(self.directory[pair_slot])?;
        if pair.id == empty.id || pair.local_depth != depth || pair.overflow.is_some() {
            return Ok(());
        }

        pair.local_depth -= 1;
        for id in self.directory.iter_mut() {
            if *id == empty.id {
                *id = pair.id;
            }
        }
        self.write_bucket(&pair)?;
        self.freelist.free(empty.id);
        debug!(
            "merged hash bucket {} into {} at local depth {}",
            empty.id.raw(),
            pair.id.raw(),
            pair.local_depth
        );

        self.shrink();
        Ok(())
    }

    /// Halves the directory while no bucket depends on its highest bit.
    fn shrink(&mut self) {
        while self.global_depth > 1 {
            let half = self.directory.len() / 2;
            if (0..half).any(|slot| self.directory[slot] != self.directory[slot + half]) {
                break;
            }
            self.directory.truncate(half);
            self.global_depth -= 1;
            debug!(
                "halved hash directory to {} slots (global depth {})",
                self.directory.len(),
                self.global_depth
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Result,
        hash::ExtendibleHash,
        index::{
            testing::{context, ids, row},
            Index,
        },
        record::Value,
        table::Options,
    };

    /// A page size that gives buckets of two INT entries.
    const TWO_PER_BUCKET: u32 = 20 + 2 * 12;

    fn hash(dir: &std::path::Path, options: Options, keys: &[i32]) -> Result<ExtendibleHash> {
        let ctx = context(dir, TWO_PER_BUCKET, options);
        let mut hash = ExtendibleHash::create(ctx)?;
        for id in keys {
            let (bytes, key) = row(&hash.ctx, *id);
            hash.add(&bytes, &key)?;
        }
        Ok(hash)
    }

    #[test]
    fn test_initial_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let hash = hash(dir.path(), Options::default(), &[])?;

        assert_eq!(hash.block_factor, 2);
        assert_eq!(hash.global_depth, 2);
        assert_eq!(hash.directory.len(), 4);
        assert_eq!(hash.directory[0], hash.directory[2]);
        assert_eq!(hash.directory[1], hash.directory[3]);
        assert_ne!(hash.directory[0], hash.directory[1]);
        Ok(())
    }

    #[test]
    fn test_split_and_double() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // Every key ends in `00`, so all of them land in bucket 0 at first.
        let mut hash = hash(dir.path(), Options::default(), &[0, 4])?;
        assert_eq!(hash.directory.len(), 4);

        let (bytes, key) = row(&hash.ctx, 8);
        hash.add(&bytes, &key)?;
        assert_eq!(hash.global_depth, 3);
        assert_eq!(hash.directory.len(), 8);
        assert_eq!(hash.overflow_count, 0);

        for id in [0, 4, 8] {
            assert!(hash.search(&Value::Int(id))?.is_some());
        }
        assert_eq!(hash.count(), 3);
        Ok(())
    }

    #[test]
    fn test_overflow_at_max_depth() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut options = Options::default();
        options.hash_max_depth(2);

        let mut hash = hash(dir.path(), options, &[0, 4, 8, 12, 16])?;
        assert_eq!(hash.global_depth, 2);
        assert_eq!(hash.overflow_count, 2);
        for id in [0, 4, 8, 12, 16] {
            assert!(hash.search(&Value::Int(id))?.is_some());
        }

        // The emptied tail of the chain is spliced out.
        assert!(hash.remove(&Value::Int(16))?);
        assert_eq!(hash.overflow_count, 1);

        // The emptied primary bucket takes over its overflow bucket.
        assert!(hash.remove(&Value::Int(0))?);
        assert!(hash.remove(&Value::Int(4))?);
        assert!(!hash.remove(&Value::Int(4))?);
        assert_eq!(hash.overflow_count, 0);

        let mut remaining = ids(&hash.get_all()?);
        remaining.sort();
        assert_eq!(remaining, [8, 12]);
        assert_eq!(hash.freelist.len(), 2);
        Ok(())
    }

    #[test]
    fn test_merge_and_shrink() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut hash = hash(dir.path(), Options::default(), &[0, 4, 8])?;
        assert_eq!(hash.global_depth, 3);

        assert!(hash.remove(&Value::Int(4))?);
        assert_eq!(hash.global_depth, 2);
        assert_eq!(hash.directory.len(), 4);
        for id in [0, 8] {
            assert!(hash.search(&Value::Int(id))?.is_some());
        }

        let range = hash.range_search(&Value::Int(1), None)?;
        assert_eq!(ids(&range), [8]);
        Ok(())
    }

    #[test]
    fn test_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keys: Vec<_> = (0..40).collect();
        let hash = hash(dir.path(), Options::default(), &keys)?;
        let depth = hash.global_depth;

        let reloaded = ExtendibleHash::load(hash.ctx.clone())?;
        assert_eq!(reloaded.global_depth, depth);
        assert_eq!(reloaded.directory, hash.directory);
        assert_eq!(reloaded.count(), 40);
        for id in keys {
            assert!(reloaded.search(&Value::Int(id))?.is_some());
        }
        Ok(())
    }
}
