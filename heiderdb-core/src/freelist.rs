use serde::{Deserialize, Serialize};

use crate::storage::PageId;

/// Keeps track of ids (pages or buckets) that were released and can be handed out again.
///
/// Freelist uses a bitmap to record the free ids, each bit in the bitmap
/// represents whether an id is free (1) or not (0). It is persisted in the
/// metadata side-file as its list of bitmap words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Freelist {
    bitmap: Vec<BitmapWord>,
}

type BitmapWord = u64;

impl Freelist {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The number of free ids in the free list.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.bitmap
            .iter()
            .fold(0, |acc, word| acc + word.count_ones() as usize)
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Marks the specified id as free.
    pub(crate) fn free(&mut self, id: PageId) {
        let (word_idx, bit) = Self::locate(id);

        // Automatically resize the Vec of words.
        if word_idx >= self.bitmap.len() {
            self.bitmap.resize(word_idx + 1, 0);
        }
        self.bitmap[word_idx] |= 1 << bit;
    }

    /// Takes the highest free id out of the free list.
    pub(crate) fn take(&mut self) -> Option<PageId> {
        let (word_idx, word) = self
            .bitmap
            .iter_mut()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)?;

        let idx = BitmapWord::BITS - word.leading_zeros() - 1;
        *word &= !(1 << idx);

        let id = (word_idx as u32 * BitmapWord::BITS + idx).into();
        self.trim();
        Some(id)
    }

    #[inline]
    fn trim(&mut self) {
        while self.bitmap.last() == Some(&0) {
            self.bitmap.pop();
        }
    }

    #[inline]
    fn locate(id: PageId) -> (usize, u32) {
        (
            (id.raw() / BitmapWord::BITS) as usize,
            id.raw() % BitmapWord::BITS,
        )
    }
}

#[cfg(test)]
impl<T> From<T> for Freelist
where
    T: Into<Vec<BitmapWord>>,
{
    #[inline]
    fn from(value: T) -> Self {
        Self {
            bitmap: value.into(),
        }
    }
}
