use std::fmt::{Debug, Formatter};

use crate::{
    index::{Index, IndexKind, IndexStats},
    Result,
};

/// Exposes the internals of a table's index.
///
/// Its `Debug` output draws the index structure: the node tree of a B+ tree, the
/// directory and bucket chains of an extendible hash, the slots and chains of a
/// sequential file or the directory levels and pages of a sparse ISAM index.
pub struct Debugger<'a> {
    index: &'a dyn Index,
}

impl<'a> Debugger<'a> {
    #[inline]
    pub(crate) fn new(index: &'a dyn Index) -> Self {
        Self { index }
    }

    #[inline]
    pub fn kind(&self) -> IndexKind {
        self.index.kind()
    }

    #[inline]
    pub fn stats(&self) -> Result<IndexStats> {
        self.index.stats()
    }
}

impl Debug for Debugger<'_> {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.index.dump(f)
    }
}
