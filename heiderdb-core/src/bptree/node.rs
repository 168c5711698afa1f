use crate::{
    error::Result,
    record::{self, Value},
    schema::ColumnType,
    search::{search, upper_bound, SearchIndex},
    storage::{Page, PageId, PageKind, Storage},
};

/// A B+ tree node, decoded from its page.
///
/// # Structure
///
/// The page header carries the number of keys in `count` and the next leaf in `link`.
///
/// ```plain
/// ┌──────┬──────┬─────┬──────┬─────────┬─────────┬─────┬─────────┐
/// │ Key0 │ Key1 │ ... │ KeyN │ Child0  │ Child1  │ ... │ ChildM  │
/// └──────┴──────┴─────┴──────┴─────────┴─────────┴─────┴─────────┘
///                               u64       u64              u64
/// ```
///
/// Leaf children are record positions in the data file, one per key. Branch
/// children are page ids, one more than there are keys.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) page_id: PageId,
    pub(crate) is_leaf: bool,
    pub(crate) keys: Vec<Value>,
    pub(crate) children: Vec<u64>,
    pub(crate) next_leaf: Option<PageId>,
}

impl Node {
    #[inline]
    pub(crate) fn new_leaf(page_id: PageId) -> Self {
        Self {
            page_id,
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            next_leaf: None,
        }
    }

    #[inline]
    pub(crate) fn new_branch(page_id: PageId) -> Self {
        Self {
            is_leaf: false,
            ..Self::new_leaf(page_id)
        }
    }

    #[inline]
    pub(crate) fn search(&self, key: &Value) -> SearchIndex {
        search!(key, self.keys.len(), idx => &self.keys[idx])
    }

    /// The child of a branch to descend into for `key`.
    #[inline]
    pub(crate) fn child_index(&self, key: &Value) -> usize {
        upper_bound(self.search(key))
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> PageId {
        PageId::from_raw(self.children[index] as u32)
    }

    pub(crate) fn read(storage: &Storage, page_id: PageId, key_type: ColumnType) -> Result<Self> {
        let page = storage.read(page_id, &[PageKind::Leaf, PageKind::Branch])?;
        let is_leaf = page.kind() == PageKind::Leaf;
        let count = page.count as usize;
        let children_count = if is_leaf { count } else { count + 1 };

        let mut reader = page.reader();
        let keys = (0..count)
            .map(|_| Ok(record::decode_key(key_type, reader.take(key_type.width())?)))
            .collect::<Result<Vec<_>>>()?;
        let children = (0..children_count)
            .map(|_| reader.u64().map_err(Into::into))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            page_id,
            is_leaf,
            keys,
            children,
            next_leaf: PageId::from_link(page.link),
        })
    }

    pub(crate) fn write(&self, storage: &Storage, key_type: ColumnType) -> Result<()> {
        let kind = if self.is_leaf {
            PageKind::Leaf
        } else {
            PageKind::Branch
        };
        let mut page = Page::new(kind, storage.page_size());
        page.count = self.keys.len() as u32;
        page.link = PageId::to_link(self.next_leaf);

        let mut writer = page.writer();
        let mut key_bytes = vec![0; key_type.width()];
        for key in &self.keys {
            record::encode_key(key_type, key, &mut key_bytes)?;
            writer.put(&key_bytes)?;
        }
        for child in &self.children {
            writer.put_u64(*child)?;
        }

        storage.write(self.page_id, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::Node;
    use crate::{error::Result, record::Value, schema::ColumnType, storage::Storage};

    #[test]
    fn test_node() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(dir.path().join("nodes.dat"), 68, false);

        let mut leaf = Node::new_leaf(0.into());
        leaf.keys = vec![Value::Int(5), Value::Int(9)];
        leaf.children = vec![0, 32];
        leaf.next_leaf = Some(1.into());
        leaf.write(&storage, ColumnType::Int)?;

        let mut branch = Node::new_branch(1.into());
        branch.keys = vec![Value::Int(7)];
        branch.children = vec![0, 2];
        branch.write(&storage, ColumnType::Int)?;

        let read = Node::read(&storage, 0.into(), ColumnType::Int)?;
        assert!(read.is_leaf);
        assert_eq!(read.keys, leaf.keys);
        assert_eq!(read.children, [0, 32]);
        assert_eq!(read.next_leaf, Some(1.into()));
        assert_eq!(read.search(&Value::Int(9)), Ok(1));

        let read = Node::read(&storage, 1.into(), ColumnType::Int)?;
        assert!(!read.is_leaf);
        assert_eq!(read.next_leaf, None);
        assert_eq!(read.child_index(&Value::Int(6)), 0);
        assert_eq!(read.child_index(&Value::Int(7)), 1);
        assert_eq!(read.child(1), 2.into());

        Ok(())
    }
}
