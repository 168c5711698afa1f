use serde::{Deserialize, Serialize};

use crate::{
    record::Value,
    search::{floor, search},
    storage::PageId,
};

/// The first key of a level-1 block or of a data page, and where to find it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Pointer {
    pub(crate) key: Value,
    pub(crate) target: u32,
}

/// The two sparse levels above the data pages.
///
/// Level 1 has one pointer per data page, grouped into blocks. The root has one
/// pointer per level-1 block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Directory {
    pub(crate) root: Vec<Pointer>,
    pub(crate) levels: Vec<Vec<Pointer>>,
}

impl Directory {
    /// Builds both levels from the first key of every data page, in page order.
    pub(crate) fn build(first_keys: Vec<Value>, fanout: usize) -> Self {
        let pointers: Vec<_> = first_keys
            .into_iter()
            .enumerate()
            .map(|(page, key)| Pointer {
                key,
                target: page as u32,
            })
            .collect();

        let levels: Vec<Vec<_>> = pointers.chunks(fanout).map(<[_]>::to_vec).collect();
        let root = levels
            .iter()
            .enumerate()
            .map(|(block, pointers)| Pointer {
                key: pointers[0].key.clone(),
                target: block as u32,
            })
            .collect();

        Self { root, levels }
    }

    /// The number of data pages the directory points to.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// The data page whose first key is the greatest one not above `key`.
    ///
    /// Keys below every first key fall into the first data page.
    pub(crate) fn locate(&self, key: &Value) -> Option<PageId> {
        let block = &self.levels[Self::floor(&self.root, key)? as usize];
        Self::floor(block, key).map(PageId::from_raw)
    }

    #[inline]
    fn floor(pointers: &[Pointer], key: &Value) -> Option<u32> {
        if pointers.is_empty() {
            return None;
        }
        let idx = floor(search!(key, pointers.len(), i => &pointers[i].key)).unwrap_or(0);
        Some(pointers[idx].target)
    }
}

#[cfg(test)]
mod tests {
    use super::Directory;
    use crate::record::Value;

    #[test]
    fn test_build_and_locate() {
        let keys = [10, 20, 30, 40, 50].map(Value::Int).to_vec();
        let dir = Directory::build(keys, 2);

        assert_eq!(dir.levels.len(), 3);
        assert_eq!(dir.root.len(), 3);
        assert_eq!(dir.root[1].key, Value::Int(30));
        assert_eq!(dir.len(), 5);

        assert_eq!(dir.locate(&Value::Int(5)), Some(0.into()));
        assert_eq!(dir.locate(&Value::Int(10)), Some(0.into()));
        assert_eq!(dir.locate(&Value::Int(29)), Some(1.into()));
        assert_eq!(dir.locate(&Value::Int(30)), Some(2.into()));
        assert_eq!(dir.locate(&Value::Int(45)), Some(3.into()));
        assert_eq!(dir.locate(&Value::Int(99)), Some(4.into()));

        assert!(Directory::default().locate(&Value::Int(1)).is_none());
        assert!(Directory::build(vec![], 2).root.is_empty());
    }
}
