use crate::{
    bptree::{node::Node, BPTree},
    error::Result,
    index::in_range,
    record::Value,
};

impl BPTree {
    /// Descends from the root to the leaf that holds, or would hold, `key`.
    pub(crate) fn find_leaf(&self, key: &Value) -> Result<Node> {
        let mut node = self.node(self.meta.root)?;
        while !node.is_leaf {
            node = self.node(node.child(node.child_index(key)))?;
        }
        Ok(node)
    }

    fn first_leaf(&self) -> Result<Node> {
        let mut node = self.node(self.meta.root)?;
        while !node.is_leaf {
            node = self.node(node.child(0))?;
        }
        Ok(node)
    }

    /// Collects `(key, position)` pairs from `begin` up to `end`, walking the leaf chain.
    pub(crate) fn range(&self, begin: &Value, end: Option<&Value>) -> Result<Vec<(Value, u64)>> {
        let mut entries = Vec::new();
        let mut leaf = self.find_leaf(begin)?;
        let mut start = leaf.search(begin).unwrap_or_else(|i| i);

        loop {
            for index in start..leaf.keys.len() {
                let key = &leaf.keys[index];
                if !in_range(key, begin, end) {
                    return Ok(entries);
                }
                entries.push((key.clone(), leaf.children[index]));
            }

            let Some(next) = leaf.next_leaf else {
                return Ok(entries);
            };
            leaf = self.node(next)?;
            start = 0;
        }
    }

    /// Every `(key, position)` pair in ascending key order.
    pub(crate) fn entries(&self) -> Result<Vec<(Value, u64)>> {
        let mut entries = Vec::with_capacity(self.meta.count);
        let mut leaf = self.first_leaf()?;

        loop {
            entries.extend(leaf.keys.drain(..).zip(leaf.children.drain(..)));
            let Some(next) = leaf.next_leaf else {
                return Ok(entries);
            };
            leaf = self.node(next)?;
        }
    }
}
