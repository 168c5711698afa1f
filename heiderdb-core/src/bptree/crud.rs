use log::debug;

use crate::{
    bptree::{node::Node, BPTree},
    error::Result,
    record::Value,
    storage::PageId,
};

/// A key promoted out of a split, along with the page of the new right node.
type Promotion = (Value, PageId);

impl BPTree {
    /// The record position stored under `key`.
    pub(crate) fn get(&self, key: &Value) -> Result<Option<u64>> {
        let leaf = self.find_leaf(key)?;
        Ok(leaf.search(key).ok().map(|index| leaf.children[index]))
    }

    /// Inserts `key` or overwrites its position if it is already present.
    pub(crate) fn put(&mut self, key: &Value, pos: u64) -> Result<()> {
        let root_id = self.meta.root;
        let Some((mid_key, new_id)) = self.put_inner(root_id, key, pos)? else {
            return Ok(());
        };

        let mut root = Node::new_branch(self.alloc());
        root.keys.push(mid_key);
        root.children = vec![root_id.raw() as u64, new_id.raw() as u64];
        self.write_node(&root)?;

        self.meta.root = root.page_id;
        self.meta.height += 1;
        debug!("B+ tree root split, height is now {}", self.meta.height);
        Ok(())
    }

    fn put_inner(&mut self, page_id: PageId, key: &Value, pos: u64) -> Result<Option<Promotion>> {
        let mut node = self.node(page_id)?;

        if node.is_leaf {
            match node.search(key) {
                Ok(index) => {
                    node.children[index] = pos;
                    self.write_node(&node)?;
                    return Ok(None);
                }
                Err(index) => {
                    node.keys.insert(index, key.clone());
                    node.children.insert(index, pos);
                }
            }
        } else {
            let index = node.child_index(key);

            // Recursively add data to the following child nodes.
            let Some((mid_key, new_id)) = self.put_inner(node.child(index), key, pos)? else {
                return Ok(None);
            };
            node.keys.insert(index, mid_key);
            node.children.insert(index + 1, new_id.raw() as u64);
        }

        if node.keys.len() < self.meta.order {
            self.write_node(&node)?;
            return Ok(None);
        }

        let promotion = self.split(&mut node)?;
        self.write_node(&node)?;
        Ok(Some(promotion))
    }

    /// Moves the upper half of a full node into a new right sibling.
    fn split(&mut self, node: &mut Node) -> Result<Promotion> {
        let mid = node.keys.len() / 2;

        let (new, mid_key) = if node.is_leaf {
            let mut new = Node::new_leaf(self.alloc());
            new.keys = node.keys.split_off(mid);
            new.children = node.children.split_off(mid);
            new.next_leaf = node.next_leaf;
            node.next_leaf = Some(new.page_id);

            let mid_key = new.keys[0].clone();
            (new, mid_key)
        } else {
            let mut new = Node::new_branch(self.alloc());
            new.keys = node.keys.split_off(mid + 1);
            new.children = node.children.split_off(mid + 1);

            // The middle key moves up instead of staying in either half.
            let mid_key = node.keys.pop().unwrap_or_else(|| new.keys[0].clone());
            (new, mid_key)
        };

        self.write_node(&new)?;
        debug!(
            "split B+ tree node {} into {}",
            node.page_id.raw(),
            new.page_id.raw()
        );
        Ok((mid_key, new.page_id))
    }
}

impl BPTree {
    /// Removes `key` from the tree, returning the record position it pointed at.
    pub(crate) fn delete(&mut self, key: &Value) -> Result<Option<u64>> {
        let root_id = self.meta.root;
        let removed = self.delete_inner(root_id, key)?;

        let root = self.node(root_id)?;
        if !root.is_leaf && root.keys.is_empty() {
            self.meta.root = root.child(0);
            self.meta.height -= 1;
            self.release(root_id);
            debug!("B+ tree root collapsed, height is now {}", self.meta.height);
        }

        Ok(removed)
    }

    fn delete_inner(&mut self, page_id: PageId, key: &Value) -> Result<Option<u64>> {
        let mut node = self.node(page_id)?;

        if node.is_leaf {
            let Ok(index) = node.search(key) else {
                return Ok(None);
            };
            node.keys.remove(index);
            let pos = node.children.remove(index);
            self.write_node(&node)?;
            return Ok(Some(pos));
        }

        let index = node.child_index(key);
        let Some(pos) = self.delete_inner(node.child(index), key)? else {
            return Ok(None);
        };

        let child = self.node(node.child(index))?;
        if child.keys.len() < self.min_keys() {
            self.rebalance(&mut node, index, child)?;
            self.write_node(&node)?;
        }
        Ok(Some(pos))
    }

    /// Fixes an underflowing child by borrowing from a sibling or merging with one.
    fn rebalance(&mut self, parent: &mut Node, index: usize, mut child: Node) -> Result<()> {
        let min_keys = self.min_keys();

        if index > 0 {
            let mut left = self.node(parent.child(index - 1))?;
            if left.keys.len() > min_keys {
                Self::borrow_from_left(parent, index, &mut left, &mut child);
                self.write_node(&left)?;
                return self.write_node(&child);
            }
        }

        if index + 1 < parent.children.len() {
            let mut right = self.node(parent.child(index + 1))?;
            if right.keys.len() > min_keys {
                Self::borrow_from_right(parent, index, &mut child, &mut right);
                self.write_node(&right)?;
                return self.write_node(&child);
            }
        }

        if index > 0 {
            let left = self.node(parent.child(index - 1))?;
            self.merge(parent, index - 1, left, child)
        } else if index + 1 < parent.children.len() {
            let right = self.node(parent.child(index + 1))?;
            self.merge(parent, index, child, right)
        } else {
            // An only child has no sibling to work with.
            Ok(())
        }
    }

    fn borrow_from_left(parent: &mut Node, index: usize, left: &mut Node, child: &mut Node) {
        let (Some(key), Some(ptr)) = (left.keys.pop(), left.children.pop()) else {
            return;
        };

        if child.is_leaf {
            child.keys.insert(0, key);
            child.children.insert(0, ptr);
            parent.keys[index - 1] = child.keys[0].clone();
        } else {
            let separator = std::mem::replace(&mut parent.keys[index - 1], key);
            child.keys.insert(0, separator);
            child.children.insert(0, ptr);
        }
    }

    fn borrow_from_right(parent: &mut Node, index: usize, child: &mut Node, right: &mut Node) {
        let key = right.keys.remove(0);
        let ptr = right.children.remove(0);

        if child.is_leaf {
            child.keys.push(key);
            child.children.push(ptr);
            parent.keys[index] = right.keys[0].clone();
        } else {
            let separator = std::mem::replace(&mut parent.keys[index], key);
            child.keys.push(separator);
            child.children.push(ptr);
        }
    }

    /// Merges `right` into `left`, dropping the parent key at `separator` that sits between them.
    fn merge(
        &mut self,
        parent: &mut Node,
        separator: usize,
        mut left: Node,
        right: Node,
    ) -> Result<()> {
        let separator_key = parent.keys.remove(separator);
        parent.children.remove(separator + 1);

        if left.is_leaf {
            left.next_leaf = right.next_leaf;
        } else {
            left.keys.push(separator_key);
        }
        left.keys.extend(right.keys);
        left.children.extend(right.children);

        self.write_node(&left)?;
        self.release(right.page_id);
        debug!(
            "merged B+ tree node {} into {}",
            right.page_id.raw(),
            left.page_id.raw()
        );
        Ok(())
    }

    /// Keeps the data file dense after a removal: the last record moves into
    /// the freed slot and the leaf entry pointing at it follows.
    pub(crate) fn relocate_last(&mut self, freed: u64) -> Result<()> {
        let record_size = self.ctx.record_size() as u64;
        let len = self.ctx.data.len()?;
        let Some(last) = len.checked_sub(record_size) else {
            return Ok(());
        };

        if freed != last {
            let bytes = self.ctx.data.read(last)?;
            let moved = self.ctx.record_key(&bytes);
            self.ctx.data.write(freed, &bytes)?;
            self.put(&moved, freed)?;
        }
        self.ctx.data.truncate(last)?;
        Ok(())
    }
}
