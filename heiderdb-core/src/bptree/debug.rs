use std::fmt::{self, Formatter};

use crate::{
    bptree::{node::Node, BPTree},
    storage::PageId,
};

impl BPTree {
    #[inline]
    pub(crate) fn dump_tree(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "┓")?;
        self.dump_node(self.meta.root, String::new(), f)
    }

    fn dump_node(&self, page_id: PageId, prefix: String, f: &mut Formatter<'_>) -> fmt::Result {
        let node = self.node(page_id).map_err(|_| fmt::Error)?;
        if node.is_leaf {
            self.dump_leaf(&node, &prefix, f)
        } else {
            self.dump_branch(&node, prefix, f)
        }
    }

    fn dump_branch(&self, branch: &Node, prefix: String, f: &mut Formatter) -> fmt::Result {
        let count = branch.children.len();
        for index in 0..count {
            let is_last = index == count - 1;
            let page_id = branch.child(index);

            if index > 0 {
                writeln!(f, "{}┣━ {}", prefix, branch.keys[index - 1])?;
            }

            f.write_str(&prefix)?;
            if is_last {
                writeln!(f, "┗━━━━━━┓ ({})", page_id.raw())?;
            } else {
                writeln!(f, "┣━━━━━━┓ ({})", page_id.raw())?;
            }

            let next_prefix = prefix.clone() + if is_last { "       " } else { "┃      " };
            self.dump_node(page_id, next_prefix, f)?;
        }
        Ok(())
    }

    fn dump_leaf(&self, leaf: &Node, prefix: &str, f: &mut Formatter) -> fmt::Result {
        for (index, key) in leaf.keys.iter().enumerate() {
            let weld = if index == leaf.keys.len() - 1 {
                "┗"
            } else {
                "┣"
            };
            writeln!(f, "{}{}━ {} @{}", prefix, weld, key, leaf.children[index])?;
        }
        Ok(())
    }
}
