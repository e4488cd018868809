//! Category tree algorithms.
//!
//! All functions work on a snapshot of live categories loaded in one query.
//! A category whose parent is not in the snapshot is treated as detached:
//! it ends ancestor walks and is left out of rendered trees. A parent chain
//! that loops is corruption and fails every render.

mod cycles;
mod tree;

pub use cycles::{
    ancestor_chain, ensure_rooted, parent_map, would_create_cycle, HierarchyError, ParentMap,
};
pub use tree::{build_tree, descendant_ids, CategoryNode, ChildIndex};
