use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::catalog::{Category, EntityId};
use crate::storage::RepositoryError;

/// Parent of every category in a snapshot, keyed by category id.
pub type ParentMap = HashMap<EntityId, Option<EntityId>>;

/// Structural problems found while walking a category snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("parent chain of category {0} does not reach a root")]
    Cycle(EntityId),
    #[error("category {0} appears more than once")]
    DuplicateNode(EntityId),
    #[error("category without an id")]
    MissingId,
}

impl From<HierarchyError> for RepositoryError {
    fn from(err: HierarchyError) -> Self {
        RepositoryError::HierarchyCorrupted(err.to_string())
    }
}

/// Indexes the parent of each category.
pub fn parent_map(categories: &[Category]) -> Result<ParentMap, HierarchyError> {
    let mut parents = HashMap::with_capacity(categories.len());
    for category in categories {
        let id = category.id.ok_or(HierarchyError::MissingId)?;
        if parents.insert(id, category.parent_id).is_some() {
            return Err(HierarchyError::DuplicateNode(id));
        }
    }
    Ok(parents)
}

/// Returns the ancestors of `id`, nearest first, ending at a root.
///
/// A well-formed chain is never longer than the number of categories; a
/// longer walk means the snapshot contains a cycle.
pub fn ancestor_chain(parents: &ParentMap, id: EntityId) -> Result<Vec<EntityId>, HierarchyError> {
    let mut chain = Vec::new();
    let mut current = parents.get(&id).copied().flatten();

    while let Some(ancestor) = current {
        if !parents.contains_key(&ancestor) {
            break;
        }
        if chain.len() >= parents.len() {
            return Err(HierarchyError::Cycle(id));
        }
        chain.push(ancestor);
        current = parents.get(&ancestor).copied().flatten();
    }

    Ok(chain)
}

/// Returns true if making `proposed_parent` the parent of `category_id`
/// would make the category its own ancestor.
pub fn would_create_cycle(
    parents: &ParentMap,
    category_id: EntityId,
    proposed_parent: Option<EntityId>,
) -> Result<bool, HierarchyError> {
    let Some(parent) = proposed_parent else {
        return Ok(false);
    };
    if parent == category_id {
        return Ok(true);
    }

    let mut hops = 0;
    let mut current = parents.get(&parent).copied().flatten();
    while let Some(ancestor) = current {
        if ancestor == category_id {
            return Ok(true);
        }
        hops += 1;
        if hops > parents.len() {
            return Err(HierarchyError::Cycle(parent));
        }
        current = parents.get(&ancestor).copied().flatten();
    }

    Ok(false)
}

/// Checks that every parent chain ends at a root or a detached parent.
///
/// Fails with [`HierarchyError::Cycle`] naming the lowest id found on a
/// loop. Each category is walked once.
pub fn ensure_rooted(parents: &ParentMap) -> Result<(), HierarchyError> {
    let mut rooted: HashSet<EntityId> = HashSet::with_capacity(parents.len());
    let mut ids: Vec<EntityId> = parents.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if rooted.contains(&node) {
                break;
            }
            // Not in the snapshot: detached.
            let Some(&parent) = parents.get(&node) else {
                break;
            };
            if !on_path.insert(node) {
                return Err(HierarchyError::Cycle(node));
            }
            path.push(node);
            current = parent;
        }
        rooted.extend(path);
    }

    Ok(())
}
