use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{ensure_rooted, parent_map, HierarchyError};
use crate::catalog::{Category, EntityId};

/// A category with its rendered subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category: Category,
    /// Distance from the top of the rendered tree, starting at 0.
    pub depth: usize,
    /// Number of direct children, including ones cut off by a depth limit.
    pub children_count: usize,
    pub children: Vec<CategoryNode>,
}

/// Parent to children adjacency over a category snapshot.
///
/// Children are stored as positions in the snapshot, sorted by
/// `(sort_order, name, id)`.
pub struct ChildIndex<'a> {
    nodes: &'a [Category],
    children: HashMap<Option<EntityId>, Vec<usize>>,
}

impl<'a> ChildIndex<'a> {
    pub fn new(nodes: &'a [Category]) -> Result<Self, HierarchyError> {
        let mut known = HashSet::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.ok_or(HierarchyError::MissingId)?;
            if !known.insert(id) {
                return Err(HierarchyError::DuplicateNode(id));
            }
        }

        let mut children: HashMap<Option<EntityId>, Vec<usize>> = HashMap::new();
        for (position, node) in nodes.iter().enumerate() {
            // Detached nodes have no slot: their parent is not in the snapshot.
            if node.parent_id.is_some_and(|parent| !known.contains(&parent)) {
                continue;
            }
            children.entry(node.parent_id).or_default().push(position);
        }

        for positions in children.values_mut() {
            positions.sort_by(|&a, &b| {
                let (a, b) = (&nodes[a], &nodes[b]);
                (a.sort_order, &a.name, a.id).cmp(&(b.sort_order, &b.name, b.id))
            });
        }

        Ok(Self { nodes, children })
    }

    /// Direct children of `parent` (`None` for roots), in display order.
    pub fn children_of(&self, parent: Option<EntityId>) -> impl Iterator<Item = &'a Category> + '_ {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .map(|&position| &self.nodes[position])
    }

    fn child_count(&self, parent: Option<EntityId>) -> usize {
        self.children.get(&parent).map_or(0, Vec::len)
    }

    fn render(
        &self,
        parent: Option<EntityId>,
        depth: usize,
        max_depth: Option<usize>,
    ) -> Result<Vec<CategoryNode>, HierarchyError> {
        self.children_of(parent)
            .map(|category| {
                let id = category.id;
                if depth > self.nodes.len() {
                    return Err(HierarchyError::Cycle(id.unwrap_or_default()));
                }
                let expand = max_depth.is_none_or(|max| depth < max);
                let children = if expand {
                    self.render(id, depth + 1, max_depth)?
                } else {
                    Vec::new()
                };
                Ok(CategoryNode {
                    category: category.clone(),
                    depth,
                    children_count: self.child_count(id),
                    children,
                })
            })
            .collect()
    }
}

/// Renders the subtree below `root` (or the whole forest for `None`).
///
/// Nodes deeper than `max_depth` are not rendered, but their parents still
/// report them in `children_count`. A snapshot in which some parent chain
/// loops fails with [`HierarchyError::Cycle`] instead of rendering without
/// the nodes on the loop.
pub fn build_tree(
    categories: &[Category],
    root: Option<EntityId>,
    max_depth: Option<usize>,
) -> Result<Vec<CategoryNode>, HierarchyError> {
    ensure_rooted(&parent_map(categories)?)?;
    let index = ChildIndex::new(categories)?;
    index.render(root, 0, max_depth)
}

/// Ids of every category below `id`, breadth first.
pub fn descendant_ids(categories: &[Category], id: EntityId) -> Result<Vec<EntityId>, HierarchyError> {
    let index = ChildIndex::new(categories)?;
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);
    let mut descendants = Vec::new();

    while let Some(current) = queue.pop_front() {
        for child in index.children_of(Some(current)) {
            let Some(child_id) = child.id else { continue };
            if !seen.insert(child_id) {
                return Err(HierarchyError::Cycle(child_id));
            }
            descendants.push(child_id);
            queue.push_back(child_id);
        }
    }

    Ok(descendants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: EntityId, name: &str, parent: Option<EntityId>, sort_order: i32) -> Category {
        let mut category = Category::new(name, name.to_lowercase()).with_sort_order(sort_order);
        category.id = Some(id);
        category.parent_id = parent;
        category
    }

    fn catalog() -> Vec<Category> {
        vec![
            category(1, "Shoes", None, 1),
            category(2, "Sneakers", Some(1), 0),
            category(3, "Boots", Some(1), 0),
            category(4, "Electronics", None, 0),
            category(5, "Phones", Some(4), 0),
            category(6, "Running", Some(2), 0),
            category(7, "Lost", Some(99), 0),
        ]
    }

    fn names(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.category.name.as_str()).collect()
    }

    #[test]
    fn test_full_forest() {
        let tree = build_tree(&catalog(), None, None).unwrap();

        assert_eq!(names(&tree), vec!["Electronics", "Shoes"]);
        let shoes = &tree[1];
        assert_eq!(shoes.depth, 0);
        assert_eq!(shoes.children_count, 2);
        // Same sort_order, so name decides.
        assert_eq!(names(&shoes.children), vec!["Boots", "Sneakers"]);
        let sneakers = &shoes.children[1];
        assert_eq!(sneakers.depth, 1);
        assert_eq!(names(&sneakers.children), vec!["Running"]);
        assert_eq!(sneakers.children[0].depth, 2);
    }

    #[test]
    fn test_detached_nodes_are_omitted() {
        let tree = build_tree(&catalog(), None, None).unwrap();
        let all: Vec<&str> = flatten(&tree);
        assert!(!all.contains(&"Lost"));
    }

    fn flatten(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes
            .iter()
            .flat_map(|n| {
                std::iter::once(n.category.name.as_str()).chain(flatten(&n.children))
            })
            .collect()
    }

    #[test]
    fn test_subtree_from_root() {
        let tree = build_tree(&catalog(), Some(1), None).unwrap();
        assert_eq!(names(&tree), vec!["Boots", "Sneakers"]);
        assert_eq!(tree[0].depth, 0);
    }

    #[test]
    fn test_depth_limit_keeps_child_counts() {
        let tree = build_tree(&catalog(), None, Some(0)).unwrap();
        let shoes = &tree[1];
        assert!(shoes.children.is_empty());
        assert_eq!(shoes.children_count, 2);

        let tree = build_tree(&catalog(), None, Some(1)).unwrap();
        let sneakers = &tree[1].children[1];
        assert!(sneakers.children.is_empty());
        assert_eq!(sneakers.children_count, 1);
    }

    #[test]
    fn test_two_node_cycle_fails_rendering() {
        let categories = vec![
            category(1, "Root", None, 0),
            category(2, "A", Some(3), 0),
            category(3, "B", Some(2), 0),
        ];
        assert_eq!(build_tree(&categories, None, None), Err(HierarchyError::Cycle(2)));
        assert_eq!(build_tree(&categories, Some(1), None), Err(HierarchyError::Cycle(2)));
    }

    #[test]
    fn test_descendants() {
        let mut ids = descendant_ids(&catalog(), 1).unwrap();
        ids.sort();
        assert_eq!(ids, vec![2, 3, 6]);
        assert!(descendant_ids(&catalog(), 6).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let categories = vec![category(1, "A", None, 0), category(1, "B", None, 0)];
        assert!(matches!(
            build_tree(&categories, None, None),
            Err(HierarchyError::DuplicateNode(1))
        ));
    }
}
