//! Core domain values: items, assignments, and the computed access tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

/// Whether an item is a role or a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Role,
    Permission,
}

impl ItemKind {
    /// Value stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "role" => Some(Self::Role),
            "permission" => Some(Self::Permission),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A role or permission row in the items table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub description: Option<String>,
    pub rule_name: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

impl Item {
    /// New item of `kind`, both timestamps set to now.
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        let now = now_timestamp();
        Self {
            name: name.into(),
            kind,
            description: None,
            rule_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Role)
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Permission)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rule_name(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Binding of an item to an external subject (user) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_name: String,
    pub user_id: String,
    /// Unix seconds.
    pub created_at: i64,
}

impl Assignment {
    pub fn new(item_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            user_id: user_id.into(),
            created_at: now_timestamp(),
        }
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

// ---------------------------------------------------------------------------
// Access tree
// ---------------------------------------------------------------------------

/// One node of an [`AccessTree`]: an item plus indices of its descendants
/// inside the same tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTreeNode {
    pub item: Item,
    children: Vec<usize>,
}

/// Every item reachable upwards from a seed item, each annotated with the
/// descendants that lie between it and the seed.
///
/// Nodes are kept in the order the backend returned them. Children are stored as
/// indices into the node list, so resolving them never copies items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTree {
    nodes: Vec<AccessTreeNode>,
    by_name: HashMap<String, usize>,
}

impl AccessTree {
    /// Build a tree from `(item, child names)` pairs.
    ///
    /// Returns the first child name that is not itself one of the items,
    /// as `Err`, so the caller can report the collision.
    pub(crate) fn from_entries(entries: Vec<(Item, Vec<String>)>) -> Result<Self, String> {
        let mut tree = Self::default();
        let mut pending: Vec<Vec<String>> = Vec::new();

        for (item, child_names) in entries {
            match tree.by_name.get(&item.name) {
                Some(&index) => pending[index].extend(child_names),
                None => {
                    tree.by_name.insert(item.name.clone(), tree.nodes.len());
                    tree.nodes.push(AccessTreeNode {
                        item,
                        children: Vec::new(),
                    });
                    pending.push(child_names);
                }
            }
        }

        for (index, child_names) in pending.into_iter().enumerate() {
            let mut children = Vec::with_capacity(child_names.len());
            for child_name in child_names {
                let Some(&child) = tree.by_name.get(&child_name) else {
                    return Err(child_name);
                };
                if !children.contains(&child) {
                    children.push(child);
                }
            }
            tree.nodes[index].children = children;
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&AccessTreeNode> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }

    /// Descendant items of `name`, or an empty list if `name` is not in the tree.
    pub fn children(&self, name: &str) -> Vec<&Item> {
        self.get(name)
            .map(|node| node.children.iter().map(|&i| &self.nodes[i].item).collect())
            .unwrap_or_default()
    }

    /// Descendant names of `name`, same order as [`children`](Self::children).
    pub fn child_names(&self, name: &str) -> Vec<&str> {
        self.children(name)
            .into_iter()
            .map(|item| item.name.as_str())
            .collect()
    }

    /// Nodes in query order.
    pub fn iter(&self) -> impl Iterator<Item = &AccessTreeNode> {
        self.nodes.iter()
    }

    /// Item names in query order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.item.name.as_str()).collect()
    }
}

/// Current time as Unix seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn item_kind_round_trips_through_column_value() {
        for kind in [ItemKind::Role, ItemKind::Permission] {
            assert_eq!(ItemKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::from_str_opt("group"), None);
        assert_eq!(ItemKind::Permission.to_string(), "permission");
    }

    #[test]
    fn item_builders_set_fields() {
        let item = Item::role("admin")
            .with_description("Administrator")
            .with_rule_name("isOwner")
            .with_created_at(10)
            .with_updated_at(20);
        assert!(item.is_role());
        assert_eq!(item.description.as_deref(), Some("Administrator"));
        assert_eq!(item.rule_name.as_deref(), Some("isOwner"));
        assert_eq!((item.created_at, item.updated_at), (10, 20));
        assert_eq!(item.with_name("root").name, "root");
    }

    #[test]
    fn access_tree_resolves_children_by_index() {
        let tree = AccessTree::from_entries(vec![
            (Item::permission("C"), vec![]),
            (Item::role("B"), names(&["C"])),
            (Item::role("A"), names(&["C", "B"])),
        ])
        .unwrap();

        assert_eq!(tree.names(), vec!["C", "B", "A"]);
        assert!(tree.child_names("C").is_empty());
        assert_eq!(tree.child_names("B"), vec!["C"]);
        assert_eq!(tree.child_names("A"), vec!["C", "B"]);
        assert!(tree.children("missing").is_empty());
    }

    #[test]
    fn access_tree_merges_rows_reached_by_several_paths() {
        // D -> B -> A and D -> C -> A, seeded at D.
        let tree = AccessTree::from_entries(vec![
            (Item::permission("D"), vec![]),
            (Item::role("B"), names(&["D"])),
            (Item::role("C"), names(&["D"])),
            (Item::role("A"), names(&["D", "B"])),
            (Item::role("A"), names(&["D", "C"])),
        ])
        .unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.child_names("A"), vec!["D", "B", "C"]);
    }

    #[test]
    fn access_tree_reports_unknown_child_name() {
        let err = AccessTree::from_entries(vec![
            (Item::permission("posts.view"), vec![]),
            (Item::role("posts.viewer"), names(&["posts", "view"])),
        ])
        .unwrap_err();
        assert_eq!(err, "posts");
    }
}
