//! Session-variable strategy for MySQL servers without recursive CTEs.
//!
//! Descendants and ancestors scan the edge table once per possible depth
//! (the table cross joined with itself) while a single `@pv` variable holds
//! the frontier. A row is absorbed only when its known end is already in the
//! frontier and its other end is not, so every reachable name is added
//! exactly once and cycles cannot grow the frontier forever.
//!
//! The access tree is assembled from the same scans: the ancestors of the
//! seed first, then the descendants of each ancestor that lie on a path
//! back to the seed.
//!
//! `find_in_set` splits on commas, so names containing a comma are rejected
//! as traversal seeds.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::db::converters::row_to_item;
use crate::error::{RbacError, Result};
use crate::graph::dialect::Dialect;
use crate::graph::sql::{SqlBuilder, SqlQuery};
use crate::graph::traversal::{Direction, Tables};
use crate::types::{Item, ItemKind};

/// Forces MySQL to materialise an ordered derived table.
const MATERIALIZE_LIMIT: &str = "LIMIT 18446744073709551615";

/// Delimiter `find_in_set` splits the frontier on.
const FRONTIER_DELIMITER: char = ',';

/// Query generator for MySQL 5.x and MariaDB before 10.2.
#[derive(Debug, Clone)]
pub struct SessionVariableTraversal {
    tables: Tables,
    separator: char,
}

impl SessionVariableTraversal {
    pub(crate) fn new(tables: Tables, separator: char) -> Self {
        Self { tables, separator }
    }

    pub(crate) fn reachable_query<S: AsRef<str>>(
        &self,
        direction: Direction,
        names: &[S],
        kind: Option<ItemKind>,
    ) -> Result<SqlQuery> {
        let mut b = SqlBuilder::new(Dialect::Mysql);
        b.push("SELECT DISTINCT item.*\nFROM (");
        self.push_frontier_scan(&mut b, direction, names)?;
        b.push(&format!(
            ") AS reached\nJOIN {} AS item ON item.name = reached.name\nWHERE item.name NOT IN (",
            self.tables.items,
        ))
        .bind_list(names)
        .push(")");
        if let Some(kind) = kind {
            b.push(" AND item.type = ").bind(kind.as_str().to_string());
        }
        b.push("\nORDER BY item.name");
        Ok(b.finish())
    }

    pub(crate) fn has_child_query(&self, parent: &str, child: &str) -> Result<SqlQuery> {
        let mut b = SqlBuilder::new(Dialect::Mysql);
        b.push("SELECT 1 AS item_child_exists\nFROM (");
        self.push_frontier_scan(&mut b, Direction::Descendants, &[parent])?;
        b.push(") AS reached\nWHERE reached.name = ")
            .bind(child.to_string())
            .push(" AND reached.name <> ")
            .bind(parent.to_string());
        Ok(b.finish())
    }

    fn push_frontier_scan<S: AsRef<str>>(
        &self,
        b: &mut SqlBuilder,
        direction: Direction,
        names: &[S],
    ) -> Result<()> {
        let (from, to) = direction.columns();
        let seeds = frontier_seeds(names)?;
        let children = &self.tables.children;
        b.push(&format!(
            "\n  SELECT edge.{to} AS name\n  FROM (\n    SELECT e.parent, e.child FROM {children} AS e CROSS JOIN {children} AS pass\n    ORDER BY pass.parent, pass.child, e.parent, e.child\n    {MATERIALIZE_LIMIT}\n  ) AS edge, (SELECT @pv := "
        ))
        .bind(seeds)
        .push(&format!(
            ") AS init\n  WHERE find_in_set(edge.{from}, @pv)\n    AND NOT find_in_set(edge.{to}, @pv)\n    AND length(@pv := concat(@pv, ',', edge.{to}))\n"
        ));
        Ok(())
    }

    /// The seed row itself.
    pub(crate) fn seed_query(&self, name: &str) -> SqlQuery {
        let mut b = SqlBuilder::new(Dialect::Mysql);
        b.push(&format!("SELECT item.* FROM {} AS item WHERE item.name = ", self.tables.items))
            .bind(name.to_string());
        b.finish()
    }

    /// Access-tree rows for `name`: the seed with no children, then one row
    /// per ancestor carrying its descendants on paths to the seed.
    pub(crate) fn access_tree_rows(
        &self,
        conn: &Connection,
        name: &str,
    ) -> Result<Vec<(Item, String)>> {
        let seeds = self.seed_query(name).query_map(conn, row_to_item)?;
        let Some(seed) = seeds.into_iter().next() else {
            return Ok(Vec::new());
        };
        let ancestors = self
            .reachable_query(Direction::Ancestors, &[name], None)?
            .query_map(conn, row_to_item)?;
        assemble_access_tree(seed, ancestors, self.separator, |ancestor| {
            let below = self
                .reachable_query(Direction::Descendants, &[ancestor], None)?
                .query_map(conn, row_to_item)?;
            Ok(below.into_iter().map(|item| item.name).collect())
        })
    }
}

/// Seeds joined into the initial `@pv` frontier.
fn frontier_seeds<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let names: Vec<&str> = names.iter().map(AsRef::<str>::as_ref).collect();
    if let Some(name) = names.iter().find(|n| n.contains(FRONTIER_DELIMITER)) {
        return Err(RbacError::InvalidArgument(format!(
            "item name {name:?} contains {FRONTIER_DELIMITER:?}, which the session-variable traversal cannot seed"
        )));
    }
    Ok(names.join(&FRONTIER_DELIMITER.to_string()))
}

/// Build access-tree rows from the seed, its ancestors and a descendant
/// lookup. Each ancestor keeps only the descendants that are the seed or one
/// of its ancestors, which is the union of every path between the two.
fn assemble_access_tree(
    seed: Item,
    ancestors: Vec<Item>,
    separator: char,
    mut descendants_of: impl FnMut(&str) -> Result<Vec<String>>,
) -> Result<Vec<(Item, String)>> {
    let on_paths: HashSet<String> = ancestors
        .iter()
        .map(|item| item.name.clone())
        .chain(std::iter::once(seed.name.clone()))
        .collect();
    let separator = separator.to_string();

    let mut rows = Vec::with_capacity(ancestors.len() + 1);
    rows.push((seed, String::new()));
    for ancestor in ancestors {
        let children: Vec<String> = descendants_of(&ancestor.name)?
            .into_iter()
            .filter(|name| on_paths.contains(name))
            .collect();
        rows.push((ancestor, children.join(&separator)));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;

    fn traversal() -> SessionVariableTraversal {
        SessionVariableTraversal::new(
            Tables::new(Dialect::Mysql, "rbac_item", "rbac_item_child"),
            ',',
        )
    }

    #[test]
    fn descendants_share_one_frontier_for_all_seeds() {
        let q = traversal()
            .reachable_query(Direction::Descendants, &["a", "b"], Some(ItemKind::Role))
            .unwrap();
        assert!(q.sql.contains("SELECT @pv := ?"));
        assert!(q.sql.contains("find_in_set(edge.parent, @pv)"));
        assert!(q.sql.contains("NOT find_in_set(edge.child, @pv)"));
        assert!(q.sql.contains("concat(@pv, ',', edge.child)"));
        assert!(q.sql.contains("CROSS JOIN `rbac_item_child` AS pass"));
        assert!(q.sql.contains("NOT IN (?, ?) AND item.type = ?"));
        assert_eq!(
            q.params,
            vec![
                Value::Text("a,b".into()),
                Value::Text("a".into()),
                Value::Text("b".into()),
                Value::Text("role".into()),
            ]
        );
    }

    #[test]
    fn ancestors_absorb_parents() {
        let q = traversal().reachable_query(Direction::Ancestors, &["x"], None).unwrap();
        assert!(q.sql.contains("SELECT edge.parent AS name"));
        assert!(q.sql.contains("find_in_set(edge.child, @pv)"));
        assert!(q.sql.contains("concat(@pv, ',', edge.parent)"));
    }

    #[test]
    fn has_child_binds_seed_child_parent() {
        let q = traversal().has_child_query("p", "c").unwrap();
        assert!(q.sql.ends_with("WHERE reached.name = ? AND reached.name <> ?"));
        assert_eq!(
            q.params,
            vec![
                Value::Text("p".into()),
                Value::Text("c".into()),
                Value::Text("p".into()),
            ]
        );
    }

    #[test]
    fn comma_in_seed_name_is_rejected() {
        let t = SessionVariableTraversal::new(
            Tables::new(Dialect::Mysql, "rbac_item", "rbac_item_child"),
            '|',
        );
        let err = t
            .reachable_query(Direction::Descendants, &["ok", "posts,edit"], None)
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidArgument(_)));
        assert!(matches!(
            t.has_child_query("a,b", "c").unwrap_err(),
            RbacError::InvalidArgument(_)
        ));
    }

    #[test]
    fn seed_query_selects_one_item() {
        let q = traversal().seed_query("x");
        assert_eq!(q.sql, "SELECT item.* FROM `rbac_item` AS item WHERE item.name = ?");
        assert_eq!(q.params, vec![Value::Text("x".into())]);
    }

    /// D has parents B and C, both children of A.
    fn diamond() -> (Vec<(&'static str, &'static str)>, Item, Vec<Item>) {
        let edges = vec![("B", "D"), ("C", "D"), ("A", "B"), ("A", "C")];
        let ancestors = vec![Item::role("A"), Item::role("B"), Item::role("C")];
        (edges, Item::permission("D"), ancestors)
    }

    fn descendants(edges: &[(&str, &str)], from: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut stack = vec![from.to_string()];
        while let Some(current) = stack.pop() {
            for (parent, child) in edges {
                if *parent == current && !seen.iter().any(|s| s.as_str() == *child) {
                    seen.push(child.to_string());
                    stack.push(child.to_string());
                }
            }
        }
        seen.sort();
        seen
    }

    #[test]
    fn diamond_access_tree_keeps_both_paths() {
        let (edges, seed, ancestors) = diamond();
        let mut asked = Vec::new();
        let rows = assemble_access_tree(seed, ancestors, ',', |name| {
            asked.push(name.to_string());
            Ok(descendants(&edges, name))
        })
        .unwrap();

        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(item, children)| (item.name, children))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("D".to_string(), String::new()),
                ("A".to_string(), "B,C,D".to_string()),
                ("B".to_string(), "D".to_string()),
                ("C".to_string(), "D".to_string()),
            ]
        );
        assert_eq!(asked, vec!["A", "B", "C"]);
    }

    #[test]
    fn access_tree_drops_descendants_off_the_seed_paths() {
        let edges = [("A", "B"), ("A", "X"), ("B", "D"), ("X", "Y")];
        let rows = assemble_access_tree(
            Item::permission("D"),
            vec![Item::role("A"), Item::role("B")],
            '|',
            |name| Ok(descendants(&edges, name)),
        )
        .unwrap();
        assert_eq!(rows[1].0.name, "A");
        assert_eq!(rows[1].1, "B|D");
    }

    #[test]
    fn diamond_scans_follow_every_parent() {
        let t = traversal();
        let up = t.reachable_query(Direction::Ancestors, &["D"], None).unwrap();
        // Absorbs any edge whose child is on the frontier, not one parent per level.
        assert!(up.sql.contains("WHERE find_in_set(edge.child, @pv)"));
        assert!(!up.sql.contains("LIMIT 1"));
        assert_eq!(up.params[0], Value::Text("D".into()));
        let down = t.reachable_query(Direction::Descendants, &["A"], None).unwrap();
        assert!(down.sql.contains("WHERE find_in_set(edge.parent, @pv)"));
    }
}
