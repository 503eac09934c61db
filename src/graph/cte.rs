//! Recursive common table expression strategy.
//!
//! Used by every backend that supports recursive CTEs. Set traversals
//! (ancestors, descendants, descendant check) carry a single `name` column;
//! the access tree carries the separator-joined path of child names.

use crate::graph::dialect::{quote_literal, Dialect};
use crate::graph::sql::{SqlBuilder, SqlQuery};
use crate::graph::traversal::{Direction, Tables};
use crate::types::ItemKind;

/// Query generator for recursive-CTE backends.
#[derive(Debug, Clone)]
pub struct CteTraversal {
    dialect: Dialect,
    tables: Tables,
    separator: char,
}

impl CteTraversal {
    pub(crate) fn new(dialect: Dialect, tables: Tables, separator: char) -> Self {
        Self {
            dialect,
            tables,
            separator,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    // -----------------------------------------------------------------------
    // Set traversals
    // -----------------------------------------------------------------------

    /// Every item reachable from `names` in `direction`, seeds excluded,
    /// optionally restricted to `kind`, ordered by name.
    pub(crate) fn reachable_query<S: AsRef<str>>(
        &self,
        direction: Direction,
        names: &[S],
        kind: Option<ItemKind>,
    ) -> SqlQuery {
        let mut b = SqlBuilder::new(self.dialect);
        self.push_closure(&mut b, direction, names);
        b.push(&format!(
            "SELECT DISTINCT item.*\nFROM reached\nJOIN {} ON item.name = reached.name\nWHERE item.name NOT IN (",
            self.dialect.table_alias(&self.tables.items, "item"),
        ))
        .bind_list(names)
        .push(")");
        if let Some(kind) = kind {
            b.push(" AND item.type = ").bind(kind.as_str().to_string());
        }
        b.push("\nORDER BY item.name");
        self.push_recursion_hint(&mut b);
        b.finish()
    }

    /// One row when `child` is a transitive descendant of `parent`.
    pub(crate) fn has_child_query(&self, parent: &str, child: &str) -> SqlQuery {
        let mut b = SqlBuilder::new(self.dialect);
        self.push_closure(&mut b, Direction::Descendants, &[parent]);
        b.push("SELECT 1 AS item_child_exists\nFROM reached\nWHERE reached.name = ")
            .bind(child.to_string())
            .push(" AND reached.name <> ")
            .bind(parent.to_string());
        self.push_recursion_hint(&mut b);
        b.finish()
    }

    /// `WITH RECURSIVE reached(name) AS (...)` walking edges away from the seeds.
    fn push_closure<S: AsRef<str>>(&self, b: &mut SqlBuilder, direction: Direction, names: &[S]) {
        if self.dialect.guards_set_paths() {
            self.push_guarded_closure(b, direction, names);
            return;
        }
        let (from, to) = direction.columns();
        let edge = self.dialect.table_alias(&self.tables.children, "edge");
        b.push(&format!(
            "{} reached(name) AS (\n  SELECT edge.{to} FROM {edge} WHERE edge.{from} IN (",
            self.dialect.with_recursive(),
        ))
        .bind_list(names)
        .push(&format!(
            ")\n  {}\n  SELECT edge.{to} FROM {edge}\n  JOIN reached ON edge.{from} = reached.name\n)",
            self.dialect.set_union(),
        ));
        if let Some(cycle) = self.dialect.cycle_clause("name") {
            b.push("\n").push(&cycle);
        }
        b.push("\n");
    }

    /// Closure whose rows also carry the separator-delimited names walked so
    /// far. A step onto a name already on its own path is dropped, so every
    /// row is a simple path and the walk ends on cycles.
    fn push_guarded_closure<S: AsRef<str>>(
        &self,
        b: &mut SqlBuilder,
        direction: Direction,
        names: &[S],
    ) {
        let d = self.dialect;
        let (from, to) = direction.columns();
        let edge = d.table_alias(&self.tables.children, "edge");
        let sep = quote_literal(&self.separator.to_string());
        let from_col = format!("edge.{from}");
        let to_col = format!("edge.{to}");
        let seed_path = d.cast_text(&d.concat(&[&sep, &from_col, &sep, &to_col, &sep]));
        let step_path = d.cast_text(&d.concat(&["reached.path", &to_col, &sep]));
        let needle = d.concat(&[&sep, &to_col, &sep]);

        b.push(&format!(
            "{} reached(name, path) AS (\n  SELECT {to_col}, {seed_path} FROM {edge} WHERE {from_col} IN (",
            d.with_recursive(),
        ))
        .bind_list(names)
        .push(&format!(
            ")\n  {}\n  SELECT {to_col}, {step_path} FROM {edge}\n  JOIN reached ON {from_col} = reached.name\n  WHERE {} = 0\n)\n",
            d.set_union(),
            d.position("reached.path", &needle),
        ));
    }

    fn push_recursion_hint(&self, b: &mut SqlBuilder) {
        if let Some(hint) = self.dialect.recursion_hint() {
            b.push("\n").push(hint);
        }
    }

    // -----------------------------------------------------------------------
    // Access tree
    // -----------------------------------------------------------------------

    /// The seed row plus one row per ancestor path, each carrying the
    /// separator-joined child names walked from the seed to that ancestor.
    ///
    /// A step never revisits a name already on its own path, so the walk
    /// ends even when the edges contain a cycle.
    pub(crate) fn access_tree_query(&self, name: &str) -> SqlQuery {
        let d = self.dialect;
        let sep = quote_literal(&self.separator.to_string());
        let joined = d.trim_both(
            &d.concat(&["access_tree.children", &sep, "edge.child"]),
            &sep,
        );
        let path = d.concat(&[
            &sep,
            "access_tree.children",
            &sep,
            "access_tree.child_name",
            &sep,
        ]);
        let needle = d.concat(&[&sep, "edge.parent", &sep]);

        let mut b = SqlBuilder::new(d);
        b.push(&format!(
            "{} access_tree(child_name, children) AS (\n  SELECT item.name, {} FROM {} WHERE item.name = ",
            d.with_recursive(),
            d.cast_text("''"),
            d.table_alias(&self.tables.items, "item"),
        ))
        .bind(name.to_string())
        .push(&format!(
            "\n  UNION ALL\n  SELECT edge.parent, {}\n  FROM {}\n  JOIN access_tree ON edge.child = access_tree.child_name\n  WHERE {} = 0\n)\n",
            d.cast_text(&joined),
            d.table_alias(&self.tables.children, "edge"),
            d.position(&path, &needle),
        ))
        .push(&format!(
            "SELECT item.*, access_tree.children\nFROM access_tree\nJOIN {} ON item.name = access_tree.child_name",
            d.table_alias(&self.tables.items, "item"),
        ));
        self.push_recursion_hint(&mut b);
        b.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;

    fn traversal(dialect: Dialect) -> CteTraversal {
        CteTraversal::new(
            dialect,
            Tables::new(dialect, "rbac_item", "rbac_item_child"),
            ',',
        )
    }

    #[test]
    fn descendants_query_binds_seeds_twice_and_kind_last() {
        let q = traversal(Dialect::Sqlite).reachable_query(
            Direction::Descendants,
            &["a", "b"],
            Some(ItemKind::Permission),
        );
        assert!(q.sql.starts_with("WITH RECURSIVE reached(name) AS ("));
        assert!(q.sql.contains("edge.parent IN (?1, ?2)"));
        assert!(q.sql.contains("NOT IN (?3, ?4) AND item.type = ?5"));
        assert_eq!(q.params.len(), 5);
        assert_eq!(q.params[4], Value::Text("permission".into()));
    }

    #[test]
    fn ancestors_walk_edges_upwards() {
        let q = traversal(Dialect::Postgres).reachable_query(Direction::Ancestors, &["x"], None);
        assert!(q.sql.contains("SELECT edge.parent FROM \"rbac_item_child\" AS edge WHERE edge.child IN ($1)"));
        assert!(q.sql.contains("JOIN reached ON edge.child = reached.name"));
        assert!(!q.sql.contains("item.type"));
    }

    #[test]
    fn oracle_uses_plain_with_and_cycle_clause() {
        let q = traversal(Dialect::Oracle).reachable_query(Direction::Descendants, &["x"], None);
        assert!(q.sql.starts_with("WITH reached(name)"));
        assert!(q.sql.contains("UNION ALL"));
        assert!(q.sql.contains("CYCLE name SET is_cycle TO '1' DEFAULT '0'"));
        assert!(q.sql.contains("\"rbac_item_child\" edge"));
        assert!(q.sql.contains(":1"));
    }

    #[test]
    fn sqlserver_access_tree_uses_charindex_and_casts() {
        let q = traversal(Dialect::SqlServer).access_tree_query("x");
        assert!(q.sql.starts_with("WITH access_tree(child_name, children)"));
        assert!(q.sql.contains("CAST('' AS NVARCHAR(4000))"));
        assert!(q.sql.contains("CHARINDEX(CONCAT(',', edge.parent, ','),"));
        assert!(q.sql.contains("[rbac_item]"));
    }

    #[test]
    fn sqlserver_set_traversal_guards_its_path() {
        let q = traversal(Dialect::SqlServer).reachable_query(Direction::Descendants, &["A"], None);
        assert!(q.sql.starts_with("WITH reached(name, path) AS ("));
        assert!(q.sql.contains(
            "SELECT edge.child, CAST(CONCAT(',', edge.parent, ',', edge.child, ',') AS NVARCHAR(4000)) \
             FROM [rbac_item_child] AS edge WHERE edge.parent IN (@P1)"
        ));
        assert!(q.sql.contains("CAST(CONCAT(reached.path, edge.child, ',') AS NVARCHAR(4000))"));
        assert!(q.sql.contains("WHERE CHARINDEX(CONCAT(',', edge.child, ','), reached.path) = 0"));
        assert!(q.sql.contains("UNION ALL"));
        assert!(q.sql.ends_with("ORDER BY item.name\nOPTION (MAXRECURSION 0)"));
    }

    #[test]
    fn sqlserver_ancestor_check_guards_parent_column() {
        let q = traversal(Dialect::SqlServer).has_child_query("A", "B");
        assert!(q.sql.contains("WHERE CHARINDEX(CONCAT(',', edge.child, ','), reached.path) = 0"));
        let q = traversal(Dialect::SqlServer).reachable_query(Direction::Ancestors, &["A"], None);
        assert!(q.sql.contains("WHERE CHARINDEX(CONCAT(',', edge.parent, ','), reached.path) = 0"));
        assert!(q.sql.contains("JOIN reached ON edge.child = reached.name"));
    }

    #[test]
    fn guarded_closure_is_sqlserver_only() {
        for dialect in [Dialect::Sqlite, Dialect::Postgres, Dialect::Mysql, Dialect::Oracle] {
            let q = traversal(dialect).reachable_query(Direction::Descendants, &["A"], None);
            assert!(q.sql.contains("reached(name) AS ("), "{dialect:?}");
            assert!(!q.sql.contains("MAXRECURSION"), "{dialect:?}");
        }
    }

    #[test]
    fn access_tree_quotes_custom_separator() {
        let t = CteTraversal::new(
            Dialect::Mysql,
            Tables::new(Dialect::Mysql, "rbac_item", "rbac_item_child"),
            '\'',
        );
        let q = t.access_tree_query("x");
        assert!(q.sql.contains("TRIM(BOTH '''' FROM CONCAT(access_tree.children, '''', edge.child))"));
        assert_eq!(q.params, vec![Value::Text("x".into())]);
    }

    #[test]
    fn has_child_excludes_parent_itself() {
        let q = traversal(Dialect::Sqlite).has_child_query("a", "b");
        assert!(q.sql.ends_with("WHERE reached.name = ?2 AND reached.name <> ?3"));
    }
}
