//! Row-to-value converters shared by the storages.

use rusqlite::types::Type;
use rusqlite::Row;

use crate::types::{Assignment, Item, ItemKind};

/// Map an items-table row (selected with `item.*` or `*`) to an [`Item`].
pub fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    let kind: String = row.get("type")?;
    let kind = match ItemKind::from_str_opt(&kind) {
        Some(kind) => kind,
        None => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                row.as_ref().column_index("type")?,
                Type::Text,
                format!("unknown item type {kind:?}").into(),
            ))
        }
    };
    Ok(Item {
        name: row.get("name")?,
        kind,
        description: row.get("description")?,
        rule_name: row.get("rule_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Map an assignments-table row to an [`Assignment`].
pub fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        item_name: row.get("item_name")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
    })
}
