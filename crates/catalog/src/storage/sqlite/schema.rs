//! SQLite schema definitions and SQL text.
//!
//! Pure string building, no I/O. Table names must already be checked
//! against the known tables before they reach these functions.

use catalog_core::catalog::ID_FIELD;
use catalog_core::query::{is_valid_field_name, Direction, Filter, Query};
use catalog_core::storage::{StorageError, StorageResult};
use rusqlite::types::Value as SqlValue;

use super::conversions::to_sql_value;

pub const BEGIN: &str = "BEGIN IMMEDIATE";
pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

/// Creates a table of JSON documents.
pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
            id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
            data TEXT NOT NULL\n\
        );"
    )
}

/// Indexes for the lookups the hierarchy and product repositories run most.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_categories_parent_id ON categories(json_extract(data, '$.parent_id'));
CREATE INDEX IF NOT EXISTS idx_products_category_id ON products(json_extract(data, '$.category_id'));
CREATE INDEX IF NOT EXISTS idx_products_status ON products(json_extract(data, '$.status'));
CREATE INDEX IF NOT EXISTS idx_links_product_id ON links(json_extract(data, '$.product_id'));
"#;

pub fn select_by_id(table: &str) -> String {
    format!("SELECT data FROM {table} WHERE id = ?1")
}

pub fn insert(table: &str) -> String {
    format!("INSERT INTO {table} (data) VALUES (?1)")
}

/// Stamps the assigned id into the stored document.
pub fn stamp_id(table: &str) -> String {
    format!("UPDATE {table} SET data = json_set(data, '$.id', id) WHERE id = ?1")
}

pub fn update(table: &str) -> String {
    format!("UPDATE {table} SET data = ?1 WHERE id = ?2")
}

pub fn soft_delete(table: &str) -> String {
    format!(
        "UPDATE {table} SET data = json_set(data, '$.deleted_at', ?1, '$.updated_at', ?1) \
         WHERE id = ?2"
    )
}

pub fn restore(table: &str) -> String {
    format!("UPDATE {table} SET data = json_set(data, '$.deleted_at', NULL) WHERE id = ?1")
}

pub fn delete(table: &str) -> String {
    format!("DELETE FROM {table} WHERE id = ?1")
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

fn column(field: &str) -> StorageResult<String> {
    if field == ID_FIELD {
        return Ok("id".to_string());
    }
    if !is_valid_field_name(field) {
        return Err(StorageError::InvalidData(format!(
            "invalid field name '{field}'"
        )));
    }
    Ok(format!("json_extract(data, '$.{field}')"))
}

fn where_clause(query: &Query, params: &mut Vec<SqlValue>) -> StorageResult<String> {
    let mut conditions = Vec::new();

    if !query.with_trashed {
        conditions.push("json_extract(data, '$.deleted_at') IS NULL".to_string());
    }

    for (field, filter) in query.criteria.iter() {
        let column = column(field)?;
        let condition = match filter {
            Filter::Eq(value) => {
                params.push(to_sql_value(value));
                format!("{column} = ?{}", params.len())
            }
            Filter::In(values) if values.is_empty() => "0".to_string(),
            Filter::In(values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| {
                        params.push(to_sql_value(value));
                        format!("?{}", params.len())
                    })
                    .collect();
                format!("{column} IN ({})", placeholders.join(", "))
            }
            Filter::IsNull => format!("{column} IS NULL"),
            Filter::NotNull => format!("{column} IS NOT NULL"),
        };
        conditions.push(condition);
    }

    if conditions.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }
}

/// Builds the row query for `query`, ordered with an id tie-break.
pub fn select_statement(table: &str, query: &Query) -> StorageResult<Statement> {
    let mut params = Vec::new();
    let mut sql = format!("SELECT data FROM {table}{}", where_clause(query, &mut params)?);

    let mut order = Vec::with_capacity(query.order.len() + 1);
    for clause in &query.order {
        let direction = match clause.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        order.push(format!("{} {direction}", column(&clause.field)?));
    }
    order.push("id ASC".to_string());
    sql.push_str(&format!(" ORDER BY {}", order.join(", ")));

    match (query.limit, query.offset) {
        (None, None) => {}
        (limit, offset) => {
            let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
            let offset = offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));
            params.push(SqlValue::Integer(limit));
            params.push(SqlValue::Integer(offset));
            sql.push_str(&format!(
                " LIMIT ?{} OFFSET ?{}",
                params.len() - 1,
                params.len()
            ));
        }
    }

    Ok(Statement { sql, params })
}

/// Builds the count query for `query`, ignoring its window.
pub fn count_statement(table: &str, query: &Query) -> StorageResult<Statement> {
    let mut params = Vec::new();
    let sql = format!("SELECT COUNT(*) FROM {table}{}", where_clause(query, &mut params)?);
    Ok(Statement { sql, params })
}
