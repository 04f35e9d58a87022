//! Builds parameterized SELECT, INSERT, and UPDATE from a validated entity.
//!
//! Identifiers enter queries only through `Ident` values held by the
//! `EntityDefinition`; everything caller-supplied is a bound parameter.

use crate::schema::{EntityDefinition, Ident, SortSpec};
use serde_json::Value;
use std::collections::HashMap;

/// Hard ceiling on page size, applied before any query is issued.
pub const MAX_PAGE_SIZE: u32 = 200;
/// Hard ceiling on lookup-search results.
pub const MAX_LOOKUP_LIMIT: u32 = 50;

/// Quote an identifier for PostgreSQL. `Ident` cannot contain quotes.
fn quoted(ident: &Ident) -> String {
    format!("\"{}\"", ident.as_str())
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

fn select_column_list(entity: &EntityDefinition) -> String {
    entity
        .select_columns()
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Paginated list page. `sort` must come from `EntityDefinition::resolve_sort`
/// so only allow-listed columns can appear; pages below 1 are treated as 1.
pub fn select_list(
    entity: &EntityDefinition,
    page: i64,
    page_size: u32,
    sort: Option<&SortSpec>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    // saturating: an absurd page must still produce a valid query that
    // returns an empty page, never wrap into a negative OFFSET
    let offset = page.max(1).saturating_sub(1).saturating_mul(i64::from(page_size));
    let order_clause = sort
        .map(|s| format!(" ORDER BY {} {}", quoted(&s.column), s.direction.as_sql()))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{} LIMIT {} OFFSET {}",
        select_column_list(entity),
        quoted(&entity.table),
        order_clause,
        page_size,
        offset
    );
    q
}

pub fn count_all(entity: &EntityDefinition) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", quoted(&entity.table));
    q
}

/// SELECT by primary key; the key is the sole parameter.
pub fn select_by_pk(entity: &EntityDefinition, pk: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(pk.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ${}",
        select_column_list(entity),
        quoted(&entity.table),
        quoted(&entity.primary_key),
        n
    );
    q
}

/// Case-insensitive substring search on the entity's display column, used to
/// populate reference pickers. The limit is capped regardless of the caller.
pub fn lookup_search(entity: &EntityDefinition, filter: &str, limit: u32) -> QueryBuf {
    let mut q = QueryBuf::new();
    let limit = limit.clamp(1, MAX_LOOKUP_LIMIT);
    let n = q.push_param(Value::String(format!("%{}%", filter)));
    let pk = quoted(&entity.primary_key);
    let display = quoted(&entity.lookup_display);
    let cols = if entity.primary_key == entity.lookup_display {
        pk.clone()
    } else {
        format!("{}, {}", pk, display)
    };
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} ILIKE ${} ORDER BY {} ASC LIMIT {}",
        cols,
        quoted(&entity.table),
        display,
        n,
        display,
        limit
    );
    q
}

/// INSERT from the payload: only allow-listed columns are written, in the
/// entity's declared order; the primary key is skipped when absent or empty
/// so the store can assign one. Returns the selected columns of the new row.
pub fn insert(entity: &EntityDefinition, payload: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for column in entity.write_columns() {
        let Some(value) = payload.get(column.as_str()) else { continue };
        if *column == entity.primary_key && value_is_empty(value) {
            continue;
        }
        let n = q.push_param(value.clone());
        cols.push(quoted(column));
        placeholders.push(format!("${}", n));
    }
    if cols.is_empty() {
        // nothing allow-listed in the payload; let the store fill defaults
        q.sql = format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            quoted(&entity.table),
            select_column_list(entity)
        );
        return q;
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&entity.table),
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(entity)
    );
    q
}

/// UPDATE by primary key: SET only allow-listed columns present in the
/// payload, primary key bound last. An empty change set degenerates to a
/// SELECT of the current row.
pub fn update(entity: &EntityDefinition, pk: &Value, payload: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for column in entity.write_columns() {
        if *column == entity.primary_key {
            continue;
        }
        let Some(value) = payload.get(column.as_str()) else { continue };
        let n = q.push_param(value.clone());
        sets.push(format!("{} = ${}", quoted(column), n));
    }
    if sets.is_empty() {
        return select_by_pk(entity, pk);
    }
    let pk_param = q.push_param(pk.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        quoted(&entity.table),
        sets.join(", "),
        quoted(&entity.primary_key),
        pk_param,
        select_column_list(entity)
    );
    q
}

/// Absent, null, or empty-string primary keys mean "insert".
pub fn value_is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
