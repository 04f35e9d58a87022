//! Generic repository: a validated entity plus typed parameters in, rows out.
//!
//! `Repository` is the seam the service depends on; `PgRepository` is the
//! PostgreSQL implementation. Connections are drawn from the pool per call
//! and returned on every exit path by pool semantics.

use crate::error::RepoError;
use crate::schema::EntityDefinition;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

/// Per-request list parameters. Sort uses the compact "col" / "-col" form.
#[derive(Clone, Debug)]
pub struct ListQuery {
    pub page: i64,
    /// Overrides the entity's page size; capped either way.
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            page_size: None,
            sort: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub rows: Vec<Value>,
    /// Row count for the whole entity, not just this page.
    pub total: u64,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn list(&self, entity: &EntityDefinition, query: &ListQuery) -> Result<ListPage, RepoError>;

    async fn detail(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, RepoError>;

    /// Case-insensitive substring match on the entity's display column.
    async fn lookup_search(
        &self,
        entity: &EntityDefinition,
        filter: &str,
        limit: u32,
    ) -> Result<Vec<Value>, RepoError>;

    /// Insert when the payload's primary key is absent or empty, otherwise
    /// update keyed on it. `None` means the update target does not exist.
    /// Keys outside the entity's allow-list are dropped, not errors.
    async fn save(
        &self,
        entity: &EntityDefinition,
        payload: &HashMap<String, Value>,
    ) -> Result<Option<Value>, RepoError>;
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        PgRepository { pool }
    }

    async fn fetch_all(
        &self,
        entity: &str,
        operation: &'static str,
        q: &QueryBuf,
    ) -> Result<Vec<Value>, RepoError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::new(entity, operation, e))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(
        &self,
        entity: &str,
        operation: &'static str,
        q: &QueryBuf,
    ) -> Result<Option<Value>, RepoError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::new(entity, operation, e))?;
        Ok(row.as_ref().map(row_to_json))
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn list(&self, entity: &EntityDefinition, query: &ListQuery) -> Result<ListPage, RepoError> {
        let sort = entity.resolve_sort(query.sort.as_deref());
        let page_size = query.page_size.unwrap_or(entity.page_size);
        let q = sql::select_list(entity, query.page, page_size, sort.as_ref());
        let count = sql::count_all(entity);
        tracing::debug!(sql = %count.sql, "query");
        let total: i64 = sqlx::query_scalar(&count.sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::new(&entity.name, "list", e))?;
        let rows = self.fetch_all(&entity.name, "list", &q).await?;
        Ok(ListPage {
            rows,
            total: total.max(0) as u64,
        })
    }

    async fn detail(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, RepoError> {
        let q = sql::select_by_pk(entity, pk);
        self.fetch_optional(&entity.name, "detail", &q).await
    }

    async fn lookup_search(
        &self,
        entity: &EntityDefinition,
        filter: &str,
        limit: u32,
    ) -> Result<Vec<Value>, RepoError> {
        let q = sql::lookup_search(entity, filter, limit);
        self.fetch_all(&entity.name, "lookup", &q).await
    }

    async fn save(
        &self,
        entity: &EntityDefinition,
        payload: &HashMap<String, Value>,
    ) -> Result<Option<Value>, RepoError> {
        let pk_value = payload.get(entity.primary_key.as_str());
        match pk_value.filter(|v| !sql::value_is_empty(v)) {
            Some(pk) => {
                let q = sql::update(entity, pk, payload);
                self.fetch_optional(&entity.name, "save", &q).await
            }
            None => {
                let q = sql::insert(entity, payload);
                let row = self.fetch_optional(&entity.name, "save", &q).await?;
                match row {
                    Some(row) => Ok(Some(row)),
                    // INSERT ... RETURNING always yields a row on success
                    None => Err(RepoError::new(&entity.name, "save", sqlx::Error::RowNotFound)),
                }
            }
        }
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
