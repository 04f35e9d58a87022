//! Generic service: resolves entity names against the schema registry, builds
//! rendering contexts, validates saves, and dispatches custom actions.

mod actions;
mod context;
mod validation;

pub use actions::{ActionHandler, ActionRegistry};
pub use context::{ActionOutcome, DetailContext, FormContext, FormMode, ListContext, SaveOutcome};

use crate::error::{RepoError, ServiceError};
use crate::repo::{ListQuery, Repository};
use crate::schema::{EntityDefinition, FieldKind};
use crate::sql;
use crate::state::SharedRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct GenericService {
    registry: SharedRegistry,
    repo: Arc<dyn Repository>,
    actions: Arc<ActionRegistry>,
}

impl GenericService {
    pub fn new(registry: SharedRegistry, repo: Arc<dyn Repository>, actions: Arc<ActionRegistry>) -> Self {
        GenericService {
            registry,
            repo,
            actions,
        }
    }

    fn entity(&self, name: &str) -> Result<Arc<EntityDefinition>, ServiceError> {
        self.registry
            .snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::EntityNotFound(name.to_string()))
    }

    pub async fn render_list(&self, name: &str, query: &ListQuery) -> Result<ListContext, ServiceError> {
        let entity = self.entity(name)?;
        let page = query.page.max(1);
        let page_size = query
            .page_size
            .unwrap_or(entity.page_size)
            .clamp(1, sql::MAX_PAGE_SIZE);
        let data = self.repo.list(&entity, query).await.map_err(log_repo)?;
        let total_pages = data.total.div_ceil(u64::from(page_size));
        Ok(ListContext {
            entity: entity.name.clone(),
            label: entity.label.clone(),
            mode: "list",
            columns: entity.list_columns.clone(),
            actions: entity.actions.clone(),
            rows: data.rows,
            page,
            page_size,
            total: data.total,
            total_pages,
            sort: entity.resolve_sort(query.sort.as_deref()).map(|s| s.as_key()),
        })
    }

    pub async fn render_detail(&self, name: &str, pk: &Value) -> Result<DetailContext, ServiceError> {
        let entity = self.entity(name)?;
        let record = self
            .repo
            .detail(&entity, pk)
            .await
            .map_err(log_repo)?
            .ok_or_else(|| ServiceError::RecordNotFound {
                entity: entity.name.clone(),
            })?;
        Ok(detail_context(&entity, record))
    }

    /// `pk` absent means "new record" mode.
    pub async fn render_form(&self, name: &str, pk: Option<&Value>) -> Result<FormContext, ServiceError> {
        let entity = self.entity(name)?;
        match pk {
            None => Ok(form_context(&entity, FormMode::Create, None, BTreeMap::new())),
            Some(pk) => {
                let record = self
                    .repo
                    .detail(&entity, pk)
                    .await
                    .map_err(log_repo)?
                    .ok_or_else(|| ServiceError::RecordNotFound {
                        entity: entity.name.clone(),
                    })?;
                Ok(form_context(&entity, FormMode::Edit, Some(record), BTreeMap::new()))
            }
        }
    }

    /// Validate the payload against the schema, then insert or update. The
    /// save is only attempted when no field fails.
    pub async fn handle_save(
        &self,
        name: &str,
        payload: &HashMap<String, Value>,
    ) -> Result<SaveOutcome, ServiceError> {
        let entity = self.entity(name)?;
        let errors = self.validate_payload(&entity, payload).await?;
        if !errors.is_empty() {
            tracing::debug!(
                entity = %entity.name,
                fields = ?errors.keys().collect::<Vec<_>>(),
                "save rejected by field validation"
            );
            let mode = match payload
                .get(entity.primary_key.as_str())
                .filter(|v| !sql::value_is_empty(v))
            {
                Some(_) => FormMode::Edit,
                None => FormMode::Create,
            };
            let submitted = Value::Object(payload.clone().into_iter().collect());
            return Ok(SaveOutcome::Invalid(form_context(
                &entity,
                mode,
                Some(submitted),
                errors,
            )));
        }
        let saved = self.repo.save(&entity, payload).await.map_err(log_repo)?;
        match saved {
            Some(record) => Ok(SaveOutcome::Saved(detail_context(&entity, record))),
            None => Err(ServiceError::RecordNotFound {
                entity: entity.name.clone(),
            }),
        }
    }

    /// Rows for a reference-field picker.
    pub async fn lookup(&self, name: &str, filter: &str, limit: u32) -> Result<Vec<Value>, ServiceError> {
        let entity = self.entity(name)?;
        self.repo
            .lookup_search(&entity, filter, limit)
            .await
            .map_err(log_repo)
    }

    /// Total over both lookups: unknown entity, undeclared action, declared
    /// but unregistered, handler failure, handler success.
    pub async fn handle_action(&self, name: &str, action_name: &str, payload: &Value) -> ActionOutcome {
        let snapshot = self.registry.snapshot();
        let Some(entity) = snapshot.get(name) else {
            return ActionOutcome::EntityNotFound {
                entity: name.to_string(),
            };
        };
        let Some(action) = entity.find_action(action_name) else {
            return ActionOutcome::ActionNotFound {
                entity: name.to_string(),
                action: action_name.to_string(),
            };
        };
        let Some(handler) = self.actions.lookup(name, action_name) else {
            return ActionOutcome::NotImplemented {
                entity: name.to_string(),
                action: action_name.to_string(),
            };
        };
        match handler(entity, payload) {
            Ok(result) => ActionOutcome::Completed {
                entity: name.to_string(),
                action: action.clone(),
                result,
            },
            Err(message) => {
                tracing::error!(
                    entity = %name,
                    action = %action_name,
                    error = %message,
                    "action handler failed"
                );
                ActionOutcome::Failed {
                    entity: name.to_string(),
                    action: action_name.to_string(),
                    message,
                }
            }
        }
    }

    async fn validate_payload(
        &self,
        entity: &EntityDefinition,
        payload: &HashMap<String, Value>,
    ) -> Result<BTreeMap<String, String>, ServiceError> {
        let snapshot = self.registry.snapshot();
        let mut errors = BTreeMap::new();
        for field in entity.fields() {
            let name = field.name.as_str();
            let value = payload.get(name);
            if let Some(message) = validation::check_field(field, value) {
                errors.insert(name.to_string(), message);
                continue;
            }
            if field.kind != FieldKind::Reference {
                continue;
            }
            let Some(value) = value.filter(|v| !validation::value_is_blank(v)) else {
                continue;
            };
            let Some(target) = field.lookup_entity.as_deref().and_then(|t| snapshot.get(t)) else {
                errors.insert(
                    name.to_string(),
                    format!("{} cannot be verified: lookup entity unavailable", field.label),
                );
                continue;
            };
            match self.repo.detail(target, value).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    errors.insert(
                        name.to_string(),
                        format!("{} references a missing {}", field.label, target.label),
                    );
                }
                Err(e) => return Err(log_repo(e)),
            }
        }
        Ok(errors)
    }
}

/// Convert a repository failure into the outcome the caller sees, logging the
/// underlying cause here so raw data-store errors never travel further.
fn log_repo(err: RepoError) -> ServiceError {
    tracing::error!(
        entity = %err.entity,
        operation = err.operation,
        error = %err.source,
        "repository failure"
    );
    ServiceError::Repo(err)
}

fn detail_context(entity: &EntityDefinition, record: Value) -> DetailContext {
    DetailContext {
        entity: entity.name.clone(),
        label: entity.label.clone(),
        mode: "view",
        record,
        actions: entity.actions.clone(),
    }
}

fn form_context(
    entity: &EntityDefinition,
    mode: FormMode,
    record: Option<Value>,
    errors: BTreeMap<String, String>,
) -> FormContext {
    FormContext {
        entity: entity.name.clone(),
        label: entity.label.clone(),
        mode,
        record,
        sections: entity.sections.clone(),
        actions: entity.actions.clone(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use crate::repo::ListPage;
    use crate::schema::load;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    const DOC: &str = r#"
customer:
  table: customers
  label: Customer
  list:
    columns:
      - { name: name }
      - { name: email, sortable: false }
    default_sort: name
    page_size: 2
    actions:
      - { name: export_csv, label: Export CSV }
  form:
    sections:
      - label: Main
        fields:
          - { name: name, required: true }
          - { name: email, type: email }
          - { name: product_id, type: reference, lookup: { entity: product } }
    actions:
      - { name: calc_points }
      - { name: explode }
product:
  table: products
  list:
    columns: [{ name: title }]
"#;

    /// In-memory repository with the same dispatch and allow-list semantics
    /// as the PostgreSQL implementation.
    #[derive(Default)]
    struct MemRepo {
        tables: Mutex<HashMap<String, Vec<Value>>>,
        next_id: AtomicI64,
    }

    impl MemRepo {
        fn seed(&self, table: &str, rows: Vec<Value>) {
            let max_id = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            self.next_id.fetch_max(max_id, Ordering::SeqCst);
            self.tables.lock().unwrap().insert(table.to_string(), rows);
        }

        fn rows(&self, table: &str) -> Vec<Value> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn sort_key(row: &Value, column: &str) -> String {
        row.get(column).map(|v| v.to_string()).unwrap_or_default()
    }

    #[async_trait]
    impl Repository for MemRepo {
        async fn list(&self, entity: &EntityDefinition, query: &ListQuery) -> Result<ListPage, RepoError> {
            let mut rows = self.rows(entity.table.as_str());
            let total = rows.len() as u64;
            if let Some(sort) = entity.resolve_sort(query.sort.as_deref()) {
                rows.sort_by_key(|r| sort_key(r, sort.column.as_str()));
                if sort.direction == crate::schema::SortDirection::Desc {
                    rows.reverse();
                }
            }
            let page_size = query
                .page_size
                .unwrap_or(entity.page_size)
                .clamp(1, sql::MAX_PAGE_SIZE) as usize;
            let offset = (query.page.max(1) as usize - 1) * page_size;
            let rows = rows.into_iter().skip(offset).take(page_size).collect();
            Ok(ListPage { rows, total })
        }

        async fn detail(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, RepoError> {
            let pk_col = entity.primary_key.as_str();
            Ok(self
                .rows(entity.table.as_str())
                .into_iter()
                .find(|r| r.get(pk_col) == Some(pk)))
        }

        async fn lookup_search(
            &self,
            entity: &EntityDefinition,
            filter: &str,
            limit: u32,
        ) -> Result<Vec<Value>, RepoError> {
            let needle = filter.to_lowercase();
            let display = entity.lookup_display.as_str();
            let limit = limit.clamp(1, sql::MAX_LOOKUP_LIMIT) as usize;
            Ok(self
                .rows(entity.table.as_str())
                .into_iter()
                .filter(|r| {
                    r.get(display)
                        .and_then(Value::as_str)
                        .map(|s| s.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .take(limit)
                .collect())
        }

        async fn save(
            &self,
            entity: &EntityDefinition,
            payload: &HashMap<String, Value>,
        ) -> Result<Option<Value>, RepoError> {
            let pk_col = entity.primary_key.as_str();
            let allowed: Vec<&str> = entity.write_columns().iter().map(|c| c.as_str()).collect();
            let filtered: serde_json::Map<String, Value> = payload
                .iter()
                .filter(|(k, _)| allowed.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            let mut tables = self.tables.lock().unwrap();
            let rows = tables.entry(entity.table.as_str().to_string()).or_default();
            match filtered.get(pk_col).filter(|v| !sql::value_is_empty(v)) {
                Some(pk) => {
                    let pk = pk.clone();
                    let Some(row) = rows
                        .iter_mut()
                        .find(|r| r.get(pk_col) == Some(&pk))
                        .and_then(Value::as_object_mut)
                    else {
                        return Ok(None);
                    };
                    for (k, v) in &filtered {
                        if k != pk_col {
                            row.insert(k.clone(), v.clone());
                        }
                    }
                    Ok(Some(Value::Object(row.clone())))
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let mut row = filtered;
                    row.remove(pk_col);
                    row.insert(pk_col.to_string(), json!(id));
                    let row = Value::Object(row);
                    rows.push(row.clone());
                    Ok(Some(row))
                }
            }
        }
    }

    struct Fixture {
        service: GenericService,
        repo: Arc<MemRepo>,
    }

    fn fixture(actions: ActionRegistry) -> Fixture {
        let result = load(DOC);
        assert!(result.is_clean(), "{:?}", result.issues);
        let repo = Arc::new(MemRepo::default());
        let service = GenericService::new(
            SharedRegistry::new(result.registry),
            repo.clone(),
            Arc::new(actions),
        );
        Fixture { service, repo }
    }

    fn seeded_fixture() -> Fixture {
        let f = fixture(ActionRegistry::new());
        f.repo.seed(
            "customers",
            (1..=5)
                .map(|i| json!({"id": i, "name": format!("cust{}", i), "email": null}))
                .collect(),
        );
        f.repo.seed("products", vec![json!({"id": 1, "title": "Widget"})]);
        f
    }

    #[tokio::test]
    async fn unknown_entity_is_entity_not_found() {
        let f = seeded_fixture();
        let err = f.service.render_list("ghost", &ListQuery::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::EntityNotFound(_)));
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn pagination_covers_all_rows_without_duplicates() {
        let f = seeded_fixture();
        let mut seen = Vec::new();
        for page in 1..=3 {
            let ctx = f
                .service
                .render_list("customer", &ListQuery { page, ..Default::default() })
                .await
                .unwrap();
            assert_eq!(ctx.total, 5);
            assert_eq!(ctx.total_pages, 3);
            assert!(ctx.rows.len() <= 2);
            for row in &ctx.rows {
                seen.push(row.get("id").and_then(Value::as_i64).unwrap());
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn page_zero_behaves_like_page_one() {
        let f = seeded_fixture();
        let p0 = f
            .service
            .render_list("customer", &ListQuery { page: 0, ..Default::default() })
            .await
            .unwrap();
        let p1 = f
            .service
            .render_list("customer", &ListQuery { page: 1, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(p0.rows, p1.rows);
        assert_eq!(p0.page, 1);
    }

    #[tokio::test]
    async fn beyond_last_page_is_empty_with_correct_total() {
        let f = seeded_fixture();
        let ctx = f
            .service
            .render_list("customer", &ListQuery { page: 99, ..Default::default() })
            .await
            .unwrap();
        assert!(ctx.rows.is_empty());
        assert_eq!(ctx.total, 5);
    }

    #[tokio::test]
    async fn disallowed_sort_falls_back_to_default() {
        let f = seeded_fixture();
        let ctx = f
            .service
            .render_list(
                "customer",
                &ListQuery { sort: Some("-email".into()), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(ctx.sort.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn detail_of_missing_record_is_record_not_found() {
        let f = seeded_fixture();
        let err = f.service.render_detail("customer", &json!(999)).await.unwrap_err();
        assert!(matches!(err, ServiceError::RecordNotFound { .. }));
        assert_eq!(err.http_status(), 404);
        // a present record renders fine
        let ctx = f.service.render_detail("customer", &json!(3)).await.unwrap();
        assert_eq!(ctx.record.get("name"), Some(&json!("cust3")));
    }

    #[tokio::test]
    async fn form_modes() {
        let f = seeded_fixture();
        let create = f.service.render_form("customer", None).await.unwrap();
        assert_eq!(create.mode, FormMode::Create);
        assert!(create.record.is_none());

        let edit = f.service.render_form("customer", Some(&json!(1))).await.unwrap();
        assert_eq!(edit.mode, FormMode::Edit);
        assert!(edit.record.is_some());

        let err = f.service.render_form("customer", Some(&json!(999))).await.unwrap_err();
        assert!(matches!(err, ServiceError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn insert_assigns_a_key_and_drops_unknown_fields() {
        let f = seeded_fixture();
        let payload = HashMap::from([
            ("name".to_string(), json!("Alice")),
            ("evil".to_string(), json!("ignored")),
        ]);
        let outcome = f.service.handle_save("customer", &payload).await.unwrap();
        let SaveOutcome::Saved(ctx) = outcome else { panic!("expected save") };
        assert_eq!(ctx.record.get("id"), Some(&json!(6)));
        assert_eq!(ctx.record.get("name"), Some(&json!("Alice")));
        assert!(ctx.record.get("evil").is_none());
    }

    #[tokio::test]
    async fn update_is_idempotent() {
        let f = seeded_fixture();
        let payload = HashMap::from([
            ("id".to_string(), json!(2)),
            ("name".to_string(), json!("Renamed")),
            ("email".to_string(), json!("renamed@example.com")),
        ]);
        let first = f.service.handle_save("customer", &payload).await.unwrap();
        let second = f.service.handle_save("customer", &payload).await.unwrap();
        let (SaveOutcome::Saved(a), SaveOutcome::Saved(b)) = (first, second) else {
            panic!("expected saves")
        };
        assert_eq!(a.record, b.record);
        assert_eq!(a.record.get("name"), Some(&json!("Renamed")));
    }

    #[tokio::test]
    async fn update_of_missing_record_is_record_not_found() {
        let f = seeded_fixture();
        let payload = HashMap::from([
            ("id".to_string(), json!(999)),
            ("name".to_string(), json!("Ghost")),
        ]);
        let err = f.service.handle_save("customer", &payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn validation_collects_every_failing_field() {
        let f = seeded_fixture();
        // name missing (required) AND email malformed: both must be reported
        let payload = HashMap::from([("email".to_string(), json!("not-an-email"))]);
        let outcome = f.service.handle_save("customer", &payload).await.unwrap();
        assert_eq!(outcome.http_status(), 400);
        let SaveOutcome::Invalid(ctx) = outcome else { panic!("expected rejection") };
        let fields: Vec<&str> = ctx.errors.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["email", "name"]);
        assert_eq!(ctx.record.as_ref().unwrap().get("email"), Some(&json!("not-an-email")));
    }

    #[tokio::test]
    async fn reference_fields_must_resolve_on_the_target_entity() {
        let f = seeded_fixture();
        let mut payload = HashMap::from([
            ("name".to_string(), json!("Alice")),
            ("product_id".to_string(), json!(999)),
        ]);
        let outcome = f.service.handle_save("customer", &payload).await.unwrap();
        let SaveOutcome::Invalid(ctx) = outcome else { panic!("expected rejection") };
        assert!(ctx.errors.contains_key("product_id"));

        payload.insert("product_id".to_string(), json!(1));
        let outcome = f.service.handle_save("customer", &payload).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn lookup_matches_substring_case_insensitively() {
        let f = seeded_fixture();
        let rows = f.service.lookup("customer", "UST3", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&json!("cust3")));
    }

    #[tokio::test]
    async fn action_dispatch_is_total_over_both_lookups() {
        let mut actions = ActionRegistry::new();
        actions.register("customer", "calc_points", |_, payload| Ok(payload.clone()));
        actions.register("customer", "explode", |_, _| Err("boom".to_string()));
        let f = fixture(actions);

        let payload = json!({"id": 1});

        let out = f.service.handle_action("ghost", "calc_points", &payload).await;
        assert!(matches!(out, ActionOutcome::EntityNotFound { .. }));
        assert_eq!(out.http_status(), 404);

        let out = f.service.handle_action("customer", "undeclared", &payload).await;
        assert!(matches!(out, ActionOutcome::ActionNotFound { .. }));
        assert_eq!(out.http_status(), 404);

        // declared in the schema, nothing registered
        let out = f.service.handle_action("customer", "export_csv", &payload).await;
        assert!(matches!(out, ActionOutcome::NotImplemented { .. }));
        assert_eq!(out.http_status(), 501);

        let out = f.service.handle_action("customer", "explode", &payload).await;
        assert_eq!(out.http_status(), 500);
        let ActionOutcome::Failed { message, .. } = out else { panic!("expected failure") };
        assert_eq!(message, "boom");

        let out = f.service.handle_action("customer", "calc_points", &payload).await;
        assert_eq!(out.http_status(), 200);
        let ActionOutcome::Completed { result, .. } = out else { panic!("expected success") };
        assert_eq!(result, payload);
    }
}
