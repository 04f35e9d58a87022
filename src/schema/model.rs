//! Validated schema model: immutable entity definitions plus the identifier
//! newtype that is the only type query construction accepts for table and
//! column names.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::sync::{Arc, OnceLock};

fn ident_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("literal pattern"))
}

/// A table or column identifier validated at load time. Only the loader can
/// construct one, so builder code cannot be handed a caller-supplied string
/// where an identifier is required.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub(crate) fn new(s: &str) -> Result<Self, String> {
        if ident_pattern().is_match(s) {
            Ok(Ident(s.to_string()))
        } else {
            Err(format!("'{}' is not a valid identifier", s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SortSpec {
    pub column: Ident,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Compact form used in query strings and contexts: "name" or "-name".
    pub fn as_key(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.column.as_str().to_string(),
            SortDirection::Desc => format!("-{}", self.column),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ListColumn {
    pub name: Ident,
    pub label: String,
    pub sortable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    LongText,
    Email,
    Integer,
    Reference,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldDef {
    pub name: Ident,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Target lookup entity; present exactly when `kind` is `Reference`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_entity: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SectionDef {
    pub label: String,
    pub fields: Vec<FieldDef>,
}

/// A declared custom action. `target` is opaque to the engine; the host's
/// handler and the template layer give it meaning.
#[derive(Clone, Debug, Serialize)]
pub struct ActionDef {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
}

/// One validated, immutable entity. Every identifier reachable from here went
/// through `Ident::new` at load time; the repository relies on that.
#[derive(Clone, Debug, Serialize)]
pub struct EntityDefinition {
    pub name: String,
    pub label: String,
    pub table: Ident,
    pub primary_key: Ident,
    pub list_columns: Vec<ListColumn>,
    pub default_sort: Option<SortSpec>,
    pub page_size: u32,
    pub sections: Vec<SectionDef>,
    /// Form actions followed by list actions, as declared.
    pub actions: Vec<ActionDef>,
    /// Column matched by lookup search and shown in reference pickers.
    pub lookup_display: Ident,
}

impl EntityDefinition {
    /// Columns selected for list/detail/lookup: primary key first, then list
    /// columns, deduplicated in declaration order.
    pub fn select_columns(&self) -> Vec<&Ident> {
        let mut out: Vec<&Ident> = vec![&self.primary_key];
        for col in &self.list_columns {
            if !out.iter().any(|c| *c == &col.name) {
                out.push(&col.name);
            }
        }
        out
    }

    /// Columns a save may write: primary key, form fields, then list columns
    /// (the fallback keeps form-less entities saveable), deduplicated.
    pub fn write_columns(&self) -> Vec<&Ident> {
        let mut out: Vec<&Ident> = vec![&self.primary_key];
        for field in self.fields() {
            if !out.iter().any(|c| *c == &field.name) {
                out.push(&field.name);
            }
        }
        for col in &self.list_columns {
            if !out.iter().any(|c| *c == &col.name) {
                out.push(&col.name);
            }
        }
        out
    }

    /// Look up `name` in the write allow-list.
    pub fn write_column(&self, name: &str) -> Option<&Ident> {
        self.write_columns().into_iter().find(|c| c.as_str() == name)
    }

    /// Look up `name` among sortable list columns.
    pub fn sort_column(&self, name: &str) -> Option<&Ident> {
        self.list_columns
            .iter()
            .filter(|c| c.sortable)
            .map(|c| &c.name)
            .find(|c| c.as_str() == name)
    }

    /// Resolve a requested sort key ("col" or "-col") against the sortable
    /// allow-list. A key that fails the allow-list falls back to the default
    /// sort; an absent key uses the default; otherwise natural order.
    pub fn resolve_sort(&self, requested: Option<&str>) -> Option<SortSpec> {
        if let Some(key) = requested {
            let (raw, direction) = match key.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (key, SortDirection::Asc),
            };
            if let Some(column) = self.sort_column(raw) {
                return Some(SortSpec {
                    column: column.clone(),
                    direction,
                });
            }
        }
        self.default_sort.clone()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields().find(|f| f.name.as_str() == name)
    }

    pub fn find_action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// All currently loaded entities, in document order. Built once by the
/// loader; shared immutably behind `SharedRegistry`.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    entities: IndexMap<String, Arc<EntityDefinition>>,
}

impl SchemaRegistry {
    pub(crate) fn insert(&mut self, entity: EntityDefinition) {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityDefinition>> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDefinition>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    fn entity() -> EntityDefinition {
        EntityDefinition {
            name: "customer".into(),
            label: "Customer".into(),
            table: ident("customers"),
            primary_key: ident("id"),
            list_columns: vec![
                ListColumn { name: ident("name"), label: "Name".into(), sortable: true },
                ListColumn { name: ident("email"), label: "Email".into(), sortable: false },
            ],
            default_sort: Some(SortSpec { column: ident("name"), direction: SortDirection::Asc }),
            page_size: 20,
            sections: vec![SectionDef {
                label: "Main".into(),
                fields: vec![FieldDef {
                    name: ident("email"),
                    label: "Email".into(),
                    kind: FieldKind::Email,
                    required: true,
                    lookup_entity: None,
                }],
            }],
            actions: vec![],
            lookup_display: ident("name"),
        }
    }

    #[test]
    fn ident_rejects_unsafe_names() {
        assert!(Ident::new("customers").is_ok());
        assert!(Ident::new("_private2").is_ok());
        assert!(Ident::new("drop table;--").is_err());
        assert!(Ident::new("name\"").is_err());
        assert!(Ident::new("").is_err());
        assert!(Ident::new("1starts_with_digit").is_err());
    }

    #[test]
    fn select_columns_put_pk_first_and_dedup() {
        let e = entity();
        let cols: Vec<&str> = e.select_columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(cols, vec!["id", "name", "email"]);
    }

    #[test]
    fn resolve_sort_honors_allow_list() {
        let e = entity();
        // sortable column, descending
        let s = e.resolve_sort(Some("-name")).unwrap();
        assert_eq!(s.column.as_str(), "name");
        assert_eq!(s.direction, SortDirection::Desc);
        // non-sortable column falls back to the default
        let s = e.resolve_sort(Some("email")).unwrap();
        assert_eq!(s.column.as_str(), "name");
        assert_eq!(s.direction, SortDirection::Asc);
        // unknown column falls back too
        let s = e.resolve_sort(Some("nope; DROP TABLE x")).unwrap();
        assert_eq!(s.column.as_str(), "name");
        // no request -> default
        assert_eq!(e.resolve_sort(None).unwrap().as_key(), "name");
    }
}
