//! Entity document loader: parses YAML into a validated `SchemaRegistry`.
//!
//! Total over malformed input: problems come back as `ValidationIssue`s in
//! document order and the offending entity is excluded, so one bad entity
//! never prevents the others from loading.

use crate::error::ValidationIssue;
use crate::schema::model::{
    ActionDef, EntityDefinition, FieldDef, FieldKind, Ident, ListColumn, SchemaRegistry,
    SectionDef, SortDirection, SortSpec,
};
use crate::schema::types::{ActionConfig, EntityConfig, FormConfig};
use std::collections::HashSet;

/// Entity name used for issues with the document itself.
const DOCUMENT: &str = "<document>";

#[derive(Debug, Default)]
pub struct LoadResult {
    pub registry: SchemaRegistry,
    pub issues: Vec<ValidationIssue>,
}

impl LoadResult {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Load and validate an entity document. The root is either a mapping of
/// entity name to config (the usual shape) or a sequence of configs each
/// carrying a `name` key.
pub fn load(document: &str) -> LoadResult {
    let mut result = LoadResult::default();

    let root: serde_yaml::Value = match serde_yaml::from_str(document) {
        Ok(v) => v,
        Err(e) => {
            result
                .issues
                .push(ValidationIssue::new(DOCUMENT, "", format!("YAML parse error: {}", e)));
            return result;
        }
    };
    if root.is_null() {
        return result;
    }

    let entries = match collect_entries(&root, &mut result.issues) {
        Some(entries) => entries,
        None => return result,
    };

    // First pass: declared names, so reference fields may point forward.
    let declared: HashSet<String> = entries.iter().map(|(name, _)| name.clone()).collect();

    let mut seen: HashSet<String> = HashSet::new();
    for (name, value) in entries {
        if !seen.insert(name.clone()) {
            result
                .issues
                .push(ValidationIssue::new(&name, "", "duplicate entity name"));
            continue;
        }
        let config: EntityConfig = match serde_yaml::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                result
                    .issues
                    .push(ValidationIssue::new(&name, "", format!("invalid entity config: {}", e)));
                continue;
            }
        };
        match resolve_entity(&name, &config, &declared) {
            Ok(entity) => result.registry.insert(entity),
            Err(mut issues) => result.issues.append(&mut issues),
        }
    }
    result
}

/// Normalize the document root into ordered (name, config) pairs.
fn collect_entries(
    root: &serde_yaml::Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Vec<(String, serde_yaml::Value)>> {
    match root {
        serde_yaml::Value::Mapping(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, value) in map {
                match key.as_str() {
                    Some(name) => out.push((name.to_string(), value.clone())),
                    None => issues.push(ValidationIssue::new(
                        DOCUMENT,
                        "",
                        "entity names must be strings",
                    )),
                }
            }
            Some(out)
        }
        serde_yaml::Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for (i, item) in seq.iter().enumerate() {
                match item.get("name").and_then(|n| n.as_str()) {
                    Some(name) => out.push((name.to_string(), item.clone())),
                    None => issues.push(ValidationIssue::new(
                        DOCUMENT,
                        format!("[{}]", i),
                        "entity entries in a sequence must have a 'name'",
                    )),
                }
            }
            Some(out)
        }
        _ => {
            issues.push(ValidationIssue::new(
                DOCUMENT,
                "",
                "document root must be a mapping of entity names to configs",
            ));
            None
        }
    }
}

fn resolve_entity(
    name: &str,
    config: &EntityConfig,
    declared: &HashSet<String>,
) -> Result<EntityDefinition, Vec<ValidationIssue>> {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    let table = match Ident::new(&config.table) {
        Ok(id) => Some(id),
        Err(msg) => {
            issues.push(ValidationIssue::new(name, "table", msg));
            None
        }
    };
    let primary_key = match Ident::new(&config.primary_key) {
        Ok(id) => Some(id),
        Err(msg) => {
            issues.push(ValidationIssue::new(name, "primary_key", msg));
            None
        }
    };

    if config.list.columns.is_empty() {
        issues.push(ValidationIssue::new(
            name,
            "list.columns",
            "at least one list column is required",
        ));
    }
    let mut list_columns = Vec::with_capacity(config.list.columns.len());
    for (i, col) in config.list.columns.iter().enumerate() {
        match Ident::new(&col.name) {
            Ok(id) => list_columns.push(ListColumn {
                label: col.label.clone().unwrap_or_else(|| col.name.clone()),
                name: id,
                sortable: col.sortable,
            }),
            Err(msg) => issues.push(ValidationIssue::new(
                name,
                format!("list.columns[{}].name", i),
                msg,
            )),
        }
    }

    let page_size = match config.list.page_size {
        Some(0) => {
            issues.push(ValidationIssue::new(
                name,
                "list.page_size",
                "page_size must be a positive integer",
            ));
            20
        }
        Some(n) => n,
        None => 20,
    };

    let form = config.form.clone().unwrap_or_default();
    let sections = resolve_sections(name, &form, declared, &mut issues);

    let default_sort = config.list.default_sort.as_deref().and_then(|key| {
        let (raw, direction) = match key.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (key, SortDirection::Asc),
        };
        let column = if primary_key.as_ref().map(Ident::as_str) == Some(raw) {
            primary_key.clone()
        } else {
            list_columns.iter().map(|c| &c.name).find(|c| c.as_str() == raw).cloned()
        };
        match column {
            Some(column) => Some(SortSpec { column, direction }),
            None => {
                issues.push(ValidationIssue::new(
                    name,
                    "list.default_sort",
                    format!("'{}' is not a list column of this entity", raw),
                ));
                None
            }
        }
    });

    let lookup_display = match config.lookup_display.as_deref() {
        Some(raw) => match Ident::new(raw) {
            Ok(id) => Some(id),
            Err(msg) => {
                issues.push(ValidationIssue::new(name, "lookup_display", msg));
                None
            }
        },
        None => list_columns
            .first()
            .map(|c| c.name.clone())
            .or_else(|| primary_key.clone()),
    };

    let mut actions = Vec::new();
    resolve_actions(name, "form.actions", &form.actions, &mut actions, &mut issues);
    resolve_actions(name, "list.actions", &config.list.actions, &mut actions, &mut issues);

    match (table, primary_key, lookup_display) {
        (Some(table), Some(primary_key), Some(lookup_display)) if issues.is_empty() => {
            Ok(EntityDefinition {
                name: name.to_string(),
                label: config.label.clone().unwrap_or_else(|| name.to_string()),
                table,
                primary_key,
                list_columns,
                default_sort,
                page_size,
                sections,
                actions,
                lookup_display,
            })
        }
        _ => Err(issues),
    }
}

fn resolve_sections(
    name: &str,
    form: &FormConfig,
    declared: &HashSet<String>,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<SectionDef> {
    let mut sections = Vec::with_capacity(form.sections.len());
    for (si, section) in form.sections.iter().enumerate() {
        let mut fields = Vec::with_capacity(section.fields.len());
        for (fi, field) in section.fields.iter().enumerate() {
            let path = |leaf: &str| format!("form.sections[{}].fields[{}].{}", si, fi, leaf);
            let ident = match Ident::new(&field.name) {
                Ok(id) => id,
                Err(msg) => {
                    issues.push(ValidationIssue::new(name, path("name"), msg));
                    continue;
                }
            };
            let kind = match field.kind.as_deref().unwrap_or("text") {
                "text" => FieldKind::Text,
                "long_text" => FieldKind::LongText,
                "email" => FieldKind::Email,
                "integer" => FieldKind::Integer,
                "reference" => FieldKind::Reference,
                other => {
                    issues.push(ValidationIssue::new(
                        name,
                        path("type"),
                        format!("unknown field kind '{}'", other),
                    ));
                    continue;
                }
            };
            let lookup_entity = if kind == FieldKind::Reference {
                match &field.lookup {
                    Some(lookup) if declared.contains(&lookup.entity) => {
                        Some(lookup.entity.clone())
                    }
                    Some(lookup) => {
                        issues.push(ValidationIssue::new(
                            name,
                            path("lookup.entity"),
                            format!("unknown lookup entity '{}'", lookup.entity),
                        ));
                        continue;
                    }
                    None => {
                        issues.push(ValidationIssue::new(
                            name,
                            path("lookup"),
                            "reference fields require a lookup entity",
                        ));
                        continue;
                    }
                }
            } else {
                None
            };
            fields.push(FieldDef {
                label: field.label.clone().unwrap_or_else(|| field.name.clone()),
                name: ident,
                kind,
                required: field.required,
                lookup_entity,
            });
        }
        sections.push(SectionDef {
            label: section.label.clone().unwrap_or_default(),
            fields,
        });
    }
    sections
}

fn resolve_actions(
    name: &str,
    path: &str,
    configs: &[ActionConfig],
    out: &mut Vec<ActionDef>,
    issues: &mut Vec<ValidationIssue>,
) {
    for (i, action) in configs.iter().enumerate() {
        if action.name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                name,
                format!("{}[{}].name", path, i),
                "action name must not be empty",
            ));
            continue;
        }
        out.push(ActionDef {
            name: action.name.clone(),
            label: action.label.clone().unwrap_or_else(|| action.name.clone()),
            target: action.target.clone(),
        });
    }
}
