//! Rendering contexts: plain structured data for the external template layer.
//! No presentation logic lives here; `http_status` helpers exist only so the
//! transport can map outcomes without inspecting variants itself.

use crate::schema::{ActionDef, ListColumn, SectionDef};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ListContext {
    pub entity: String,
    pub label: String,
    pub mode: &'static str,
    pub columns: Vec<ListColumn>,
    pub actions: Vec<ActionDef>,
    pub rows: Vec<Value>,
    pub page: i64,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetailContext {
    pub entity: String,
    pub label: String,
    pub mode: &'static str,
    pub record: Value,
    pub actions: Vec<ActionDef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    Create,
    Edit,
}

#[derive(Debug, Serialize)]
pub struct FormContext {
    pub entity: String,
    pub label: String,
    pub mode: FormMode,
    /// Existing row in edit mode, or the rejected payload after a failed save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    pub sections: Vec<SectionDef>,
    pub actions: Vec<ActionDef>,
    /// Field name -> message; empty when the form is clean.
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved(DetailContext),
    /// One or more fields failed validation; the form context carries every
    /// failing field, not just the first.
    Invalid(FormContext),
}

impl SaveOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            SaveOutcome::Saved(_) => 200,
            SaveOutcome::Invalid(_) => 400,
        }
    }
}

/// Total outcome of custom-action dispatch; never carries a raw handler error
/// beyond its message.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    EntityNotFound { entity: String },
    ActionNotFound { entity: String, action: String },
    /// Declared in the schema but no handler registered.
    NotImplemented { entity: String, action: String },
    Failed { entity: String, action: String, message: String },
    Completed { entity: String, action: ActionDef, result: Value },
}

impl ActionOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            ActionOutcome::EntityNotFound { .. } => 404,
            ActionOutcome::ActionNotFound { .. } => 404,
            ActionOutcome::NotImplemented { .. } => 501,
            ActionOutcome::Failed { .. } => 500,
            ActionOutcome::Completed { .. } => 200,
        }
    }
}
