//! Raw config types matching the YAML entity document.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub table: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub list: ListConfig,
    #[serde(default)]
    pub form: Option<FormConfig>,
    /// Column matched by lookup search; defaults to the first list column.
    #[serde(default)]
    pub lookup_display: Option<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    /// "name" or "-name" (leading '-' sorts descending).
    #[serde(default)]
    pub default_sort: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub sortable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub lookup: Option<LookupConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupConfig {
    pub entity: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Opaque to the engine; forwarded to contexts for the template layer.
    #[serde(default)]
    pub target: Option<serde_json::Value>,
}
