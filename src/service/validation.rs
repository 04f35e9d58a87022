//! Schema-driven field validation. Checks are per field and never fail fast;
//! the service collects every failing field so the form can show all of them.

use crate::schema::{FieldDef, FieldKind};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // local@domain with non-empty halves; anything stricter belongs in a
    // confirmation-mail flow, not here
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("literal pattern"))
}

pub(crate) fn value_is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Check one field against its declared rules; `None` means clean.
/// Reference resolution hits the data store and is handled by the service.
pub(crate) fn check_field(field: &FieldDef, value: Option<&Value>) -> Option<String> {
    let blank = value.map(value_is_blank).unwrap_or(true);
    if blank {
        return if field.required {
            Some(format!("{} is required", field.label))
        } else {
            None
        };
    }
    let Some(value) = value else { return None };
    match field.kind {
        FieldKind::Text | FieldKind::LongText | FieldKind::Reference => None,
        FieldKind::Email => match value.as_str() {
            Some(s) if email_pattern().is_match(s) => None,
            _ => Some(format!("{} must be a valid email address", field.label)),
        },
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => None,
            Value::String(s) if s.trim().parse::<i64>().is_ok() => None,
            _ => Some(format!("{} must be a whole number", field.label)),
        },
    }
}
