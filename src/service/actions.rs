//! Action registry: (entity, action) -> handler, populated by the host
//! application before any request is served.

use crate::schema::EntityDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler contract: the entity definition and the request payload in, a
/// result payload or an error message out.
pub type ActionHandler =
    Arc<dyn Fn(&EntityDefinition, &Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<(String, String), ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, entity: &str, action: &str, handler: F)
    where
        F: Fn(&EntityDefinition, &Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers
            .insert((entity.to_string(), action.to_string()), Arc::new(handler));
    }

    pub fn lookup(&self, entity: &str, action: &str) -> Option<ActionHandler> {
        self.handlers
            .get(&(entity.to_string(), action.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
